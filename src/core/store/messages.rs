use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

use super::Store;
use super::types::MessageRecord;

const MESSAGE_COLS: &str = "m.id, m.channel_id, m.sender_id, u.name, m.content, m.mentions, \
                            m.parent_id, m.created_at";

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRecord> {
    let mentions_json: Option<String> = row.get(5)?;
    let mentions = mentions_json
        .as_deref()
        .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok());
    Ok(MessageRecord {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        content: row.get(4)?,
        mentions,
        parent_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl Store {
    pub async fn insert_message(
        &self,
        channel_id: &str,
        sender_id: &str,
        content: &str,
        mentions: Option<&[String]>,
        parent_id: Option<&str>,
    ) -> Result<MessageRecord> {
        let now = self.now().await?;
        let id = uuid::Uuid::new_v4().to_string();
        let mentions_json = match mentions {
            Some(m) if !m.is_empty() => Some(serde_json::to_string(m)?),
            _ => None,
        };

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO messages (id, channel_id, sender_id, content, mentions, parent_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, channel_id, sender_id, content, mentions_json, parent_id, now],
        )?;
        let msg = db.query_row(
            &format!(
                "SELECT {MESSAGE_COLS} FROM messages m
                 JOIN users u ON u.id = m.sender_id
                 WHERE m.id = ?1"
            ),
            params![id],
            message_from_row,
        )?;
        Ok(msg)
    }

    /// Newest-first page of a channel, with optional `before` message cursor.
    pub async fn list_messages(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<MessageRecord>> {
        let db = self.db.lock().await;

        let before_ts: Option<String> = match before {
            Some(msg_id) => db
                .query_row(
                    "SELECT created_at FROM messages WHERE id = ?1",
                    params![msg_id],
                    |row| row.get(0),
                )
                .optional()?,
            None => None,
        };

        let mut results = Vec::new();
        match before_ts {
            Some(ts) => {
                let mut stmt = db.prepare(&format!(
                    "SELECT {MESSAGE_COLS} FROM messages m
                     JOIN users u ON u.id = m.sender_id
                     WHERE m.channel_id = ?1 AND m.created_at < ?2
                     ORDER BY m.created_at DESC LIMIT ?3"
                ))?;
                let rows = stmt.query_map(params![channel_id, ts, limit as i64], message_from_row)?;
                for row in rows {
                    results.push(row?);
                }
            }
            None => {
                let mut stmt = db.prepare(&format!(
                    "SELECT {MESSAGE_COLS} FROM messages m
                     JOIN users u ON u.id = m.sender_id
                     WHERE m.channel_id = ?1
                     ORDER BY m.created_at DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![channel_id, limit as i64], message_from_row)?;
                for row in rows {
                    results.push(row?);
                }
            }
        }
        Ok(results)
    }

    /// Last N messages of a channel in chronological order (oldest first).
    pub async fn recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>> {
        let mut messages = self.list_messages(channel_id, limit, None).await?;
        messages.reverse();
        Ok(messages)
    }

    /// Flattened "  sender: content" context block for @mention invocations.
    /// Empty string when the channel has no messages yet.
    pub async fn recent_context(&self, channel_id: &str, limit: usize) -> Result<String> {
        let messages = self.recent_messages(channel_id, limit).await?;
        let lines: Vec<String> = messages
            .iter()
            .map(|m| {
                format!(
                    "  {}: {}",
                    m.sender_name.as_deref().unwrap_or("unknown"),
                    m.content
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }

    /// Messages for an agent with no channel filter: @mentions of the agent
    /// first, then the rest, newest first within each bucket.
    pub async fn priority_messages(
        &self,
        agent_name: &str,
        limit: usize,
    ) -> Result<Vec<(MessageRecord, bool)>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {MESSAGE_COLS} FROM messages m
             JOIN users u ON u.id = m.sender_id
             ORDER BY m.created_at DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![(limit * 4) as i64], message_from_row)?;

        let mut mentioned = Vec::new();
        let mut others = Vec::new();
        for row in rows {
            let msg = row?;
            let is_mention = msg
                .mentions
                .as_ref()
                .is_some_and(|m| m.iter().any(|name| name == agent_name));
            if is_mention {
                mentioned.push((msg, true));
            } else {
                others.push((msg, false));
            }
        }

        mentioned.extend(others);
        mentioned.truncate(limit);
        Ok(mentioned)
    }
}
