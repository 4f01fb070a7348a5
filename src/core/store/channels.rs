use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

use super::Store;
use super::types::ChannelRecord;

pub const DM_PREFIX: &str = "#dm-";

const CHANNEL_COLS: &str = "id, name, type, project_path, created_by, created_at";

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelRecord> {
    Ok(ChannelRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        channel_type: row.get(2)?,
        project_path: row.get(3)?,
        created_by: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl Store {
    pub async fn create_channel(
        &self,
        name: &str,
        channel_type: &str,
        project_path: Option<&str>,
        created_by: &str,
    ) -> Result<ChannelRecord> {
        let now = self.now().await?;
        let id = uuid::Uuid::new_v4().to_string();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO channels (id, name, type, project_path, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, name, channel_type, project_path, created_by, now],
        )?;
        Ok(ChannelRecord {
            id,
            name: name.to_string(),
            channel_type: channel_type.to_string(),
            project_path: project_path.map(str::to_string),
            created_by: created_by.to_string(),
            created_at: now,
        })
    }

    pub async fn get_channel(&self, id: &str) -> Result<Option<ChannelRecord>> {
        let db = self.db.lock().await;
        let channel = db
            .query_row(
                &format!("SELECT {CHANNEL_COLS} FROM channels WHERE id = ?1"),
                params![id],
                channel_from_row,
            )
            .optional()?;
        Ok(channel)
    }

    pub async fn get_channel_by_name(&self, name: &str) -> Result<Option<ChannelRecord>> {
        let db = self.db.lock().await;
        let channel = db
            .query_row(
                &format!("SELECT {CHANNEL_COLS} FROM channels WHERE name = ?1"),
                params![name],
                channel_from_row,
            )
            .optional()?;
        Ok(channel)
    }

    pub async fn list_channels(&self) -> Result<Vec<ChannelRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!("SELECT {CHANNEL_COLS} FROM channels ORDER BY name"))?;
        let rows = stmt.query_map([], channel_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Add a member if not already present. Returns true when newly joined.
    pub async fn join_channel(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        let now = self.now().await?;
        let db = self.db.lock().await;
        let inserted = db.execute(
            "INSERT OR IGNORE INTO channel_members (channel_id, user_id, joined_at)
             VALUES (?1, ?2, ?3)",
            params![channel_id, user_id, now],
        )?;
        Ok(inserted > 0)
    }

    /// The `#dm-{agent}` channel for an agent, created on first use.
    pub async fn get_or_create_dm(
        &self,
        agent_name: &str,
        created_by: &str,
    ) -> Result<ChannelRecord> {
        let dm_name = format!("{DM_PREFIX}{agent_name}");
        if let Some(existing) = self.get_channel_by_name(&dm_name).await? {
            return Ok(existing);
        }
        self.create_channel(&dm_name, "dm", None, created_by).await
    }
}

/// Extract the target agent name from a DM channel name, if it is one.
pub fn dm_target(channel_name: &str) -> Option<&str> {
    channel_name.strip_prefix(DM_PREFIX).filter(|s| !s.is_empty())
}
