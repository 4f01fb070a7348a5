use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

use super::Store;
use super::types::{AgentRecord, AgentStatus, AgentType, SessionRecord};

const AGENT_COLS: &str = "id, agent_name, agent_type, project_path, project_name, status, \
                          remote_endpoint, remote_session_id, description, personality, gender";

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<AgentRecord> {
    let agent_type: String = row.get(2)?;
    let status: String = row.get(5)?;
    Ok(AgentRecord {
        id: row.get(0)?,
        agent_name: row.get(1)?,
        agent_type: AgentType::parse(&agent_type),
        project_path: row.get(3)?,
        project_name: row.get(4)?,
        status: AgentStatus::parse(&status),
        remote_endpoint: row.get(6)?,
        remote_session_id: row.get(7)?,
        description: row.get(8)?,
        personality: row.get(9)?,
        gender: row.get(10)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let active: i64 = row.get(4)?;
    Ok(SessionRecord {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        pid: row.get(2)?,
        terminal_id: row.get(3)?,
        is_active: active != 0,
        started_at: row.get(5)?,
        ended_at: row.get(6)?,
        last_heartbeat: row.get(7)?,
    })
}

const SESSION_COLS: &str =
    "id, agent_id, pid, terminal_id, is_active, started_at, ended_at, last_heartbeat";

impl Store {
    /// Insert the agents-table row for an already-created agent user.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_agent(
        &self,
        user_id: &str,
        agent_name: &str,
        agent_type: &AgentType,
        project_path: &str,
        project_name: &str,
        remote_endpoint: Option<&str>,
        remote_session_id: Option<&str>,
    ) -> Result<AgentRecord> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO agents (id, agent_name, agent_type, project_path, project_name, status,
                                 remote_endpoint, remote_session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, 'online', ?6, ?7)",
            params![
                user_id,
                agent_name,
                agent_type.as_str(),
                project_path,
                project_name,
                remote_endpoint,
                remote_session_id
            ],
        )?;
        let agent = db.query_row(
            &format!("SELECT {AGENT_COLS} FROM agents WHERE agent_name = ?1"),
            params![agent_name],
            agent_from_row,
        )?;
        Ok(agent)
    }

    pub async fn get_agent(&self, agent_name: &str) -> Result<Option<AgentRecord>> {
        let db = self.db.lock().await;
        let agent = db
            .query_row(
                &format!("SELECT {AGENT_COLS} FROM agents WHERE agent_name = ?1"),
                params![agent_name],
                agent_from_row,
            )
            .optional()?;
        Ok(agent)
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        let db = self.db.lock().await;
        let mut stmt =
            db.prepare(&format!("SELECT {AGENT_COLS} FROM agents ORDER BY agent_name"))?;
        let rows = stmt.query_map([], agent_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Update the advisory status cache. Returns true when the value changed.
    pub async fn set_agent_status(&self, agent_name: &str, status: AgentStatus) -> Result<bool> {
        let db = self.db.lock().await;
        let changed = db.execute(
            "UPDATE agents SET status = ?1 WHERE agent_name = ?2 AND status != ?1",
            params![status.as_str(), agent_name],
        )?;
        Ok(changed > 0)
    }

    pub async fn set_remote_session(
        &self,
        agent_name: &str,
        remote_session_id: Option<&str>,
        remote_endpoint: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE agents SET remote_session_id = ?1,
                               remote_endpoint = COALESCE(?2, remote_endpoint)
             WHERE agent_name = ?3",
            params![remote_session_id, remote_endpoint, agent_name],
        )?;
        Ok(())
    }

    pub async fn update_agent_profile(
        &self,
        agent_name: &str,
        description: Option<&str>,
        personality: Option<&str>,
        gender: Option<&str>,
    ) -> Result<Option<AgentRecord>> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE agents SET description = COALESCE(?1, description),
                               personality = COALESCE(?2, personality),
                               gender = COALESCE(?3, gender)
             WHERE agent_name = ?4",
            params![description, personality, gender, agent_name],
        )?;
        let agent = db
            .query_row(
                &format!("SELECT {AGENT_COLS} FROM agents WHERE agent_name = ?1"),
                params![agent_name],
                agent_from_row,
            )
            .optional()?;
        Ok(agent)
    }

    pub async fn insert_session(
        &self,
        agent_id: &str,
        pid: i64,
        terminal_id: &str,
    ) -> Result<SessionRecord> {
        let now = self.now().await?;
        let id = uuid::Uuid::new_v4().to_string();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO sessions (id, agent_id, pid, terminal_id, is_active, started_at, last_heartbeat)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
            params![id, agent_id, pid, terminal_id, now],
        )?;
        Ok(SessionRecord {
            id,
            agent_id: agent_id.to_string(),
            pid,
            terminal_id: terminal_id.to_string(),
            is_active: true,
            started_at: now.clone(),
            ended_at: None,
            last_heartbeat: now,
        })
    }

    pub async fn active_sessions(&self, agent_id: &str) -> Result<Vec<SessionRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {SESSION_COLS} FROM sessions
             WHERE agent_id = ?1 AND is_active = 1
             ORDER BY started_at DESC"
        ))?;
        let rows = stmt.query_map(params![agent_id], session_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub async fn touch_sessions(&self, agent_id: &str) -> Result<()> {
        let now = self.now().await?;
        let db = self.db.lock().await;
        db.execute(
            "UPDATE sessions SET last_heartbeat = ?1 WHERE agent_id = ?2 AND is_active = 1",
            params![now, agent_id],
        )?;
        Ok(())
    }

    pub async fn deactivate_session(&self, session_id: &str) -> Result<()> {
        let now = self.now().await?;
        let db = self.db.lock().await;
        db.execute(
            "UPDATE sessions SET is_active = 0, ended_at = ?1 WHERE id = ?2",
            params![now, session_id],
        )?;
        Ok(())
    }

    pub async fn deactivate_agent_sessions(&self, agent_id: &str) -> Result<()> {
        let now = self.now().await?;
        let db = self.db.lock().await;
        db.execute(
            "UPDATE sessions SET is_active = 0, ended_at = ?1
             WHERE agent_id = ?2 AND is_active = 1",
            params![now, agent_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::Store;
    use super::*;

    async fn seed_agent(store: &Store, name: &str, agent_type: AgentType) -> AgentRecord {
        let user = store
            .create_user(name, "agent", None, None, None)
            .await
            .unwrap();
        store
            .create_agent(&user.id, name, &agent_type, "/tmp/proj", "proj", None, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn agent_round_trip_and_sorting() {
        let store = Store::open_in_memory().await.unwrap();
        seed_agent(&store, "zesty-zebra", AgentType::Claude).await;
        seed_agent(&store, "amber-alpaca", AgentType::Opencode).await;

        let names: Vec<String> = store
            .list_agents()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.agent_name)
            .collect();
        // the_creator is seeded at open
        assert_eq!(names, vec!["amber-alpaca", "the_creator", "zesty-zebra"]);
    }

    #[tokio::test]
    async fn status_update_reports_change() {
        let store = Store::open_in_memory().await.unwrap();
        seed_agent(&store, "bold-badger", AgentType::Codex).await;

        assert!(
            store
                .set_agent_status("bold-badger", AgentStatus::Offline)
                .await
                .unwrap()
        );
        // Second write with same value is a no-op
        assert!(
            !store
                .set_agent_status("bold-badger", AgentStatus::Offline)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn sessions_activate_and_deactivate() {
        let store = Store::open_in_memory().await.unwrap();
        let agent = seed_agent(&store, "sly-fox", AgentType::Opencode).await;

        let session = store.insert_session(&agent.id, 4242, "ttys001").await.unwrap();
        assert_eq!(store.active_sessions(&agent.id).await.unwrap().len(), 1);

        store.deactivate_session(&session.id).await.unwrap();
        assert!(store.active_sessions(&agent.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn profile_update_is_partial() {
        let store = Store::open_in_memory().await.unwrap();
        seed_agent(&store, "keen-koala", AgentType::Claude).await;

        let a = store
            .update_agent_profile("keen-koala", Some("Just a test"), None, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.description.as_deref(), Some("Just a test"));
        assert!(a.personality.is_none());

        let a = store
            .update_agent_profile("keen-koala", None, Some("Dry"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.personality.as_deref(), Some("Dry"));
        assert_eq!(a.description.as_deref(), Some("Just a test"));
    }
}
