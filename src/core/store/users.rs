use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

use super::Store;
use super::types::UserRecord;

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        user_type: row.get(2)?,
        display_name: row.get(3)?,
        about: row.get(4)?,
        agent_instructions: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const USER_COLS: &str = "id, name, type, display_name, about, agent_instructions, created_at";

impl Store {
    pub async fn create_user(
        &self,
        name: &str,
        user_type: &str,
        display_name: Option<&str>,
        about: Option<&str>,
        agent_instructions: Option<&str>,
    ) -> Result<UserRecord> {
        let now = self.now().await?;
        let id = uuid::Uuid::new_v4().to_string();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO users (id, name, type, display_name, about, agent_instructions, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, name, user_type, display_name, about, agent_instructions, now],
        )?;
        Ok(UserRecord {
            id,
            name: name.to_string(),
            user_type: user_type.to_string(),
            display_name: display_name.map(str::to_string),
            about: about.map(str::to_string),
            agent_instructions: agent_instructions.map(str::to_string),
            created_at: now,
        })
    }

    /// The single onboarded human operator, if any.
    pub async fn human_user(&self) -> Result<Option<UserRecord>> {
        let db = self.db.lock().await;
        let user = db
            .query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE type = 'human' LIMIT 1"),
                [],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<UserRecord>> {
        let db = self.db.lock().await;
        let user = db
            .query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<UserRecord>> {
        let db = self.db.lock().await;
        let user = db
            .query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE name = ?1"),
                params![name],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub async fn list_users(&self) -> Result<Vec<UserRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!("SELECT {USER_COLS} FROM users ORDER BY name"))?;
        let rows = stmt.query_map([], user_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::super::Store;

    #[tokio::test]
    async fn human_user_round_trip() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(store.human_user().await.unwrap().is_none());

        store
            .create_user("yash", "human", Some("Yash"), Some("Operator"), None)
            .await
            .unwrap();

        let human = store.human_user().await.unwrap().unwrap();
        assert_eq!(human.name, "yash");
        assert_eq!(human.display_name.as_deref(), Some("Yash"));
    }
}
