use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

use super::Store;
use super::types::FeatureRecord;

fn feature_from_row(row: &Row<'_>) -> rusqlite::Result<FeatureRecord> {
    Ok(FeatureRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        created_by: row.get(4)?,
        created_at: row.get(5)?,
        vote_count: row.get(6)?,
    })
}

const FEATURE_COLS: &str = "f.id, f.title, f.description, f.status, f.created_by, f.created_at, \
                            COALESCE(SUM(v.vote), 0)";

impl Store {
    pub async fn create_feature(
        &self,
        title: &str,
        description: &str,
        created_by: &str,
    ) -> Result<FeatureRecord> {
        let now = self.now().await?;
        let id = uuid::Uuid::new_v4().to_string();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO feature_requests (id, title, description, status, created_by, created_at)
             VALUES (?1, ?2, ?3, 'open', ?4, ?5)",
            params![id, title, description, created_by, now],
        )?;
        Ok(FeatureRecord {
            id,
            title: title.to_string(),
            description: description.to_string(),
            status: "open".to_string(),
            created_by: created_by.to_string(),
            created_at: now,
            vote_count: 0,
        })
    }

    pub async fn get_feature(&self, feature_id: &str) -> Result<Option<FeatureRecord>> {
        let db = self.db.lock().await;
        let feature = db
            .query_row(
                &format!(
                    "SELECT {FEATURE_COLS} FROM feature_requests f
                     LEFT JOIN feature_votes v ON v.feature_id = f.id
                     WHERE f.id = ?1 GROUP BY f.id"
                ),
                params![feature_id],
                feature_from_row,
            )
            .optional()?;
        Ok(feature)
    }

    pub async fn list_features(&self) -> Result<Vec<FeatureRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {FEATURE_COLS} FROM feature_requests f
             LEFT JOIN feature_votes v ON v.feature_id = f.id
             GROUP BY f.id ORDER BY f.created_at DESC"
        ))?;
        let rows = stmt.query_map([], feature_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// One vote per (feature, user), last write wins. Returns the tally,
    /// recomputed as a signed sum rather than maintained incrementally.
    pub async fn cast_vote(&self, feature_id: &str, user_id: &str, vote: i64) -> Result<i64> {
        anyhow::ensure!(vote == 1 || vote == -1, "Vote must be +1 or -1");

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO feature_votes (feature_id, user_id, vote) VALUES (?1, ?2, ?3)
             ON CONFLICT(feature_id, user_id) DO UPDATE SET vote = excluded.vote",
            params![feature_id, user_id, vote],
        )?;
        let tally: i64 = db.query_row(
            "SELECT COALESCE(SUM(vote), 0) FROM feature_votes WHERE feature_id = ?1",
            params![feature_id],
            |row| row.get(0),
        )?;
        Ok(tally)
    }
}

#[cfg(test)]
mod tests {
    use super::super::Store;

    async fn seed_feature(store: &Store) -> String {
        let user = store
            .create_user("creator", "agent", None, None, None)
            .await
            .unwrap();
        store
            .create_feature("Dark mode", "please", &user.id)
            .await
            .unwrap();
        store.list_features().await.unwrap()[0].id.clone()
    }

    #[tokio::test]
    async fn repeat_vote_overwrites() {
        let store = Store::open_in_memory().await.unwrap();
        let feature = seed_feature(&store).await;

        assert_eq!(store.cast_vote(&feature, "u1", 1).await.unwrap(), 1);
        // Same user flips their vote: single row, tally reflects only the latest
        assert_eq!(store.cast_vote(&feature, "u1", -1).await.unwrap(), -1);

        let f = store.get_feature(&feature).await.unwrap().unwrap();
        assert_eq!(f.vote_count, -1);
    }

    #[tokio::test]
    async fn votes_from_different_users_both_count() {
        let store = Store::open_in_memory().await.unwrap();
        let feature = seed_feature(&store).await;

        store.cast_vote(&feature, "u1", 1).await.unwrap();
        let tally = store.cast_vote(&feature, "u2", 1).await.unwrap();
        assert_eq!(tally, 2);
    }

    #[tokio::test]
    async fn concurrent_voters_are_not_lost() {
        let store = Store::open_in_memory().await.unwrap();
        let feature = seed_feature(&store).await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let feature = feature.clone();
            handles.push(tokio::spawn(async move {
                store.cast_vote(&feature, &format!("user-{}", i), 1).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let f = store.get_feature(&feature).await.unwrap().unwrap();
        assert_eq!(f.vote_count, 8);
    }

    #[tokio::test]
    async fn invalid_vote_is_rejected() {
        let store = Store::open_in_memory().await.unwrap();
        let feature = seed_feature(&store).await;
        assert!(store.cast_vote(&feature, "u1", 0).await.is_err());
    }
}
