mod agents;
mod channels;
mod features;
mod messages;
mod users;
pub mod types;

pub use channels::{DM_PREFIX, dm_target};

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::names::CREATOR_NAME;

pub const GENERAL_CHANNEL: &str = "#general";

/// Single source of truth for all TalkTo state. One SQLite connection behind
/// an async mutex; every query helper lives in a submodule impl block.
#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Connection>>,
}

impl Store {
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).await?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&data_dir, std::fs::Permissions::from_mode(0o700));
        }

        let db_path = data_dir.join("talkto.db");
        let db = Connection::open(&db_path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&db_path, std::fs::Permissions::from_mode(0o600));
        }

        let store = Self {
            db: Arc::new(Mutex::new(db)),
        };
        store.init_schema().await?;
        info!("Store opened at {}", db_path.display());
        Ok(store)
    }

    /// In-memory store for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        let store = Self {
            db: Arc::new(Mutex::new(db)),
        };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn healthy(&self) -> bool {
        let db = self.db.lock().await;
        db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    async fn init_schema(&self) -> Result<()> {
        {
            let db = self.db.lock().await;

            db.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    type TEXT NOT NULL,
                    display_name TEXT,
                    about TEXT,
                    agent_instructions TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS agents (
                    id TEXT PRIMARY KEY REFERENCES users(id),
                    agent_name TEXT NOT NULL UNIQUE,
                    agent_type TEXT NOT NULL,
                    project_path TEXT NOT NULL,
                    project_name TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'offline',
                    remote_endpoint TEXT,
                    remote_session_id TEXT,
                    description TEXT,
                    personality TEXT,
                    gender TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_agents_name ON agents(agent_name);

                CREATE TABLE IF NOT EXISTS sessions (
                    id TEXT PRIMARY KEY,
                    agent_id TEXT NOT NULL REFERENCES agents(id),
                    pid INTEGER NOT NULL,
                    terminal_id TEXT NOT NULL,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    started_at TEXT NOT NULL,
                    ended_at TEXT,
                    last_heartbeat TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_sessions_agent_active
                    ON sessions(agent_id, is_active);

                CREATE TABLE IF NOT EXISTS channels (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    type TEXT NOT NULL,
                    project_path TEXT,
                    created_by TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS channel_members (
                    channel_id TEXT NOT NULL REFERENCES channels(id),
                    user_id TEXT NOT NULL REFERENCES users(id),
                    joined_at TEXT NOT NULL,
                    PRIMARY KEY (channel_id, user_id)
                );

                CREATE TABLE IF NOT EXISTS messages (
                    id TEXT PRIMARY KEY,
                    channel_id TEXT NOT NULL REFERENCES channels(id),
                    sender_id TEXT NOT NULL REFERENCES users(id),
                    content TEXT NOT NULL,
                    mentions TEXT,
                    parent_id TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_messages_channel_created
                    ON messages(channel_id, created_at);

                CREATE TABLE IF NOT EXISTS feature_requests (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'open',
                    created_by TEXT NOT NULL REFERENCES users(id),
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS feature_votes (
                    feature_id TEXT NOT NULL REFERENCES feature_requests(id),
                    user_id TEXT NOT NULL REFERENCES users(id),
                    vote INTEGER NOT NULL,
                    PRIMARY KEY (feature_id, user_id)
                );",
            )?;
        }

        self.seed_builtins().await
    }

    /// Seed the system agent and the #general channel on first boot.
    async fn seed_builtins(&self) -> Result<()> {
        let now = self.now().await?;
        let db = self.db.lock().await;

        let creator_exists: bool = db
            .query_row(
                "SELECT COUNT(*) FROM agents WHERE agent_name = ?1",
                rusqlite::params![CREATOR_NAME],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n > 0)?;

        if !creator_exists {
            let user_id = uuid::Uuid::new_v4().to_string();
            db.execute(
                "INSERT INTO users (id, name, type, created_at) VALUES (?1, ?2, 'agent', ?3)",
                rusqlite::params![user_id, CREATOR_NAME, now],
            )?;
            db.execute(
                "INSERT INTO agents (id, agent_name, agent_type, project_path, project_name, status)
                 VALUES (?1, ?2, 'system', '', 'talkto', 'online')",
                rusqlite::params![user_id, CREATOR_NAME],
            )?;
        }

        let general_exists: bool = db
            .query_row(
                "SELECT COUNT(*) FROM channels WHERE name = ?1",
                rusqlite::params![GENERAL_CHANNEL],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n > 0)?;

        if !general_exists {
            db.execute(
                "INSERT INTO channels (id, name, type, created_by, created_at)
                 VALUES (?1, ?2, 'general', 'system', ?3)",
                rusqlite::params![uuid::Uuid::new_v4().to_string(), GENERAL_CHANNEL, now],
            )?;
        }

        Ok(())
    }

    /// ISO-8601 UTC timestamp, stamped by SQLite so every row shares one clock.
    pub(crate) async fn now(&self) -> Result<String> {
        let db = self.db.lock().await;
        let ts: String = db.query_row(
            "SELECT strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            [],
            |row| row.get(0),
        )?;
        Ok(ts)
    }

    pub(crate) fn db(&self) -> Arc<Mutex<Connection>> {
        self.db.clone()
    }
}
