use std::path::PathBuf;

/// TalkTo configuration — all values overridable via `TALKTO_*` env vars.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub log_level: String,
    /// Seconds between liveness reconciliation passes.
    pub liveness_interval_secs: u64,
    /// How many recent messages are flattened into @mention invocation context.
    pub context_limit: usize,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("TALKTO_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        Self {
            host: env_or("TALKTO_HOST", "127.0.0.1".to_string()),
            port: env_or("TALKTO_PORT", 8000),
            data_dir,
            log_level: env_or("TALKTO_LOG_LEVEL", "INFO".to_string()),
            liveness_interval_secs: env_or("TALKTO_LIVENESS_INTERVAL_SECS", 30),
            context_limit: env_or("TALKTO_CONTEXT_LIMIT", 5),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("talkto.db")
    }

    pub fn run_dir(&self) -> PathBuf {
        self.data_dir.join("run")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.run_dir().join("talkto.pid")
    }

    pub fn log_file(&self) -> PathBuf {
        self.run_dir().join("talkto.log")
    }

    pub fn api_base(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".talkto")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_localhost() {
        let s = Settings::from_env();
        assert_eq!(s.host, "127.0.0.1");
        assert!(s.db_path().ends_with("talkto.db"));
    }
}
