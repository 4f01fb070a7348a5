use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

/// The two OS-level questions the liveness pipeline is allowed to ask.
/// Faked in tests so no check ever depends on the real process table.
#[async_trait]
pub trait ProcessProbe: Send + Sync {
    /// Signal-0 check. False for "no such process" AND for permission
    /// errors — when we cannot even signal the PID we treat it as dead.
    fn pid_alive(&self, pid: i64) -> bool;

    /// One textual snapshot of the full process table.
    async fn process_table(&self) -> Result<String>;
}

pub struct NativeProbe;

#[async_trait]
impl ProcessProbe for NativeProbe {
    fn pid_alive(&self, pid: i64) -> bool {
        match std::process::Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .output()
        {
            Ok(out) => out.status.success(),
            Err(_) => false,
        }
    }

    async fn process_table(&self) -> Result<String> {
        let out = tokio::process::Command::new("ps")
            .arg("aux")
            .output()
            .await
            .context("failed to run ps")?;
        Ok(String::from_utf8_lossy(&out.stdout).to_string())
    }
}

/// Does any process-table line prove this session token is live?
///
/// A line only counts if it contains the token and is not a `serve`-form
/// invocation: the daemon that *hosts* sessions always carries the token on
/// its own command line, and must never count as the interactive agent.
pub fn session_in_ps(token: &str, ps_output: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    ps_output
        .lines()
        .any(|line| line.contains(token) && !is_serve_line(line))
}

fn is_serve_line(line: &str) -> bool {
    line.split_whitespace().any(|word| word == "serve")
}

/// Session check against a fresh snapshot. Fails OPEN: if the process table
/// cannot be listed at all (ps missing, sandboxed), assume the session is
/// alive rather than falsely killing a working agent. This is deliberately
/// the opposite polarity of `pid_alive` — do not unify them.
pub async fn session_alive(probe: &dyn ProcessProbe, token: &str) -> bool {
    match probe.process_table().await {
        Ok(ps) => session_in_ps(token, &ps),
        Err(e) => {
            debug!("process table unavailable ({}), assuming session alive", e);
            true
        }
    }
}
