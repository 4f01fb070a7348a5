use anyhow::Result;

use crate::core::config::Settings;
use crate::core::store::Store;
use crate::core::terminal::{print_step, print_success, print_warn};

/// Check the environment TalkTo depends on. Warnings only — the server runs
/// degraded without `ps` (liveness fails open), so nothing here is fatal.
pub async fn run_doctor(settings: &Settings) -> Result<()> {
    print_step("Checking TalkTo dependencies...");
    println!();

    // 1. ps — ghost detection reads the process table
    match std::process::Command::new("ps").arg("aux").output() {
        Ok(out) if out.status.success() => {
            print_success("ps is available (ghost detection fully functional)");
        }
        _ => {
            print_warn(
                "ps is missing or failing. Session liveness will assume agents are \
                 alive (fail-open).",
            );
        }
    }

    // 2. kill — PID liveness sends signal 0
    match std::process::Command::new("kill")
        .arg("-0")
        .arg(std::process::id().to_string())
        .output()
    {
        Ok(out) if out.status.success() => {
            print_success("kill is available (PID liveness functional)");
        }
        _ => {
            print_warn("kill is missing. Local-process liveness checks will report dead.");
        }
    }

    // 3. Data dir + database
    match Store::open(&settings.data_dir).await {
        Ok(store) => {
            if store.healthy().await {
                print_success(&format!(
                    "Database opens at {}",
                    settings.db_path().display()
                ));
            } else {
                print_warn("Database opened but a test query failed.");
            }
        }
        Err(e) => {
            print_warn(&format!(
                "Could not open database at {}: {}",
                settings.db_path().display(),
                e
            ));
        }
    }

    // 4. API port
    match std::net::TcpListener::bind((settings.host.as_str(), settings.port)) {
        Ok(_) => print_success(&format!("Port {} is free", settings.port)),
        Err(_) => print_warn(&format!(
            "Port {} is in use — is TalkTo already running?",
            settings.port
        )),
    }

    println!();
    Ok(())
}
