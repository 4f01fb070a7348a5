use anyhow::Result;
use console::style;

use crate::core::config::Settings;
use crate::core::terminal::{GuideSection, print_error, print_info, print_warn};

fn kill_process(pid: &str) -> std::io::Result<std::process::Output> {
    std::process::Command::new("kill")
        .arg("-15")
        .arg(pid)
        .output()
}

pub async fn server_start(settings: &Settings) -> Result<()> {
    let run_dir = settings.run_dir();
    let pid_file = settings.pid_file();

    std::fs::create_dir_all(&run_dir)?;
    if pid_file.exists() && std::fs::read_to_string(&pid_file).is_ok() {
        print_warn("Daemon is already running. Use 'talkto stop' first.");
        return Ok(());
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(settings.log_file())?;

    let exe = std::env::current_exe()?;
    let mut child_cmd = std::process::Command::new(exe);
    child_cmd.arg("serve");
    child_cmd.arg("--host").arg(&settings.host);
    child_cmd.arg("--port").arg(settings.port.to_string());

    let child = child_cmd
        .stdin(std::process::Stdio::null())
        .stdout(log_file.try_clone()?)
        .stderr(log_file)
        .spawn()?;

    std::fs::write(&pid_file, child.id().to_string())?;

    GuideSection::new("TalkTo Started")
        .status(
            "Status",
            &format!(
                "{} (PID {})",
                style("RUNNING").green().bold(),
                style(child.id()).dim()
            ),
        )
        .link("API", &settings.api_base())
        .link("MCP endpoint", &format!("{}/mcp", settings.api_base()))
        .blank()
        .info(&format!(
            "Point your agents at the MCP endpoint, then run {}.",
            style("talkto setup").cyan().bold()
        ))
        .print();
    println!();

    Ok(())
}

pub async fn server_stop(settings: &Settings) -> Result<()> {
    let pid_file = settings.pid_file();
    let mut daemon_stopped = false;

    if pid_file.exists() {
        if let Ok(pid_str) = std::fs::read_to_string(&pid_file) {
            let pid = pid_str.trim();
            if !pid.is_empty() {
                let _ = kill_process(pid);
                GuideSection::new("TalkTo Stopped")
                    .status(
                        "Status",
                        &format!(
                            "{} (was PID {})",
                            style("STOPPED").red().bold(),
                            style(pid).dim()
                        ),
                    )
                    .print();
                daemon_stopped = true;
            }
        }
        std::fs::remove_file(&pid_file).ok();
    }

    if !daemon_stopped {
        print_info("TalkTo is not currently running.");
    }

    println!();
    Ok(())
}

pub async fn server_status(settings: &Settings) -> Result<()> {
    let pid_file = settings.pid_file();
    if pid_file.exists() {
        let pid_str = std::fs::read_to_string(&pid_file)?;
        GuideSection::new("TalkTo Status")
            .status(
                "Daemon",
                &format!(
                    "{} (PID {})",
                    style("RUNNING").green().bold(),
                    style(pid_str.trim()).dim()
                ),
            )
            .link("API", &settings.api_base())
            .print();
    } else {
        GuideSection::new("TalkTo Status")
            .status("Daemon", &style("STOPPED").red().bold().to_string())
            .blank()
            .info(&format!(
                "Run {} to start it.",
                style("talkto start").cyan().bold()
            ))
            .print();
    }
    println!();
    Ok(())
}

pub async fn follow_logs(settings: &Settings) -> Result<()> {
    let pid_file = settings.pid_file();
    if pid_file.exists() && std::fs::read_to_string(&pid_file).is_ok() {
        let log_file = settings.log_file();
        if log_file.exists() {
            print_info(&format!(
                "Following {} - press {} to stop.",
                style("talkto.log").cyan(),
                style("Ctrl+C").bold().yellow()
            ));
            println!();
            let mut child = std::process::Command::new("tail")
                .arg("-n")
                .arg("200")
                .arg("-f")
                .arg(&log_file)
                .spawn()?;
            let _ = child.wait()?;
        } else {
            print_error(&format!(
                "Log file not found at {}",
                style(log_file.display()).dim()
            ));
        }
    } else {
        GuideSection::new("Live Logs")
            .warn("TalkTo is not running.")
            .blank()
            .info(&format!(
                "Run {} to start it.",
                style("talkto start").cyan().bold()
            ))
            .print();
        println!();
    }
    Ok(())
}
