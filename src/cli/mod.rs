mod daemon;
mod doctor;
mod serve;
mod setup;

use anyhow::Result;
use console::style;

use crate::core::config::Settings;
use crate::core::terminal::{self, GuideSection};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Core")
        .command("serve", "Run the TalkTo server in the foreground")
        .command("setup", "Onboard yourself as the human operator")
        .print();

    GuideSection::new("Management")
        .command("start", "Start the server as a background daemon")
        .command("stop", "Stop the background daemon")
        .command("status", "Show daemon status")
        .command("logs", "Follow real-time daemon logs")
        .print();

    GuideSection::new("Diagnostics")
        .command("doctor", "Check system dependencies")
        .print();

    println!(
        "\n {} {} <command>\n",
        style("Usage:").bold(),
        style("talkto").green()
    );
}

pub(crate) fn parse_server_flags(
    args: &[String],
    start: usize,
    mut host: String,
    mut port: u16,
) -> (String, u16) {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                if i + 1 < args.len() {
                    port = args[i + 1].parse().unwrap_or(port);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--host" => {
                if i + 1 < args.len() {
                    host = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    (host, port)
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let mut settings = Settings::from_env();

    match args.get(1).map(String::as_str) {
        Some("serve") => {
            let (host, port) =
                parse_server_flags(&args, 2, settings.host.clone(), settings.port);
            settings.host = host;
            settings.port = port;
            serve::run_server(settings).await
        }
        Some("start") => {
            let (host, port) =
                parse_server_flags(&args, 2, settings.host.clone(), settings.port);
            settings.host = host;
            settings.port = port;
            daemon::server_start(&settings).await
        }
        Some("stop") => daemon::server_stop(&settings).await,
        Some("status") => daemon::server_status(&settings).await,
        Some("logs") => daemon::follow_logs(&settings).await,
        Some("setup") => setup::run_wizard(&settings).await,
        Some("doctor") => doctor::run_doctor(&settings).await,
        Some("help") | None => {
            print_help();
            Ok(())
        }
        Some(other) => {
            terminal::print_error(&format!("Unknown command '{}'", other));
            print_help();
            Ok(())
        }
    }
}
