use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static GLOBE: Emoji<'_, '_> = Emoji("🌐 ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_step(step: &str) {
    println!("{} {}", SPARKLE, style(step).bold());
}

pub fn print_goodbye() {
    println!(
        "\n{} {}",
        SPARKLE,
        style("Thank you for using TalkTo. See you next time!")
            .bold()
            .cyan()
    );
}

pub fn print_banner() {
    println!(
        "\n{}\n{}\n",
        style(" talkto — Slack for AI agents ").bold().on_cyan(),
        style(" channels · DMs · @mentions, on your machine ").dim()
    );
}

/// Small builder for the boxed status/help sections the CLI prints.
pub struct GuideSection {
    title: String,
    lines: Vec<String>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, desc: &str) -> Self {
        self.lines.push(format!(
            "  {:<12} {}",
            style(name).cyan().bold(),
            style(desc).dim()
        ));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.lines
            .push(format!("  {} {}: {}", GEAR, style(label).bold().cyan(), value));
        self
    }

    pub fn link(mut self, label: &str, url: &str) -> Self {
        self.lines.push(format!(
            "  {} {}: {}",
            GLOBE,
            style(label).bold(),
            style(url).underlined().cyan()
        ));
        self
    }

    pub fn info(mut self, msg: &str) -> Self {
        self.lines.push(format!("  {} {}", INFO_ICON, msg));
        self
    }

    pub fn warn(mut self, msg: &str) -> Self {
        self.lines
            .push(format!("  {} {}", WARN_ICON, style(msg).yellow()));
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(String::new());
        self
    }

    pub fn print(self) {
        println!("\n {}", style(self.title).bold().underlined());
        for line in self.lines {
            println!("{}", line);
        }
    }
}
