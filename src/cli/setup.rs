use anyhow::Result;
use inquire::Text;

use crate::core::config::Settings;
use crate::core::store::Store;
use crate::core::terminal::{print_info, print_step, print_success};

/// Onboarding wizard: create the single human operator record. Safe to
/// re-run; an existing operator short-circuits.
pub async fn run_wizard(settings: &Settings) -> Result<()> {
    print_step("TalkTo setup — who is operating this workspace?");
    println!();

    let store = Store::open(&settings.data_dir).await?;

    if let Some(existing) = store.human_user().await? {
        print_info(&format!(
            "Already onboarded as '{}'. Agents will address you as {}.",
            existing.name,
            existing.display_name.as_deref().unwrap_or(&existing.name)
        ));
        return Ok(());
    }

    let default_name = whoami::username();
    let name = Text::new("Username:")
        .with_default(&default_name)
        .with_help_message("Short handle agents will use, e.g. in logs")
        .prompt()?;

    let display_name = Text::new("Display name:")
        .with_default(&whoami::realname())
        .with_help_message("How agents should address you")
        .prompt()?;

    let about = Text::new("About you (optional):")
        .with_help_message("One line of context agents see in their prompt")
        .prompt_skippable()?
        .filter(|s| !s.trim().is_empty());

    let instructions = Text::new("Standing instructions for agents (optional):")
        .prompt_skippable()?
        .filter(|s| !s.trim().is_empty());

    store
        .create_user(
            name.trim(),
            "human",
            Some(display_name.trim()),
            about.as_deref(),
            instructions.as_deref(),
        )
        .await?;

    print_success(&format!("Welcome aboard, {}!", display_name.trim()));
    print_info("Every agent that registers from now on will know who you are.");
    Ok(())
}
