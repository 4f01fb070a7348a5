//! Prompt text handed to agents at registration time. Plain string templates;
//! the content contract (identity, operator profile, culture, mandatory
//! profile step) matters, not the templating machinery.

use crate::core::store::types::UserRecord;

/// The long-form system prompt a freshly registered agent is asked to adopt.
pub fn render_master_prompt(
    agent_name: &str,
    agent_type: &str,
    project_name: &str,
    operator: Option<&UserRecord>,
) -> String {
    let operator_section = match operator {
        Some(user) => {
            let display = user.display_name.as_deref().unwrap_or(&user.name);
            let about = user.about.as_deref().unwrap_or("(nothing shared yet)");
            let instructions = user
                .agent_instructions
                .as_deref()
                .unwrap_or("(no standing instructions)");
            format!(
                "## Your Operator\n\
                 {display} is the human running this workspace.\n\
                 About them: {about}\n\
                 Standing instructions: {instructions}\n"
            )
        }
        None => "## Your Operator\nNo human has onboarded yet. Introduce yourself in #general \
                 when someone does.\n"
            .to_string(),
    };

    format!(
        "# Welcome to TalkTo\n\
         \n\
         You are **{agent_name}**, a {agent_type} coding agent working on the \
         `{project_name}` project. TalkTo is the shared Slack-style workspace where \
         you, the other agents, and the human operator coordinate.\n\
         \n\
         {operator_section}\
         \n\
         ## Workplace Culture\n\
         Keep it human: short messages, occasional banter, no walls of text. \
         Answer when @mentioned, speak up in #general when you ship something, \
         and DM other agents instead of derailing a channel.\n\
         \n\
         ## MANDATORY first step\n\
         Call the `update_profile` tool now with a one-line description of what \
         you are working on and a personality for yourself. Agents without a \
         profile look like ghosts to everyone else.\n\
         \n\
         ## How to talk\n\
         Use `send_message` with a channel name to post. Use `get_messages` to \
         catch up — @mentions of you are returned first. Never answer a TalkTo \
         message inline in your own terminal; nobody can see it there.\n"
    )
}

/// Short prompt injected into the agent's running session right after
/// registration, telling it where it lives now.
pub fn render_inject_prompt(agent_name: &str, project_channel: &str) -> String {
    format!(
        "FIRST THINGS FIRST: you are now registered on TalkTo as **{agent_name}**.\n\
         Your project channel is {project_channel}; you are also in #general.\n\
         Keep your session ID — you will need it to reconnect after a restart.\n\
         If this project has an AGENTS.md, read it for org-wide conventions before \
         posting. Then call `update_profile` and say hello in {project_channel}.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator() -> UserRecord {
        UserRecord {
            id: "u1".to_string(),
            name: "yash".to_string(),
            user_type: "human".to_string(),
            display_name: Some("Yash".to_string()),
            about: Some("I build cool things".to_string()),
            agent_instructions: Some("Be helpful and concise".to_string()),
            created_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn master_prompt_includes_identity_and_culture() {
        let prompt = render_master_prompt("cosmic-penguin", "opencode", "talkto", None);
        assert!(prompt.contains("cosmic-penguin"));
        assert!(prompt.contains("opencode"));
        assert!(prompt.contains("talkto"));
        assert!(prompt.contains("TalkTo"));
        assert!(prompt.contains("Workplace Culture"));
        assert!(prompt.to_lowercase().contains("banter"));
        assert!(prompt.contains("MANDATORY"));
        assert!(prompt.contains("update_profile"));
    }

    #[test]
    fn master_prompt_with_and_without_operator() {
        let with = render_master_prompt("a", "claude", "p", Some(&operator()));
        assert!(with.contains("Yash"));
        assert!(with.contains("I build cool things"));
        assert!(with.contains("Be helpful and concise"));

        let without = render_master_prompt("a", "claude", "p", None);
        assert!(without.contains("No human has onboarded yet"));
    }

    #[test]
    fn inject_prompt_names_agent_and_channel() {
        let prompt = render_inject_prompt("grumpy-fox", "#project-talkto");
        assert!(prompt.contains("FIRST THINGS FIRST"));
        assert!(prompt.contains("grumpy-fox"));
        assert!(prompt.contains("#project-talkto"));
        assert!(prompt.to_lowercase().contains("session id"));
        assert!(prompt.contains("AGENTS.md"));
    }
}
