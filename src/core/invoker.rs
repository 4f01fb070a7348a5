//! Out-of-band agent invocation: prompt formatting, the transport seam, and
//! the per-message dispatch pipeline (DM targets + @mentions).

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::core::broadcast::{Broadcaster, agent_typing_event};
use crate::core::ghost::is_agent_ghost;
use crate::core::liveness::ProcessProbe;
use crate::core::store::Store;
use crate::core::store::dm_target;
use crate::core::store::types::{AgentRecord, AgentType};
use crate::core::tasks::{BackgroundTasks, TaskHandle};

/// Build the text payload an invoked agent receives. Every prompt ends with a
/// mandatory-reply footer — the invoked process has no other channel back to
/// TalkTo, so a prompt without that instruction is a dead letter.
pub fn format_invocation_prompt(
    sender_name: &str,
    channel_name: &str,
    content: &str,
    recent_context: Option<&str>,
) -> String {
    let header = if dm_target(channel_name).is_some() {
        format!("Direct message from {sender_name} in \"{channel_name}\":")
    } else {
        format!("{sender_name} mentioned you in {channel_name}:")
    };

    let mut prompt = format!("{header}\n\n{content}\n");

    if let Some(context) = recent_context.filter(|c| !c.is_empty()) {
        prompt.push_str(&format!("\nRecent messages:\n{context}\n"));
    }

    prompt.push_str(&format!(
        "\nYou MUST reply using your TalkTo `send_message` tool with channel \"{channel_name}\". \
         Do NOT reply inline — nobody can see output that is not posted back to TalkTo."
    ));
    prompt
}

/// The out-of-band call that makes an external agent process act on a prompt.
/// Only the success/failure outcome is part of the contract.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn invoke(&self, agent: &AgentRecord, prompt: &str) -> Result<()>;
}

/// Real transport: opencode agents are reached over their local server
/// session; CLI agents get a resumed headless run of their own binary.
pub struct NativeTransport {
    http: reqwest::Client,
}

impl NativeTransport {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for NativeTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentTransport for NativeTransport {
    async fn invoke(&self, agent: &AgentRecord, prompt: &str) -> Result<()> {
        match &agent.agent_type {
            AgentType::System => Ok(()),
            AgentType::Opencode => {
                let endpoint = agent
                    .remote_endpoint
                    .as_deref()
                    .ok_or_else(|| anyhow!("agent '{}' has no remote endpoint", agent.agent_name))?;
                let session = agent.remote_session_id.as_deref().ok_or_else(|| {
                    anyhow!("agent '{}' has no remote session id", agent.agent_name)
                })?;

                let url = format!("{}/session/{}/message", endpoint.trim_end_matches('/'), session);
                self.http
                    .post(&url)
                    .json(&serde_json::json!({
                        "parts": [{ "type": "text", "text": prompt }]
                    }))
                    .send()
                    .await
                    .with_context(|| format!("invoking '{}' at {}", agent.agent_name, url))?
                    .error_for_status()
                    .with_context(|| format!("agent '{}' rejected the prompt", agent.agent_name))?;
                Ok(())
            }
            AgentType::Claude => {
                let session = agent.remote_session_id.as_deref().ok_or_else(|| {
                    anyhow!("agent '{}' has no resumable session", agent.agent_name)
                })?;
                spawn_cli(
                    "claude",
                    &["--resume", session, "--print", prompt],
                    &agent.project_path,
                )
            }
            AgentType::Codex => {
                let session = agent.remote_session_id.as_deref().ok_or_else(|| {
                    anyhow!("agent '{}' has no resumable session", agent.agent_name)
                })?;
                spawn_cli("codex", &["exec", "resume", session, prompt], &agent.project_path)
            }
            AgentType::Custom(kind) => {
                bail!("no invocation transport for agent type '{}'", kind)
            }
        }
    }
}

/// Fire-and-forget CLI launch. Spawn success is the contract — the agent run
/// itself may take minutes and is observed only through its own messages.
fn spawn_cli(program: &str, args: &[&str], cwd: &str) -> Result<()> {
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if !cwd.is_empty() {
        cmd.current_dir(cwd);
    }
    cmd.spawn()
        .map(|_| ())
        .with_context(|| format!("failed to launch '{}'", program))
}

/// Everything one incoming message contributes to invocation routing.
#[derive(Debug, Clone)]
pub struct DispatchParams {
    pub channel_id: String,
    pub channel_name: String,
    pub content: String,
    pub sender_name: String,
    pub mentions: Option<Vec<String>>,
}

/// Decides which agents a message reaches and performs the invocations,
/// bracketing each with typing events. One instance lives in the app context.
pub struct Dispatcher {
    store: Store,
    probe: Arc<dyn ProcessProbe>,
    transport: Arc<dyn AgentTransport>,
    broadcaster: Broadcaster,
    context_limit: usize,
}

impl Dispatcher {
    pub fn new(
        store: Store,
        probe: Arc<dyn ProcessProbe>,
        transport: Arc<dyn AgentTransport>,
        broadcaster: Broadcaster,
        context_limit: usize,
    ) -> Self {
        Self {
            store,
            probe,
            transport,
            broadcaster,
            context_limit,
        }
    }

    /// Detach a dispatch from the request that created the message. The
    /// catch-all boundary lives here: nothing a dispatch does may reach the
    /// caller or the scheduler.
    pub fn spawn_dispatch(
        self: &Arc<Self>,
        tasks: &BackgroundTasks,
        params: DispatchParams,
    ) -> TaskHandle {
        let dispatcher = self.clone();
        tasks.spawn(async move {
            if let Err(e) = dispatcher.dispatch(params).await {
                error!("Unhandled error in fire-and-forget invocation task: {:#}", e);
            }
        })
    }

    /// DM target first, then @mentions minus anything already invoked.
    pub async fn dispatch(&self, params: DispatchParams) -> Result<()> {
        info!(
            "dispatch: channel={} content_len={} mentions={:?}",
            params.channel_name,
            params.content.len(),
            params.mentions
        );
        let mut invoked: Vec<String> = Vec::new();

        if let Some(target) = dm_target(&params.channel_name) {
            let prompt = format_invocation_prompt(
                &params.sender_name,
                &params.channel_name,
                &params.content,
                None,
            );
            if self.invoke_target(target, &params.channel_id, &prompt).await {
                invoked.push(target.to_string());
            }
        }

        if let Some(mentions) = &params.mentions
            && !mentions.is_empty()
        {
            let context = self
                .store
                .recent_context(&params.channel_id, self.context_limit)
                .await
                .unwrap_or_default();
            let context = (!context.is_empty()).then_some(context);

            for mentioned in mentions {
                if invoked.iter().any(|name| name == mentioned) {
                    info!("dispatch: '{}' already invoked via DM, skipping", mentioned);
                    continue;
                }
                let prompt = format_invocation_prompt(
                    &params.sender_name,
                    &params.channel_name,
                    &params.content,
                    context.as_deref(),
                );
                if self.invoke_target(mentioned, &params.channel_id, &prompt).await {
                    invoked.push(mentioned.clone());
                }
            }
        }

        info!("dispatch complete: invoked={:?}", invoked);
        Ok(())
    }

    /// Ghost-check, then invoke inside a typing bracket. The bracket always
    /// closes: every exit path emits a final is_typing=false event.
    async fn invoke_target(&self, agent_name: &str, channel_id: &str, prompt: &str) -> bool {
        match is_agent_ghost(&self.store, self.probe.as_ref(), agent_name).await {
            Ok(false) => {}
            Ok(true) => {
                warn!("skipping ghost agent '{}'", agent_name);
                self.broadcaster.emit(agent_typing_event(
                    agent_name,
                    channel_id,
                    false,
                    Some(&format!("{agent_name} is not reachable")),
                ));
                return false;
            }
            Err(e) => {
                warn!("ghost check failed for '{}': {:#}", agent_name, e);
                self.broadcaster.emit(agent_typing_event(
                    agent_name,
                    channel_id,
                    false,
                    Some(&format!("{agent_name} is not reachable")),
                ));
                return false;
            }
        }

        self.broadcaster
            .emit(agent_typing_event(agent_name, channel_id, true, None));

        let outcome = match self.store.get_agent(agent_name).await {
            Ok(Some(agent)) => self.transport.invoke(&agent, prompt).await,
            Ok(None) => Err(anyhow!("agent '{}' disappeared mid-dispatch", agent_name)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                self.broadcaster
                    .emit(agent_typing_event(agent_name, channel_id, false, None));
                info!("invoked agent '{}'", agent_name);
                true
            }
            Err(e) => {
                warn!("agent '{}' not invocable: {:#}", agent_name, e);
                self.broadcaster.emit(agent_typing_event(
                    agent_name,
                    channel_id,
                    false,
                    Some(&format!("{agent_name} is not reachable")),
                ));
                false
            }
        }
    }
}

/// Pull `@name` tokens out of message content for callers that did not pass
/// an explicit mention list. Only names of registered agents count.
pub async fn extract_mentions(store: &Store, content: &str) -> Result<Vec<String>> {
    let re = regex::Regex::new(r"@([A-Za-z0-9_][A-Za-z0-9_-]*)").expect("static mention pattern");
    let mut mentions = Vec::new();
    for cap in re.captures_iter(content) {
        let name = &cap[1];
        if mentions.iter().any(|m| m == name) {
            continue;
        }
        if store.get_agent(name).await?.is_some() {
            mentions.push(name.to_string());
        }
    }
    Ok(mentions)
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Transport that records invocations and fails for scripted agents.
    #[derive(Default)]
    pub struct FakeTransport {
        pub calls: Mutex<Vec<(String, String)>>,
        pub failing: Mutex<HashSet<String>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_for(&self, agent_name: &str) {
            self.failing.lock().unwrap().insert(agent_name.to_string());
        }

        pub fn invocations(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AgentTransport for FakeTransport {
        async fn invoke(&self, agent: &AgentRecord, prompt: &str) -> Result<()> {
            if self.failing.lock().unwrap().contains(&agent.agent_name) {
                bail!("scripted failure for '{}'", agent.agent_name);
            }
            self.calls
                .lock()
                .unwrap()
                .push((agent.agent_name.clone(), prompt.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::broadcast::WsEvent;
    use crate::core::liveness::fake::FakeProbe;
    use fake::FakeTransport;

    // --- format_invocation_prompt ---

    #[test]
    fn dm_prompt_frames_a_direct_message() {
        let prompt = format_invocation_prompt(
            "cosmic-penguin",
            "#dm-turbo-flamingo",
            "Hey, quick question",
            None,
        );
        assert!(prompt.contains("Direct message from cosmic-penguin"));
        assert!(prompt.contains("\"#dm-turbo-flamingo\""));
        assert!(prompt.contains("Hey, quick question"));
        assert!(prompt.contains("send_message"));
        assert!(prompt.contains("Do NOT reply inline"));
    }

    #[test]
    fn mention_prompt_frames_the_channel() {
        let prompt = format_invocation_prompt(
            "turbo-flamingo",
            "#general",
            "@cosmic-penguin what do you think?",
            None,
        );
        assert!(prompt.contains("turbo-flamingo mentioned you in #general"));
        assert!(prompt.contains("send_message"));
        assert!(prompt.contains("\"#general\""));
        assert!(prompt.contains("@cosmic-penguin what do you think?"));
    }

    #[test]
    fn context_block_is_verbatim_and_optional() {
        let context = "  alice: Hello everyone\n  bob: Hey alice";
        let with = format_invocation_prompt(
            "alice",
            "#general",
            "@bob what do you think?",
            Some(context),
        );
        assert!(with.contains("Recent messages:"));
        assert!(with.contains("  alice: Hello everyone"));
        assert!(with.contains("  bob: Hey alice"));

        let without = format_invocation_prompt("alice", "#general", "Hello", None);
        assert!(!without.contains("Recent messages:"));
    }

    #[test]
    fn every_prompt_carries_the_reply_contract() {
        for channel in ["#dm-test", "#general", "#project-talkto"] {
            let prompt = format_invocation_prompt("sender", channel, "test", None);
            assert!(prompt.contains("MUST reply using your TalkTo"), "{channel}");
        }
    }

    // --- dispatch pipeline ---

    struct Rig {
        store: Store,
        dispatcher: Arc<Dispatcher>,
        transport: Arc<FakeTransport>,
        broadcaster: Broadcaster,
    }

    async fn rig(probe: FakeProbe) -> Rig {
        let store = Store::open_in_memory().await.unwrap();
        let broadcaster = Broadcaster::new(64);
        let transport = Arc::new(FakeTransport::new());
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            Arc::new(probe),
            transport.clone(),
            broadcaster.clone(),
            5,
        ));
        Rig {
            store,
            dispatcher,
            transport,
            broadcaster,
        }
    }

    async fn seed_agent(store: &Store, name: &str, session: Option<&str>) {
        let user = store.create_user(name, "agent", None, None, None).await.unwrap();
        store
            .create_agent(
                &user.id,
                name,
                &AgentType::Opencode,
                "/tmp/proj",
                "proj",
                session.map(|_| "http://localhost:1234"),
                session,
            )
            .await
            .unwrap();
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<WsEvent>) -> Vec<WsEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn dm_params(agent: &str, content: &str, mentions: Option<Vec<String>>) -> DispatchParams {
        DispatchParams {
            channel_id: "chan-1".to_string(),
            channel_name: format!("#dm-{agent}"),
            content: content.to_string(),
            sender_name: "Yash".to_string(),
            mentions,
        }
    }

    #[tokio::test]
    async fn ghost_dm_target_gets_error_event_and_no_invocation() {
        let rig = rig(FakeProbe::with_ps("")).await;
        seed_agent(&rig.store, "ghost-agent", None).await;
        let mut rx = rig.broadcaster.subscribe();

        rig.dispatcher
            .dispatch(dm_params("ghost-agent", "hello?", None))
            .await
            .unwrap();

        assert!(rig.transport.invocations().is_empty());
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "agent_typing");
        assert_eq!(events[0].data["is_typing"], false);
        assert_eq!(events[0].data["error"], "ghost-agent is not reachable");
    }

    #[tokio::test]
    async fn live_dm_target_is_bracketed_with_typing_events() {
        let rig = rig(FakeProbe::with_ps("user 1 ... opencode -s ses_live\n")).await;
        seed_agent(&rig.store, "live-agent", Some("ses_live")).await;
        let mut rx = rig.broadcaster.subscribe();

        rig.dispatcher
            .dispatch(dm_params("live-agent", "hello", None))
            .await
            .unwrap();

        let calls = rig.transport.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "live-agent");
        assert!(calls[0].1.contains("Direct message from Yash"));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data["is_typing"], true);
        assert_eq!(events[1].data["is_typing"], false);
        assert!(events[1].data.get("error").is_none());
    }

    #[tokio::test]
    async fn failed_invocation_closes_bracket_with_error() {
        let rig = rig(FakeProbe::with_ps("user 1 ... opencode -s ses_live\n")).await;
        seed_agent(&rig.store, "flaky-agent", Some("ses_live")).await;
        rig.transport.fail_for("flaky-agent");
        let mut rx = rig.broadcaster.subscribe();

        rig.dispatcher
            .dispatch(dm_params("flaky-agent", "hello", None))
            .await
            .unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data["is_typing"], true);
        assert_eq!(events[1].data["is_typing"], false);
        assert_eq!(events[1].data["error"], "flaky-agent is not reachable");
    }

    #[tokio::test]
    async fn dm_target_mentioned_again_is_invoked_once() {
        let ps = "user 1 ... opencode -s ses_a\nuser 2 ... opencode -s ses_b\n";
        let rig = rig(FakeProbe::with_ps(ps)).await;
        seed_agent(&rig.store, "agent-a", Some("ses_a")).await;
        seed_agent(&rig.store, "agent-b", Some("ses_b")).await;

        rig.dispatcher
            .dispatch(dm_params(
                "agent-a",
                "hey both",
                Some(vec!["agent-a".to_string(), "agent-b".to_string()]),
            ))
            .await
            .unwrap();

        let names: Vec<String> = rig
            .transport
            .invocations()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["agent-a", "agent-b"]);
    }

    #[tokio::test]
    async fn mention_prompt_includes_channel_context() {
        let rig = rig(FakeProbe::with_ps("user 1 ... opencode -s ses_b\n")).await;
        seed_agent(&rig.store, "agent-b", Some("ses_b")).await;

        let sender = rig
            .store
            .create_user("chatty", "agent", None, None, None)
            .await
            .unwrap();
        let ch = rig
            .store
            .create_channel("#general-test", "custom", None, "t")
            .await
            .unwrap();
        rig.store
            .insert_message(&ch.id, &sender.id, "earlier words", None, None)
            .await
            .unwrap();

        rig.dispatcher
            .dispatch(DispatchParams {
                channel_id: ch.id.clone(),
                channel_name: ch.name.clone(),
                content: "@agent-b thoughts?".to_string(),
                sender_name: "chatty".to_string(),
                mentions: Some(vec!["agent-b".to_string()]),
            })
            .await
            .unwrap();

        let calls = rig.transport.invocations();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.contains("Recent messages:"));
        assert!(calls[0].1.contains("  chatty: earlier words"));
    }

    #[tokio::test]
    async fn ghost_mention_is_skipped_but_others_proceed() {
        let rig = rig(FakeProbe::with_ps("user 1 ... opencode -s ses_live\n")).await;
        seed_agent(&rig.store, "dead-one", None).await;
        seed_agent(&rig.store, "live-one", Some("ses_live")).await;

        rig.dispatcher
            .dispatch(DispatchParams {
                channel_id: "chan-9".to_string(),
                channel_name: "#general".to_string(),
                content: "@dead-one @live-one ping".to_string(),
                sender_name: "Yash".to_string(),
                mentions: Some(vec!["dead-one".to_string(), "live-one".to_string()]),
            })
            .await
            .unwrap();

        let names: Vec<String> = rig
            .transport
            .invocations()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["live-one"]);
    }

    #[tokio::test]
    async fn spawned_dispatch_is_tracked_and_swallows_errors() {
        let rig = rig(FakeProbe::with_ps("")).await;
        let tasks = BackgroundTasks::new();

        let handle = rig
            .dispatcher
            .spawn_dispatch(&tasks, dm_params("nobody", "hi", None));
        handle.join.await.unwrap();
        assert_eq!(tasks.live_count(), 0);
    }

    // --- extract_mentions ---

    #[tokio::test]
    async fn mentions_extracted_only_for_registered_agents() {
        let store = Store::open_in_memory().await.unwrap();
        seed_agent(&store, "known-agent", None).await;

        let mentions =
            extract_mentions(&store, "cc @known-agent and @stranger, also @known-agent again")
                .await
                .unwrap();
        assert_eq!(mentions, vec!["known-agent"]);
    }
}
