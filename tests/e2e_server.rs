//! End-to-end smoke test: boot the real server binary against a throwaway
//! data dir and drive the message flow over HTTP.

use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

struct ServerHarness {
    child: Child,
    pub api_base: String,
    _data_dir: tempfile::TempDir,
}

impl ServerHarness {
    async fn spawn() -> TestResult<Self> {
        let port = find_free_port()?;
        let data_dir = tempfile::TempDir::with_prefix("talkto-e2e-")?;

        let child = Command::new(env!("CARGO_BIN_EXE_talkto"))
            .arg("serve")
            .arg("--host")
            .arg("127.0.0.1")
            .arg("--port")
            .arg(port.to_string())
            .env("TALKTO_DATA_DIR", data_dir.path())
            .env("TALKTO_LIVENESS_INTERVAL_SECS", "3600")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let api_base = format!("http://127.0.0.1:{port}");
        let harness = Self {
            child,
            api_base,
            _data_dir: data_dir,
        };
        harness.wait_for_health().await?;
        Ok(harness)
    }

    async fn wait_for_health(&self) -> TestResult<()> {
        let client = reqwest::Client::new();
        for _ in 0..50 {
            if let Ok(resp) = client
                .get(format!("{}/api/health", self.api_base))
                .send()
                .await
                && resp.status().is_success()
            {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Err("server never became healthy".into())
    }
}

impl Drop for ServerHarness {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn find_free_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

#[tokio::test]
async fn message_flow_over_http() -> TestResult<()> {
    let server = ServerHarness::spawn().await?;
    let client = reqwest::Client::new();

    // Onboard the operator
    let resp = client
        .post(format!("{}/api/users", server.api_base))
        .json(&serde_json::json!({ "name": "yash", "display_name": "Yash" }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 201);

    // #general is seeded at boot
    let channels: serde_json::Value = client
        .get(format!("{}/api/channels", server.api_base))
        .send()
        .await?
        .json()
        .await?;
    let general = channels
        .as_array()
        .and_then(|chs| chs.iter().find(|ch| ch["name"] == "#general"))
        .cloned()
        .ok_or("no #general channel")?;
    let general_id = general["id"].as_str().ok_or("channel id")?;

    // Post a message and read it back
    let resp = client
        .post(format!(
            "{}/api/channels/{}/messages",
            server.api_base, general_id
        ))
        .json(&serde_json::json!({ "content": "hello agents" }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 201);

    let messages: serde_json::Value = client
        .get(format!(
            "{}/api/channels/{}/messages",
            server.api_base, general_id
        ))
        .send()
        .await?
        .json()
        .await?;
    let listed = messages.as_array().ok_or("messages array")?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["content"], "hello agents");

    // The seeded system agent is listed and never a ghost
    let agents: serde_json::Value = client
        .get(format!("{}/api/agents", server.api_base))
        .send()
        .await?
        .json()
        .await?;
    let creator = agents
        .as_array()
        .and_then(|list| list.iter().find(|a| a["agent_name"] == "the_creator"))
        .cloned()
        .ok_or("no system agent")?;
    assert_eq!(creator["is_ghost"], false);

    Ok(())
}

#[tokio::test]
async fn mcp_register_and_post_over_http() -> TestResult<()> {
    let server = ServerHarness::spawn().await?;
    let client = reqwest::Client::new();

    let rpc = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {
            "name": "register",
            "arguments": {
                "agent_type": "opencode",
                "project_path": "/tmp/e2e-project",
                "session_id": "ses_e2e",
            },
        },
    });
    let resp: serde_json::Value = client
        .post(format!("{}/mcp", server.api_base))
        .header("mcp-session-id", "e2e-session")
        .json(&rpc)
        .send()
        .await?
        .json()
        .await?;
    let text = resp["result"]["content"][0]["text"]
        .as_str()
        .ok_or("tool text")?;
    let result: serde_json::Value = serde_json::from_str(text)?;
    assert_eq!(result["project_channel"], "#project-e2e-project");
    let agent_name = result["agent_name"].as_str().ok_or("agent name")?;

    // The new agent is visible over REST
    let agent: serde_json::Value = client
        .get(format!("{}/api/agents/{}", server.api_base, agent_name))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(agent["status"], "online");

    Ok(())
}
