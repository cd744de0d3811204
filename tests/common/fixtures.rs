//! Provider payloads, config files, and a CLI harness.

use std::path::PathBuf;

use assert_cmd::Command;
use serde_json::{Value, json};

use vidgate::TestDir;
use vidgate::core::provider::Provider;

/// Smallest byte string the gateway treats as a video.
pub const FAKE_MP4: &[u8] = b"\x00\x00\x00\x18ftypmp42vidgate-test";

pub const TEST_SECRET: &str = "sk-test-0123456789";

// =============================================================================
// Provider payloads
// =============================================================================

/// `GET /videos/{id}` body from the OpenAI Videos API.
pub fn sora_video(id: &str, status: &str, progress: Option<u32>) -> Value {
    let mut body = json!({
        "id": id,
        "object": "video",
        "model": "sora-2",
        "status": status,
        "seconds": "5",
        "size": "1280x720",
    });
    if let Some(progress) = progress {
        body["progress"] = json!(progress);
    }
    body
}

/// `GET /generations/{id}` body from Runway.
pub fn runway_generation(id: &str, status: &str, output_url: Option<&str>) -> Value {
    let mut body = json!({ "id": id, "status": status });
    if let Some(url) = output_url {
        body["output"] = json!([url]);
    }
    body
}

/// Kling task wrapped in its `{code, message, data}` envelope.
pub fn kling_task(task_id: &str, status: &str, video_url: Option<&str>) -> Value {
    let mut data = json!({ "task_id": task_id, "task_status": status });
    if let Some(url) = video_url {
        data["task_result"] = json!({ "videos": [{ "url": url, "duration": "5" }] });
    }
    json!({ "code": 0, "message": "SUCCEED", "data": data })
}

// =============================================================================
// Config
// =============================================================================

/// Config pointing `provider` at `api_base`, with fast polling.
pub fn config_for(provider: Provider, api_base: &str) -> String {
    format!(
        r#"[general]
request_timeout_seconds = 5
fetch_timeout_seconds = 10

[polling]
interval_ms = 10
max_attempts = 20

[providers.{name}]
api_base = "{api_base}"

[output]
color = false
"#,
        name = provider.cli_name()
    )
}

// =============================================================================
// CLI harness
// =============================================================================

/// An isolated data directory and config file for running the binary.
pub struct CliHarness {
    pub dir: TestDir,
}

impl CliHarness {
    /// Harness with the default test config.
    pub fn new() -> Self {
        Self::with_config(&vidgate::make_test_config_toml())
    }

    pub fn with_config(config: &str) -> Self {
        let dir = TestDir::new();
        dir.create_file("config.toml", config);
        Self { dir }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.file_path("data")
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.file_path("config.toml")
    }

    /// `vidgate` with this harness's config and data dir and a clean
    /// environment for everything vidgate reads.
    #[allow(deprecated)]
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("vidgate").expect("vidgate binary");
        for var in [
            "VIDGATE_FORMAT",
            "VIDGATE_TIMEOUT",
            "VIDGATE_POLL_INTERVAL_MS",
            "VIDGATE_POLL_MAX_ATTEMPTS",
            "VIDGATE_PRETTY",
            "VIDGATE_LOG",
            "VIDGATE_LOG_FORMAT",
            "VIDGATE_LOG_FILE",
            "VIDGATE_KEY_OPENAI",
            "VIDGATE_KEY_RUNWAY",
            "VIDGATE_KEY_KLING",
            "RUST_LOG",
        ] {
            cmd.env_remove(var);
        }
        cmd.env("VIDGATE_CONFIG", self.config_path())
            .env("VIDGATE_DATA_DIR", self.data_dir())
            .env("NO_COLOR", "1");
        cmd
    }

    /// As [`Self::cmd`] with a key for `provider` in the environment.
    pub fn cmd_with_key(&self, provider: Provider) -> Command {
        let mut cmd = self.cmd();
        cmd.env(
            vidgate::error::suggestions::env_var_for_key_ref(provider.default_key_ref()),
            TEST_SECRET,
        );
        cmd
    }
}

/// Parse stdout as the JSON envelope.
pub fn envelope(stdout: &[u8]) -> Value {
    let text = String::from_utf8_lossy(stdout);
    serde_json::from_str(text.trim()).unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {text}"))
}
