use async_trait::async_trait;
use scrivener_queue::prelude::{JobExecutor, JobFailure};
use serde_json::Value;
use tokio::process::Command;

/// Replays a captured command. Payloads look like
/// `{"command": "git", "args": ["fetch"], "cwd": "/some/repo"}`; `args` and
/// `cwd` are optional. Replay is idempotent-tolerant by construction: the
/// commands scrivener captures are safe to run twice.
pub struct ReplayExecutor;

#[async_trait]
impl JobExecutor for ReplayExecutor {
    async fn execute(&self, job_type: &str, payload: &Value) -> Result<(), JobFailure> {
        let program = payload
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| JobFailure::new(format!("{job_type} payload is missing 'command'")))?;
        let args: Vec<&str> = payload
            .get("args")
            .and_then(Value::as_array)
            .map(|args| args.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut command = Command::new(program);
        command.args(&args);
        if let Some(cwd) = payload.get("cwd").and_then(Value::as_str) {
            command.current_dir(cwd);
        }

        let status = command
            .status()
            .await
            .map_err(|e| JobFailure::new(format!("failed to spawn {program}: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(JobFailure::new(format!("{program} exited with {status}")))
        }
    }
}
