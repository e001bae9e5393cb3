//! The `executeCommand` handler.

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap, value};
use conflux_expression::interpolate;
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::process::Command;

/// Runs a shell command and captures its output.
///
/// With an `args` list the command is spawned directly; without one the
/// `command` string goes through `sh -c` so pipelines and redirection work.
/// The child is killed on timeout and on cancellation.
pub struct ExecuteCommandHandler;

#[async_trait]
impl NodeHandler for ExecuteCommandHandler {
    fn node_type(&self) -> &str {
        crate::types::EXECUTE_COMMAND
    }

    async fn execute(
        &self,
        node: &Node,
        input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        ctx.check_cancelled()?;
        let params = &node.parameters;
        let data = Value::Object(input.clone());

        let command = value::str_opt(params, "command")
            .ok_or_else(|| EngineError::handler("executeCommand requires a `command`"))?;
        let command = interpolate(&command, &data, Some(ctx));

        let timeout_ms = value::u64_or(params, "timeoutMs", 60_000);

        let mut cmd = match value::array(params, "args") {
            Some(args) => {
                let mut cmd = Command::new(&command);
                for arg in args {
                    cmd.arg(interpolate(&value::render(arg), &data, Some(ctx)));
                }
                cmd
            }
            None => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(&command);
                cmd
            }
        };

        if let Some(cwd) = value::str_opt(params, "cwd") {
            cmd.current_dir(cwd);
        }
        cmd.kill_on_drop(true);

        let run = cmd.output();
        let output = tokio::select! {
            () = ctx.cancellation.cancelled() => return Err(EngineError::Cancelled),
            result = tokio::time::timeout(Duration::from_millis(timeout_ms), run) => {
                match result {
                    Ok(io_result) => io_result.map_err(|e| {
                        EngineError::handler(format!("failed to run `{command}`: {e}"))
                    })?,
                    Err(_) => {
                        return Err(EngineError::timeout(
                            format!("executeCommand `{command}`"),
                            timeout_ms,
                        ));
                    }
                }
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let mut out = input;
        out.insert(
            "stdout".into(),
            json!(String::from_utf8_lossy(&output.stdout).to_string()),
        );
        out.insert(
            "stderr".into(),
            json!(String::from_utf8_lossy(&output.stderr).to_string()),
        );
        out.insert("exitCode".into(), json!(exit_code));
        out.insert("success".into(), json!(output.status.success()));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use serde_json::json;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let ctx = testing::context();
        let node = testing::node(
            crate::types::EXECUTE_COMMAND,
            json!({"command": "echo hello"}),
        );
        let out = ExecuteCommandHandler
            .execute(&node, JsonMap::new(), &ctx)
            .await
            .unwrap();

        assert_eq!(out.get("exitCode"), Some(&json!(0)));
        assert_eq!(out.get("success"), Some(&json!(true)));
        assert_eq!(
            out.get("stdout").and_then(Value::as_str).map(str::trim),
            Some("hello")
        );
    }

    #[tokio::test]
    async fn interpolates_the_command() {
        let ctx = testing::context();
        let node = testing::node(
            crate::types::EXECUTE_COMMAND,
            json!({"command": "echo ${word}"}),
        );
        let out = ExecuteCommandHandler
            .execute(&node, testing::map(json!({"word": "conflux"})), &ctx)
            .await
            .unwrap();
        assert_eq!(
            out.get("stdout").and_then(Value::as_str).map(str::trim),
            Some("conflux")
        );
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_raised() {
        let ctx = testing::context();
        let node = testing::node(
            crate::types::EXECUTE_COMMAND,
            json!({"command": "exit 3"}),
        );
        let out = ExecuteCommandHandler
            .execute(&node, JsonMap::new(), &ctx)
            .await
            .unwrap();
        assert_eq!(out.get("exitCode"), Some(&json!(3)));
        assert_eq!(out.get("success"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn direct_spawn_with_args() {
        let ctx = testing::context();
        let node = testing::node(
            crate::types::EXECUTE_COMMAND,
            json!({"command": "echo", "args": ["a", "b"]}),
        );
        let out = ExecuteCommandHandler
            .execute(&node, JsonMap::new(), &ctx)
            .await
            .unwrap();
        assert_eq!(
            out.get("stdout").and_then(Value::as_str).map(str::trim),
            Some("a b")
        );
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let ctx = testing::context();
        let node = testing::node(
            crate::types::EXECUTE_COMMAND,
            json!({"command": "sleep 5", "timeoutMs": 50}),
        );
        let err = ExecuteCommandHandler
            .execute(&node, JsonMap::new(), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "timeout");
    }
}
