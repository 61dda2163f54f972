use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use taskhub_core::{
    traits::{ExecutionContext, TaskExecutor},
    TaskHubError, TaskHubResult,
};
use tokio::process::Command;
use tracing::{debug, info};

/// `test` 类型的执行器：不做实际工作，返回处理耗时
#[derive(Debug, Default)]
pub struct EchoExecutor;

#[async_trait]
impl TaskExecutor for EchoExecutor {
    fn task_type(&self) -> &str {
        "test"
    }

    async fn execute(&self, context: &ExecutionContext) -> TaskHubResult<Value> {
        debug!("处理任务数据: {} {}", context.task_id, context.payload);
        let duration = context.started_at.elapsed().as_secs_f64();
        Ok(json!({"output": "processed", "duration": duration}))
    }
}

/// Shell任务参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellTaskParams {
    /// 要执行的命令
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
}

/// Shell任务执行器
///
/// 退出码非0时视为执行失败，错误信息取stderr。
#[derive(Debug, Default)]
pub struct ShellExecutor;

#[async_trait]
impl TaskExecutor for ShellExecutor {
    fn task_type(&self) -> &str {
        "shell"
    }

    async fn execute(&self, context: &ExecutionContext) -> TaskHubResult<Value> {
        let params: ShellTaskParams = serde_json::from_value(context.payload.clone())
            .map_err(|e| TaskHubError::InvalidTaskParams(format!("解析Shell任务参数失败: {e}")))?;

        info!(
            "执行Shell任务: task_id={}, attempt={}, command={}, args={:?}",
            context.task_id, context.attempt, params.command, params.args
        );

        let mut cmd = Command::new(&params.command);
        cmd.args(&params.args)
            .envs(&params.env_vars)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &params.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| TaskHubError::TaskExecution(format!("启动Shell命令失败: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        let exit_code = output.status.code();

        if !output.status.success() {
            let message = if stderr.is_empty() {
                format!("命令执行失败，退出码: {exit_code:?}")
            } else {
                stderr
            };
            return Err(TaskHubError::TaskExecution(message));
        }

        Ok(json!({
            "output": stdout,
            "exit_code": exit_code,
            "duration": context.started_at.elapsed().as_secs_f64(),
        }))
    }
}
