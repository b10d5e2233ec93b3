//! Thin message-dispatch facade over the engine.
//!
//! Commands arrive as tagged JSON-shaped messages and every response is a
//! `{"success": bool, ...}` object; failures carry a stable machine `code`
//! and a human `message`. Any transport that preserves these shapes (in-
//! process calls, message passing, a local socket) can sit in front.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::activity::{EntryDraft, LogCategory, LogFilter, LogLevel};
use crate::engine::{Engine, SendNowRequest, StartTargetRequest};
use crate::error::WatchError;
use crate::monitor::target::TargetId;
use crate::store::GlobalConfig;

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    StartTarget {
        #[serde(flatten)]
        request: StartTargetRequest,
    },
    StopTarget {
        target_id: TargetId,
    },
    Status {
        target_id: TargetId,
    },
    StatusAll,
    SendNow {
        #[serde(flatten)]
        request: SendNowRequest,
    },
    GetActivityLog {
        #[serde(flatten)]
        filter: LogFilter,
    },
    ClearActivityLog,
    TestWebhook {
        #[serde(default)]
        url: Option<String>,
    },
    GetGlobalConfig,
    SetGlobalConfig {
        #[serde(flatten)]
        global: GlobalConfig,
    },
    ListProfiles,
    SaveProfile {
        name: String,
        body: Value,
    },
    DeleteProfile {
        name: String,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::StartTarget { .. } => "start_target",
            Command::StopTarget { .. } => "stop_target",
            Command::Status { .. } => "status",
            Command::StatusAll => "status_all",
            Command::SendNow { .. } => "send_now",
            Command::GetActivityLog { .. } => "get_activity_log",
            Command::ClearActivityLog => "clear_activity_log",
            Command::TestWebhook { .. } => "test_webhook",
            Command::GetGlobalConfig => "get_global_config",
            Command::SetGlobalConfig { .. } => "set_global_config",
            Command::ListProfiles => "list_profiles",
            Command::SaveProfile { .. } => "save_profile",
            Command::DeleteProfile { .. } => "delete_profile",
        }
    }
}

/// Executes one command and renders its response shape. Errors are both
/// returned to the caller and recorded in the activity log.
pub async fn dispatch_command(engine: &Engine, command: Command) -> Value {
    let name = command.name();
    let result = execute(engine, command).await;
    match result {
        Ok(value) => value,
        Err(e) => {
            debug!(command = name, code = e.code(), "command failed");
            engine
                .activity_log()
                .append(
                    EntryDraft::new(
                        LogLevel::Error,
                        LogCategory::System,
                        format!("command {name} failed: {e}"),
                    )
                    .detail("command", name)
                    .detail("code", e.code()),
                )
                .await;
            json!({
                "success": false,
                "code": e.code(),
                "message": e.to_string(),
            })
        }
    }
}

async fn execute(engine: &Engine, command: Command) -> Result<Value, WatchError> {
    match command {
        Command::StartTarget { request } => {
            let id = engine.start_target(request).await?;
            Ok(json!({"success": true, "targetId": id}))
        }
        Command::StopTarget { target_id } => {
            engine.stop_target(&target_id).await?;
            Ok(json!({"success": true}))
        }
        Command::Status { target_id } => {
            let status = engine.status(&target_id).await?;
            Ok(json!({
                "success": true,
                "isRunning": status.is_running,
                "config": status.config,
            }))
        }
        Command::StatusAll => Ok(json!({
            "success": true,
            "targetIds": engine.status_all(),
        })),
        Command::SendNow { request } => {
            engine.send_now(request).await?;
            Ok(json!({"success": true}))
        }
        Command::GetActivityLog { filter } => {
            let (entries, counts) = engine.get_activity_log(&filter).await;
            Ok(json!({
                "success": true,
                "entries": entries,
                "counts": counts,
            }))
        }
        Command::ClearActivityLog => {
            engine.clear_activity_log().await;
            Ok(json!({"success": true}))
        }
        Command::TestWebhook { url } => {
            engine.test_webhook(url).await?;
            Ok(json!({"success": true}))
        }
        Command::GetGlobalConfig => {
            let global = engine.get_global_config().await?;
            Ok(json!({"success": true, "global": global}))
        }
        Command::SetGlobalConfig { global } => {
            engine.set_global_config(global).await?;
            Ok(json!({"success": true}))
        }
        Command::ListProfiles => {
            let profiles = engine.list_profiles().await?;
            Ok(json!({"success": true, "profiles": profiles}))
        }
        Command::SaveProfile { name, body } => {
            engine.save_profile(&name, &body).await?;
            Ok(json!({"success": true}))
        }
        Command::DeleteProfile { name } => {
            engine.delete_profile(&name).await?;
            Ok(json!({"success": true}))
        }
    }
}
