use crate::application::bootstrap::bootstrap_workspace;
use crate::application::engine::{FocusSessionEngine, FocusStateResponse};
use crate::application::runner::SessionRunner;
use crate::domain::models::{AuthSession, SessionConfig, SessionPhase, TaskRef};
use crate::infrastructure::config::{
    SessionContext, clear_session_context, load_session_context, read_api_base_url,
    read_timer_defaults, save_session_context,
};
use crate::infrastructure::credential_store::{CredentialStore, KeyringCredentialStore};
use crate::infrastructure::error::CoreError;
use crate::infrastructure::notifier::{ChannelNotifier, FocusNotification};
use crate::infrastructure::session_log_repository::{
    SessionLogRepository, SqliteSessionLogRepository,
};
use crate::infrastructure::task_store_client::{ReqwestTaskStoreClient, TaskStoreClient};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

type ProductionEngine =
    FocusSessionEngine<ReqwestTaskStoreClient, SqliteSessionLogRepository, ChannelNotifier>;
type ProductionRunner =
    SessionRunner<ReqwestTaskStoreClient, SqliteSessionLogRepository, ChannelNotifier>;

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    credential_store: Arc<dyn CredentialStore>,
    task_store: Arc<ReqwestTaskStoreClient>,
    log_repository: Arc<SqliteSessionLogRepository>,
    engine: Arc<ProductionEngine>,
    runner: ProductionRunner,
    log_guard: Mutex<()>,
}

impl AppState {
    /// Wire the production adapters together. The returned receiver carries
    /// the engine's notifications; the UI shell drains it.
    pub fn new(
        workspace_root: PathBuf,
    ) -> Result<(Self, UnboundedReceiver<FocusNotification>), CoreError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config_dir = workspace_root.join("config");
        let logs_dir = workspace_root.join("logs");

        let api_base_url = read_api_base_url(&config_dir)?;
        let task_store = Arc::new(ReqwestTaskStoreClient::new(api_base_url));
        let log_repository = Arc::new(SqliteSessionLogRepository::new(&bootstrap.database_path));
        let (notifier, notifications) = ChannelNotifier::new();
        let engine = Arc::new(FocusSessionEngine::new(
            Arc::clone(&task_store),
            Arc::clone(&log_repository),
            Arc::new(notifier),
        ));
        let runner = SessionRunner::new(Arc::clone(&engine));

        Ok((
            Self {
                config_dir,
                database_path: bootstrap.database_path,
                logs_dir,
                credential_store: Arc::new(KeyringCredentialStore::default()),
                task_store,
                log_repository,
                engine,
                runner,
                log_guard: Mutex::new(()),
            },
            notifications,
        ))
    }

    /// Swap the credential backend, e.g. when the embedding shell manages
    /// secrets itself.
    pub fn with_credential_store(mut self, credential_store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = credential_store;
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn command_error(&self, command: &str, error: &CoreError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FocusSummaryLogItem {
    pub id: String,
    pub task_id: String,
    pub task_title: String,
    pub phase: String,
    pub session_index: u32,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub interruption_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FocusSummaryResponse {
    pub start: String,
    pub end: String,
    pub completed_count: u32,
    pub interrupted_count: u32,
    pub total_focus_minutes: i64,
    pub logs: Vec<FocusSummaryLogItem>,
}

pub fn sign_in_impl(
    state: &AppState,
    user_id: String,
    access_token: String,
    display_name: Option<String>,
) -> Result<(), CoreError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(CoreError::InvalidConfig(
            "user_id must not be empty".to_string(),
        ));
    }
    let access_token = access_token.trim();
    if access_token.is_empty() {
        return Err(CoreError::InvalidConfig(
            "access_token must not be empty".to_string(),
        ));
    }

    save_session_context(
        state.config_dir(),
        &SessionContext {
            user_id: user_id.to_string(),
            display_name,
        },
    )?;
    state.credential_store.save_session(&AuthSession {
        user_id: user_id.to_string(),
        access_token: access_token.to_string(),
        issued_at: Utc::now(),
    })?;

    state.log_info("sign_in", &format!("signed in user_id={user_id}"));
    Ok(())
}

pub fn sign_out_impl(state: &AppState) -> Result<(), CoreError> {
    state.runner.stop();
    let _ = state.engine.reset()?;
    state.credential_store.clear_session()?;
    clear_session_context(state.config_dir())?;
    state.log_info("sign_out", "cleared session context and credentials");
    Ok(())
}

fn require_auth(state: &AppState) -> Result<AuthSession, CoreError> {
    let context = load_session_context(state.config_dir())?.ok_or_else(|| {
        CoreError::InvalidConfig("not signed in; call sign_in first".to_string())
    })?;
    let session = state.credential_store.load_session()?.ok_or_else(|| {
        CoreError::Credential("no stored credentials; call sign_in first".to_string())
    })?;
    if session.user_id != context.user_id {
        return Err(CoreError::Credential(
            "stored credentials belong to a different user".to_string(),
        ));
    }
    Ok(session)
}

pub async fn list_tasks_in_progress_impl(state: &AppState) -> Result<Vec<TaskRef>, CoreError> {
    let auth = require_auth(state)?;
    let tasks = state.engine.list_eligible_tasks(&auth).await?;
    state.log_info(
        "list_tasks_in_progress",
        &format!("fetched {} eligible tasks", tasks.len()),
    );
    Ok(tasks)
}

pub async fn start_focus_impl(
    state: &AppState,
    task_id: String,
    work_minutes: Option<u32>,
    break_minutes: Option<u32>,
    sessions: Option<u32>,
) -> Result<FocusStateResponse, CoreError> {
    let defaults = read_timer_defaults(state.config_dir())?;
    let config = SessionConfig {
        work_duration_seconds: work_minutes
            .map(|minutes| minutes.saturating_mul(60))
            .unwrap_or(defaults.work_duration_seconds),
        break_duration_seconds: break_minutes
            .map(|minutes| minutes.saturating_mul(60))
            .unwrap_or(defaults.break_duration_seconds),
        total_sessions: sessions.unwrap_or(defaults.total_sessions),
    };

    let auth = require_auth(state)?;
    let response = state.engine.start(&auth, &task_id, config).await?;
    state.runner.start();

    state.log_info(
        "start_focus",
        &format!(
            "started task_id={} sessions={} work_seconds={}",
            task_id.trim(),
            config.total_sessions,
            config.work_duration_seconds
        ),
    );
    Ok(response)
}

pub fn pause_focus_impl(
    state: &AppState,
    reason: Option<String>,
) -> Result<FocusStateResponse, CoreError> {
    let response = state.engine.pause(reason)?;
    state.runner.stop();
    state.log_info("pause_focus", "paused active focus session");
    Ok(response)
}

pub fn resume_focus_impl(state: &AppState) -> Result<FocusStateResponse, CoreError> {
    let response = state.engine.resume()?;
    state.runner.start();
    state.log_info("resume_focus", "resumed paused focus session");
    Ok(response)
}

pub fn reset_focus_impl(state: &AppState) -> Result<FocusStateResponse, CoreError> {
    state.runner.stop();
    let response = state.engine.reset()?;
    state.log_info("reset_focus", "reset focus session to idle");
    Ok(response)
}

pub fn get_focus_state_impl(state: &AppState) -> Result<FocusStateResponse, CoreError> {
    state.engine.snapshot()
}

pub async fn mark_task_completed_impl(state: &AppState) -> Result<TaskRef, CoreError> {
    let auth = require_auth(state)?;
    let task = state.engine.confirm_completion(&auth).await?;
    state.log_info(
        "mark_task_completed",
        &format!("marked task_id={} completed", task.id),
    );
    Ok(task)
}

pub async fn delete_task_impl(state: &AppState, task_id: String) -> Result<(), CoreError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(CoreError::InvalidConfig(
            "task_id must not be empty".to_string(),
        ));
    }

    let auth = require_auth(state)?;
    state
        .task_store
        .delete_task(&auth.access_token, task_id)
        .await?;
    if state.engine.handle_task_deleted(task_id)? {
        state.runner.stop();
        state.log_info(
            "delete_task",
            &format!("deleted task_id={task_id}; active run was reset"),
        );
    } else {
        state.log_info("delete_task", &format!("deleted task_id={task_id}"));
    }
    Ok(())
}

pub fn get_focus_summary_impl(
    state: &AppState,
    start: Option<String>,
    end: Option<String>,
) -> Result<FocusSummaryResponse, CoreError> {
    let default_start = Utc::now() - Duration::days(7);
    let start = match start {
        Some(raw) => parse_datetime_input(&raw, "start")?,
        None => default_start,
    };
    let end = match end {
        Some(raw) => parse_datetime_input(&raw, "end")?,
        None => Utc::now(),
    };
    if end <= start {
        return Err(CoreError::InvalidConfig(
            "end must be greater than start".to_string(),
        ));
    }

    let logs_in_range = state.log_repository.list_between(start, end)?;

    let completed_count = logs_in_range
        .iter()
        .filter(|log| log.phase == SessionPhase::Work && log.interruption_reason.is_none())
        .count() as u32;
    let interrupted_count = logs_in_range
        .iter()
        .filter(|log| log.interruption_reason.is_some())
        .count() as u32;
    let total_focus_minutes = logs_in_range
        .iter()
        .filter(|log| log.phase == SessionPhase::Work)
        .filter_map(|log| {
            log.ended_at
                .map(|ended_at| (ended_at - log.started_at).num_minutes())
        })
        .filter(|minutes| *minutes > 0)
        .sum();

    let logs = logs_in_range
        .into_iter()
        .map(|log| FocusSummaryLogItem {
            id: log.id,
            task_id: log.task_id,
            task_title: log.task_title,
            phase: log.phase.as_str().to_string(),
            session_index: log.session_index,
            started_at: log.started_at.to_rfc3339(),
            ended_at: log.ended_at.map(|value| value.to_rfc3339()),
            interruption_reason: log.interruption_reason,
        })
        .collect::<Vec<_>>();

    Ok(FocusSummaryResponse {
        start: start.to_rfc3339(),
        end: end.to_rfc3339(),
        completed_count,
        interrupted_count,
        total_focus_minutes,
        logs,
    })
}

fn parse_datetime_input(value: &str, field_name: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            CoreError::InvalidConfig(format!("{field_name} must be RFC3339 date-time: {error}"))
        })
}
