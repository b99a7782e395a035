use crate::domain::models::SessionConfig;
use crate::infrastructure::error::CoreError;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const TIMER_JSON: &str = "timer.json";
const SESSION_JSON: &str = "session.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:4000";

/// Signed-in user recorded in `session.json`. The access token itself lives
/// in the credential store; this file only carries the identity fields the
/// views need between launches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
    pub display_name: Option<String>,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "StudyFlow",
                "apiBaseUrl": DEFAULT_API_BASE_URL
            }),
        ),
        (
            TIMER_JSON,
            serde_json::json!({
                "schema": 1,
                "workMinutes": 25,
                "breakMinutes": 5,
                "sessions": 1
            }),
        ),
        (
            SESSION_JSON,
            serde_json::json!({
                "schema": 1,
                "userId": null,
                "displayName": null
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), CoreError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, CoreError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| CoreError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(CoreError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn read_api_base_url(config_dir: &Path) -> Result<String, CoreError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let base_url = app
        .get("apiBaseUrl")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_API_BASE_URL);
    Ok(base_url.trim_end_matches('/').to_string())
}

pub fn read_timer_defaults(config_dir: &Path) -> Result<SessionConfig, CoreError> {
    let timer = read_config(&config_dir.join(TIMER_JSON))?;
    let read_positive = |key: &str, fallback: u32| -> u32 {
        timer
            .get(key)
            .and_then(serde_json::Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
            .filter(|value| *value > 0)
            .unwrap_or(fallback)
    };

    let config = SessionConfig {
        work_duration_seconds: read_positive("workMinutes", 25) * 60,
        break_duration_seconds: read_positive("breakMinutes", 5) * 60,
        total_sessions: read_positive("sessions", 1),
    };
    config.validate().map_err(CoreError::InvalidConfig)?;
    Ok(config)
}

pub fn load_session_context(config_dir: &Path) -> Result<Option<SessionContext>, CoreError> {
    let session = read_config(&config_dir.join(SESSION_JSON))?;
    let Some(user_id) = session
        .get("userId")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
    else {
        return Ok(None);
    };

    let display_name = session
        .get("displayName")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned);

    Ok(Some(SessionContext {
        user_id,
        display_name,
    }))
}

pub fn save_session_context(config_dir: &Path, context: &SessionContext) -> Result<(), CoreError> {
    let user_id = context.user_id.trim();
    if user_id.is_empty() {
        return Err(CoreError::InvalidConfig(
            "session.userId must not be empty".to_string(),
        ));
    }

    let value = serde_json::json!({
        "schema": 1,
        "userId": user_id,
        "displayName": context
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty()),
    });
    let formatted = serde_json::to_string_pretty(&value)?;
    fs::write(config_dir.join(SESSION_JSON), format!("{formatted}\n"))?;
    Ok(())
}

pub fn clear_session_context(config_dir: &Path) -> Result<(), CoreError> {
    let value = serde_json::json!({
        "schema": 1,
        "userId": null,
        "displayName": null
    });
    let formatted = serde_json::to_string_pretty(&value)?;
    fs::write(config_dir.join(SESSION_JSON), format!("{formatted}\n"))?;
    Ok(())
}
