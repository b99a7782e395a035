use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    #[serde(rename = "Todo")]
    Todo,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Completed")]
    Completed,
    #[serde(rename = "Expired")]
    Expired,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "Todo",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Expired => "Expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "todo" => Some(Self::Todo),
            "in progress" | "inprogress" | "in_progress" | "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRef {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "dueTime")]
    pub due_time: DateTime<Utc>,
}

impl TaskRef {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.title, "task.title")?;
        if self.due_time <= self.start_time {
            return Err("task.due_time must be after task.start_time".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub work_duration_seconds: u32,
    pub break_duration_seconds: u32,
    pub total_sessions: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            work_duration_seconds: 25 * 60,
            break_duration_seconds: 5 * 60,
            total_sessions: 1,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.work_duration_seconds == 0 {
            return Err("session.work_duration_seconds must be > 0".to_string());
        }
        if self.break_duration_seconds == 0 {
            return Err("session.break_duration_seconds must be > 0".to_string());
        }
        if self.total_sessions == 0 {
            return Err("session.total_sessions must be >= 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Work,
    Break,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Break => "break",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "work" => Some(Self::Work),
            "break" => Some(Self::Break),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: String,
    pub access_token: String,
    pub issued_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.user_id, "auth.user_id")?;
        validate_non_empty(&self.access_token, "auth.access_token")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FocusLog {
    pub id: String,
    pub task_id: String,
    pub task_title: String,
    pub phase: SessionPhase,
    pub session_index: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub interruption_reason: Option<String>,
}

impl FocusLog {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "log.id")?;
        validate_non_empty(&self.task_id, "log.task_id")?;
        if self.session_index == 0 {
            return Err("log.session_index must be >= 1".to_string());
        }
        if let Some(ended_at) = self.ended_at {
            if ended_at < self.started_at {
                return Err("log.ended_at must be >= log.started_at".to_string());
            }
        }
        Ok(())
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
