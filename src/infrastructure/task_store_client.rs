use crate::domain::models::{TaskRef, TaskStatus};
use crate::infrastructure::error::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use url::Url;

/// Fields sent with a status change. `due_date` carries the adjusted
/// deadline when a task expires and the unchanged deadline otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusUpdate {
    pub status: TaskStatus,
    pub start_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

#[async_trait]
pub trait TaskStoreClient: Send + Sync {
    async fn fetch_tasks_in_progress(
        &self,
        access_token: &str,
        user_id: &str,
    ) -> Result<Vec<TaskRef>, CoreError>;

    async fn update_task_status(
        &self,
        access_token: &str,
        task_id: &str,
        update: &TaskStatusUpdate,
    ) -> Result<(), CoreError>;

    async fn delete_task(&self, access_token: &str, task_id: &str) -> Result<(), CoreError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTaskStoreClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, serde::Deserialize)]
struct TaskListEnvelope {
    data: Option<Vec<TaskPayload>>,
}

#[derive(Debug, serde::Deserialize)]
struct TaskPayload {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    status: Option<String>,
    #[serde(rename = "startDate")]
    start_date: Option<String>,
    #[serde(rename = "dueDate")]
    due_date: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct TaskStatusUpdateRequest<'a> {
    status: &'a str,
    #[serde(rename = "startDate")]
    start_date: String,
    #[serde(rename = "dueDate")]
    due_date: String,
}

impl ReqwestTaskStoreClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), CoreError> {
        if value.trim().is_empty() {
            return Err(CoreError::Api(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn api_http_error(status: reqwest::StatusCode, body: &str) -> CoreError {
        let message = if body.trim().is_empty() {
            format!("task store api error: http {}", status.as_u16())
        } else {
            format!("task store api error: http {}; body={body}", status.as_u16())
        };
        CoreError::Api(message)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, CoreError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|error| CoreError::Api(format!("invalid task store base url: {error}")))?;
        {
            let mut path_segments = url
                .path_segments_mut()
                .map_err(|_| CoreError::Api("task store base URL cannot be a base".to_string()))?;
            path_segments.pop_if_empty();
            for segment in segments {
                path_segments.push(segment);
            }
        }
        Ok(url)
    }

    fn payload_to_task(payload: TaskPayload) -> Option<TaskRef> {
        let id = payload.id.trim();
        if id.is_empty() {
            return None;
        }
        let title = payload.name.trim();
        if title.is_empty() {
            return None;
        }

        // The eligible-task endpoint only returns in-progress work; entries
        // that omit the field are treated accordingly, unknown spellings are
        // skipped rather than guessed at.
        let status = match payload.status.as_deref() {
            Some(raw) => TaskStatus::parse(raw)?,
            None => TaskStatus::InProgress,
        };
        let start_time = parse_wire_time(payload.start_date.as_deref()?)?;
        let due_time = parse_wire_time(payload.due_date.as_deref()?)?;

        Some(TaskRef {
            id: id.to_string(),
            title: title.to_string(),
            status,
            start_time,
            due_time,
        })
    }
}

fn parse_wire_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|value| value.with_timezone(&Utc))
}

#[async_trait]
impl TaskStoreClient for ReqwestTaskStoreClient {
    async fn fetch_tasks_in_progress(
        &self,
        access_token: &str,
        user_id: &str,
    ) -> Result<Vec<TaskRef>, CoreError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(user_id, "user id")?;

        let endpoint = self.endpoint(&["task", "getOptionTasks", user_id])?;
        let response = self
            .client
            .get(endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|error| {
                CoreError::Api(format!("network error while fetching tasks: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            CoreError::Api(format!("failed reading task list response: {error}"))
        })?;

        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }

        let parsed: TaskListEnvelope = serde_json::from_str(&body).map_err(|error| {
            CoreError::Api(format!("invalid task list payload: {error}; body={body}"))
        })?;

        Ok(parsed
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(Self::payload_to_task)
            .collect())
    }

    async fn update_task_status(
        &self,
        access_token: &str,
        task_id: &str,
        update: &TaskStatusUpdate,
    ) -> Result<(), CoreError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(task_id, "task id")?;

        let endpoint = self.endpoint(&["task", "updateTask", task_id])?;
        let request = TaskStatusUpdateRequest {
            status: update.status.as_str(),
            start_date: update.start_date.to_rfc3339(),
            due_date: update.due_date.to_rfc3339(),
        };

        let response = self
            .client
            .put(endpoint)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                CoreError::Api(format!("network error while updating task status: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            CoreError::Api(format!("failed reading task update response: {error}"))
        })?;

        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Ok(())
    }

    async fn delete_task(&self, access_token: &str, task_id: &str) -> Result<(), CoreError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(task_id, "task id")?;

        let endpoint = self.endpoint(&["task", "deleteTask", task_id])?;
        let response = self
            .client
            .delete(endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|error| {
                CoreError::Api(format!("network error while deleting task: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            CoreError::Api(format!("failed reading task delete response: {error}"))
        })?;

        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Ok(())
    }
}
