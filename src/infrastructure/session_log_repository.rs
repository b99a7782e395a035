use crate::domain::models::{FocusLog, SessionPhase};
use crate::infrastructure::error::CoreError;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait SessionLogRepository: Send + Sync {
    fn append(&self, log: &FocusLog) -> Result<(), CoreError>;
    fn find_by_id(&self, log_id: &str) -> Result<Option<FocusLog>, CoreError>;
    fn list_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FocusLog>, CoreError>;
}

#[derive(Debug, Clone)]
pub struct SqliteSessionLogRepository {
    db_path: PathBuf,
}

impl SqliteSessionLogRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, CoreError> {
        Connection::open(&self.db_path).map_err(CoreError::from)
    }
}

type LogRow = (
    String,
    String,
    String,
    String,
    u32,
    String,
    Option<String>,
    Option<String>,
);

fn row_to_log(row: LogRow) -> Result<FocusLog, CoreError> {
    let (id, task_id, task_title, phase_raw, session_index, started_raw, ended_raw, reason) = row;
    let phase = SessionPhase::parse(&phase_raw).ok_or_else(|| {
        CoreError::InvalidConfig(format!("invalid focus_logs.phase '{phase_raw}'"))
    })?;
    let started_at = parse_stored_time(&started_raw, "focus_logs.started_at")?;
    let ended_at = match ended_raw {
        Some(raw) => Some(parse_stored_time(&raw, "focus_logs.ended_at")?),
        None => None,
    };

    Ok(FocusLog {
        id,
        task_id,
        task_title,
        phase,
        session_index,
        started_at,
        ended_at,
        interruption_reason: reason,
    })
}

fn parse_stored_time(raw: &str, field_name: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| CoreError::InvalidConfig(format!("invalid {field_name} '{raw}': {error}")))
}

impl SessionLogRepository for SqliteSessionLogRepository {
    fn append(&self, log: &FocusLog) -> Result<(), CoreError> {
        log.validate().map_err(CoreError::InvalidConfig)?;
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO focus_logs
               (id, task_id, task_title, phase, session_index, started_at, ended_at, interruption_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
               ended_at = excluded.ended_at,
               interruption_reason = excluded.interruption_reason",
            params![
                log.id,
                log.task_id,
                log.task_title,
                log.phase.as_str(),
                log.session_index,
                log.started_at.to_rfc3339(),
                log.ended_at.map(|value| value.to_rfc3339()),
                log.interruption_reason,
            ],
        )?;
        Ok(())
    }

    fn find_by_id(&self, log_id: &str) -> Result<Option<FocusLog>, CoreError> {
        let connection = self.connect()?;
        let row: Option<LogRow> = connection
            .query_row(
                "SELECT id, task_id, task_title, phase, session_index,
                        started_at, ended_at, interruption_reason
                 FROM focus_logs WHERE id = ?1",
                params![log_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()?;

        row.map(row_to_log).transpose()
    }

    fn list_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FocusLog>, CoreError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, task_id, task_title, phase, session_index,
                    started_at, ended_at, interruption_reason
             FROM focus_logs
             WHERE started_at >= ?1 AND started_at <= ?2
             ORDER BY started_at ASC",
        )?;
        let rows = statement.query_map(
            params![start.to_rfc3339(), end.to_rfc3339()],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            },
        )?;

        let mut logs = Vec::new();
        for row in rows {
            logs.push(row_to_log(row?)?);
        }
        Ok(logs)
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessionLogRepository {
    logs: Mutex<Vec<FocusLog>>,
}

impl InMemorySessionLogRepository {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<FocusLog>>, CoreError> {
        self.logs
            .lock()
            .map_err(|error| CoreError::InvalidConfig(format!("log store lock poisoned: {error}")))
    }
}

impl SessionLogRepository for InMemorySessionLogRepository {
    fn append(&self, log: &FocusLog) -> Result<(), CoreError> {
        log.validate().map_err(CoreError::InvalidConfig)?;
        let mut logs = self.lock()?;
        if let Some(existing) = logs.iter_mut().find(|candidate| candidate.id == log.id) {
            *existing = log.clone();
        } else {
            logs.push(log.clone());
        }
        Ok(())
    }

    fn find_by_id(&self, log_id: &str) -> Result<Option<FocusLog>, CoreError> {
        let logs = self.lock()?;
        Ok(logs.iter().find(|candidate| candidate.id == log_id).cloned())
    }

    fn list_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FocusLog>, CoreError> {
        let logs = self.lock()?;
        let mut selected = logs
            .iter()
            .filter(|log| log.started_at >= start && log.started_at <= end)
            .cloned()
            .collect::<Vec<_>>();
        selected.sort_by(|left, right| left.started_at.cmp(&right.started_at));
        Ok(selected)
    }
}
