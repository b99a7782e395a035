use crate::domain::models::{SessionConfig, SessionPhase, TaskRef, TaskStatus};
use crate::infrastructure::error::CoreError;
use chrono::{DateTime, Utc};

/// Outcome of one tick evaluation. The deadline check runs before any phase
/// logic, so an expired task is never advanced into a new phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickTransition {
    Counted,
    BreakStarted { completed_session: u32 },
    WorkStarted { session_index: u32 },
    RunCompleted { task: TaskRef },
    DeadlineExpired { task: TaskRef },
}

impl TickTransition {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunCompleted { .. } | Self::DeadlineExpired { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusSession {
    config: SessionConfig,
    current_session_index: u32,
    phase: SessionPhase,
    remaining_seconds: u32,
    running: bool,
    selected_task: Option<TaskRef>,
}

impl Default for FocusSession {
    fn default() -> Self {
        Self {
            config: SessionConfig::default(),
            current_session_index: 1,
            phase: SessionPhase::Work,
            remaining_seconds: 0,
            running: false,
            selected_task: None,
        }
    }
}

impl FocusSession {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn current_session_index(&self) -> u32 {
        self.current_session_index
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn selected_task(&self) -> Option<&TaskRef> {
        self.selected_task.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        !self.running && self.remaining_seconds == 0
    }

    /// A paused run keeps its countdown and can be resumed; an idle session
    /// has nothing left to resume.
    pub fn is_paused(&self) -> bool {
        !self.running && self.remaining_seconds > 0
    }

    pub fn start(&mut self, config: SessionConfig, task: TaskRef) -> Result<(), CoreError> {
        config.validate().map_err(CoreError::InvalidConfig)?;
        task.validate().map_err(CoreError::InvalidConfig)?;
        if task.status != TaskStatus::InProgress {
            return Err(CoreError::TaskNotInProgress(task.status.as_str().to_string()));
        }
        if self.running {
            return Err(CoreError::InvalidConfig(
                "timer must be idle before start".to_string(),
            ));
        }

        self.config = config;
        self.current_session_index = 1;
        self.phase = SessionPhase::Work;
        self.remaining_seconds = config.work_duration_seconds;
        self.running = true;
        self.selected_task = Some(task);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), CoreError> {
        if !self.running {
            return Err(CoreError::InvalidConfig("timer is not running".to_string()));
        }
        self.running = false;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), CoreError> {
        if self.running {
            return Err(CoreError::InvalidConfig("timer is already running".to_string()));
        }
        if !self.is_paused() {
            return Err(CoreError::InvalidConfig("timer is not paused".to_string()));
        }
        if self.selected_task.is_none() {
            return Err(CoreError::NoTaskSelected);
        }
        self.running = true;
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::idle();
    }

    /// Evaluate one tick. Returns `None` when the session is not running;
    /// exactly one transition is applied per call otherwise.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<TickTransition> {
        if !self.running {
            return None;
        }

        if self
            .selected_task
            .as_ref()
            .is_some_and(|task| now >= task.due_time)
        {
            let task = self.selected_task.take()?;
            self.clear_to_idle();
            return Some(TickTransition::DeadlineExpired { task });
        }

        match self.phase {
            SessionPhase::Work => {
                if self.remaining_seconds > 1 {
                    self.remaining_seconds -= 1;
                    Some(TickTransition::Counted)
                } else if self.current_session_index < self.config.total_sessions {
                    let completed_session = self.current_session_index;
                    self.phase = SessionPhase::Break;
                    self.remaining_seconds = self.config.break_duration_seconds;
                    Some(TickTransition::BreakStarted { completed_session })
                } else {
                    let task = self.selected_task.take()?;
                    self.clear_to_idle();
                    Some(TickTransition::RunCompleted { task })
                }
            }
            SessionPhase::Break => {
                if self.remaining_seconds > 1 {
                    self.remaining_seconds -= 1;
                    Some(TickTransition::Counted)
                } else {
                    self.current_session_index += 1;
                    self.phase = SessionPhase::Work;
                    self.remaining_seconds = self.config.work_duration_seconds;
                    Some(TickTransition::WorkStarted {
                        session_index: self.current_session_index,
                    })
                }
            }
        }
    }

    fn clear_to_idle(&mut self) {
        self.current_session_index = 1;
        self.phase = SessionPhase::Work;
        self.remaining_seconds = 0;
        self.running = false;
        self.selected_task = None;
    }
}
