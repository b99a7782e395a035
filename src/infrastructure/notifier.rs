use crate::domain::models::TaskStatus;
use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Events the engine surfaces to the user; presentation is the shell's
/// concern.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FocusNotification {
    SessionCompleted {
        session_index: u32,
        total_sessions: u32,
    },
    BreakOver {
        next_session_index: u32,
    },
    RunCompleted {
        task_id: String,
        task_title: String,
    },
    DeadlineReached {
        task_id: String,
        task_title: String,
    },
    StatusSyncFailed {
        task_id: String,
        status: TaskStatus,
        message: String,
    },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: FocusNotification);
}

/// Forwards notifications to the UI shell over an unbounded channel. A
/// closed receiver drops events instead of failing the engine.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<FocusNotification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FocusNotification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: FocusNotification) {
        let _ = self.sender.send(notification);
    }
}

#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    events: Mutex<Vec<FocusNotification>>,
}

impl InMemoryNotifier {
    pub fn take_events(&self) -> Vec<FocusNotification> {
        match self.events.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => Vec::new(),
        }
    }

    pub fn events(&self) -> Vec<FocusNotification> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => Vec::new(),
        }
    }
}

impl Notifier for InMemoryNotifier {
    fn notify(&self, notification: FocusNotification) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(notification);
        }
    }
}
