use crate::domain::models::{
    AuthSession, FocusLog, SessionConfig, SessionPhase, TaskRef, TaskStatus,
};
use crate::domain::session::{FocusSession, TickTransition};
use crate::infrastructure::error::CoreError;
use crate::infrastructure::notifier::{FocusNotification, Notifier};
use crate::infrastructure::session_log_repository::SessionLogRepository;
use crate::infrastructure::task_store_client::{TaskStatusUpdate, TaskStoreClient};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::{Duration as TokioDuration, sleep};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

/// Retry policy for read-only task fetches. Status updates are never
/// retried automatically.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FocusStateResponse {
    pub phase: String,
    pub current_session_index: u32,
    pub total_sessions: u32,
    pub remaining_seconds: u32,
    pub running: bool,
    pub task_id: Option<String>,
    pub task_title: Option<String>,
}

#[derive(Debug)]
struct EngineRuntime {
    session: FocusSession,
    generation: u64,
    run_auth: Option<AuthSession>,
    phase_started_at: Option<DateTime<Utc>>,
    pending_completion: Option<TaskRef>,
}

impl Default for EngineRuntime {
    fn default() -> Self {
        Self {
            session: FocusSession::idle(),
            generation: 0,
            run_auth: None,
            phase_started_at: None,
            pending_completion: None,
        }
    }
}

/// Side effects gathered under the state lock and performed after it is
/// released; the expired update is awaited with no lock held.
struct TickEffects {
    transition: TickTransition,
    generation: u64,
    auth: Option<AuthSession>,
    log: Option<FocusLog>,
    notification: Option<FocusNotification>,
    expired_update: Option<(TaskRef, TaskStatusUpdate)>,
}

pub struct FocusSessionEngine<T, L, N>
where
    T: TaskStoreClient,
    L: SessionLogRepository,
    N: Notifier,
{
    task_store: Arc<T>,
    log_repository: Arc<L>,
    notifier: Arc<N>,
    retry_policy: RetryPolicy,
    now_provider: NowProvider,
    runtime: Mutex<EngineRuntime>,
}

impl<T, L, N> FocusSessionEngine<T, L, N>
where
    T: TaskStoreClient,
    L: SessionLogRepository,
    N: Notifier,
{
    pub fn new(task_store: Arc<T>, log_repository: Arc<L>, notifier: Arc<N>) -> Self {
        Self {
            task_store,
            log_repository,
            notifier,
            retry_policy: RetryPolicy::default(),
            now_provider: Arc::new(Utc::now),
            runtime: Mutex::new(EngineRuntime::default()),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn lock_runtime(&self) -> Result<MutexGuard<'_, EngineRuntime>, CoreError> {
        self.runtime
            .lock()
            .map_err(|error| CoreError::InvalidConfig(format!("engine lock poisoned: {error}")))
    }

    pub fn is_running(&self) -> bool {
        self.lock_runtime()
            .map(|runtime| runtime.session.running())
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> Result<FocusStateResponse, CoreError> {
        let runtime = self.lock_runtime()?;
        Ok(to_state_response(&runtime))
    }

    pub async fn list_eligible_tasks(
        &self,
        auth: &AuthSession,
    ) -> Result<Vec<TaskRef>, CoreError> {
        auth.validate().map_err(CoreError::InvalidConfig)?;
        self.fetch_tasks_with_retry(auth).await
    }

    /// Start a run on the task with the given id. The task is re-fetched so
    /// the status and due-time guards see the canonical record.
    pub async fn start(
        &self,
        auth: &AuthSession,
        task_id: &str,
        config: SessionConfig,
    ) -> Result<FocusStateResponse, CoreError> {
        auth.validate().map_err(CoreError::InvalidConfig)?;
        config.validate().map_err(CoreError::InvalidConfig)?;
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return Err(CoreError::NoTaskSelected);
        }

        let tasks = self.fetch_tasks_with_retry(auth).await?;
        let task = tasks
            .into_iter()
            .find(|candidate| candidate.id == task_id)
            .ok_or(CoreError::NoTaskSelected)?;

        let now = (self.now_provider)();
        let mut runtime = self.lock_runtime()?;
        runtime.session.start(config, task)?;
        runtime.generation += 1;
        runtime.run_auth = Some(auth.clone());
        runtime.phase_started_at = Some(now);
        runtime.pending_completion = None;
        Ok(to_state_response(&runtime))
    }

    /// Pause keeps the countdown so the run can be resumed; the interrupted
    /// phase is closed out in the focus log.
    pub fn pause(&self, reason: Option<String>) -> Result<FocusStateResponse, CoreError> {
        let now = (self.now_provider)();
        let mut runtime = self.lock_runtime()?;

        let interruption_reason = reason
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| "paused".to_string());

        runtime.session.pause()?;
        let log = build_phase_log(&runtime, now, Some(interruption_reason));
        runtime.phase_started_at = None;
        let response = to_state_response(&runtime);
        drop(runtime);

        if let Some(log) = log {
            self.log_repository.append(&log)?;
        }
        Ok(response)
    }

    pub fn resume(&self) -> Result<FocusStateResponse, CoreError> {
        let now = (self.now_provider)();
        let mut runtime = self.lock_runtime()?;
        runtime.session.resume()?;
        runtime.phase_started_at = Some(now);
        Ok(to_state_response(&runtime))
    }

    /// Hard stop: zeroes the state machine and advances the generation so
    /// responses from in-flight status updates are discarded.
    pub fn reset(&self) -> Result<FocusStateResponse, CoreError> {
        let mut runtime = self.lock_runtime()?;
        runtime.session.reset();
        runtime.generation += 1;
        runtime.run_auth = None;
        runtime.phase_started_at = None;
        runtime.pending_completion = None;
        Ok(to_state_response(&runtime))
    }

    /// Called by the task views after a remote delete; a run on the deleted
    /// task cannot continue.
    pub fn handle_task_deleted(&self, task_id: &str) -> Result<bool, CoreError> {
        let mut runtime = self.lock_runtime()?;
        if runtime
            .pending_completion
            .as_ref()
            .is_some_and(|task| task.id == task_id)
        {
            runtime.pending_completion = None;
        }

        let selected = runtime
            .session
            .selected_task()
            .is_some_and(|task| task.id == task_id);
        if selected {
            runtime.session.reset();
            runtime.generation += 1;
            runtime.run_auth = None;
            runtime.phase_started_at = None;
        }
        Ok(selected)
    }

    /// Evaluate one tick. The deadline check happens inside the state
    /// machine before any phase logic; this layer performs the side effects
    /// the transition asks for.
    pub async fn tick(&self) -> Result<Option<TickTransition>, CoreError> {
        let now = (self.now_provider)();
        let effects = {
            let mut runtime = self.lock_runtime()?;
            let phase_before = runtime.session.phase();
            let index_before = runtime.session.current_session_index();
            let total_sessions = runtime.session.config().total_sessions;

            let Some(transition) = runtime.session.tick(now) else {
                return Ok(None);
            };

            let mut effects = TickEffects {
                transition: transition.clone(),
                generation: runtime.generation,
                auth: runtime.run_auth.clone(),
                log: None,
                notification: None,
                expired_update: None,
            };

            match transition {
                TickTransition::Counted => {}
                TickTransition::BreakStarted { completed_session } => {
                    effects.log = build_closed_log(
                        &runtime,
                        SessionPhase::Work,
                        completed_session,
                        now,
                        None,
                    );
                    effects.notification = Some(FocusNotification::SessionCompleted {
                        session_index: completed_session,
                        total_sessions,
                    });
                    runtime.phase_started_at = Some(now);
                }
                TickTransition::WorkStarted { session_index } => {
                    effects.log = build_closed_log(
                        &runtime,
                        SessionPhase::Break,
                        session_index - 1,
                        now,
                        None,
                    );
                    effects.notification = Some(FocusNotification::BreakOver {
                        next_session_index: session_index,
                    });
                    runtime.phase_started_at = Some(now);
                }
                TickTransition::RunCompleted { ref task } => {
                    effects.log = build_closed_log_for_task(
                        &runtime,
                        task,
                        SessionPhase::Work,
                        total_sessions,
                        now,
                        None,
                    );
                    effects.notification = Some(FocusNotification::RunCompleted {
                        task_id: task.id.clone(),
                        task_title: task.title.clone(),
                    });
                    runtime.pending_completion = Some(task.clone());
                    runtime.run_auth = None;
                    runtime.phase_started_at = None;
                }
                TickTransition::DeadlineExpired { ref task } => {
                    effects.log = build_closed_log_for_task(
                        &runtime,
                        task,
                        phase_before,
                        index_before,
                        now,
                        Some("deadline reached".to_string()),
                    );
                    effects.notification = Some(FocusNotification::DeadlineReached {
                        task_id: task.id.clone(),
                        task_title: task.title.clone(),
                    });
                    effects.expired_update = Some((
                        task.clone(),
                        TaskStatusUpdate {
                            status: TaskStatus::Expired,
                            start_date: task.start_time,
                            due_date: now - Duration::seconds(1),
                        },
                    ));
                    runtime.run_auth = None;
                    runtime.phase_started_at = None;
                }
            }

            effects
        };

        if let Some(log) = &effects.log {
            self.log_repository.append(log)?;
        }
        if let Some(notification) = effects.notification {
            self.notifier.notify(notification);
        }

        if let Some((task, update)) = effects.expired_update {
            let result = match effects.auth {
                Some(auth) => {
                    self.task_store
                        .update_task_status(&auth.access_token, &task.id, &update)
                        .await
                }
                None => Err(CoreError::InvalidConfig(
                    "no auth session for status update".to_string(),
                )),
            };

            if let Err(error) = result {
                // A reset or a new run may have superseded this update while
                // it was in flight; stale outcomes are dropped.
                let runtime = self.lock_runtime()?;
                if runtime.generation == effects.generation {
                    self.notifier.notify(FocusNotification::StatusSyncFailed {
                        task_id: task.id,
                        status: TaskStatus::Expired,
                        message: error.to_string(),
                    });
                }
            }
        }

        Ok(Some(effects.transition))
    }

    /// The user confirmed the "mark as completed" offer after a finished
    /// run. The local hand-off is optimistic: a failed update is surfaced
    /// but not rolled back.
    pub async fn confirm_completion(&self, auth: &AuthSession) -> Result<TaskRef, CoreError> {
        auth.validate().map_err(CoreError::InvalidConfig)?;
        let (task, generation) = {
            let mut runtime = self.lock_runtime()?;
            let task = runtime.pending_completion.take().ok_or_else(|| {
                CoreError::InvalidConfig("no completed run awaiting confirmation".to_string())
            })?;
            (task, runtime.generation)
        };

        let update = TaskStatusUpdate {
            status: TaskStatus::Completed,
            start_date: task.start_time,
            due_date: task.due_time,
        };
        match self
            .task_store
            .update_task_status(&auth.access_token, &task.id, &update)
            .await
        {
            Ok(()) => Ok(TaskRef {
                status: TaskStatus::Completed,
                ..task
            }),
            Err(error) => {
                let runtime = self.lock_runtime()?;
                if runtime.generation == generation {
                    self.notifier.notify(FocusNotification::StatusSyncFailed {
                        task_id: task.id.clone(),
                        status: TaskStatus::Completed,
                        message: error.to_string(),
                    });
                }
                Err(CoreError::StatusUpdateFailed(error.to_string()))
            }
        }
    }

    async fn fetch_tasks_with_retry(
        &self,
        auth: &AuthSession,
    ) -> Result<Vec<TaskRef>, CoreError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match self
                .task_store
                .fetch_tasks_in_progress(&auth.access_token, &auth.user_id)
                .await
            {
                Ok(tasks) => return Ok(tasks),
                Err(error) if should_retry(&error) && attempt + 1 < max_attempts => {
                    let delay = self
                        .retry_policy
                        .base_delay_ms
                        .saturating_mul(2u64.saturating_pow(attempt as u32));
                    sleep(TokioDuration::from_millis(delay)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn should_retry(error: &CoreError) -> bool {
    match error {
        CoreError::Api(message) => {
            let message = message.to_ascii_lowercase();
            message.contains("network error")
                || message.contains("timeout")
                || message.contains("timed out")
                || message.contains("temporarily unavailable")
                || message.contains("connection reset")
        }
        _ => false,
    }
}

fn to_state_response(runtime: &EngineRuntime) -> FocusStateResponse {
    let session = &runtime.session;
    let phase = if session.is_idle() {
        "idle"
    } else if session.is_paused() {
        "paused"
    } else {
        session.phase().as_str()
    };

    FocusStateResponse {
        phase: phase.to_string(),
        current_session_index: session.current_session_index(),
        total_sessions: session.config().total_sessions,
        remaining_seconds: session.remaining_seconds(),
        running: session.running(),
        task_id: session.selected_task().map(|task| task.id.clone()),
        task_title: session.selected_task().map(|task| task.title.clone()),
    }
}

fn build_phase_log(
    runtime: &EngineRuntime,
    ended_at: DateTime<Utc>,
    interruption_reason: Option<String>,
) -> Option<FocusLog> {
    let task = runtime.session.selected_task()?;
    build_closed_log_for_task(
        runtime,
        task,
        runtime.session.phase(),
        runtime.session.current_session_index(),
        ended_at,
        interruption_reason,
    )
}

fn build_closed_log(
    runtime: &EngineRuntime,
    phase: SessionPhase,
    session_index: u32,
    ended_at: DateTime<Utc>,
    interruption_reason: Option<String>,
) -> Option<FocusLog> {
    let task = runtime.session.selected_task()?.clone();
    build_closed_log_for_task(
        runtime,
        &task,
        phase,
        session_index,
        ended_at,
        interruption_reason,
    )
}

fn build_closed_log_for_task(
    runtime: &EngineRuntime,
    task: &TaskRef,
    phase: SessionPhase,
    session_index: u32,
    ended_at: DateTime<Utc>,
    interruption_reason: Option<String>,
) -> Option<FocusLog> {
    let started_at = runtime.phase_started_at.unwrap_or(ended_at);
    Some(FocusLog {
        id: next_id("log"),
        task_id: task.id.clone(),
        task_title: task.title.clone(),
        phase,
        session_index,
        started_at,
        ended_at: Some(ended_at),
        interruption_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::notifier::InMemoryNotifier;
    use crate::infrastructure::session_log_repository::InMemorySessionLogRepository;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Default)]
    struct FakeTaskStoreClient {
        tasks: Mutex<Vec<TaskRef>>,
        fetch_failures: Mutex<VecDeque<CoreError>>,
        update_failures: Mutex<VecDeque<CoreError>>,
        update_calls: Mutex<Vec<(String, TaskStatusUpdate)>>,
        fetch_calls: AtomicUsize,
        update_gate: Option<Arc<tokio::sync::Semaphore>>,
    }

    impl FakeTaskStoreClient {
        fn with_tasks(tasks: Vec<TaskRef>) -> Self {
            Self {
                tasks: Mutex::new(tasks),
                ..Self::default()
            }
        }

        fn queue_fetch_failure(&self, error: CoreError) {
            self.fetch_failures
                .lock()
                .expect("fetch failures lock")
                .push_back(error);
        }

        fn queue_update_failure(&self, error: CoreError) {
            self.update_failures
                .lock()
                .expect("update failures lock")
                .push_back(error);
        }

        fn recorded_updates(&self) -> Vec<(String, TaskStatusUpdate)> {
            self.update_calls.lock().expect("update calls lock").clone()
        }
    }

    #[async_trait::async_trait]
    impl TaskStoreClient for FakeTaskStoreClient {
        async fn fetch_tasks_in_progress(
            &self,
            _access_token: &str,
            _user_id: &str,
        ) -> Result<Vec<TaskRef>, CoreError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            let queued = self
                .fetch_failures
                .lock()
                .expect("fetch failures lock")
                .pop_front();
            if let Some(error) = queued {
                return Err(error);
            }
            Ok(self.tasks.lock().expect("tasks lock").clone())
        }

        async fn update_task_status(
            &self,
            _access_token: &str,
            task_id: &str,
            update: &TaskStatusUpdate,
        ) -> Result<(), CoreError> {
            if let Some(gate) = &self.update_gate {
                let permit = gate.acquire().await.expect("gate closed");
                permit.forget();
            }
            self.update_calls
                .lock()
                .expect("update calls lock")
                .push((task_id.to_string(), update.clone()));
            let queued = self
                .update_failures
                .lock()
                .expect("update failures lock")
                .pop_front();
            match queued {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }

        async fn delete_task(
            &self,
            _access_token: &str,
            _task_id: &str,
        ) -> Result<(), CoreError> {
            Ok(())
        }
    }

    type TestEngine =
        FocusSessionEngine<FakeTaskStoreClient, InMemorySessionLogRepository, InMemoryNotifier>;

    struct TestHarness {
        engine: Arc<TestEngine>,
        store: Arc<FakeTaskStoreClient>,
        logs: Arc<InMemorySessionLogRepository>,
        notifier: Arc<InMemoryNotifier>,
        clock: Arc<Mutex<DateTime<Utc>>>,
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn auth() -> AuthSession {
        AuthSession {
            user_id: "user-1".to_string(),
            access_token: "token-abc".to_string(),
            issued_at: fixed_time("2026-03-02T07:00:00Z"),
        }
    }

    fn task_due_at(due: &str) -> TaskRef {
        TaskRef {
            id: "tsk-1".to_string(),
            title: "Finish lab report".to_string(),
            status: TaskStatus::InProgress,
            start_time: fixed_time("2026-03-02T08:00:00Z"),
            due_time: fixed_time(due),
        }
    }

    fn config(work: u32, rest: u32, sessions: u32) -> SessionConfig {
        SessionConfig {
            work_duration_seconds: work,
            break_duration_seconds: rest,
            total_sessions: sessions,
        }
    }

    fn harness(store: FakeTaskStoreClient) -> TestHarness {
        let store = Arc::new(store);
        let logs = Arc::new(InMemorySessionLogRepository::default());
        let notifier = Arc::new(InMemoryNotifier::default());
        let clock = Arc::new(Mutex::new(fixed_time("2026-03-02T09:00:00Z")));
        let clock_handle = Arc::clone(&clock);
        let engine = Arc::new(
            FocusSessionEngine::new(Arc::clone(&store), Arc::clone(&logs), Arc::clone(&notifier))
                .with_retry_policy(RetryPolicy {
                    max_attempts: 1,
                    base_delay_ms: 1,
                })
                .with_now_provider(Arc::new(move || {
                    *clock_handle.lock().expect("clock lock")
                })),
        );
        TestHarness {
            engine,
            store,
            logs,
            notifier,
            clock,
        }
    }

    fn advance_clock(harness: &TestHarness, seconds: i64) {
        let mut clock = harness.clock.lock().expect("clock lock");
        *clock = *clock + Duration::seconds(seconds);
    }

    #[tokio::test]
    async fn start_with_blank_task_id_is_no_task_selected() {
        let harness = harness(FakeTaskStoreClient::with_tasks(vec![]));
        let result = harness.engine.start(&auth(), "   ", config(60, 30, 1)).await;
        assert!(matches!(result, Err(CoreError::NoTaskSelected)));
        assert!(!harness.engine.is_running());
    }

    #[tokio::test]
    async fn start_with_unknown_task_is_no_task_selected() {
        let harness = harness(FakeTaskStoreClient::with_tasks(vec![task_due_at(
            "2026-12-31T00:00:00Z",
        )]));
        let result = harness
            .engine
            .start(&auth(), "tsk-other", config(60, 30, 1))
            .await;
        assert!(matches!(result, Err(CoreError::NoTaskSelected)));
    }

    #[tokio::test]
    async fn start_rejects_task_not_in_progress() {
        let mut task = task_due_at("2026-12-31T00:00:00Z");
        task.status = TaskStatus::Todo;
        let harness = harness(FakeTaskStoreClient::with_tasks(vec![task]));

        let result = harness.engine.start(&auth(), "tsk-1", config(60, 30, 1)).await;
        assert!(matches!(result, Err(CoreError::TaskNotInProgress(_))));
        assert!(!harness.engine.is_running());
    }

    #[tokio::test]
    async fn full_run_notifies_logs_and_parks_completion() {
        let harness = harness(FakeTaskStoreClient::with_tasks(vec![task_due_at(
            "2026-12-31T00:00:00Z",
        )]));
        let started = harness
            .engine
            .start(&auth(), "tsk-1", config(2, 2, 2))
            .await
            .expect("start run");
        assert_eq!(started.phase, "work");
        assert_eq!(started.remaining_seconds, 2);

        let mut terminal = None;
        for _ in 0..12 {
            advance_clock(&harness, 1);
            let transition = harness
                .engine
                .tick()
                .await
                .expect("tick")
                .expect("still running");
            if transition.is_terminal() {
                terminal = Some(transition);
                break;
            }
        }
        assert!(matches!(terminal, Some(TickTransition::RunCompleted { .. })));

        let notifications = harness.notifier.take_events();
        assert_eq!(
            notifications,
            vec![
                FocusNotification::SessionCompleted {
                    session_index: 1,
                    total_sessions: 2,
                },
                FocusNotification::BreakOver {
                    next_session_index: 2,
                },
                FocusNotification::RunCompleted {
                    task_id: "tsk-1".to_string(),
                    task_title: "Finish lab report".to_string(),
                },
            ]
        );

        let logs = harness
            .logs
            .list_between(
                fixed_time("2026-03-02T00:00:00Z"),
                fixed_time("2026-03-03T00:00:00Z"),
            )
            .expect("list logs");
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].phase, SessionPhase::Work);
        assert_eq!(logs[1].phase, SessionPhase::Break);
        assert_eq!(logs[2].phase, SessionPhase::Work);
        assert_eq!(logs[2].session_index, 2);

        // No status update yet; completion waits for the user to confirm.
        assert!(harness.store.recorded_updates().is_empty());

        let completed = harness
            .engine
            .confirm_completion(&auth())
            .await
            .expect("confirm completion");
        assert_eq!(completed.status, TaskStatus::Completed);

        let updates = harness.store.recorded_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "tsk-1");
        assert_eq!(updates[0].1.status, TaskStatus::Completed);
        assert_eq!(updates[0].1.due_date, fixed_time("2026-12-31T00:00:00Z"));
    }

    #[tokio::test]
    async fn deadline_preemption_issues_exactly_one_expired_update() {
        let harness = harness(FakeTaskStoreClient::with_tasks(vec![task_due_at(
            "2026-03-02T09:00:03Z",
        )]));
        harness
            .engine
            .start(&auth(), "tsk-1", config(25 * 60, 5 * 60, 2))
            .await
            .expect("start run");

        for _ in 0..2 {
            advance_clock(&harness, 1);
            let transition = harness.engine.tick().await.expect("tick").expect("running");
            assert_eq!(transition, TickTransition::Counted);
        }
        advance_clock(&harness, 1);
        let transition = harness.engine.tick().await.expect("tick").expect("running");
        assert!(matches!(transition, TickTransition::DeadlineExpired { .. }));

        let snapshot = harness.engine.snapshot().expect("snapshot");
        assert_eq!(snapshot.phase, "idle");
        assert!(snapshot.task_id.is_none());

        let updates = harness.store.recorded_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1.status, TaskStatus::Expired);
        assert_eq!(updates[0].1.due_date, fixed_time("2026-03-02T09:00:02Z"));

        let notifications = harness.notifier.take_events();
        assert_eq!(
            notifications,
            vec![FocusNotification::DeadlineReached {
                task_id: "tsk-1".to_string(),
                task_title: "Finish lab report".to_string(),
            }]
        );

        let logs = harness
            .logs
            .list_between(
                fixed_time("2026-03-02T00:00:00Z"),
                fixed_time("2026-03-03T00:00:00Z"),
            )
            .expect("list logs");
        assert_eq!(logs.len(), 1);
        assert_eq!(
            logs[0].interruption_reason.as_deref(),
            Some("deadline reached")
        );
    }

    #[tokio::test]
    async fn failed_expired_update_notifies_without_rollback() {
        let store = FakeTaskStoreClient::with_tasks(vec![task_due_at("2026-03-02T09:00:01Z")]);
        store.queue_update_failure(CoreError::Api("http 500".to_string()));
        let harness = harness(store);
        harness
            .engine
            .start(&auth(), "tsk-1", config(60, 30, 1))
            .await
            .expect("start run");

        advance_clock(&harness, 1);
        let transition = harness.engine.tick().await.expect("tick").expect("running");
        assert!(matches!(transition, TickTransition::DeadlineExpired { .. }));

        // Local preemption stands even though the remote write failed.
        assert_eq!(harness.engine.snapshot().expect("snapshot").phase, "idle");
        assert_eq!(harness.store.recorded_updates().len(), 1);

        let notifications = harness.notifier.take_events();
        assert_eq!(notifications.len(), 2);
        assert!(matches!(
            notifications[1],
            FocusNotification::StatusSyncFailed {
                status: TaskStatus::Expired,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn stale_generation_discards_failure_notification() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let mut store = FakeTaskStoreClient::with_tasks(vec![task_due_at("2026-03-02T09:00:01Z")]);
        store.update_gate = Some(Arc::clone(&gate));
        store.queue_update_failure(CoreError::Api("http 500".to_string()));
        let harness = harness(store);

        harness
            .engine
            .start(&auth(), "tsk-1", config(60, 30, 1))
            .await
            .expect("start run");
        advance_clock(&harness, 1);

        let engine = Arc::clone(&harness.engine);
        let tick_handle = tokio::spawn(async move { engine.tick().await });
        tokio::task::yield_now().await;

        // The reset advances the generation while the update is in flight.
        harness.engine.reset().expect("reset engine");
        gate.add_permits(1);

        let transition = tick_handle
            .await
            .expect("join tick task")
            .expect("tick result")
            .expect("transition present");
        assert!(matches!(transition, TickTransition::DeadlineExpired { .. }));

        let notifications = harness.notifier.take_events();
        assert!(
            notifications
                .iter()
                .all(|event| !matches!(event, FocusNotification::StatusSyncFailed { .. })),
            "stale failure must be discarded: {notifications:?}"
        );
    }

    #[tokio::test]
    async fn fetch_retries_transient_network_errors() {
        let store = FakeTaskStoreClient::with_tasks(vec![task_due_at("2026-12-31T00:00:00Z")]);
        store.queue_fetch_failure(CoreError::Api(
            "network error while fetching tasks: connection reset".to_string(),
        ));
        let harness_store = Arc::new(store);
        let logs = Arc::new(InMemorySessionLogRepository::default());
        let notifier = Arc::new(InMemoryNotifier::default());
        let engine = FocusSessionEngine::new(
            Arc::clone(&harness_store),
            logs,
            notifier,
        )
        .with_retry_policy(RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 1,
        });

        let tasks = engine
            .list_eligible_tasks(&auth())
            .await
            .expect("fetch after retry");
        assert_eq!(tasks.len(), 1);
        assert_eq!(harness_store.fetch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_does_not_retry_validation_errors() {
        let store = FakeTaskStoreClient::with_tasks(vec![]);
        store.queue_fetch_failure(CoreError::Api("http 401; body=unauthorized".to_string()));
        let harness_store = Arc::new(store);
        let engine = FocusSessionEngine::new(
            Arc::clone(&harness_store),
            Arc::new(InMemorySessionLogRepository::default()),
            Arc::new(InMemoryNotifier::default()),
        )
        .with_retry_policy(RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
        });

        let result = engine.list_eligible_tasks(&auth()).await;
        assert!(result.is_err());
        assert_eq!(harness_store.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pause_logs_interruption_and_resume_continues() {
        let harness = harness(FakeTaskStoreClient::with_tasks(vec![task_due_at(
            "2026-12-31T00:00:00Z",
        )]));
        harness
            .engine
            .start(&auth(), "tsk-1", config(10, 5, 1))
            .await
            .expect("start run");
        advance_clock(&harness, 1);
        let _ = harness.engine.tick().await.expect("tick");

        let paused = harness
            .engine
            .pause(Some("lunch".to_string()))
            .expect("pause run");
        assert_eq!(paused.phase, "paused");
        assert_eq!(paused.remaining_seconds, 9);

        let logs = harness
            .logs
            .list_between(
                fixed_time("2026-03-02T00:00:00Z"),
                fixed_time("2026-03-03T00:00:00Z"),
            )
            .expect("list logs");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].interruption_reason.as_deref(), Some("lunch"));

        let resumed = harness.engine.resume().expect("resume run");
        assert_eq!(resumed.phase, "work");
        assert!(resumed.running);
        assert_eq!(resumed.remaining_seconds, 9);
    }

    #[tokio::test]
    async fn confirm_completion_without_pending_run_is_rejected() {
        let harness = harness(FakeTaskStoreClient::with_tasks(vec![]));
        let result = harness.engine.confirm_completion(&auth()).await;
        assert!(matches!(result, Err(CoreError::InvalidConfig(_))));
        assert!(harness.store.recorded_updates().is_empty());
    }

    #[tokio::test]
    async fn failed_completion_update_reports_status_update_failed() {
        let store = FakeTaskStoreClient::with_tasks(vec![task_due_at("2026-12-31T00:00:00Z")]);
        store.queue_update_failure(CoreError::Api("http 502".to_string()));
        let harness = harness(store);
        harness
            .engine
            .start(&auth(), "tsk-1", config(1, 1, 1))
            .await
            .expect("start run");
        advance_clock(&harness, 1);
        let _ = harness.engine.tick().await.expect("tick");

        let result = harness.engine.confirm_completion(&auth()).await;
        assert!(matches!(result, Err(CoreError::StatusUpdateFailed(_))));
        let notifications = harness.notifier.take_events();
        assert!(notifications.iter().any(|event| matches!(
            event,
            FocusNotification::StatusSyncFailed {
                status: TaskStatus::Completed,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn deleting_selected_task_resets_the_run() {
        let harness = harness(FakeTaskStoreClient::with_tasks(vec![task_due_at(
            "2026-12-31T00:00:00Z",
        )]));
        harness
            .engine
            .start(&auth(), "tsk-1", config(60, 30, 1))
            .await
            .expect("start run");

        assert!(harness.engine.handle_task_deleted("tsk-1").expect("handle delete"));
        let snapshot = harness.engine.snapshot().expect("snapshot");
        assert_eq!(snapshot.phase, "idle");
        assert!(!harness.engine.is_running());

        assert!(!harness.engine.handle_task_deleted("tsk-1").expect("second delete"));
    }
}
