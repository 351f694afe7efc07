//! Payment-completion polling.
//!
//! After the user is sent to an external checkout page there is no push
//! channel back, so the notice is re-read on a fixed interval until it
//! settles. Each poll runs as one tokio task owned by a [`PollHandle`];
//! dropping the handle stops the task.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::errors::Result;
use crate::structs::NoticeStatus;

/// Anything that can report a notice's current status.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn notice_status(&self, notice_id: &str) -> Result<NoticeStatus>;
}

/// Where a wallet payment stands from the client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Checkout page not yet handed to the browser.
    Redirecting,
    Polling,
    /// Backend reported the notice paid.
    Completed,
    /// Backend reported `Failed` or `Expired`.
    Failed { status: NoticeStatus },
    /// User backed out, or the owning view went away.
    Cancelled,
    /// Deadline passed with the notice still pending.
    TimedOut,
    /// Too many consecutive status checks failed.
    Unknown,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Redirecting | Self::Polling)
    }
}

/// Whether the UI should let the user back out right now. Advisory only;
/// [`PollHandle::cancel`] always works.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelAdvice {
    Allowed,
    /// A status check is in flight and may settle the payment.
    Discouraged,
    /// Already terminal; nothing to cancel.
    Settled,
}

/// Cadence and give-up rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Stop with `TimedOut` after this long. `None` polls forever.
    pub deadline: Option<Duration>,
    /// Stop with `Unknown` after this many failed checks in a row.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            deadline: Some(Duration::from_secs(600)),
            max_consecutive_failures: Some(20),
        }
    }
}

impl PollPolicy {
    /// Poll every 3 seconds with no deadline and no failure cap.
    pub fn unbounded() -> Self {
        Self {
            deadline: None,
            max_consecutive_failures: None,
            ..Self::default()
        }
    }

    fn clamped(self) -> Self {
        Self {
            interval: self.interval.max(MIN_INTERVAL),
            ..self
        }
    }
}

/// Shortest gap between two status checks.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Runs once when the poll settles, with the final state.
pub type OnSettled = Box<dyn FnOnce(PollState) + Send + 'static>;

struct Shared {
    state: watch::Sender<PollState>,
    checking: AtomicBool,
    on_settled: Mutex<Option<OnSettled>>,
}

impl Shared {
    fn begin_polling(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == PollState::Redirecting {
                *state = PollState::Polling;
                true
            } else {
                false
            }
        })
    }

    /// Move to `next` unless already terminal. `run_hook` is false when the
    /// owner is going away without the user having decided anything.
    fn settle(&self, next: PollState, run_hook: bool) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = next;
                true
            }
        });

        if changed {
            tracing::info!(state = ?next, "payment poll settled");
            let hook = self.on_settled.lock().ok().and_then(|mut hook| hook.take());
            if let (true, Some(hook)) = (run_hook, hook) {
                hook(next);
            }
        }
        changed
    }
}

/// Builds poll handles against one status source.
#[derive(Clone)]
pub struct PaymentPoller {
    source: Arc<dyn StatusSource>,
    policy: PollPolicy,
}

impl PaymentPoller {
    /// An `interval` shorter than [`MIN_INTERVAL`] is raised to it.
    pub fn new(source: Arc<dyn StatusSource>, policy: PollPolicy) -> Self {
        Self {
            source,
            policy: policy.clamped(),
        }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// A handle in `Redirecting`. Nothing is polled until
    /// [`PollHandle::begin_polling`].
    pub fn prepare(&self, notice_id: &str, on_settled: Option<OnSettled>) -> PollHandle {
        let (state, receiver) = watch::channel(PollState::Redirecting);
        PollHandle {
            notice_id: notice_id.to_string(),
            source: Arc::clone(&self.source),
            policy: self.policy,
            shared: Arc::new(Shared {
                state,
                checking: AtomicBool::new(false),
                on_settled: Mutex::new(on_settled),
            }),
            receiver,
            task: None,
        }
    }

    /// Start polling right away. Must be called inside a tokio runtime.
    pub fn start(&self, notice_id: &str, on_settled: Option<OnSettled>) -> PollHandle {
        let mut handle = self.prepare(notice_id, on_settled);
        handle.begin_polling();
        handle
    }
}

impl std::fmt::Debug for PaymentPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentPoller")
            .field("policy", &self.policy)
            .finish()
    }
}

/// Owns one running poll. Dropping it stops the timer without running the
/// settle hook, so a pending-payment marker survives view teardown.
pub struct PollHandle {
    notice_id: String,
    source: Arc<dyn StatusSource>,
    policy: PollPolicy,
    shared: Arc<Shared>,
    receiver: watch::Receiver<PollState>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn notice_id(&self) -> &str {
        &self.notice_id
    }

    pub fn state(&self) -> PollState {
        *self.receiver.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.receiver.clone()
    }

    /// `Redirecting → Polling`, spawning the poll task. No-op in any other
    /// state. Must be called inside a tokio runtime.
    pub fn begin_polling(&mut self) {
        if !self.shared.begin_polling() {
            return;
        }

        tracing::info!(
            notice_id = %self.notice_id,
            interval = ?self.policy.interval,
            "polling payment status"
        );

        self.task = Some(tokio::spawn(run(
            Arc::clone(&self.source),
            self.notice_id.clone(),
            self.policy,
            Arc::clone(&self.shared),
        )));
    }

    pub fn cancel_advice(&self) -> CancelAdvice {
        match self.state() {
            state if state.is_terminal() => CancelAdvice::Settled,
            PollState::Polling if self.shared.checking.load(Ordering::SeqCst) => {
                CancelAdvice::Discouraged
            }
            _ => CancelAdvice::Allowed,
        }
    }

    /// User backs out. Stops the timer and settles as `Cancelled` unless the
    /// poll already settled. Returns the final state.
    pub fn cancel(&mut self) -> PollState {
        self.stop_task();
        self.shared.settle(PollState::Cancelled, true);
        self.state()
    }

    /// Wait for a terminal state.
    pub async fn wait(&mut self) -> PollState {
        let waited = self
            .receiver
            .wait_for(|state| state.is_terminal())
            .await
            .map(|state| *state);
        match waited {
            Ok(state) => state,
            Err(_) => self.state(),
        }
    }

    fn stop_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop_task();
        self.shared.settle(PollState::Cancelled, false);
    }
}

impl std::fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle")
            .field("notice_id", &self.notice_id)
            .field("state", &self.state())
            .finish()
    }
}

async fn run(
    source: Arc<dyn StatusSource>,
    notice_id: String,
    policy: PollPolicy,
    shared: Arc<Shared>,
) {
    let started = Instant::now();
    let expiry = expire_at(policy.deadline.map(|deadline| started + deadline));
    tokio::pin!(expiry);

    let mut ticker = tokio::time::interval_at(started + policy.interval, policy.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = &mut expiry => {
                shared.settle(PollState::TimedOut, true);
                return;
            }
            _ = ticker.tick() => {}
        }

        shared.checking.store(true, Ordering::SeqCst);
        let outcome = tokio::select! {
            biased;
            _ = &mut expiry => {
                shared.settle(PollState::TimedOut, true);
                return;
            }
            outcome = source.notice_status(&notice_id) => outcome,
        };
        shared.checking.store(false, Ordering::SeqCst);

        match outcome {
            Ok(NoticeStatus::Pending) => {
                failures = 0;
                tracing::debug!(notice_id = %notice_id, "payment still pending");
            }
            Ok(NoticeStatus::Paid) => {
                shared.settle(PollState::Completed, true);
                return;
            }
            Ok(status) => {
                shared.settle(PollState::Failed { status }, true);
                return;
            }
            Err(err) => {
                failures += 1;
                tracing::warn!(
                    notice_id = %notice_id,
                    error = %err,
                    failures,
                    "payment status check failed"
                );
                if policy
                    .max_consecutive_failures
                    .is_some_and(|max| failures >= max)
                {
                    shared.settle(PollState::Unknown, true);
                    return;
                }
            }
        }
    }
}

fn expire_at(deadline: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    }
}
