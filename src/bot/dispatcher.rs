//! Fan-out of inbound messages to per-user workers, and the polling loop
//! that feeds them.
//!
//! Each user gets one worker task draining one FIFO queue.  History is
//! keyed by user, so a user's messages are handled strictly in the order
//! they arrived even when they write from several chats, while different
//! users proceed concurrently.  The chat id only says where replies go.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::bot::controller::SessionController;
use crate::error::{Error, Result};
use crate::observability::{DELIVERY_ERRORS, SESSIONS_EVICTED};
use crate::telegram::Telegram;
use crate::types::{InboundMessage, UserId};

/// Workers idle for this long are retired.
pub const WORKER_IDLE: Duration = Duration::from_secs(600);

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const POLL_BACKOFF: Duration = Duration::from_secs(5);

struct Worker {
    sender: mpsc::UnboundedSender<InboundMessage>,
    handle: JoinHandle<()>,
    last_used: Instant,
}

/// Routes inbound messages to one sequential worker per user.
pub struct Dispatcher {
    controller: Arc<SessionController>,
    workers: HashMap<UserId, Worker>,
    retiring: HashMap<UserId, JoinHandle<()>>,
}

impl Dispatcher {
    /// Creates a dispatcher with no workers.
    pub fn new(controller: Arc<SessionController>) -> Self {
        Self {
            controller,
            workers: HashMap::new(),
            retiring: HashMap::new(),
        }
    }

    /// Number of live workers.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queues `message` on its sender's worker, starting one if needed.
    pub fn dispatch(&mut self, message: InboundMessage) {
        let user = message.user_id;
        let message = match self.workers.get_mut(&user) {
            Some(worker) => {
                worker.last_used = Instant::now();
                match worker.sender.send(message) {
                    Ok(()) => return,
                    Err(mpsc::error::SendError(message)) => {
                        tracing::warn!(user = %user, "user worker exited; restarting it");
                        message
                    }
                }
            }
            None => message,
        };

        let previous = self
            .workers
            .remove(&user)
            .map(|worker| worker.handle)
            .or_else(|| self.retiring.remove(&user));
        let worker = self.spawn_worker(user, previous);
        if worker.sender.send(message).is_err() {
            tracing::error!(user = %user, "fresh user worker refused a message");
        }
        self.workers.insert(user, worker);
    }

    /// Stops workers that have been idle for longer than `idle`.
    ///
    /// A retired worker finishes whatever it has queued.  If its user
    /// becomes active again, the replacement waits for it before starting,
    /// so ordering survives the handover.
    pub fn retire_idle(&mut self, idle: Duration) -> usize {
        self.retiring.retain(|_, handle| !handle.is_finished());
        let now = Instant::now();
        let stale: Vec<UserId> = self
            .workers
            .iter()
            .filter(|(_, worker)| now.saturating_duration_since(worker.last_used) > idle)
            .map(|(user, _)| *user)
            .collect();
        for user in &stale {
            if let Some(worker) = self.workers.remove(user) {
                drop(worker.sender);
                self.retiring.insert(*user, worker.handle);
            }
        }
        stale.len()
    }

    /// Closes every queue and waits for the workers to drain.
    pub async fn shutdown(mut self) {
        let mut handles: Vec<JoinHandle<()>> = self.retiring.drain().map(|(_, h)| h).collect();
        for (_, worker) in self.workers.drain() {
            drop(worker.sender);
            handles.push(worker.handle);
        }
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "user worker panicked");
            }
        }
    }

    fn spawn_worker(&self, user: UserId, previous: Option<JoinHandle<()>>) -> Worker {
        let (sender, receiver) = mpsc::unbounded_channel();
        let controller = Arc::clone(&self.controller);
        let handle = tokio::spawn(run_worker(controller, user, previous, receiver));
        Worker {
            sender,
            handle,
            last_used: Instant::now(),
        }
    }
}

async fn run_worker(
    controller: Arc<SessionController>,
    user: UserId,
    previous: Option<JoinHandle<()>>,
    mut receiver: mpsc::UnboundedReceiver<InboundMessage>,
) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }
    while let Some(message) = receiver.recv().await {
        let chat = message.chat_id;
        match controller.handle(message).await {
            Ok(outcome) => tracing::debug!(user = %user, chat = %chat, ?outcome, "turn complete"),
            Err(err) => {
                DELIVERY_ERRORS.click();
                tracing::error!(user = %user, chat = %chat, error = %err, "could not deliver to chat");
            }
        }
    }
}

/// Returns true for polling errors that will not go away by waiting.
fn is_fatal_poll_error(err: &Error) -> bool {
    matches!(
        err,
        Error::Messaging {
            code: Some(401 | 404),
            ..
        }
    )
}

/// Long-polls Telegram and dispatches every text message until `shutdown`
/// flips to true.
///
/// When `session_ttl` is set, idle conversations are forgotten on a
/// periodic sweep.
///
/// # Errors
///
/// Returns when Telegram rejects the bot token; transient polling failures
/// are logged and retried.
pub async fn run_polling(
    telegram: Arc<Telegram>,
    controller: Arc<SessionController>,
    session_ttl: Option<Duration>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let history = Arc::clone(controller.history());
    let mut dispatcher = Dispatcher::new(controller);
    let mut offset: Option<i64> = None;
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!("bot is ready to receive messages");
    let result = loop {
        if *shutdown.borrow() {
            break Ok(());
        }
        tokio::select! {
            changed = shutdown.changed() => {
                // A dropped sender can never signal again.
                if changed.is_err() {
                    break Ok(());
                }
            }
            _ = sweep.tick() => {
                let retired = dispatcher.retire_idle(WORKER_IDLE);
                if let Some(ttl) = session_ttl {
                    let evicted = history.evict_idle(ttl);
                    SESSIONS_EVICTED.count(evicted as u64);
                    if evicted > 0 || retired > 0 {
                        tracing::debug!(evicted, retired, "swept idle conversations");
                    }
                }
            }
            updates = telegram.get_updates(offset) => match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = Some(offset.unwrap_or(i64::MIN).max(update.update_id + 1));
                        if let Some(message) = update.into_inbound() {
                            dispatcher.dispatch(message);
                        }
                    }
                }
                Err(err) if is_fatal_poll_error(&err) => break Err(err),
                Err(err) => {
                    tracing::warn!(error = %err, backoff = ?POLL_BACKOFF, "polling for updates failed");
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(POLL_BACKOFF) => {}
                    }
                }
            },
        }
    };

    tracing::info!(workers = dispatcher.worker_count(), "draining user workers");
    dispatcher.shutdown().await;
    result
}
