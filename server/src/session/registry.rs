//! Session registry: per-drone mailbox and delivery generation

use fleet_shared::Command;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Fixed capacity of each drone's command mailbox
pub const MAILBOX_CAPACITY: usize = 64;

/// The live binding of a drone id to its mailbox and current generation
///
/// The mailbox (both halves) persists across reconnects; only the
/// cancellation token and generation counter are replaced when a new
/// subscription takes over. Sessions are never destroyed.
struct DroneSession {
    commands: mpsc::Sender<Command>,
    mailbox: Arc<Mutex<mpsc::Receiver<Command>>>,
    cancel: CancellationToken,
    generation: u64,
}

/// What a new subscription receives from [`SessionRegistry::begin_generation`]
///
/// Holding the mailbox receiver behind an async mutex is what enforces the
/// single-drainer invariant: a sender loop owns the guard for its lifetime,
/// and its successor can only acquire it once the old loop has exited.
#[derive(Clone)]
pub struct SenderLease {
    pub mailbox: Arc<Mutex<mpsc::Receiver<Command>>>,
    pub cancel: CancellationToken,
    pub generation: u64,
}

/// Tracks all drone sessions
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, DroneSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Retire the session's current generation and install a fresh one
    ///
    /// Creates the session (with an empty mailbox) on first call for a
    /// drone. Cancelling the prior token is idempotent, so this is safe to
    /// call concurrently with a transport-side cancellation of the previous
    /// stream.
    pub async fn begin_generation(&self, drone_id: &str) -> SenderLease {
        let mut sessions = self.sessions.write().await;

        let session = sessions.entry(drone_id.to_string()).or_insert_with(|| {
            let (commands, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
            DroneSession {
                commands,
                mailbox: Arc::new(Mutex::new(mailbox)),
                cancel: CancellationToken::new(),
                generation: 0,
            }
        });

        session.cancel.cancel();
        session.cancel = CancellationToken::new();
        session.generation += 1;

        SenderLease {
            mailbox: session.mailbox.clone(),
            cancel: session.cancel.clone(),
            generation: session.generation,
        }
    }

    /// Mailbox sender for a drone, if a session exists
    pub async fn sender(&self, drone_id: &str) -> Option<mpsc::Sender<Command>> {
        let sessions = self.sessions.read().await;
        sessions.get(drone_id).map(|s| s.commands.clone())
    }

    /// Cancel `generation` iff it is still the live one for `drone_id`
    ///
    /// Called when a subscription's transport ends. Returns whether the
    /// generation was still live; false when a takeover already retired it
    /// or no session exists.
    pub async fn finish_generation(&self, drone_id: &str, generation: u64) -> bool {
        let sessions = self.sessions.read().await;
        match sessions.get(drone_id) {
            Some(session) if session.generation == generation => {
                session.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Number of sessions ever created
    ///
    /// Sessions are never destroyed, so this only grows. Observability
    /// hook for operator tooling; dispatch does not consult it.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_session_until_first_subscription() {
        let registry = SessionRegistry::new();
        assert!(registry.sender("d1").await.is_none());

        registry.begin_generation("d1").await;
        assert!(registry.sender("d1").await.is_some());
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn new_generation_retires_the_previous_one() {
        let registry = SessionRegistry::new();

        let first = registry.begin_generation("d1").await;
        assert!(!first.cancel.is_cancelled());

        let second = registry.begin_generation("d1").await;
        assert!(first.cancel.is_cancelled());
        assert!(!second.cancel.is_cancelled());
        assert_eq!(second.generation, first.generation + 1);
    }

    #[tokio::test]
    async fn mailbox_survives_reconnect() {
        let registry = SessionRegistry::new();

        registry.begin_generation("d1").await;
        let sender = registry.sender("d1").await.unwrap();
        sender.try_send(Command::default()).expect("enqueue");

        // Takeover must not recreate the mailbox
        let lease = registry.begin_generation("d1").await;
        let mut mailbox = lease.mailbox.lock().await;
        assert!(mailbox.try_recv().is_ok());
    }

    #[tokio::test]
    async fn finish_generation_only_cancels_the_live_one() {
        let registry = SessionRegistry::new();

        let first = registry.begin_generation("d1").await;
        let second = registry.begin_generation("d1").await;

        // Stale transport teardown must not touch the live generation
        assert!(!registry.finish_generation("d1", first.generation).await);
        assert!(!second.cancel.is_cancelled());

        assert!(registry.finish_generation("d1", second.generation).await);
        assert!(second.cancel.is_cancelled());

        // Redundant cancellation is harmless
        assert!(registry.finish_generation("d1", second.generation).await);
    }

    #[tokio::test]
    async fn finish_generation_without_session_is_a_no_op() {
        let registry = SessionRegistry::new();
        assert!(!registry.finish_generation("ghost", 1).await);
    }

    #[tokio::test]
    async fn mailbox_is_bounded() {
        let registry = SessionRegistry::new();
        registry.begin_generation("d1").await;

        let sender = registry.sender("d1").await.unwrap();
        for _ in 0..MAILBOX_CAPACITY {
            sender.try_send(Command::default()).expect("within capacity");
        }
        assert!(sender.try_send(Command::default()).is_err());
    }
}
