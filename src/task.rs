//! Call tracking for spawned store tasks
//!
//! Every async store operation runs its data source call on the tokio runtime
//! and reports back through a channel owned by the store. A call that panics
//! still reports: the join error is converted into the call's error type, so
//! each call produces exactly one settlement.

use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinError;

/// Identifier of one dispatched async operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

impl CallId {
    /// Return this id and advance `self` to the next one
    pub fn advance(&mut self) -> CallId {
        let current = *self;
        self.0 += 1;
        current
    }
}

impl Default for CallId {
    fn default() -> Self {
        CallId(1)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Fulfilled,
    Rejected,
}

/// Lifecycle of a single call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// Never dispatched by this store
    NotStarted,
    /// Pending signal applied, terminal signal not yet applied
    Pending,
    /// Terminal signal applied
    Settled(Outcome),
    /// Settled long enough ago that the outcome is no longer kept
    Expired,
}

/// Result of a call, delivered to the store when the call completes
#[derive(Debug)]
pub struct Settlement<T> {
    pub call: CallId,
    pub result: T,
}

/// Run `future` on the runtime and deliver its result to `tx`.
///
/// The future runs in its own task so a panic inside it surfaces as a
/// `JoinError`, which is delivered as `Err(E::from(join_error))`.
pub fn spawn_call<A, E, F>(call: CallId, tx: mpsc::UnboundedSender<Settlement<Result<A, E>>>, future: F)
where
    F: Future<Output = Result<A, E>> + Send + 'static,
    A: Send + 'static,
    E: From<JoinError> + Send + 'static,
{
    tokio::spawn(async move {
        let result = match tokio::spawn(future).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(call = %call, "Task panicked: {}", e);
                Err(E::from(e))
            }
        };

        if tx.send(Settlement { call, result }).is_err() {
            tracing::debug!(call = %call, "Store dropped before call settled");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Failed(String);

    impl From<JoinError> for Failed {
        fn from(e: JoinError) -> Self {
            Failed(e.to_string())
        }
    }

    #[test]
    fn test_call_ids_increase() {
        let mut next = CallId::default();
        let first = next.advance();
        let second = next.advance();
        assert!(first < second);
        assert_eq!(first.to_string(), "#1");
        assert_eq!(second.to_string(), "#2");
    }

    #[tokio::test]
    async fn test_settlement_delivered() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let call = CallId::default();
        spawn_call::<u32, Failed, _>(call, tx, async { Ok(5) });

        let settlement = rx.recv().await.unwrap();
        assert_eq!(settlement.call, call);
        assert_eq!(settlement.result.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let call = CallId::default();
        spawn_call::<u32, Failed, _>(call, tx, async move {
            if call == CallId::default() {
                panic!("boom");
            }
            Ok(0)
        });

        let settlement = rx.recv().await.unwrap();
        assert_eq!(settlement.call, call);
        let Failed(message) = settlement.result.unwrap_err();
        assert!(message.contains("panicked"), "{}", message);
    }
}
