//! First-signal races.
//!
//! A race resolves exactly one outcome from three producers: the action
//! the caller is blocked on, any number of signal senders, and a deadline.

use std::future::Future;

use tokio::sync::mpsc;

use crate::Deadline;

/// Create a single-slot signal carrier.
///
/// The slot holds at most one value; offers never block.
pub fn signal_slot<T>() -> (SignalSender<T>, SignalReceiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (SignalSender { tx }, SignalReceiver { rx })
}

/// Producer side of a signal slot.
#[derive(Debug)]
pub struct SignalSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for SignalSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> SignalSender<T> {
    /// Offer a signal.
    ///
    /// Returns false when the slot is already full or the race is over; the
    /// value is dropped in that case.
    pub fn offer(&self, value: T) -> bool {
        self.tx.try_send(value).is_ok()
    }

    /// True once the receiving side has resolved its race or been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of a signal slot.
#[derive(Debug)]
pub struct SignalReceiver<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> SignalReceiver<T> {
    /// A receiver with no live sender. Races against it never see a signal.
    pub fn never() -> Self {
        signal_slot().1
    }
}

/// How a race was resolved.
#[derive(Debug, PartialEq, Eq)]
pub enum RaceOutcome<T, S> {
    Completed(T),
    Signalled(S),
    DeadlineExpired,
}

/// Race `action` against `signals` and `deadline`.
///
/// Exactly one outcome is returned. When a signal and the action's result
/// are both ready at the same wakeup, the signal wins. The slot is closed
/// before returning, so later offers are no-ops.
pub async fn race<F, T, S>(
    action: F,
    mut signals: SignalReceiver<S>,
    deadline: Deadline,
) -> RaceOutcome<T, S>
where
    F: Future<Output = T>,
{
    tokio::pin!(action);

    let outcome = tokio::select! {
        biased;
        Some(signal) = signals.rx.recv() => RaceOutcome::Signalled(signal),
        value = &mut action => RaceOutcome::Completed(value),
        _ = deadline.expired() => RaceOutcome::DeadlineExpired,
    };

    signals.rx.close();
    outcome
}
