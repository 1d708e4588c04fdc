//! Transaction records and the one-shot completion rendezvous.

// Copyright (C) 2025 The spacewire-rmap Developers
//
// MIT License

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Instant;

use crate::Result;
use crate::packet::{Operation, Packet};

/// Life cycle of a transaction.
///
/// `NotInitiated → Initiated → CommandSent` and from there to exactly one of
/// `ReplyReceived`, `Timeout` or `Cancelled`.  A command sent with
/// reply-expected off is done once it reaches `CommandSent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    NotInitiated,
    Initiated,
    CommandSent,
    ReplyReceived,
    Timeout,
    Cancelled,
}

/// Terminal outcome delivered through the completion slot: the reply packet,
/// or the error the demultiplexer or canceller assigned.
pub type Completion = Result<Packet>;

/// One-shot rendezvous between exactly one signaller (the demultiplexer, a
/// canceller or the timeout path) and exactly one waiter (the façade).
///
/// The first signal wins; later signals are discarded.  Draining after a
/// terminal transition guarantees no stale signal can fire on a recycled
/// transaction.
pub struct CompletionSlot {
    outcome: Mutex<Option<Completion>>,
    delivered: Condvar,
}

impl CompletionSlot {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            delivered: Condvar::new(),
        }
    }

    /// Deliver the outcome.  Only the first call has any effect.
    pub fn signal(&self, completion: Completion) {
        let mut outcome = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        if outcome.is_none() {
            *outcome = Some(completion);
            self.delivered.notify_one();
        }
    }

    /// Block until the outcome is delivered or `deadline` passes.
    pub fn wait_deadline(&self, deadline: Instant) -> Option<Completion> {
        let mut outcome = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(completion) = outcome.take() {
                return Some(completion);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .delivered
                .wait_timeout(outcome, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            outcome = guard;
        }
    }

    /// Discard any outcome delivered after the waiter gave up.
    pub fn drain(&self) {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// One in-flight command/reply pairing
pub struct Transaction {
    transaction_id: u16,
    operation: Operation,
    state: Mutex<TransactionState>,
    slot: CompletionSlot,
}

impl Transaction {
    pub fn new(transaction_id: u16, operation: Operation) -> Self {
        Self {
            transaction_id,
            operation,
            state: Mutex::new(TransactionState::NotInitiated),
            slot: CompletionSlot::new(),
        }
    }

    pub fn transaction_id(&self) -> u16 {
        self.transaction_id
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn slot(&self) -> &CompletionSlot {
        &self.slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn first_signal_wins() {
        let slot = CompletionSlot::new();
        slot.signal(Err(Error::Cancelled));
        slot.signal(Err(Error::Timeout));
        assert_eq!(
            slot.wait_deadline(Instant::now()),
            Some(Err(Error::Cancelled))
        );
    }

    #[test]
    fn wait_returns_none_at_deadline() {
        let slot = CompletionSlot::new();
        let deadline = Instant::now() + Duration::from_millis(20);
        assert_eq!(slot.wait_deadline(deadline), None);
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn drained_signal_does_not_fire_later() {
        let slot = CompletionSlot::new();
        slot.signal(Err(Error::Timeout));
        slot.drain();
        assert_eq!(slot.wait_deadline(Instant::now()), None);
    }

    #[test]
    fn signal_wakes_a_parked_waiter() {
        let transaction = Arc::new(Transaction::new(7, Operation::Read));
        let signaller = Arc::clone(&transaction);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signaller.slot().signal(Err(Error::Cancelled));
        });

        let outcome = transaction
            .slot()
            .wait_deadline(Instant::now() + Duration::from_secs(5));
        assert_eq!(outcome, Some(Err(Error::Cancelled)));
        handle.join().unwrap();
    }

    #[test]
    fn state_transitions() {
        let transaction = Transaction::new(1, Operation::Write);
        assert_eq!(transaction.state(), TransactionState::NotInitiated);
        transaction.set_state(TransactionState::Initiated);
        transaction.set_state(TransactionState::CommandSent);
        assert_eq!(transaction.state(), TransactionState::CommandSent);
        assert_eq!(transaction.transaction_id(), 1);
        assert_eq!(transaction.operation(), Operation::Write);
    }
}
