//! The transaction engine: identifier allocation, command submission and
//! the reply demultiplexer.
//!
//! One [`RmapEngine`] serves one link.  Façades submit commands through it;
//! the embedder dedicates a thread (or any dispatcher it likes) to
//! [`RmapEngine::run()`], which consumes inbound frames and releases the
//! waiter each reply belongs to.  The engine spawns no threads of its own.
//!
//! Undecodable frames and replies for unknown transaction identifiers are
//! logged and dropped; they never disturb a live transaction, and no failure
//! is fatal to the engine itself.

// Copyright (C) 2025 The spacewire-rmap Developers
//
// MIT License

mod table;
mod transaction;

pub use transaction::TransactionState;
pub(crate) use transaction::Transaction;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::link::SpaceWireLink;
use crate::packet::{Packet, PacketKind};
use crate::{Error, Result};

use table::TransactionTable;

/// How long one `recv` call may park before the demultiplexer rechecks the
/// shutdown flag.
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Transaction engine for one SpaceWire link
pub struct RmapEngine<L: SpaceWireLink> {
    link: L,
    table: TransactionTable,
    shutdown: AtomicBool,
}

impl<L: SpaceWireLink> RmapEngine<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            table: TransactionTable::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Register a transaction, stamp the command with its identifier and
    /// hand the encoded frame to the link.
    ///
    /// The transaction is in the table before the command reaches the link,
    /// so a reply can never beat its own registration.  If the link refuses
    /// the frame the identifier is released and
    /// [`Error::TransactionCouldNotBeInitiated`] is returned.
    pub(crate) fn initiate(
        &self,
        command: &mut Packet,
        pinned: Option<u16>,
        deadline: Instant,
    ) -> Result<Arc<Transaction>> {
        let operation = command.operation;
        let transaction = self.table.register(pinned, deadline, |transaction_id| {
            Arc::new(Transaction::new(transaction_id, operation))
        })?;
        let transaction_id = transaction.transaction_id();
        command.transaction_id = transaction_id;
        transaction.set_state(TransactionState::Initiated);

        let frame = match command.encode() {
            Ok(frame) => frame,
            Err(e) => {
                self.table.remove(transaction_id);
                return Err(e);
            }
        };
        if let Err(e) = self.link.send(&frame) {
            self.table.remove(transaction_id);
            warn!("link rejected command for transaction {transaction_id:#06X}: {e}");
            return Err(Error::TransactionCouldNotBeInitiated);
        }
        transaction.set_state(TransactionState::CommandSent);
        debug!(
            "sent {operation:?} command, transaction {transaction_id:#06X}, {} bytes",
            frame.len()
        );
        Ok(transaction)
    }

    /// Remove a transaction from the table, claiming its terminal
    /// transition.  Returns `None` if another party (usually the
    /// demultiplexer) got there first.
    pub(crate) fn take(&self, transaction_id: u16) -> Option<Arc<Transaction>> {
        self.table.remove(transaction_id)
    }

    /// Cancel a pending transaction.
    ///
    /// The waiter, if any, receives [`Error::Cancelled`]; a reply arriving
    /// later is dropped by the demultiplexer.  Returns whether a pending
    /// transaction was actually cancelled.
    pub fn cancel(&self, transaction_id: u16) -> bool {
        match self.table.remove(transaction_id) {
            Some(transaction) => {
                transaction.set_state(TransactionState::Cancelled);
                transaction.slot().signal(Err(Error::Cancelled));
                debug!("cancelled transaction {transaction_id:#06X}");
                true
            }
            None => false,
        }
    }

    /// Number of transactions currently awaiting a terminal transition.
    pub fn active_transaction_count(&self) -> usize {
        self.table.len()
    }

    /// Consume inbound frames until [`shutdown()`](Self::shutdown) is called
    /// or the link closes.
    ///
    /// Call this on a dedicated thread or whatever dispatcher the embedding
    /// program provides; the engine is single-threaded per link on the
    /// receive side.
    pub fn run(&self) -> Result<()> {
        debug!("reply demultiplexer running");
        while !self.shutdown.load(Ordering::Acquire) {
            match self.link.recv(RECV_POLL_INTERVAL) {
                Ok(Some(frame)) => self.dispatch(&frame),
                Ok(None) => {}
                Err(Error::LinkClosed) => {
                    debug!("link closed, reply demultiplexer stopping");
                    return Ok(());
                }
                Err(e) => {
                    error!("link receive failed: {e}");
                    return Err(e);
                }
            }
        }
        debug!("reply demultiplexer stopped");
        Ok(())
    }

    /// Ask [`run()`](Self::run) to return.  Pending transactions are left to
    /// time out or be cancelled by their callers.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn dispatch(&self, frame: &[u8]) {
        trace!("received frame, {} bytes", frame.len());
        let reply = match Packet::decode_reply(frame) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("dropping undecodable frame ({} bytes): {e}", frame.len());
                return;
            }
        };
        debug_assert_eq!(reply.kind, PacketKind::Reply);

        let transaction_id = reply.transaction_id;
        let Some(transaction) = self.table.remove(transaction_id) else {
            // Late reply after timeout or cancellation, or a stray TID.
            debug!("dropping reply for unknown transaction {transaction_id:#06X}");
            return;
        };

        if reply.operation != transaction.operation() {
            warn!(
                "transaction {transaction_id:#06X}: {:?} reply for a {:?} command",
                reply.operation,
                transaction.operation()
            );
            transaction
                .slot()
                .signal(Err(Error::UnexpectedWriteReplyReceived));
            return;
        }

        debug!(
            "transaction {transaction_id:#06X} completed, status {:#04X}",
            reply.status
        );
        transaction.set_state(TransactionState::ReplyReceived);
        transaction.slot().signal(Ok(reply));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LoopbackLink;
    use crate::packet::Operation;

    fn read_command() -> Packet {
        Packet {
            kind: PacketKind::Command,
            operation: Operation::Read,
            increment: true,
            verify: false,
            reply_expected: true,
            initiator_logical_address: 0x67,
            target_logical_address: 0xFE,
            key: 0x20,
            target_spacewire_address: Vec::new(),
            reply_address: Vec::new(),
            transaction_id: 0,
            extended_address: 0,
            address: 0x1000,
            data_length: 4,
            data: Vec::new(),
            status: 0,
        }
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_millis(200)
    }

    #[test]
    fn initiate_registers_and_sends() {
        let (near, far) = LoopbackLink::pair();
        let engine = RmapEngine::new(near);

        let mut command = read_command();
        let transaction = engine.initiate(&mut command, None, deadline()).unwrap();
        assert_eq!(transaction.state(), TransactionState::CommandSent);
        assert_eq!(command.transaction_id, transaction.transaction_id());
        assert_eq!(engine.active_transaction_count(), 1);

        let frame = far.recv(Duration::from_millis(100)).unwrap().unwrap();
        let seen = Packet::decode_command(&frame).unwrap();
        assert_eq!(seen.transaction_id, transaction.transaction_id());
    }

    #[test]
    fn initiate_rolls_back_on_send_failure() {
        let (near, far) = LoopbackLink::pair();
        drop(far);
        let engine = RmapEngine::new(near);

        let mut command = read_command();
        assert_eq!(
            engine.initiate(&mut command, None, deadline()).map(|_| ()),
            Err(Error::TransactionCouldNotBeInitiated)
        );
        assert_eq!(engine.active_transaction_count(), 0);
    }

    #[test]
    fn cancel_releases_and_signals() {
        let (near, _far) = LoopbackLink::pair();
        let engine = RmapEngine::new(near);

        let mut command = read_command();
        let transaction = engine.initiate(&mut command, None, deadline()).unwrap();
        assert!(engine.cancel(transaction.transaction_id()));
        assert_eq!(engine.active_transaction_count(), 0);
        assert_eq!(transaction.state(), TransactionState::Cancelled);
        assert_eq!(
            transaction.slot().wait_deadline(Instant::now()),
            Some(Err(Error::Cancelled))
        );
        // Second cancel finds nothing.
        assert!(!engine.cancel(transaction.transaction_id()));
    }

    #[test]
    fn dispatch_routes_reply_to_the_transaction() {
        let (near, _far) = LoopbackLink::pair();
        let engine = RmapEngine::new(near);

        let mut command = read_command();
        let transaction = engine.initiate(&mut command, None, deadline()).unwrap();

        let reply = Packet::reply_for(&command, 0x00, &[1, 2, 3, 4]);
        engine.dispatch(&reply.encode().unwrap());

        let outcome = transaction.slot().wait_deadline(Instant::now()).unwrap();
        assert_eq!(outcome.unwrap().data, vec![1, 2, 3, 4]);
        assert_eq!(transaction.state(), TransactionState::ReplyReceived);
        assert_eq!(engine.active_transaction_count(), 0);
    }

    #[test]
    fn dispatch_drops_unknown_and_corrupt_frames() {
        let (near, _far) = LoopbackLink::pair();
        let engine = RmapEngine::new(near);

        // No transaction registered: dropped without effect.
        let reply = Packet::reply_for(&read_command(), 0x00, &[0; 4]);
        engine.dispatch(&reply.encode().unwrap());

        // Corrupt frame: dropped without effect.
        engine.dispatch(&[0x67, 0x01, 0xFF]);
        assert_eq!(engine.active_transaction_count(), 0);
    }

    #[test]
    fn dispatch_flags_operation_mismatch() {
        let (near, _far) = LoopbackLink::pair();
        let engine = RmapEngine::new(near);

        let mut command = read_command();
        let transaction = engine.initiate(&mut command, None, deadline()).unwrap();

        // A write reply to a read command.
        let mut write_command = read_command();
        write_command.operation = Operation::Write;
        write_command.data = vec![0x00];
        write_command.transaction_id = command.transaction_id;
        let reply = Packet::reply_for(&write_command, 0x00, &[]);
        engine.dispatch(&reply.encode().unwrap());

        assert_eq!(
            transaction.slot().wait_deadline(Instant::now()),
            Some(Err(Error::UnexpectedWriteReplyReceived))
        );
    }
}
