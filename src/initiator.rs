//! The initiator façade: public read/write/RMW operations.
//!
//! An [`RmapInitiator`] wraps an [`RmapEngine`] with the caller-facing
//! operations.  Targets are either resolved by identifier through a
//! registered [`TargetDirectory`] or passed in directly as
//! [`TargetNode`] references; the memory-object forms additionally resolve
//! the address and length from the directory and enforce the object's
//! capabilities.
//!
//! Every operation takes an explicit per-call timeout ([`DEFAULT_TIMEOUT`]
//! is the conventional 1000 ms).  Operations on one façade are serialised:
//! the façade owns one command slot at a time, and the reply to the last
//! successful operation is retained for inspection via
//! [`RmapInitiator::last_reply()`] until the next operation begins.  Create
//! several façades over one engine for concurrent traffic; the engine tells
//! them apart by transaction identifier.
//!
//! Each mode flag (increment, verify, reply, transaction identifier) has an
//! independent set/unset state.  While unset the defaults apply: increment
//! on, verify off for reads and on for writes, reply on, transaction
//! identifier allocated by the engine.  Reads always go out with reply on
//! and verify off regardless of the configured modes.

// Copyright (C) 2025 The spacewire-rmap Developers
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::directory::{DEFAULT_LOGICAL_ADDRESS, TargetDirectory, TargetNode};
use crate::engine::{RmapEngine, Transaction, TransactionState};
use crate::link::SpaceWireLink;
use crate::packet::{Operation, Packet, PacketKind};
use crate::{Error, Result};

/// Conventional per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Grace period for a demultiplexer that claimed a transaction right at the
/// caller's deadline to deliver its signal.
const COMPLETION_SLACK: Duration = Duration::from_millis(50);

struct Session {
    last_reply: Option<Packet>,
}

/// RMAP initiator façade over one engine
pub struct RmapInitiator<L: SpaceWireLink> {
    engine: Arc<RmapEngine<L>>,
    directory: Option<Arc<TargetDirectory>>,
    initiator_logical_address: Option<u8>,
    increment_mode: Option<bool>,
    verify_mode: Option<bool>,
    reply_mode: Option<bool>,
    transaction_id: Option<u16>,
    session: Mutex<Session>,
}

impl<L: SpaceWireLink> RmapInitiator<L> {
    /// New façade over `engine`, with no directory and all modes unset.
    pub fn new(engine: Arc<RmapEngine<L>>) -> Self {
        Self {
            engine,
            directory: None,
            initiator_logical_address: None,
            increment_mode: None,
            verify_mode: None,
            reply_mode: None,
            transaction_id: None,
            session: Mutex::new(Session { last_reply: None }),
        }
    }

    /// The engine this façade submits through.
    pub fn engine(&self) -> &Arc<RmapEngine<L>> {
        &self.engine
    }

    /// Register the directory used to resolve target identifiers.
    pub fn set_target_directory(&mut self, directory: Arc<TargetDirectory>) {
        self.directory = Some(directory);
    }

    pub fn target_directory(&self) -> Option<&TargetDirectory> {
        self.directory.as_deref()
    }

    /// Read `length` bytes from `address` on the target with identifier
    /// `target`, filling the front of `buf`.
    pub fn read(
        &self,
        target: &str,
        address: u32,
        length: u32,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<()> {
        let node = self.resolve_target(target)?;
        self.read_at(node, 0x00, address, length, buf, timeout)
    }

    /// As [`read()`](Self::read) with the target node supplied directly.
    pub fn read_node(
        &self,
        node: &TargetNode,
        address: u32,
        length: u32,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<()> {
        self.read_at(node, 0x00, address, length, buf, timeout)
    }

    /// Read the memory object `object` on target `target` into `buf`.
    /// The object must carry the readable capability.
    pub fn read_memory_object(
        &self,
        target: &str,
        object: &str,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<()> {
        let node = self.resolve_target(target)?;
        let memory = node.get_memory(object)?;
        if !memory.readable {
            return Err(Error::MemoryObjectNotReadable);
        }
        self.read_at(
            node,
            memory.extended_address,
            memory.address,
            memory.length,
            buf,
            timeout,
        )
    }

    /// As [`read_memory_object()`](Self::read_memory_object), returning a
    /// freshly allocated buffer of the object's length.
    pub fn read_memory_object_to_vec(
        &self,
        target: &str,
        object: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let node = self.resolve_target(target)?;
        let memory = node.get_memory(object)?;
        if !memory.readable {
            return Err(Error::MemoryObjectNotReadable);
        }
        let mut buf = vec![0u8; memory.length as usize];
        self.read_at(
            node,
            memory.extended_address,
            memory.address,
            memory.length,
            &mut buf,
            timeout,
        )?;
        Ok(buf)
    }

    /// Write `data` to `address` on the target with identifier `target`.
    ///
    /// With the reply mode unset or on, waits for the reply and validates
    /// its status.  With the reply mode off, returns as soon as the link has
    /// accepted the frame.
    pub fn write(&self, target: &str, address: u32, data: &[u8], timeout: Duration) -> Result<()> {
        let node = self.resolve_target(target)?;
        self.write_at(node, 0x00, address, data, timeout)
    }

    /// As [`write()`](Self::write) with the target node supplied directly.
    pub fn write_node(
        &self,
        node: &TargetNode,
        address: u32,
        data: &[u8],
        timeout: Duration,
    ) -> Result<()> {
        self.write_at(node, 0x00, address, data, timeout)
    }

    /// Write `data` to the memory object `object` on target `target`.
    /// The object must carry the writable capability and be at least
    /// `data.len()` bytes long.
    pub fn write_memory_object(
        &self,
        target: &str,
        object: &str,
        data: &[u8],
        timeout: Duration,
    ) -> Result<()> {
        let node = self.resolve_target(target)?;
        let memory = node.get_memory(object)?;
        if !memory.writable {
            return Err(Error::MemoryObjectNotWritable);
        }
        if data.len() as u64 > memory.length as u64 {
            return Err(Error::PayloadTooLarge);
        }
        self.write_at(node, memory.extended_address, memory.address, data, timeout)
    }

    /// Read-modify-write at `address` on the target with identifier
    /// `target`.
    ///
    /// `write_data` holds the value followed by the mask, so its length must
    /// be even; the target returns the original value, `write_data.len()/2`
    /// bytes, into the front of `read_buf`.
    pub fn rmw(
        &self,
        target: &str,
        address: u32,
        write_data: &[u8],
        read_buf: &mut [u8],
        timeout: Duration,
    ) -> Result<()> {
        let node = self.resolve_target(target)?;
        self.rmw_at(node, 0x00, address, write_data, read_buf, timeout)
    }

    /// As [`rmw()`](Self::rmw) with the target node supplied directly.
    pub fn rmw_node(
        &self,
        node: &TargetNode,
        address: u32,
        write_data: &[u8],
        read_buf: &mut [u8],
        timeout: Duration,
    ) -> Result<()> {
        self.rmw_at(node, 0x00, address, write_data, read_buf, timeout)
    }

    /// Read-modify-write on the memory object `object` on target `target`.
    /// The object must carry the RMW capability.
    pub fn rmw_memory_object(
        &self,
        target: &str,
        object: &str,
        write_data: &[u8],
        read_buf: &mut [u8],
        timeout: Duration,
    ) -> Result<()> {
        let node = self.resolve_target(target)?;
        let memory = node.get_memory(object)?;
        if !memory.rmwable {
            return Err(Error::MemoryObjectNotRmwable);
        }
        if (write_data.len() / 2) as u64 > memory.length as u64 {
            return Err(Error::PayloadTooLarge);
        }
        self.rmw_at(
            node,
            memory.extended_address,
            memory.address,
            write_data,
            read_buf,
            timeout,
        )
    }

    /// The reply to the last successful operation, retained until the next
    /// operation on this façade begins.
    pub fn last_reply(&self) -> Option<Packet> {
        self.lock_session().last_reply.clone()
    }

    // Mode configuration.  Each flag is independently set or unset; while
    // unset the operation defaults apply.

    pub fn set_initiator_logical_address(&mut self, address: u8) {
        self.initiator_logical_address = Some(address);
    }

    pub fn unset_initiator_logical_address(&mut self) {
        self.initiator_logical_address = None;
    }

    pub fn initiator_logical_address(&self) -> Option<u8> {
        self.initiator_logical_address
    }

    pub fn set_increment_mode(&mut self, increment: bool) {
        self.increment_mode = Some(increment);
    }

    pub fn unset_increment_mode(&mut self) {
        self.increment_mode = None;
    }

    pub fn increment_mode(&self) -> Option<bool> {
        self.increment_mode
    }

    pub fn set_verify_mode(&mut self, verify: bool) {
        self.verify_mode = Some(verify);
    }

    pub fn unset_verify_mode(&mut self) {
        self.verify_mode = None;
    }

    pub fn verify_mode(&self) -> Option<bool> {
        self.verify_mode
    }

    pub fn set_reply_mode(&mut self, reply: bool) {
        self.reply_mode = Some(reply);
    }

    pub fn unset_reply_mode(&mut self) {
        self.reply_mode = None;
    }

    pub fn reply_mode(&self) -> Option<bool> {
        self.reply_mode
    }

    /// Pin the transaction identifier for subsequent operations.  An
    /// operation fails with [`Error::TransactionIdInUse`] if the pinned
    /// identifier is owned by a live transaction at the time.
    pub fn set_transaction_id(&mut self, transaction_id: u16) {
        self.transaction_id = Some(transaction_id);
    }

    pub fn unset_transaction_id(&mut self) {
        self.transaction_id = None;
    }

    pub fn transaction_id(&self) -> Option<u16> {
        self.transaction_id
    }

    // Operation cores.  The session lock is held from before the command is
    // built until the outcome is known, which serialises operations on this
    // façade and protects the retained reply.

    fn read_at(
        &self,
        node: &TargetNode,
        extended_address: u8,
        address: u32,
        length: u32,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<()> {
        if (buf.len() as u64) < length as u64 {
            return Err(Error::BufferTooSmall);
        }
        let mut session = self.lock_session();
        session.last_reply = None;
        let deadline = Instant::now() + timeout;

        debug!("read {length} bytes from {}:{address:#010X}", node.id);
        let mut command = self.build_command(node, Operation::Read, extended_address, address);
        command.data_length = length;

        let transaction = self.engine.initiate(&mut command, self.transaction_id, deadline)?;
        let reply = self.wait_reply(&transaction, deadline)?;
        if reply.status != 0 {
            return Err(Error::ReplyError {
                status: reply.status,
            });
        }
        if (reply.data.len() as u32) < length {
            return Err(Error::ReadReplyWithInsufficientData);
        }
        if (reply.data.len() as u32) > length {
            return Err(Error::ReadReplyWithTooMuchData);
        }
        buf[..reply.data.len()].copy_from_slice(&reply.data);
        session.last_reply = Some(reply);
        Ok(())
    }

    fn write_at(
        &self,
        node: &TargetNode,
        extended_address: u8,
        address: u32,
        data: &[u8],
        timeout: Duration,
    ) -> Result<()> {
        let mut session = self.lock_session();
        session.last_reply = None;
        let deadline = Instant::now() + timeout;

        let mut command = self.build_command(node, Operation::Write, extended_address, address);
        command.data = data.to_vec();
        command.data_length = data.len() as u32;
        debug!(
            "write {} bytes to {}:{address:#010X}{}",
            data.len(),
            node.id,
            if command.reply_expected { "" } else { " (no reply)" }
        );

        let transaction = self.engine.initiate(&mut command, self.transaction_id, deadline)?;
        if !command.reply_expected {
            // Fire and forget: nothing will arrive to correlate, so the
            // identifier goes straight back to the pool.
            self.engine.take(transaction.transaction_id());
            return Ok(());
        }
        let reply = self.wait_reply(&transaction, deadline)?;
        if reply.status != 0 {
            return Err(Error::ReplyError {
                status: reply.status,
            });
        }
        session.last_reply = Some(reply);
        Ok(())
    }

    fn rmw_at(
        &self,
        node: &TargetNode,
        extended_address: u8,
        address: u32,
        write_data: &[u8],
        read_buf: &mut [u8],
        timeout: Duration,
    ) -> Result<()> {
        if write_data.len() % 2 != 0 {
            return Err(Error::RmwDataLengthInvalid);
        }
        let read_length = write_data.len() / 2;
        if read_buf.len() < read_length {
            return Err(Error::BufferTooSmall);
        }
        let mut session = self.lock_session();
        session.last_reply = None;
        let deadline = Instant::now() + timeout;

        debug!(
            "read-modify-write {read_length} bytes at {}:{address:#010X}",
            node.id
        );
        let mut command =
            self.build_command(node, Operation::ReadModifyWrite, extended_address, address);
        command.data = write_data.to_vec();
        command.data_length = write_data.len() as u32;

        let transaction = self.engine.initiate(&mut command, self.transaction_id, deadline)?;
        let reply = self.wait_reply(&transaction, deadline)?;
        if reply.status != 0 {
            return Err(Error::ReplyError {
                status: reply.status,
            });
        }
        if reply.data.len() < read_length {
            return Err(Error::ReadReplyWithInsufficientData);
        }
        if reply.data.len() > read_length {
            return Err(Error::ReadReplyWithTooMuchData);
        }
        read_buf[..reply.data.len()].copy_from_slice(&reply.data);
        session.last_reply = Some(reply);
        Ok(())
    }

    fn resolve_target(&self, target: &str) -> Result<&TargetNode> {
        self.directory
            .as_ref()
            .ok_or(Error::TargetDirectoryNotRegistered)?
            .get_target(target)
    }

    fn build_command(
        &self,
        node: &TargetNode,
        operation: Operation,
        extended_address: u8,
        address: u32,
    ) -> Packet {
        Packet {
            kind: PacketKind::Command,
            operation,
            increment: self.increment_mode.unwrap_or(true),
            verify: match operation {
                // Reads never verify; RMW always does.
                Operation::Read => false,
                Operation::ReadModifyWrite => true,
                Operation::Write => self.verify_mode.unwrap_or(true),
            },
            reply_expected: match operation {
                // Reads and RMWs always expect a reply.
                Operation::Read | Operation::ReadModifyWrite => true,
                Operation::Write => self.reply_mode.unwrap_or(true),
            },
            initiator_logical_address: node
                .initiator_logical_address
                .or(self.initiator_logical_address)
                .unwrap_or(DEFAULT_LOGICAL_ADDRESS),
            target_logical_address: node.target_logical_address,
            key: node.key,
            target_spacewire_address: node.target_spacewire_address.clone(),
            reply_address: node.reply_address.clone(),
            transaction_id: 0,
            extended_address,
            address,
            data_length: 0,
            data: Vec::new(),
            status: 0,
        }
    }

    fn wait_reply(&self, transaction: &Arc<Transaction>, deadline: Instant) -> Result<Packet> {
        match transaction.slot().wait_deadline(deadline) {
            Some(outcome) => outcome,
            None => {
                if self.engine.take(transaction.transaction_id()).is_some() {
                    // We own the terminal transition; drain so no stale
                    // signal can fire once the identifier is recycled.
                    transaction.set_state(TransactionState::Timeout);
                    transaction.slot().drain();
                    debug!(
                        "transaction {:#06X} timed out",
                        transaction.transaction_id()
                    );
                    Err(Error::Timeout)
                } else {
                    // The demultiplexer claimed the transaction right at the
                    // deadline; its signal is imminent.
                    match transaction
                        .slot()
                        .wait_deadline(Instant::now() + COMPLETION_SLACK)
                    {
                        Some(outcome) => outcome,
                        None => Err(Error::Timeout),
                    }
                }
            }
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LoopbackLink;

    fn initiator() -> RmapInitiator<LoopbackLink> {
        let (near, far) = LoopbackLink::pair();
        // Keep the far end alive so sends succeed.
        std::mem::forget(far);
        RmapInitiator::new(Arc::new(RmapEngine::new(near)))
    }

    #[test]
    fn operations_require_a_directory() {
        let initiator = initiator();
        let mut buf = [0u8; 4];
        assert_eq!(
            initiator.read("obc", 0x1000, 4, &mut buf, DEFAULT_TIMEOUT),
            Err(Error::TargetDirectoryNotRegistered)
        );
        assert_eq!(
            initiator.write("obc", 0x1000, &[0x00], DEFAULT_TIMEOUT),
            Err(Error::TargetDirectoryNotRegistered)
        );
    }

    #[test]
    fn unknown_target_is_reported() {
        let mut initiator = initiator();
        initiator.set_target_directory(Arc::new(TargetDirectory::new()));
        let mut buf = [0u8; 4];
        assert_eq!(
            initiator.read("obc", 0x1000, 4, &mut buf, DEFAULT_TIMEOUT),
            Err(Error::NoSuchTargetNode)
        );
    }

    #[test]
    fn read_rejects_short_buffer() {
        let initiator = initiator();
        let node = TargetNode::new("obc", 0xFE);
        let mut buf = [0u8; 2];
        assert_eq!(
            initiator.read_node(&node, 0x1000, 4, &mut buf, DEFAULT_TIMEOUT),
            Err(Error::BufferTooSmall)
        );
    }

    #[test]
    fn rmw_rejects_odd_write_data() {
        let initiator = initiator();
        let node = TargetNode::new("obc", 0xFE);
        let mut buf = [0u8; 2];
        assert_eq!(
            initiator.rmw_node(&node, 0x1000, &[0x01, 0x02, 0x03], &mut buf, DEFAULT_TIMEOUT),
            Err(Error::RmwDataLengthInvalid)
        );
    }

    #[test]
    fn command_defaults_follow_the_modes() {
        let mut initiator = initiator();
        let node = TargetNode::new("obc", 0xFE);

        let read = initiator.build_command(&node, Operation::Read, 0, 0);
        assert!(read.increment && read.reply_expected && !read.verify);

        let write = initiator.build_command(&node, Operation::Write, 0, 0);
        assert!(write.increment && write.reply_expected && write.verify);

        initiator.set_increment_mode(false);
        initiator.set_verify_mode(false);
        initiator.set_reply_mode(false);

        let write = initiator.build_command(&node, Operation::Write, 0, 0);
        assert!(!write.increment && !write.reply_expected && !write.verify);

        // Reads ignore the configured verify and reply modes.
        let read = initiator.build_command(&node, Operation::Read, 0, 0);
        assert!(!read.increment && read.reply_expected && !read.verify);
    }

    #[test]
    fn initiator_logical_address_precedence() {
        let mut initiator = initiator();
        let mut node = TargetNode::new("obc", 0xFE);

        let command = initiator.build_command(&node, Operation::Read, 0, 0);
        assert_eq!(command.initiator_logical_address, DEFAULT_LOGICAL_ADDRESS);

        initiator.set_initiator_logical_address(0x67);
        let command = initiator.build_command(&node, Operation::Read, 0, 0);
        assert_eq!(command.initiator_logical_address, 0x67);

        // The node's override wins over the façade's setting.
        node.initiator_logical_address = Some(0x44);
        let command = initiator.build_command(&node, Operation::Read, 0, 0);
        assert_eq!(command.initiator_logical_address, 0x44);
    }
}
