//! RMAP initiator crate for remote memory access over SpaceWire links.
//!
//! RMAP (Remote Memory Access Protocol, ECSS-E-ST-50-52C) is a request/
//! response protocol carried over SpaceWire that lets one node read, write
//! and read-modify-write the memory map of another node.  This crate
//! implements the *initiator* side: it builds command packets, hands them to
//! a SpaceWire link, correlates replies by transaction identifier, and
//! surfaces results or structured errors to the caller.
//!
//! ## Architecture
//!
//! Three layers sit between the caller and the wire:
//!
//! - **Façade** ([`initiator::RmapInitiator`]) - the public read/write/RMW
//!   operations.  Resolves symbolic targets through a
//!   [`directory::TargetDirectory`], builds command packets, and blocks the
//!   calling thread until the reply arrives or the per-call timeout elapses.
//!   Operations on one façade are serialised; create several façades over
//!   the same engine for concurrent traffic (they are distinguished by
//!   transaction identifier).
//! - **Engine** ([`engine::RmapEngine`]) - the transaction engine.  Owns the
//!   transaction table (allocation and recycling of 16-bit transaction
//!   identifiers, pairing of commands with replies) and the reply
//!   demultiplexer loop that parses inbound frames and releases the right
//!   waiter.  The engine owns no threads: the embedder calls
//!   [`engine::RmapEngine::run()`] on a thread (or dispatcher) of its
//!   choosing.
//! - **Link** ([`link::SpaceWireLink`]) - the narrow contract to the
//!   SpaceWire transport: send one frame atomically, receive frames with a
//!   timeout.  [`link::LoopbackLink`] provides an in-memory implementation
//!   used by the test suite and useful for embedder smoke tests.
//!
//! Packet encoding and decoding, including the RMAP CRC-8, live in
//! [`packet`].  Target node and memory object records live in
//! [`directory`].
//!
//! ## Getting Started
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use spacewire_rmap::engine::RmapEngine;
//! use spacewire_rmap::initiator::RmapInitiator;
//!
//! let link = /* your SpaceWireLink implementation */;
//! let engine = Arc::new(RmapEngine::new(link));
//!
//! // The embedder provides the dispatcher for the reply loop.
//! let demux = {
//!     let engine = Arc::clone(&engine);
//!     std::thread::spawn(move || engine.run())
//! };
//!
//! let mut initiator = RmapInitiator::new(Arc::clone(&engine));
//! initiator.set_target_directory(directory);
//!
//! let mut buf = [0u8; 4];
//! initiator.read("obc", 0x0000_1000, 4, &mut buf, Duration::from_millis(1000))?;
//!
//! engine.shutdown();
//! demux.join().unwrap()?;
//! ```
//!
//! ## Modules
//!
//! - [`directory`] - Target node and memory object records, keyed by
//!   identifier
//! - [`engine`] - Transaction table and reply demultiplexer
//! - [`initiator`] - Public read/write/RMW façade with per-call timeouts
//! - [`link`] - SpaceWire link adapter trait and in-memory loopback
//! - [`packet`] - RMAP packet codec and CRC-8
//!
//! ## Features
//!
//! Default features:
//! - `serde` - Derive `serde::Deserialize` on the directory record types so
//!   an external configuration loader can build a target directory from any
//!   serde format.  The crate itself performs no file I/O.
//!
//! ## Scope
//!
//! This crate is initiator-only.  It does not implement a target
//! (responder), does not strip path addresses on behalf of routers, and
//! leaves frame transport and configuration loading to the embedder.

// Copyright (C) 2025 The spacewire-rmap Developers
//
// MIT License

use core::fmt;

pub mod directory;
pub mod engine;
pub mod initiator;
pub mod link;
pub mod packet;

/// RMAP initiator errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No reply arrived within the caller's deadline
    Timeout,
    /// The transaction was cancelled before completion
    Cancelled,
    /// Read reply carried fewer data bytes than requested
    ReadReplyWithInsufficientData,
    /// Read reply carried more data bytes than requested
    ReadReplyWithTooMuchData,
    /// A reply arrived whose operation does not match its command
    UnexpectedWriteReplyReceived,
    /// The command could not be handed to the link
    TransactionCouldNotBeInitiated,
    /// The pinned transaction identifier is already owned by a live
    /// transaction
    TransactionIdInUse,
    /// No target node with the given identifier
    NoSuchTargetNode,
    /// No memory object with the given identifier
    NoSuchMemoryObject,
    /// Operation requires a target directory but none is registered
    TargetDirectoryNotRegistered,
    /// Memory object does not carry the readable capability
    MemoryObjectNotReadable,
    /// Memory object does not carry the writable capability
    MemoryObjectNotWritable,
    /// Memory object does not carry the read-modify-write capability
    MemoryObjectNotRmwable,
    /// The target returned a non-zero reply status
    ReplyError {
        /// Raw 8-bit status code from the reply header
        status: u8,
    },
    /// Frame does not carry the RMAP protocol identifier (0x01)
    ProtocolId,
    /// Header CRC check failed
    HeaderCrc,
    /// Data CRC check failed
    DataCrc,
    /// Declared data length does not match the received data
    DataLengthMismatch,
    /// Instruction byte cannot represent or be decoded to a valid packet
    InvalidInstruction,
    /// Frame too short to hold the fields it declares
    IncompleteFrame,
    /// Reply address longer than the 12 bytes the instruction byte can carry
    ReplyAddressTooLong,
    /// Data does not fit the 24-bit length field
    DataTooLarge,
    /// Read-modify-write data must hold value and mask of equal length
    RmwDataLengthInvalid,
    /// Caller's buffer too small for the operation
    BufferTooSmall,
    /// Payload too large for the memory object
    PayloadTooLarge,
    /// I/O error
    Io,
    /// Link transport error
    Link,
    /// Link closed
    LinkClosed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Timeout => write!(f, "no reply within the deadline"),
            Error::Cancelled => write!(f, "transaction was cancelled"),
            Error::ReadReplyWithInsufficientData => {
                write!(f, "read reply carried fewer data bytes than requested")
            }
            Error::ReadReplyWithTooMuchData => {
                write!(f, "read reply carried more data bytes than requested")
            }
            Error::UnexpectedWriteReplyReceived => {
                write!(f, "reply operation does not match the command")
            }
            Error::TransactionCouldNotBeInitiated => {
                write!(f, "command could not be handed to the link")
            }
            Error::TransactionIdInUse => {
                write!(f, "transaction identifier is already in use")
            }
            Error::NoSuchTargetNode => write!(f, "no such target node"),
            Error::NoSuchMemoryObject => write!(f, "no such memory object"),
            Error::TargetDirectoryNotRegistered => {
                write!(f, "no target directory is registered")
            }
            Error::MemoryObjectNotReadable => write!(f, "memory object is not readable"),
            Error::MemoryObjectNotWritable => write!(f, "memory object is not writable"),
            Error::MemoryObjectNotRmwable => {
                write!(f, "memory object is not read-modify-write capable")
            }
            Error::ReplyError { status } => write!(
                f,
                "target returned reply status {status:#04X} ({})",
                packet::describe_status(*status)
            ),
            Error::ProtocolId => {
                write!(f, "frame does not carry the RMAP protocol identifier")
            }
            Error::HeaderCrc => write!(f, "header CRC check failed"),
            Error::DataCrc => write!(f, "data CRC check failed"),
            Error::DataLengthMismatch => {
                write!(f, "declared data length does not match the received data")
            }
            Error::InvalidInstruction => write!(f, "invalid instruction byte"),
            Error::IncompleteFrame => write!(f, "frame is too short"),
            Error::ReplyAddressTooLong => {
                write!(f, "reply address exceeds the maximum of 12 bytes")
            }
            Error::DataTooLarge => write!(f, "data does not fit a 24-bit length field"),
            Error::RmwDataLengthInvalid => write!(
                f,
                "read-modify-write data must hold value and mask of equal length"
            ),
            Error::BufferTooSmall => write!(f, "buffer too small for operation"),
            Error::PayloadTooLarge => write!(f, "payload too large for memory object"),
            Error::Io => write!(f, "I/O error"),
            Error::Link => write!(f, "link transport error"),
            Error::LinkClosed => write!(f, "link closed"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(_: std::io::Error) -> Self {
        Error::Io
    }
}

/// Type to represent the result of an RMAP operation
pub type Result<T> = core::result::Result<T, Error>;
