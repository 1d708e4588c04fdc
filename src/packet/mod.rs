//! RMAP packet codec: command encoding, reply decoding and validation.
//!
//! An RMAP command is laid out as follows (all multi-byte fields big-endian):
//!
//! ```text
//! [target SpaceWire path...]    stripped by routers en route to the target
//! target logical address  (1)
//! protocol identifier     (1)   always 0x01
//! instruction             (1)   kind/op/flags/reply-path length
//! key                     (1)
//! [reply path, zero-padded to a multiple of 4]
//! initiator logical address (1)
//! transaction identifier  (2)
//! extended address        (1)
//! address                 (4)
//! data length             (3)
//! header CRC              (1)   over everything from the target logical
//!                               address, inclusive
//! [data...]                     write and RMW commands only
//! [data CRC (1)]                present whenever data is
//! ```
//!
//! A reply mirrors the command but substitutes initiator routing:
//!
//! ```text
//! initiator logical address (1)
//! protocol identifier     (1)
//! instruction             (1)   command bit cleared
//! status                  (1)   zero on success
//! target logical address  (1)
//! transaction identifier  (2)
//! [read/RMW: reserved (1), data length (3), header CRC (1), data, data CRC]
//! [write:    header CRC (1)]
//! ```
//!
//! The instruction byte encodes, from the top bit down: reserved (0),
//! command/reply, write/read, verify, reply-expected, increment, and the
//! reply-path length in 4-byte units.  A read-side instruction with the
//! verify bit set is a read-modify-write; plain reads never carry verify.
//!
//! Decoding validates the protocol identifier, the header CRC, the data CRC
//! where a data segment is present, and that the declared data length
//! matches the received bytes.  Each check failure yields a distinct
//! [`Error`] so the demultiplexer can account for dropped frames.

// Copyright (C) 2025 The spacewire-rmap Developers
//
// MIT License

pub mod crc;

pub use crc::crc8;

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{Error, Result};

/// RMAP protocol identifier, the second byte of every frame.
pub const PROTOCOL_IDENTIFIER: u8 = 0x01;

/// Largest data length the 24-bit length field can carry.
pub const MAX_DATA_LENGTH: u32 = (1 << 24) - 1;

/// Largest reply address the two instruction bits can describe (3 units of
/// 4 bytes).
pub const MAX_REPLY_ADDRESS_LENGTH: usize = 12;

/// Whether a packet is a command or a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Command,
    Reply,
}

/// The memory operation a packet performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    ReadModifyWrite,
}

impl Operation {
    /// Whether a packet of this operation and kind carries a data segment.
    pub fn carries_data(self, kind: PacketKind) -> bool {
        match kind {
            PacketKind::Command => self != Operation::Read,
            PacketKind::Reply => self != Operation::Write,
        }
    }
}

/// Decoded form of the instruction byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub kind: PacketKind,
    pub operation: Operation,
    pub verify: bool,
    pub reply_expected: bool,
    pub increment: bool,
    /// Reply path length in 4-byte units (0..=3)
    pub reply_path_units: u8,
}

const INSTRUCTION_RESERVED: u8 = 0x80;
const INSTRUCTION_COMMAND: u8 = 0x40;
const INSTRUCTION_WRITE: u8 = 0x20;
const INSTRUCTION_VERIFY: u8 = 0x10;
const INSTRUCTION_REPLY: u8 = 0x08;
const INSTRUCTION_INCREMENT: u8 = 0x04;
const INSTRUCTION_PATH_UNITS: u8 = 0x03;

impl Instruction {
    /// Encode to the on-wire instruction byte.
    ///
    /// A plain read with the verify flag has no wire representation (that
    /// bit pattern is a read-modify-write) and is rejected.
    pub fn encode(self) -> Result<u8> {
        if self.reply_path_units > 3 {
            return Err(Error::ReplyAddressTooLong);
        }
        let mut byte = self.reply_path_units & INSTRUCTION_PATH_UNITS;
        if self.kind == PacketKind::Command {
            byte |= INSTRUCTION_COMMAND;
        }
        match self.operation {
            Operation::Write => {
                byte |= INSTRUCTION_WRITE;
                if self.verify {
                    byte |= INSTRUCTION_VERIFY;
                }
            }
            Operation::ReadModifyWrite => byte |= INSTRUCTION_VERIFY,
            Operation::Read => {
                if self.verify {
                    return Err(Error::InvalidInstruction);
                }
            }
        }
        if self.reply_expected {
            byte |= INSTRUCTION_REPLY;
        }
        if self.increment {
            byte |= INSTRUCTION_INCREMENT;
        }
        Ok(byte)
    }

    /// Decode the on-wire instruction byte.  The reserved top bit must be
    /// clear.
    pub fn decode(byte: u8) -> Result<Self> {
        if byte & INSTRUCTION_RESERVED != 0 {
            return Err(Error::InvalidInstruction);
        }
        let kind = if byte & INSTRUCTION_COMMAND != 0 {
            PacketKind::Command
        } else {
            PacketKind::Reply
        };
        let (operation, verify) = if byte & INSTRUCTION_WRITE != 0 {
            (Operation::Write, byte & INSTRUCTION_VERIFY != 0)
        } else if byte & INSTRUCTION_VERIFY != 0 {
            (Operation::ReadModifyWrite, true)
        } else {
            (Operation::Read, false)
        };
        Ok(Self {
            kind,
            operation,
            verify,
            reply_expected: byte & INSTRUCTION_REPLY != 0,
            increment: byte & INSTRUCTION_INCREMENT != 0,
            reply_path_units: byte & INSTRUCTION_PATH_UNITS,
        })
    }
}

/// In-memory form of an RMAP frame.
///
/// `data_length` is the value of the 24-bit length field.  For read commands
/// it is the number of bytes requested; for every data-bearing packet the
/// encoder derives the field from `data.len()` instead, so the two never
/// disagree on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    pub operation: Operation,
    pub increment: bool,
    pub verify: bool,
    pub reply_expected: bool,
    pub initiator_logical_address: u8,
    pub target_logical_address: u8,
    pub key: u8,
    /// Router bytes prefixed to a command; never part of the CRC-protected
    /// header.
    pub target_spacewire_address: Vec<u8>,
    /// Routing bytes the target uses to send the reply back.  Zero-padded at
    /// encode time to the next multiple of 4, at most 12 bytes.
    pub reply_address: Vec<u8>,
    pub transaction_id: u16,
    pub extended_address: u8,
    pub address: u32,
    pub data_length: u32,
    pub data: Vec<u8>,
    /// Reply status; zero means the command executed successfully.
    pub status: u8,
}

impl Packet {
    /// The instruction byte fields this packet encodes to.
    pub fn instruction(&self) -> Result<Instruction> {
        let padded = padded_reply_address(&self.reply_address)?;
        Ok(Instruction {
            kind: self.kind,
            operation: self.operation,
            verify: match self.operation {
                Operation::ReadModifyWrite => true,
                _ => self.verify,
            },
            reply_expected: self.reply_expected,
            increment: self.increment,
            reply_path_units: (padded.len() / 4) as u8,
        })
    }

    /// Encode to on-wire bytes, computing header and data CRCs.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.data.len() as u64 > MAX_DATA_LENGTH as u64 || self.data_length > MAX_DATA_LENGTH {
            return Err(Error::DataTooLarge);
        }
        match self.kind {
            PacketKind::Command => self.encode_command(),
            PacketKind::Reply => self.encode_reply(),
        }
    }

    fn encode_command(&self) -> Result<Vec<u8>> {
        let reply_address = padded_reply_address(&self.reply_address)?;
        let instruction = self.instruction()?.encode()?;
        let carries_data = self.operation.carries_data(PacketKind::Command);

        let mut buf = Vec::with_capacity(
            self.target_spacewire_address.len() + reply_address.len() + 16 + self.data.len() + 1,
        );
        buf.write_all(&self.target_spacewire_address)?;
        let header_start = buf.len();
        buf.write_u8(self.target_logical_address)?;
        buf.write_u8(PROTOCOL_IDENTIFIER)?;
        buf.write_u8(instruction)?;
        buf.write_u8(self.key)?;
        buf.write_all(&reply_address)?;
        buf.write_u8(self.initiator_logical_address)?;
        buf.write_u16::<BigEndian>(self.transaction_id)?;
        buf.write_u8(self.extended_address)?;
        buf.write_u32::<BigEndian>(self.address)?;
        let length = if carries_data {
            self.data.len() as u32
        } else {
            self.data_length
        };
        buf.write_u24::<BigEndian>(length)?;
        let header_crc = crc8(&buf[header_start..]);
        buf.write_u8(header_crc)?;
        if carries_data {
            buf.write_all(&self.data)?;
            buf.write_u8(crc8(&self.data))?;
        }
        Ok(buf)
    }

    fn encode_reply(&self) -> Result<Vec<u8>> {
        let instruction = self.instruction()?.encode()?;
        let carries_data = self.operation.carries_data(PacketKind::Reply);

        let mut buf = Vec::with_capacity(12 + self.data.len() + 1);
        buf.write_u8(self.initiator_logical_address)?;
        buf.write_u8(PROTOCOL_IDENTIFIER)?;
        buf.write_u8(instruction)?;
        buf.write_u8(self.status)?;
        buf.write_u8(self.target_logical_address)?;
        buf.write_u16::<BigEndian>(self.transaction_id)?;
        if carries_data {
            buf.write_u8(0x00)?;
            buf.write_u24::<BigEndian>(self.data.len() as u32)?;
            let header_crc = crc8(&buf);
            buf.write_u8(header_crc)?;
            buf.write_all(&self.data)?;
            buf.write_u8(crc8(&self.data))?;
        } else {
            let header_crc = crc8(&buf);
            buf.write_u8(header_crc)?;
        }
        Ok(buf)
    }

    /// Decode and validate a reply frame.
    ///
    /// The frame must start at the initiator logical address; any leading
    /// reply path bytes have already been consumed by the routers.
    pub fn decode_reply(frame: &[u8]) -> Result<Packet> {
        let mut r = Cursor::new(frame);
        let initiator_logical_address = read_u8(&mut r)?;
        let protocol = read_u8(&mut r)?;
        if protocol != PROTOCOL_IDENTIFIER {
            return Err(Error::ProtocolId);
        }
        let instruction = Instruction::decode(read_u8(&mut r)?)?;
        if instruction.kind != PacketKind::Reply {
            return Err(Error::InvalidInstruction);
        }
        let status = read_u8(&mut r)?;
        let target_logical_address = read_u8(&mut r)?;
        let transaction_id = r.read_u16::<BigEndian>().map_err(|_| Error::IncompleteFrame)?;

        let (data_length, data) = if instruction.operation.carries_data(PacketKind::Reply) {
            let _reserved = read_u8(&mut r)?;
            let data_length = r.read_u24::<BigEndian>().map_err(|_| Error::IncompleteFrame)?;
            let header_end = r.position() as usize;
            let header_crc = read_u8(&mut r)?;
            if crc8(&frame[..header_end]) != header_crc {
                return Err(Error::HeaderCrc);
            }
            let data_start = header_end + 1;
            if frame.len() < data_start + 1 {
                return Err(Error::IncompleteFrame);
            }
            let received = frame.len() - data_start - 1;
            if received as u32 != data_length {
                return Err(Error::DataLengthMismatch);
            }
            let data = frame[data_start..data_start + received].to_vec();
            if crc8(&data) != frame[frame.len() - 1] {
                return Err(Error::DataCrc);
            }
            (data_length, data)
        } else {
            let header_end = r.position() as usize;
            let header_crc = read_u8(&mut r)?;
            if crc8(&frame[..header_end]) != header_crc {
                return Err(Error::HeaderCrc);
            }
            if frame.len() != header_end + 1 {
                return Err(Error::DataLengthMismatch);
            }
            (0, Vec::new())
        };

        Ok(Packet {
            kind: PacketKind::Reply,
            operation: instruction.operation,
            increment: instruction.increment,
            verify: instruction.verify,
            reply_expected: instruction.reply_expected,
            initiator_logical_address,
            target_logical_address,
            key: 0,
            target_spacewire_address: Vec::new(),
            reply_address: Vec::new(),
            transaction_id,
            extended_address: 0,
            address: 0,
            data_length,
            data,
            status,
        })
    }

    /// Decode and validate a command frame.
    ///
    /// The frame must start at the target logical address; any leading
    /// target path bytes have already been consumed by the routers.  Mainly
    /// of use to test harnesses standing in for a target.
    pub fn decode_command(frame: &[u8]) -> Result<Packet> {
        let mut r = Cursor::new(frame);
        let target_logical_address = read_u8(&mut r)?;
        let protocol = read_u8(&mut r)?;
        if protocol != PROTOCOL_IDENTIFIER {
            return Err(Error::ProtocolId);
        }
        let instruction = Instruction::decode(read_u8(&mut r)?)?;
        if instruction.kind != PacketKind::Command {
            return Err(Error::InvalidInstruction);
        }
        let key = read_u8(&mut r)?;
        let mut reply_address = vec![0u8; instruction.reply_path_units as usize * 4];
        r.read_exact(&mut reply_address)
            .map_err(|_| Error::IncompleteFrame)?;
        let initiator_logical_address = read_u8(&mut r)?;
        let transaction_id = r.read_u16::<BigEndian>().map_err(|_| Error::IncompleteFrame)?;
        let extended_address = read_u8(&mut r)?;
        let address = r.read_u32::<BigEndian>().map_err(|_| Error::IncompleteFrame)?;
        let data_length = r.read_u24::<BigEndian>().map_err(|_| Error::IncompleteFrame)?;
        let header_end = r.position() as usize;
        let header_crc = read_u8(&mut r)?;
        if crc8(&frame[..header_end]) != header_crc {
            return Err(Error::HeaderCrc);
        }

        let data = if instruction.operation.carries_data(PacketKind::Command) {
            let data_start = header_end + 1;
            if frame.len() < data_start + 1 {
                return Err(Error::IncompleteFrame);
            }
            let received = frame.len() - data_start - 1;
            if received as u32 != data_length {
                return Err(Error::DataLengthMismatch);
            }
            let data = frame[data_start..data_start + received].to_vec();
            if crc8(&data) != frame[frame.len() - 1] {
                return Err(Error::DataCrc);
            }
            data
        } else {
            if frame.len() != header_end + 1 {
                return Err(Error::DataLengthMismatch);
            }
            Vec::new()
        };

        Ok(Packet {
            kind: PacketKind::Command,
            operation: instruction.operation,
            increment: instruction.increment,
            verify: instruction.verify,
            reply_expected: instruction.reply_expected,
            initiator_logical_address,
            target_logical_address,
            key,
            target_spacewire_address: Vec::new(),
            reply_address,
            transaction_id,
            extended_address,
            address,
            data_length,
            data,
            status: 0,
        })
    }

    /// Build the reply a well-behaved target would send for `command`.
    ///
    /// `data` is ignored for write commands, which reply with a bare header.
    /// Used by test harnesses standing in for a target.
    pub fn reply_for(command: &Packet, status: u8, data: &[u8]) -> Packet {
        let data = if command.operation.carries_data(PacketKind::Reply) {
            data.to_vec()
        } else {
            Vec::new()
        };
        Packet {
            kind: PacketKind::Reply,
            operation: command.operation,
            increment: command.increment,
            verify: command.verify,
            reply_expected: command.reply_expected,
            initiator_logical_address: command.initiator_logical_address,
            target_logical_address: command.target_logical_address,
            key: 0,
            target_spacewire_address: Vec::new(),
            reply_address: Vec::new(),
            transaction_id: command.transaction_id,
            extended_address: 0,
            address: 0,
            data_length: data.len() as u32,
            data,
            status,
        }
    }
}

/// Reply status codes defined by the RMAP standard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyStatus {
    CommandExecutedSuccessfully = 0x00,
    GeneralErrorCode = 0x01,
    UnusedPacketTypeOrCommandCode = 0x02,
    InvalidKey = 0x03,
    InvalidDataCrc = 0x04,
    EarlyEop = 0x05,
    TooMuchData = 0x06,
    Eep = 0x07,
    VerifyBufferOverrun = 0x09,
    CommandNotImplementedOrNotAuthorised = 0x0A,
    RmwDataLengthError = 0x0B,
    InvalidTargetLogicalAddress = 0x0C,
}

impl ReplyStatus {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::CommandExecutedSuccessfully),
            0x01 => Some(Self::GeneralErrorCode),
            0x02 => Some(Self::UnusedPacketTypeOrCommandCode),
            0x03 => Some(Self::InvalidKey),
            0x04 => Some(Self::InvalidDataCrc),
            0x05 => Some(Self::EarlyEop),
            0x06 => Some(Self::TooMuchData),
            0x07 => Some(Self::Eep),
            0x09 => Some(Self::VerifyBufferOverrun),
            0x0A => Some(Self::CommandNotImplementedOrNotAuthorised),
            0x0B => Some(Self::RmwDataLengthError),
            0x0C => Some(Self::InvalidTargetLogicalAddress),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::CommandExecutedSuccessfully => "command executed successfully",
            Self::GeneralErrorCode => "general error",
            Self::UnusedPacketTypeOrCommandCode => "unused packet type or command code",
            Self::InvalidKey => "invalid key",
            Self::InvalidDataCrc => "invalid data CRC",
            Self::EarlyEop => "early EOP",
            Self::TooMuchData => "too much data",
            Self::Eep => "EEP",
            Self::VerifyBufferOverrun => "verify buffer overrun",
            Self::CommandNotImplementedOrNotAuthorised => {
                "command not implemented or not authorised"
            }
            Self::RmwDataLengthError => "RMW data length error",
            Self::InvalidTargetLogicalAddress => "invalid target logical address",
        }
    }
}

/// Human-readable form of a raw reply status code.
pub fn describe_status(code: u8) -> &'static str {
    match ReplyStatus::from_code(code) {
        Some(status) => status.description(),
        None => "reserved status code",
    }
}

/// Zero-pad a reply address at the front to the next multiple of 4.
/// Routers skip leading zero bytes, so the padding is inert on the wire.
fn padded_reply_address(reply_address: &[u8]) -> Result<Vec<u8>> {
    if reply_address.len() > MAX_REPLY_ADDRESS_LENGTH {
        return Err(Error::ReplyAddressTooLong);
    }
    let padded_len = reply_address.len().div_ceil(4) * 4;
    let mut padded = vec![0u8; padded_len - reply_address.len()];
    padded.extend_from_slice(reply_address);
    Ok(padded)
}

fn read_u8(r: &mut Cursor<&[u8]>) -> Result<u8> {
    r.read_u8().map_err(|_| Error::IncompleteFrame)
}

#[cfg(test)]
mod tests {
    use super::*;

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
            transaction_id: 0x0000,
            extended_address: 0x00,
            address: 0x0000_1000,
            data_length: 4,
            data: Vec::new(),
            status: 0,
        }
    }

    #[test]
    fn simple_read_command_bytes() {
        let frame = read_command().encode().unwrap();
        assert_eq!(frame.len(), 16);
        assert_eq!(
            &frame[..15],
            &[
                0xFE, 0x01, 0x4C, 0x20, 0x67, // header start
                0x00, 0x00, // transaction identifier
                0x00, // extended address
                0x00, 0x00, 0x10, 0x00, // address
                0x00, 0x00, 0x04, // data length
            ]
        );
        // Appending the header CRC leaves a zero residue.
        assert_eq!(crc8(&frame), 0x00);
    }

    #[test]
    fn simple_read_reply_bytes() {
        let reply = Packet::reply_for(&read_command(), 0x00, &[0x11, 0x22, 0x33, 0x44]);
        let frame = reply.encode().unwrap();
        assert_eq!(&frame[..5], &[0x67, 0x01, 0x0C, 0x00, 0xFE]);
        assert_eq!(&frame[8..11], &[0x00, 0x00, 0x04]);
        assert_eq!(frame.len(), 12 + 4 + 1);

        let decoded = Packet::decode_reply(&frame).unwrap();
        assert_eq!(decoded.data, vec![0x11, 0x22, 0x33, 0x44]);
        assert_eq!(decoded.status, 0x00);
    }

    #[test]
    fn instruction_round_trip_over_valid_domain() {
        let kinds = [PacketKind::Command, PacketKind::Reply];
        let cases = [
            (Operation::Read, false),
            (Operation::Write, false),
            (Operation::Write, true),
            (Operation::ReadModifyWrite, true),
        ];
        for kind in kinds {
            for (operation, verify) in cases {
                for reply_expected in [false, true] {
                    for increment in [false, true] {
                        for reply_path_units in 0..=3u8 {
                            let instruction = Instruction {
                                kind,
                                operation,
                                verify,
                                reply_expected,
                                increment,
                                reply_path_units,
                            };
                            let byte = instruction.encode().unwrap();
                            assert_eq!(Instruction::decode(byte).unwrap(), instruction);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn read_with_verify_has_no_encoding() {
        let instruction = Instruction {
            kind: PacketKind::Command,
            operation: Operation::Read,
            verify: true,
            reply_expected: true,
            increment: true,
            reply_path_units: 0,
        };
        assert_eq!(instruction.encode(), Err(Error::InvalidInstruction));
    }

    #[test]
    fn write_command_round_trip() {
        let mut command = read_command();
        command.operation = Operation::Write;
        command.verify = true;
        command.reply_address = vec![0x09, 0x0A];
        command.transaction_id = 0x1234;
        command.data = vec![0xDE, 0xAD];
        command.data_length = 2;

        let frame = command.encode().unwrap();
        let decoded = Packet::decode_command(&frame).unwrap();
        assert_eq!(decoded.operation, Operation::Write);
        assert_eq!(decoded.transaction_id, 0x1234);
        assert_eq!(decoded.data, vec![0xDE, 0xAD]);
        // Padding is prepended and survives the round trip.
        assert_eq!(decoded.reply_address, vec![0x00, 0x00, 0x09, 0x0A]);
        assert_eq!(decoded.instruction().unwrap().reply_path_units, 1);
    }

    #[test]
    fn reply_address_limits() {
        let mut command = read_command();
        command.reply_address = vec![0x01; 13];
        assert_eq!(command.encode(), Err(Error::ReplyAddressTooLong));

        command.reply_address = vec![0x01; 12];
        assert!(command.encode().is_ok());
    }

    #[test]
    fn decode_reply_rejects_bad_frames() {
        let reply = Packet::reply_for(&read_command(), 0x00, &[0x11, 0x22, 0x33, 0x44]);
        let frame = reply.encode().unwrap();

        // Wrong protocol identifier.
        let mut bad = frame.clone();
        bad[1] = 0x02;
        assert_eq!(Packet::decode_reply(&bad), Err(Error::ProtocolId));

        // Flipped bit in the header CRC.
        let mut bad = frame.clone();
        bad[11] ^= 0x01;
        assert_eq!(Packet::decode_reply(&bad), Err(Error::HeaderCrc));

        // Corrupted data byte fails the data CRC.
        let mut bad = frame.clone();
        bad[13] ^= 0x80;
        assert_eq!(Packet::decode_reply(&bad), Err(Error::DataCrc));

        // Truncated frame.
        assert_eq!(Packet::decode_reply(&frame[..6]), Err(Error::IncompleteFrame));

        // A command frame is not a reply.
        let command_frame = read_command().encode().unwrap();
        assert_eq!(
            Packet::decode_reply(&command_frame),
            Err(Error::InvalidInstruction)
        );

        // Reserved instruction bit.
        let mut bad = frame.clone();
        bad[2] |= 0x80;
        assert_eq!(Packet::decode_reply(&bad), Err(Error::InvalidInstruction));
    }

    #[test]
    fn decode_reply_rejects_length_mismatch() {
        let reply = Packet::reply_for(&read_command(), 0x00, &[0x11, 0x22, 0x33, 0x44]);
        let mut frame = reply.encode().unwrap();
        // Claim 5 bytes while carrying 4; re-stamp the header CRC so only
        // the length check can fire.
        frame[10] = 0x05;
        frame[11] = crc8(&frame[..11]);
        assert_eq!(Packet::decode_reply(&frame), Err(Error::DataLengthMismatch));
    }

    #[test]
    fn write_reply_is_a_bare_header() {
        let mut command = read_command();
        command.operation = Operation::Write;
        command.data = vec![0xDE, 0xAD];

        let reply = Packet::reply_for(&command, 0x00, &[0xFF]);
        assert!(reply.data.is_empty());
        let frame = reply.encode().unwrap();
        assert_eq!(frame.len(), 8);

        let decoded = Packet::decode_reply(&frame).unwrap();
        assert_eq!(decoded.operation, Operation::Write);
        assert!(decoded.data.is_empty());
    }

    #[test]
    fn status_descriptions() {
        assert_eq!(describe_status(0x00), "command executed successfully");
        assert_eq!(describe_status(0x03), "invalid key");
        assert_eq!(describe_status(0x0C), "invalid target logical address");
        assert_eq!(describe_status(0x42), "reserved status code");
    }
}
