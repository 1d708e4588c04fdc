//! SpaceWire link adapter trait and in-memory loopback.
//!
//! The engine depends on exactly two transport capabilities: sending one
//! frame atomically and receiving frames with a timeout.  Anything that can
//! do that - a SpaceWire interface board driver, a TCP bridge to a link
//! analyser, a loopback - can carry RMAP traffic.
//!
//! # Possible implementations
//!
//! - A driver for a SpaceWire interface board, handing frames to the board's
//!   transmit queue and draining its receive queue
//! - A bridge speaking a remote-access protocol to a link analyser or EGSE
//!   over TCP
//! - [`LoopbackLink`], the in-memory pair used by the test suite

// Copyright (C) 2025 The spacewire-rmap Developers
//
// MIT License

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::{Error, Result};

/// Contract to the SpaceWire frame transport.
///
/// Implementations are shared between the sending threads (façades) and the
/// receiving thread (the engine's demultiplexer loop), so both operations
/// take `&self`.
pub trait SpaceWireLink: Send + Sync {
    /// Send one frame, all or nothing.  Returns once the link has accepted
    /// the frame.
    fn send(&self, frame: &[u8]) -> Result<()>;

    /// Receive the next frame, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when no frame arrived in time, and
    /// [`Error::LinkClosed`] once the link can deliver no more frames.
    fn recv(&self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// In-memory link: frames sent on one end arrive at the other.
///
/// Each end is a full [`SpaceWireLink`]; give one end to an engine and drive
/// the other from a test or a simulated target.
pub struct LoopbackLink {
    tx: Mutex<Sender<Vec<u8>>>,
    rx: Mutex<Receiver<Vec<u8>>>,
}

impl LoopbackLink {
    /// Create a connected pair of link ends.
    pub fn pair() -> (LoopbackLink, LoopbackLink) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        (
            LoopbackLink {
                tx: Mutex::new(a_tx),
                rx: Mutex::new(a_rx),
            },
            LoopbackLink {
                tx: Mutex::new(b_tx),
                rx: Mutex::new(b_rx),
            },
        )
    }
}

impl SpaceWireLink for LoopbackLink {
    fn send(&self, frame: &[u8]) -> Result<()> {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(frame.to_vec())
            .map_err(|_| Error::LinkClosed)
    }

    fn recv(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        match self
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv_timeout(timeout)
        {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::LinkClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_cross_the_pair() {
        let (a, b) = LoopbackLink::pair();
        a.send(&[0x01, 0x02]).unwrap();
        b.send(&[0x03]).unwrap();

        assert_eq!(
            b.recv(Duration::from_millis(100)).unwrap(),
            Some(vec![0x01, 0x02])
        );
        assert_eq!(a.recv(Duration::from_millis(100)).unwrap(), Some(vec![0x03]));
    }

    #[test]
    fn recv_times_out_empty() {
        let (a, _b) = LoopbackLink::pair();
        assert_eq!(a.recv(Duration::from_millis(10)).unwrap(), None);
    }

    #[test]
    fn dropped_peer_closes_the_link() {
        let (a, b) = LoopbackLink::pair();
        drop(b);
        assert_eq!(a.send(&[0x00]), Err(Error::LinkClosed));
        assert_eq!(a.recv(Duration::from_millis(10)), Err(Error::LinkClosed));
    }
}
