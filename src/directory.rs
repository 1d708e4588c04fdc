//! Target node and memory object records.
//!
//! A [`TargetDirectory`] maps symbolic identifiers to [`TargetNode`]
//! records: the logical address, routing bytes and access key needed to
//! build a command for that node, plus zero or more named [`MemoryObject`]
//! regions with their capabilities.  The directory is immutable once handed
//! to an initiator.
//!
//! Loading the records from a configuration file is the embedder's job; with
//! the `serde` feature (on by default) the record types derive
//! `serde::Deserialize` so any serde format will do.

// Copyright (C) 2025 The spacewire-rmap Developers
//
// MIT License

use core::fmt;
use std::collections::HashMap;

use crate::{Error, Result};

/// Logical address used when neither the façade nor the target node sets
/// one.
pub const DEFAULT_LOGICAL_ADDRESS: u8 = 0xFE;

/// Access key used when a node record does not set one.
pub const DEFAULT_KEY: u8 = 0x20;

/// A named region of a target node's memory map
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct MemoryObject {
    pub id: String,
    pub address: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub extended_address: u8,
    pub length: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub readable: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub writable: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub rmwable: bool,
}

impl fmt::Display for MemoryObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut capabilities = String::new();
        if self.readable {
            capabilities.push('r');
        }
        if self.writable {
            capabilities.push('w');
        }
        if self.rmwable {
            capabilities.push('m');
        }
        write!(
            f,
            "{}: {:#04X}:{:#010X} +{} [{capabilities}]",
            self.id, self.extended_address, self.address, self.length
        )
    }
}

/// A target node: everything needed to address one RMAP responder
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct TargetNode {
    pub id: String,
    pub target_logical_address: u8,
    /// Router bytes prefixed to commands sent to this node
    #[cfg_attr(feature = "serde", serde(default))]
    pub target_spacewire_address: Vec<u8>,
    /// Router bytes the target prefixes to its replies
    #[cfg_attr(feature = "serde", serde(default))]
    pub reply_address: Vec<u8>,
    #[cfg_attr(feature = "serde", serde(default = "default_key"))]
    pub key: u8,
    /// Overrides the façade's initiator logical address when set
    #[cfg_attr(feature = "serde", serde(default))]
    pub initiator_logical_address: Option<u8>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub memory_objects: Vec<MemoryObject>,
}

#[cfg(feature = "serde")]
fn default_key() -> u8 {
    DEFAULT_KEY
}

impl TargetNode {
    /// New node with the given identifier and logical address, the default
    /// key, no routing bytes and no memory objects.
    pub fn new(id: impl Into<String>, target_logical_address: u8) -> Self {
        Self {
            id: id.into(),
            target_logical_address,
            target_spacewire_address: Vec::new(),
            reply_address: Vec::new(),
            key: DEFAULT_KEY,
            initiator_logical_address: None,
            memory_objects: Vec::new(),
        }
    }

    /// Add a memory object, replacing any existing object with the same
    /// identifier.
    pub fn add_memory_object(&mut self, object: MemoryObject) {
        self.memory_objects.retain(|existing| existing.id != object.id);
        self.memory_objects.push(object);
    }

    /// Look up a memory object by identifier.
    pub fn get_memory(&self, id: &str) -> Result<&MemoryObject> {
        self.find_memory(id).ok_or(Error::NoSuchMemoryObject)
    }

    /// Look up a memory object by identifier, `None` when not found.
    pub fn find_memory(&self, id: &str) -> Option<&MemoryObject> {
        self.memory_objects.iter().find(|object| object.id == id)
    }
}

impl fmt::Display for TargetNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: logical address {:#04X}, key {:#04X}",
            self.id, self.target_logical_address, self.key
        )?;
        if let Some(initiator) = self.initiator_logical_address {
            write!(f, ", initiator {initiator:#04X}")?;
        }
        if !self.target_spacewire_address.is_empty() {
            write!(f, ", path {:02X?}", self.target_spacewire_address)?;
        }
        if !self.reply_address.is_empty() {
            write!(f, ", reply path {:02X?}", self.reply_address)?;
        }
        for object in &self.memory_objects {
            write!(f, "\n  {object}")?;
        }
        Ok(())
    }
}

/// A directory of target nodes keyed by identifier
#[derive(Debug, Clone, Default)]
pub struct TargetDirectory {
    nodes: HashMap<String, TargetNode>,
}

impl TargetDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from a collection of nodes, later duplicates
    /// replacing earlier ones.
    pub fn from_nodes(nodes: impl IntoIterator<Item = TargetNode>) -> Self {
        let mut directory = Self::new();
        for node in nodes {
            directory.add_target(node);
        }
        directory
    }

    /// Add a node, replacing any existing node with the same identifier.
    pub fn add_target(&mut self, node: TargetNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Look up a node by identifier.
    pub fn get_target(&self, id: &str) -> Result<&TargetNode> {
        self.find_target(id).ok_or(Error::NoSuchTargetNode)
    }

    /// Look up a node by identifier, `None` when not found.
    pub fn find_target(&self, id: &str) -> Option<&TargetNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
