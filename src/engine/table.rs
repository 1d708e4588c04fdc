//! Transaction identifier allocation and command/reply pairing.

// Copyright (C) 2025 The spacewire-rmap Developers
//
// MIT License

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::engine::transaction::Transaction;
use crate::{Error, Result};

/// Link-scoped table of live transactions, keyed by transaction identifier.
///
/// Identifiers are handed out in monotonically increasing order modulo
/// 65536, skipping any still owned by a live transaction, so a TID is owned
/// by at most one transaction at any moment.  All operations run under one
/// mutex and touch only the map and the allocation cursor, never I/O.
///
/// `remove` is the linearisation point for every terminal transition:
/// whoever removes the entry (demultiplexer on reply, façade on timeout, a
/// canceller) owns the exclusive right to complete the transaction.
pub struct TransactionTable {
    inner: Mutex<TableInner>,
    space_available: Condvar,
}

struct TableInner {
    active: HashMap<u16, Arc<Transaction>>,
    next_transaction_id: u16,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner {
                active: HashMap::new(),
                next_transaction_id: 0,
            }),
            space_available: Condvar::new(),
        }
    }

    /// Allocate a transaction identifier and insert the transaction built
    /// by `make` in one critical section.
    ///
    /// A pinned identifier already in use fails immediately with
    /// [`Error::TransactionIdInUse`].  When every identifier is in use the
    /// call blocks until one is freed or `deadline` passes, then fails with
    /// [`Error::Timeout`].
    pub fn register<F>(&self, pinned: Option<u16>, deadline: Instant, make: F) -> Result<Arc<Transaction>>
    where
        F: FnOnce(u16) -> Arc<Transaction>,
    {
        let mut inner = self.lock();
        let transaction_id = match pinned {
            Some(transaction_id) => {
                if inner.active.contains_key(&transaction_id) {
                    return Err(Error::TransactionIdInUse);
                }
                transaction_id
            }
            None => loop {
                if let Some(transaction_id) = Self::next_free(&mut inner) {
                    break transaction_id;
                }
                let now = Instant::now();
                if now >= deadline {
                    return Err(Error::Timeout);
                }
                let (guard, _) = self
                    .space_available
                    .wait_timeout(inner, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                inner = guard;
            },
        };
        let transaction = make(transaction_id);
        inner.active.insert(transaction_id, Arc::clone(&transaction));
        Ok(transaction)
    }

    /// Remove a transaction, returning its handle to whoever gets there
    /// first.  Frees the identifier for reuse.
    pub fn remove(&self, transaction_id: u16) -> Option<Arc<Transaction>> {
        let removed = self.lock().active.remove(&transaction_id);
        if removed.is_some() {
            self.space_available.notify_all();
        }
        removed
    }

    /// Number of live transactions.
    pub fn len(&self) -> usize {
        self.lock().active.len()
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Scan at most the whole identifier space once, starting at the cursor.
    fn next_free(inner: &mut TableInner) -> Option<u16> {
        for _ in 0..=u16::MAX as u32 {
            let transaction_id = inner.next_transaction_id;
            inner.next_transaction_id = inner.next_transaction_id.wrapping_add(1);
            if !inner.active.contains_key(&transaction_id) {
                return Some(transaction_id);
            }
        }
        None
    }
}
