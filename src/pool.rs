//! Cooldown-ordered priority structure backing the scheduler.

use crate::error::SchedulerError;
use crate::proxy::{has_scheme, Entry};

use log::{debug, info};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use tokio::time::Instant;

/// Min-heap of proxies keyed by `(eligible_at, sequence)`.
///
/// `pooled` mirrors the addresses currently in `heap` so an address can never
/// be queued twice. `known` is fixed at seeding; checked-out addresses are only
/// in `known`, and nothing outside it can be queued.
#[derive(Debug)]
pub(crate) struct Pool {
    heap: BinaryHeap<Reverse<Entry>>,
    pooled: HashSet<String>,
    known: HashSet<String>,
    next_sequence: u64,
    max_sequence: u64,
}

impl Pool {
    /// Seed a pool where every address is eligible at `now`, in list order.
    pub(crate) fn seed(
        addresses: Vec<String>,
        now: Instant,
        max_sequence: u64,
    ) -> Result<Self, SchedulerError> {
        let mut pooled = HashSet::with_capacity(addresses.len());
        let mut entries = Vec::with_capacity(addresses.len());

        for (index, address) in addresses.into_iter().enumerate() {
            if !has_scheme(&address) {
                return Err(SchedulerError::MissingScheme(address));
            }
            if !pooled.insert(address.clone()) {
                return Err(SchedulerError::DuplicateAddress(address));
            }
            entries.push(Reverse(Entry::new(address, now, index as u64)));
        }

        Ok(Self {
            next_sequence: entries.len() as u64,
            heap: BinaryHeap::from(entries),
            known: pooled.clone(),
            pooled,
            max_sequence,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn known(&self) -> usize {
        self.known.len()
    }

    pub(crate) fn peek(&self) -> Option<&Entry> {
        self.heap.peek().map(|Reverse(entry)| entry)
    }

    /// Remove the entry with the smallest key.
    pub(crate) fn pop(&mut self) -> Option<Entry> {
        let Reverse(entry) = self.heap.pop()?;
        self.pooled.remove(entry.address());
        Some(entry)
    }

    /// Queue `address` to become eligible at `eligible_at`, returning its sequence.
    ///
    /// Renumbers the pool first when the counter has run past `max_sequence`.
    pub(crate) fn push(&mut self, address: &str, eligible_at: Instant) -> Result<u64, SchedulerError> {
        if !self.known.contains(address) {
            return Err(SchedulerError::UnknownAddress(address.to_string()));
        }
        if self.pooled.contains(address) {
            return Err(SchedulerError::AlreadyPooled(address.to_string()));
        }
        if self.next_sequence > self.max_sequence {
            info!(
                "Sequence counter {} passed ceiling {}, renumbering pool",
                self.next_sequence, self.max_sequence
            );
            self.renumber();
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.pooled.insert(address.to_string());
        self.heap
            .push(Reverse(Entry::new(address.to_string(), eligible_at, sequence)));
        debug!("Queued proxy {} with sequence {}", address, sequence);
        Ok(sequence)
    }

    /// Reassign sequences `0..n` in priority order, keeping every `eligible_at`.
    pub(crate) fn renumber(&mut self) {
        let mut entries = self.ordered();
        for (index, entry) in entries.iter_mut().enumerate() {
            entry.renumber(index as u64);
        }
        self.next_sequence = entries.len() as u64;
        self.heap = entries.into_iter().map(Reverse).collect();
    }

    /// Snapshot of the queued entries, smallest key first.
    pub(crate) fn ordered(&self) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self.heap.iter().map(|Reverse(entry)| entry.clone()).collect();
        entries.sort();
        entries
    }
}
