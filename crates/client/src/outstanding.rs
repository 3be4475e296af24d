use std::collections::HashMap;

use bytes::Bytes;
use dotfwd_dns::helpers;

use crate::dispatch::Callback;

/// A query waiting in the submit queue.
pub(crate) struct QueuedQuery {
    pub message: Bytes,
    pub callback: Callback,
}

impl QueuedQuery {
    /// The transaction id the caller put in the message.
    pub fn original_id(&self) -> u16 {
        helpers::extract_transaction_id(&self.message).unwrap_or_default()
    }
}

/// A query written (or being written) to a connection.
pub(crate) struct Pending {
    pub query: QueuedQuery,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    /// The client is shutting down.
    Closed,
    /// The connection the query was meant for is gone.
    StaleConnection,
    /// Every id is in use.
    Full,
}

/// Queries on the wire, keyed by the transaction id they were framed with.
///
/// Ids run from 1 to 65535. Allocation probes linearly from the last id
/// handed out and never returns an id that is still mapped.
pub(crate) struct OutstandingTable {
    entries: HashMap<u16, Pending>,
    last_id: u16,
    live_generation: Option<u64>,
    accepting: bool,
}

impl OutstandingTable {
    /// `last_id` seeds the probe; the first id handed out follows it.
    pub fn new(last_id: u16) -> Self {
        Self {
            entries: HashMap::new(),
            last_id,
            live_generation: None,
            accepting: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mark `generation` as the connection new queries go to.
    pub fn set_live(&mut self, generation: u64) {
        self.live_generation = Some(generation);
    }

    fn allocate_id(&mut self) -> Option<u16> {
        let mut candidate = self.last_id;
        for _ in 0..u16::MAX {
            candidate = if candidate == u16::MAX { 1 } else { candidate + 1 };
            if !self.entries.contains_key(&candidate) {
                self.last_id = candidate;
                return Some(candidate);
            }
        }
        None
    }

    /// Record `query` as sent on `generation` and return its wire id.
    pub fn register(
        &mut self,
        query: QueuedQuery,
        generation: u64,
    ) -> Result<u16, (Rejection, QueuedQuery)> {
        if !self.accepting {
            return Err((Rejection::Closed, query));
        }
        if self.live_generation != Some(generation) {
            return Err((Rejection::StaleConnection, query));
        }

        match self.allocate_id() {
            Some(id) => {
                self.entries.insert(id, Pending { query, generation });
                Ok(id)
            }
            None => Err((Rejection::Full, query)),
        }
    }

    /// Remove `id` if it was sent on `generation`.
    pub fn take(&mut self, id: u16, generation: u64) -> Option<Pending> {
        match self.entries.get(&id) {
            Some(pending) if pending.generation == generation => self.entries.remove(&id),
            _ => None,
        }
    }

    /// Remove every query sent on `generation`, which is no longer live.
    pub fn retire(&mut self, generation: u64) -> Vec<Pending> {
        if self.live_generation == Some(generation) {
            self.live_generation = None;
        }

        let ids: Vec<u16> = self
            .entries
            .iter()
            .filter(|(_, pending)| pending.generation == generation)
            .map(|(id, _)| *id)
            .collect();

        ids.into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .collect()
    }

    /// Stop accepting queries and remove everything.
    pub fn close(&mut self) -> Vec<Pending> {
        self.accepting = false;
        self.live_generation = None;
        self.entries.drain().map(|(_, pending)| pending).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(id: u16) -> QueuedQuery {
        QueuedQuery {
            message: Bytes::copy_from_slice(&id.to_be_bytes()),
            callback: Box::new(|_| {}),
        }
    }

    #[test]
    fn test_ids_wrap_and_skip_zero() {
        let mut table = OutstandingTable::new(u16::MAX - 1);
        table.set_live(1);

        assert_eq!(table.register(query(0), 1).ok(), Some(u16::MAX));
        assert_eq!(table.register(query(0), 1).ok(), Some(1));
        assert_eq!(table.register(query(0), 1).ok(), Some(2));
    }

    #[test]
    fn test_ids_in_use_are_skipped() {
        let mut table = OutstandingTable::new(0);
        table.set_live(1);

        let first = table.register(query(0), 1).ok().unwrap();
        let second = table.register(query(0), 1).ok().unwrap();
        assert_eq!((first, second), (1, 2));

        // release 1, keep 2 mapped, then wrap around onto both
        assert!(table.take(first, 1).is_some());
        table.last_id = u16::MAX;
        assert_eq!(table.register(query(0), 1).ok(), Some(1));
        assert_eq!(table.register(query(0), 1).ok(), Some(3));
    }

    #[test]
    fn test_full_table_is_rejected() {
        let mut table = OutstandingTable::new(0);
        table.set_live(1);
        for _ in 0..u16::MAX {
            assert!(table.register(query(0), 1).is_ok());
        }
        assert_eq!(table.entries.len(), u16::MAX as usize);

        let (rejection, _) = table.register(query(0), 1).unwrap_err();
        assert_eq!(rejection, Rejection::Full);
    }

    #[test]
    fn test_take_checks_generation() {
        let mut table = OutstandingTable::new(0);
        table.set_live(3);
        let id = table.register(query(42), 3).ok().unwrap();

        assert!(table.take(id, 2).is_none());
        let pending = table.take(id, 3).unwrap();
        assert_eq!(pending.query.original_id(), 42);
        assert!(table.take(id, 3).is_none());
    }

    #[test]
    fn test_retire_generation() {
        let mut table = OutstandingTable::new(0);
        table.set_live(1);
        table.register(query(1), 1).ok().unwrap();
        table.register(query(2), 1).ok().unwrap();

        let retired = table.retire(1);
        assert_eq!(retired.len(), 2);
        assert!(table.is_empty());

        let (rejection, _) = table.register(query(3), 1).unwrap_err();
        assert_eq!(rejection, Rejection::StaleConnection);
    }

    #[test]
    fn test_close_drains_and_rejects() {
        let mut table = OutstandingTable::new(0);
        table.set_live(1);
        table.register(query(1), 1).ok().unwrap();

        assert_eq!(table.close().len(), 1);
        let (rejection, _) = table.register(query(2), 1).unwrap_err();
        assert_eq!(rejection, Rejection::Closed);
    }
}
