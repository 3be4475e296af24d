use std::sync::Arc;

use bytes::Bytes;
use crossbeam_queue::SegQueue;
use dotfwd_dns::helpers;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::{
    ClientConfig,
    connector::Connector,
    dispatch::{Callback, Dispatcher},
    frame::Frame,
    outstanding::{OutstandingTable, Pending, QueuedQuery, Rejection},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Created,
    Running,
    Closed,
}

/// State shared between the client handle, the sender and the receivers.
pub(crate) struct Shared {
    pub connector: Arc<dyn Connector>,
    pub config: ClientConfig,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    pub lifecycle: RwLock<Lifecycle>,
    pub queue: SegQueue<QueuedQuery>,
    pub queue_notify: Notify,
    table: Mutex<OutstandingTable>,
    drained: Notify,
    /// Cancelled once the sender has written everything queued before close.
    pub flushed: CancellationToken,
    /// Cancelled to stop every task.
    pub shutdown: CancellationToken,
    /// Cancelled once the sender task has finished after close.
    pub stopped: CancellationToken,
}

impl Shared {
    pub fn new(
        connector: Arc<dyn Connector>,
        config: ClientConfig,
        dispatcher: Option<Arc<dyn Dispatcher>>,
    ) -> Self {
        let first_id = if config.randomize_ids { rand::random() } else { 0 };
        Self {
            connector,
            config,
            dispatcher,
            lifecycle: RwLock::new(Lifecycle::Created),
            queue: SegQueue::new(),
            queue_notify: Notify::new(),
            table: Mutex::new(OutstandingTable::new(first_id)),
            drained: Notify::new(),
            flushed: CancellationToken::new(),
            shutdown: CancellationToken::new(),
            stopped: CancellationToken::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.lifecycle.read() == Lifecycle::Closed
    }

    fn deliver(&self, callback: Callback, response: Bytes) {
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.dispatch(callback, response),
            None => callback(response),
        }
    }

    /// Answer `query` with a synthesized SERVFAIL.
    pub fn fail(&self, query: QueuedQuery) {
        let response = helpers::servfail_response(&query.message);
        self.deliver(query.callback, response);
    }

    pub fn set_live(&self, generation: u64) {
        self.table.lock().set_live(generation);
    }

    pub fn register(&self, query: QueuedQuery, generation: u64) -> Result<u16, (Rejection, QueuedQuery)> {
        self.table.lock().register(query, generation)
    }

    /// Take back a query whose write failed.
    pub fn reclaim(&self, id: u16, generation: u64) -> Option<QueuedQuery> {
        let (pending, empty) = {
            let mut table = self.table.lock();
            let pending = table.take(id, generation);
            (pending, table.is_empty())
        };
        if empty {
            self.drained.notify_waiters();
        }
        pending.map(|p| p.query)
    }

    /// Hand a response frame to the query it answers.
    pub fn complete(&self, generation: u64, frame: Frame) {
        let id = frame.id;
        let (pending, empty) = {
            let mut table = self.table.lock();
            let pending = table.take(id, generation);
            (pending, table.is_empty())
        };

        match pending {
            Some(Pending { query, .. }) => {
                let original_id = query.original_id();
                self.deliver(query.callback, frame.into_message(original_id));
            }
            None => tracing::debug!(id, generation, "dropping response for unknown transaction id"),
        }

        if empty {
            self.drained.notify_waiters();
        }
    }

    /// Fail every query still waiting on `generation`.
    pub fn retire_generation(&self, generation: u64) {
        let (lost, empty) = {
            let mut table = self.table.lock();
            let lost = table.retire(generation);
            (lost, table.is_empty())
        };

        if !lost.is_empty() {
            tracing::warn!(
                upstream = %self.connector.upstream(),
                generation,
                count = lost.len(),
                "connection lost with queries outstanding"
            );
        }
        for pending in lost {
            self.fail(pending.query);
        }

        if empty {
            self.drained.notify_waiters();
        }
    }

    /// Stop accepting work and fail everything outstanding or queued.
    pub fn fail_all(&self) {
        let outstanding = self.table.lock().close();
        let queued: Vec<QueuedQuery> = std::iter::from_fn(|| self.queue.pop()).collect();

        let count = outstanding.len() + queued.len();
        for pending in outstanding {
            self.fail(pending.query);
        }
        for query in queued {
            self.fail(query);
        }

        if count > 0 {
            tracing::info!(count, "failed pending queries on close");
        }
        self.drained.notify_waiters();
    }

    /// Wait until no query is outstanding.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.table.lock().is_empty() {
                return;
            }
            notified.await;
        }
    }
}
