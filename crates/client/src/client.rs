use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::{runtime::Handle, sync::oneshot, task::JoinHandle};

use crate::{
    connector::Connector,
    dispatch::Dispatcher,
    error::ClientError,
    frame::MAX_MESSAGE_LEN,
    outstanding::QueuedQuery,
    sender,
    shared::{Lifecycle, Shared},
};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound on TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
    /// How long `close_graceful` waits for outstanding answers before
    /// failing them. `None` waits indefinitely.
    pub drain_timeout: Option<Duration>,
    /// Start transaction id allocation at a random point.
    pub randomize_ids: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            drain_timeout: Some(Duration::from_secs(5)),
            randomize_ids: true,
        }
    }
}

/// Forwards DNS queries to a single upstream over one persistent,
/// multiplexed connection.
///
/// Every accepted query gets exactly one callback: the upstream answer with
/// the caller's transaction id restored, or a synthesized SERVFAIL when the
/// upstream cannot be reached or the client is closed.
pub struct ForwardClient {
    shared: Arc<Shared>,
    sender: Mutex<Option<JoinHandle<()>>>,
}

impl ForwardClient {
    /// Callbacks run on the task that received the response.
    pub fn new(connector: impl Connector, config: ClientConfig) -> Self {
        Self::build(Arc::new(connector), config, None)
    }

    /// Callbacks are handed to `dispatcher`.
    pub fn with_dispatcher(
        connector: impl Connector,
        config: ClientConfig,
        dispatcher: impl Dispatcher,
    ) -> Self {
        Self::build(Arc::new(connector), config, Some(Arc::new(dispatcher)))
    }

    fn build(
        connector: Arc<dyn Connector>,
        config: ClientConfig,
        dispatcher: Option<Arc<dyn Dispatcher>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new(connector, config, dispatcher)),
            sender: Mutex::new(None),
        }
    }

    /// Spawn the sender on the current tokio runtime. The connection is
    /// opened lazily by the first query.
    pub fn start(&self) -> Result<(), ClientError> {
        let mut lifecycle = self.shared.lifecycle.write();
        match *lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Running => return Err(ClientError::InvalidState("client already started")),
            Lifecycle::Closed => return Err(ClientError::InvalidState("client is closed")),
        }

        let handle = Handle::try_current()
            .map_err(|_| ClientError::InvalidState("start requires a tokio runtime"))?;
        *self.sender.lock() = Some(handle.spawn(sender::run(self.shared.clone())));
        *lifecycle = Lifecycle::Running;

        tracing::debug!(upstream = %self.shared.connector.upstream(), "forward client started");
        Ok(())
    }

    /// Submit a query without waiting for it to be sent.
    ///
    /// `callback` receives the response bytes exactly once.
    pub fn query<F>(&self, message: impl Into<Bytes>, callback: F) -> Result<(), ClientError>
    where
        F: FnOnce(Bytes) + Send + 'static,
    {
        let message = message.into();

        // held until the query is queued so a concurrent close sees it
        let lifecycle = self.shared.lifecycle.read();
        match *lifecycle {
            Lifecycle::Running => {}
            Lifecycle::Created => return Err(ClientError::InvalidState("client not started")),
            Lifecycle::Closed => return Err(ClientError::InvalidState("client is closed")),
        }

        if message.len() < 2 {
            return Err(ClientError::MalformedQuery(format!(
                "{} bytes is too short for a DNS message",
                message.len()
            )));
        }
        if message.len() > MAX_MESSAGE_LEN {
            return Err(ClientError::MalformedQuery(format!(
                "{} bytes is too large to forward",
                message.len()
            )));
        }

        self.shared.queue.push(QueuedQuery {
            message,
            callback: Box::new(callback),
        });
        self.shared.queue_notify.notify_one();
        Ok(())
    }

    /// Submit a query and wait for its response.
    pub async fn resolve(&self, message: impl Into<Bytes>) -> Result<Bytes, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.query(message, move |response| {
            let _ = tx.send(response);
        })?;

        rx.await
            .map_err(|_| ClientError::UpstreamUnavailable("response callback dropped".to_string()))
    }

    /// Stop accepting queries, send everything already queued and wait for
    /// the answers, then stop.
    ///
    /// When every query submitted before this call has had its callback,
    /// this returns. A call overlapping an earlier close waits for that close
    /// to finish instead of cutting it short.
    pub async fn close_graceful(&self) {
        let previous = std::mem::replace(&mut *self.shared.lifecycle.write(), Lifecycle::Closed);
        match previous {
            Lifecycle::Running => {}
            Lifecycle::Created => {
                self.shared.shutdown.cancel();
                self.shared.stopped.cancel();
                return;
            }
            Lifecycle::Closed => return self.wait_stopped().await,
        }

        tracing::info!(upstream = %self.shared.connector.upstream(), "closing forward client");
        self.shared.queue_notify.notify_one();

        let drain = async {
            self.shared.flushed.cancelled().await;
            self.shared.wait_drained().await;
        };

        match self.shared.config.drain_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, drain).await.is_err() {
                    tracing::warn!(timeout = ?limit, "graceful close timed out, failing remaining queries");
                    self.shared.shutdown.cancel();
                    self.shared.fail_all();
                }
            }
            None => drain.await,
        }

        self.shared.shutdown.cancel();
        self.wait_stopped().await;
    }

    /// Stop immediately, failing every queued and outstanding query.
    pub fn close_immediate(&self) {
        let previous = std::mem::replace(&mut *self.shared.lifecycle.write(), Lifecycle::Closed);
        self.shared.shutdown.cancel();
        self.shared.fail_all();
        if previous == Lifecycle::Created {
            self.shared.stopped.cancel();
        }
        tracing::info!(upstream = %self.shared.connector.upstream(), "forward client closed");
    }

    /// Join the sender, or wait for whoever already took its handle.
    async fn wait_stopped(&self) {
        let handle = self.sender.lock().take();
        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "sender task failed");
                }
                self.shared.stopped.cancel();
            }
            None => self.shared.stopped.cancelled().await,
        }
    }
}

impl Drop for ForwardClient {
    fn drop(&mut self) {
        if !self.shared.is_closed() {
            self.close_immediate();
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
