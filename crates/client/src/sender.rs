use std::sync::Arc;

use tokio::{
    io::{AsyncWriteExt, WriteHalf},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    connector::BoxedStream,
    error::ClientError,
    frame::encode_frame,
    outstanding::{QueuedQuery, Rejection},
    receiver,
    shared::Shared,
};

/// Writes to the upstream, one attempt plus one retry after reconnecting.
const SEND_ATTEMPTS: usize = 2;

struct Connection {
    generation: u64,
    writer: WriteHalf<BoxedStream>,
    receiver: JoinHandle<()>,
    token: CancellationToken,
}

/// The single task that writes to the upstream and owns the connection.
struct Sender {
    shared: Arc<Shared>,
    connection: Option<Connection>,
    generations: u64,
}

pub(crate) async fn run(shared: Arc<Shared>) {
    let mut sender = Sender {
        shared,
        connection: None,
        generations: 0,
    };

    loop {
        if let Some(query) = sender.shared.queue.pop() {
            sender.send(query).await;
            continue;
        }

        // nothing is pushed once the client is closed, so an empty queue is final
        if sender.shared.is_closed() || sender.shared.shutdown.is_cancelled() {
            if sender.shared.queue.is_empty() {
                break;
            }
            continue;
        }

        tokio::select! {
            _ = sender.shared.queue_notify.notified() => {}
            _ = sender.shared.shutdown.cancelled() => {}
        }
    }

    sender.shared.flushed.cancel();

    // keep the connection open for answers still on their way
    sender.shared.shutdown.cancelled().await;
    sender.retire_connection().await;
    sender.shared.stopped.cancel();
    tracing::debug!("sender stopped");
}

impl Sender {
    async fn send(&mut self, mut query: QueuedQuery) {
        for attempt in 1..=SEND_ATTEMPTS {
            if self.shared.shutdown.is_cancelled() {
                return self.shared.fail(query);
            }

            if let Err(e) = self.ensure_connection().await {
                tracing::warn!(upstream = %self.shared.connector.upstream(), error = %e, "upstream connect failed");
                return self.shared.fail(query);
            }
            let Some(generation) = self.connection.as_ref().map(|c| c.generation) else {
                return self.shared.fail(query);
            };

            let message = query.message.clone();
            let registered = self.shared.register(query, generation);
            let id = match registered {
                Ok(id) => id,
                Err((Rejection::Closed, returned)) => return self.shared.fail(returned),
                Err((Rejection::Full, returned)) => {
                    tracing::warn!("no free transaction id, failing query");
                    return self.shared.fail(returned);
                }
                Err((Rejection::StaleConnection, returned)) => {
                    query = returned;
                    self.retire_connection().await;
                    continue;
                }
            };

            let shutdown = self.shared.shutdown.clone();
            let written = match encode_frame(id, &message) {
                Ok(frame) => {
                    tokio::select! {
                        // registered queries are failed by whoever closes
                        _ = shutdown.cancelled() => return,
                        written = self.write(&frame) => written,
                    }
                }
                Err(e) => Err(e.into()),
            };

            let Err(e) = written else {
                return;
            };

            tracing::warn!(
                upstream = %self.shared.connector.upstream(),
                generation,
                attempt,
                error = %e,
                "upstream write failed"
            );

            let reclaimed = self.shared.reclaim(id, generation);
            self.retire_connection().await;
            match reclaimed {
                Some(returned) => query = returned,
                // the receiver already answered or failed it
                None => return,
            }
        }

        self.shared.fail(query);
    }

    async fn write(&mut self, frame: &[u8]) -> Result<(), ClientError> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| ClientError::UpstreamUnavailable("not connected".to_string()))?;

        connection.writer.write_all(frame).await?;
        connection.writer.flush().await?;
        Ok(())
    }

    async fn ensure_connection(&mut self) -> Result<(), ClientError> {
        if self.connection.is_some() {
            return Ok(());
        }

        let connect = tokio::time::timeout(self.shared.config.connect_timeout, self.shared.connector.connect());
        let stream = tokio::select! {
            _ = self.shared.shutdown.cancelled() => return Err(ClientError::InvalidState("client is closed")),
            connected = connect => match connected {
                Ok(stream) => stream?,
                Err(_) => {
                    return Err(ClientError::UpstreamUnavailable(format!(
                        "connect to {} timed out",
                        self.shared.connector.upstream()
                    )));
                }
            },
        };

        self.generations += 1;
        let generation = self.generations;
        let (reader, writer) = tokio::io::split(stream);
        let token = self.shared.shutdown.child_token();

        self.shared.set_live(generation);
        let receiver = tokio::spawn(receiver::run(self.shared.clone(), generation, reader, token.clone()));

        tracing::info!(upstream = %self.shared.connector.upstream(), generation, "connected to upstream");

        self.connection = Some(Connection {
            generation,
            writer,
            receiver,
            token,
        });
        Ok(())
    }

    /// Stop the current receiver and drop the connection.
    async fn retire_connection(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        connection.token.cancel();
        if let Err(e) = connection.receiver.await {
            tracing::warn!(generation = connection.generation, error = %e, "receiver task failed");
        }
        self.shared.retire_generation(connection.generation);
    }
}
