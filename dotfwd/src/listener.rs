use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::{Bytes, BytesMut};
use dotfwd_cache::ResponseCache;
use dotfwd_client::ForwardClient;
use dotfwd_dns::{DnsMessage, DnsResponseCode, RecordType, helpers};
use tokio::net::UdpSocket;

/// Answers queries from the cache, otherwise through the forward client.
pub struct Forwarder {
    client: Arc<ForwardClient>,
    cache: Arc<ResponseCache>,
    query_timeout: Duration,
}

impl Forwarder {
    pub fn new(client: Arc<ForwardClient>, cache: Arc<ResponseCache>, query_timeout: Duration) -> Self {
        Self {
            client,
            cache,
            query_timeout,
        }
    }

    /// Produce the response for one raw query. Never fails: anything that
    /// goes wrong becomes a SERVFAIL.
    pub async fn handle(&self, query: Bytes) -> Bytes {
        let key = match helpers::question_key(&query) {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!(error = %e, "failed to decode query");
                return helpers::servfail_response(&query);
            }
        };

        let id = helpers::extract_transaction_id(&query).unwrap_or_default();

        if let Some((qtype, name)) = &key {
            if let Some(cached) = self.cached(*qtype, name, id) {
                tracing::debug!(name = %name, qtype = %qtype, "cache hit");
                return cached;
            }
        }

        let response = match tokio::time::timeout(self.query_timeout, self.client.resolve(query.clone())).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(id, error = %e, "forwarding failed");
                return helpers::servfail_response(&query);
            }
            Err(_) => {
                tracing::warn!(id, timeout = ?self.query_timeout, "upstream did not answer in time");
                return helpers::servfail_response(&query);
            }
        };

        if let Some((qtype, name)) = key {
            self.store(qtype, &name, &response);
        }
        response
    }

    /// Cached answer for the question, with TTLs lowered by the time it spent
    /// in the cache and the caller's transaction id.
    fn cached(&self, qtype: RecordType, name: &str, id: u16) -> Option<Bytes> {
        let (payload, age) = self.cache.get_with_age(qtype, name)?;
        let elapsed = u32::try_from(age.as_secs()).unwrap_or(u32::MAX);

        match helpers::with_ttls_aged(&payload, elapsed) {
            Ok(aged) => Some(helpers::with_transaction_id(&aged, id)),
            Err(e) => {
                tracing::debug!(name, error = %e, "cached response unreadable, forwarding");
                None
            }
        }
    }

    /// Cache successful, complete answers for their smallest TTL.
    fn store(&self, qtype: RecordType, name: &str, response: &Bytes) {
        let message = match DnsMessage::decode(response) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(name, error = %e, "not caching undecodable response");
                return;
            }
        };

        if message.header.truncated
            || message.header.response_code() != Some(DnsResponseCode::NoError)
        {
            return;
        }

        if let Some(ttl) = helpers::min_answer_ttl(&message) {
            self.cache.put(qtype, name, ttl, response.clone());
        }
    }
}

/// Serve DNS over UDP until the socket fails.
pub async fn run_udp(bind_addr: SocketAddr, forwarder: Arc<Forwarder>, recv_size: usize) -> anyhow::Result<()> {
    let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
    let mut buffer = BytesMut::with_capacity(recv_size);

    tracing::info!("UDP listening on {}", bind_addr);

    loop {
        buffer.resize(recv_size, 0);
        let (len, client) = socket.recv_from(&mut buffer[..]).await?;
        let raw = buffer.split_to(len).freeze();

        let sock = socket.clone();
        let forwarder = forwarder.clone();

        tokio::spawn(async move {
            let response = forwarder.handle(raw).await;
            if let Err(e) = sock.send_to(&response, client).await {
                tracing::warn!("Failed to write response to client {}: {}", client, e);
            }
        });
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod listener_tests;
