use std::sync::Arc;

use tokio::io::{AsyncReadExt, ReadHalf};
use tokio_util::sync::CancellationToken;

use crate::{connector::BoxedStream, frame::FrameDecoder, shared::Shared};

/// Read response frames from one connection until it ends, then fail
/// whatever was still waiting on it.
pub(crate) async fn run(
    shared: Arc<Shared>,
    generation: u64,
    mut reader: ReadHalf<BoxedStream>,
    token: CancellationToken,
) {
    let mut decoder = FrameDecoder::new();

    let reason = 'read: loop {
        let read = tokio::select! {
            biased;
            _ = token.cancelled() => break 'read "retired",
            read = reader.read_buf(decoder.read_buf()) => read,
        };

        match read {
            Ok(0) => break 'read "closed by upstream",
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(upstream = %shared.connector.upstream(), generation, error = %e, "upstream read failed");
                break 'read "read error";
            }
        }

        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => shared.complete(generation, frame),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(upstream = %shared.connector.upstream(), generation, error = %e, "malformed frame from upstream");
                    break 'read "malformed frame";
                }
            }
        }
    };

    tracing::debug!(generation, reason, "receiver stopped");
    shared.retire_generation(generation);
}
