//! Sender loop: drains a session mailbox onto an open command stream

use super::SenderLease;
use fleet_shared::{codec, envelope, Envelope, Header};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Drain the leased mailbox onto `writer` until retired or the write fails
///
/// One instance runs per successful subscription. Acquiring the mailbox
/// guard waits for the previous generation's loop to exit; the wait itself
/// is cancellable in case this generation is superseded before it ever gets
/// to drain. On exit, undelivered commands stay in the mailbox for the next
/// generation.
pub async fn sender_loop<W>(
    drone_id: String,
    lease: SenderLease,
    sequence_id: Arc<AtomicU64>,
    mut writer: W,
) where
    W: AsyncWrite + Unpin + Send,
{
    let mut mailbox = tokio::select! {
        _ = lease.cancel.cancelled() => {
            debug!(%drone_id, generation = lease.generation, "sender retired before draining");
            return;
        }
        guard = lease.mailbox.lock() => guard,
    };

    loop {
        tokio::select! {
            _ = lease.cancel.cancelled() => {
                debug!(%drone_id, generation = lease.generation, "sender retired");
                return;
            }
            cmd = mailbox.recv() => {
                // The registry holds a sender for the session's lifetime,
                // so the channel cannot close underneath us.
                let Some(cmd) = cmd else { return };

                let seq = sequence_id.fetch_add(1, Ordering::SeqCst) + 1;
                let frame = Envelope::new(
                    Header::new("control", seq),
                    envelope::Payload::Command(cmd),
                );

                let encoded = match codec::encode(&frame) {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        warn!(%drone_id, "failed to encode command: {e}");
                        return;
                    }
                };

                if let Err(e) = writer.write_all(&encoded).await {
                    warn!(%drone_id, "command send failed: {e}");
                    return;
                }
            }
        }
    }
}
