use super::bucket::TokenBucket;
use crate::sim::PlayerRuntime;
use tokio::sync::mpsc::UnboundedSender;

/// In-memory binding between a live session task and its authoritative
/// runtime record. The room owns this; the session task owns the socket
/// and drains `tx` into it. A failed send means the session is gone.
#[derive(Debug)]
pub struct PlayerConn {
    pub tx: UnboundedSender<String>,
    pub runtime: PlayerRuntime,
    pub last_sent_snapshot_ms: i64,
    pub bucket: TokenBucket,
}

impl PlayerConn {
    pub fn new(tx: UnboundedSender<String>, runtime: PlayerRuntime, rate_hz: u32, now_ms: i64) -> Self {
        Self {
            tx,
            runtime,
            last_sent_snapshot_ms: 0,
            bucket: TokenBucket::new(rate_hz, now_ms),
        }
    }
}
