//! Sliding-window rate limiting for handshakes and messages, per peer and
//! globally. Single writer per request as the core's concurrency model
//! specifies; there is no reader-only path.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

const HANDSHAKE_PEER_WINDOW: Duration = Duration::from_secs(60);
const HANDSHAKE_PEER_CAP: usize = 10;
const HANDSHAKE_GLOBAL_WINDOW: Duration = Duration::from_secs(60);
const HANDSHAKE_GLOBAL_CAP: usize = 30;
const MESSAGE_PEER_WINDOW: Duration = Duration::from_secs(1);
const MESSAGE_PEER_CAP: usize = 100;
const MESSAGE_GLOBAL_WINDOW: Duration = Duration::from_secs(1);
const MESSAGE_GLOBAL_CAP: usize = 500;

#[derive(Default)]
struct Window {
    timestamps: Vec<Instant>,
}

impl Window {
    fn admit(&mut self, now: Instant, window: Duration, cap: usize) -> bool {
        self.timestamps.retain(|t| now.duration_since(*t) < window);
        if self.timestamps.len() >= cap {
            return false;
        }
        self.timestamps.push(now);
        true
    }
}

#[derive(Default)]
struct PeerWindows {
    handshakes: Window,
    messages: Window,
}

/// Tracks per-peer and global sliding windows for both handshake attempts and
/// application messages.
#[derive(Default)]
pub struct RateLimiter {
    peers: RwLock<HashMap<String, PeerWindows>>,
    global_handshakes: RwLock<Window>,
    global_messages: RwLock<Window>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a handshake attempt from `peer_id` if both its per-peer and the
    /// global handshake window have capacity; records it only when admitted.
    pub fn admit_handshake(&self, peer_id: &str, now: Instant) -> bool {
        let mut peers = self.peers.write().expect("lock poisoned");
        let entry = peers.entry(peer_id.to_string()).or_default();
        if !entry
            .handshakes
            .admit(now, HANDSHAKE_PEER_WINDOW, HANDSHAKE_PEER_CAP)
        {
            tracing::debug!(peer = peer_id, "handshake rate limit exceeded (per-peer)");
            return false;
        }
        let mut global = self.global_handshakes.write().expect("lock poisoned");
        if !global.admit(now, HANDSHAKE_GLOBAL_WINDOW, HANDSHAKE_GLOBAL_CAP) {
            // Roll back the per-peer record so a globally-rejected attempt
            // doesn't count against the peer's own budget.
            entry.handshakes.timestamps.pop();
            tracing::debug!("handshake rate limit exceeded (global)");
            return false;
        }
        true
    }

    /// Admits an application message from `peer_id` under the same two-tier scheme.
    pub fn admit_message(&self, peer_id: &str, now: Instant) -> bool {
        let mut peers = self.peers.write().expect("lock poisoned");
        let entry = peers.entry(peer_id.to_string()).or_default();
        if !entry
            .messages
            .admit(now, MESSAGE_PEER_WINDOW, MESSAGE_PEER_CAP)
        {
            return false;
        }
        let mut global = self.global_messages.write().expect("lock poisoned");
        if !global.admit(now, MESSAGE_GLOBAL_WINDOW, MESSAGE_GLOBAL_CAP) {
            entry.messages.timestamps.pop();
            return false;
        }
        true
    }

    /// Purges both series for `peer_id`.
    pub fn reset(&self, peer_id: &str) {
        self.peers.write().expect("lock poisoned").remove(peer_id);
    }
}
