//! Single-use anti-replay tokens for state-changing admin requests.
//!
//! A token is bound to one action name, expires after a fixed lifetime and
//! is consumed by the first successful verification.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::debug;
use sha2::{Digest, Sha256};

/// Action name guarding the manual report trigger.
pub const SEND_NOW_ACTION: &str = "send_now";
pub const ACTIVATE_ACTION: &str = "activate_report";
pub const DEACTIVATE_ACTION: &str = "deactivate_report";

struct Issued {
    action: String,
    /// `None` when the lifetime is too long to represent; such a token
    /// never expires.
    expires_at: Option<Instant>,
}

impl Issued {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

pub struct NonceRegistry {
    secret: [u8; 32],
    lifetime: Duration,
    counter: AtomicU64,
    issued: Mutex<HashMap<String, Issued>>,
}

impl NonceRegistry {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            secret: rand::random(),
            lifetime,
            counter: AtomicU64::new(0),
            issued: Mutex::new(HashMap::new()),
        }
    }

    pub fn issue(&self, action: &str) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(self.secret);
        hasher.update(action.as_bytes());
        hasher.update(nanos.to_be_bytes());
        hasher.update(seq.to_be_bytes());
        let token = hex::encode(hasher.finalize());

        let now = Instant::now();
        let mut issued = self.lock();
        issued.retain(|_, n| n.is_fresh(now));
        issued.insert(
            token.clone(),
            Issued {
                action: action.to_string(),
                expires_at: now.checked_add(self.lifetime),
            },
        );
        debug!("Issued nonce for {} ({} outstanding)", action, issued.len());
        token
    }

    /// Checks `token` against `action` and consumes it on success.
    ///
    /// A token presented for the wrong action stays valid for its own.
    pub fn verify(&self, action: &str, token: &str) -> bool {
        let mut issued = self.lock();
        match issued.get(token) {
            Some(n) if n.action == action => {
                let fresh = n.is_fresh(Instant::now());
                issued.remove(token);
                fresh
            }
            _ => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Issued>> {
        self.issued.lock().unwrap_or_else(|p| p.into_inner())
    }
}
