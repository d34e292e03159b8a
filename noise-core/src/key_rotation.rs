//! Epoched per-channel key history: 24-hour epochs with a 1-hour overlap
//! window, commitments for out-of-band verification, and 7-epoch retention.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::collaborators::SecretStore;
use crate::error::{Error, Result};
use crate::primitives::{pbkdf2_sha256, sha256};

const EPOCH_DURATION_SECS: u64 = 24 * 60 * 60;
const OVERLAP_SECS: u64 = 60 * 60;
const RETAINED_EPOCHS: usize = 7;
const ROTATION_WARNING_SECS: u64 = 2 * 60 * 60;

/// One epoch's worth of a channel's history. `key` itself is never persisted;
/// only the commitment and validity window are, per the core's record shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyEpoch {
    pub n: u64,
    pub start_at: u64,
    pub end_at: u64,
    /// `hex(SHA-256(epochKey))`.
    pub commitment: String,
    pub prev_commitment: Option<String>,
    #[serde(skip)]
    key: [u8; 32],
}

impl KeyEpoch {
    pub fn key(&self) -> [u8; 32] {
        self.key
    }
}

fn epoch_key(channel: &str, creator_fp: &str, n: u64, password: &str) -> [u8; 32] {
    let salt = format!("{channel}-{creator_fp}-epoch-{n}");
    pbkdf2_sha256(password.as_bytes(), salt.as_bytes())
}

fn commitment_of(key: &[u8; 32]) -> String {
    hex::encode(sha256(key))
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_secs()
}

/// Per-channel epoch histories, persisted to `SecretStore` under
/// `"epoch::<channel>"`.
pub struct KeyRotation {
    secret_store: Arc<dyn SecretStore>,
    histories: RwLock<HashMap<String, Vec<KeyEpoch>>>,
}

impl KeyRotation {
    pub fn new(secret_store: Arc<dyn SecretStore>) -> Self {
        Self {
            secret_store,
            histories: RwLock::new(HashMap::new()),
        }
    }

    fn secret_store_key(channel: &str) -> String {
        format!("epoch::{channel}")
    }

    /// Loads a previously persisted history for `channel` from the secret store,
    /// replacing (not merging with) any in-memory history already cached.
    /// Epoch keys are not persisted, so they are re-derived from `password`.
    pub fn load_saved_epochs(&self, channel: &str, password: &str, creator_fp: &str) -> Result<()> {
        let Some(raw) = self.secret_store.get(&Self::secret_store_key(channel))? else {
            return Ok(());
        };
        let mut records: Vec<KeyEpoch> = serde_json::from_slice(&raw)
            .map_err(|e| Error::CorruptRecord(e.to_string()))?;
        for epoch in &mut records {
            epoch.key = epoch_key(channel, creator_fp, epoch.n, password);
        }
        self.histories
            .write()
            .expect("lock poisoned")
            .insert(channel.to_string(), records);
        Ok(())
    }

    fn persist(&self, channel: &str, history: &[KeyEpoch]) -> Result<()> {
        let json = serde_json::to_vec(history).expect("KeyEpoch serialises infallibly");
        self.secret_store.put(&Self::secret_store_key(channel), &json)
    }

    /// Returns the epoch valid at `now`, creating epoch 1 starting now if the
    /// channel has no history yet.
    pub fn get_current_key(&self, channel: &str, password: &str, creator_fp: &str) -> Result<KeyEpoch> {
        let now = now_unix();
        let mut histories = self.histories.write().expect("lock poisoned");
        let history = histories.entry(channel.to_string()).or_default();

        if let Some(current) = history.iter().find(|e| e.start_at <= now && now < e.end_at) {
            return Ok(current.clone());
        }

        let n = history.last().map(|e| e.n + 1).unwrap_or(1);
        let key = epoch_key(channel, creator_fp, n, password);
        let epoch = KeyEpoch {
            n,
            start_at: now,
            end_at: now + EPOCH_DURATION_SECS,
            commitment: commitment_of(&key),
            prev_commitment: history.last().map(|e| e.commitment.clone()),
            key,
        };
        history.push(epoch.clone());
        truncate_history(history);
        self.persist(channel, history)?;
        Ok(epoch)
    }

    /// All epochs whose overlap-extended window covers `at`.
    pub fn get_valid_keys_for_decryption(
        &self,
        channel: &str,
        password: &str,
        creator_fp: &str,
        at: u64,
    ) -> Result<Vec<KeyEpoch>> {
        self.get_current_key(channel, password, creator_fp)?;
        let histories = self.histories.read().expect("lock poisoned");
        let history = histories.get(channel).cloned().unwrap_or_default();
        Ok(history
            .into_iter()
            .filter(|e| e.start_at.saturating_sub(OVERLAP_SECS) <= at && at < e.end_at + OVERLAP_SECS)
            .collect())
    }

    /// Appends a new epoch unconditionally, truncating to the 7 most recent.
    pub fn rotate_channel_key(&self, channel: &str, password: &str, creator_fp: &str) -> Result<KeyEpoch> {
        let now = now_unix();
        let mut histories = self.histories.write().expect("lock poisoned");
        let history = histories.entry(channel.to_string()).or_default();

        let n = history.last().map(|e| e.n + 1).unwrap_or(1);
        let key = epoch_key(channel, creator_fp, n, password);
        let epoch = KeyEpoch {
            n,
            start_at: now,
            end_at: now + EPOCH_DURATION_SECS,
            commitment: commitment_of(&key),
            prev_commitment: history.last().map(|e| e.commitment.clone()),
            key,
        };
        history.push(epoch.clone());
        truncate_history(history);
        self.persist(channel, history)?;
        Ok(epoch)
    }

    /// True when the channel has no epochs yet, or the current one expires
    /// within the next 2 hours.
    pub fn needs_key_rotation(&self, channel: &str) -> bool {
        let now = now_unix();
        let histories = self.histories.read().expect("lock poisoned");
        match histories.get(channel).and_then(|h| h.last()) {
            None => true,
            Some(current) => current.end_at.saturating_sub(now) < ROTATION_WARNING_SECS,
        }
    }

    pub fn clear_epochs(&self, channel: &str) -> Result<()> {
        self.histories.write().expect("lock poisoned").remove(channel);
        self.secret_store.delete(&Self::secret_store_key(channel))
    }
}

fn truncate_history(history: &mut Vec<KeyEpoch>) {
    if history.len() > RETAINED_EPOCHS {
        let drop = history.len() - RETAINED_EPOCHS;
        history.drain(0..drop);
    }
}
