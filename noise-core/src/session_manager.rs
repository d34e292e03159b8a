//! Maps `peerID -> Session`, initiates/responds to handshakes, resolves races
//! between concurrently arriving handshake messages, and drives rekey.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::handshake_state::{Pattern, Role};
use crate::primitives::dh::StaticKeyPair;
use crate::secure_session::SecureSession;
use crate::session::Session;
use crate::validator::validate_handshake_message_size;

type EstablishedCallback = dyn Fn(&str, Option<[u8; 32]>) + Send + Sync;
type FailedCallback = dyn Fn(&str, &Error) + Send + Sync;

/// Multiplexes Noise sessions by peer ID under a single reader-writer lock, as
/// the core's concurrency model requires (multiple readers, one writer, no
/// callback ever invoked while the lock is held).
pub struct SessionManager {
    local_static: StaticKeyPair,
    pattern: Pattern,
    sessions: RwLock<HashMap<String, SecureSession>>,
    on_established: RwLock<Option<Arc<EstablishedCallback>>>,
    on_failed: RwLock<Option<Arc<FailedCallback>>>,
}

impl SessionManager {
    /// Sessions default to the XX pattern: the manager's job is multiplexing
    /// mutually-authenticating tunnels between mesh peers who do not know each
    /// other's static key in advance, which is exactly what XX is for.
    pub fn new(local_static: StaticKeyPair) -> Self {
        Self {
            local_static,
            pattern: Pattern::Xx,
            sessions: RwLock::new(HashMap::new()),
            on_established: RwLock::new(None),
            on_failed: RwLock::new(None),
        }
    }

    /// Registers the callback fired after a session reaches `Established`.
    /// Invoked outside any internal lock; ordering across peers is not
    /// guaranteed, only within a peer.
    pub fn on_session_established(&self, callback: impl Fn(&str, Option<[u8; 32]>) + Send + Sync + 'static) {
        *self.on_established.write().expect("lock poisoned") = Some(Arc::new(callback));
    }

    /// Registers the callback fired when a handshake fails and its session is removed.
    pub fn on_session_failed(&self, callback: impl Fn(&str, &Error) + Send + Sync + 'static) {
        *self.on_failed.write().expect("lock poisoned") = Some(Arc::new(callback));
    }

    /// `initiateHandshake(peerID) -> bytes`. Fails `AlreadyEstablished` if a
    /// live session already exists.
    pub fn initiate_handshake(&self, peer_id: &str) -> Result<Vec<u8>> {
        let mut sessions = self.sessions.write().expect("lock poisoned");
        if let Some(existing) = sessions.get(peer_id) {
            if existing.session().is_established() {
                return Err(Error::AlreadyEstablished);
            }
        }
        let mut session = Session::new(peer_id.to_string(), Role::Initiator, self.pattern);
        let first_message = session.start_handshake(self.local_static.clone())?;
        sessions.insert(peer_id.to_string(), SecureSession::new(session, Instant::now()));
        Ok(first_message)
    }

    /// `handleIncomingHandshake(peerID, bytes) -> bytes?`, implementing the
    /// five-case race resolution the core specifies:
    ///
    /// 1. no existing session -> create a responder session and process.
    /// 2. an `Established` session and a fresh 32-byte initiator `e` -> the peer
    ///    restarted; drop the established session and create a new responder.
    /// 3. an `Established` session otherwise -> `AlreadyEstablished`.
    /// 4. a `Handshaking` session and a fresh 32-byte `e` -> treat as restart.
    /// 5. otherwise, continue with the existing session.
    pub fn handle_incoming_handshake(
        &self,
        peer_id: &str,
        message: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        validate_handshake_message_size(message.len())?;
        let is_fresh_initiator_e = message.len() == 32;

        let outcome = {
            let mut sessions = self.sessions.write().expect("lock poisoned");

            let must_restart = match sessions.get(peer_id) {
                None => true,
                Some(s) if s.session().is_established() && is_fresh_initiator_e => true,
                Some(s) if s.session().is_established() => {
                    return Err(Error::AlreadyEstablished);
                }
                Some(s) if s.session().is_handshaking() && is_fresh_initiator_e => true,
                Some(_) => false,
            };

            if must_restart {
                sessions.insert(
                    peer_id.to_string(),
                    SecureSession::new(
                        Session::new(peer_id.to_string(), Role::Responder, self.pattern),
                        Instant::now(),
                    ),
                );
            }

            let secure = sessions
                .get_mut(peer_id)
                .expect("an entry was just ensured to exist");
            match secure
                .session_mut()
                .process_handshake_message(Some(self.local_static.clone()), message)
            {
                Ok(response) => {
                    let established = secure.session().is_established().then(|| {
                        secure.session().remote_static_key()
                    });
                    Ok((response, established))
                }
                Err(e) => {
                    sessions.remove(peer_id);
                    Err(e)
                }
            }
        };

        match outcome {
            Ok((response, Some(remote_static))) => {
                self.fire_established(peer_id, remote_static);
                Ok(response)
            }
            Ok((response, None)) => Ok(response),
            Err(e) => {
                self.fire_failed(peer_id, &e);
                Err(e)
            }
        }
    }

    /// `encrypt(peerID, plaintext) -> bytes`. Requires `Established`.
    pub fn encrypt(&self, peer_id: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut sessions = self.sessions.write().expect("lock poisoned");
        let secure = sessions.get_mut(peer_id).ok_or(Error::SessionNotFound)?;
        secure.encrypt(Instant::now(), plaintext)
    }

    /// `decrypt(peerID, bytes) -> plaintext`. Requires `Established`.
    pub fn decrypt(&self, peer_id: &str, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let mut sessions = self.sessions.write().expect("lock poisoned");
        let secure = sessions.get_mut(peer_id).ok_or(Error::SessionNotFound)?;
        secure.decrypt(Instant::now(), ciphertext)
    }

    pub fn remote_static_key(&self, peer_id: &str) -> Option<[u8; 32]> {
        self.sessions
            .read()
            .expect("lock poisoned")
            .get(peer_id)
            .and_then(|s| s.session().remote_static_key())
    }

    pub fn handshake_hash(&self, peer_id: &str) -> Option<[u8; 32]> {
        self.sessions
            .read()
            .expect("lock poisoned")
            .get(peer_id)
            .and_then(|s| s.session().handshake_hash())
    }

    /// `sessionsNeedingRekey() -> [peerID]`.
    pub fn sessions_needing_rekey(&self) -> Vec<String> {
        let now = Instant::now();
        self.sessions
            .read()
            .expect("lock poisoned")
            .iter()
            .filter(|(_, s)| s.needs_renegotiation(now))
            .map(|(peer, _)| peer.clone())
            .collect()
    }

    /// `initiateRekey(peer)`: removes and re-initiates.
    pub fn initiate_rekey(&self, peer_id: &str) -> Result<Vec<u8>> {
        self.sessions.write().expect("lock poisoned").remove(peer_id);
        self.initiate_handshake(peer_id)
    }

    /// Peers still `Handshaking` whose session is older than `max_age`.
    /// Incomplete handshakes older than this SHOULD be abandoned by the caller;
    /// the manager only exposes the state needed to decide, it does not run a
    /// timer or remove anything itself.
    pub fn stale_handshakes(&self, now: Instant, max_age: Duration) -> Vec<String> {
        self.sessions
            .read()
            .expect("lock poisoned")
            .iter()
            .filter(|(_, s)| s.session().is_handshaking() && s.age(now) > max_age)
            .map(|(peer, _)| peer.clone())
            .collect()
    }

    /// Drops a session outright, e.g. after the caller abandons a stale
    /// handshake per `stale_handshakes`. Idempotent if no session exists.
    pub fn reset_session(&self, peer_id: &str) {
        self.sessions.write().expect("lock poisoned").remove(peer_id);
    }

    fn fire_established(&self, peer_id: &str, remote_static: Option<[u8; 32]>) {
        if let Some(cb) = self.on_established.read().expect("lock poisoned").clone() {
            cb(peer_id, remote_static);
        }
    }

    fn fire_failed(&self, peer_id: &str, err: &Error) {
        tracing::debug!(peer = peer_id, %err, "handshake failed, session discarded");
        if let Some(cb) = self.on_failed.read().expect("lock poisoned").clone() {
            cb(peer_id, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handshake_round_trip_through_manager() {
        let init_mgr = SessionManager::new(StaticKeyPair::generate());
        let resp_mgr = SessionManager::new(StaticKeyPair::generate());

        let msg1 = init_mgr.initiate_handshake("responder").expect("initiates");
        let msg2 = resp_mgr
            .handle_incoming_handshake("initiator", &msg1)
            .expect("processes msg1")
            .expect("responder replies");
        let msg3 = init_mgr
            .handle_incoming_handshake("responder", &msg2)
            .expect("processes msg2")
            .expect("initiator sends final message");
        let none = resp_mgr
            .handle_incoming_handshake("initiator", &msg3)
            .expect("processes msg3");
        assert!(none.is_none());

        let ct = init_mgr.encrypt("responder", b"hello").expect("encrypts");
        let pt = resp_mgr.decrypt("initiator", &ct).expect("decrypts");
        assert_eq!(pt, b"hello");
    }

    #[test]
    fn race_case_established_plus_fresh_e_restarts() {
        let init_mgr = SessionManager::new(StaticKeyPair::generate());
        let resp_mgr = SessionManager::new(StaticKeyPair::generate());
        let established = Arc::new(AtomicUsize::new(0));
        let established_clone = established.clone();
        resp_mgr.on_session_established(move |_peer, _rs| {
            established_clone.fetch_add(1, Ordering::SeqCst);
        });

        let msg1 = init_mgr.initiate_handshake("responder").expect("initiates");
        let msg2 = resp_mgr
            .handle_incoming_handshake("initiator", &msg1)
            .expect("processes")
            .expect("replies");
        let msg3 = init_mgr
            .handle_incoming_handshake("responder", &msg2)
            .expect("processes")
            .expect("final message");
        resp_mgr
            .handle_incoming_handshake("initiator", &msg3)
            .expect("establishes");
        assert_eq!(established.load(Ordering::SeqCst), 1);

        // peer "restarts": send a fresh 32-byte initiator `e` to the already-Established side.
        let fresh = vec![7u8; 32];
        let fresh_validity = resp_mgr.handle_incoming_handshake("initiator", &fresh);
        // a bare `e` with no valid tag for the remainder is fine here - there is no
        // remainder - so the responder creates a brand-new responder session and
        // accepts the restart rather than failing with AlreadyEstablished.
        assert!(fresh_validity.is_ok());
    }

    #[test]
    fn race_case_established_otherwise_rejected() {
        let init_mgr = SessionManager::new(StaticKeyPair::generate());
        let resp_mgr = SessionManager::new(StaticKeyPair::generate());
        let msg1 = init_mgr.initiate_handshake("responder").expect("initiates");
        let msg2 = resp_mgr
            .handle_incoming_handshake("initiator", &msg1)
            .expect("processes")
            .expect("replies");
        let msg3 = init_mgr
            .handle_incoming_handshake("responder", &msg2)
            .expect("processes")
            .expect("final message");
        resp_mgr
            .handle_incoming_handshake("initiator", &msg3)
            .expect("establishes");

        let bogus = vec![1u8; 64];
        assert!(matches!(
            resp_mgr.handle_incoming_handshake("initiator", &bogus),
            Err(Error::AlreadyEstablished)
        ));
    }

    #[test]
    fn failed_handshake_is_removed_and_callback_fires() {
        let resp_mgr = SessionManager::new(StaticKeyPair::generate());
        let failed = Arc::new(AtomicUsize::new(0));
        let failed_clone = failed.clone();
        resp_mgr.on_session_failed(move |_peer, _err| {
            failed_clone.fetch_add(1, Ordering::SeqCst);
        });

        let zero_e = vec![0u8; 32];
        assert!(resp_mgr
            .handle_incoming_handshake("attacker", &zero_e)
            .is_err());
        assert_eq!(failed.load(Ordering::SeqCst), 1);
        assert!(resp_mgr.remote_static_key("attacker").is_none());
    }

    #[test]
    fn stale_handshake_is_reported_and_can_be_reset() {
        let resp_mgr = SessionManager::new(StaticKeyPair::generate());
        // A bare `e` with no valid completion to follow leaves the responder
        // parked in `Handshaking` indefinitely.
        let init_static = StaticKeyPair::generate();
        let mut initiator = Session::new("resp".into(), Role::Initiator, Pattern::Xx);
        let msg1 = initiator.start_handshake(init_static).expect("starts");
        resp_mgr
            .handle_incoming_handshake("initiator", &msg1)
            .expect("processes msg1");

        let now = Instant::now();
        assert!(resp_mgr.stale_handshakes(now, Duration::from_secs(60)).is_empty());
        let later = now + Duration::from_secs(61);
        assert_eq!(
            resp_mgr.stale_handshakes(later, Duration::from_secs(60)),
            vec!["initiator".to_string()]
        );

        resp_mgr.reset_session("initiator");
        assert!(resp_mgr.stale_handshakes(later, Duration::from_secs(60)).is_empty());
    }
}
