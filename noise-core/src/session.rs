//! One Noise tunnel: state machine, send/receive cipher pair, and the values a
//! completed handshake leaves behind (remote static key, transcript hash).

use crate::error::{Error, Result};
use crate::handshake_state::{HandshakeState, Pattern, Role};
use crate::primitives::dh::StaticKeyPair;

/// `Session`'s state machine: `Uninit -> Handshaking -> Established | Failed`.
pub enum SessionState {
    Uninit,
    Handshaking(HandshakeState),
    Established {
        send: crate::cipher_state::CipherState,
        recv: crate::cipher_state::CipherState,
        remote_static: Option<[u8; 32]>,
        handshake_hash: [u8; 32],
    },
    Failed(String),
}

/// One peer's Noise tunnel. Always constructed through `SessionManager` so race
/// resolution (see `session_manager`) stays centralized.
pub struct Session {
    peer_id: String,
    role: Role,
    pattern: Pattern,
    state: SessionState,
}

impl Session {
    pub(crate) fn new(peer_id: String, role: Role, pattern: Pattern) -> Self {
        Self {
            peer_id,
            role,
            pattern,
            state: SessionState::Uninit,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_established(&self) -> bool {
        matches!(self.state, SessionState::Established { .. })
    }

    pub fn is_handshaking(&self) -> bool {
        matches!(self.state, SessionState::Handshaking(_))
    }

    /// `startHandshake()`: must be `Uninit`. Builds an XX `HandshakeState` with the
    /// local static key; an initiator immediately writes and returns the first
    /// message, a responder returns an empty buffer (nothing to send yet).
    pub fn start_handshake(&mut self, local_static: StaticKeyPair) -> Result<Vec<u8>> {
        if !matches!(self.state, SessionState::Uninit) {
            return Err(Error::InvalidState);
        }
        let mut hs = HandshakeState::new(self.role, self.pattern, Some(local_static), None)?;
        let first = match self.role {
            Role::Initiator => hs.write_message(&[])?,
            Role::Responder => Vec::new(),
        };
        self.state = SessionState::Handshaking(hs);
        Ok(first)
    }

    /// `processHandshakeMessage(m)`: lazily initializes a responder still in
    /// `Uninit`. Reads `m`; if the handshake is not yet complete, writes and
    /// returns a response. On completion, derives the transport ciphers and
    /// clears the handshake state.
    pub fn process_handshake_message(
        &mut self,
        local_static: Option<StaticKeyPair>,
        message: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        if matches!(self.state, SessionState::Uninit) {
            if self.role != Role::Responder {
                return Err(Error::InvalidState);
            }
            let local_static = local_static.ok_or(Error::MissingLocalStaticKey)?;
            let hs = HandshakeState::new(self.role, self.pattern, Some(local_static), None)?;
            self.state = SessionState::Handshaking(hs);
        }

        let SessionState::Handshaking(hs) = &mut self.state else {
            return Err(Error::InvalidState);
        };

        let read_result = hs.read_message(message);
        if let Err(e) = read_result {
            self.state = SessionState::Failed(e.to_string());
            return Err(e);
        }

        let SessionState::Handshaking(hs) = &mut self.state else {
            unreachable!("just matched Handshaking above")
        };

        let response = if hs.is_complete() {
            None
        } else {
            match hs.write_message(&[]) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    self.state = SessionState::Failed(e.to_string());
                    return Err(e);
                }
            }
        };

        let SessionState::Handshaking(hs) = &self.state else {
            unreachable!("just matched Handshaking above")
        };
        if hs.is_complete() {
            let SessionState::Handshaking(hs) =
                std::mem::replace(&mut self.state, SessionState::Uninit)
            else {
                unreachable!("checked above")
            };
            let HandshakeState::Complete(completed) = hs else {
                unreachable!("is_complete() just returned true")
            };
            self.state = SessionState::Established {
                send: completed.send,
                recv: completed.recv,
                remote_static: completed.remote_static,
                handshake_hash: completed.handshake_hash,
            };
        }

        Ok(response)
    }

    pub fn remote_static_key(&self) -> Option<[u8; 32]> {
        match &self.state {
            SessionState::Established { remote_static, .. } => *remote_static,
            _ => None,
        }
    }

    pub fn handshake_hash(&self) -> Option<[u8; 32]> {
        match &self.state {
            SessionState::Established { handshake_hash, .. } => Some(*handshake_hash),
            _ => None,
        }
    }

    /// Requires `Established`; seals under the empty AD the spec's cipher layer uses.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        match &mut self.state {
            SessionState::Established { send, .. } => send.encrypt(&[], plaintext),
            _ => Err(Error::NotEstablished),
        }
    }

    /// Requires `Established`.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        match &mut self.state {
            SessionState::Established { recv, .. } => recv.decrypt(&[], ciphertext),
            _ => Err(Error::NotEstablished),
        }
    }

    /// Returns to `Uninit`, dropping any handshake or transport state.
    pub fn reset(&mut self) {
        self.state = SessionState::Uninit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_handshake_establishes_both_sides() {
        let init_static = StaticKeyPair::generate();
        let resp_static = StaticKeyPair::generate();

        let mut initiator = Session::new("resp".into(), Role::Initiator, Pattern::Xx);
        let mut responder = Session::new("init".into(), Role::Responder, Pattern::Xx);

        let msg1 = initiator.start_handshake(init_static).expect("starts");
        let msg2 = responder
            .process_handshake_message(Some(resp_static), &msg1)
            .expect("processes msg1")
            .expect("responder has a reply");
        let msg3 = initiator
            .process_handshake_message(None, &msg2)
            .expect("processes msg2")
            .expect("initiator has a final message");
        let none = responder
            .process_handshake_message(None, &msg3)
            .expect("processes msg3");
        assert!(none.is_none());

        assert!(initiator.is_established());
        assert!(responder.is_established());
        assert_eq!(
            initiator.handshake_hash().unwrap(),
            responder.handshake_hash().unwrap()
        );

        let ct = initiator.encrypt(b"hi").expect("encrypts");
        let pt = responder.decrypt(&ct).expect("decrypts");
        assert_eq!(pt, b"hi");
    }

    #[test]
    fn encrypt_before_established_fails() {
        let mut s = Session::new("p".into(), Role::Initiator, Pattern::Xx);
        assert!(matches!(s.encrypt(b"x"), Err(Error::NotEstablished)));
    }
}
