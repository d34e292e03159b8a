//! Pattern-driven handshake message assembly/parsing for XX, IK, and NK.
//!
//! Per the redesign note in the core's design notes, completion is modeled as a
//! sum type rather than a pile of `Option` fields checked at every call site:
//! once the token stream is exhausted the ephemeral/static/remote key slots are
//! dropped entirely and replaced by exactly the two transport cipher states plus
//! the values a completed handshake actually has (remote static key, transcript
//! hash). There is no reachable state in which `Complete` still carries a
//! half-consumed `e`/`re` slot.

use x25519_dalek::PublicKey;

use crate::cipher_state::CipherState;
use crate::error::{Error, Result};
use crate::primitives::dh::{dh_static, EphemeralKeyPair, StaticKeyPair};
use crate::symmetric_state::SymmetricState;
use crate::validator::validate_public_key;

/// Which side of the handshake this instance plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// The three Noise patterns this engine implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Xx,
    Ik,
    Nk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    E,
    S,
    Ee,
    Es,
    Se,
    Ss,
}
use Token::*;

impl Pattern {
    /// Bit-exact protocol name string per the spec's external interface.
    pub fn protocol_name(&self) -> &'static str {
        match self {
            Pattern::Xx => "Noise_XX_25519_ChaChaPoly_SHA256",
            Pattern::Ik => "Noise_IK_25519_ChaChaPoly_SHA256",
            Pattern::Nk => "Noise_NK_25519_ChaChaPoly_SHA256",
        }
    }

    fn message_tokens(&self) -> &'static [&'static [Token]] {
        match self {
            Pattern::Xx => &[&[E], &[E, Ee, S, Es], &[S, Se]],
            Pattern::Ik => &[&[E, Es, S, Ss], &[E, Ee, Se]],
            Pattern::Nk => &[&[E, Es], &[E, Ee]],
        }
    }

    /// Whether the initiator must mix the responder's known static key into the
    /// transcript before the first message (IK and NK; not XX).
    fn initiator_premixes_responder_static(&self) -> bool {
        matches!(self, Pattern::Ik | Pattern::Nk)
    }
}

/// Keys carried while a handshake is still in progress.
struct InProgress {
    role: Role,
    pattern: Pattern,
    ss: SymmetricState,
    s: Option<StaticKeyPair>,
    e: Option<EphemeralKeyPair>,
    rs: Option<PublicKey>,
    re: Option<PublicKey>,
    message_index: usize,
}

/// Everything a caller needs once the handshake has completed: nothing more.
pub struct Completed {
    pub send: CipherState,
    pub recv: CipherState,
    pub handshake_hash: [u8; 32],
    /// The peer's static public key, if this pattern/role combination learns one.
    /// `None` for an NK responder, which never learns an initiator identity
    /// (that is the point of the "N", no static, initiator side of NK).
    pub remote_static: Option<[u8; 32]>,
}

/// A Noise handshake, modeled as a state machine: `InProgress` while tokens
/// remain, `Complete` once `split()` has run.
pub enum HandshakeState {
    InProgress(Box<InProgress>),
    Complete(Box<Completed>),
}

impl HandshakeState {
    /// Starts a new handshake. `local_static` is required for XX/IK (both sides
    /// send a static key at some point) and for an NK initiator's `rs`; `remote_static`
    /// is the known responder static key required by IK and NK.
    pub fn new(
        role: Role,
        pattern: Pattern,
        local_static: Option<StaticKeyPair>,
        remote_static: Option<[u8; 32]>,
    ) -> Result<Self> {
        let mut ss = SymmetricState::initialize(pattern.protocol_name());

        let rs = match remote_static {
            Some(bytes) => {
                let validated = validate_public_key(&bytes)?;
                Some(PublicKey::from(validated))
            }
            None => None,
        };

        if pattern.initiator_premixes_responder_static() {
            let rs_bytes = rs.ok_or(Error::MissingKeys("IK/NK requires remote static key"))?;
            ss.mix_hash(rs_bytes.as_bytes());
        }

        let local_static_required = match (pattern, role) {
            (Pattern::Xx, _) | (Pattern::Ik, _) => true,
            (Pattern::Nk, Role::Responder) => true,
            (Pattern::Nk, Role::Initiator) => false,
        };
        if local_static_required && local_static.is_none() {
            return Err(Error::MissingLocalStaticKey);
        }

        Ok(HandshakeState::InProgress(Box::new(InProgress {
            role,
            pattern,
            ss,
            s: local_static,
            e: None,
            rs,
            re: None,
            message_index: 0,
        })))
    }

    /// True once the handshake has completed and `split()` has run.
    pub fn is_complete(&self) -> bool {
        matches!(self, HandshakeState::Complete(_))
    }

    /// Writes the next handshake message, returning the wire bytes.
    pub fn write_message(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let HandshakeState::InProgress(inner) = self else {
            return Err(Error::HandshakeComplete);
        };

        let tokens = *inner
            .pattern
            .message_tokens()
            .get(inner.message_index)
            .ok_or(Error::HandshakeComplete)?;

        let mut out = Vec::new();
        for token in tokens {
            match token {
                Token::E => {
                    let e = EphemeralKeyPair::generate();
                    out.extend_from_slice(e.public.as_bytes());
                    inner.ss.mix_hash(e.public.as_bytes());
                    inner.e = Some(e);
                }
                Token::S => {
                    let s = inner.s.as_ref().ok_or(Error::MissingLocalStaticKey)?;
                    let ct = inner.ss.encrypt_and_hash(s.public.as_bytes())?;
                    out.extend_from_slice(&ct);
                }
                Token::Ee => mix_dh(inner, DhSide::EphemeralEphemeral)?,
                Token::Es => mix_dh(
                    inner,
                    if inner.role == Role::Initiator {
                        DhSide::EphemeralRemoteStatic
                    } else {
                        DhSide::StaticRemoteEphemeral
                    },
                )?,
                Token::Se => mix_dh(
                    inner,
                    if inner.role == Role::Initiator {
                        DhSide::StaticRemoteEphemeral
                    } else {
                        DhSide::EphemeralRemoteStatic
                    },
                )?,
                Token::Ss => mix_dh(inner, DhSide::StaticRemoteStatic)?,
            }
        }

        let ct = inner.ss.encrypt_and_hash(payload)?;
        out.extend_from_slice(&ct);
        inner.message_index += 1;

        self.maybe_complete();
        Ok(out)
    }

    /// Reads the next handshake message, returning the decrypted payload.
    pub fn read_message(&mut self, buf: &[u8]) -> Result<Vec<u8>> {
        let HandshakeState::InProgress(inner) = self else {
            return Err(Error::HandshakeComplete);
        };

        let tokens = *inner
            .pattern
            .message_tokens()
            .get(inner.message_index)
            .ok_or(Error::HandshakeComplete)?;

        let mut cursor = buf;
        for token in tokens {
            match token {
                Token::E => {
                    let (raw, rest) = take(cursor, 32)?;
                    let validated = validate_public_key(raw)?;
                    inner.ss.mix_hash(raw);
                    inner.re = Some(PublicKey::from(validated));
                    cursor = rest;
                }
                Token::S => {
                    let len = if inner.ss.is_keyed() { 48 } else { 32 };
                    let (raw, rest) = take(cursor, len)?;
                    let plaintext = inner.ss.decrypt_and_hash(raw)?;
                    let validated = validate_public_key(&plaintext)?;
                    inner.rs = Some(PublicKey::from(validated));
                    cursor = rest;
                }
                Token::Ee => mix_dh(inner, DhSide::EphemeralEphemeral)?,
                Token::Es => mix_dh(
                    inner,
                    if inner.role == Role::Initiator {
                        DhSide::EphemeralRemoteStatic
                    } else {
                        DhSide::StaticRemoteEphemeral
                    },
                )?,
                Token::Se => mix_dh(
                    inner,
                    if inner.role == Role::Initiator {
                        DhSide::StaticRemoteEphemeral
                    } else {
                        DhSide::EphemeralRemoteStatic
                    },
                )?,
                Token::Ss => mix_dh(inner, DhSide::StaticRemoteStatic)?,
            }
        }

        let payload = inner.ss.decrypt_and_hash(cursor)?;
        inner.message_index += 1;

        self.maybe_complete();
        Ok(payload)
    }

    fn maybe_complete(&mut self) {
        let HandshakeState::InProgress(inner) = self else {
            return;
        };
        if inner.message_index < inner.pattern.message_tokens().len() {
            return;
        }
        let remote_static = inner.rs.map(|pk| *pk.as_bytes());
        let handshake_hash = inner.ss.handshake_hash();
        let (cs1, cs2) = inner.ss.split();
        let (send, recv) = match inner.role {
            Role::Initiator => (cs1, cs2),
            Role::Responder => (cs2, cs1),
        };
        *self = HandshakeState::Complete(Box::new(Completed {
            send,
            recv,
            handshake_hash,
            remote_static,
        }));
    }
}

enum DhSide {
    EphemeralEphemeral,
    EphemeralRemoteStatic,
    StaticRemoteEphemeral,
    StaticRemoteStatic,
}

fn mix_dh(inner: &mut InProgress, side: DhSide) -> Result<()> {
    let secret_bytes = match side {
        DhSide::EphemeralEphemeral => {
            let e = inner.e.as_mut().ok_or(Error::MissingKeys("ee needs local e"))?;
            let re = inner.re.ok_or(Error::MissingKeys("ee needs remote e"))?;
            e.diffie_hellman(&re)
        }
        DhSide::EphemeralRemoteStatic => {
            let e = inner.e.as_mut().ok_or(Error::MissingKeys("es needs local e"))?;
            let rs = inner.rs.ok_or(Error::MissingKeys("es needs remote s"))?;
            e.diffie_hellman(&rs)
        }
        DhSide::StaticRemoteEphemeral => {
            let s = inner.s.as_ref().ok_or(Error::MissingLocalStaticKey)?;
            let re = inner.re.ok_or(Error::MissingKeys("se needs remote e"))?;
            dh_static(&s.secret, &re)
        }
        DhSide::StaticRemoteStatic => {
            let s = inner.s.as_ref().ok_or(Error::MissingLocalStaticKey)?;
            let rs = inner.rs.ok_or(Error::MissingKeys("ss needs remote s"))?;
            dh_static(&s.secret, &rs)
        }
    };
    inner.ss.mix_key(&secret_bytes);
    Ok(())
}

fn take(buf: &[u8], n: usize) -> Result<(&[u8], &[u8])> {
    if buf.len() < n {
        return Err(Error::InvalidMessage(format!(
            "expected at least {n} bytes, have {}",
            buf.len()
        )));
    }
    Ok(buf.split_at(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_to_completion(pattern: Pattern, initiator_static: bool, responder_static: bool) -> (Completed, Completed) {
        let init_s = initiator_static.then(StaticKeyPair::generate);
        let resp_s = responder_static.then(StaticKeyPair::generate);
        let resp_pub = resp_s.as_ref().map(|kp| *kp.public.as_bytes());

        let mut initiator = HandshakeState::new(
            Role::Initiator,
            pattern,
            init_s,
            if matches!(pattern, Pattern::Ik | Pattern::Nk) {
                resp_pub
            } else {
                None
            },
        )
        .expect("initiator constructs");
        let mut responder =
            HandshakeState::new(Role::Responder, pattern, resp_s, None).expect("responder constructs");

        let mut turn_initiator = true;
        loop {
            if turn_initiator {
                if initiator.is_complete() {
                    break;
                }
                let msg = initiator.write_message(b"").expect("writes");
                let _ = responder.read_message(&msg).expect("reads");
            } else {
                let msg = responder.write_message(b"").expect("writes");
                let _ = initiator.read_message(&msg).expect("reads");
            }
            turn_initiator = !turn_initiator;
        }

        let HandshakeState::Complete(i) = initiator else {
            panic!("initiator must be complete")
        };
        let HandshakeState::Complete(r) = responder else {
            panic!("responder must be complete")
        };
        (*i, *r)
    }

    #[test]
    fn xx_handshake_agrees_on_hash_and_transport() {
        let (init, resp) = run_to_completion(Pattern::Xx, true, true);
        assert_eq!(init.handshake_hash, resp.handshake_hash);

        let mut init_send = init.send;
        let mut resp_recv = resp.recv;
        let ct = init_send.encrypt(b"", b"hello").expect("encrypts");
        let pt = resp_recv.decrypt(b"", &ct).expect("decrypts");
        assert_eq!(pt, b"hello");

        let mut resp_send = resp.send;
        let mut init_recv = init.recv;
        let ct2 = resp_send.encrypt(b"", b"world").expect("encrypts");
        let pt2 = init_recv.decrypt(b"", &ct2).expect("decrypts");
        assert_eq!(pt2, b"world");
    }

    #[test]
    fn ik_handshake_completes() {
        let (init, resp) = run_to_completion(Pattern::Ik, true, true);
        assert_eq!(init.handshake_hash, resp.handshake_hash);
    }

    #[test]
    fn nk_handshake_completes_without_initiator_static() {
        let (init, resp) = run_to_completion(Pattern::Nk, false, true);
        assert_eq!(init.handshake_hash, resp.handshake_hash);
    }

    #[test]
    fn low_order_remote_ephemeral_is_rejected() {
        let mut responder =
            HandshakeState::new(Role::Responder, Pattern::Xx, Some(StaticKeyPair::generate()), None)
                .expect("constructs");
        let zero_e = [0u8; 32];
        let err = responder.read_message(&zero_e).unwrap_err();
        assert!(matches!(err, Error::InvalidPublicKey));
    }

    #[test]
    fn writing_past_completion_fails() {
        let (mut init, _resp) = {
            let (i, r) = run_to_completion(Pattern::Xx, true, true);
            (HandshakeState::Complete(Box::new(i)), r)
        };
        assert!(matches!(
            init.write_message(b""),
            Err(Error::HandshakeComplete)
        ));
    }
}
