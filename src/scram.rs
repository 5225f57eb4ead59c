//! SCRAM-SHA-{1,224,256,384,512} (and the legacy MD5 variant some networks
//! still advertise) client-side state machine, per RFC 5802 §5.
//!
//! Ported from `examples/original_source/ircrobots/scram.py`; see spec.md §4.3.1.

use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Digest;
use subtle::ConstantTimeEq;
use thiserror::Error;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// The hash family driving a SCRAM mechanism, named after IANA's hash
/// function textual names (RFC 5802 §4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScramAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl ScramAlgorithm {
    /// The SASL mechanism name, e.g. `SCRAM-SHA-256`.
    pub fn mechanism_name(&self) -> &'static str {
        match self {
            ScramAlgorithm::Md5 => "SCRAM-MD5",
            ScramAlgorithm::Sha1 => "SCRAM-SHA-1",
            ScramAlgorithm::Sha224 => "SCRAM-SHA-224",
            ScramAlgorithm::Sha256 => "SCRAM-SHA-256",
            ScramAlgorithm::Sha384 => "SCRAM-SHA-384",
            ScramAlgorithm::Sha512 => "SCRAM-SHA-512",
        }
    }
}

/// The ten SCRAM error codes the server may send back in an `e=` field,
/// plus `NonceUnacceptable`, a client-side addition (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScramError {
    #[error("invalid-encoding")]
    InvalidEncoding,
    #[error("extensions-not-supported")]
    ExtensionsNotSupported,
    #[error("invalid-proof")]
    InvalidProof,
    #[error("channel-bindings-dont-match")]
    ChannelBindingsDontMatch,
    #[error("server-does-support-channel-binding")]
    ServerDoesSupportChannelBinding,
    #[error("channel-binding-not-supported")]
    ChannelBindingNotSupported,
    #[error("unsupported-channel-binding-type")]
    UnsupportedChannelBindingType,
    #[error("unknown-user")]
    UnknownUser,
    #[error("invalid-username-encoding")]
    InvalidUsernameEncoding,
    #[error("no-resources")]
    NoResources,
    #[error("other-error")]
    Other,
    #[error("nonce-unacceptable")]
    NonceUnacceptable,
}

impl ScramError {
    fn from_server_code(code: &str) -> ScramError {
        match code {
            "invalid-encoding" => ScramError::InvalidEncoding,
            "extensions-not-supported" => ScramError::ExtensionsNotSupported,
            "invalid-proof" => ScramError::InvalidProof,
            "channel-bindings-dont-match" => ScramError::ChannelBindingsDontMatch,
            "server-does-support-channel-binding" => ScramError::ServerDoesSupportChannelBinding,
            "channel-binding-not-supported" => ScramError::ChannelBindingNotSupported,
            "unsupported-channel-binding-type" => ScramError::UnsupportedChannelBindingType,
            "unknown-user" => ScramError::UnknownUser,
            "invalid-username-encoding" => ScramError::InvalidUsernameEncoding,
            "no-resources" => ScramError::NoResources,
            _ => ScramError::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScramState {
    None,
    ClientFirst,
    ClientFinal,
    Success,
    Failure,
    VerifyFailure,
}

/// Client-side SCRAM state for a single authentication attempt.
pub struct ScramContext {
    algo: ScramAlgorithm,
    username: Vec<u8>,
    password: Vec<u8>,
    pub state: ScramState,
    pub error: Option<ScramError>,

    client_first_bare: Vec<u8>,
    client_nonce: Vec<u8>,
    salted_password: Vec<u8>,
    auth_message: Vec<u8>,
}

fn scram_escape(s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for &b in s {
        match b {
            b'=' => out.extend_from_slice(b"=3D"),
            b',' => out.extend_from_slice(b"=2C"),
            other => out.push(other),
        }
    }
    out
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}

fn pieces(data: &[u8]) -> Option<std::collections::HashMap<u8, Vec<u8>>> {
    let mut map = std::collections::HashMap::new();
    for piece in data.split(|&b| b == b',') {
        let eq = piece.iter().position(|&b| b == b'=')?;
        map.insert(piece[0], piece[eq + 1..].to_vec());
    }
    Some(map)
}

/// Dispatches the three primitives SCRAM needs (hash, HMAC, PBKDF2) over
/// the runtime-selected [`ScramAlgorithm`]. Each arm is monomorphic in its
/// concrete `sha2`/`sha1`/`md-5` type, so there is no need to hunt for a
/// single trait bound wide enough to cover `Hmac<D>: Mac` generically.
macro_rules! scram_primitives {
    ($name_hash:ident, $name_hmac:ident, $name_pbkdf2:ident) => {
        fn $name_hash(algo: ScramAlgorithm, msg: &[u8]) -> Vec<u8> {
            match algo {
                ScramAlgorithm::Md5 => md5::Md5::digest(msg).to_vec(),
                ScramAlgorithm::Sha1 => sha1::Sha1::digest(msg).to_vec(),
                ScramAlgorithm::Sha224 => sha2::Sha224::digest(msg).to_vec(),
                ScramAlgorithm::Sha256 => sha2::Sha256::digest(msg).to_vec(),
                ScramAlgorithm::Sha384 => sha2::Sha384::digest(msg).to_vec(),
                ScramAlgorithm::Sha512 => sha2::Sha512::digest(msg).to_vec(),
            }
        }

        fn $name_hmac(algo: ScramAlgorithm, key: &[u8], msg: &[u8]) -> Vec<u8> {
            macro_rules! mac_of {
                ($d:ty) => {{
                    let mut mac = <Hmac<$d> as Mac>::new_from_slice(key)
                        .expect("HMAC accepts any key length");
                    mac.update(msg);
                    mac.finalize().into_bytes().to_vec()
                }};
            }
            match algo {
                ScramAlgorithm::Md5 => mac_of!(md5::Md5),
                ScramAlgorithm::Sha1 => mac_of!(sha1::Sha1),
                ScramAlgorithm::Sha224 => mac_of!(sha2::Sha224),
                ScramAlgorithm::Sha256 => mac_of!(sha2::Sha256),
                ScramAlgorithm::Sha384 => mac_of!(sha2::Sha384),
                ScramAlgorithm::Sha512 => mac_of!(sha2::Sha512),
            }
        }

        fn $name_pbkdf2(algo: ScramAlgorithm, password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
            macro_rules! pbkdf2_of {
                ($d:ty, $len:expr) => {{
                    let mut out = vec![0u8; $len];
                    pbkdf2::pbkdf2_hmac::<$d>(password, salt, iterations, &mut out);
                    out
                }};
            }
            match algo {
                ScramAlgorithm::Md5 => pbkdf2_of!(md5::Md5, 16),
                ScramAlgorithm::Sha1 => pbkdf2_of!(sha1::Sha1, 20),
                ScramAlgorithm::Sha224 => pbkdf2_of!(sha2::Sha224, 28),
                ScramAlgorithm::Sha256 => pbkdf2_of!(sha2::Sha256, 32),
                ScramAlgorithm::Sha384 => pbkdf2_of!(sha2::Sha384, 48),
                ScramAlgorithm::Sha512 => pbkdf2_of!(sha2::Sha512, 64),
            }
        }
    };
}

scram_primitives!(hash, hmac_of, pbkdf2_of);

impl ScramContext {
    pub fn new(algo: ScramAlgorithm, username: &str, password: &str) -> ScramContext {
        ScramContext {
            algo,
            username: username.as_bytes().to_vec(),
            password: password.as_bytes().to_vec(),
            state: ScramState::None,
            error: None,
            client_first_bare: Vec::new(),
            client_nonce: Vec::new(),
            salted_password: Vec::new(),
            auth_message: Vec::new(),
        }
    }

    fn fail(&mut self, code_str: &str) {
        self.error = Some(ScramError::from_server_code(code_str));
        self.state = ScramState::Failure;
    }

    /// `n,,n=<user>,r=<nonce>`, the GS2 header plus the "client-first-message-bare".
    pub fn client_first(&mut self) -> Vec<u8> {
        self.state = ScramState::ClientFirst;
        let mut nonce_raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce_raw);
        self.client_nonce = B64.encode(nonce_raw).into_bytes();

        let mut bare = b"n=".to_vec();
        bare.extend(scram_escape(&self.username));
        bare.extend(b",r=");
        bare.extend(&self.client_nonce);
        self.client_first_bare = bare;

        let mut out = b"n,,".to_vec();
        out.extend(&self.client_first_bare);
        out
    }

    /// Consume the server's `server-first-message`, returning the
    /// `client-final-message` (empty on failure; check `state`/`error`).
    pub fn server_first(&mut self, data: &[u8]) -> Vec<u8> {
        self.state = ScramState::ClientFinal;

        let Some(pieces) = pieces(data) else {
            self.fail("invalid-encoding");
            return Vec::new();
        };
        if let Some(e) = pieces.get(&b'e') {
            self.fail(&String::from_utf8_lossy(e));
            return Vec::new();
        }

        let Some(nonce) = pieces.get(&b'r') else {
            self.fail("invalid-encoding");
            return Vec::new();
        };
        if !nonce.starts_with(&self.client_nonce) || nonce == &self.client_nonce {
            self.error = Some(ScramError::NonceUnacceptable);
            self.state = ScramState::Failure;
            return Vec::new();
        }

        let (Some(salt_b64), Some(iter_bytes)) = (pieces.get(&b's'), pieces.get(&b'i')) else {
            self.fail("invalid-encoding");
            return Vec::new();
        };
        let Ok(salt) = B64.decode(salt_b64) else {
            self.fail("invalid-encoding");
            return Vec::new();
        };
        let Ok(iterations) = std::str::from_utf8(iter_bytes).unwrap_or("").parse::<u32>() else {
            self.fail("invalid-encoding");
            return Vec::new();
        };

        let salted_password = pbkdf2_of(self.algo, &self.password, &salt, iterations);
        self.salted_password = salted_password.clone();

        let client_key = hmac_of(self.algo, &salted_password, b"Client Key");
        let stored_key = hash(self.algo, &client_key);

        let channel = B64.encode(b"n,,");
        let mut auth_noproof = b"c=".to_vec();
        auth_noproof.extend(channel.as_bytes());
        auth_noproof.extend(b",r=");
        auth_noproof.extend(nonce);

        let mut auth_message = self.client_first_bare.clone();
        auth_message.push(b',');
        auth_message.extend(data);
        auth_message.push(b',');
        auth_message.extend(&auth_noproof);
        self.auth_message = auth_message.clone();

        let client_signature = hmac_of(self.algo, &stored_key, &auth_message);
        let client_proof = xor(&client_key, &client_signature);

        let mut out = auth_noproof;
        out.extend(b",p=");
        out.extend(B64.encode(client_proof).into_bytes());
        out
    }

    /// Consume the server's `server-final-message`. Returns `true` on
    /// `SUCCESS`, `false` on `FAILURE`/`VERIFY_FAILURE` (check `state`).
    pub fn server_final(&mut self, data: &[u8]) -> bool {
        let Some(pieces) = pieces(data) else {
            self.fail("invalid-encoding");
            return false;
        };
        if let Some(e) = pieces.get(&b'e') {
            self.fail(&String::from_utf8_lossy(e));
            return false;
        }

        let Some(verifier_b64) = pieces.get(&b'v') else {
            self.fail("invalid-encoding");
            return false;
        };
        let Ok(verifier) = B64.decode(verifier_b64) else {
            self.fail("invalid-encoding");
            return false;
        };

        let server_key = hmac_of(self.algo, &self.salted_password, b"Server Key");
        let server_signature = hmac_of(self.algo, &server_key, &self.auth_message);

        if server_signature.ct_eq(&verifier).into() {
            self.state = ScramState::Success;
            true
        } else {
            self.state = ScramState::VerifyFailure;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RFC 5802 §5 SCRAM-SHA-1 worked example.
    #[test]
    fn rfc5802_sha1_vector() {
        let mut ctx = ScramContext::new(ScramAlgorithm::Sha1, "user", "pencil");
        ctx.client_nonce = b"fyko+d2lbbFgONRv9qkxdawL".to_vec();
        ctx.client_first_bare = b"n=user,r=fyko+d2lbbFgONRv9qkxdawL".to_vec();
        ctx.state = ScramState::ClientFirst;

        let server_first = b"r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096";
        let client_final = ctx.server_first(server_first);
        assert_eq!(ctx.state, ScramState::ClientFinal);
        assert_eq!(
            String::from_utf8(client_final).unwrap(),
            "c=biws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,\
             p=v0X8v3Bz2T0CJGbJQyF0X+HI4Ts="
        );

        let server_final = b"v=rmF9pqV8S7suAoZWja4dJRkFsKQ=";
        assert!(ctx.server_final(server_final));
        assert_eq!(ctx.state, ScramState::Success);
    }

    #[test]
    fn flipped_server_signature_fails_verification() {
        let mut ctx = ScramContext::new(ScramAlgorithm::Sha1, "user", "pencil");
        ctx.client_nonce = b"fyko+d2lbbFgONRv9qkxdawL".to_vec();
        ctx.client_first_bare = b"n=user,r=fyko+d2lbbFgONRv9qkxdawL".to_vec();
        let server_first = b"r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096";
        ctx.server_first(server_first);

        // Flip one bit of the real server signature's base64.
        assert!(!ctx.server_final(b"v=rmF9pqV8S7suAoZWja4dJRkFsKR="));
        assert_eq!(ctx.state, ScramState::VerifyFailure);
    }

    #[test]
    fn nonce_must_extend_client_nonce() {
        let mut ctx = ScramContext::new(ScramAlgorithm::Sha256, "user", "pw");
        ctx.client_nonce = b"abc".to_vec();
        ctx.client_first_bare = b"n=user,r=abc".to_vec();
        ctx.server_first(b"r=abc,s=AAAA,i=1");
        assert_eq!(ctx.error, Some(ScramError::NonceUnacceptable));
    }

    #[test]
    fn server_error_code_is_classified() {
        let mut ctx = ScramContext::new(ScramAlgorithm::Sha256, "user", "pw");
        ctx.client_nonce = b"abc".to_vec();
        ctx.server_first(b"e=unknown-user");
        assert_eq!(ctx.error, Some(ScramError::UnknownUser));

        let mut ctx2 = ScramContext::new(ScramAlgorithm::Sha256, "user", "pw");
        ctx2.client_nonce = b"abc".to_vec();
        ctx2.server_first(b"e=something-weird");
        assert_eq!(ctx2.error, Some(ScramError::Other));
    }
}
