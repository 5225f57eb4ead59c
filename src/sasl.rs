//! SASL mechanism engine: EXTERNAL, PLAIN, and SCRAM-SHA-* over
//! `AUTHENTICATE`, with 400-byte chunking.
//!
//! Ported from `examples/original_source/ircrobots/sasl.py`; see spec.md §4.3.

use thiserror::Error;

use crate::scram::{ScramAlgorithm, ScramContext, ScramError, ScramState};

/// The order in which `USERPASS` mechanisms are attempted (spec §4.3).
const USERPASS_ORDER: &[ScramAlgorithm] = &[
    ScramAlgorithm::Sha512,
    ScramAlgorithm::Sha256,
    ScramAlgorithm::Sha1,
];

/// Parameters describing how a session should authenticate.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum SaslParams {
    External,
    UserPass { username: String, password: String },
    Scram { username: String, password: String },
}

/// The outcome of a SASL attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslResult {
    None,
    Success,
    Failure,
    Already,
}

#[derive(Debug, Error)]
pub enum SaslError {
    #[error("unknown SASL mechanism: {0}")]
    UnknownMechanism(String),
    #[error("no SASL mechanism in common with the server")]
    NoCommonMechanism,
    #[error("SASL authentication failed")]
    Failure,
    #[error("SASL authentication was aborted")]
    Aborted,
}

/// One candidate mechanism in priority order: either a plain mechanism name
/// (`EXTERNAL`, `PLAIN`) or a SCRAM algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mechanism {
    External,
    Plain,
    Scram(ScramAlgorithm),
}

impl Mechanism {
    fn name(&self) -> String {
        match self {
            Mechanism::External => "EXTERNAL".to_string(),
            Mechanism::Plain => "PLAIN".to_string(),
            Mechanism::Scram(a) => a.mechanism_name().to_string(),
        }
    }

    fn parse(name: &str) -> Option<Mechanism> {
        match name.to_ascii_uppercase().as_str() {
            "EXTERNAL" => Some(Mechanism::External),
            "PLAIN" => Some(Mechanism::Plain),
            "SCRAM-SHA-1" => Some(Mechanism::Scram(ScramAlgorithm::Sha1)),
            "SCRAM-SHA-224" => Some(Mechanism::Scram(ScramAlgorithm::Sha224)),
            "SCRAM-SHA-256" => Some(Mechanism::Scram(ScramAlgorithm::Sha256)),
            "SCRAM-SHA-384" => Some(Mechanism::Scram(ScramAlgorithm::Sha384)),
            "SCRAM-SHA-512" => Some(Mechanism::Scram(ScramAlgorithm::Sha512)),
            _ => None,
        }
    }
}

fn candidate_list(params: &SaslParams) -> Vec<Mechanism> {
    match params {
        SaslParams::External => vec![Mechanism::External],
        SaslParams::UserPass { .. } => {
            let mut out: Vec<Mechanism> = USERPASS_ORDER.iter().map(|a| Mechanism::Scram(*a)).collect();
            out.push(Mechanism::Plain);
            out
        }
        SaslParams::Scram { .. } => USERPASS_ORDER.iter().map(|a| Mechanism::Scram(*a)).collect(),
    }
}

/// Intersect our priority-ordered candidate list with the server's
/// `sasl=` CAP value, preserving our priority (spec §4.3, CAP v3.2 case).
fn intersect_preserving_priority(ours: &[Mechanism], server_offered: &[String]) -> Vec<Mechanism> {
    let offered: Vec<Mechanism> = server_offered.iter().filter_map(|s| Mechanism::parse(s)).collect();
    ours.iter().filter(|m| offered.contains(m)).copied().collect()
}

/// Split `payload` into <=400-byte chunks for `AUTHENTICATE`, appending a
/// trailing `+` if the last chunk is exactly 400 bytes (spec §4.3).
pub fn chunk_authenticate(payload: &[u8]) -> Vec<Vec<u8>> {
    if payload.is_empty() {
        return vec![b"+".to_vec()];
    }
    let mut chunks: Vec<Vec<u8>> = payload.chunks(400).map(|c| c.to_vec()).collect();
    if chunks.last().map(|c| c.len()) == Some(400) {
        chunks.push(Vec::new());
    }
    chunks
        .into_iter()
        .map(|c| if c.is_empty() { b"+".to_vec() } else { c })
        .collect()
}

/// Drives one SASL attempt across however many mechanisms are needed.
/// The session engine feeds it server responses and asks it what to send
/// next; see `session::handshake` for the wiring against `AUTHENTICATE`.
pub struct SaslEngine {
    candidates: Vec<Mechanism>,
    current: Option<Mechanism>,
    params: SaslParams,
    scram: Option<ScramContext>,
}

/// What the caller should do next after feeding the engine a server event.
pub enum SaslAction {
    /// Send `AUTHENTICATE <mechanism>` for the next candidate.
    SendMechanism(String),
    /// Send the given bytes to `AUTHENTICATE`, chunked by the caller.
    SendAuth(Vec<u8>),
    /// Nothing to send; wait for the server's next message (e.g. `903`/`904`
    /// after the SCRAM `client-final-message` has been verified locally).
    Wait,
    /// The attempt is over.
    Done(Result<SaslResult, SaslError>),
}

impl SaslEngine {
    /// `server_mechs`: the `sasl=` CAP v3.2 value, if present (spec §4.3).
    pub fn new(params: SaslParams, server_mechs: Option<&[String]>) -> Result<SaslEngine, SaslError> {
        let ours = candidate_list(&params);
        let candidates = match server_mechs {
            Some(offered) => {
                let filtered = intersect_preserving_priority(&ours, offered);
                if filtered.is_empty() {
                    return Err(SaslError::NoCommonMechanism);
                }
                filtered
            }
            None => ours,
        };
        Ok(SaslEngine {
            candidates,
            current: None,
            params,
            scram: None,
        })
    }

    /// Begin (or resume after a `908`) by proposing the next candidate mechanism.
    pub fn start(&mut self) -> SaslAction {
        match self.candidates.first().copied() {
            Some(mech) => {
                self.current = Some(mech);
                SaslAction::SendMechanism(mech.name())
            }
            None => SaslAction::Done(Err(SaslError::NoCommonMechanism)),
        }
    }

    /// `907` ERR_SASLALREADY.
    pub fn already(&mut self) -> SaslAction {
        SaslAction::Done(Ok(SaslResult::Already))
    }

    /// `908` RPL_SASLMECHS: refine the candidate set to the server's list.
    pub fn mechs(&mut self, server_mechs: &[String]) {
        let ours = candidate_list(&self.params);
        self.candidates = intersect_preserving_priority(&ours, server_mechs);
    }

    /// `AUTHENTICATE +`: produce the auth text for the current mechanism.
    pub fn authenticate_plus(&mut self) -> SaslAction {
        let Some(mech) = self.current else {
            return SaslAction::Done(Err(SaslError::Failure));
        };
        match mech {
            // Empty payload flows through `chunk_authenticate`'s
            // empty-payload sentinel (below) to a bare `AUTHENTICATE +`,
            // not a base64-encoded `+` byte.
            Mechanism::External => SaslAction::SendAuth(Vec::new()),
            Mechanism::Plain => {
                let SaslParams::UserPass { username, password } = &self.params else {
                    return SaslAction::Done(Err(SaslError::Failure));
                };
                let mut payload = Vec::new();
                payload.extend(username.as_bytes());
                payload.push(0);
                payload.extend(username.as_bytes());
                payload.push(0);
                payload.extend(password.as_bytes());
                SaslAction::SendAuth(payload)
            }
            Mechanism::Scram(algo) => {
                let (username, password) = match &self.params {
                    SaslParams::UserPass { username, password } => (username.clone(), password.clone()),
                    SaslParams::Scram { username, password } => (username.clone(), password.clone()),
                    SaslParams::External => return SaslAction::Done(Err(SaslError::Failure)),
                };
                let mut ctx = ScramContext::new(algo, &username, &password);
                let first = ctx.client_first();
                self.scram = Some(ctx);
                SaslAction::SendAuth(first)
            }
        }
    }

    /// A non-`+` `AUTHENTICATE <data>` frame while a SCRAM mechanism is
    /// active: dispatches to `server-first` or `server-final` depending on
    /// where the exchange currently stands.
    pub fn scram_payload(&mut self, data: &[u8]) -> SaslAction {
        let Some(ctx) = self.scram.as_mut() else {
            return SaslAction::Done(Err(SaslError::Failure));
        };
        match ctx.state {
            ScramState::ClientFirst => {
                let reply = ctx.server_first(data);
                if ctx.state == ScramState::Failure {
                    self.drop_current_mechanism();
                    return self.retry_or_fail();
                }
                SaslAction::SendAuth(reply)
            }
            ScramState::ClientFinal => {
                if ctx.server_final(data) {
                    SaslAction::Wait
                } else {
                    self.drop_current_mechanism();
                    self.retry_or_fail()
                }
            }
            _ => SaslAction::Done(Err(SaslError::Failure)),
        }
    }

    /// `903` RPL_SASLSUCCESS.
    pub fn success(&mut self) -> SaslAction {
        SaslAction::Done(Ok(SaslResult::Success))
    }

    /// `904` ERR_SASLFAIL: drop the current mechanism and retry the next one.
    pub fn fail(&mut self) -> SaslAction {
        self.drop_current_mechanism();
        self.retry_or_fail()
    }

    /// `906` ERR_SASLABORTED.
    pub fn aborted(&mut self) -> SaslAction {
        SaslAction::Done(Err(SaslError::Aborted))
    }

    fn drop_current_mechanism(&mut self) {
        if let Some(current) = self.current {
            self.candidates.retain(|m| *m != current);
        }
        self.scram = None;
    }

    fn retry_or_fail(&mut self) -> SaslAction {
        if self.candidates.is_empty() {
            SaslAction::Done(Ok(SaslResult::Failure))
        } else {
            self.start()
        }
    }
}
