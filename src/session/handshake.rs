//! The CAP / STS / Resume / SASL state machine (spec §4.2, §4.3).
//!
//! Owned entirely by the engine task; driven by feeding it every line the
//! engine reads and asking what to do next. Matches spec §9's note on
//! replacing the original's coroutine dance with explicit state plus
//! message passing: there is no `await` inside this module at all, only
//! `Effect`s the engine performs.

use std::collections::{HashMap, HashSet, VecDeque};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::HandshakeError;
use crate::ircv3::{self, ResumePolicy, StsAdvertisement, StsPolicy, BUILTIN_CAPS, SASL_CAP};
use crate::line::Line;
use crate::numerics;
use crate::sasl::{SaslAction, SaslEngine};
use crate::session::params::ConnectionParams;
use crate::transport::TlsMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    None,
    LsPending,
    ReqPending,
    Sasl,
    EndSent,
    Registered,
}

/// Something the engine should do in response to feeding the driver a line.
pub enum Effect {
    None,
    /// Send these lines, in order.
    Send(Vec<Line>),
    /// These capability names were ACKed; add them to the agreed set.
    CapsAgreed(Vec<String>),
    /// Server requested an STS upgrade: reconnect to `port` with TLS.
    RequestStsReconnect { port: u16 },
    /// Persist this policy via the `sts_policy` callback.
    StsPolicy(StsPolicy),
    /// Persist this policy via the `resume_policy` callback.
    ResumePolicy(ResumePolicy),
    /// Registration is cancelled (resume success path).
    HandshakeCancelled(HandshakeError),
    /// Apply each in order.
    Multi(Vec<Effect>),
}

/// Reassembles `AUTHENTICATE` chunks (spec §4.3): payloads longer than 400
/// bytes are split across lines; an exact-400 final chunk is followed by a
/// bare `+`.
#[derive(Default)]
struct AuthenticateBuffer {
    pieces: Vec<String>,
}

impl AuthenticateBuffer {
    /// Feed one `AUTHENTICATE <token>` param. Returns the decoded payload
    /// once the message is complete.
    fn feed(&mut self, token: &str) -> Option<Vec<u8>> {
        if token == "+" {
            if self.pieces.is_empty() {
                return Some(Vec::new());
            }
            let joined = self.pieces.join("");
            self.pieces.clear();
            return Some(BASE64.decode(joined).unwrap_or_default());
        }

        self.pieces.push(token.to_string());
        if token.len() < 400 {
            let joined = self.pieces.join("");
            self.pieces.clear();
            Some(BASE64.decode(joined).unwrap_or_default())
        } else {
            None
        }
    }
}

pub struct HandshakeDriver {
    state: State,
    outstanding_req: HashSet<String>,
    advertised: HashSet<String>,
    ls_values: HashMap<String, String>,
    sasl: Option<SaslEngine>,
    sasl_auth_buffer: AuthenticateBuffer,
    alt_nicknames: VecDeque<String>,
    /// The token from a previous session's `ResumePolicy`, if any; sent as
    /// `RESUME <token>` once `draft/resume-0.5` is ACKed (spec §4.2
    /// "Resume subroutine"). Cleared once sent so it fires at most once.
    previous_resume_token: Option<String>,
}

impl HandshakeDriver {
    pub fn new(params: &ConnectionParams) -> HandshakeDriver {
        HandshakeDriver {
            state: State::None,
            outstanding_req: HashSet::new(),
            advertised: HashSet::new(),
            ls_values: HashMap::new(),
            sasl: None,
            sasl_auth_buffer: AuthenticateBuffer::default(),
            alt_nicknames: params.alt_nicknames.iter().cloned().collect(),
            previous_resume_token: params.resume.as_ref().map(|policy| policy.token.clone()),
        }
    }

    /// The initial handshake sends, enqueued before the read loop consumes
    /// any line (spec §4.1, §5).
    pub fn start(&mut self, params: &ConnectionParams) -> Vec<Line> {
        self.state = State::LsPending;
        let mut lines = Vec::new();
        if let Some(password) = &params.password {
            lines.push(Line::build("PASS", [password.clone()]));
        }
        lines.push(Line::build("CAP", ["LS".to_string(), "302".to_string()]));
        lines.push(Line::build("NICK", [params.nickname.clone()]));
        lines.push(Line::build(
            "USER",
            [
                params.username_or_nick().to_string(),
                "0".to_string(),
                "*".to_string(),
                params.realname_or_nick().to_string(),
            ],
        ));
        lines
    }

    pub fn is_registered(&self) -> bool {
        self.state == State::Registered
    }

    /// Try the next alt nickname on `ERR_NICKNAMEINUSE`/`ERR_ERRONEUSNICKNAME`
    /// before registration; `None` means alternatives are exhausted.
    pub fn next_alt_nickname(&mut self) -> Option<String> {
        self.alt_nicknames.pop_front()
    }

    pub fn on_line(&mut self, line: &Line, params: &mut ConnectionParams) -> Effect {
        match line.command.as_str() {
            "CAP" => self.on_cap(line, params),
            "AUTHENTICATE" => self.on_authenticate(line),
            "RESUME" => self.on_resume(line, params),
            c if c == numerics::RPL_SASLSUCCESS => self.on_sasl_numeric(|e| e.success()),
            c if c == numerics::ERR_SASLFAIL => self.on_sasl_numeric(|e| e.fail()),
            c if c == numerics::ERR_SASLABORTED => self.on_sasl_numeric(|e| e.aborted()),
            c if c == numerics::ERR_SASLALREADY => self.on_sasl_numeric(|e| e.already()),
            c if c == numerics::RPL_SASLMECHS => {
                if let (Some(engine), Some(mechs)) = (self.sasl.as_mut(), line.params.get(1)) {
                    let mechs: Vec<String> = mechs.split(',').map(str::to_string).collect();
                    engine.mechs(&mechs);
                }
                Effect::None
            }
            c if c == numerics::RPL_WELCOME => {
                self.state = State::Registered;
                Effect::None
            }
            "FAIL" => {
                // `FAIL RESUME <code> :msg`: our resume attempt failed, but
                // normal registration was already running in parallel
                // (spec §9 Open Questions has no special handling here).
                Effect::None
            }
            _ => Effect::None,
        }
    }

    fn on_cap(&mut self, line: &Line, params: &mut ConnectionParams) -> Effect {
        let Some(sub) = line.params.get(1).map(|s| s.to_ascii_uppercase()) else {
            return Effect::None;
        };
        match sub.as_str() {
            "LS" => self.on_cap_ls(line, params),
            "ACK" => self.on_cap_ack_or_nak(line, params, true),
            "NAK" => self.on_cap_ack_or_nak(line, params, false),
            "NEW" => self.on_cap_new(line),
            _ => Effect::None,
        }
    }

    fn on_cap_ls(&mut self, line: &Line, params: &mut ConnectionParams) -> Effect {
        // `CAP * LS * :tok tok` (more follows) vs `CAP * LS :tok tok` (final batch).
        let (continues, tokens) = match line.params.get(2).map(String::as_str) {
            Some("*") => (true, line.params.get(3)),
            _ => (false, line.params.get(2)),
        };
        if let Some(tokens) = tokens {
            for token in tokens.split_whitespace() {
                let (name, value) = ircv3::parse_ls_token(token);
                self.advertised.insert(name.clone());
                if let Some(value) = value {
                    self.ls_values.insert(name, value);
                }
            }
        }
        if continues {
            return Effect::None;
        }
        self.finish_ls(params)
    }

    fn finish_ls(&mut self, params: &mut ConnectionParams) -> Effect {
        if let Some(sts_value) = self
            .ls_values
            .get("sts")
            .or_else(|| self.ls_values.get("draft/sts"))
            .cloned()
        {
            let advertisement = StsAdvertisement::parse(&sts_value);
            let currently_tls = params.tls != TlsMode::None;
            if !currently_tls {
                if let Some(port) = advertisement.port {
                    return Effect::RequestStsReconnect { port };
                }
            } else if let Some(duration) = advertisement.duration_seconds {
                let policy = StsPolicy::new(
                    now_unix(),
                    advertisement.port.unwrap_or(params.port),
                    duration,
                    advertisement.preload,
                );
                return Effect::StsPolicy(policy);
            }
        }

        let mut names = HashSet::new();
        for cap in BUILTIN_CAPS {
            if let Some(name) = cap.available(&self.advertised) {
                names.insert(name.to_string());
            }
        }
        for extra in &params.desired_caps {
            if self.advertised.contains(extra) {
                names.insert(extra.clone());
            }
        }
        if params.sasl.is_some() {
            if let Some(name) = SASL_CAP.available(&self.advertised) {
                names.insert(name.to_string());
            }
        }

        if names.is_empty() {
            return self.after_req_resolved(params);
        }

        self.state = State::ReqPending;
        self.outstanding_req = names.clone();
        let mut ordered: Vec<&str> = names.iter().map(String::as_str).collect();
        ordered.sort();
        Effect::Send(vec![Line::build("CAP", ["REQ".to_string(), ordered.join(" ")])])
    }

    fn on_cap_ack_or_nak(&mut self, line: &Line, params: &mut ConnectionParams, ack: bool) -> Effect {
        let Some(names) = line.params.get(2) else {
            return Effect::None;
        };
        let mut agreed = Vec::new();
        for name in names.split_whitespace() {
            self.outstanding_req.remove(name);
            if ack {
                agreed.push(name.to_string());
            }
        }

        let resume_cap_acked = agreed.iter().any(|name| BUILTIN_CAPS.iter().any(|cap| cap.alias == "resume" && cap.matches(name)));

        let mut effects = Vec::new();
        if !agreed.is_empty() {
            effects.push(Effect::CapsAgreed(agreed));
        }
        if resume_cap_acked {
            if let Some(token) = self.previous_resume_token.take() {
                effects.push(Effect::Send(vec![Line::build("RESUME", [token])]));
            }
        }
        if self.state == State::ReqPending && self.outstanding_req.is_empty() {
            effects.push(self.after_req_resolved(params));
        }
        Effect::Multi(effects)
    }

    fn on_cap_new(&mut self, line: &Line) -> Effect {
        if let Some(tokens) = line.params.get(2) {
            for token in tokens.split_whitespace() {
                let (name, _) = ircv3::parse_ls_token(token);
                self.advertised.insert(name);
            }
        }
        Effect::None
    }

    fn on_authenticate(&mut self, line: &Line) -> Effect {
        let Some(token) = line.params.first() else {
            return Effect::None;
        };
        let is_bare_plus = token == "+";
        let Some(payload) = self.sasl_auth_buffer.feed(token) else {
            return Effect::None;
        };
        let Some(engine) = self.sasl.as_mut() else {
            return Effect::None;
        };
        let action = if payload.is_empty() && is_bare_plus {
            engine.authenticate_plus()
        } else {
            engine.scram_payload(&payload)
        };
        self.apply_sasl_action(action)
    }

    fn on_sasl_numeric(&mut self, f: impl FnOnce(&mut SaslEngine) -> SaslAction) -> Effect {
        let Some(engine) = self.sasl.as_mut() else {
            return Effect::None;
        };
        let action = f(engine);
        self.apply_sasl_action(action)
    }

    fn apply_sasl_action(&mut self, action: SaslAction) -> Effect {
        match action {
            SaslAction::SendMechanism(name) => Effect::Send(vec![Line::build("AUTHENTICATE", [name])]),
            SaslAction::SendAuth(payload) => {
                let encoded = BASE64.encode(&payload);
                let lines = crate::sasl::chunk_authenticate(encoded.as_bytes())
                    .into_iter()
                    .map(|chunk| Line::build("AUTHENTICATE", [String::from_utf8_lossy(&chunk).into_owned()]))
                    .collect();
                Effect::Send(lines)
            }
            SaslAction::Wait => Effect::None,
            SaslAction::Done(_) => {
                self.state = State::EndSent;
                Effect::Send(vec![Line::build("CAP", ["END".to_string()])])
            }
        }
    }

    fn on_resume(&mut self, line: &Line, params: &mut ConnectionParams) -> Effect {
        match line.params.first().map(String::as_str) {
            Some("TOKEN") => {
                if let Some(token) = line.params.get(1) {
                    let policy = ResumePolicy::new(params.host.clone(), token.clone());
                    params.resume = Some(policy.clone());
                    return Effect::ResumePolicy(policy);
                }
                Effect::None
            }
            Some("SUCCESS") => Effect::HandshakeCancelled(HandshakeError::Cancelled),
            _ => Effect::None,
        }
    }

    /// Called once the outstanding REQ set empties: gate on SASL, then end.
    fn after_req_resolved(&mut self, params: &mut ConnectionParams) -> Effect {
        if let Some(sasl_params) = params.sasl.clone() {
            let server_mechs = self
                .ls_values
                .get("sasl")
                .map(|v| v.split(',').map(str::to_string).collect::<Vec<_>>());
            match SaslEngine::new(sasl_params, server_mechs.as_deref()) {
                Ok(mut engine) => {
                    self.state = State::Sasl;
                    let action = engine.start();
                    self.sasl = Some(engine);
                    return self.apply_sasl_action(action);
                }
                Err(_) => {
                    self.state = State::EndSent;
                    return Effect::Send(vec![Line::build("CAP", ["END".to_string()])]);
                }
            }
        }
        self.state = State::EndSent;
        Effect::Send(vec![Line::build("CAP", ["END".to_string()])])
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sasl::SaslParams;

    fn params() -> ConnectionParams {
        ConnectionParams::new("alice", "irc.example", 6667)
    }

    #[test]
    fn start_enqueues_cap_ls_nick_user() {
        let mut driver = HandshakeDriver::new(&params());
        let lines = driver.start(&params());
        assert_eq!(lines[0].command, "CAP");
        assert_eq!(lines[1].command, "NICK");
        assert_eq!(lines[2].command, "USER");
    }

    #[test]
    fn ls_completion_requests_builtin_caps() {
        let mut p = params();
        let mut driver = HandshakeDriver::new(&p);
        driver.start(&p);
        let line = Line::parse(":srv CAP * LS :multi-prefix echo-message").unwrap();
        match driver.on_cap(&line, &mut p) {
            Effect::Send(lines) => {
                assert_eq!(lines.len(), 1);
                assert_eq!(lines[0].command, "CAP");
                assert_eq!(lines[0].params[0], "REQ");
                assert!(lines[0].params[1].contains("multi-prefix"));
            }
            _ => panic!("expected a CAP REQ"),
        }
    }

    #[test]
    fn ack_of_last_outstanding_cap_triggers_cap_end_without_sasl() {
        let mut p = params();
        let mut driver = HandshakeDriver::new(&p);
        driver.start(&p);
        driver.on_cap(&Line::parse(":srv CAP * LS :echo-message").unwrap(), &mut p);
        let effect = driver.on_cap(&Line::parse(":srv CAP alice ACK :echo-message").unwrap(), &mut p);
        match effect {
            Effect::Multi(effects) => {
                let sent_end = effects.iter().any(|e| matches!(e, Effect::Send(lines) if lines.iter().any(|l| l.command == "CAP" && l.params == ["END"])));
                assert!(sent_end);
            }
            _ => panic!("expected Multi"),
        }
    }

    #[test]
    fn sasl_gate_starts_after_ack_when_sasl_requested() {
        let mut p = params();
        p.sasl = Some(SaslParams::UserPass {
            username: "bob".into(),
            password: "pw".into(),
        });
        let mut driver = HandshakeDriver::new(&p);
        driver.start(&p);
        driver.on_cap(&Line::parse(":srv CAP * LS :sasl=PLAIN").unwrap(), &mut p);
        let effect = driver.on_cap(&Line::parse(":srv CAP alice ACK :sasl").unwrap(), &mut p);
        match effect {
            Effect::Multi(effects) => {
                let sends_authenticate = effects.iter().any(|e| matches!(e, Effect::Send(lines) if lines.iter().any(|l| l.command == "AUTHENTICATE")));
                assert!(sends_authenticate);
            }
            _ => panic!("expected Multi"),
        }
    }

    #[test]
    fn sts_upgrade_requested_when_not_tls() {
        let mut p = params();
        let mut driver = HandshakeDriver::new(&p);
        driver.start(&p);
        let effect = driver.on_cap(&Line::parse(":srv CAP * LS :sts=port=6697,duration=3600").unwrap(), &mut p);
        assert!(matches!(effect, Effect::RequestStsReconnect { port: 6697 }));
    }

    #[test]
    fn authenticate_buffer_reassembles_across_400_byte_chunks() {
        let mut buffer = AuthenticateBuffer::default();
        let payload = vec![b'x'; 850];
        let encoded = BASE64.encode(&payload);
        let chunks: Vec<&str> = encoded.as_bytes().chunks(400).map(|c| std::str::from_utf8(c).unwrap()).collect();
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(buffer.feed(chunk).is_none());
        }
        let result = buffer.feed(chunks[chunks.len() - 1]).expect("final short chunk completes the message");
        assert_eq!(result, payload);
    }

    #[test]
    fn authenticate_buffer_handles_bare_plus_for_empty_payload() {
        let mut buffer = AuthenticateBuffer::default();
        assert_eq!(buffer.feed("+"), Some(Vec::new()));
    }
}
