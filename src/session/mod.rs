//! The session engine: one IRC connection's read/send loops, public API,
//! and handshake state machine (spec §4.1).

mod engine;
mod handshake;
pub mod params;
mod send;
mod who;

pub use params::ConnectionParams;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Notify};

use crate::casefold::CaseMapping;
use crate::defaults::WAIT_TIMEOUT;
use crate::error::{Error, ProtocolError, WaitForError};
use crate::ircv3::{ResumePolicy, StsPolicy};
use crate::line::{Hostmask, Line};
use crate::matching::{MatchContext, Matcher};
use crate::timeout::WithTimeout;
use crate::transport::Transport;

/// Send priority (spec §3 `SentLine`): ascending numeric value sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    High = 0,
    Medium = 10,
    Low = 20,
}

impl Default for Priority {
    fn default() -> Priority {
        Priority::Medium
    }
}

/// A line that has been physically written, as handed back to callers of
/// `send`/`wait_for(..., after)` (spec §3 `SentLine`).
#[derive(Debug, Clone)]
pub struct SentLine {
    pub id: u64,
    pub label: Option<String>,
    pub line: Line,
}

/// User-overridable callbacks (spec §4.1, §6). All methods have a no-op
/// default; override only the ones you need.
pub trait SessionCallbacks: Send + Sync {
    fn line_preread(&self, _line: &Line) {}
    fn line_presend(&self, _line: &Line) {}
    fn line_read(&self, _line: &Line) {}
    fn line_send(&self, _line: &Line) {}
    fn sts_policy(&self, _policy: &StsPolicy) {}
    fn resume_policy(&self, _policy: &ResumePolicy) {}
}

/// The callback set used when the caller doesn't supply one.
pub struct NoopCallbacks;
impl SessionCallbacks for NoopCallbacks {}

/// The subset of session state needed to evaluate matchers and build
/// self-echoes, published by the engine task so the public handle and the
/// send task can both read it without locking.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub nickname: String,
    pub username: Option<String>,
    pub hostname: Option<String>,
    pub casemapping: CaseMapping,
    pub agreed_caps: HashSet<String>,
    pub available_caps: HashSet<String>,
    pub label_tag: Option<&'static str>,
    pub registered: bool,
    pub disconnected: bool,
}

impl SessionSnapshot {
    pub fn self_hostmask(&self) -> Hostmask {
        Hostmask {
            nickname: self.nickname.clone(),
            username: self.username.clone(),
            hostname: self.hostname.clone(),
        }
    }
}

/// A snapshot-backed [`MatchContext`], built fresh for each matcher
/// evaluation (the snapshot itself is cheap to clone/borrow).
pub struct SnapshotContext<'a>(pub &'a SessionSnapshot);

impl MatchContext for SnapshotContext<'_> {
    fn casefold(&self, s: &str) -> String {
        self.0.casemapping.casefold(s)
    }

    fn self_nickname(&self) -> &str {
        &self.0.nickname
    }

    fn self_hostmask(&self) -> Hostmask {
        self.0.self_hostmask()
    }
}

pub(crate) struct QueuedLine {
    pub seq: u64,
    pub priority: Priority,
    pub line: Line,
    pub reply: oneshot::Sender<SentLine>,
}

pub(crate) enum SendCommand {
    Enqueue(QueuedLine),
    SetThrottle { rate_limit: u32, period: Duration },
}

pub(crate) struct WaitForRegistration {
    pub matcher: Matcher,
    pub label: Option<String>,
    pub reply: oneshot::Sender<Line>,
}

pub(crate) enum ReadCommand {
    RegisterWaitFor(WaitForRegistration),
}

/// What the transport read loop or the send loop's self-echo synthesis
/// feeds into the engine's line-processing pipeline.
pub(crate) enum Incoming {
    Wire(String),
    SelfEcho(Line),
}

/// A handle to a running session. Cheap to clone; every clone talks to the
/// same background engine and send tasks.
#[derive(Clone)]
pub struct Session {
    to_read: mpsc::UnboundedSender<ReadCommand>,
    to_send: mpsc::UnboundedSender<SendCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
    shutdown: Arc<Notify>,
    next_seq: Arc<AtomicU64>,
}

impl Session {
    /// Apply STS/resume transmutations to `params`, open the transport,
    /// and kick off the handshake. Spawns the read (engine) and send
    /// tasks; returns once both are running.
    pub async fn connect(
        mut params: ConnectionParams,
        callbacks: Arc<dyn SessionCallbacks>,
    ) -> Result<Session, Error> {
        params.apply_sts(now_unix());
        let transport = crate::transport::connect(
            params.effective_host(),
            params.port,
            &params.tls,
            params.bindhost,
            crate::defaults::CONNECT_TIMEOUT,
        )
        .await?;

        Self::connect_with_transport(transport, params, callbacks).await
    }

    /// As [`Session::connect`], but over an already-established transport
    /// (e.g. one a supervisor opened itself to reuse a happy-eyeballs
    /// result, or a test double).
    pub async fn connect_with_transport(
        transport: Transport,
        params: ConnectionParams,
        callbacks: Arc<dyn SessionCallbacks>,
    ) -> Result<Session, Error> {
        let (reader, writer) = tokio::io::split(transport);

        let (to_read, read_rx) = mpsc::unbounded_channel();
        let (to_send, send_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let shutdown = Arc::new(Notify::new());
        let next_seq = Arc::new(AtomicU64::new(0));

        send::spawn(
            writer,
            send_rx,
            incoming_tx.clone(),
            snapshot_rx.clone(),
            callbacks.clone(),
            shutdown.clone(),
        );

        engine::spawn(
            reader,
            read_rx,
            incoming_rx,
            incoming_tx,
            to_send.clone(),
            snapshot_tx,
            params,
            callbacks,
            shutdown.clone(),
        );

        Ok(Session {
            to_read,
            to_send,
            snapshot: snapshot_rx,
            shutdown,
            next_seq,
        })
    }

    /// Close the transport and cancel all outstanding work. Idempotent.
    pub fn disconnect(&self) {
        self.shutdown.notify_waiters();
    }

    fn allocate_id(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Enqueue `line` for transmission, attaching a `label`/`draft/label`
    /// tag if `labeled-response` is agreed. Resolves once physically sent.
    pub async fn send(&self, line: Line, priority: Priority) -> Result<SentLine, Error> {
        let id = self.allocate_id();
        let label_tag = self.snapshot.borrow().label_tag;
        let mut line = line;
        let label = label_tag.map(|tag| {
            let value = id.to_string();
            line = line.clone().with_tag(tag, Some(value.clone()));
            value
        });

        let (reply, rx) = oneshot::channel();
        self.to_send
            .send(SendCommand::Enqueue(QueuedLine {
                seq: id,
                priority,
                line,
                reply,
            }))
            .map_err(|_| Error::Protocol(ProtocolError::ServerDisconnected))?;

        rx.await.map_err(|_| Error::Protocol(ProtocolError::ServerDisconnected))
    }

    /// Tokenize `text` and `send` it.
    pub async fn send_raw(&self, text: &str, priority: Priority) -> Result<SentLine, Error> {
        let line = crate::line::tokenize(text).map_err(Error::Protocol)?;
        self.send(line, priority).await
    }

    /// Suspend until a line matching `matcher` arrives, or `after`'s label
    /// (if any) is observed on an incoming line. Times out after
    /// [`WAIT_TIMEOUT`].
    pub async fn wait_for(&self, matcher: Matcher, after: Option<&SentLine>) -> Result<Line, Error> {
        let label = after.and_then(|sent| sent.label.clone());
        let (reply, rx) = oneshot::channel();
        self.to_read
            .send(ReadCommand::RegisterWaitFor(WaitForRegistration { matcher, label, reply }))
            .map_err(|_| Error::Protocol(ProtocolError::ServerDisconnected))?;

        match rx.with_timeout(WAIT_TIMEOUT).await {
            Ok(Ok(line)) => Ok(line),
            Ok(Err(_)) => Err(Error::WaitFor(WaitForError::CancelledByDisconnect)),
            Err(_) => Err(Error::WaitFor(WaitForError::Timeout)),
        }
    }

    pub fn set_throttle(&self, rate_limit: u32, period: Duration) {
        let _ = self.to_send.send(SendCommand::SetThrottle { rate_limit, period });
    }

    pub fn cap_agreed(&self, name: &str) -> bool {
        self.snapshot.borrow().agreed_caps.contains(name)
    }

    pub fn cap_available(&self, name: &str) -> bool {
        self.snapshot.borrow().available_caps.contains(name)
    }

    pub fn is_registered(&self) -> bool {
        self.snapshot.borrow().registered
    }

    pub fn is_disconnected(&self) -> bool {
        self.snapshot.borrow().disconnected
    }

    pub fn nickname(&self) -> String {
        self.snapshot.borrow().nickname.clone()
    }

    /// Whether a SASL mechanism attempt was initiated for this session:
    /// true once `sasl` is agreed and `ConnectionParams::sasl` was set,
    /// regardless of the attempt's eventual outcome (spec §4.1 `sasl_auth`).
    pub fn sasl_auth_attempted(&self) -> bool {
        self.snapshot.borrow().agreed_caps.contains("sasl")
    }

    pub async fn send_nick(&self, nickname: &str) -> Result<SentLine, Error> {
        self.send(Line::build("NICK", [nickname.to_string()]), Priority::Medium).await
    }

    pub async fn send_join(&self, channels: &[String]) -> Result<SentLine, Error> {
        self.send(Line::build("JOIN", [channels.join(",")]), Priority::Medium).await
    }

    pub async fn send_part(&self, channel: &str, message: Option<&str>) -> Result<SentLine, Error> {
        let mut params = vec![channel.to_string()];
        if let Some(message) = message {
            params.push(message.to_string());
        }
        self.send(Line::build("PART", params), Priority::Medium).await
    }

    pub async fn send_message(&self, target: &str, text: &str) -> Result<SentLine, Error> {
        self.send(
            Line::build("PRIVMSG", [target.to_string(), text.to_string()]),
            Priority::Medium,
        )
        .await
    }

    /// Send `WHOIS <nick>` and accumulate the multi-line reply, honoring a
    /// bound label if `labeled-response` is agreed.
    pub async fn send_whois(&self, nick: &str) -> Result<crate::whois::Whois, Error> {
        use crate::numerics;

        let sent = self
            .send(Line::build("WHOIS", [nick.to_string()]), Priority::Medium)
            .await?;

        let mut whois = crate::whois::Whois::new(nick);
        loop {
            let line = self
                .wait_for(
                    Matcher::commands([
                        numerics::RPL_WHOISUSER,
                        numerics::RPL_WHOISSERVER,
                        numerics::RPL_WHOISOPERATOR,
                        numerics::RPL_WHOISIDLE,
                        numerics::RPL_WHOISCHANNELS,
                        numerics::RPL_WHOISACCOUNT,
                        numerics::RPL_WHOISSECURE,
                        numerics::RPL_ENDOFWHOIS,
                        numerics::ERR_NOSUCHNICK,
                        numerics::ERR_NOSUCHSERVER,
                    ]),
                    Some(&sent),
                )
                .await?;

            match whois.apply(&line) {
                crate::whois::WhoisStep::Done | crate::whois::WhoisStep::Ignored => return Ok(whois),
                crate::whois::WhoisStep::NotFound => return Ok(whois),
                crate::whois::WhoisStep::InProgress => continue,
            }
        }
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
