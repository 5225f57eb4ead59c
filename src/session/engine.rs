//! The engine ("read loop") task: owns the handshake driver, the wait-for
//! list, the WHO queue, and ping-timeout tracking. Everything here runs on
//! a single task, so none of this state needs a lock (spec §5, §9).

use std::sync::Arc;

use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::time::Instant;
use tracing::info_span;
use tracing_futures::Instrument;

use crate::casefold::CaseMapping;
use crate::defaults::{AUTOJOIN_BATCH_SIZE, PING_TIMEOUT, THROTTLE_RATE, THROTTLE_TIME};
use crate::line::Line;
use crate::matching::MatchContext;
use crate::numerics;
use crate::transport::Transport;

use super::handshake::{Effect, HandshakeDriver};
use super::params::ConnectionParams;
use super::who::WhoQueue;
use super::{
    Incoming, Priority, QueuedLine, ReadCommand, SendCommand, SessionCallbacks, SessionSnapshot,
    SnapshotContext, WaitForRegistration,
};

pub fn spawn(
    reader: ReadHalf<Transport>,
    read_rx: mpsc::UnboundedReceiver<ReadCommand>,
    incoming_rx: mpsc::UnboundedReceiver<Incoming>,
    incoming_tx: mpsc::UnboundedSender<Incoming>,
    to_send: mpsc::UnboundedSender<SendCommand>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    params: ConnectionParams,
    callbacks: Arc<dyn SessionCallbacks>,
    shutdown: Arc<Notify>,
) {
    let span = info_span!("irc_session", host = %params.host, port = params.port);
    tokio::spawn(read_pump(reader, incoming_tx, shutdown.clone()).instrument(span.clone()));
    tokio::spawn(run(read_rx, incoming_rx, to_send, snapshot_tx, params, callbacks, shutdown).instrument(span));
}

/// Reads raw bytes off the wire, splits them into lines, and forwards them.
/// Stops (dropping its sender) on EOF, a read error, or shutdown.
async fn read_pump(mut reader: ReadHalf<Transport>, incoming_tx: mpsc::UnboundedSender<Incoming>, shutdown: Arc<Notify>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = tokio::select! {
            result = reader.read(&mut chunk) => match result {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            },
            _ = shutdown.notified() => break,
        };
        buf.extend_from_slice(&chunk[..n]);
        for line in crate::line::split_lines(&mut buf) {
            if incoming_tx.send(Incoming::Wire(line)).is_err() {
                return;
            }
        }
    }
}

struct Engine {
    driver: HandshakeDriver,
    params: ConnectionParams,
    callbacks: Arc<dyn SessionCallbacks>,
    to_send: mpsc::UnboundedSender<SendCommand>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    snapshot: SessionSnapshot,
    waiters: Vec<WaitForRegistration>,
    who_queue: WhoQueue,
    internal_seq: u64,
    ping_outstanding: bool,
    shutdown: Arc<Notify>,
    /// The nickname originally requested, captured before any
    /// `ERR_NICKNAMEINUSE` fallback substitutes an alternative (spec §4.1
    /// "regain nick when observing someone else's NICK/QUIT...").
    desired_nickname: String,
    /// Category-A (list) channel modes from ISUPPORT `CHANMODES`, sent
    /// back with `+` on self-JOIN (spec §4.1 "post-JOIN actions").
    chanmodes_a: String,
    monitor_supported: bool,
    watch_supported: bool,
    motd_seen: bool,
}

impl Engine {
    fn enqueue(&mut self, line: Line, priority: Priority) {
        let (reply, _rx) = oneshot::channel();
        self.internal_seq += 1;
        let _ = self.to_send.send(SendCommand::Enqueue(QueuedLine {
            seq: self.internal_seq,
            priority,
            line,
            reply,
        }));
    }

    fn publish(&self) {
        let _ = self.snapshot_tx.send(self.snapshot.clone());
    }

    fn dispatch_effect(&mut self, effect: Effect) {
        match effect {
            Effect::None => {}
            Effect::Send(lines) => {
                for line in lines {
                    self.enqueue(line, Priority::High);
                }
            }
            Effect::CapsAgreed(names) => {
                for name in names {
                    self.snapshot.available_caps.insert(name.clone());
                    self.snapshot.agreed_caps.insert(name.clone());
                    if name == "labeled-response" || name == "draft/labeled-response-0.2" {
                        self.snapshot.label_tag = Some(if name == "labeled-response" {
                            "label"
                        } else {
                            "draft/label"
                        });
                    }
                }
                self.publish();
            }
            Effect::RequestStsReconnect { port } => {
                tracing::warn!(port, "server requested STS upgrade; disconnecting for TLS reconnect");
                self.snapshot.disconnected = true;
                self.publish();
                self.shutdown.notify_waiters();
            }
            Effect::StsPolicy(policy) => {
                self.callbacks.sts_policy(&policy);
            }
            Effect::ResumePolicy(policy) => {
                self.callbacks.resume_policy(&policy);
            }
            Effect::HandshakeCancelled(_) => {
                self.snapshot.disconnected = true;
                self.publish();
                self.shutdown.notify_waiters();
            }
            Effect::Multi(effects) => {
                for effect in effects {
                    self.dispatch_effect(effect);
                }
            }
        }
    }

    /// Check registered wait-fors in registration order; at most one
    /// resolves per line (spec §4.4 `wait_for`). A bound label that
    /// matches the line's `label`/`draft/label` tag resolves the waiter
    /// outright, bypassing the payload predicate (spec §4.2 "labeled
    /// response", §8 "Label routing").
    fn resolve_waiters(&mut self, line: &Line) -> bool {
        let ctx = SnapshotContext(&self.snapshot);
        let position = self.waiters.iter().position(|w| {
            let label_ok = match &w.label {
                Some(label) => line.tag("label") == Some(label.as_str()) || line.tag("draft/label") == Some(label.as_str()),
                None => true,
            };
            // A present, matching label bypasses the payload predicate
            // entirely; otherwise fall back to the ordinary matcher check.
            label_ok && (w.label.is_some() || w.matcher.is_match(&ctx, line))
        });
        if let Some(index) = position {
            let waiter = self.waiters.remove(index);
            let _ = waiter.reply.send(line.clone());
            true
        } else {
            false
        }
    }

    fn apply_isupport(&mut self, line: &Line) {
        for token in line.params.iter().skip(1) {
            if let Some(value) = token.strip_prefix("CASEMAPPING=") {
                self.snapshot.casemapping = CaseMapping::parse(value);
            } else if let Some(value) = token.strip_prefix("CHANMODES=") {
                if let Some(category_a) = value.split(',').next() {
                    self.chanmodes_a = category_a.to_string();
                }
            } else if token.starts_with("MONITOR=") || token == "MONITOR" {
                self.monitor_supported = true;
            } else if token.starts_with("WATCH=") || token == "WATCH" {
                self.watch_supported = true;
            }
        }
        self.publish();
    }

    /// Once MOTD ends, if we didn't get the nickname we wanted, watch for
    /// it to free up via MONITOR (preferred) or WATCH (spec §4.1, §9).
    fn start_nickname_regain_watch(&mut self) {
        self.motd_seen = true;
        let ctx = SnapshotContext(&self.snapshot);
        if ctx.casefold(&self.snapshot.nickname) == ctx.casefold(&self.desired_nickname) {
            return;
        }
        if self.monitor_supported {
            self.enqueue(Line::build("MONITOR", ["+".to_string(), self.desired_nickname.clone()]), Priority::Medium);
        } else if self.watch_supported {
            self.enqueue(Line::build("WATCH", [format!("+{}", self.desired_nickname)]), Priority::Medium);
        }
    }

    /// `nick_going_away` just changed nick, quit, or signed off; if it was
    /// our desired nickname and we don't hold it, reclaim it.
    fn try_regain_nickname(&mut self, nick_going_away: &str) {
        if !self.motd_seen {
            return;
        }
        let ctx = SnapshotContext(&self.snapshot);
        if ctx.casefold(nick_going_away) != ctx.casefold(&self.desired_nickname) {
            return;
        }
        if ctx.casefold(&self.snapshot.nickname) == ctx.casefold(&self.desired_nickname) {
            return;
        }
        self.enqueue(Line::build("NICK", [self.desired_nickname.clone()]), Priority::Medium);
    }

    fn send_autojoin_batches(&mut self) {
        let channels = self.params.autojoin.clone();
        for batch in channels.chunks(AUTOJOIN_BATCH_SIZE) {
            self.enqueue(Line::build("JOIN", [batch.join(",")]), Priority::Medium);
        }
    }

    /// The state-update half of `RPL_WELCOME` handling: confirms the
    /// registered nickname and flips `registered`, with nothing else. Run
    /// before `line_preread`/wait-for resolution (spec §4.1 step 1) so
    /// both observe `registered == true` on the very line that sets it.
    fn mark_registered(&mut self, line: &Line) {
        if let Some(confirmed_nick) = line.params.first() {
            self.params.nickname = confirmed_nick.clone();
            self.snapshot.nickname = confirmed_nick.clone();
        }
        self.snapshot.registered = true;
        self.publish();
    }

    /// The `_on_read` side effects of `RPL_WELCOME` (spec §4.1 step 4):
    /// raise the throttle, send the self-WHO, batch the autojoin list.
    fn handle_registration_complete(&mut self) {
        let _ = self.to_send.send(SendCommand::SetThrottle {
            rate_limit: THROTTLE_RATE,
            period: THROTTLE_TIME,
        });
        let nick = self.snapshot.nickname.clone();
        let folded_nick = SnapshotContext(&self.snapshot).casefold(&nick);
        if self.who_queue.push(folded_nick, nick.clone()) {
            self.enqueue(Line::build("WHO", [nick]), Priority::Medium);
        }
        self.send_autojoin_batches();
    }

    fn handle_join(&mut self, line: &Line) {
        let Some(source) = &line.source else { return };
        let ctx = SnapshotContext(&self.snapshot);
        if ctx.casefold(&source.nickname) != ctx.casefold(&self.snapshot.nickname) {
            return;
        }
        let Some(channel) = line.params.first() else { return };
        self.enqueue(Line::build("MODE", [channel.clone()]), Priority::Medium);
        if !self.chanmodes_a.is_empty() {
            self.enqueue(
                Line::build("MODE", [channel.clone(), format!("+{}", self.chanmodes_a)]),
                Priority::Medium,
            );
        }
        let folded = ctx.casefold(channel);
        if self.who_queue.push(folded, channel.clone()) {
            self.enqueue(Line::build("WHO", [channel.clone()]), Priority::Medium);
        }
    }

    fn handle_end_of_who(&mut self, line: &Line) {
        let Some(channel) = line.params.get(1) else { return };
        let folded = SnapshotContext(&self.snapshot).casefold(channel);
        if let Some(next) = self.who_queue.complete(&folded) {
            self.enqueue(Line::build("WHO", [next]), Priority::Medium);
        }
    }

    fn handle_nickname_collision(&mut self) {
        if self.driver.is_registered() {
            return;
        }
        match self.driver.next_alt_nickname() {
            Some(next) => {
                self.snapshot.nickname = next.clone();
                self.enqueue(Line::build("NICK", [next]), Priority::High);
            }
            None => {
                self.enqueue(
                    Line::build("QUIT", ["no usable nickname".to_string()]),
                    Priority::High,
                );
                self.snapshot.disconnected = true;
                self.publish();
                self.shutdown.notify_waiters();
            }
        }
    }

    fn handle_line(&mut self, mut line: Line) {
        // Spec §4.1 step 1: update session state (casemapping, registered)
        // before anything downstream observes it, so the very line that
        // sets CASEMAPPING/registered is seen post-update by line_preread
        // and by waiters evaluated against it.
        match line.command.as_str() {
            c if c == numerics::RPL_ISUPPORT => self.apply_isupport(&line),
            c if c == numerics::RPL_WELCOME => self.mark_registered(&line),
            _ => {}
        }

        self.callbacks.line_preread(&line);

        if self.resolve_waiters(&line) {
            // fallthrough: a resolved line is still processed normally below
        }

        let effect = self.driver.on_line(&line, &mut self.params);
        self.dispatch_effect(effect);

        match line.command.as_str() {
            "PING" => {
                let params: Vec<String> = line.params.drain(..).collect();
                self.enqueue(Line::build("PONG", params), Priority::High);
            }
            c if c == numerics::RPL_WELCOME => self.handle_registration_complete(),
            c if c == numerics::ERR_NICKNAMEINUSE || c == numerics::ERR_ERRONEUSNICKNAME => {
                self.handle_nickname_collision()
            }
            c if c == numerics::RPL_ENDOFMOTD || c == numerics::ERR_NOMOTD => self.start_nickname_regain_watch(),
            "JOIN" => self.handle_join(&line),
            c if c == numerics::RPL_ENDOFWHO => self.handle_end_of_who(&line),
            "NICK" => {
                if let Some(source) = &line.source {
                    self.try_regain_nickname(&source.nickname.clone());
                }
            }
            "QUIT" => {
                if let Some(source) = &line.source {
                    self.try_regain_nickname(&source.nickname.clone());
                }
            }
            c if c == numerics::RPL_LOGOFF => {
                if let Some(nick) = line.params.get(1) {
                    self.try_regain_nickname(&nick.clone());
                }
            }
            c if c == numerics::RPL_MONOFFLINE => {
                if let Some(targets) = line.params.get(2) {
                    for hostmask in targets.clone().split(',') {
                        let nick = hostmask.split(['!', '@']).next().unwrap_or(hostmask);
                        self.try_regain_nickname(nick);
                    }
                }
            }
            _ => {}
        }

        self.callbacks.line_read(&line);
    }
}

async fn run(
    mut read_rx: mpsc::UnboundedReceiver<ReadCommand>,
    mut incoming_rx: mpsc::UnboundedReceiver<Incoming>,
    to_send: mpsc::UnboundedSender<SendCommand>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    params: ConnectionParams,
    callbacks: Arc<dyn SessionCallbacks>,
    shutdown: Arc<Notify>,
) {
    let desired_nickname = params.nickname.clone();
    let mut engine = Engine {
        driver: HandshakeDriver::new(&params),
        snapshot: SessionSnapshot {
            nickname: params.nickname.clone(),
            ..SessionSnapshot::default()
        },
        params,
        callbacks,
        to_send,
        snapshot_tx,
        waiters: Vec::new(),
        who_queue: WhoQueue::new(),
        internal_seq: 0,
        ping_outstanding: false,
        shutdown: shutdown.clone(),
        desired_nickname,
        chanmodes_a: String::new(),
        monitor_supported: false,
        watch_supported: false,
        motd_seen: false,
    };
    engine.publish();

    for line in engine.driver.start(&engine.params) {
        engine.enqueue(line, Priority::High);
    }

    let mut ping_deadline = Instant::now() + PING_TIMEOUT;

    loop {
        let remaining = ping_deadline.saturating_duration_since(Instant::now());
        tokio::select! {
            _ = shutdown.notified() => {
                engine.snapshot.disconnected = true;
                engine.publish();
                break;
            }
            maybe_cmd = read_rx.recv() => {
                match maybe_cmd {
                    Some(ReadCommand::RegisterWaitFor(registration)) => engine.waiters.push(registration),
                    None => break,
                }
            }
            maybe_incoming = incoming_rx.recv() => {
                match maybe_incoming {
                    Some(Incoming::Wire(raw)) => {
                        ping_deadline = Instant::now() + PING_TIMEOUT;
                        engine.ping_outstanding = false;
                        match Line::parse(&raw) {
                            Ok(line) => engine.handle_line(line),
                            Err(_) => tracing::debug!(raw, "dropped unparseable line"),
                        }
                    }
                    Some(Incoming::SelfEcho(line)) => engine.handle_line(line),
                    None => {
                        engine.snapshot.disconnected = true;
                        engine.publish();
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(remaining) => {
                if engine.ping_outstanding {
                    engine.snapshot.disconnected = true;
                    engine.publish();
                    shutdown.notify_waiters();
                    break;
                }
                engine.ping_outstanding = true;
                ping_deadline = Instant::now() + PING_TIMEOUT;
                let nick = engine.snapshot.nickname.clone();
                engine.enqueue(Line::build("PING", [nick]), Priority::High);
            }
        }
    }

    for waiter in engine.waiters.drain(..) {
        drop(waiter.reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::NoopCallbacks;

    fn test_engine() -> Engine {
        let params = ConnectionParams::new("alice", "irc.example", 6667);
        let (to_send, _rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _snapshot_rx) = watch::channel(SessionSnapshot::default());
        Engine {
            driver: HandshakeDriver::new(&params),
            snapshot: SessionSnapshot {
                nickname: params.nickname.clone(),
                ..SessionSnapshot::default()
            },
            params,
            callbacks: Arc::new(NoopCallbacks),
            to_send,
            snapshot_tx,
            waiters: Vec::new(),
            who_queue: WhoQueue::new(),
            internal_seq: 0,
            ping_outstanding: false,
            shutdown: Arc::new(Notify::new()),
            desired_nickname: "alice".to_string(),
            chanmodes_a: String::new(),
            monitor_supported: false,
            watch_supported: false,
            motd_seen: false,
        }
    }

    #[test]
    fn isupport_updates_casemapping() {
        let mut engine = test_engine();
        let line = Line::parse(":srv 005 alice CASEMAPPING=ascii :are supported").unwrap();
        engine.apply_isupport(&line);
        assert_eq!(engine.snapshot.casemapping, CaseMapping::Ascii);
    }

    #[test]
    fn welcome_marks_registered_and_confirms_nickname() {
        let mut engine = test_engine();
        let line = Line::parse(":srv 001 alice_ :Welcome").unwrap();
        engine.mark_registered(&line);
        assert!(engine.snapshot.registered);
        assert_eq!(engine.snapshot.nickname, "alice_");
    }

    #[test]
    fn line_preread_observes_registered_flag_on_the_welcome_line_itself() {
        use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
        use std::sync::Mutex;

        struct Observer {
            seen_registered: Arc<AtomicBool>,
            seen_casemapping: Arc<Mutex<Option<CaseMapping>>>,
            snapshot: watch::Receiver<SessionSnapshot>,
        }
        impl SessionCallbacks for Observer {
            fn line_preread(&self, _line: &Line) {
                self.seen_registered
                    .store(self.snapshot.borrow().registered, AtomicOrdering::SeqCst);
                *self.seen_casemapping.lock().unwrap() = Some(self.snapshot.borrow().casemapping);
            }
        }

        let mut engine = test_engine();
        let (to_send, _rx) = mpsc::unbounded_channel();
        engine.to_send = to_send;
        let seen_registered = Arc::new(AtomicBool::new(false));
        let seen_casemapping = Arc::new(Mutex::new(None));
        engine.callbacks = Arc::new(Observer {
            seen_registered: seen_registered.clone(),
            seen_casemapping: seen_casemapping.clone(),
            snapshot: engine.snapshot_tx.subscribe(),
        });

        engine.handle_line(Line::parse(":srv 001 alice :Welcome").unwrap());
        assert!(seen_registered.load(AtomicOrdering::SeqCst), "line_preread should see registered == true on the 001 line itself");

        engine.handle_line(Line::parse(":srv 005 alice CASEMAPPING=ascii :are supported").unwrap());
        assert_eq!(*seen_casemapping.lock().unwrap(), Some(CaseMapping::Ascii));
    }

    #[test]
    fn own_join_starts_who_queue() {
        let mut engine = test_engine();
        let line = Line::parse(":alice!a@h JOIN #chan").unwrap();
        engine.handle_join(&line);
        assert_eq!(engine.who_queue.complete("#chan"), None);
    }

    #[test]
    fn self_join_sends_mode_queries_before_who() {
        let mut engine = test_engine();
        engine.chanmodes_a = "beI".to_string();
        let (to_send, mut rx) = mpsc::unbounded_channel();
        engine.to_send = to_send;
        let line = Line::parse(":alice!a@h JOIN #chan").unwrap();
        engine.handle_join(&line);

        let first = rx.try_recv().unwrap();
        match first {
            SendCommand::Enqueue(q) => assert_eq!((q.line.command.as_str(), q.line.params.as_slice()), ("MODE", ["#chan".to_string()].as_slice())),
            _ => panic!("expected enqueue"),
        }
        let second = rx.try_recv().unwrap();
        match second {
            SendCommand::Enqueue(q) => assert_eq!(q.line.params, vec!["#chan".to_string(), "+beI".to_string()]),
            _ => panic!("expected enqueue"),
        }
        let third = rx.try_recv().unwrap();
        match third {
            SendCommand::Enqueue(q) => assert_eq!(q.line.command, "WHO"),
            _ => panic!("expected WHO enqueue"),
        }
    }

    #[test]
    fn isupport_parses_chanmodes_category_a_and_monitor() {
        let mut engine = test_engine();
        let line = Line::parse(":srv 005 alice CHANMODES=beI,k,l,imnt MONITOR=100 :are supported").unwrap();
        engine.apply_isupport(&line);
        assert_eq!(engine.chanmodes_a, "beI");
        assert!(engine.monitor_supported);
    }

    #[test]
    fn motd_end_sends_monitor_when_nickname_not_desired() {
        let mut engine = test_engine();
        engine.monitor_supported = true;
        engine.snapshot.nickname = "alice_".to_string();
        let (to_send, mut rx) = mpsc::unbounded_channel();
        engine.to_send = to_send;
        engine.start_nickname_regain_watch();
        let cmd = rx.try_recv().unwrap();
        match cmd {
            SendCommand::Enqueue(q) => {
                assert_eq!(q.line.command, "MONITOR");
                assert_eq!(q.line.params, vec!["+".to_string(), "alice".to_string()]);
            }
            _ => panic!("expected enqueue"),
        }
    }

    #[test]
    fn observing_desired_nick_quit_triggers_regain() {
        let mut engine = test_engine();
        engine.motd_seen = true;
        engine.snapshot.nickname = "alice_".to_string();
        let (to_send, mut rx) = mpsc::unbounded_channel();
        engine.to_send = to_send;
        let line = Line::parse(":alice!u@h QUIT :bye").unwrap();
        engine.try_regain_nickname(&line.source.unwrap().nickname);
        let cmd = rx.try_recv().unwrap();
        match cmd {
            SendCommand::Enqueue(q) => {
                assert_eq!(q.line.command, "NICK");
                assert_eq!(q.line.params, vec!["alice".to_string()]);
            }
            _ => panic!("expected enqueue"),
        }
    }

    #[test]
    fn resolve_waiters_matches_first_registered() {
        let mut engine = test_engine();
        let (reply, rx) = oneshot::channel();
        engine.waiters.push(WaitForRegistration {
            matcher: crate::matching::Matcher::commands(["001"]),
            label: None,
            reply,
        });
        let line = Line::parse(":srv 001 alice :hi").unwrap();
        assert!(engine.resolve_waiters(&line));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn resolve_waiters_label_bypasses_payload_predicate() {
        let mut engine = test_engine();
        let (reply, rx) = oneshot::channel();
        // A matcher that can never match RPL_WHOISUSER (311), paired with
        // a label that the incoming line does carry: the label must still
        // resolve the waiter (spec §4.2, §8 "Label routing").
        engine.waiters.push(WaitForRegistration {
            matcher: crate::matching::Matcher::commands(["999"]),
            label: Some("42".to_string()),
            reply,
        });
        let line = Line::parse("@label=42 :srv 311 alice bob u h * :Bob Realname").unwrap();
        assert!(engine.resolve_waiters(&line));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn resolve_waiters_with_unmatched_label_does_not_resolve() {
        let mut engine = test_engine();
        let (reply, rx) = oneshot::channel();
        // A label is bound, but this line carries no matching tag: the
        // waiter stays registered even though the payload would otherwise
        // match, since it's still expecting its own labeled reply.
        engine.waiters.push(WaitForRegistration {
            matcher: crate::matching::Matcher::commands(["001"]),
            label: Some("42".to_string()),
            reply,
        });
        let line = Line::parse(":srv 001 alice :hi").unwrap();
        assert!(!engine.resolve_waiters(&line));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn nickname_collision_quits_once_alternatives_are_exhausted() {
        let mut engine = test_engine();
        engine.driver = HandshakeDriver::new(&ConnectionParams {
            alt_nicknames: Vec::new(),
            ..ConnectionParams::new("alice", "irc.example", 6667)
        });
        let (to_send, mut rx) = mpsc::unbounded_channel();
        engine.to_send = to_send;
        engine.handle_nickname_collision();
        let cmd = rx.try_recv().unwrap();
        match cmd {
            SendCommand::Enqueue(q) => assert_eq!(q.line.command, "QUIT"),
            _ => panic!("expected QUIT enqueue"),
        }
        assert!(engine.snapshot.disconnected);
    }

    #[test]
    fn nickname_collision_tries_next_alt_before_quitting() {
        let mut engine = test_engine();
        engine.driver = HandshakeDriver::new(&ConnectionParams {
            alt_nicknames: vec!["alice_".to_string()],
            ..ConnectionParams::new("alice", "irc.example", 6667)
        });
        let (to_send, mut rx) = mpsc::unbounded_channel();
        engine.to_send = to_send;
        engine.handle_nickname_collision();
        let cmd = rx.try_recv().unwrap();
        match cmd {
            SendCommand::Enqueue(q) => {
                assert_eq!(q.line.command, "NICK");
                assert_eq!(q.line.params, vec!["alice_".to_string()]);
            }
            _ => panic!("expected NICK enqueue"),
        }
        assert!(!engine.snapshot.disconnected);
    }
}
