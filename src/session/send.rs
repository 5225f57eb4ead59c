//! The send task: owns the priority queue and the throttle, writes lines
//! to the wire, and synthesizes self-echoes when `echo-message` isn't
//! agreed (spec §4.1, §4.4).

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::{mpsc, watch, Notify};
use tracing::info_span;
use tracing_futures::Instrument;

use crate::defaults::{PRE_REGISTRATION_PERIOD, PRE_REGISTRATION_RATE, SEND_BATCH_SIZE};
use crate::line::Line;
use crate::throttle::Throttle;
use crate::transport::Transport;

use super::{Incoming, Priority, SendCommand, SentLine, SessionCallbacks, SessionSnapshot};

pub fn spawn(
    writer: WriteHalf<Transport>,
    send_rx: mpsc::UnboundedReceiver<SendCommand>,
    incoming_tx: mpsc::UnboundedSender<Incoming>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    callbacks: Arc<dyn SessionCallbacks>,
    shutdown: Arc<Notify>,
) {
    tokio::spawn(
        run(writer, send_rx, incoming_tx, snapshot_rx, callbacks, shutdown)
            .instrument(info_span!("irc_session_send")),
    );
}

struct QueueEntry {
    key: Reverse<(Priority, u64)>,
    id: u64,
    line: Line,
    reply: tokio::sync::oneshot::Sender<SentLine>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl Eq for QueueEntry {}
impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// Without `echo-message`, the server never reflects a client's own
/// PRIVMSG/NOTICE/TAGMSG back to it; fabricate the line so local `wait_for`
/// matchers and callbacks see it the same way they'd see anyone else's.
fn self_echo(line: &Line, snapshot: &SessionSnapshot) -> Option<Line> {
    if snapshot.agreed_caps.contains("echo-message") {
        return None;
    }
    if !matches!(line.command.as_str(), "PRIVMSG" | "NOTICE" | "TAGMSG") {
        return None;
    }
    Some(Line {
        tags: line.tags.clone(),
        source: Some(snapshot.self_hostmask()),
        command: line.command.clone(),
        params: line.params.clone(),
    })
}

async fn run(
    mut writer: WriteHalf<Transport>,
    mut send_rx: mpsc::UnboundedReceiver<SendCommand>,
    incoming_tx: mpsc::UnboundedSender<Incoming>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    callbacks: Arc<dyn SessionCallbacks>,
    shutdown: Arc<Notify>,
) {
    let mut queue: BinaryHeap<QueueEntry> = BinaryHeap::new();
    let mut throttle = Throttle::new(PRE_REGISTRATION_RATE, PRE_REGISTRATION_PERIOD);

    'outer: loop {
        if queue.is_empty() {
            tokio::select! {
                _ = shutdown.notified() => break 'outer,
                maybe_cmd = send_rx.recv() => match maybe_cmd {
                    Some(cmd) => handle_command(cmd, &mut queue, &mut throttle),
                    None => break 'outer,
                },
            }
            continue 'outer;
        }

        let mut sent_this_batch = 0usize;
        while sent_this_batch < SEND_BATCH_SIZE && !queue.is_empty() {
            // Drain whatever's already buffered before picking the next
            // line to write: two `send()` calls racing each other must
            // both land in the priority queue before either is dequeued,
            // or a low-priority line submitted a moment earlier could
            // jump ahead of a high-priority one still in flight on the
            // channel (spec §8 "Priority FIFO").
            while let Ok(cmd) = send_rx.try_recv() {
                handle_command(cmd, &mut queue, &mut throttle);
            }
            tokio::select! {
                _ = shutdown.notified() => break 'outer,
                maybe_cmd = send_rx.recv() => match maybe_cmd {
                    Some(cmd) => handle_command(cmd, &mut queue, &mut throttle),
                    None => break 'outer,
                },
                _ = throttle.acquire() => {
                    let Some(entry) = queue.pop() else { break };
                    callbacks.line_presend(&entry.line);
                    let wire = format!("{}\r\n", entry.line.format());
                    if writer.write_all(wire.as_bytes()).await.is_err() || writer.flush().await.is_err() {
                        shutdown.notify_waiters();
                        break 'outer;
                    }
                    callbacks.line_send(&entry.line);

                    let snapshot = snapshot_rx.borrow().clone();
                    if let Some(echo) = self_echo(&entry.line, &snapshot) {
                        let _ = incoming_tx.send(Incoming::SelfEcho(echo));
                    }

                    let _ = entry.reply.send(SentLine {
                        id: entry.id,
                        label: entry.line.tag("label").or_else(|| entry.line.tag("draft/label")).map(str::to_string),
                        line: entry.line,
                    });
                    sent_this_batch += 1;
                }
            }
        }
    }
}

fn handle_command(cmd: SendCommand, queue: &mut BinaryHeap<QueueEntry>, throttle: &mut Throttle) {
    match cmd {
        SendCommand::Enqueue(queued) => queue.push(QueueEntry {
            key: Reverse((queued.priority, queued.seq)),
            id: queued.seq,
            line: queued.line,
            reply: queued.reply,
        }),
        SendCommand::SetThrottle { rate_limit, period } => throttle.set_rate(rate_limit, period),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::Hostmask;

    fn snapshot_with_nick(nick: &str) -> SessionSnapshot {
        SessionSnapshot {
            nickname: nick.to_string(),
            ..SessionSnapshot::default()
        }
    }

    #[test]
    fn self_echo_synthesizes_for_privmsg_without_echo_cap() {
        let line = Line::build("PRIVMSG", vec!["#chan".to_string(), "hi".to_string()]);
        let snapshot = snapshot_with_nick("alice");
        let echo = self_echo(&line, &snapshot).expect("should synthesize");
        assert_eq!(echo.source, Some(Hostmask { nickname: "alice".into(), username: None, hostname: None }));
        assert_eq!(echo.command, "PRIVMSG");
    }

    #[test]
    fn self_echo_suppressed_when_echo_message_agreed() {
        let line = Line::build("PRIVMSG", vec!["#chan".to_string(), "hi".to_string()]);
        let mut snapshot = snapshot_with_nick("alice");
        snapshot.agreed_caps.insert("echo-message".to_string());
        assert!(self_echo(&line, &snapshot).is_none());
    }

    #[test]
    fn self_echo_ignores_non_message_commands() {
        let line = Line::build("JOIN", vec!["#chan".to_string()]);
        let snapshot = snapshot_with_nick("alice");
        assert!(self_echo(&line, &snapshot).is_none());
    }

    #[test]
    fn queue_entry_orders_by_priority_then_sequence() {
        let (reply_a, _rx_a) = tokio::sync::oneshot::channel();
        let (reply_b, _rx_b) = tokio::sync::oneshot::channel();
        let mut queue: BinaryHeap<QueueEntry> = BinaryHeap::new();
        queue.push(QueueEntry {
            key: Reverse((Priority::Low, 1)),
            id: 1,
            line: Line::build("PING", Vec::<String>::new()),
            reply: reply_a,
        });
        queue.push(QueueEntry {
            key: Reverse((Priority::High, 2)),
            id: 2,
            line: Line::build("PING", Vec::<String>::new()),
            reply: reply_b,
        });
        let first = queue.pop().unwrap();
        assert_eq!(first.id, 2);
    }
}
