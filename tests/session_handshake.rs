//! End-to-end handshake and wait_for test over a real loopback TCP socket,
//! exercising `Session::connect` against a minimal scripted fake server
//! instead of stubbing out the transport.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use irc_session::matching::Matcher;
use irc_session::{ConnectionParams, NoopCallbacks, Priority, Session};

/// Accepts one connection, drains lines until `USER` is seen (end of the
/// initial registration burst), then scripts a bare-bones CAP/registration
/// exchange with no capabilities agreed, followed by a PRIVMSG.
async fn run_fake_server(listener: TcpListener) {
    let (stream, _) = listener.accept().await.expect("accept");
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await.expect("read") {
        if line.starts_with("USER") {
            break;
        }
    }

    write_half
        .write_all(b":srv CAP alice LS :\r\n")
        .await
        .expect("write cap ls");
    write_half
        .write_all(b":srv 001 alice :Welcome to the test network\r\n")
        .await
        .expect("write welcome");
    write_half
        .write_all(b":srv 422 alice :MOTD File is missing\r\n")
        .await
        .expect("write no motd");

    // Drain whatever the client sends next (self-WHO, etc.) without
    // replying, then deliver a PRIVMSG for wait_for to pick up.
    tokio::time::sleep(Duration::from_millis(50)).await;
    write_half
        .write_all(b":bob!b@host PRIVMSG alice :hello there\r\n")
        .await
        .expect("write privmsg");

    // Keep the connection open until the test finishes with it.
    tokio::time::sleep(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn connect_registers_and_wait_for_resolves() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local_addr").port();
    tokio::spawn(run_fake_server(listener));

    let params = ConnectionParams::new("alice", "127.0.0.1", port);
    let session = Session::connect(params, Arc::new(NoopCallbacks))
        .await
        .expect("connect");

    let privmsg = tokio::time::timeout(
        Duration::from_secs(5),
        session.wait_for(Matcher::commands(["PRIVMSG"]), None),
    )
    .await
    .expect("wait_for timed out")
    .expect("wait_for errored");

    assert_eq!(privmsg.command, "PRIVMSG");
    assert_eq!(privmsg.params[1], "hello there");
    assert!(session.is_registered());
    assert_eq!(session.nickname(), "alice");

    session.disconnect();
}

#[tokio::test]
async fn send_round_trips_through_the_wire() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local_addr").port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        while let Some(line) = lines.next_line().await.expect("read") {
            if line.starts_with("USER") {
                break;
            }
        }
        write_half.write_all(b":srv CAP alice LS :\r\n").await.expect("write cap ls");
        write_half
            .write_all(b":srv 001 alice :Welcome\r\n")
            .await
            .expect("write welcome");

        // The first line after registration-driven traffic settles should
        // be our own JOIN.
        loop {
            let line = lines.next_line().await.expect("read").expect("eof");
            if line.starts_with("JOIN") {
                assert_eq!(line, "JOIN #rust");
                break;
            }
        }
    });

    let params = ConnectionParams::new("alice", "127.0.0.1", port);
    let session = Session::connect(params, Arc::new(NoopCallbacks))
        .await
        .expect("connect");

    session
        .send_join(&["#rust".to_string()])
        .await
        .expect("send join");

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server task timed out")
        .expect("server task panicked");

    session.disconnect();
}

#[tokio::test]
async fn priority_send_orders_high_before_low() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local_addr").port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        while let Some(line) = lines.next_line().await.expect("read") {
            if line.starts_with("USER") {
                break;
            }
        }
        write_half.write_all(b":srv CAP alice LS :\r\n").await.expect("write cap ls");
        write_half.write_all(b":srv 001 alice :Welcome\r\n").await.expect("write welcome");

        let mut seen = Vec::new();
        while seen.len() < 2 {
            let line = lines.next_line().await.expect("read").expect("eof");
            if line.starts_with("PRIVMSG") {
                seen.push(line);
            }
        }
        seen
    });

    let params = ConnectionParams::new("alice", "127.0.0.1", port);
    let session = Session::connect(params, Arc::new(NoopCallbacks))
        .await
        .expect("connect");

    // Submit the low-priority line first; the high-priority one must still
    // be written first (spec §3 SentLine ordering, §8 priority FIFO).
    let low = session.send(
        irc_session::Line::build("PRIVMSG", ["#a".to_string(), "low".to_string()]),
        Priority::Low,
    );
    let high = session.send(
        irc_session::Line::build("PRIVMSG", ["#a".to_string(), "high".to_string()]),
        Priority::High,
    );
    let (low, high) = tokio::join!(low, high);
    low.expect("low send");
    high.expect("high send");

    let seen = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server task timed out")
        .expect("server task panicked");

    assert_eq!(seen[0], "PRIVMSG #a :high");
    assert_eq!(seen[1], "PRIVMSG #a :low");

    session.disconnect();
}
