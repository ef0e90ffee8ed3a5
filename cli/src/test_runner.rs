#![cfg(test)]

//! End-to-end checks of the `echo` command.
//!
//! The runner starts the echo server on an unused port and runs each case against it with a fresh
//! client connection. Every case sends some frames and checks what comes back. Results are
//! printed per case, and the test fails if any case failed.

use super::{echo, relay};
use ansi_term::Color;
use anyhow::Error;
use async_std::{
    future::timeout,
    task::{sleep, spawn},
};
use client::ws::{
    open, BorrowedFrame, CloseCode, Frame, WebSocket, WebSocketOptions, WebSocketServer,
};
use futures::{
    future::join_all,
    stream::{self, StreamExt},
};
use portpicker::pick_unused_port;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

#[async_std::test]
async fn echo_server_test_cases() -> Result<(), Error> {
    client::init_logging();

    let port = pick_unused_port().unwrap();
    spawn(async move {
        if let Err(err) = echo(port).await {
            tracing::warn!("echo server exited: {err}");
        }
    });
    let url = format!("ws://127.0.0.1:{port}/");
    wait_for_server(&url).await?;

    let cases = [
        TestCase::Text,
        TestCase::Binary,
        TestCase::Fragmented,
        TestCase::Ping,
        TestCase::Close,
    ];
    let results = join_all(cases.into_iter().map(|case| case.run(&url))).await;
    for result in &results {
        println!("{}", result);
    }
    if results.iter().any(TestResult::failed) {
        Err(Error::msg(format!("{}", Color::Red.paint("tests failed"))))
    } else {
        println!("All test cases passed.");
        Ok(())
    }
}

#[async_std::test]
async fn ws_relay_stops_when_server_closes() -> Result<(), Error> {
    let server = WebSocketServer::bind("127.0.0.1:0", WebSocketOptions::default()).await?;
    let url = format!("ws://{}/", server.local_addr()?);
    let server = spawn(async move {
        let mut socket = server.accept().await?.accept().await?;
        let hello = socket.recv().await?;
        socket
            .send_frame(BorrowedFrame::close(CloseCode::GoingAway, b""))
            .await?;
        let reply = socket.recv().await?;
        Ok::<_, client::Error>((hello.to_string(), reply.to_string()))
    });

    // Input which never ends, like an idle terminal.
    let lines = stream::iter([Ok::<_, std::io::Error>("hello".to_string())])
        .chain(stream::pending());
    let mut socket = open(url.as_str()).run().await?;
    timeout(Duration::from_secs(5), relay(lines, &mut socket)).await??;

    let (hello, reply) = server.await?;
    assert_eq!(hello, "hello");
    assert_eq!(reply, "close 1000");
    Ok(())
}

#[derive(Clone, Copy, Debug)]
enum TestCase {
    Text,
    Binary,
    Fragmented,
    Ping,
    Close,
}

impl TestCase {
    async fn run(self, url: &str) -> TestResult {
        TestResult {
            name: format!("{self:?}"),
            failure: self.do_test(url).await.err(),
        }
    }

    async fn do_test(self, url: &str) -> Result<(), Error> {
        let mut socket = open(url).run().await?;

        let expected = match self {
            Self::Text => {
                socket.send_frame("hello, echo").await?;
                "hello, echo"
            }
            Self::Binary => {
                socket.send_frame(&[0xde, 0xad, 0xbe, 0xef][..]).await?;
                "binary (4 bytes)"
            }
            Self::Fragmented => {
                socket
                    .send_frame(BorrowedFrame::text_partial("in ", false))
                    .await?;
                socket
                    .send_frame(BorrowedFrame::text_partial("pieces", true))
                    .await?;
                "in pieces"
            }
            Self::Ping => {
                socket.send_frame(BorrowedFrame::ping(b"1234")).await?;
                "pong (4 bytes)"
            }
            Self::Close => {
                socket
                    .send_frame(BorrowedFrame::close(CloseCode::GoingAway, b"done"))
                    .await?;
                "close 1001: done"
            }
        };

        let frame = socket.recv().await?;
        if frame.to_string() != expected {
            return Err(Error::msg(format!(
                "expected frame:\n{expected}\nactual frame:\n{frame}"
            )));
        }

        if !matches!(frame, Frame::Close(..)) {
            close(&mut socket).await?;
        }
        Ok(())
    }
}

/// Close the connection and wait for the server's answer.
async fn close(socket: &mut WebSocket) -> Result<(), Error> {
    socket
        .send_frame(BorrowedFrame::close(CloseCode::Normal, b""))
        .await?;
    match socket.recv().await? {
        Frame::Close(code, _) if code == u16::from(CloseCode::Normal) => Ok(()),
        frame => Err(Error::msg(format!("expected close, got {frame}"))),
    }
}

struct TestResult {
    name: String,
    failure: Option<anyhow::Error>,
}

impl TestResult {
    fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

impl Display for TestResult {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}...", self.name)?;
        if let Some(err) = &self.failure {
            writeln!(f, "{}", Color::Red.paint("FAILED"))?;
            write!(f, "{err}")?;
        } else {
            write!(f, "{}", Color::Green.paint("OK"))?;
        }
        Ok(())
    }
}

async fn wait_for_server(url: &str) -> Result<(), Error> {
    const MAX_CONNECT_RETRIES: usize = 60;

    for _ in 0..MAX_CONNECT_RETRIES {
        match open(url).run().await {
            Ok(mut socket) => return close(&mut socket).await,
            Err(err) => {
                tracing::warn!("waiting for server to start: {err}");
                sleep(Duration::from_millis(100)).await;
            }
        }
    }

    Err(Error::msg("timed out waiting for server"))
}
