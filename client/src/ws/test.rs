use super::{handshake::accept_key, *};
use crate::{
    testing::{response, TestServer},
    Error,
};
use async_std::{
    future::timeout,
    net::{TcpListener, TcpStream},
    task::{sleep, spawn},
};
use futures::{
    io::{AsyncReadExt, AsyncWriteExt},
    join, StreamExt, TryStreamExt,
};
use http::StatusCode;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

async fn connect_pair() -> (WebSocket, WebSocket) {
    let server = WebSocketServer::bind("127.0.0.1:0", WebSocketOptions::default())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let client = async { open(format!("ws://{addr}/chat")).run().await.unwrap() };
    let server = async { server.accept().await.unwrap().accept().await.unwrap() };
    join!(client, server)
}

/// Accept one connection and complete the client's handshake by hand.
async fn raw_handshake(listener: &TcpListener) -> TcpStream {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut request = vec![];
    let mut byte = [0u8; 1];
    while !request.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await.unwrap();
        request.push(byte[0]);
    }

    let request = String::from_utf8(request).unwrap();
    let key = request
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("sec-websocket-key")
                .then(|| value.trim().to_string())
        })
        .unwrap();

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nConnection: upgrade\r\nUpgrade: websocket\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(&key)
    );
    stream.write_all(response.as_bytes()).await.unwrap();
    stream
}

/// Complete a client handshake by hand, then send `frames` and hang up.
async fn raw_server(frames: Vec<u8>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    spawn(async move {
        let mut stream = raw_handshake(&listener).await;
        stream.write_all(&frames).await.unwrap();
    });

    addr
}

#[async_std::test]
async fn test_echo() {
    crate::init_logging();

    let (mut client, mut server) = connect_pair().await;

    client.send_frame("hello").await.unwrap();
    client.send_frame(&b"\x00\x01\x02"[..]).await.unwrap();
    client
        .send_frame(BorrowedFrame::text_partial("split ", false))
        .await
        .unwrap();
    client.send_frame(BorrowedFrame::ping(b"are you there")).await.unwrap();
    client
        .send_frame(BorrowedFrame::text_partial("message", true))
        .await
        .unwrap();

    for _ in 0..4 {
        let frame = server.recv().await.unwrap();
        let sent = match &frame {
            Frame::Ping(data) => server.send_frame(BorrowedFrame::pong(data.data())).await,
            frame => server.send_frame(frame).await,
        };
        sent.unwrap();
    }

    assert!(matches!(client.recv().await.unwrap(), Frame::Text(text) if text == "hello"));
    assert!(matches!(client.recv().await.unwrap(), Frame::Binary(data) if data == [0, 1, 2]));
    // The ping interleaved with the fragments is answered first.
    assert!(
        matches!(client.recv().await.unwrap(), Frame::Pong(data) if data.data() == b"are you there")
    );
    assert!(matches!(client.recv().await.unwrap(), Frame::Text(text) if text == "split message"));
}

#[async_std::test]
async fn test_large_message() {
    let (mut client, mut server) = connect_pair().await;

    let data: Vec<u8> = (0..100_000).map(|i| i as u8).collect();
    let send = async { client.send_frame(&data[..]).await.unwrap() };
    let recv = async { server.recv().await.unwrap() };
    let (_, frame) = join!(send, recv);
    assert!(matches!(frame, Frame::Binary(received) if received == data));
}

#[async_std::test]
async fn test_close_handshake() {
    let (mut client, mut server) = connect_pair().await;

    client
        .send_frame(BorrowedFrame::close(CloseCode::Normal, b"bye"))
        .await
        .unwrap();
    assert!(!client.can_write());
    assert!(client.can_read());
    let err = client.send_frame("too late").await.unwrap_err();
    assert!(matches!(err, Error::Shutdown), "{err}");

    let frame = server.recv().await.unwrap();
    assert!(matches!(&frame, Frame::Close(1000, reason) if reason.data() == b"bye"));
    assert!(!server.can_read());
    server.send_frame(&frame).await.unwrap();
    assert!(!server.can_write());

    let frame = client.recv().await.unwrap();
    assert!(matches!(&frame, Frame::Close(1000, reason) if reason.data() == b"bye"));
    assert!(!client.can_read());
    let err = client.recv().await.unwrap_err();
    assert!(matches!(err, Error::Shutdown), "{err}");
}

#[async_std::test]
async fn test_close_handshake_is_prompt() {
    let close_timeout = Duration::from_secs(10);
    let (mut client, mut server) = connect_pair().await;
    client.set_close_timeout(close_timeout);
    server.set_close_timeout(close_timeout);

    let start = Instant::now();
    let client_side = async {
        client
            .send_frame(BorrowedFrame::close(CloseCode::Normal, b""))
            .await
            .unwrap();
        client.recv().await.unwrap()
    };
    let server_side = async {
        let frame = server.recv().await.unwrap();
        server.send_frame(&frame).await.unwrap();
        frame
    };
    let (from_server, from_client) = join!(client_side, server_side);
    assert!(matches!(from_client, Frame::Close(1000, _)));
    assert!(matches!(from_server, Frame::Close(1000, _)));

    // Both sides see the end of the stream instead of waiting out the close timeout.
    let elapsed = start.elapsed();
    assert!(elapsed < Duration::from_secs(2), "close took {elapsed:?}");
}

#[async_std::test]
async fn test_close_ends_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = spawn(async move {
        let mut stream = raw_handshake(&listener).await;
        let mut received = vec![];
        let read = timeout(Duration::from_secs(5), stream.read_to_end(&mut received)).await;
        read.ok().map(|_| received)
    });

    let mut client = open(format!("ws://{addr}/")).run().await.unwrap();
    client
        .send_frame(BorrowedFrame::close(CloseCode::Normal, b""))
        .await
        .unwrap();

    let received = peer.await.expect("no end of stream after the close frame");
    // Header, masking key and the masked status code.
    assert_eq!(received.len(), 8, "{received:x?}");
    assert_eq!(received[..2], [0x88, 0x82]);
}

#[async_std::test]
async fn test_close_without_code() {
    let addr = raw_server(vec![0x88, 0x00]).await;
    let mut client = open(format!("ws://{addr}/")).run().await.unwrap();

    let frame = client.recv().await.unwrap();
    assert!(
        matches!(&frame, Frame::Close(code, reason) if *code == u16::from(CloseCode::NoStatusCode) && reason.is_empty())
    );
    assert!(!client.can_read());
    assert!(client.can_write());
}

#[async_std::test]
async fn test_eof_is_close() {
    let addr = raw_server(vec![]).await;
    let mut client = open(format!("ws://{addr}/")).run().await.unwrap();

    let frames: Vec<Frame> = client.frames().try_collect().await.unwrap();
    assert_eq!(frames.len(), 1);
    assert!(
        matches!(&frames[0], Frame::Close(code, _) if *code == u16::from(CloseCode::NoClose))
    );
    assert!(!client.can_read());
}

#[async_std::test]
async fn test_fragments_from_server() {
    let frames = [
        &[0x01, 0x03, b'H', b'e', b'l'][..],
        &[0x89, 0x00],
        &[0x00, 0x01, b'l'],
        &[0x80, 0x01, b'o'],
        &[0x82, 0x00],
    ]
    .concat();
    let addr = raw_server(frames).await;
    let mut client = open(format!("ws://{addr}/")).run().await.unwrap();

    assert!(matches!(client.recv().await.unwrap(), Frame::Ping(data) if data.is_empty()));
    assert!(matches!(client.recv().await.unwrap(), Frame::Text(text) if text == "Hello"));
    assert!(matches!(client.recv().await.unwrap(), Frame::Binary(data) if data.is_empty()));
}

#[async_std::test]
async fn test_protocol_errors() {
    let cases: [(&[u8], &str); 9] = [
        // A masked frame from a server.
        (
            &[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58],
            "server sent a masked frame",
        ),
        (&[0x80, 0x01, b'x'], "unexpected continuation frame"),
        (&[0x01, 0x01, b'a', 0x81, 0x01, b'b'], "expected a continuation frame"),
        (&[0x09, 0x00], "fin not set on control frame"),
        (&[0x89, 0x7e, 0x00, 0x7e], "control frame too long"),
        (&[0x8b, 0x00], "invalid opcode 0xb"),
        (&[0xa1, 0x01, b'x'], "reserved bits set"),
        (
            &[0x82, 0x7f, 0xff, 0, 0, 0, 0, 0, 0, 0],
            "most significant bit is set",
        ),
        (&[0x88, 0x01, 0x03], "close payload of one byte"),
    ];

    for (frames, expected) in cases {
        let addr = raw_server(frames.to_vec()).await;
        let mut client = open(format!("ws://{addr}/")).run().await.unwrap();
        match client.recv().await {
            Err(Error::WebSocket { source }) => {
                assert!(source.to_string().contains(expected), "{source}")
            }
            res => panic!("unexpected result {res:?} for {frames:x?}"),
        }
    }
}

#[async_std::test]
async fn test_invalid_utf8() {
    let addr = raw_server(vec![0x81, 0x02, 0xc3, 0x28]).await;
    let mut client = open(format!("ws://{addr}/")).run().await.unwrap();
    let err = client.recv().await.unwrap_err();
    assert!(matches!(err, Error::InvalidUtf8), "{err}");
}

#[async_std::test]
async fn test_message_too_long() {
    let (mut client, mut server) = connect_pair().await;
    server.set_max_message_length(8);

    client.send_frame("short").await.unwrap();
    assert!(matches!(server.recv().await.unwrap(), Frame::Text(text) if text == "short"));

    // The limit applies to the whole message, not each fragment.
    client
        .send_frame(BorrowedFrame::binary_partial(b"12345", false))
        .await
        .unwrap();
    client
        .send_frame(BorrowedFrame::binary_partial(b"6789", true))
        .await
        .unwrap();
    let err = server.recv().await.unwrap_err();
    assert!(
        matches!(
            err,
            Error::WebSocket {
                source: WebSocketError::MessageTooLong
            }
        ),
        "{err}"
    );
}

#[async_std::test]
async fn test_send_errors() {
    let (mut client, _server) = connect_pair().await;

    let err = client
        .send_frame(BorrowedFrame::ping(&[0; 126]))
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            Error::WebSocket {
                source: WebSocketError::UserInvalidControlFrame
            }
        ),
        "{err}"
    );

    let err = client
        .send_frame(BorrowedFrame::close(CloseCode::Normal, &[b'x'; 124]))
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            Error::WebSocket {
                source: WebSocketError::UserInvalidControlFrame
            }
        ),
        "{err}"
    );
    assert!(client.can_write());

    client
        .send_frame(BorrowedFrame::text_partial("a", false))
        .await
        .unwrap();
    let err = client
        .send_frame(BorrowedFrame::binary_partial(b"b", true))
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            Error::WebSocket {
                source: WebSocketError::DataTypeMismatch
            }
        ),
        "{err}"
    );
}

#[async_std::test]
async fn test_split() {
    let (mut client, mut server) = connect_pair().await;
    let (reader, mut writer) = client.split();

    let send = async {
        writer.send_frame("one").await.unwrap();
        writer.send_frame("two").await.unwrap();
        writer
            .send_frame(BorrowedFrame::close(CloseCode::GoingAway, b""))
            .await
            .unwrap();
    };
    let echo = async {
        while server.can_read() {
            let frame = server.recv().await.unwrap();
            server.send_frame(&frame).await.unwrap();
        }
    };
    let recv = async {
        reader
            .frames()
            .map(|frame| frame.unwrap().to_string())
            .collect::<Vec<_>>()
            .await
    };

    let (_, _, frames) = join!(send, echo, recv);
    assert_eq!(frames, ["one", "two", "close 1001"]);
    assert!(!client.can_read());
    assert!(!client.can_write());
}

#[async_std::test]
async fn test_server_rejects_plain_request() {
    let server = WebSocketServer::bind("127.0.0.1:0", WebSocketOptions::default())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let client = async {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut response = vec![];
        stream.read_to_end(&mut response).await.unwrap();
        response
    };
    let accept = async { server.accept().await.unwrap().accept().await };

    let (response, result) = join!(client, accept);
    assert!(response.starts_with(b"HTTP/1.1 400 "));
    assert!(matches!(
        result,
        Err(Error::WebSocket {
            source: WebSocketError::InvalidClientRequest { .. }
        })
    ));
}

#[async_std::test]
async fn test_http_server_rejects_upgrade() {
    let server = TestServer::start(|_| response(200, &[], b"not a websocket"))
        .await
        .unwrap();

    let err = open(format!("ws://127.0.0.1:{}/", server.port()))
        .run()
        .await
        .unwrap_err();
    assert!(
        matches!(
            &err,
            Error::WebSocket {
                source: WebSocketError::ServerRejected { status }
            } if *status == StatusCode::OK
        ),
        "{err}"
    );

    let request = &server.requests()[0];
    assert_eq!(request.headers[http::header::UPGRADE], "websocket");
    assert_eq!(request.headers[http::header::SEC_WEBSOCKET_VERSION], "13");
}

#[async_std::test]
async fn test_handshake_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        sleep(Duration::from_secs(5)).await;
    });

    let err = open(format!("ws://{addr}/"))
        .set_handshake_timeout(Duration::from_millis(200))
        .run()
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "{err}");
}

#[test]
fn test_mask() {
    let mut data = *b"Hello";
    mask(&mut data, 0x37fa213d);
    assert_eq!(data, [0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    mask(&mut data, 0x37fa213d);
    assert_eq!(&data, b"Hello");
}

#[test]
fn test_op() {
    assert_eq!(Op::from_repr(0x9), Some(Op::Ping));
    assert_eq!(Op::from_repr(0x3), None);
    assert!(Op::Close.is_control());
    assert!(!Op::Continuation.is_control());
    assert_eq!(CloseCode::from_repr(1006), Some(CloseCode::NoClose));
}

#[test]
fn test_control_frame() {
    let mut frame = ControlFrame::from_slice(b"\x03\xe8bye").unwrap();
    assert_eq!(frame.len(), 5);
    frame.advance(2);
    assert_eq!(frame.data(), b"bye");
    assert!(ControlFrame::from_slice(&[0; 126]).is_none());
    assert!(ControlFrame::new().is_empty());
}

#[test]
fn test_borrowed_frame() {
    let frame = Frame::Close(1000, ControlFrame::from_slice(b"done").unwrap());
    let borrowed = BorrowedFrame::from(&frame);
    assert_eq!(borrowed.op(), Op::Close);
    assert_eq!(borrowed.close_code, 1000);
    assert_eq!(borrowed.payload(), b"done");
    assert_eq!(frame.to_string(), "close 1000: done");

    let borrowed = BorrowedFrame::from("hi");
    assert_eq!(borrowed.op(), Op::Text);
    assert!(borrowed.fin);
    assert!(!BorrowedFrame::binary_partial(b"x", false).fin);
}
