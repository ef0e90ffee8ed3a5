//! A minimal local HTTP server for tests.
//!
//! Each connection carries one request. The server parses the request, records it, and writes
//! whatever bytes the handler returns before closing the connection, so tests can produce
//! malformed responses as easily as valid ones.

use crate::{
    error::Result,
    http::{
        transfer::{read_header_line, read_line_in_place},
        Body, RawResponse, Stats, Version,
    },
    net::BufStream,
};
use async_std::{
    net::{TcpListener, TcpStream},
    task::spawn,
};
use futures::io::AsyncWriteExt;
use http::{header, HeaderMap, Method, StatusCode};
use portpicker::pick_unused_port;
use std::io;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// A request received by a [`TestServer`].
#[derive(Clone, Debug)]
pub struct TestRequest {
    pub method: Method,
    pub target: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

type Handler = dyn Fn(&TestRequest) -> Vec<u8> + Send + Sync;

pub struct TestServer {
    port: u16,
    requests: Arc<Mutex<Vec<TestRequest>>>,
}

impl TestServer {
    /// Start serving on an unused local port.
    pub async fn start<F>(handler: F) -> Result<Self>
    where
        F: Fn(&TestRequest) -> Vec<u8> + Send + Sync + 'static,
    {
        let port = pick_unused_port()
            .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no free port"))?;
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let requests = Arc::new(Mutex::new(vec![]));
        let handler: Arc<Handler> = Arc::new(handler);

        let log = requests.clone();
        spawn(async move {
            loop {
                let stream = match listener.accept().await {
                    Ok((stream, _)) => stream,
                    Err(err) => {
                        tracing::warn!("test server accept failed: {err}");
                        break;
                    }
                };

                let handler = handler.clone();
                let log = log.clone();
                spawn(async move {
                    if let Err(err) = serve_one(stream, handler, log).await {
                        tracing::warn!("test server connection failed: {err}");
                    }
                });
            }
        });

        Ok(Self { port, requests })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The URL of `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }

    /// The requests received so far.
    pub fn requests(&self) -> Vec<TestRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

async fn serve_one(
    stream: TcpStream,
    handler: Arc<Handler>,
    log: Arc<Mutex<Vec<TestRequest>>>,
) -> Result<()> {
    let mut reader = BufStream::new(stream);

    let (line, offset) = read_line_in_place(&mut reader).await?;
    let mut parts = line.split(' ');
    let method = Method::from_str(parts.next().unwrap_or_default()).unwrap_or_default();
    let target = parts.next().unwrap_or_default().to_string();
    reader.consume(offset);

    let mut headers = HeaderMap::new();
    while let Some((key, value, _)) = read_header_line(&mut reader).await? {
        headers.append(key, value);
    }

    let has_body =
        headers.contains_key(header::CONTENT_LENGTH) || headers.contains_key(header::TRANSFER_ENCODING);
    let (body, mut reader) = if has_body {
        // Request bodies are framed like response bodies.
        let framing = RawResponse {
            stats: Stats::default(),
            version: Version::Http11,
            status: StatusCode::OK,
            headers: headers.clone(),
            url: None,
        };
        let mut body = Body::new(reader, &method, &framing)?;
        let bytes = body.bytes().await?;
        (bytes, body.into_inner())
    } else {
        (vec![], reader)
    };

    let request = TestRequest {
        method,
        target,
        headers,
        body,
    };
    let response = handler(&request);
    match log.lock() {
        Ok(mut log) => log.push(request),
        Err(poisoned) => poisoned.into_inner().push(request),
    }

    reader.get_mut().write_all(&response).await?;
    reader.get_mut().flush().await?;
    Ok(())
}

/// Serialize a response with a `Content-Length` header.
pub fn response(status: u16, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown");

    let mut bytes = format!("HTTP/1.1 {status} {reason}\r\n").into_bytes();
    for (key, value) in headers {
        bytes.extend_from_slice(format!("{key}: {value}\r\n").as_bytes());
    }
    bytes.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    bytes.extend_from_slice(body);
    bytes
}
