use anyhow::{anyhow, Error};
use async_std::{
    fs::File,
    io::{self, prelude::BufReadExt, BufReader},
    task::spawn,
};
use clap::{Args, Parser, Subcommand};
use client::{
    env, file,
    http::{self, Method},
    net::IpStrategy,
    ws::{
        self, BorrowedFrame, CloseCode, Frame, WebSocket, WebSocketHandle, WebSocketOptions,
        WebSocketServer,
    },
};
use futures::{
    future::{select, Either},
    io::AsyncWriteExt,
    pin_mut, Stream, StreamExt,
};
use std::path::PathBuf;
use std::time::Duration;

mod test_runner;

/// Transfer data from HTTP, WebSocket and file URLs.
#[derive(Debug, Parser)]
struct Options {
    #[clap(flatten)]
    env: env::Options,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch an HTTP or HTTPS URL.
    Get(GetOptions),

    /// Resolve a host name to its IP addresses.
    Resolve {
        host: String,
    },

    /// Connect to a WebSocket, sending each line of standard input as a text message and printing
    /// each message received.
    Ws {
        url: String,
    },

    /// Run a WebSocket server which echoes every message back to the sender.
    Echo {
        #[clap(short, long, env = "FETCH_ECHO_PORT", default_value = "8080")]
        port: u16,
    },

    /// Read a file URL, optionally only a range of bytes.
    File {
        url: String,

        /// First byte to read.
        #[clap(long)]
        start: Option<u64>,

        /// Stop reading before this byte.
        #[clap(long)]
        end: Option<u64>,
    },
}

#[derive(Debug, Args)]
struct GetOptions {
    url: String,

    #[clap(short = 'X', long, default_value = "GET")]
    method: String,

    /// Extra request headers, as `Name: value`.
    #[clap(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body.
    #[clap(short, long)]
    data: Option<String>,

    /// Write the body to a file instead of standard output.
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Print the status line and response headers before the body.
    #[clap(short, long)]
    include: bool,

    #[clap(long, default_value = "5")]
    max_redirects: u32,

    /// Connection timeout, in seconds.
    #[clap(long)]
    timeout: Option<u64>,

    /// Address families to connect with: default, ipv4-only, ipv6-only, prefer-ipv4 or
    /// prefer-ipv6.
    #[clap(long, default_value = "default")]
    strategy: IpStrategy,

    /// Print timing statistics to standard error.
    #[clap(long)]
    stats: bool,
}

async fn get(opt: GetOptions) -> Result<(), Error> {
    let method = Method::from_bytes(opt.method.to_uppercase().as_bytes())?;
    let mut req = http::request(method, &opt.url);
    req.set_follow_redirect(opt.max_redirects)
        .set_strategy(opt.strategy);
    if let Some(timeout) = opt.timeout {
        req.set_timeout(Duration::from_secs(timeout));
    }
    for header in &opt.headers {
        let (key, value) = header
            .split_once(':')
            .ok_or_else(|| anyhow!("invalid header '{header}'"))?;
        req.header(key.trim(), value.trim());
    }
    if let Some(data) = opt.data {
        req.payload(data);
    }

    let res = req.run().await?;
    if opt.include {
        println!("{} {}", res.version().as_str(), res.status());
        for (key, value) in res.headers() {
            println!("{key}: {}", String::from_utf8_lossy(value.as_bytes()));
        }
        println!();
    }
    if opt.stats {
        eprintln!("{:?}", res.stats());
    }

    let body = res.into_body().into_reader();
    match opt.output {
        Some(path) => {
            let mut file = File::create(path.as_os_str()).await?;
            futures::io::copy(body, &mut file).await?;
            file.flush().await?;
        }
        None => {
            let mut stdout = io::stdout();
            futures::io::copy(body, &mut stdout).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

async fn resolve(host: &str) -> Result<(), Error> {
    let resolver = env::get_resolver().await?;
    let ips = resolver.resolve_ips(host).await?;
    for ip in ips.v4() {
        println!("{ip}");
    }
    for ip in ips.v6() {
        println!("{ip}");
    }
    Ok(())
}

async fn websocket(url: &str) -> Result<(), Error> {
    let mut socket = ws::open(url).run().await?;
    relay(BufReader::new(io::stdin()).lines(), &mut socket).await
}

/// Send each line as a text message and print each message received.
///
/// Stops reading `lines` once the peer has closed the connection.
async fn relay(
    lines: impl Stream<Item = io::Result<String>>,
    socket: &mut WebSocket,
) -> Result<(), Error> {
    let (reader, mut writer) = socket.split();

    let peer_closed = {
        let send = async {
            pin_mut!(lines);
            while let Some(line) = lines.next().await {
                writer.send_frame(line?.as_str()).await?;
            }
            writer
                .send_frame(BorrowedFrame::close(CloseCode::Normal, b""))
                .await?;
            Ok::<_, Error>(())
        };
        let recv = async {
            let frames = reader.frames();
            pin_mut!(frames);
            while let Some(frame) = frames.next().await {
                println!("{}", frame?);
            }
            Ok::<_, Error>(())
        };
        pin_mut!(send, recv);

        match select(send, recv).await {
            Either::Left((sent, recv)) => {
                sent?;
                recv.await?;
                false
            }
            Either::Right((received, _)) => {
                received?;
                true
            }
        }
    };

    if peer_closed && writer.can_write() {
        writer
            .send_frame(BorrowedFrame::close(CloseCode::Normal, b""))
            .await?;
    }
    Ok(())
}

async fn echo(port: u16) -> Result<(), Error> {
    let server = WebSocketServer::bind(("0.0.0.0", port), WebSocketOptions::default()).await?;
    tracing::info!("echo server listening on {}", server.local_addr()?);

    loop {
        let handle = server.accept().await?;
        spawn(async move {
            let peer = handle.peer_addr();
            if let Err(err) = serve_echo(handle).await {
                tracing::warn!("echo to {peer} failed: {err}");
            }
        });
    }
}

/// Echo messages on one connection until it is closed.
async fn serve_echo(handle: WebSocketHandle) -> client::Result<()> {
    let mut socket = handle.accept().await?;

    while socket.can_read() {
        let frame = socket.recv().await?;
        match &frame {
            Frame::Ping(data) => socket.send_frame(BorrowedFrame::pong(data.data())).await?,
            Frame::Pong(_) => {}
            Frame::Close(code, reason) => {
                if *code == u16::from(CloseCode::NoClose) || !socket.can_write() {
                    break;
                }
                let code = if *code == u16::from(CloseCode::NoStatusCode) {
                    CloseCode::Normal.into()
                } else {
                    *code
                };
                socket
                    .send_frame(BorrowedFrame::close(code, reason.data()))
                    .await?;
            }
            message => socket.send_frame(message).await?,
        }
    }

    Ok(())
}

async fn read_file(url: &str, start: Option<u64>, end: Option<u64>) -> Result<(), Error> {
    let mut req = file::get(url);
    if let Some(start) = start {
        req.start(start);
    }
    if let Some(end) = end {
        req.end(end);
    }

    let stream = req.run().await?;
    let mut stdout = io::stdout();
    futures::io::copy(stream, &mut stdout).await?;
    stdout.flush().await?;
    Ok(())
}

#[async_std::main]
async fn main() -> Result<(), Error> {
    client::init_logging();
    let opt = Options::parse();
    env::configure(opt.env);

    match opt.command {
        Command::Get(opt) => get(opt).await,
        Command::Resolve { host } => resolve(&host).await,
        Command::Ws { url } => websocket(&url).await,
        Command::Echo { port } => echo(port).await,
        Command::File { url, start, end } => read_file(&url, start, end).await,
    }
}
