//! The HTTP/1.x exchange: connect, send the request, parse the response head and follow
//! redirects.

use super::{HttpConn, HttpError, HttpRequest, Payload, Stats, Version};
use crate::{
    env::get_resolver,
    error::{Error, Result},
    net::{BufStream, Conn, ConnectOptions},
    tls::TlsConn,
};
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use http::{
    header::{self, HeaderName, HeaderValue},
    HeaderMap, StatusCode,
};
use memchr::memchr;
use std::io;
use std::str::{from_utf8, FromStr};
use std::time::Instant;
use url::{Host, Position, Url};

/// Size of the chunks a streamed payload is sent in.
const CHUNK_SIZE: usize = 16 * 1024;

/// The status line and headers of a response.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub(crate) stats: Stats,
    pub(crate) version: Version,
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    /// The final URL, if redirects were followed.
    pub(crate) url: Option<Url>,
}

/// The name to resolve for `url`, without the brackets around IPv6 literals.
fn host_name(url: &Url) -> Result<String> {
    match url.host() {
        Some(Host::Domain(domain)) => Ok(domain.to_string()),
        Some(Host::Ipv4(ip)) => Ok(ip.to_string()),
        Some(Host::Ipv6(ip)) => Ok(ip.to_string()),
        None => Err(Error::InvalidRequest),
    }
}

/// The value of the `Host` header for `url`.
fn host_header(url: &Url) -> Result<HeaderValue> {
    let host = url.host_str().ok_or(Error::InvalidRequest)?;
    let value = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Ok(HeaderValue::try_from(value)?)
}

async fn connect(request: &HttpRequest, url: &Url) -> Result<(HttpConn, Stats)> {
    let host = host_name(url)?;
    let resolver = match &request.options.resolver {
        Some(resolver) => resolver.clone(),
        None => get_resolver().await?,
    };

    let mut options =
        ConnectOptions::with_resolver(resolver, &host, url.port().unwrap_or(request.options.port));
    options
        .set_strategy(request.options.strategy)
        .set_timeout(request.options.timeout)
        .set_tcp_nodelay(true);

    if options.port() == 0 {
        let default = if request.options.secure { 443 } else { 80 };
        options.set_port(default);
        tracing::debug!("== Using default port {default}");
    }

    if request.options.secure {
        let (conn, stats) = TlsConn::connect_stats(&options).await?;
        Ok((Box::new(conn), stats.into()))
    } else {
        let (conn, stats) = Conn::connect_stats(&options).await?;
        Ok((Box::new(conn), stats.into()))
    }
}

/// Serialize the request line and headers.
fn request_head(
    request: &HttpRequest,
    version: Version,
    url: &Url,
    extra: &[(HeaderName, HeaderValue)],
) -> Vec<u8> {
    let path = &url[Position::BeforePath..Position::AfterQuery];
    let mut head = Vec::new();

    let line = match version {
        Version::Http09 => format!("{} {path}", request.method),
        version => format!("{} {path} {}", request.method, version.as_str()),
    };
    tracing::trace!("<< {line}");
    head.extend_from_slice(line.as_bytes());
    head.extend_from_slice(b"\r\n");

    let headers = request.headers.iter().chain(extra.iter().map(|(k, v)| (k, v)));
    for (key, value) in headers {
        tracing::trace!("<< {}: {}", key, value.to_str().unwrap_or("<binary>"));
        head.extend_from_slice(key.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }

    head.extend_from_slice(b"\r\n");
    head
}

async fn send_chunked<W, R>(writer: &mut W, reader: &mut R) -> Result<()>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = reader.read(&mut buf).await?;
        writer.write_all(format!("{read:x}\r\n").as_bytes()).await?;
        if read == 0 {
            writer.write_all(b"\r\n").await?;
            return Ok(());
        }
        writer.write_all(&buf[..read]).await?;
        writer.write_all(b"\r\n").await?;
    }
}

async fn send_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    request: &HttpRequest,
    version: Version,
    url: &Url,
    payload: &mut Option<Payload>,
) -> Result<()> {
    let mut extra = vec![];
    let chunked = match payload {
        Some(Payload::Bytes(bytes)) => {
            if !request.headers.contains_key(header::CONTENT_LENGTH) {
                extra.push((header::CONTENT_LENGTH, HeaderValue::from(bytes.len())));
            }
            false
        }
        Some(Payload::Stream(_)) => {
            let chunked = !request.headers.contains_key(header::CONTENT_LENGTH);
            if chunked && !request.headers.contains_key(header::TRANSFER_ENCODING) {
                extra.push((
                    header::TRANSFER_ENCODING,
                    HeaderValue::from_static("chunked"),
                ));
            }
            chunked
        }
        None => false,
    };

    writer
        .write_all(&request_head(request, version, url, &extra))
        .await?;

    match payload {
        Some(Payload::Bytes(bytes)) => writer.write_all(bytes).await?,
        Some(Payload::Stream(stream)) if chunked => send_chunked(writer, stream).await?,
        Some(Payload::Stream(stream)) => {
            futures::io::copy(stream, writer).await?;
        }
        None => (),
    }

    writer.flush().await?;
    Ok(())
}

/// Find the next line in the buffer, reading more as needed, without consuming it.
///
/// Returns the line without its line ending, and the number of bytes it occupies in the buffer.
pub(crate) async fn read_line_in_place<S: AsyncRead + Unpin>(
    reader: &mut BufStream<S>,
) -> Result<(&str, usize)> {
    let mut offset = 0;

    loop {
        let available = reader.buffer();
        match memchr(b'\n', &available[offset..]) {
            Some(index) => {
                offset += index + 1;
                break;
            }
            None => offset = available.len(),
        }

        if reader.fill().await? != 0 {
            continue;
        }

        return if offset == reader.capacity() {
            Err(HttpError::HeadersTooLong.into())
        } else {
            Err(io::Error::from(io::ErrorKind::UnexpectedEof).into())
        };
    }

    let line = from_utf8(&reader.buffer()[..offset])?;
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);

    Ok((line, offset))
}

/// Parse `HTTP/x.y`.
pub fn parse_version(version: &str) -> Option<Version> {
    let bytes = version.as_bytes();
    if bytes.len() != "HTTP/0.0".len() || !version.starts_with("HTTP/") || bytes[6] != b'.' {
        return None;
    }

    let major = (bytes[5] as char).to_digit(10)?;
    let minor = (bytes[7] as char).to_digit(10)?;
    Version::from_digits(major, minor)
}

/// Parse `HTTP/x.y CODE [reason]`.
pub fn parse_status_line(line: &str) -> Option<(Version, StatusCode)> {
    let mut split = line.split(' ');
    let version = parse_version(split.next()?)?;
    let status = StatusCode::from_str(split.next()?).ok()?;
    Some((version, status))
}

/// Read one header line. Returns [`None`] at the empty line ending the headers.
pub(crate) async fn read_header_line<S: AsyncRead + Unpin>(
    reader: &mut BufStream<S>,
) -> Result<Option<(HeaderName, HeaderValue, usize)>> {
    let (line, offset) = read_line_in_place(reader).await?;

    let header = if line.is_empty() {
        None
    } else {
        let (key, value) = match line.split_once(':') {
            Some((key, value)) => (key, value.trim()),
            None => {
                tracing::warn!("== Header separator not found");
                (line, "")
            }
        };

        let key = HeaderName::from_str(key.trim()).map_err(HttpError::from)?;
        let value = HeaderValue::from_bytes(value.as_bytes()).map_err(HttpError::from)?;
        Some((key, value, offset))
    };

    reader.consume(offset);
    Ok(header)
}

/// Read header lines until the empty line, failing if they take more than `size_limit` bytes.
pub(crate) async fn read_headers_limited<S: AsyncRead + Unpin>(
    reader: &mut BufStream<S>,
    headers: &mut HeaderMap,
    mut size_limit: usize,
) -> Result<()> {
    while let Some((key, value, read)) = read_header_line(reader).await? {
        size_limit = size_limit
            .checked_sub(read)
            .ok_or(HttpError::HeadersTooLong)?;

        match value.to_str() {
            Ok(value) => tracing::trace!(">> {key}: {value}"),
            Err(_) => tracing::trace!(">> {key}: {value:?}"),
        }

        headers.append(key, value);
    }

    Ok(())
}

async fn parse_response<S: AsyncRead + Unpin>(
    reader: &mut BufStream<S>,
    request: &HttpRequest,
    headers: &mut HeaderMap,
) -> Result<(StatusCode, Version)> {
    const PREFIX: &[u8] = b"HTTP/";

    while reader.buffer().len() < PREFIX.len() {
        if reader.fill().await? == 0 {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
    }

    let mut total_size = 0;
    let (version, status) = if reader.buffer().starts_with(PREFIX) {
        let (line, offset) = read_line_in_place(reader).await?;
        let parsed = parse_status_line(line).ok_or_else(|| HttpError::InvalidStatusLine {
            line: line.to_string(),
        });

        total_size += offset;
        reader.consume(offset);
        parsed?
    } else {
        tracing::warn!("Invalid status line, assuming HTTP 0.9");
        (Version::Http09, StatusCode::OK)
    };

    tracing::trace!(">> {} {status}", version.as_str());

    if version < request.options.min_version || version > request.options.max_version {
        return Err(HttpError::UnexpectedVersion { version }.into());
    }
    if version == Version::Http09 {
        return Ok((status, version));
    }

    let limit = request
        .options
        .maximum_header_size
        .checked_sub(total_size)
        .ok_or(HttpError::HeadersTooLong)?;
    read_headers_limited(reader, headers, limit).await?;

    Ok((status, version))
}

/// Run `request`, following redirects, and return the final response head with the connection
/// positioned at the start of the body.
pub(crate) async fn transfer(
    request: &mut HttpRequest,
) -> Result<(RawResponse, BufStream<HttpConn>)> {
    let version = Version::Http11;
    let original = request.base.finalize()?.clone();
    let user_host = request.headers.contains_key(header::HOST);

    let mut payload = request.payload.take();
    let mut url = original.clone();
    let mut redirected = false;
    let mut redirects_remaining = request.options.follow_redirect;
    let start = Instant::now();

    loop {
        tracing::debug!("== Starting request for '{url}'");

        if !user_host {
            request.headers.insert(header::HOST, host_header(&url)?);
        }

        let redirect_time = redirected.then(|| start.elapsed());
        let (conn, mut stats) = connect(request, &url).await?;
        stats.redirect = redirect_time;

        let mut reader = BufStream::new(conn);
        let sent = Instant::now();
        send_request(reader.get_mut(), request, version, &url, &mut payload).await?;
        stats.stall = sent.elapsed();

        let wait = Instant::now();
        reader.fill().await?;
        stats.wait = wait.elapsed();

        let mut headers = HeaderMap::new();
        let (status, version) = parse_response(&mut reader, request, &mut headers).await?;
        stats.response = wait.elapsed();

        if redirects_remaining > 0 && status.is_redirection() {
            if let Some(location) = headers.get(header::LOCATION) {
                redirects_remaining -= 1;

                let location = location.to_str().map_err(|_| Error::InvalidRedirectUrl {
                    location: String::from_utf8_lossy(location.as_bytes()).into_owned(),
                })?;
                let next = url.join(location).map_err(|_| Error::InvalidRedirectUrl {
                    location: location.to_string(),
                })?;
                if next.scheme() != original.scheme() {
                    return Err(Error::RedirectForbidden {
                        scheme: next.scheme().to_string(),
                    });
                }

                tracing::debug!("== Redirected to '{next}' ({status})");

                // A streamed payload cannot be sent again.
                if matches!(payload, Some(Payload::Stream(_))) {
                    payload = None;
                }
                url = next;
                redirected = true;
                continue;
            }
        }

        request.payload = payload;
        let response = RawResponse {
            stats,
            version,
            status,
            headers,
            url: redirected.then_some(url),
        };
        return Ok((response, reader));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::io::Cursor;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("HTTP/1.1"), Some(Version::Http11));
        assert_eq!(parse_version("HTTP/1.0"), Some(Version::Http10));
        assert_eq!(parse_version("HTTP/2.0"), Some(Version::Http20));
        assert_eq!(parse_version("HTTP/1.2"), None);
        assert_eq!(parse_version("HTTP/1"), None);
        assert_eq!(parse_version("HTTX/1.1"), None);
        assert_eq!(parse_version("HTTP/a.1"), None);
    }

    #[test]
    fn test_parse_status_line() {
        assert_eq!(
            parse_status_line("HTTP/1.1 404 Not Found"),
            Some((Version::Http11, StatusCode::NOT_FOUND))
        );
        assert_eq!(
            parse_status_line("HTTP/1.0 200"),
            Some((Version::Http10, StatusCode::OK))
        );
        assert_eq!(parse_status_line("HTTP/1.1"), None);
        assert_eq!(parse_status_line("HTTP/1.1 abc OK"), None);
    }

    #[async_std::test]
    async fn test_read_headers() {
        let data = b"Content-Type: text/plain\r\nX-Empty\r\nSet-Cookie: a=1\r\nset-cookie: b=2\r\n\r\nbody";
        let mut reader = BufStream::new(Cursor::new(data.to_vec()));
        let mut headers = HeaderMap::new();
        read_headers_limited(&mut reader, &mut headers, 1024)
            .await
            .unwrap();

        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/plain");
        assert_eq!(headers.get("x-empty").unwrap(), "");
        assert_eq!(headers.get_all(header::SET_COOKIE).iter().count(), 2);
        assert_eq!(reader.buffer(), b"body");
    }

    #[async_std::test]
    async fn test_headers_over_limit() {
        let data = b"X-Long: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n\r\n";
        let mut reader = BufStream::new(Cursor::new(data.to_vec()));
        let err = read_headers_limited(&mut reader, &mut HeaderMap::new(), 16)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Http {
                source: HttpError::HeadersTooLong
            }
        ));
    }

    #[async_std::test]
    async fn test_line_longer_than_buffer() {
        let data = vec![b'a'; 64];
        let mut reader = BufStream::with_capacity(16, Cursor::new(data));
        let err = read_line_in_place(&mut reader).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Http {
                source: HttpError::HeadersTooLong
            }
        ));
    }

    #[async_std::test]
    async fn test_eof_in_headers() {
        let mut reader = BufStream::new(Cursor::new(b"X-Partial: 1".to_vec()));
        let err = read_headers_limited(&mut reader, &mut HeaderMap::new(), 1024)
            .await
            .unwrap_err();
        assert!(err.is_eof(), "{err}");
    }

    #[test]
    fn test_host_header() {
        let url = Url::parse("http://example.com/a").unwrap();
        assert_eq!(host_header(&url).unwrap(), "example.com");

        let url = Url::parse("http://example.com:80/a").unwrap();
        assert_eq!(host_header(&url).unwrap(), "example.com");

        let url = Url::parse("http://[::1]:8080/").unwrap();
        assert_eq!(host_header(&url).unwrap(), "[::1]:8080");
        assert_eq!(host_name(&url).unwrap(), "::1");
    }

    #[test]
    fn test_request_head() {
        let mut request = crate::http::post("http://example.com/a/b?c=d#frag");
        request.header("x-test", "1");
        let url = request.url().unwrap().clone();
        let extra = [(header::CONTENT_LENGTH, HeaderValue::from(3usize))];

        let head = request_head(&request, Version::Http11, &url, &extra);
        assert_eq!(
            head,
            b"POST /a/b?c=d HTTP/1.1\r\nx-test: 1\r\ncontent-length: 3\r\n\r\n"
        );

        let head = request_head(&request, Version::Http09, &url, &[]);
        assert!(head.starts_with(b"POST /a/b?c=d\r\n"));
    }
}
