use super::{transfer, Payload, Response, Version};
use crate::{dns::Resolver, error::Result, net::IpStrategy, request::RequestBase};
use http::{
    header::{HeaderName, HeaderValue},
    HeaderMap, Method,
};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const DEFAULT_MAXIMUM_HEADER_SIZE: usize = 128 * 1024;

/// Connection and protocol settings for a request.
#[derive(Clone)]
pub struct Options {
    /// Port to connect to when the URL has none; 0 selects 80 or 443.
    pub port: u16,
    pub strategy: IpStrategy,
    pub timeout: Option<Duration>,
    pub secure: bool,
    /// Resolver to use instead of the shared one.
    pub resolver: Option<Arc<Resolver>>,

    pub min_version: Version,
    pub max_version: Version,
    pub follow_redirect: u32,
    pub maximum_header_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            port: 0,
            strategy: IpStrategy::Default,
            timeout: None,
            secure: false,
            resolver: None,

            min_version: Version::Http10,
            max_version: Version::Http11,
            follow_redirect: 5,
            maximum_header_size: DEFAULT_MAXIMUM_HEADER_SIZE,
        }
    }
}

/// An HTTP request under construction.
///
/// Setters never fail; an invalid header is remembered and reported by [`run`](Self::run).
pub struct HttpRequest {
    pub(crate) base: RequestBase,
    pub(crate) options: Options,
    pub(crate) method: Method,
    pub(crate) headers: HeaderMap,
    pub(crate) payload: Option<Payload>,
}

impl HttpRequest {
    pub(crate) fn new(base: RequestBase, method: Method) -> Self {
        Self {
            base,
            options: Options::default(),
            method,
            headers: HeaderMap::new(),
            payload: None,
        }
    }

    /// The target URL, if the request is valid.
    pub fn url(&self) -> Option<&Url> {
        self.base.url()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Set a header, replacing any previous value.
    pub fn header<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: TryInto<HeaderName>,
        K::Error: Into<crate::Error>,
        V: TryInto<HeaderValue>,
        V::Error: Into<crate::Error>,
    {
        match (key.try_into(), value.try_into()) {
            (Ok(key), Ok(value)) => {
                self.headers.insert(key, value);
            }
            (Err(err), _) => self.base.fail(err),
            (_, Err(err)) => self.base.fail(err),
        }
        self
    }

    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.options.port = port;
        self
    }

    pub fn set_strategy(&mut self, strategy: IpStrategy) -> &mut Self {
        self.options.strategy = strategy;
        self
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Follow at most `count` redirects; 0 returns redirect responses as they are.
    pub fn set_follow_redirect(&mut self, count: u32) -> &mut Self {
        self.options.follow_redirect = count;
        self
    }

    pub fn set_max_header_size(&mut self, size: usize) -> &mut Self {
        self.options.maximum_header_size = size;
        self
    }

    /// Accept responses with versions in `min..=max`.
    pub fn set_version_range(&mut self, min: Version, max: Version) -> &mut Self {
        self.options.min_version = min;
        self.options.max_version = max;
        self
    }

    pub fn set_resolver(&mut self, resolver: Arc<Resolver>) -> &mut Self {
        self.options.resolver = Some(resolver);
        self
    }

    pub fn payload(&mut self, payload: impl Into<Payload>) -> &mut Self {
        self.payload = Some(payload.into());
        self
    }

    /// Send the request and read the response headers.
    ///
    /// A streamed payload is consumed by the first run.
    pub async fn run(&mut self) -> Result<Response> {
        let (raw, reader) = transfer::transfer(self).await?;
        Response::new(raw, reader, &self.method)
    }
}

/// Start building a request with an arbitrary method.
pub fn request(method: Method, url: impl AsRef<str>) -> HttpRequest {
    let mut secure = false;
    let base = RequestBase::new(url, |scheme| match scheme {
        "http" => true,
        "https" => {
            secure = true;
            true
        }
        _ => false,
    });

    let mut request = HttpRequest::new(base, method);
    request.options.secure = secure;
    request
}

pub fn get(url: impl AsRef<str>) -> HttpRequest {
    request(Method::GET, url)
}

pub fn head(url: impl AsRef<str>) -> HttpRequest {
    request(Method::HEAD, url)
}

pub fn post(url: impl AsRef<str>) -> HttpRequest {
    request(Method::POST, url)
}

pub fn put(url: impl AsRef<str>) -> HttpRequest {
    request(Method::PUT, url)
}

pub fn delete(url: impl AsRef<str>) -> HttpRequest {
    request(Method::DELETE, url)
}
