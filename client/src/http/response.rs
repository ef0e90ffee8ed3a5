use super::{transfer::RawResponse, Body, HttpConn, Stats, Version};
use crate::{error::Result, net::BufStream};
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use url::Url;

/// A response whose headers have been read. The body is read on demand.
pub struct Response {
    raw: RawResponse,
    body: Body,
}

impl Response {
    pub(crate) fn new(raw: RawResponse, reader: BufStream<HttpConn>, method: &Method) -> Result<Self> {
        let body = Body::new(reader, method, &raw)?;
        Ok(Self { raw, body })
    }

    pub fn stats(&self) -> &Stats {
        &self.raw.stats
    }

    pub fn version(&self) -> Version {
        self.raw.version
    }

    pub fn status(&self) -> StatusCode {
        self.raw.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.raw.headers
    }

    /// The URL the response came from, if it differs from the request's.
    pub fn url(&self) -> Option<&Url> {
        self.raw.url.as_ref()
    }

    pub fn body(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    pub async fn bytes(&mut self) -> Result<Vec<u8>> {
        self.body.bytes().await
    }

    pub async fn text(&mut self) -> Result<String> {
        self.body.text().await
    }

    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.body.json().await
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("version", &self.raw.version)
            .field("status", &self.raw.status)
            .field("headers", &self.raw.headers)
            .field("url", &self.raw.url)
            .finish()
    }
}
