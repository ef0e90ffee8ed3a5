//! State shared by every kind of request: the target URL, or the first error encountered while
//! building the request.

use crate::error::{Error, Result};
use std::mem::replace;
use url::Url;

/// The target of a request.
///
/// Builder methods on requests are infallible and chainable, so an error found while building a
/// request (an unparsable URL, a bad header, ...) is stored here and reported when the request is
/// finally run.
#[derive(Debug)]
pub(crate) struct RequestBase {
    url: Result<Url>,
}

impl RequestBase {
    /// Parse `url`, failing the request if its scheme is not accepted by `scheme_allowed`.
    pub(crate) fn new<F>(url: impl AsRef<str>, scheme_allowed: F) -> Self
    where
        F: FnOnce(&str) -> bool,
    {
        let mut this = Self {
            url: Url::parse(url.as_ref()).map_err(Error::from),
        };

        if let Ok(url) = &this.url {
            if !scheme_allowed(url.scheme()) {
                let scheme = url.scheme().to_string();
                this.fail(Error::InvalidScheme { scheme });
            }
        }

        this
    }

    /// Record a failure. Only the most recent failure is kept.
    pub(crate) fn fail(&mut self, error: impl Into<Error>) {
        self.url = Err(error.into());
    }

    pub(crate) fn url(&self) -> Option<&Url> {
        self.url.as_ref().ok()
    }

    /// The URL to run the request against, or the error which made the request invalid.
    ///
    /// After an error has been returned once, later calls return [`Error::InvalidRequest`].
    pub(crate) fn finalize(&mut self) -> Result<&Url> {
        if self.url.is_err() {
            let url = replace(&mut self.url, Err(Error::InvalidRequest));
            return Err(url.err().unwrap_or(Error::InvalidRequest));
        }

        self.url.as_ref().map_err(|_| Error::InvalidRequest)
    }
}

impl Clone for RequestBase {
    fn clone(&self) -> Self {
        Self {
            url: match &self.url {
                Ok(url) => Ok(url.clone()),
                Err(_) => Err(Error::InvalidRequest),
            },
        }
    }
}
