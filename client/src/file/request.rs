use super::FileStream;
use crate::{
    error::{Error, Result},
    request::RequestBase,
};
use url::Url;

/// A request to read a local file.
#[derive(Clone, Debug)]
pub struct FileRequest {
    base: RequestBase,
    start: Option<u64>,
    end: Option<u64>,
}

impl FileRequest {
    pub fn url(&self) -> Option<&Url> {
        self.base.url()
    }

    /// Start reading at byte `start` instead of the beginning of the file.
    pub fn start(&mut self, start: u64) -> &mut Self {
        self.start = Some(start);
        self
    }

    /// Stop reading at byte `end` (exclusive) instead of the end of the file.
    pub fn end(&mut self, end: u64) -> &mut Self {
        self.end = Some(end);
        self
    }

    pub async fn run(&mut self) -> Result<FileStream> {
        let url = self.base.finalize()?;
        let path = url.to_file_path().map_err(|_| Error::InvalidRequest)?;
        tracing::debug!("== Opening '{}'", path.display());

        FileStream::open(&path, self.start, self.end).await
    }
}

/// Start building a request for a `file` URL.
pub fn get(url: impl AsRef<str>) -> FileRequest {
    FileRequest {
        base: RequestBase::new(url, |scheme| scheme == "file"),
        start: None,
        end: None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[async_std::test]
    async fn test_invalid_scheme() {
        let err = get("http://example.com/file.txt").run().await.unwrap_err();
        assert!(
            matches!(&err, Error::InvalidScheme { scheme } if scheme == "http"),
            "{err}"
        );
    }

    #[async_std::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::from_file_path(dir.path().join("missing")).unwrap();

        let err = get(url).run().await.unwrap_err();
        assert!(
            matches!(&err, Error::Io { source } if source.kind() == std::io::ErrorKind::NotFound),
            "{err}"
        );
    }
}
