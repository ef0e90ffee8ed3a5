use crate::error::Result;
use async_std::{fs, path::Path};
use std::path::Path as StdPath;
use futures::StreamExt;
use rustls::{pki_types::CertificateDer, RootCertStore};
use std::io::ErrorKind;

async fn try_load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let data = fs::read(path).await?;
    let certs = rustls_pemfile::certs(&mut &data[..]).collect::<Result<_, _>>()?;
    Ok(certs)
}

/// Load the trusted root certificates from every PEM file in `dir`.
///
/// Subdirectories are skipped, as are files which cannot be read or parsed. If `dir` does not
/// exist, the store is empty.
pub async fn load_system_certs(dir: impl AsRef<StdPath>) -> Result<RootCertStore> {
    let dir = Path::new(dir.as_ref().as_os_str());
    let mut store = RootCertStore::empty();

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::warn!("{} not found, no root certificates loaded", dir.display());
            return Ok(store);
        }
        Err(err) => return Err(err.into()),
    };

    let mut certs = vec![];
    while let Some(entry) = entries.next().await {
        let entry = entry?;
        if entry.metadata().await?.is_dir() {
            continue;
        }

        match try_load_certs(&entry.path()).await {
            Ok(mut loaded) => certs.append(&mut loaded),
            Err(err) => tracing::trace!("skipping {}: {err}", entry.path().display()),
        }
    }

    let (added, ignored) = store.add_parsable_certificates(certs);
    tracing::debug!(
        "== Loaded {added} certificates from {} ({ignored} ignored)",
        dir.display()
    );

    Ok(store)
}
