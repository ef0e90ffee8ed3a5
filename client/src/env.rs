//! Process-wide state shared by all requests: the DNS resolver and the TLS client configuration.
//!
//! Both are created lazily the first time a request needs them, from the system files named in
//! [`Options`].

use crate::{dns::Resolver, error::Result, tls::certs::load_system_certs};
use async_std::sync::Mutex;
use clap::Args;
use rustls::ClientConfig;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Instant;

/// Locations of the system files used to initialize the shared environment.
#[derive(Clone, Debug, Args)]
pub struct Options {
    /// Path to the resolver configuration listing DNS name servers.
    #[clap(long, env = "FETCH_RESOLV_CONF", default_value = "/etc/resolv.conf")]
    pub resolv_conf: PathBuf,

    /// Path to the static host name table.
    #[clap(long, env = "FETCH_HOSTS", default_value = "/etc/hosts")]
    pub hosts: PathBuf,

    /// Directory of PEM files with trusted root certificates.
    #[clap(long, env = "FETCH_CERTS_DIR", default_value = "/etc/ssl/certs")]
    pub certs_dir: PathBuf,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            resolv_conf: "/etc/resolv.conf".into(),
            hosts: "/etc/hosts".into(),
            certs_dir: "/etc/ssl/certs".into(),
        }
    }
}

#[derive(Default)]
struct Shared {
    resolver: Mutex<Option<Arc<Resolver>>>,
    tls_client_config: Mutex<Option<Arc<ClientConfig>>>,
    options: RwLock<Options>,
}

fn shared() -> &'static Shared {
    static SHARED: OnceLock<Shared> = OnceLock::new();
    SHARED.get_or_init(Shared::default)
}

/// Set the file locations used to initialize the shared environment.
///
/// This only affects state which has not been initialized yet; call [`reset`] to reinitialize.
pub fn configure(options: Options) {
    match shared().options.write() {
        Ok(mut current) => *current = options,
        Err(poisoned) => *poisoned.into_inner() = options,
    }
}

/// The file locations used to initialize the shared environment.
pub fn options() -> Options {
    match shared().options.read() {
        Ok(options) => options.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// The shared DNS resolver.
pub async fn get_resolver() -> Result<Arc<Resolver>> {
    let mut resolver = shared().resolver.lock().await;
    if let Some(resolver) = &*resolver {
        return Ok(resolver.clone());
    }

    let start = Instant::now();
    tracing::debug!("++ Initializing DNS resolver");

    let options = options();
    let created = Arc::new(Resolver::load(&options.resolv_conf, &options.hosts).await?);

    tracing::debug!(
        "== Initialized DNS resolver in {:.3} ms",
        start.elapsed().as_secs_f32() * 1000.0
    );
    Ok(resolver.insert(created).clone())
}

/// The shared TLS client configuration, trusting the system root certificates.
pub async fn get_tls_client_config() -> Result<Arc<ClientConfig>> {
    let mut config = shared().tls_client_config.lock().await;
    if let Some(config) = &*config {
        return Ok(config.clone());
    }

    let start = Instant::now();
    tracing::debug!("++ Initializing TLS client configuration");

    let roots = load_system_certs(options().certs_dir).await?;
    let created = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_root_certificates(roots)
    .with_no_client_auth();

    tracing::debug!(
        "== Initialized TLS client configuration in {:.3} ms",
        start.elapsed().as_secs_f32() * 1000.0
    );
    Ok(config.insert(Arc::new(created)).clone())
}

/// Drop the shared state. It will be created again the next time it is needed.
pub async fn reset() {
    shared().resolver.lock().await.take();
    shared().tls_client_config.lock().await.take();

    tracing::debug!("-- Uninitialized shared data");
}
