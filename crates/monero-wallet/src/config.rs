//! Per-process library initialization.

use std::sync::OnceLock;
use std::time::Duration;

/// Process-wide defaults, fixed by the first call to [`init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryConfig {
    /// Default `env_logger` filter when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Per-call HTTP timeout for clients built from a bare URL.
    pub rpc_timeout: Duration,
    /// Background sync period of in-process wallets.
    pub sync_interval: Duration,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            log_filter: "warn".to_string(),
            rpc_timeout: Duration::from_secs(30),
            sync_interval: Duration::from_secs(10),
        }
    }
}

static CONFIG: OnceLock<LibraryConfig> = OnceLock::new();

/// Install the logger and record `config`. Later calls change nothing and
/// return the configuration of the first call.
pub fn init(config: &LibraryConfig) -> &'static LibraryConfig {
    CONFIG.get_or_init(|| {
        let env = env_logger::Env::default().default_filter_or(config.log_filter.as_str());
        // Another logger may already be installed by the host program.
        if env_logger::Builder::from_env(env).try_init().is_err() {
            log::debug!("logger already installed");
        }
        config.clone()
    })
}

/// The active configuration; defaults when [`init`] was never called.
pub fn library_config() -> LibraryConfig {
    CONFIG.get().cloned().unwrap_or_default()
}
