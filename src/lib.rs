pub mod config;
pub mod error;
/// Pasarela - address translation and session bootstrap for Cassandra clients behind Kubernetes ingress
///
/// Pasarela supports four connection modes:
/// 1. direct: contact points dialed as configured
/// 2. ingress: every discovered node is reached through one TCP passthrough ingress
/// 3. sni-ingress: one TLS ingress, the node picked by its host id in the SNI server name
/// 4. mtls-sni-ingress: sni-ingress with a client certificate
pub mod bootstrap;
pub mod core;
pub mod driver;
pub mod report;
pub mod routing;
pub mod tls;

use std::io::Write;

use crate::bootstrap::{SessionBootstrap, SessionPlan};
use crate::config::Config;
use crate::driver::{CqlConnector, SessionConnector};
use crate::error::PasarelaResult;

pub use crate::bootstrap::{BootstrapOutcome, ConnectionMode};
pub use crate::error::PasarelaError;

/// Main pasarela client application
pub struct Pasarela {
    bootstrap: SessionBootstrap,
    connector: Box<dyn SessionConnector>,
}

impl Pasarela {
    /// Create a client backed by the built-in CQL driver
    pub fn new(config: Config) -> Self {
        Self::with_connector(config, Box::new(CqlConnector))
    }

    pub fn with_connector(config: Config, connector: Box<dyn SessionConnector>) -> Self {
        Self {
            bootstrap: SessionBootstrap::new(config),
            connector,
        }
    }

    pub fn config(&self) -> &Config {
        self.bootstrap.config()
    }

    /// Build the session plan for `mode` without connecting
    pub fn plan(&self, mode: &str) -> PasarelaResult<SessionPlan> {
        self.bootstrap.plan(mode)
    }

    /// Bootstrap a session for `mode` and write the cluster diagnostics to `out`
    pub async fn run(&self, mode: &str, out: &mut dyn Write) -> PasarelaResult<()> {
        let session = self
            .bootstrap
            .bootstrap(mode, self.connector.as_ref())
            .await
            .into_result()?;

        report::run_diagnostics(session.as_ref(), out).await
    }
}
