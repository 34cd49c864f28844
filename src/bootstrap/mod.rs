/// Session bootstrap: mode selection, contact set and translator wiring
///
/// Runs once at startup, in order:
/// `SelectMode -> BuildConfig -> BuildTlsContext? -> BuildContactSet -> BuildSession`.
/// Every failure is terminal. Nothing built before the failing stage is kept,
/// so a failed bootstrap holds no files, sockets or sessions.
use crate::config::{Config, SessionConfig};
use crate::core::{Endpoint, RoutingToken};
use crate::driver::{ClusterSession, Credentials, SessionConnector};
use crate::error::{PasarelaError, PasarelaResult};
use crate::routing::{
    AddressTranslator, ContactPoint, IngressAddressTranslator, IngressConfig, IngressRouter,
    SniAddressTranslator,
};
use crate::tls::{TlsContext, TlsSettings};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

/// How the client reaches the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionMode {
    /// Contact points dialed as configured, no translation
    Direct,
    /// TCP passthrough ingress: every member is the ingress endpoint
    Ingress,
    /// TLS ingress routing on the SNI server name
    SniIngress,
    /// SNI ingress with a client certificate
    MtlsSniIngress,
}

impl ConnectionMode {
    pub const ALL: [ConnectionMode; 4] = [
        ConnectionMode::Direct,
        ConnectionMode::Ingress,
        ConnectionMode::SniIngress,
        ConnectionMode::MtlsSniIngress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionMode::Direct => "direct",
            ConnectionMode::Ingress => "ingress",
            ConnectionMode::SniIngress => "sni-ingress",
            ConnectionMode::MtlsSniIngress => "mtls-sni-ingress",
        }
    }

    pub fn uses_ingress(&self) -> bool {
        !matches!(self, ConnectionMode::Direct)
    }

    pub fn uses_sni(&self) -> bool {
        matches!(self, ConnectionMode::SniIngress | ConnectionMode::MtlsSniIngress)
    }

    /// Lists the accepted mode names, one per line
    pub fn usage() -> String {
        let mut text = String::from("Possible options:");
        for mode in Self::ALL {
            text.push_str("\n  ");
            text.push_str(mode.as_str());
        }
        text
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionMode {
    type Err = PasarelaError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == input)
            .ok_or_else(|| PasarelaError::invalid_mode(input))
    }
}

/// Bootstrap state machine stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStage {
    SelectMode,
    BuildConfig,
    BuildTlsContext,
    BuildContactSet,
    BuildSession,
}

impl fmt::Display for BootstrapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapStage::SelectMode => "SelectMode",
            BootstrapStage::BuildConfig => "BuildConfig",
            BootstrapStage::BuildTlsContext => "BuildTlsContext",
            BootstrapStage::BuildContactSet => "BuildContactSet",
            BootstrapStage::BuildSession => "BuildSession",
        };
        f.write_str(name)
    }
}

/// Everything needed to open a session: the descriptor handed to a connector
#[derive(Debug, Clone)]
pub struct SessionPlan {
    mode: ConnectionMode,
    contact_points: Vec<ContactPoint>,
    translator: Option<Arc<dyn AddressTranslator>>,
    tls: Option<TlsContext>,
    ingress: Option<Arc<IngressConfig>>,
    session: SessionConfig,
    credentials: Option<Credentials>,
}

impl SessionPlan {
    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    /// Initial contact points, tried before discovery
    pub fn contact_points(&self) -> &[ContactPoint] {
        &self.contact_points
    }

    /// Translator for discovered members; `None` dials advertised addresses
    pub fn translator(&self) -> Option<Arc<dyn AddressTranslator>> {
        self.translator.clone()
    }

    pub fn tls(&self) -> Option<&TlsContext> {
        self.tls.as_ref()
    }

    pub fn ingress(&self) -> Option<&IngressConfig> {
        self.ingress.as_deref()
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}

impl fmt::Display for SessionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mode: {}", self.mode)?;

        if let Some(ingress) = &self.ingress {
            writeln!(f, "Ingress: {}", ingress.endpoint())?;
        }

        let translator = match self.mode {
            ConnectionMode::Direct => "none",
            ConnectionMode::Ingress => "ingress",
            ConnectionMode::SniIngress | ConnectionMode::MtlsSniIngress => "sni-ingress",
        };
        writeln!(f, "Address translator: {}", translator)?;

        match &self.tls {
            Some(tls) => {
                match tls.trust_store_path() {
                    Some(path) => writeln!(f, "TLS trust: {}", path.display())?,
                    None => writeln!(f, "TLS trust: platform roots")?,
                }
                writeln!(
                    f,
                    "TLS client identity: {}",
                    if tls.has_client_identity() { "yes" } else { "no" }
                )?;
            }
            None => writeln!(f, "TLS: disabled")?,
        }

        writeln!(f, "Contact points: {}", self.contact_points.len())?;
        for (i, contact) in self.contact_points.iter().enumerate() {
            writeln!(f, "  {}: {}", i + 1, contact)?;
        }
        Ok(())
    }
}

/// Terminal state of a bootstrap run
pub enum BootstrapOutcome {
    Ready(Box<dyn ClusterSession>),
    Failed(PasarelaError),
}

impl BootstrapOutcome {
    pub fn into_result(self) -> PasarelaResult<Box<dyn ClusterSession>> {
        match self {
            BootstrapOutcome::Ready(session) => Ok(session),
            BootstrapOutcome::Failed(e) => Err(e),
        }
    }
}

impl fmt::Debug for BootstrapOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapOutcome::Ready(_) => f.write_str("Ready(..)"),
            BootstrapOutcome::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

/// Builds session plans from one loaded configuration
#[derive(Debug, Clone)]
pub struct SessionBootstrap {
    config: Config,
}

impl SessionBootstrap {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every stage up to (not including) `BuildSession`
    pub fn plan(&self, input: &str) -> PasarelaResult<SessionPlan> {
        enter(BootstrapStage::SelectMode);
        let mode: ConnectionMode = input.parse()?;
        log::info!("Connection mode: {}", mode);

        enter(BootstrapStage::BuildConfig);
        let ingress = self.ingress_config(mode)?.map(Arc::new);
        let direct_contacts = match mode {
            ConnectionMode::Direct => self.direct_contacts()?,
            _ => Vec::new(),
        };

        let tls = if mode.uses_sni() {
            enter(BootstrapStage::BuildTlsContext);
            let settings = ingress
                .as_ref()
                .map(|ingress| ingress.tls().clone())
                .unwrap_or_default();
            let context = TlsContext::build(&settings)?;
            if mode == ConnectionMode::MtlsSniIngress && !context.has_client_identity() {
                return Err(PasarelaError::tls_init("no client identity in the key store"));
            }
            Some(context)
        } else {
            None
        };

        enter(BootstrapStage::BuildContactSet);
        let (contact_points, translator) = match (&ingress, mode) {
            (Some(ingress), ConnectionMode::Ingress) => {
                let translator: Arc<dyn AddressTranslator> =
                    Arc::new(IngressAddressTranslator::new(ingress.endpoint().clone()));
                (
                    vec![ContactPoint::direct(ingress.endpoint().clone())],
                    Some(translator),
                )
            }
            (Some(ingress), _) => {
                let router = IngressRouter::new(ingress.clone());
                let mut contacts: Vec<ContactPoint> = router.contact_set().into_iter().collect();
                contacts.sort_by(|a, b| a.routing_token.cmp(&b.routing_token));
                let translator: Arc<dyn AddressTranslator> =
                    Arc::new(SniAddressTranslator::new(router));
                (contacts, Some(translator))
            }
            (None, _) => (direct_contacts, None),
        };
        log::debug!("{} contact point(s) for {} mode", contact_points.len(), mode);

        Ok(SessionPlan {
            mode,
            contact_points,
            translator,
            tls,
            ingress,
            session: self.config.session.clone(),
            credentials: self
                .config
                .auth
                .as_ref()
                .map(|auth| Credentials::new(auth.username.clone(), auth.password.clone())),
        })
    }

    /// Plan, then hand the plan to `connector`
    pub async fn bootstrap(&self, input: &str, connector: &dyn SessionConnector) -> BootstrapOutcome {
        let plan = match self.plan(input) {
            Ok(plan) => plan,
            Err(e) => return failed(e),
        };

        enter(BootstrapStage::BuildSession);
        match connector.connect(&plan).await {
            Ok(session) => {
                log::info!("Session ready in {} mode", plan.mode());
                BootstrapOutcome::Ready(session)
            }
            Err(e) => failed(e),
        }
    }

    fn ingress_config(&self, mode: ConnectionMode) -> PasarelaResult<Option<IngressConfig>> {
        if !mode.uses_ingress() {
            return Ok(None);
        }

        let section = self.config.ingress.clone().unwrap_or_default();
        let address = section
            .address
            .filter(|address| !address.trim().is_empty())
            .ok_or_else(|| PasarelaError::config_missing("ingress.address", mode.as_str()))?;
        let port = section
            .port
            .ok_or_else(|| PasarelaError::config_missing("ingress.port", mode.as_str()))?;

        let mut tokens = Vec::new();
        if mode.uses_sni() {
            if section.endpoints.is_empty() {
                return Err(PasarelaError::config_missing("ingress.endpoints", mode.as_str()));
            }
            for endpoint in &section.endpoints {
                tokens.push(RoutingToken::new(endpoint.as_str())?);
            }
        }

        let tls = &self.config.tls;
        if mode == ConnectionMode::MtlsSniIngress {
            if tls.keystore_path().is_none() {
                return Err(PasarelaError::config_missing("tls.keystore.path", mode.as_str()));
            }
            if tls.truststore_path().is_none() {
                return Err(PasarelaError::config_missing("tls.truststore.path", mode.as_str()));
            }
        }

        let endpoint = Endpoint::new(address, port)?;
        Ok(Some(IngressConfig::new(
            endpoint,
            tokens,
            TlsSettings::from_section(tls),
        )))
    }

    fn direct_contacts(&self) -> PasarelaResult<Vec<ContactPoint>> {
        let session = &self.config.session;
        if session.contact_points.is_empty() {
            return Err(PasarelaError::config_missing("session.contact_points", "direct"));
        }

        session
            .contact_points
            .iter()
            .map(|contact| -> PasarelaResult<ContactPoint> {
                // a bare IP literal (including IPv6) takes the native port
                let bare = contact.trim().parse::<IpAddr>().is_ok() || !contact.contains(':');
                let endpoint = if bare {
                    Endpoint::new(contact.trim(), i64::from(session.native_port))?
                } else {
                    Endpoint::parse(contact)?
                };
                Ok(ContactPoint::direct(endpoint))
            })
            .collect()
    }
}

fn enter(stage: BootstrapStage) {
    log::debug!("Bootstrap stage: {}", stage);
}

fn failed(e: PasarelaError) -> BootstrapOutcome {
    log::error!("Bootstrap failed: {}", e);
    BootstrapOutcome::Failed(e)
}
