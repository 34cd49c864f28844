/// Driver-facing address translation
use super::IngressRouter;
use crate::core::{Endpoint, LogicalMember, RoutingToken};
use crate::error::PasarelaResult;
use std::fmt;

/// Where to actually connect for a discovered member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedAddress {
    pub endpoint: Endpoint,
    /// Presented as the TLS server name when set
    pub server_name: Option<RoutingToken>,
}

impl fmt::Display for TranslatedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.server_name {
            Some(name) => write!(f, "{} (sni: {})", self.endpoint, name),
            None => write!(f, "{}", self.endpoint),
        }
    }
}

/// Given a member's self-reported address, the address to dial
///
/// Implementations must be pure: the driver calls them on every connection
/// attempt, possibly from several tasks at once.
pub trait AddressTranslator: Send + Sync + fmt::Debug {
    fn translate(&self, member: &LogicalMember) -> PasarelaResult<TranslatedAddress>;

    /// Release resources on session shutdown
    fn close(&self) {}
}

/// TCP passthrough ingress: every member is the ingress endpoint
#[derive(Debug, Clone)]
pub struct IngressAddressTranslator {
    ingress: Endpoint,
}

impl IngressAddressTranslator {
    pub fn new(ingress: Endpoint) -> Self {
        Self { ingress }
    }
}

impl AddressTranslator for IngressAddressTranslator {
    fn translate(&self, member: &LogicalMember) -> PasarelaResult<TranslatedAddress> {
        log::trace!("Translating {} to ingress {}", member, self.ingress);
        Ok(TranslatedAddress {
            endpoint: self.ingress.clone(),
            server_name: None,
        })
    }
}

/// SNI ingress: the ingress endpoint plus the member's host id as server name
#[derive(Debug, Clone)]
pub struct SniAddressTranslator {
    router: IngressRouter,
}

impl SniAddressTranslator {
    pub fn new(router: IngressRouter) -> Self {
        Self { router }
    }
}

impl AddressTranslator for SniAddressTranslator {
    fn translate(&self, member: &LogicalMember) -> PasarelaResult<TranslatedAddress> {
        let (endpoint, token) = self.router.resolve(member)?;
        log::trace!("Translating {} to {} with server name {}", member, endpoint, token);
        Ok(TranslatedAddress {
            endpoint,
            server_name: Some(token),
        })
    }
}
