/// Ingress routing: every member is reached through one external endpoint
///
/// A shared ingress cannot tell members apart by address, so each connection
/// carries the member's routing token as its TLS server name (SNI).
pub mod translator;

pub use translator::{
    AddressTranslator, IngressAddressTranslator, SniAddressTranslator, TranslatedAddress,
};

use crate::core::{Endpoint, LogicalMember, RoutingToken};
use crate::error::{PasarelaError, PasarelaResult};
use crate::tls::TlsSettings;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Process-wide ingress settings, immutable once built
#[derive(Debug, Clone)]
pub struct IngressConfig {
    endpoint: Endpoint,
    tokens: Vec<RoutingToken>,
    tls: TlsSettings,
}

impl IngressConfig {
    pub fn new(endpoint: Endpoint, tokens: Vec<RoutingToken>, tls: TlsSettings) -> Self {
        Self {
            endpoint,
            tokens,
            tls,
        }
    }

    /// The externally reachable ingress endpoint
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Expected routing tokens in configured order (may contain duplicates)
    pub fn tokens(&self) -> &[RoutingToken] {
        &self.tokens
    }

    pub fn tls(&self) -> &TlsSettings {
        &self.tls
    }
}

/// An endpoint to try before topology discovery has run
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContactPoint {
    pub endpoint: Endpoint,
    pub routing_token: Option<RoutingToken>,
}

impl ContactPoint {
    pub fn direct(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            routing_token: None,
        }
    }

    pub fn sni(endpoint: Endpoint, routing_token: RoutingToken) -> Self {
        Self {
            endpoint,
            routing_token: Some(routing_token),
        }
    }
}

impl fmt::Display for ContactPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.routing_token {
            Some(token) => write!(f, "{} (sni: {})", self.endpoint, token),
            None => write!(f, "{}", self.endpoint),
        }
    }
}

/// Maps members to the ingress endpoint and the token to present
///
/// Holds nothing but the shared immutable config, so it can be called from
/// any number of connection tasks without locking.
#[derive(Debug, Clone)]
pub struct IngressRouter {
    config: Arc<IngressConfig>,
}

impl IngressRouter {
    pub fn new(config: Arc<IngressConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IngressConfig {
        &self.config
    }

    /// Endpoint to dial and token to present for a member
    ///
    /// Always the ingress endpoint; the member's advertised address is never
    /// used.
    pub fn resolve(&self, member: &LogicalMember) -> PasarelaResult<(Endpoint, RoutingToken)> {
        let token = member
            .id()
            .filter(|id| !id.as_str().trim().is_empty())
            .ok_or_else(|| {
                PasarelaError::unroutable(format!(
                    "member advertised at {} has no host id",
                    member.advertised()
                ))
            })?;

        Ok((self.config.endpoint.clone(), token.clone()))
    }

    /// One contact per distinct configured token, all on the ingress endpoint
    pub fn contact_set(&self) -> HashSet<ContactPoint> {
        self.config
            .tokens
            .iter()
            .map(|token| ContactPoint::sni(self.config.endpoint.clone(), token.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingress_config(tokens: &[&str]) -> Arc<IngressConfig> {
        Arc::new(IngressConfig::new(
            Endpoint::new("traefik.k3s.local", 9042).unwrap(),
            tokens.iter().map(|t| RoutingToken::new(*t).unwrap()).collect(),
            TlsSettings::default(),
        ))
    }

    fn member(id: Option<&str>, host: &str, port: i64) -> LogicalMember {
        LogicalMember::new(
            id.map(|id| RoutingToken::new(id).unwrap()),
            Endpoint::new(host, port).unwrap(),
        )
    }

    #[test]
    fn test_resolve_returns_ingress_endpoint() {
        let router = IngressRouter::new(ingress_config(&["a"]));
        let ingress = router.config().endpoint().clone();

        let members = vec![
            member(Some("host-a"), "10.244.0.5", 9042),
            member(Some("host-b"), "10.244.1.7", 9142),
            member(Some("host-c"), "cassandra-dc1-rack1-sts-0", 19042),
        ];

        for m in &members {
            let (endpoint, token) = router.resolve(m).unwrap();
            assert_eq!(endpoint, ingress);
            assert_ne!(&endpoint, m.advertised());
            assert_eq!(Some(&token), m.id());
        }
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let router = IngressRouter::new(ingress_config(&[]));
        let m = member(Some("ec448e83-8b83-407b-b342-13ce0250001c"), "10.0.0.1", 9042);

        let first = router.resolve(&m).unwrap();
        let second = router.resolve(&m).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_rejects_unidentified_member() {
        let router = IngressRouter::new(ingress_config(&[]));
        let m = member(None, "10.0.0.1", 9042);

        let result = router.resolve(&m);
        assert!(matches!(result, Err(PasarelaError::UnroutableMember { .. })));
    }

    #[test]
    fn test_contact_set_deduplicates_tokens() {
        let router = IngressRouter::new(ingress_config(&["a", "b", "a", "c", "b"]));
        let contacts = router.contact_set();

        assert_eq!(contacts.len(), 3);
        for contact in &contacts {
            assert_eq!(&contact.endpoint, router.config().endpoint());
            assert!(contact.routing_token.is_some());
        }

        let tokens: HashSet<&str> = contacts
            .iter()
            .filter_map(|c| c.routing_token.as_ref().map(RoutingToken::as_str))
            .collect();
        assert_eq!(tokens, HashSet::from(["a", "b", "c"]));
    }

    #[test]
    fn test_contact_set_empty_without_tokens() {
        let router = IngressRouter::new(ingress_config(&[]));
        assert!(router.contact_set().is_empty());
    }

    #[test]
    fn test_contact_point_display() {
        let endpoint = Endpoint::new("traefik.k3s.local", 9042).unwrap();
        let direct = ContactPoint::direct(endpoint.clone());
        let sni = ContactPoint::sni(endpoint, RoutingToken::new("host-a").unwrap());

        assert_eq!(direct.to_string(), "traefik.k3s.local:9042");
        assert_eq!(sni.to_string(), "traefik.k3s.local:9042 (sni: host-a)");
    }

    #[test]
    fn test_router_is_shareable_across_threads() {
        let router = IngressRouter::new(ingress_config(&["a"]));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let router = router.clone();
                std::thread::spawn(move || {
                    let id = format!("host-{i}");
                    let m = member(Some(id.as_str()), "10.0.0.1", 9042);
                    router.resolve(&m).unwrap().0
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().to_string(), "traefik.k3s.local:9042");
        }
    }
}
