/// Cluster members as seen by the client
use super::{Endpoint, RoutingToken};
use std::fmt;
use std::sync::Arc;

/// A cluster member as reported by discovery
///
/// The advertised endpoint is whatever the member reports about itself and
/// may be unroutable from the client's network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalMember {
    id: Option<RoutingToken>,
    advertised: Endpoint,
    datacenter: Option<String>,
    rack: Option<String>,
}

impl LogicalMember {
    pub fn new(id: Option<RoutingToken>, advertised: Endpoint) -> Self {
        Self {
            id,
            advertised,
            datacenter: None,
            rack: None,
        }
    }

    /// Attach datacenter and rack labels
    pub fn with_location(mut self, datacenter: Option<String>, rack: Option<String>) -> Self {
        self.datacenter = datacenter;
        self.rack = rack;
        self
    }

    pub fn id(&self) -> Option<&RoutingToken> {
        self.id.as_ref()
    }

    pub fn advertised(&self) -> &Endpoint {
        &self.advertised
    }

    pub fn datacenter(&self) -> Option<&str> {
        self.datacenter.as_deref()
    }

    pub fn rack(&self) -> Option<&str> {
        self.rack.as_deref()
    }
}

impl fmt::Display for LogicalMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} ({})", id, self.advertised),
            None => write!(f, "<unidentified> ({})", self.advertised),
        }
    }
}

/// Immutable snapshot of the discovered cluster
///
/// Each refresh builds a new snapshot; members are never edited in place.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    members: Arc<[LogicalMember]>,
}

impl Topology {
    pub fn new(members: Vec<LogicalMember>) -> Self {
        Self {
            members: members.into(),
        }
    }

    pub fn members(&self) -> &[LogicalMember] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Find a member by its routing identifier
    pub fn find(&self, id: &RoutingToken) -> Option<&LogicalMember> {
        self.members.iter().find(|m| m.id() == Some(id))
    }

    /// Members of `self` whose identifiers are absent from `previous`
    pub fn added_since<'a>(&'a self, previous: &Topology) -> Vec<&'a LogicalMember> {
        self.members
            .iter()
            .filter(|m| match m.id() {
                Some(id) => previous.find(id).is_none(),
                None => !previous.members().contains(m),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, host: &str) -> LogicalMember {
        LogicalMember::new(
            Some(RoutingToken::new(id).unwrap()),
            Endpoint::new(host, 9042).unwrap(),
        )
    }

    #[test]
    fn test_member_accessors() {
        let m = member("host-a", "10.244.0.5")
            .with_location(Some("dc1".to_string()), Some("rack1".to_string()));

        assert_eq!(m.id().unwrap().as_str(), "host-a");
        assert_eq!(m.advertised().to_string(), "10.244.0.5:9042");
        assert_eq!(m.datacenter(), Some("dc1"));
        assert_eq!(m.rack(), Some("rack1"));
        assert_eq!(m.to_string(), "host-a (10.244.0.5:9042)");
    }

    #[test]
    fn test_unidentified_member_display() {
        let m = LogicalMember::new(None, Endpoint::new("10.244.0.9", 9042).unwrap());
        assert_eq!(m.to_string(), "<unidentified> (10.244.0.9:9042)");
    }

    #[test]
    fn test_topology_lookup_and_diff() {
        let old = Topology::new(vec![member("a", "10.0.0.1"), member("b", "10.0.0.2")]);
        let new = Topology::new(vec![
            member("a", "10.0.0.1"),
            member("b", "10.0.0.2"),
            member("c", "10.0.0.3"),
        ]);

        assert_eq!(new.len(), 3);
        assert!(new.find(&RoutingToken::new("c").unwrap()).is_some());
        assert!(old.find(&RoutingToken::new("c").unwrap()).is_none());

        let added = new.added_since(&old);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].id().unwrap().as_str(), "c");

        assert!(Topology::default().is_empty());
    }
}
