/// Cluster session collaborator
///
/// The bootstrap layer only sees `SessionConnector` and `ClusterSession`; the
/// CQL implementation behind them dials every discovered node through the
/// plan's address translator.
pub mod balancer;
pub mod connection;
pub mod cql;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use balancer::{CoordinatorPolicy, RoundRobin};
pub use connection::{ConnectOptions, Credentials, NodeConnection};
pub use cql::{CqlValue, Row};
pub use session::{CqlConnector, CqlSession};

use crate::bootstrap::SessionPlan;
use crate::core::Endpoint;
use crate::error::PasarelaResult;
use async_trait::async_trait;
use std::fmt;

/// A node as known to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub datacenter: Option<String>,
    pub rack: Option<String>,
    pub host_id: Option<String>,
    /// Address the node advertises about itself
    pub endpoint: Endpoint,
    /// Whether the session holds an open connection to it
    pub connected: bool,
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.datacenter.as_deref().unwrap_or("null"),
            self.rack.as_deref().unwrap_or("null"),
            self.host_id.as_deref().unwrap_or("null")
        )
    }
}

/// Rows of a query plus the node that coordinated it
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub coordinator: NodeInfo,
    pub rows: Vec<Row>,
}

/// An established cluster session
#[async_trait]
pub trait ClusterSession: Send + Sync {
    /// Every node discovered so far, connected or not
    async fn nodes(&self) -> Vec<NodeInfo>;

    async fn execute(&self, query: &str) -> PasarelaResult<QueryResult>;

    /// Close all connections; further requests fail
    async fn close(&self);
}

/// Builds a session from a bootstrap plan
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, plan: &SessionPlan) -> PasarelaResult<Box<dyn ClusterSession>>;
}
