/// CQL cluster session: control connection, discovery and node connections
use super::balancer::{CoordinatorPolicy, RoundRobin};
use super::connection::{ConnectOptions, NodeConnection};
use super::cql::{ResultBody, Row};
use super::{ClusterSession, NodeInfo, QueryResult, SessionConnector};
use crate::bootstrap::SessionPlan;
use crate::core::{Endpoint, LogicalMember, RoutingToken, Topology};
use crate::error::{CqlError, PasarelaError, PasarelaResult};
use crate::routing::{AddressTranslator, ContactPoint, TranslatedAddress};
use async_trait::async_trait;
use futures::future::join_all;
use rand::seq::SliceRandom;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

const LOCAL_QUERY: &str =
    "SELECT host_id, data_center, rack, rpc_address FROM system.local WHERE key='local'";
const PEERS_QUERY: &str = "SELECT peer, rpc_address, host_id, data_center, rack FROM system.peers";

/// Default connector: opens a `CqlSession` for the plan
#[derive(Debug, Default, Clone, Copy)]
pub struct CqlConnector;

#[async_trait]
impl SessionConnector for CqlConnector {
    async fn connect(&self, plan: &SessionPlan) -> PasarelaResult<Box<dyn ClusterSession>> {
        let session = CqlSession::connect(plan).await?;
        Ok(Box::new(session))
    }
}

struct Node {
    member: LogicalMember,
    connection: Option<Arc<Mutex<NodeConnection>>>,
}

impl Node {
    fn info(&self) -> NodeInfo {
        NodeInfo {
            datacenter: self.member.datacenter().map(str::to_string),
            rack: self.member.rack().map(str::to_string),
            host_id: self.member.id().map(|id| id.as_str().to_string()),
            endpoint: self.member.advertised().clone(),
            connected: self.connection.is_some(),
        }
    }

    fn same_member(&self, member: &LogicalMember) -> bool {
        match (self.member.id(), member.id()) {
            (Some(a), Some(b)) => a == b,
            _ => &self.member == member,
        }
    }
}

pub struct CqlSession {
    translator: Option<Arc<dyn AddressTranslator>>,
    options: ConnectOptions,
    native_port: u16,
    control: Arc<Mutex<NodeConnection>>,
    control_endpoint: Endpoint,
    topology: RwLock<Arc<Topology>>,
    nodes: RwLock<Vec<Arc<Node>>>,
    policy: Box<dyn CoordinatorPolicy>,
    closed: AtomicBool,
}

impl CqlSession {
    /// Connect to the first reachable contact point, then discover the cluster
    pub async fn connect(plan: &SessionPlan) -> PasarelaResult<Self> {
        let settings = plan.session();
        let options = ConnectOptions {
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            request_timeout: Duration::from_millis(settings.request_timeout_ms),
            tls: plan.tls().cloned(),
            credentials: plan.credentials().cloned(),
        };

        let mut contacts = plan.contact_points().to_vec();
        contacts.shuffle(&mut rand::thread_rng());

        let control = Self::open_control(&contacts, &options).await?;
        let control_endpoint = control.target().endpoint.clone();

        let session = Self {
            translator: plan.translator(),
            options,
            native_port: settings.native_port,
            control: Arc::new(Mutex::new(control)),
            control_endpoint,
            topology: RwLock::new(Arc::new(Topology::default())),
            nodes: RwLock::new(Vec::new()),
            policy: Box::new(RoundRobin::new()),
            closed: AtomicBool::new(false),
        };

        if let Err(e) = session.refresh_topology().await {
            session.closed.store(true, Ordering::Release);
            session.shutdown().await;
            return Err(e);
        }

        Ok(session)
    }

    async fn open_control(
        contacts: &[ContactPoint],
        options: &ConnectOptions,
    ) -> PasarelaResult<NodeConnection> {
        let mut failures = Vec::new();

        for contact in contacts {
            let target = TranslatedAddress {
                endpoint: contact.endpoint.clone(),
                server_name: contact.routing_token.clone(),
            };

            match NodeConnection::open(&target, options).await {
                Ok(connection) => {
                    tracing::info!("Control connection established to {}", contact);
                    return Ok(connection);
                }
                Err(e) => {
                    tracing::warn!("Contact point {} failed: {}", contact, e);
                    failures.push(format!("{contact}: {e}"));
                }
            }
        }

        if failures.is_empty() {
            return Err(PasarelaError::no_host("no contact points configured"));
        }
        Err(PasarelaError::no_host(failures.join("; ")))
    }

    /// Re-read `system.local` and `system.peers` and swap in a new topology
    ///
    /// Members not seen before are dialed concurrently; members that left are
    /// disconnected. Returns the number of added members.
    pub async fn refresh_topology(&self) -> PasarelaResult<usize> {
        let (local, peers) = self.discover().await?;

        let mut members = Vec::with_capacity(peers.len() + 1);
        members.push(local.clone());
        members.extend(peers);
        let topology = Arc::new(Topology::new(members));

        let previous = self.topology.read().await.clone();
        let added: Vec<LogicalMember> = topology
            .added_since(&previous)
            .into_iter()
            .filter(|m| **m != local)
            .cloned()
            .collect();
        let added_count = topology.added_since(&previous).len();

        let dialed = join_all(added.into_iter().map(|member| self.connect_member(member))).await;

        let old_nodes = self.nodes.read().await.clone();
        let mut nodes = Vec::with_capacity(topology.len());
        for member in topology.members() {
            if let Some(node) = dialed.iter().find(|n| n.same_member(member)) {
                nodes.push(node.clone());
            } else if member == &local {
                nodes.push(Arc::new(Node {
                    member: member.clone(),
                    connection: Some(self.control.clone()),
                }));
            } else if let Some(node) = old_nodes.iter().find(|n| n.same_member(member)) {
                nodes.push(Arc::new(Node {
                    member: member.clone(),
                    connection: node.connection.clone(),
                }));
            }
        }

        for node in &old_nodes {
            if topology.members().iter().any(|m| node.same_member(m)) {
                continue;
            }
            tracing::info!("Node {} left the cluster", node.member);
            self.close_node(node).await;
        }

        tracing::info!(
            "Topology refreshed: {} node(s), {} new, {} connected",
            nodes.len(),
            added_count,
            nodes.iter().filter(|n| n.connection.is_some()).count()
        );

        *self.nodes.write().await = nodes;
        *self.topology.write().await = topology;
        Ok(added_count)
    }

    /// Current topology snapshot
    pub async fn topology(&self) -> Arc<Topology> {
        self.topology.read().await.clone()
    }

    async fn discover(&self) -> PasarelaResult<(LogicalMember, Vec<LogicalMember>)> {
        let (local_rows, peer_rows) = {
            let mut control = self.control.lock().await;
            let local = rows_of(control.query(LOCAL_QUERY).await?, "system.local")?;
            let peers = rows_of(control.query(PEERS_QUERY).await?, "system.peers")?;
            (local, peers)
        };

        let local_row = local_rows
            .first()
            .ok_or_else(|| CqlError::malformed("system.local returned no rows"))?;
        let local = self.member_from_row(local_row, Some(&self.control_endpoint))?;

        let mut peers = Vec::with_capacity(peer_rows.len());
        for row in &peer_rows {
            match self.member_from_row(row, None) {
                Ok(member) if member.id().is_some() && member.id() == local.id() => {
                    tracing::debug!("Skipping peer row for the control node");
                }
                Ok(member) => peers.push(member),
                Err(e) => tracing::warn!("Ignoring malformed system.peers row {}: {}", row, e),
            }
        }

        Ok((local, peers))
    }

    fn member_from_row(&self, row: &Row, fallback: Option<&Endpoint>) -> PasarelaResult<LogicalMember> {
        let id = row
            .get("host_id")
            .and_then(|v| v.as_uuid())
            .map(|id| RoutingToken::new(id.to_string()))
            .transpose()?;

        let address = row
            .get("rpc_address")
            .and_then(|v| v.as_inet())
            .filter(|ip| !ip.is_unspecified())
            .or_else(|| row.get("peer").and_then(|v| v.as_inet()));

        let advertised = match (address, fallback) {
            (Some(ip), _) => advertised_endpoint(ip, self.native_port)?,
            (None, Some(endpoint)) => endpoint.clone(),
            (None, None) => {
                return Err(CqlError::malformed("row carries neither rpc_address nor peer").into())
            }
        };

        let text = |column: &str| row.get(column).and_then(|v| v.as_text()).map(str::to_string);
        Ok(LogicalMember::new(id, advertised).with_location(text("data_center"), text("rack")))
    }

    fn target_for(&self, member: &LogicalMember) -> PasarelaResult<TranslatedAddress> {
        match &self.translator {
            Some(translator) => translator.translate(member),
            None => Ok(TranslatedAddress {
                endpoint: member.advertised().clone(),
                server_name: None,
            }),
        }
    }

    async fn connect_member(&self, member: LogicalMember) -> Arc<Node> {
        let target = match self.target_for(&member) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!("Cannot route to {}: {}", member, e);
                return Arc::new(Node {
                    member,
                    connection: None,
                });
            }
        };

        match NodeConnection::open(&target, &self.options).await {
            Ok(connection) => {
                tracing::debug!("Connected to {} via {}", member, target);
                Arc::new(Node {
                    member,
                    connection: Some(Arc::new(Mutex::new(connection))),
                })
            }
            Err(e) => {
                tracing::warn!("Could not connect to {} via {}: {}", member, target, e);
                Arc::new(Node {
                    member,
                    connection: None,
                })
            }
        }
    }

    async fn close_node(&self, node: &Node) {
        if let Some(connection) = &node.connection {
            if Arc::ptr_eq(connection, &self.control) {
                return;
            }
            connection.lock().await.close().await;
        }
    }

    /// Callers flip `closed` first so teardown runs once
    async fn shutdown(&self) {
        let nodes = std::mem::take(&mut *self.nodes.write().await);
        for node in &nodes {
            self.close_node(node).await;
        }
        self.control.lock().await.close().await;

        if let Some(translator) = &self.translator {
            translator.close();
        }
    }
}

#[async_trait]
impl ClusterSession for CqlSession {
    async fn nodes(&self) -> Vec<NodeInfo> {
        self.nodes.read().await.iter().map(|n| n.info()).collect()
    }

    async fn execute(&self, query: &str) -> PasarelaResult<QueryResult> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PasarelaError::no_host("session is closed"));
        }

        let connected: Vec<(Arc<Node>, Arc<Mutex<NodeConnection>>)> = self
            .nodes
            .read()
            .await
            .iter()
            .filter_map(|n| n.connection.clone().map(|c| (n.clone(), c)))
            .collect();

        let index = self
            .policy
            .select_coordinator(connected.len())
            .ok_or_else(|| PasarelaError::no_host("no connected node"))?;
        let (node, connection) = &connected[index];

        let body = connection.lock().await.query(query).await?;
        let rows = match body {
            ResultBody::Rows(rows) => rows.rows,
            _ => Vec::new(),
        };

        tracing::debug!("{} row(s) from {} for '{}'", rows.len(), node.member, query);
        Ok(QueryResult {
            coordinator: node.info(),
            rows,
        })
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown().await;
        tracing::info!("Session closed");
    }
}

fn rows_of(body: ResultBody, table: &str) -> PasarelaResult<Vec<Row>> {
    match body {
        ResultBody::Rows(rows) => Ok(rows.rows),
        _ => Err(CqlError::unexpected(format!("{table} query"), "non-rows result").into()),
    }
}

fn advertised_endpoint(ip: IpAddr, port: u16) -> PasarelaResult<Endpoint> {
    Endpoint::new(ip.to_string(), i64::from(port))
}
