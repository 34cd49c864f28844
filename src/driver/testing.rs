/// In-process CQL server for driver and end-to-end tests
///
/// Answers STARTUP / AUTH_RESPONSE / OPTIONS and the `system.local` and
/// `system.peers` selects from an in-memory cluster description. Over TLS the
/// SNI name picks which node a connection talks to; without it every
/// connection lands on the first node, like a TCP passthrough ingress.

use super::cql::{
    ColumnSpec, ColumnType, CqlValue, FrameParser, Request, Response, ResultBody, Row, Rows,
};
use bytes::BytesMut;
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::LazyConfigAcceptor;

#[derive(Debug, Clone)]
pub struct FakeNode {
    pub host_id: uuid::Uuid,
    pub datacenter: String,
    pub rack: String,
    pub rpc_address: IpAddr,
    pub release_version: String,
}

impl FakeNode {
    pub fn new(host_id: &str, datacenter: &str, rack: &str, rpc_address: &str) -> Self {
        Self {
            host_id: uuid::Uuid::parse_str(host_id).unwrap(),
            datacenter: datacenter.to_string(),
            rack: rack.to_string(),
            rpc_address: rpc_address.parse().unwrap(),
            release_version: "4.0.1".to_string(),
        }
    }

    fn column(&self, name: &str) -> (ColumnType, CqlValue) {
        match name {
            "host_id" => (ColumnType::Uuid, CqlValue::Uuid(self.host_id)),
            "data_center" => (ColumnType::Varchar, CqlValue::Text(self.datacenter.clone())),
            "rack" => (ColumnType::Varchar, CqlValue::Text(self.rack.clone())),
            "release_version" => (
                ColumnType::Varchar,
                CqlValue::Text(self.release_version.clone()),
            ),
            "rpc_address" | "peer" => (ColumnType::Inet, CqlValue::Inet(self.rpc_address)),
            "key" => (ColumnType::Varchar, CqlValue::Text("local".to_string())),
            _ => (ColumnType::Varchar, CqlValue::Null),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeCluster {
    pub nodes: Vec<FakeNode>,
    credentials: Option<(String, String)>,
    failing_peers: bool,
}

impl FakeCluster {
    /// Three nodes advertising TEST-NET-1 addresses (unroutable)
    pub fn three_nodes() -> Self {
        Self {
            nodes: vec![
                FakeNode::new("ec448e83-8b83-407b-b342-13ce0250001c", "dc1", "rack1", "192.0.2.10"),
                FakeNode::new("1f6ad9b4-73b5-4b7e-8d6a-0c9a3ad1b4c2", "dc1", "rack2", "192.0.2.20"),
                FakeNode::new("a3c1e5f7-2b4d-4c6e-8f0a-1b3d5f7a9c0e", "dc1", "rack3", "192.0.2.30"),
            ],
            credentials: None,
            failing_peers: false,
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    /// Answer `system.peers` with a server error
    pub fn with_failing_peers(mut self) -> Self {
        self.failing_peers = true;
        self
    }

    pub fn with_rpc_address(mut self, address: IpAddr) -> Self {
        for node in &mut self.nodes {
            node.rpc_address = address;
        }
        self
    }

    pub fn host_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.host_id.to_string()).collect()
    }

    fn node_for(&self, server_name: Option<&str>) -> usize {
        server_name
            .and_then(|name| self.nodes.iter().position(|n| n.host_id.to_string() == name))
            .unwrap_or(0)
    }

    fn respond(&self, local: usize, request: Request) -> Response {
        match request {
            Request::Startup(_) => match self.credentials {
                Some(_) => Response::Authenticate {
                    authenticator: "org.apache.cassandra.auth.PasswordAuthenticator".to_string(),
                },
                None => Response::Ready,
            },
            Request::Options => Response::Supported(HashMap::from([(
                "CQL_VERSION".to_string(),
                vec!["3.4.5".to_string()],
            )])),
            Request::AuthResponse(token) => {
                let accepted = self.credentials.as_ref().is_some_and(|(user, pass)| {
                    token.as_ref() == format!("\0{user}\0{pass}").as_bytes()
                });
                if accepted {
                    Response::AuthSuccess(None)
                } else {
                    Response::Error {
                        code: 0x0100,
                        message: "Provided username and/or password are incorrect".to_string(),
                    }
                }
            }
            Request::Query { query, .. } => self.select(local, &query),
        }
    }

    fn select(&self, local: usize, query: &str) -> Response {
        let lower = query.to_lowercase();
        let table = if lower.contains("from system.local") {
            "local"
        } else if lower.contains("from system.peers") {
            if self.failing_peers {
                return Response::Error {
                    code: 0x0000,
                    message: "peers table unavailable".to_string(),
                };
            }
            "peers"
        } else if lower.starts_with("use ") {
            return Response::Result(ResultBody::SetKeyspace(query[4..].trim().to_string()));
        } else {
            return Response::Error {
                code: 0x2200,
                message: format!("unconfigured table in '{query}'"),
            };
        };

        let selected: Vec<&FakeNode> = match table {
            "local" => vec![&self.nodes[local]],
            _ => self
                .nodes
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != local)
                .map(|(_, n)| n)
                .collect(),
        };

        let names: Vec<String> = lower
            .split_once("select")
            .and_then(|(_, rest)| rest.split_once("from"))
            .map(|(columns, _)| columns.split(',').map(|c| c.trim().to_string()).collect())
            .unwrap_or_default();

        let reference = &self.nodes[local];
        let columns: Vec<ColumnSpec> = names
            .iter()
            .map(|name| ColumnSpec::new("system", table, name, reference.column(name).0))
            .collect();
        let shared: Arc<[String]> = names.iter().cloned().collect();
        let rows = selected
            .into_iter()
            .map(|node| {
                let values = names.iter().map(|name| node.column(name).1).collect();
                Row::new(shared.clone(), values)
            })
            .collect();

        Response::Result(ResultBody::Rows(Rows {
            columns,
            rows,
            paging_state: None,
        }))
    }
}

/// A listening fake cluster; the accept loop stops when dropped
pub struct FakeServer {
    pub addr: SocketAddr,
    cluster: Arc<Mutex<FakeCluster>>,
    accepted: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    server_names: Arc<Mutex<Vec<Option<String>>>>,
    task: JoinHandle<()>,
}

impl FakeServer {
    pub async fn start(cluster: FakeCluster) -> Self {
        Self::spawn(cluster, None).await
    }

    pub async fn start_tls(cluster: FakeCluster, tls: Arc<ServerConfig>) -> Self {
        Self::spawn(cluster, Some(tls)).await
    }

    async fn spawn(cluster: FakeCluster, tls: Option<Arc<ServerConfig>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cluster = Arc::new(Mutex::new(cluster));
        let accepted = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let server_names = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let cluster = cluster.clone();
            let accepted = accepted.clone();
            let closed = closed.clone();
            let server_names = server_names.clone();
            tokio::spawn(async move {
                while let Ok((tcp, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let cluster = cluster.clone();
                    let server_names = server_names.clone();
                    let tls = tls.clone();
                    let closed = closed.clone();
                    tokio::spawn(async move {
                        let result = match tls {
                            Some(config) => accept_tls(tcp, config, cluster, server_names).await,
                            None => serve(tcp, cluster, None).await,
                        };
                        if let Err(e) = result {
                            log::debug!("Fake server connection ended: {e}");
                        }
                        closed.fetch_add(1, Ordering::SeqCst);
                    });
                }
            })
        };

        Self {
            addr,
            cluster,
            accepted,
            closed,
            server_names,
            task,
        }
    }

    /// Connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Connections the client side has closed
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// SNI names presented by each TLS connection, in accept order
    pub fn server_names(&self) -> Vec<Option<String>> {
        self.server_names.lock().unwrap().clone()
    }

    pub fn add_node(&self, node: FakeNode) {
        self.cluster.lock().unwrap().nodes.push(node);
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_tls(
    tcp: tokio::net::TcpStream,
    config: Arc<ServerConfig>,
    cluster: Arc<Mutex<FakeCluster>>,
    server_names: Arc<Mutex<Vec<Option<String>>>>,
) -> io::Result<()> {
    let start = LazyConfigAcceptor::new(rustls::server::Acceptor::default(), tcp).await?;
    let server_name = start.client_hello().server_name().map(str::to_string);
    server_names.lock().unwrap().push(server_name.clone());

    let stream = start.into_stream(config).await?;
    serve(stream, cluster, server_name).await
}

async fn serve<S>(
    mut stream: S,
    cluster: Arc<Mutex<FakeCluster>>,
    server_name: Option<String>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let local = cluster.lock().unwrap().node_for(server_name.as_deref());
    let mut buffer = BytesMut::new();

    loop {
        while let Some(frame) = FrameParser::parse(&mut buffer).map_err(invalid)? {
            let request = Request::decode(&frame).map_err(invalid)?;
            let response = cluster.lock().unwrap().respond(local, request);

            let mut out = BytesMut::new();
            response.to_frame(frame.stream).encode(&mut out);
            stream.write_all(&out).await?;
        }

        if stream.read_buf(&mut buffer).await? == 0 {
            return Ok(());
        }
    }
}

fn invalid(e: crate::error::CqlError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// Server config from PEM strings; `client_ca` turns on client certificate checks
pub fn tls_server_config(cert_pem: &str, key_pem: &str, client_ca: Option<&str>) -> Arc<ServerConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let certs = rustls_pemfile::certs(&mut cert_pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let key = rustls_pemfile::private_key(&mut key_pem.as_bytes())
        .unwrap()
        .unwrap();

    let builder = ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .unwrap();

    let config = match client_ca {
        Some(ca_pem) => {
            let mut roots = RootCertStore::empty();
            for cert in rustls_pemfile::certs(&mut ca_pem.as_bytes()) {
                roots.add(cert.unwrap()).unwrap();
            }
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .unwrap();
            builder
                .with_client_cert_verifier(verifier)
                .with_single_cert(certs, key)
                .unwrap()
        }
        None => builder
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .unwrap(),
    };

    Arc::new(config)
}
