/// A single CQL connection to one node, over plain TCP or TLS
use super::cql::{Consistency, FrameParser, Request, Response, ResultBody, EVENT_STREAM};
use crate::error::{CqlError, PasarelaError, PasarelaResult};
use crate::routing::TranslatedAddress;
use crate::tls::TlsContext;
use bytes::BytesMut;
use rustls::pki_types::ServerName;
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Byte stream a connection runs over
pub trait CqlStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> CqlStream for T {}

/// Plain-text authenticator credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Settings shared by every connection of a session
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub tls: Option<TlsContext>,
    pub credentials: Option<Credentials>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5000),
            request_timeout: Duration::from_millis(12000),
            tls: None,
            credentials: None,
        }
    }
}

/// An established, authenticated connection
pub struct NodeConnection {
    stream: Box<dyn CqlStream>,
    buffer: BytesMut,
    next_stream: i16,
    target: TranslatedAddress,
    request_timeout: Duration,
}

impl fmt::Debug for NodeConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConnection")
            .field("target", &self.target)
            .finish()
    }
}

impl NodeConnection {
    /// Dial `target`, wrap in TLS when configured, and run the STARTUP handshake
    ///
    /// The whole sequence is bounded by the connect timeout.
    pub async fn open(target: &TranslatedAddress, options: &ConnectOptions) -> PasarelaResult<Self> {
        match timeout(options.connect_timeout, Self::establish(target, options)).await {
            Ok(result) => result,
            Err(_) => Err(PasarelaError::timeout(format!("connect to {target}"))),
        }
    }

    async fn establish(target: &TranslatedAddress, options: &ConnectOptions) -> PasarelaResult<Self> {
        let tcp = Self::dial(target).await?;
        tcp.set_nodelay(true)?;

        let stream: Box<dyn CqlStream> = match &options.tls {
            Some(tls) => {
                let server_name = server_name_for(target)?;
                tracing::debug!("TLS handshake with {} as {:?}", target.endpoint, server_name);
                let stream = tls.connector().connect(server_name, tcp).await?;
                Box::new(stream)
            }
            None => Box::new(tcp),
        };

        let connection = Self::handshake(stream, target.clone(), options).await?;
        tracing::debug!("Connection ready to {}", target);
        Ok(connection)
    }

    /// Run STARTUP (and authentication) over an already open stream
    pub async fn handshake(
        stream: Box<dyn CqlStream>,
        target: TranslatedAddress,
        options: &ConnectOptions,
    ) -> PasarelaResult<Self> {
        let mut connection = Self {
            stream,
            buffer: BytesMut::with_capacity(8 * 1024),
            next_stream: 0,
            target,
            request_timeout: options.request_timeout,
        };
        connection.startup(options.credentials.as_ref()).await?;
        Ok(connection)
    }

    async fn dial(target: &TranslatedAddress) -> PasarelaResult<TcpStream> {
        let mut last_error = None;
        for addr in target.endpoint.to_socket_addrs().await? {
            match TcpStream::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    tracing::debug!("Connect to {} ({}) failed: {}", target.endpoint, addr, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address to dial"))
            .into())
    }

    async fn startup(&mut self, credentials: Option<&Credentials>) -> PasarelaResult<()> {
        match self.request(Request::startup()).await? {
            Response::Ready => Ok(()),
            Response::Authenticate { authenticator } => {
                let credentials = credentials.ok_or_else(|| PasarelaError::Server {
                    code: 0x0100,
                    message: format!(
                        "{} requires authentication ({authenticator}) but no credentials are configured",
                        self.target.endpoint
                    ),
                })?;
                tracing::debug!("Authenticating with {} as {}", authenticator, credentials.username);
                self.authenticate(credentials).await
            }
            other => Err(unexpected("STARTUP", other)),
        }
    }

    async fn authenticate(&mut self, credentials: &Credentials) -> PasarelaResult<()> {
        let response = self
            .request(Request::plain_text_auth(&credentials.username, &credentials.password))
            .await?;

        match response {
            Response::AuthSuccess(_) => Ok(()),
            Response::AuthChallenge(_) => Err(PasarelaError::Server {
                code: 0x0100,
                message: "multi-step authentication challenges are not supported".to_string(),
            }),
            other => Err(unexpected("AUTH_RESPONSE", other)),
        }
    }

    /// Run a query at consistency ONE
    pub async fn query(&mut self, query: &str) -> PasarelaResult<ResultBody> {
        match self.request(Request::query(query, Consistency::One)).await? {
            Response::Result(body) => Ok(body),
            other => Err(unexpected("QUERY", other)),
        }
    }

    /// Send one request and wait for the response on its stream id
    ///
    /// ERROR responses are turned into `PasarelaError::Server`.
    pub async fn request(&mut self, request: Request) -> PasarelaResult<Response> {
        let operation = request.opcode();
        let response = match timeout(self.request_timeout, self.round_trip(request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(PasarelaError::timeout(format!(
                    "{operation} to {}",
                    self.target
                )))
            }
        };

        match response {
            Response::Error { code, message } => Err(PasarelaError::Server { code, message }),
            response => Ok(response),
        }
    }

    async fn round_trip(&mut self, request: Request) -> PasarelaResult<Response> {
        let stream_id = self.allocate_stream();
        let mut out = BytesMut::new();
        request.to_frame(stream_id).encode(&mut out);
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;

        loop {
            while let Some(frame) = FrameParser::parse(&mut self.buffer)? {
                if frame.stream == stream_id {
                    return Ok(Response::decode(frame)?);
                }
                if frame.stream == EVENT_STREAM {
                    tracing::trace!("Ignoring pushed event from {}", self.target);
                } else {
                    tracing::debug!(
                        "Dropping response for stale stream {} from {}",
                        frame.stream,
                        self.target
                    );
                }
            }

            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{} closed the connection", self.target),
                )
                .into());
            }
        }
    }

    fn allocate_stream(&mut self) -> i16 {
        let id = self.next_stream;
        self.next_stream = if self.next_stream == i16::MAX {
            0
        } else {
            self.next_stream + 1
        };
        id
    }

    pub fn target(&self) -> &TranslatedAddress {
        &self.target
    }

    /// Shut the stream down; errors are only logged
    pub async fn close(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!("Error closing connection to {}: {}", self.target, e);
        }
    }
}

/// TLS server name: the routing token when present, else the dialed host
fn server_name_for(target: &TranslatedAddress) -> PasarelaResult<ServerName<'static>> {
    let name = match &target.server_name {
        Some(token) => token.as_str().to_string(),
        None => target.endpoint.host().to_string(),
    };
    ServerName::try_from(name.clone())
        .map_err(|e| PasarelaError::unroutable(format!("'{name}' is not a valid TLS server name: {e}")))
}

fn unexpected(request: &str, response: Response) -> PasarelaError {
    CqlError::unexpected(request, response.opcode().to_string()).into()
}
