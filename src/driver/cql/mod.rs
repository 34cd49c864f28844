/// CQL native protocol v4 framing and messages
///
/// Frames are parsed incrementally from a `BytesMut` read buffer:
/// `FrameParser::parse` returns `Ok(None)` until a whole frame is buffered
/// and only then consumes it.
pub mod types;
pub mod value;

pub use types::BodyReader;
pub use value::{ColumnSpec, ColumnType, CqlValue, Row, Rows};

use crate::error::CqlError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::fmt;
use types::{put_bytes, put_long_string, put_string, put_string_list, put_string_map};

pub const HEADER_LEN: usize = 9;
pub const MAX_BODY_LEN: usize = 256 * 1024 * 1024;
pub const REQUEST_VERSION: u8 = 0x04;
pub const RESPONSE_VERSION: u8 = 0x84;
pub const CQL_VERSION: &str = "3.0.0";

/// Stream id the server uses for pushed events
pub const EVENT_STREAM: i16 = -1;

pub const FLAG_TRACING: u8 = 0x02;
pub const FLAG_CUSTOM_PAYLOAD: u8 = 0x04;
pub const FLAG_WARNING: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Error = 0x00,
    Startup = 0x01,
    Ready = 0x02,
    Authenticate = 0x03,
    Options = 0x05,
    Supported = 0x06,
    Query = 0x07,
    Result = 0x08,
    Register = 0x0B,
    Event = 0x0C,
    AuthChallenge = 0x0E,
    AuthResponse = 0x0F,
    AuthSuccess = 0x10,
}

impl TryFrom<u8> for Opcode {
    type Error = CqlError;

    fn try_from(value: u8) -> Result<Self, CqlError> {
        let opcode = match value {
            0x00 => Opcode::Error,
            0x01 => Opcode::Startup,
            0x02 => Opcode::Ready,
            0x03 => Opcode::Authenticate,
            0x05 => Opcode::Options,
            0x06 => Opcode::Supported,
            0x07 => Opcode::Query,
            0x08 => Opcode::Result,
            0x0B => Opcode::Register,
            0x0C => Opcode::Event,
            0x0E => Opcode::AuthChallenge,
            0x0F => Opcode::AuthResponse,
            0x10 => Opcode::AuthSuccess,
            other => return Err(CqlError::UnknownOpcode(other)),
        };
        Ok(opcode)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Error => "ERROR",
            Opcode::Startup => "STARTUP",
            Opcode::Ready => "READY",
            Opcode::Authenticate => "AUTHENTICATE",
            Opcode::Options => "OPTIONS",
            Opcode::Supported => "SUPPORTED",
            Opcode::Query => "QUERY",
            Opcode::Result => "RESULT",
            Opcode::Register => "REGISTER",
            Opcode::Event => "EVENT",
            Opcode::AuthChallenge => "AUTH_CHALLENGE",
            Opcode::AuthResponse => "AUTH_RESPONSE",
            Opcode::AuthSuccess => "AUTH_SUCCESS",
        };
        f.write_str(name)
    }
}

/// One protocol frame: 9-byte header plus body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub version: u8,
    pub flags: u8,
    pub stream: i16,
    pub opcode: Opcode,
    pub body: Bytes,
}

impl Frame {
    pub fn request(stream: i16, opcode: Opcode, body: Bytes) -> Self {
        Self {
            version: REQUEST_VERSION,
            flags: 0,
            stream,
            opcode,
            body,
        }
    }

    pub fn response(stream: i16, opcode: Opcode, body: Bytes) -> Self {
        Self {
            version: RESPONSE_VERSION,
            ..Self::request(stream, opcode, body)
        }
    }

    pub fn is_response(&self) -> bool {
        self.version & 0x80 != 0
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_LEN + self.body.len());
        dst.put_u8(self.version);
        dst.put_u8(self.flags);
        dst.put_i16(self.stream);
        dst.put_u8(self.opcode as u8);
        dst.put_i32(self.body.len() as i32);
        dst.put_slice(&self.body);
    }
}

/// Incremental frame parser over a read buffer
pub struct FrameParser;

impl FrameParser {
    /// Parse one frame; `Ok(None)` means more bytes are needed
    pub fn parse(buf: &mut BytesMut) -> Result<Option<Frame>, CqlError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let version = buf[0];
        if version & 0x7f != REQUEST_VERSION {
            return Err(CqlError::UnsupportedVersion(version));
        }

        let opcode = Opcode::try_from(buf[4])?;
        let length = i32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]);
        let length = usize::try_from(length)
            .map_err(|_| CqlError::malformed(format!("negative body length {length}")))?;
        if length > MAX_BODY_LEN {
            return Err(CqlError::FrameTooLarge(length));
        }

        if buf.len() < HEADER_LEN + length {
            buf.reserve(HEADER_LEN + length - buf.len());
            return Ok(None);
        }

        let flags = buf[1];
        let stream = i16::from_be_bytes([buf[2], buf[3]]);
        buf.advance(HEADER_LEN);
        let body = buf.split_to(length).freeze();

        Ok(Some(Frame {
            version,
            flags,
            stream,
            opcode,
            body,
        }))
    }
}

/// Consistency level of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Consistency {
    Any = 0x0000,
    One = 0x0001,
    Two = 0x0002,
    Three = 0x0003,
    Quorum = 0x0004,
    All = 0x0005,
    LocalQuorum = 0x0006,
    EachQuorum = 0x0007,
    LocalOne = 0x000A,
}

/// Client requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Startup(HashMap<String, String>),
    Options,
    Query {
        query: String,
        consistency: u16,
    },
    AuthResponse(Bytes),
}

impl Request {
    pub fn startup() -> Self {
        Request::Startup(HashMap::from([(
            "CQL_VERSION".to_string(),
            CQL_VERSION.to_string(),
        )]))
    }

    pub fn query<S: Into<String>>(query: S, consistency: Consistency) -> Self {
        Request::Query {
            query: query.into(),
            consistency: consistency as u16,
        }
    }

    /// SASL PLAIN token for the password authenticator
    pub fn plain_text_auth(username: &str, password: &str) -> Self {
        let mut token = BytesMut::with_capacity(username.len() + password.len() + 2);
        token.put_u8(0);
        token.put_slice(username.as_bytes());
        token.put_u8(0);
        token.put_slice(password.as_bytes());
        Request::AuthResponse(token.freeze())
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Startup(_) => Opcode::Startup,
            Request::Options => Opcode::Options,
            Request::Query { .. } => Opcode::Query,
            Request::AuthResponse(_) => Opcode::AuthResponse,
        }
    }

    pub fn to_frame(&self, stream: i16) -> Frame {
        let mut body = BytesMut::new();
        match self {
            Request::Startup(options) => {
                put_string_map(
                    &mut body,
                    options.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                );
            }
            Request::Options => {}
            Request::Query { query, consistency } => {
                put_long_string(&mut body, query);
                body.put_u16(*consistency);
                // no values, no paging options
                body.put_u8(0);
            }
            Request::AuthResponse(token) => put_bytes(&mut body, Some(&token[..])),
        }
        Frame::request(stream, self.opcode(), body.freeze())
    }

    pub fn decode(frame: &Frame) -> Result<Self, CqlError> {
        let mut reader = BodyReader::new(frame.body.clone());
        let request = match frame.opcode {
            Opcode::Startup => Request::Startup(reader.read_string_map()?),
            Opcode::Options => Request::Options,
            Opcode::Query => {
                let query = reader.read_long_string()?;
                let consistency = reader.read_short()?;
                Request::Query { query, consistency }
            }
            Opcode::AuthResponse => {
                Request::AuthResponse(reader.read_bytes()?.unwrap_or_default())
            }
            other => return Err(CqlError::malformed(format!("{other} is not a request"))),
        };
        Ok(request)
    }
}

/// Body of a RESULT response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultBody {
    Void,
    Rows(Rows),
    SetKeyspace(String),
    SchemaChange {
        change: String,
        target: String,
        keyspace: String,
    },
}

const RESULT_VOID: i32 = 0x0001;
const RESULT_ROWS: i32 = 0x0002;
const RESULT_SET_KEYSPACE: i32 = 0x0003;
const RESULT_PREPARED: i32 = 0x0004;
const RESULT_SCHEMA_CHANGE: i32 = 0x0005;

/// Server responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Error { code: i32, message: String },
    Ready,
    Authenticate { authenticator: String },
    Supported(HashMap<String, Vec<String>>),
    Result(ResultBody),
    Event,
    AuthChallenge(Option<Bytes>),
    AuthSuccess(Option<Bytes>),
}

impl Response {
    /// Decode a response frame, skipping tracing id, warnings and custom payload
    pub fn decode(frame: Frame) -> Result<Self, CqlError> {
        let mut reader = BodyReader::new(frame.body);

        if frame.flags & FLAG_TRACING != 0 {
            let tracing_id = reader.read_uuid()?;
            tracing::debug!("Response traced as session {}", tracing_id);
        }
        if frame.flags & FLAG_WARNING != 0 {
            for warning in reader.read_string_list()? {
                tracing::warn!("Server warning: {}", warning);
            }
        }
        if frame.flags & FLAG_CUSTOM_PAYLOAD != 0 {
            let payload = reader.read_bytes_map()?;
            tracing::trace!("Ignoring custom payload with {} entries", payload.len());
        }

        let response = match frame.opcode {
            Opcode::Error => {
                let code = reader.read_int()?;
                let message = reader.read_string()?;
                Response::Error { code, message }
            }
            Opcode::Ready => Response::Ready,
            Opcode::Authenticate => Response::Authenticate {
                authenticator: reader.read_string()?,
            },
            Opcode::Supported => Response::Supported(reader.read_string_multimap()?),
            Opcode::Result => Response::Result(Self::decode_result(&mut reader)?),
            Opcode::Event => Response::Event,
            Opcode::AuthChallenge => Response::AuthChallenge(reader.read_bytes()?),
            Opcode::AuthSuccess => Response::AuthSuccess(reader.read_bytes()?),
            other => return Err(CqlError::malformed(format!("{other} is not a response"))),
        };

        Ok(response)
    }

    fn decode_result(reader: &mut BodyReader) -> Result<ResultBody, CqlError> {
        let kind = reader.read_int()?;
        let body = match kind {
            RESULT_VOID => ResultBody::Void,
            RESULT_ROWS => ResultBody::Rows(Rows::decode(reader)?),
            RESULT_SET_KEYSPACE => ResultBody::SetKeyspace(reader.read_string()?),
            RESULT_SCHEMA_CHANGE => ResultBody::SchemaChange {
                change: reader.read_string()?,
                target: reader.read_string()?,
                keyspace: reader.read_string()?,
            },
            RESULT_PREPARED => {
                return Err(CqlError::malformed("prepared results are not supported"))
            }
            other => return Err(CqlError::malformed(format!("unknown result kind {other}"))),
        };
        Ok(body)
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Response::Error { .. } => Opcode::Error,
            Response::Ready => Opcode::Ready,
            Response::Authenticate { .. } => Opcode::Authenticate,
            Response::Supported(_) => Opcode::Supported,
            Response::Result(_) => Opcode::Result,
            Response::Event => Opcode::Event,
            Response::AuthChallenge(_) => Opcode::AuthChallenge,
            Response::AuthSuccess(_) => Opcode::AuthSuccess,
        }
    }

    /// Encode as a frame; used by in-process servers
    pub fn to_frame(&self, stream: i16) -> Frame {
        let mut body = BytesMut::new();
        match self {
            Response::Error { code, message } => {
                body.put_i32(*code);
                put_string(&mut body, message);
            }
            Response::Ready | Response::Event => {}
            Response::Authenticate { authenticator } => put_string(&mut body, authenticator),
            Response::Supported(options) => {
                body.put_u16(options.len() as u16);
                for (key, values) in options {
                    put_string(&mut body, key);
                    put_string_list(&mut body, values);
                }
            }
            Response::Result(result) => match result {
                ResultBody::Void => body.put_i32(RESULT_VOID),
                ResultBody::Rows(rows) => {
                    body.put_i32(RESULT_ROWS);
                    rows.encode(&mut body);
                }
                ResultBody::SetKeyspace(keyspace) => {
                    body.put_i32(RESULT_SET_KEYSPACE);
                    put_string(&mut body, keyspace);
                }
                ResultBody::SchemaChange {
                    change,
                    target,
                    keyspace,
                } => {
                    body.put_i32(RESULT_SCHEMA_CHANGE);
                    put_string(&mut body, change);
                    put_string(&mut body, target);
                    put_string(&mut body, keyspace);
                }
            },
            Response::AuthChallenge(token) | Response::AuthSuccess(token) => {
                put_bytes(&mut body, token.as_deref())
            }
        }
        Frame::response(stream, self.opcode(), body.freeze())
    }
}
