/// Column types, cell values and result rows
use super::types::{ip_from_slice, put_bytes, put_string, BodyReader};
use crate::error::CqlError;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// A column type as described by an [option] in result metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Custom(String),
    Ascii,
    Bigint,
    Blob,
    Boolean,
    Counter,
    Int,
    Timestamp,
    Uuid,
    Varchar,
    Timeuuid,
    Inet,
    List(Box<ColumnType>),
    Map(Box<ColumnType>, Box<ColumnType>),
    Set(Box<ColumnType>),
    Udt {
        keyspace: String,
        name: String,
        fields: Vec<(String, ColumnType)>,
    },
    Tuple(Vec<ColumnType>),
    /// Any other native type id; its cells render as hex
    Other(u16),
}

impl ColumnType {
    pub fn decode(reader: &mut BodyReader) -> Result<Self, CqlError> {
        let id = reader.read_short()?;
        let column_type = match id {
            0x0000 => ColumnType::Custom(reader.read_string()?),
            0x0001 => ColumnType::Ascii,
            0x0002 => ColumnType::Bigint,
            0x0003 => ColumnType::Blob,
            0x0004 => ColumnType::Boolean,
            0x0005 => ColumnType::Counter,
            0x0009 => ColumnType::Int,
            0x000B => ColumnType::Timestamp,
            0x000C => ColumnType::Uuid,
            0x000A | 0x000D => ColumnType::Varchar,
            0x000F => ColumnType::Timeuuid,
            0x0010 => ColumnType::Inet,
            0x0020 => ColumnType::List(Box::new(Self::decode(reader)?)),
            0x0021 => {
                let key = Self::decode(reader)?;
                let value = Self::decode(reader)?;
                ColumnType::Map(Box::new(key), Box::new(value))
            }
            0x0022 => ColumnType::Set(Box::new(Self::decode(reader)?)),
            0x0030 => {
                let keyspace = reader.read_string()?;
                let name = reader.read_string()?;
                let n = reader.read_short()?;
                let mut fields = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    let field = reader.read_string()?;
                    fields.push((field, Self::decode(reader)?));
                }
                ColumnType::Udt {
                    keyspace,
                    name,
                    fields,
                }
            }
            0x0031 => {
                let n = reader.read_short()?;
                let elements = (0..n)
                    .map(|_| Self::decode(reader))
                    .collect::<Result<Vec<_>, _>>()?;
                ColumnType::Tuple(elements)
            }
            other => ColumnType::Other(other),
        };
        Ok(column_type)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            ColumnType::Custom(class) => {
                buf.put_u16(0x0000);
                put_string(buf, class);
            }
            ColumnType::Ascii => buf.put_u16(0x0001),
            ColumnType::Bigint => buf.put_u16(0x0002),
            ColumnType::Blob => buf.put_u16(0x0003),
            ColumnType::Boolean => buf.put_u16(0x0004),
            ColumnType::Counter => buf.put_u16(0x0005),
            ColumnType::Int => buf.put_u16(0x0009),
            ColumnType::Timestamp => buf.put_u16(0x000B),
            ColumnType::Uuid => buf.put_u16(0x000C),
            ColumnType::Varchar => buf.put_u16(0x000D),
            ColumnType::Timeuuid => buf.put_u16(0x000F),
            ColumnType::Inet => buf.put_u16(0x0010),
            ColumnType::List(element) => {
                buf.put_u16(0x0020);
                element.encode(buf);
            }
            ColumnType::Map(key, value) => {
                buf.put_u16(0x0021);
                key.encode(buf);
                value.encode(buf);
            }
            ColumnType::Set(element) => {
                buf.put_u16(0x0022);
                element.encode(buf);
            }
            ColumnType::Udt {
                keyspace,
                name,
                fields,
            } => {
                buf.put_u16(0x0030);
                put_string(buf, keyspace);
                put_string(buf, name);
                buf.put_u16(fields.len() as u16);
                for (field, field_type) in fields {
                    put_string(buf, field);
                    field_type.encode(buf);
                }
            }
            ColumnType::Tuple(elements) => {
                buf.put_u16(0x0031);
                buf.put_u16(elements.len() as u16);
                for element in elements {
                    element.encode(buf);
                }
            }
            ColumnType::Other(id) => buf.put_u16(*id),
        }
    }
}

/// A decoded cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CqlValue {
    Null,
    Text(String),
    Int(i32),
    Bigint(i64),
    Boolean(bool),
    Uuid(uuid::Uuid),
    Inet(IpAddr),
    Blob(Bytes),
    List(Vec<CqlValue>),
    Set(Vec<CqlValue>),
    Map(Vec<(CqlValue, CqlValue)>),
    /// Undecoded value of a type without a dedicated variant
    Other(Bytes),
}

impl CqlValue {
    /// Decode a cell; `None` is a null cell
    pub fn decode(column_type: &ColumnType, raw: Option<Bytes>) -> Result<Self, CqlError> {
        let Some(raw) = raw else {
            return Ok(CqlValue::Null);
        };

        let value = match column_type {
            ColumnType::Ascii | ColumnType::Varchar => CqlValue::Text(
                String::from_utf8(raw.to_vec())
                    .map_err(|e| CqlError::malformed(format!("invalid text cell: {e}")))?,
            ),
            ColumnType::Int => CqlValue::Int(i32::from_be_bytes(fixed::<4>(&raw, "int")?)),
            ColumnType::Bigint | ColumnType::Counter | ColumnType::Timestamp => {
                CqlValue::Bigint(i64::from_be_bytes(fixed::<8>(&raw, "bigint")?))
            }
            ColumnType::Boolean => CqlValue::Boolean(fixed::<1>(&raw, "boolean")?[0] != 0),
            ColumnType::Uuid | ColumnType::Timeuuid => CqlValue::Uuid(uuid::Uuid::from_bytes(
                fixed::<16>(&raw, "uuid")?,
            )),
            ColumnType::Inet => CqlValue::Inet(ip_from_slice(&raw)?),
            ColumnType::Blob => CqlValue::Blob(raw),
            ColumnType::List(element) => CqlValue::List(decode_elements(element, raw)?),
            ColumnType::Set(element) => CqlValue::Set(decode_elements(element, raw)?),
            ColumnType::Map(key_type, value_type) => {
                let mut reader = BodyReader::new(raw);
                let n = collection_len(&mut reader, 8)?;
                let mut entries = Vec::with_capacity(n);
                for _ in 0..n {
                    let key = CqlValue::decode(key_type, reader.read_bytes()?)?;
                    let value = CqlValue::decode(value_type, reader.read_bytes()?)?;
                    entries.push((key, value));
                }
                CqlValue::Map(entries)
            }
            _ => CqlValue::Other(raw),
        };

        Ok(value)
    }

    /// Serialized cell body, `None` for null
    pub fn to_bytes(&self) -> Option<Bytes> {
        let mut buf = BytesMut::new();
        match self {
            CqlValue::Null => return None,
            CqlValue::Text(text) => buf.put_slice(text.as_bytes()),
            CqlValue::Int(v) => buf.put_i32(*v),
            CqlValue::Bigint(v) => buf.put_i64(*v),
            CqlValue::Boolean(v) => buf.put_u8(u8::from(*v)),
            CqlValue::Uuid(v) => buf.put_slice(v.as_bytes()),
            CqlValue::Inet(IpAddr::V4(ip)) => buf.put_slice(&ip.octets()),
            CqlValue::Inet(IpAddr::V6(ip)) => buf.put_slice(&ip.octets()),
            CqlValue::Blob(raw) | CqlValue::Other(raw) => buf.put_slice(raw),
            CqlValue::List(elements) | CqlValue::Set(elements) => {
                buf.put_i32(elements.len() as i32);
                for element in elements {
                    put_bytes(&mut buf, element.to_bytes().as_deref());
                }
            }
            CqlValue::Map(entries) => {
                buf.put_i32(entries.len() as i32);
                for (key, value) in entries {
                    put_bytes(&mut buf, key.to_bytes().as_deref());
                    put_bytes(&mut buf, value.to_bytes().as_deref());
                }
            }
        }
        Some(buf.freeze())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CqlValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<uuid::Uuid> {
        match self {
            CqlValue::Uuid(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_inet(&self) -> Option<IpAddr> {
        match self {
            CqlValue::Inet(ip) => Some(*ip),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CqlValue::Null)
    }
}

fn fixed<const N: usize>(raw: &[u8], what: &str) -> Result<[u8; N], CqlError> {
    raw.try_into().map_err(|_| {
        CqlError::malformed(format!("{what} cell must be {N} bytes, got {}", raw.len()))
    })
}

/// Element count, rejected when the rest of the body cannot hold that many
/// elements of at least `min_element_len` bytes each
fn collection_len(reader: &mut BodyReader, min_element_len: usize) -> Result<usize, CqlError> {
    let n = reader.read_int()?;
    let n = usize::try_from(n)
        .map_err(|_| CqlError::malformed(format!("negative collection size {n}")))?;
    if n.saturating_mul(min_element_len.max(1)) > reader.remaining() {
        return Err(CqlError::malformed(format!(
            "collection size {n} exceeds the {} remaining bytes",
            reader.remaining()
        )));
    }
    Ok(n)
}

fn decode_elements(element: &ColumnType, raw: Bytes) -> Result<Vec<CqlValue>, CqlError> {
    let mut reader = BodyReader::new(raw);
    let n = collection_len(&mut reader, 4)?;
    (0..n)
        .map(|_| CqlValue::decode(element, reader.read_bytes()?))
        .collect()
}

fn join<T, F>(f: &mut fmt::Formatter<'_>, items: &[T], mut write: F) -> fmt::Result
where
    F: FnMut(&mut fmt::Formatter<'_>, &T) -> fmt::Result,
{
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write(f, item)?;
    }
    Ok(())
}

impl fmt::Display for CqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqlValue::Null => f.write_str("NULL"),
            CqlValue::Text(text) => write!(f, "'{}'", text.replace('\'', "''")),
            CqlValue::Int(v) => write!(f, "{v}"),
            CqlValue::Bigint(v) => write!(f, "{v}"),
            CqlValue::Boolean(v) => write!(f, "{v}"),
            CqlValue::Uuid(v) => write!(f, "{v}"),
            CqlValue::Inet(ip) => write!(f, "{ip}"),
            CqlValue::Blob(raw) | CqlValue::Other(raw) => write!(f, "0x{}", hex::encode(raw)),
            CqlValue::List(elements) => {
                f.write_str("[")?;
                join(f, elements, |f, v| write!(f, "{v}"))?;
                f.write_str("]")
            }
            CqlValue::Set(elements) => {
                f.write_str("{")?;
                join(f, elements, |f, v| write!(f, "{v}"))?;
                f.write_str("}")
            }
            CqlValue::Map(entries) => {
                f.write_str("{")?;
                join(f, entries, |f, (k, v)| write!(f, "{k}:{v}"))?;
                f.write_str("}")
            }
        }
    }
}

/// Name and type of a result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub keyspace: String,
    pub table: String,
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSpec {
    pub fn new(keyspace: &str, table: &str, name: &str, column_type: ColumnType) -> Self {
        Self {
            keyspace: keyspace.to_string(),
            table: table.to_string(),
            name: name.to_string(),
            column_type,
        }
    }
}

/// One result row; column names are shared with the other rows of its page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<CqlValue>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<CqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn get(&self, column: &str) -> Option<&CqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn values(&self) -> &[CqlValue] {
        &self.values
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (column, value)) in self.columns.iter().zip(&self.values).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{column}:{value}")?;
        }
        f.write_str("]")
    }
}

/// Body of a rows result (first page only)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rows {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Row>,
    pub paging_state: Option<Bytes>,
}

const GLOBAL_TABLES_SPEC: i32 = 0x0001;
const HAS_MORE_PAGES: i32 = 0x0002;
const NO_METADATA: i32 = 0x0004;

impl Rows {
    pub fn decode(reader: &mut BodyReader) -> Result<Self, CqlError> {
        let flags = reader.read_int()?;
        // a column name and type option take at least 4 bytes
        let column_count = collection_len(reader, 4)?;

        let paging_state = if flags & HAS_MORE_PAGES != 0 {
            reader.read_bytes()?
        } else {
            None
        };

        if flags & NO_METADATA != 0 {
            return Err(CqlError::malformed("rows result without column metadata"));
        }

        let global = if flags & GLOBAL_TABLES_SPEC != 0 {
            Some((reader.read_string()?, reader.read_string()?))
        } else {
            None
        };

        let mut columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let (keyspace, table) = match &global {
                Some((keyspace, table)) => (keyspace.clone(), table.clone()),
                None => (reader.read_string()?, reader.read_string()?),
            };
            let name = reader.read_string()?;
            let column_type = ColumnType::decode(reader)?;
            columns.push(ColumnSpec {
                keyspace,
                table,
                name,
                column_type,
            });
        }

        let names: Arc<[String]> = columns.iter().map(|c| c.name.clone()).collect();
        let row_count = collection_len(reader, 4 * columns.len())?;
        let mut rows = Vec::with_capacity(row_count);
        for _ in 0..row_count {
            let values = columns
                .iter()
                .map(|column| CqlValue::decode(&column.column_type, reader.read_bytes()?))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(Row::new(names.clone(), values));
        }

        Ok(Rows {
            columns,
            rows,
            paging_state,
        })
    }

    /// Encode with a global table spec taken from the first column
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut flags = 0;
        let global = self.columns.first().filter(|first| {
            self.columns
                .iter()
                .all(|c| c.keyspace == first.keyspace && c.table == first.table)
        });
        if global.is_some() {
            flags |= GLOBAL_TABLES_SPEC;
        }
        if self.paging_state.is_some() {
            flags |= HAS_MORE_PAGES;
        }

        buf.put_i32(flags);
        buf.put_i32(self.columns.len() as i32);
        if let Some(state) = &self.paging_state {
            put_bytes(buf, Some(&state[..]));
        }
        if let Some(first) = global {
            put_string(buf, &first.keyspace);
            put_string(buf, &first.table);
        }
        for column in &self.columns {
            if global.is_none() {
                put_string(buf, &column.keyspace);
                put_string(buf, &column.table);
            }
            put_string(buf, &column.name);
            column.column_type.encode(buf);
        }

        buf.put_i32(self.rows.len() as i32);
        for row in &self.rows {
            for value in row.values() {
                put_bytes(buf, value.to_bytes().as_deref());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
