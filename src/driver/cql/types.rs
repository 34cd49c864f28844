/// CQL native protocol notation: [short], [int], [string], [bytes] and friends
use crate::error::CqlError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::net::IpAddr;

/// Cursor over a frame body
///
/// Every read checks the remaining length first and reports a truncated body
/// as `CqlError::Malformed` instead of panicking.
#[derive(Debug, Clone)]
pub struct BodyReader {
    buf: Bytes,
}

impl BodyReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize, what: &str) -> Result<(), CqlError> {
        if self.buf.remaining() < n {
            return Err(CqlError::malformed(format!(
                "truncated {what}: need {n} bytes, have {}",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn read_short(&mut self) -> Result<u16, CqlError> {
        self.need(2, "short")?;
        Ok(self.buf.get_u16())
    }

    pub fn read_int(&mut self) -> Result<i32, CqlError> {
        self.need(4, "int")?;
        Ok(self.buf.get_i32())
    }

    pub fn read_raw(&mut self, n: usize) -> Result<Bytes, CqlError> {
        self.need(n, "value")?;
        Ok(self.buf.split_to(n))
    }

    pub fn read_string(&mut self) -> Result<String, CqlError> {
        let len = self.read_short()? as usize;
        let raw = self.read_raw(len)?;
        String::from_utf8(raw.to_vec()).map_err(|e| CqlError::malformed(format!("invalid UTF-8: {e}")))
    }

    pub fn read_long_string(&mut self) -> Result<String, CqlError> {
        let len = self.read_int()?;
        if len < 0 {
            return Err(CqlError::malformed(format!("negative long string length {len}")));
        }
        let raw = self.read_raw(len as usize)?;
        String::from_utf8(raw.to_vec()).map_err(|e| CqlError::malformed(format!("invalid UTF-8: {e}")))
    }

    /// [bytes]: a negative length is null
    pub fn read_bytes(&mut self) -> Result<Option<Bytes>, CqlError> {
        let len = self.read_int()?;
        if len < 0 {
            return Ok(None);
        }
        self.read_raw(len as usize).map(Some)
    }

    pub fn read_string_list(&mut self) -> Result<Vec<String>, CqlError> {
        let n = self.read_short()?;
        (0..n).map(|_| self.read_string()).collect()
    }

    pub fn read_string_map(&mut self) -> Result<HashMap<String, String>, CqlError> {
        let n = self.read_short()?;
        let mut map = HashMap::with_capacity(n as usize);
        for _ in 0..n {
            let key = self.read_string()?;
            let value = self.read_string()?;
            map.insert(key, value);
        }
        Ok(map)
    }

    pub fn read_string_multimap(&mut self) -> Result<HashMap<String, Vec<String>>, CqlError> {
        let n = self.read_short()?;
        let mut map = HashMap::with_capacity(n as usize);
        for _ in 0..n {
            let key = self.read_string()?;
            let values = self.read_string_list()?;
            map.insert(key, values);
        }
        Ok(map)
    }

    pub fn read_bytes_map(&mut self) -> Result<HashMap<String, Option<Bytes>>, CqlError> {
        let n = self.read_short()?;
        let mut map = HashMap::with_capacity(n as usize);
        for _ in 0..n {
            let key = self.read_string()?;
            let value = self.read_bytes()?;
            map.insert(key, value);
        }
        Ok(map)
    }

    pub fn read_uuid(&mut self) -> Result<uuid::Uuid, CqlError> {
        let raw = self.read_raw(16)?;
        uuid::Uuid::from_slice(&raw).map_err(|e| CqlError::malformed(format!("invalid uuid: {e}")))
    }
}

pub fn ip_from_slice(raw: &[u8]) -> Result<IpAddr, CqlError> {
    match raw.len() {
        4 => {
            let octets: [u8; 4] = [raw[0], raw[1], raw[2], raw[3]];
            Ok(IpAddr::from(octets))
        }
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(raw);
            Ok(IpAddr::from(octets))
        }
        n => Err(CqlError::malformed(format!("invalid inet length {n}"))),
    }
}

pub fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u16(value.len() as u16);
    buf.put_slice(value.as_bytes());
}

pub fn put_long_string(buf: &mut BytesMut, value: &str) {
    buf.put_i32(value.len() as i32);
    buf.put_slice(value.as_bytes());
}

pub fn put_bytes(buf: &mut BytesMut, value: Option<&[u8]>) {
    match value {
        Some(value) => {
            buf.put_i32(value.len() as i32);
            buf.put_slice(value);
        }
        None => buf.put_i32(-1),
    }
}

pub fn put_string_list(buf: &mut BytesMut, values: &[String]) {
    buf.put_u16(values.len() as u16);
    for value in values {
        put_string(buf, value);
    }
}

pub fn put_string_map<'a, I>(buf: &mut BytesMut, entries: I)
where
    I: ExactSizeIterator<Item = (&'a str, &'a str)>,
{
    buf.put_u16(entries.len() as u16);
    for (key, value) in entries {
        put_string(buf, key);
        put_string(buf, value);
    }
}
