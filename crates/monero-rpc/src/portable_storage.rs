//! Epee portable storage binary format.
//!
//! Used by the daemon's `.bin` endpoints (`get_o_indexes.bin`, `get_outs.bin`,
//! ...). Sections are maps of named entries; every entry carries a one-byte
//! type tag, arrays set the high bit of that tag.
//!
//! Reference: monero/contrib/epee/include/storages/portable_storage_base.h

use crate::error::RpcError;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

// =============================================================================
// Constants
// =============================================================================

/// Portable storage signature words, written little-endian.
const SIGNATURE_A: u32 = 0x0101_1101;
const SIGNATURE_B: u32 = 0x0102_0101;

/// Current storage format version.
const FORMAT_VER: u8 = 1;

const TYPE_INT64: u8 = 1;
const TYPE_INT32: u8 = 2;
const TYPE_INT16: u8 = 3;
const TYPE_INT8: u8 = 4;
const TYPE_UINT64: u8 = 5;
const TYPE_UINT32: u8 = 6;
const TYPE_UINT16: u8 = 7;
const TYPE_UINT8: u8 = 8;
const TYPE_DOUBLE: u8 = 9;
const TYPE_STRING: u8 = 10;
const TYPE_BOOL: u8 = 11;
const TYPE_OBJECT: u8 = 12;
const TYPE_ARRAY: u8 = 13;

/// Array flag (OR'd with element type).
const FLAG_ARRAY: u8 = 0x80;

/// Nesting limit for sections and arrays.
const MAX_DEPTH: usize = 100;

// =============================================================================
// Values
// =============================================================================

/// A section: named entries in key order.
pub type PsMap = BTreeMap<String, PsValue>;

/// A portable storage value.
#[derive(Debug, Clone, PartialEq)]
pub enum PsValue {
    Int64(i64),
    Int32(i32),
    Int16(i16),
    Int8(i8),
    Uint64(u64),
    Uint32(u32),
    Uint16(u16),
    Uint8(u8),
    Double(f64),
    String(Vec<u8>),
    Bool(bool),
    Object(PsMap),
    Array(Vec<PsValue>),
}

impl PsValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            PsValue::Uint64(v) => Some(*v),
            PsValue::Uint32(v) => Some(*v as u64),
            PsValue::Uint16(v) => Some(*v as u64),
            PsValue::Uint8(v) => Some(*v as u64),
            PsValue::Int64(v) => u64::try_from(*v).ok(),
            PsValue::Int32(v) => u64::try_from(*v).ok(),
            PsValue::Int16(v) => u64::try_from(*v).ok(),
            PsValue::Int8(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PsValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PsValue::String(v) => std::str::from_utf8(v).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PsValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&PsMap> {
        match self {
            PsValue::Object(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<PsValue>> {
        match self {
            PsValue::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&PsValue> {
        match self {
            PsValue::Object(m) => m.get(key),
            _ => None,
        }
    }

    fn type_tag(&self) -> u8 {
        match self {
            PsValue::Int64(_) => TYPE_INT64,
            PsValue::Int32(_) => TYPE_INT32,
            PsValue::Int16(_) => TYPE_INT16,
            PsValue::Int8(_) => TYPE_INT8,
            PsValue::Uint64(_) => TYPE_UINT64,
            PsValue::Uint32(_) => TYPE_UINT32,
            PsValue::Uint16(_) => TYPE_UINT16,
            PsValue::Uint8(_) => TYPE_UINT8,
            PsValue::Double(_) => TYPE_DOUBLE,
            PsValue::String(_) => TYPE_STRING,
            PsValue::Bool(_) => TYPE_BOOL,
            PsValue::Object(_) => TYPE_OBJECT,
            PsValue::Array(_) => TYPE_ARRAY,
        }
    }

    /// Convert a JSON value. Non-negative integers become `Uint64`, negative
    /// ones `Int64`, strings are carried as their UTF-8 bytes and `null`
    /// members of objects are dropped.
    pub fn from_json(value: &Value) -> Result<PsValue, RpcError> {
        match value {
            Value::Bool(b) => Ok(PsValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Ok(PsValue::Uint64(u))
                } else if let Some(i) = n.as_i64() {
                    Ok(PsValue::Int64(i))
                } else {
                    n.as_f64()
                        .map(PsValue::Double)
                        .ok_or_else(|| RpcError::PortableStorage(format!("unrepresentable number {n}")))
                }
            }
            Value::String(s) => Ok(PsValue::String(s.as_bytes().to_vec())),
            Value::Array(items) => items
                .iter()
                .map(PsValue::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(PsValue::Array),
            Value::Object(map) => Self::map_from_json(map).map(PsValue::Object),
            Value::Null => Err(RpcError::PortableStorage("null has no portable storage form".into())),
        }
    }

    pub fn map_from_json(map: &Map<String, Value>) -> Result<PsMap, RpcError> {
        map.iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| Ok((k.clone(), PsValue::from_json(v)?)))
            .collect()
    }

    /// Convert to JSON. Byte strings that are not UTF-8 are hex-encoded.
    pub fn to_json(&self) -> Value {
        match self {
            PsValue::Int64(v) => Value::from(*v),
            PsValue::Int32(v) => Value::from(*v),
            PsValue::Int16(v) => Value::from(*v),
            PsValue::Int8(v) => Value::from(*v),
            PsValue::Uint64(v) => Value::from(*v),
            PsValue::Uint32(v) => Value::from(*v),
            PsValue::Uint16(v) => Value::from(*v),
            PsValue::Uint8(v) => Value::from(*v),
            PsValue::Double(v) => Number::from_f64(*v).map(Value::Number).unwrap_or(Value::Null),
            PsValue::String(v) => match std::str::from_utf8(v) {
                Ok(s) => Value::String(s.to_string()),
                Err(_) => Value::String(hex::encode(v)),
            },
            PsValue::Bool(v) => Value::Bool(*v),
            PsValue::Object(m) => Value::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
            PsValue::Array(items) => Value::Array(items.iter().map(PsValue::to_json).collect()),
        }
    }
}

fn storage_error(msg: impl Into<String>) -> RpcError {
    RpcError::PortableStorage(msg.into())
}

// =============================================================================
// Deserialization
// =============================================================================

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, depth: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], RpcError> {
        let end = self.pos.checked_add(N).filter(|&end| end <= self.data.len());
        let end = end.ok_or_else(|| storage_error("unexpected EOF"))?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, RpcError> {
        Ok(self.take::<1>()?[0])
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, RpcError> {
        if self.data.len() - self.pos < n {
            return Err(storage_error("unexpected EOF"));
        }
        let v = self.data[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Ok(v)
    }

    /// Read a varint-encoded count. The low two bits select a 1, 2, 4 or 8
    /// byte little-endian word; the value lives in the remaining bits.
    fn read_varint_count(&mut self) -> Result<usize, RpcError> {
        let first = self.read_u8()?;
        let raw = match first & 0x03 {
            0 => first as u64,
            1 => u16::from_le_bytes([first, self.read_u8()?]) as u64,
            2 => {
                let rest = self.take::<3>()?;
                u32::from_le_bytes([first, rest[0], rest[1], rest[2]]) as u64
            }
            _ => {
                let rest = self.take::<7>()?;
                let mut word = [first; 8];
                word[1..].copy_from_slice(&rest);
                u64::from_le_bytes(word)
            }
        };
        usize::try_from(raw >> 2).map_err(|_| storage_error("count does not fit in memory"))
    }

    fn read_string(&mut self) -> Result<Vec<u8>, RpcError> {
        let len = self.read_varint_count()?;
        self.read_bytes(len)
    }

    fn read_section_name(&mut self) -> Result<String, RpcError> {
        let len = self.read_u8()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|e| storage_error(format!("invalid UTF-8 in key: {}", e)))
    }

    fn read_value(&mut self, type_tag: u8) -> Result<PsValue, RpcError> {
        Ok(match type_tag {
            TYPE_INT64 => PsValue::Int64(i64::from_le_bytes(self.take()?)),
            TYPE_INT32 => PsValue::Int32(i32::from_le_bytes(self.take()?)),
            TYPE_INT16 => PsValue::Int16(i16::from_le_bytes(self.take()?)),
            TYPE_INT8 => PsValue::Int8(self.read_u8()? as i8),
            TYPE_UINT64 => PsValue::Uint64(u64::from_le_bytes(self.take()?)),
            TYPE_UINT32 => PsValue::Uint32(u32::from_le_bytes(self.take()?)),
            TYPE_UINT16 => PsValue::Uint16(u16::from_le_bytes(self.take()?)),
            TYPE_UINT8 => PsValue::Uint8(self.read_u8()?),
            TYPE_DOUBLE => PsValue::Double(f64::from_le_bytes(self.take()?)),
            TYPE_STRING => PsValue::String(self.read_string()?),
            TYPE_BOOL => PsValue::Bool(self.read_u8()? != 0),
            TYPE_OBJECT => PsValue::Object(self.read_section()?),
            // An array nested in an array repeats its own type byte.
            TYPE_ARRAY => self.read_entry()?,
            _ => return Err(storage_error(format!("unknown type tag: {}", type_tag))),
        })
    }

    fn read_entry(&mut self) -> Result<PsValue, RpcError> {
        let type_byte = self.read_u8()?;
        if type_byte & FLAG_ARRAY == 0 {
            return self.read_value(type_byte);
        }

        let elem_type = type_byte & !FLAG_ARRAY;
        let count = self.read_varint_count()?;
        self.enter()?;
        // Every element occupies at least one byte.
        let mut arr = Vec::with_capacity(count.min(self.data.len() - self.pos));
        for _ in 0..count {
            arr.push(self.read_value(elem_type)?);
        }
        self.depth -= 1;
        Ok(PsValue::Array(arr))
    }

    fn read_section(&mut self) -> Result<PsMap, RpcError> {
        self.enter()?;
        let count = self.read_varint_count()?;
        let mut map = PsMap::new();
        for _ in 0..count {
            let name = self.read_section_name()?;
            let value = self.read_entry()?;
            map.insert(name, value);
        }
        self.depth -= 1;
        Ok(map)
    }

    fn enter(&mut self) -> Result<(), RpcError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(storage_error("nesting too deep"));
        }
        Ok(())
    }
}

/// Deserialize a portable storage buffer into its root section.
pub fn deserialize(data: &[u8]) -> Result<PsMap, RpcError> {
    let mut reader = Reader::new(data);

    let sig_a = u32::from_le_bytes(reader.take()?);
    let sig_b = u32::from_le_bytes(reader.take()?);
    let ver = reader.read_u8()?;

    if sig_a != SIGNATURE_A || sig_b != SIGNATURE_B {
        return Err(storage_error(format!("bad signature: {:08x} {:08x}", sig_a, sig_b)));
    }
    if ver != FORMAT_VER {
        return Err(storage_error(format!("unsupported version: {}", ver)));
    }

    reader.read_section()
}

// =============================================================================
// Serialization
// =============================================================================

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(256),
        }
    }

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_varint_count(&mut self, n: usize) {
        let n = n as u64;
        if n < 1 << 6 {
            self.write_u8((n << 2) as u8);
        } else if n < 1 << 14 {
            self.buf.extend_from_slice(&((n << 2 | 1) as u16).to_le_bytes());
        } else if n < 1 << 30 {
            self.buf.extend_from_slice(&((n << 2 | 2) as u32).to_le_bytes());
        } else {
            self.buf.extend_from_slice(&(n << 2 | 3).to_le_bytes());
        }
    }

    fn write_string(&mut self, s: &[u8]) {
        self.write_varint_count(s.len());
        self.buf.extend_from_slice(s);
    }

    fn write_section_name(&mut self, name: &str) -> Result<(), RpcError> {
        let len = u8::try_from(name.len())
            .map_err(|_| storage_error(format!("section name longer than 255 bytes: {name}")))?;
        self.write_u8(len);
        self.buf.extend_from_slice(name.as_bytes());
        Ok(())
    }

    /// Write a named entry's type tag and body.
    fn write_entry(&mut self, val: &PsValue) -> Result<(), RpcError> {
        match val {
            PsValue::Array(items) => self.write_array(items),
            other => {
                self.write_u8(other.type_tag());
                self.write_value_only(other)
            }
        }
    }

    fn write_array(&mut self, items: &[PsValue]) -> Result<(), RpcError> {
        // An empty array carries no element type; uint8 matches what epee emits.
        let elem_type = items.first().map_or(TYPE_UINT8, PsValue::type_tag);
        if let Some(bad) = items.iter().find(|item| item.type_tag() != elem_type) {
            return Err(storage_error(format!(
                "array mixes element types {} and {}",
                elem_type,
                bad.type_tag()
            )));
        }
        self.write_u8(FLAG_ARRAY | elem_type);
        self.write_varint_count(items.len());
        for item in items {
            self.write_value_only(item)?;
        }
        Ok(())
    }

    /// Write just the value bytes (no type tag), as used for array elements.
    fn write_value_only(&mut self, val: &PsValue) -> Result<(), RpcError> {
        match val {
            PsValue::Int64(v) => self.buf.extend_from_slice(&v.to_le_bytes()),
            PsValue::Int32(v) => self.buf.extend_from_slice(&v.to_le_bytes()),
            PsValue::Int16(v) => self.buf.extend_from_slice(&v.to_le_bytes()),
            PsValue::Int8(v) => self.write_u8(*v as u8),
            PsValue::Uint64(v) => self.buf.extend_from_slice(&v.to_le_bytes()),
            PsValue::Uint32(v) => self.buf.extend_from_slice(&v.to_le_bytes()),
            PsValue::Uint16(v) => self.buf.extend_from_slice(&v.to_le_bytes()),
            PsValue::Uint8(v) => self.write_u8(*v),
            PsValue::Double(v) => self.buf.extend_from_slice(&v.to_le_bytes()),
            PsValue::String(v) => self.write_string(v),
            PsValue::Bool(v) => self.write_u8(*v as u8),
            PsValue::Object(m) => self.write_section(m)?,
            PsValue::Array(items) => self.write_array(items)?,
        }
        Ok(())
    }

    fn write_section(&mut self, map: &PsMap) -> Result<(), RpcError> {
        self.write_varint_count(map.len());
        for (key, val) in map {
            self.write_section_name(key)?;
            self.write_entry(val)?;
        }
        Ok(())
    }
}

/// Serialize a root section to portable storage binary format.
pub fn serialize(root: &PsMap) -> Result<Vec<u8>, RpcError> {
    let mut w = Writer::new();
    w.buf.extend_from_slice(&SIGNATURE_A.to_le_bytes());
    w.buf.extend_from_slice(&SIGNATURE_B.to_le_bytes());
    w.write_u8(FORMAT_VER);
    w.write_section(root)?;
    Ok(w.buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(map: &PsMap) -> PsMap {
        deserialize(&serialize(map).unwrap()).unwrap()
    }

    #[test]
    fn test_header_bytes() {
        let bytes = serialize(&PsMap::new()).unwrap();
        assert_eq!(bytes, vec![0x01, 0x11, 0x01, 0x01, 0x01, 0x01, 0x02, 0x01, 0x01, 0x00]);
    }

    #[test]
    fn test_roundtrip_heights() {
        let map = PsValue::map_from_json(
            json!({"heights": [123456, 1234567, 870987]}).as_object().unwrap(),
        )
        .unwrap();
        let back = roundtrip(&map);
        assert_eq!(back, map);
        let heights: Vec<u64> = back["heights"].as_array().unwrap().iter().filter_map(PsValue::as_u64).collect();
        assert_eq!(heights, vec![123456, 1234567, 870987]);
    }

    #[test]
    fn test_roundtrip_long_string() {
        let text: String = (0..1400).map(|i| (b'a' + (i % 26) as u8) as char).collect();
        let mut map = PsMap::new();
        map.insert("blob".into(), PsValue::String(text.clone().into_bytes()));
        let back = roundtrip(&map);
        assert_eq!(back["blob"].as_str(), Some(text.as_str()));
        assert_eq!(back, map);
    }

    #[test]
    fn test_roundtrip_all_leaf_types() {
        let mut inner = PsMap::new();
        inner.insert("x".into(), PsValue::Uint32(42));
        inner.insert("binary".into(), PsValue::String(vec![0, 159, 255]));

        let mut map = PsMap::new();
        map.insert("i64".into(), PsValue::Int64(-9_000_000_000));
        map.insert("i32".into(), PsValue::Int32(-7));
        map.insert("u64".into(), PsValue::Uint64(u64::MAX));
        map.insert("u32".into(), PsValue::Uint32(u32::MAX));
        map.insert("double".into(), PsValue::Double(0.25));
        map.insert("flag".into(), PsValue::Bool(true));
        map.insert("nested".into(), PsValue::Object(inner.clone()));
        map.insert("objects".into(), PsValue::Array(vec![PsValue::Object(inner.clone()), PsValue::Object(inner)]));
        map.insert(
            "matrix".into(),
            PsValue::Array(vec![
                PsValue::Array(vec![PsValue::Uint8(1), PsValue::Uint8(2)]),
                PsValue::Array(vec![PsValue::String(b"a".to_vec())]),
            ]),
        );
        map.insert("empty".into(), PsValue::Array(vec![]));

        assert_eq!(roundtrip(&map), map);
    }

    #[test]
    fn test_mixed_array_rejected() {
        let mut map = PsMap::new();
        map.insert("bad".into(), PsValue::Array(vec![PsValue::Uint8(1), PsValue::Bool(true)]));
        assert!(matches!(serialize(&map), Err(RpcError::PortableStorage(_))));
    }

    #[test]
    fn test_signature_validation() {
        assert!(deserialize(&[0u8; 20]).is_err());
        assert!(deserialize(&[0x01, 0x11]).is_err());
    }

    #[test]
    fn test_truncated_entry() {
        let mut map = PsMap::new();
        map.insert("height".into(), PsValue::Uint64(7));
        let bytes = serialize(&map).unwrap();
        assert!(deserialize(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_varint_count_sizes() {
        for &count in &[0usize, 1, 63, 64, 100, 16383, 16384, 100_000, 1 << 30] {
            let mut w = Writer::new();
            w.write_varint_count(count);
            let mut r = Reader::new(&w.buf);
            assert_eq!(r.read_varint_count().unwrap(), count, "count {}", count);
            assert_eq!(r.pos, w.buf.len());
        }
    }

    #[test]
    fn test_json_conversion() {
        let value = json!({"txid": "ab", "n": -3, "ok": true, "skip": null, "list": [1.5]});
        let map = PsValue::map_from_json(value.as_object().unwrap()).unwrap();
        assert!(!map.contains_key("skip"));
        assert_eq!(map["n"], PsValue::Int64(-3));
        assert_eq!(PsValue::Object(map).to_json(), json!({"txid": "ab", "n": -3, "ok": true, "list": [1.5]}));
    }
}
