//! Bencode ([BEP-0003](https://www.bittorrent.org/beps/bep_0003.html)) for larch.
//!
//! Metainfo files are hashed over their *encoded* info dictionary, so the
//! encoder must be able to splice already-encoded bytes back into a larger
//! structure without re-serializing them. [`Value::Raw`] exists for exactly
//! that; everything else is the plain BEP-0003 data model.

pub mod parser;

pub use parser::{parse, ParseError};

use std::collections::BTreeMap;

/// Dictionary with raw byte string keys.
///
/// BEP-0003 orders dictionary keys as raw byte strings, which is exactly
/// [`BTreeMap`]'s iteration order over `Vec<u8>` keys.
pub type Dict = BTreeMap<Vec<u8>, Value>;

/// A bencoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Integer, e.g. `i-42e`.
    Int(i64),
    /// Byte string, e.g. `4:spam`. Not necessarily UTF-8.
    Bytes(Vec<u8>),
    /// Already-bencoded bytes, emitted verbatim.
    ///
    /// The infohash is the SHA-1 of the encoded info dictionary, so the
    /// outer metainfo dictionary must carry those exact bytes rather than a
    /// re-encoding of the decoded structure.
    Raw(Vec<u8>),
    /// List, e.g. `li14e4:spame`.
    List(Vec<Value>),
    /// Dictionary with sorted keys.
    Dict(Dict),
}

impl Value {
    /// Encode to BEP-0003 bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        self.encode_into(&mut buffer);
        buffer
    }

    fn encode_into(&self, buffer: &mut Vec<u8>) {
        match self {
            Value::Int(int) => {
                buffer.push(b'i');
                buffer.extend_from_slice(int.to_string().as_bytes());
                buffer.push(b'e');
            }
            Value::Bytes(bytes) => {
                buffer.extend_from_slice(bytes.len().to_string().as_bytes());
                buffer.push(b':');
                buffer.extend_from_slice(bytes);
            }
            Value::Raw(encoded) => buffer.extend_from_slice(encoded),
            Value::List(items) => {
                buffer.push(b'l');
                for item in items {
                    item.encode_into(buffer);
                }
                buffer.push(b'e');
            }
            Value::Dict(entries) => {
                buffer.push(b'd');
                for (key, value) in entries {
                    buffer.extend_from_slice(key.len().to_string().as_bytes());
                    buffer.push(b':');
                    buffer.extend_from_slice(key);
                    value.encode_into(buffer);
                }
                buffer.push(b'e');
            }
        }
    }
}

impl From<i64> for Value {
    fn from(int: i64) -> Self {
        Value::Int(int)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Bytes(text.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Bytes(text.into_bytes())
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::Bytes(bytes.to_vec())
    }
}
