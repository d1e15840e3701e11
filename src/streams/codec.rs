//! Schema encoder/decoder.
//!
//! Payloads are the ABI parameter encoding of the schema fields in order.
//! Entity ids travel as `bytes32`: publishers write the decimal id as
//! right-padded UTF-8, older publishers wrote a left-padded integer. Both
//! are accepted on decode.

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::{Address, B256, U256};

use crate::streams::schemas::SchemaKind;
use crate::streams::StreamError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    pub ty: DynSolType,
}

/// Parsed schema, able to encode and decode payloads.
#[derive(Debug, Clone)]
pub struct SchemaCodec {
    fields: Vec<SchemaField>,
}

impl SchemaCodec {
    pub fn parse(schema: &str) -> Result<Self, StreamError> {
        let mut fields = Vec::new();
        for part in schema.split(',') {
            let part = part.trim();
            let mut words = part.split_whitespace();
            let (Some(ty), Some(name), None) = (words.next(), words.next(), words.next()) else {
                return Err(StreamError::Schema(format!("bad field `{part}`")));
            };
            let ty = DynSolType::parse(ty)
                .map_err(|e| StreamError::Schema(format!("bad type in `{part}`: {e}")))?;
            if fields.iter().any(|f: &SchemaField| f.name == name) {
                return Err(StreamError::Schema(format!("duplicate field `{name}`")));
            }
            fields.push(SchemaField {
                name: name.to_string(),
                ty,
            });
        }
        Ok(Self { fields })
    }

    pub fn for_kind(kind: SchemaKind) -> Result<Self, StreamError> {
        Self::parse(kind.schema())
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    /// Encode `payload`, taking fields in schema order.
    pub fn encode(&self, payload: &StreamPayload) -> Result<Vec<u8>, StreamError> {
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = payload.value(&field.name)?;
            if !field.ty.matches(value) {
                return Err(StreamError::FieldType {
                    field: field.name.clone(),
                    expected: field.ty.sol_type_name().into_owned(),
                });
            }
            values.push(value.clone());
        }
        Ok(DynSolValue::Tuple(values).abi_encode_params())
    }

    pub fn decode(&self, data: &[u8]) -> Result<StreamPayload, StreamError> {
        let tuple = DynSolType::Tuple(self.fields.iter().map(|f| f.ty.clone()).collect());
        let decoded = tuple
            .abi_decode_params(data)
            .map_err(|e| StreamError::Abi(e.to_string()))?;
        let DynSolValue::Tuple(values) = decoded else {
            return Err(StreamError::Abi("expected a tuple".into()));
        };
        Ok(StreamPayload {
            fields: self
                .fields
                .iter()
                .map(|f| f.name.clone())
                .zip(values)
                .collect(),
        })
    }
}

/// Named field values of one payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamPayload {
    fields: Vec<(String, DynSolValue)>,
}

impl StreamPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: DynSolValue) -> Self {
        self.fields.retain(|(n, _)| n != name);
        self.fields.push((name.to_string(), value));
        self
    }

    pub fn with_uint(self, name: &str, value: U256, bits: usize) -> Self {
        self.with(name, DynSolValue::Uint(value, bits))
    }

    pub fn with_address(self, name: &str, value: Address) -> Self {
        self.with(name, DynSolValue::Address(value))
    }

    pub fn with_string(self, name: &str, value: &str) -> Self {
        self.with(name, DynSolValue::String(value.to_string()))
    }

    pub fn with_bytes32(self, name: &str, value: B256) -> Self {
        self.with(name, DynSolValue::FixedBytes(value, 32))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn value(&self, name: &str) -> Result<&DynSolValue, StreamError> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| StreamError::MissingField(name.to_string()))
    }

    fn type_error(name: &str, expected: &str) -> StreamError {
        StreamError::FieldType {
            field: name.to_string(),
            expected: expected.to_string(),
        }
    }

    pub fn uint(&self, name: &str) -> Result<U256, StreamError> {
        match self.value(name)? {
            DynSolValue::Uint(v, _) => Ok(*v),
            _ => Err(Self::type_error(name, "uint")),
        }
    }

    pub fn u64(&self, name: &str) -> Result<u64, StreamError> {
        u64::try_from(self.uint(name)?).map_err(|_| Self::type_error(name, "uint64"))
    }

    pub fn u8(&self, name: &str) -> Result<u8, StreamError> {
        u8::try_from(self.uint(name)?).map_err(|_| Self::type_error(name, "uint8"))
    }

    pub fn address(&self, name: &str) -> Result<Address, StreamError> {
        match self.value(name)? {
            DynSolValue::Address(a) => Ok(*a),
            _ => Err(Self::type_error(name, "address")),
        }
    }

    pub fn string(&self, name: &str) -> Result<&str, StreamError> {
        match self.value(name)? {
            DynSolValue::String(s) => Ok(s.as_str()),
            _ => Err(Self::type_error(name, "string")),
        }
    }

    pub fn bytes32(&self, name: &str) -> Result<B256, StreamError> {
        match self.value(name)? {
            DynSolValue::FixedBytes(word, 32) => Ok(*word),
            _ => Err(Self::type_error(name, "bytes32")),
        }
    }

    /// A `bytes32` field holding a job or escrow id.
    pub fn entity_id(&self, name: &str) -> Result<u64, StreamError> {
        let word = self.bytes32(name)?;
        normalize_entity_id(&word).ok_or(StreamError::BadEntityId(word))
    }
}

/// Right-pad `text` into a `bytes32`.
pub fn text_to_bytes32(text: &str) -> Result<B256, StreamError> {
    let bytes = text.as_bytes();
    if bytes.len() > 32 {
        return Err(StreamError::Schema(format!("`{text}` is longer than 32 bytes")));
    }
    let mut word = [0u8; 32];
    word[..bytes.len()].copy_from_slice(bytes);
    Ok(B256::from(word))
}

/// Right-padded printable text, if `word` holds one.
pub fn bytes32_to_text(word: &B256) -> Option<String> {
    let end = word.iter().rposition(|b| *b != 0)? + 1;
    let text = std::str::from_utf8(&word[..end]).ok()?;
    if text.chars().all(|c| !c.is_control()) {
        Some(text.to_string())
    } else {
        None
    }
}

pub fn encode_entity_id(id: u64) -> B256 {
    let digits = id.to_string();
    let mut word = [0u8; 32];
    word[..digits.len()].copy_from_slice(digits.as_bytes());
    B256::from(word)
}

/// Left-padded big-endian form of an entity id.
pub fn encode_entity_id_numeric(id: u64) -> B256 {
    B256::from(U256::from(id))
}

/// Read an entity id in either published form.
pub fn normalize_entity_id(word: &B256) -> Option<u64> {
    if word.is_zero() {
        return None;
    }
    if word[0] != 0 {
        let text = bytes32_to_text(word)?;
        if !text.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        return text.parse().ok();
    }
    u64::try_from(U256::from_be_bytes(word.0)).ok()
}

/// Human readable form of an opaque `bytes32` identifier.
pub fn identifier_text(word: &B256) -> String {
    if let Some(id) = normalize_entity_id(word) {
        return id.to_string();
    }
    bytes32_to_text(word).unwrap_or_else(|| format!("{word}"))
}
