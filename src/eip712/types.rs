//! EIP-712 Type Definitions
//!
//! Core data structures for EIP-712 typed data and their structural
//! validation.

use crate::error::SigningError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use zeroize::Zeroize;

/// Name of the implicit domain struct
pub const DOMAIN_TYPE: &str = "EIP712Domain";

/// A field in a struct type definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypedDataField {
    pub name: String,
    /// Solidity type, e.g. "address", "uint256", "Person[]"
    #[serde(rename = "type")]
    pub type_name: String,
}

impl TypedDataField {
    pub fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
        }
    }
}

/// Struct name -> ordered field list
pub type TypeMap = BTreeMap<String, Vec<TypedDataField>>;

/// The EIP-712 domain
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Domain {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Number, decimal string or 0x-hex string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifying_contract: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
}

impl Eip712Domain {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.version.is_none()
            && self.chain_id.is_none()
            && self.verifying_contract.is_none()
            && self.salt.is_none()
    }

    /// Domain fields in canonical order, limited to the ones present
    pub fn present_fields(&self) -> Vec<TypedDataField> {
        let candidates = [
            (self.name.is_some(), "name", "string"),
            (self.version.is_some(), "version", "string"),
            (self.chain_id.is_some(), "chainId", "uint256"),
            (self.verifying_contract.is_some(), "verifyingContract", "address"),
            (self.salt.is_some(), "salt", "bytes32"),
        ];

        candidates
            .iter()
            .filter(|(present, _, _)| *present)
            .map(|(_, name, ty)| TypedDataField::new(name, ty))
            .collect()
    }
}

/// Complete EIP-712 typed data: (domain, schema, message)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    pub types: TypeMap,
    pub primary_type: String,
    pub domain: Eip712Domain,
    pub message: serde_json::Value,
}

impl TypedData {
    pub fn from_json(json: &str) -> Result<Self, Eip712Error> {
        serde_json::from_str(json).map_err(|e| Eip712Error::InvalidJson(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, Eip712Error> {
        serde_json::to_string(self).map_err(|e| Eip712Error::InvalidJson(e.to_string()))
    }

    /// Domain field list: the declared `EIP712Domain` if any, else inferred
    pub fn domain_fields(&self) -> Vec<TypedDataField> {
        match self.types.get(DOMAIN_TYPE) {
            Some(fields) => fields.clone(),
            None => self.domain.present_fields(),
        }
    }

    /// Structural validation, run before any hashing
    pub fn validate(&self) -> Result<(), Eip712Error> {
        if self.types.is_empty() {
            return Err(Eip712Error::EmptyField("types"));
        }
        if !self.types.contains_key(&self.primary_type) {
            return Err(Eip712Error::InvalidPrimaryType(self.primary_type.clone()));
        }
        if self.domain.is_empty() {
            return Err(Eip712Error::EmptyField("domain"));
        }
        match self.message.as_object() {
            Some(obj) if !obj.is_empty() => {}
            _ => return Err(Eip712Error::EmptyField("message")),
        }

        for (struct_name, fields) in &self.types {
            for field in fields {
                if !is_known_type(&field.type_name, &self.types) {
                    return Err(Eip712Error::UndeclaredType {
                        owner: struct_name.clone(),
                        type_name: field.type_name.clone(),
                    });
                }
            }
        }

        detect_cycles(&self.types)
    }
}

/// Whether `type_name` (possibly an array) resolves to a builtin or declared struct
fn is_known_type(type_name: &str, types: &TypeMap) -> bool {
    if parse_array_suffix(type_name).is_err() {
        return false;
    }
    let base = base_type(type_name);
    is_atomic_type(base) || is_dynamic_type(base) || types.contains_key(base)
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    InProgress,
    Done,
}

/// Reject struct types that reach themselves through their fields
fn detect_cycles(types: &TypeMap) -> Result<(), Eip712Error> {
    fn visit<'a>(
        name: &'a str,
        types: &'a TypeMap,
        state: &mut HashMap<&'a str, Visit>,
    ) -> Result<(), Eip712Error> {
        match state.get(name) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::InProgress) => return Err(Eip712Error::CyclicType(name.to_string())),
            None => {}
        }

        state.insert(name, Visit::InProgress);
        if let Some(fields) = types.get(name) {
            for field in fields {
                let base = base_type(&field.type_name);
                if types.contains_key(base) {
                    visit(base, types, state)?;
                }
            }
        }
        state.insert(name, Visit::Done);
        Ok(())
    }

    let mut state = HashMap::new();
    for name in types.keys() {
        visit(name, types, &mut state)?;
    }
    Ok(())
}

/// Strip every array suffix: "Person[][2]" -> "Person"
pub fn base_type(type_name: &str) -> &str {
    match type_name.find('[') {
        Some(pos) => &type_name[..pos],
        None => type_name,
    }
}

/// Split off the outermost array dimension
///
/// "uint256[3][]" -> ("uint256[3]", None); "bytes32[4]" -> ("bytes32", Some(4)).
/// Returns `Ok(None)` for non-array types.
pub fn split_array_type(type_name: &str) -> Result<Option<(&str, Option<usize>)>, Eip712Error> {
    if !type_name.ends_with(']') {
        return Ok(None);
    }
    let open = type_name
        .rfind('[')
        .ok_or_else(|| Eip712Error::InvalidType(type_name.to_string()))?;
    let inner = &type_name[open + 1..type_name.len() - 1];
    let length = if inner.is_empty() {
        None
    } else {
        Some(
            inner
                .parse::<usize>()
                .map_err(|_| Eip712Error::InvalidType(type_name.to_string()))?,
        )
    };
    Ok(Some((&type_name[..open], length)))
}

fn parse_array_suffix(type_name: &str) -> Result<(), Eip712Error> {
    let mut current = type_name;
    while let Some((element, _)) = split_array_type(current)? {
        current = element;
    }
    if current.contains('[') || current.contains(']') {
        return Err(Eip712Error::InvalidType(type_name.to_string()));
    }
    Ok(())
}

/// Recoverable secp256k1 signature over an EIP-712 digest
#[derive(Debug, Clone, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct Eip712Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// 27/28 (or 0/1 from some agents)
    pub v: u8,
}

impl Eip712Signature {
    pub fn new(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Self { r, s, v }
    }

    /// Parse r || s || v
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Eip712Error> {
        if bytes.len() != 65 {
            return Err(Eip712Error::InvalidSignature(format!(
                "expected 65 bytes, got {}",
                bytes.len()
            )));
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, v: bytes[64] })
    }

    pub fn from_hex(signature: &str) -> Result<Self, Eip712Error> {
        let bytes = parse_hex(signature)?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    /// Recovery id in 0..=1
    pub fn recovery_id(&self) -> Result<i32, Eip712Error> {
        match self.v {
            0 | 1 => Ok(self.v as i32),
            27 | 28 => Ok((self.v - 27) as i32),
            v => Err(Eip712Error::InvalidSignature(format!("invalid v value {}", v))),
        }
    }
}

/// Errors that can occur during EIP-712 operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Eip712Error {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Typed data {0} must not be empty")]
    EmptyField(&'static str),

    #[error("Invalid type: {0}")]
    InvalidType(String),

    #[error("Primary type {0} is not declared in types")]
    InvalidPrimaryType(String),

    #[error("Type {owner} references undeclared type {type_name}")]
    UndeclaredType { owner: String, type_name: String },

    #[error("Type {0} references itself")]
    CyclicType(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Invalid value for type {type_name}: {value}")]
    InvalidValue { type_name: String, value: String },

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

impl From<Eip712Error> for SigningError {
    fn from(e: Eip712Error) -> Self {
        SigningError::invalid_request(e.to_string())
    }
}

/// Fixed-size builtin: address, bool, uintN, intN, bytesN
pub fn is_atomic_type(type_name: &str) -> bool {
    match type_name {
        "address" | "bool" => return true,
        _ => {}
    }

    if let Some(bits) = integer_bits(type_name) {
        return bits > 0 && bits <= 256 && bits % 8 == 0;
    }

    if let Some(size) = type_name.strip_prefix("bytes") {
        if let Ok(n) = size.parse::<u32>() {
            return (1..=32).contains(&n);
        }
    }

    false
}

/// Width of a uintN/intN type name
pub fn integer_bits(type_name: &str) -> Option<u32> {
    type_name
        .strip_prefix("uint")
        .or_else(|| type_name.strip_prefix("int"))
        .and_then(|bits| bits.parse().ok())
}

pub fn is_dynamic_type(type_name: &str) -> bool {
    type_name == "bytes" || type_name == "string"
}

/// Decode a hex string with or without 0x prefix
pub(crate) fn parse_hex(s: &str) -> Result<Vec<u8>, Eip712Error> {
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    hex::decode(s).map_err(|e| Eip712Error::EncodingError(format!("invalid hex: {}", e)))
}

#[cfg(test)]
mod type_tests {
    use super::*;

    fn types_of(entries: &[(&str, &[(&str, &str)])]) -> TypeMap {
        entries
            .iter()
            .map(|(name, fields)| {
                (
                    name.to_string(),
                    fields.iter().map(|(n, t)| TypedDataField::new(n, t)).collect(),
                )
            })
            .collect()
    }

    fn typed(types: TypeMap, primary: &str) -> TypedData {
        TypedData {
            types,
            primary_type: primary.to_string(),
            domain: Eip712Domain {
                name: Some("Test".into()),
                ..Default::default()
            },
            message: serde_json::json!({ "x": 1 }),
        }
    }

    #[test]
    fn test_atomic_types() {
        for ty in ["address", "bool", "uint256", "uint8", "int256", "bytes32", "bytes1"] {
            assert!(is_atomic_type(ty), "{}", ty);
        }
        for ty in ["string", "bytes", "uint", "uint257", "uint7", "bytes33", "bytes0"] {
            assert!(!is_atomic_type(ty), "{}", ty);
        }
    }

    #[test]
    fn test_split_array_type() {
        assert_eq!(split_array_type("uint256").unwrap(), None);
        assert_eq!(split_array_type("Person[]").unwrap(), Some(("Person", None)));
        assert_eq!(
            split_array_type("uint8[3][]").unwrap(),
            Some(("uint8[3]", None))
        );
        assert_eq!(split_array_type("bytes32[4]").unwrap(), Some(("bytes32", Some(4))));
        assert!(split_array_type("bytes32[x]").is_err());
    }

    #[test]
    fn test_missing_primary_type() {
        let data = typed(types_of(&[("Foo", &[("x", "uint256")])]), "Bar");
        assert_eq!(
            data.validate(),
            Err(Eip712Error::InvalidPrimaryType("Bar".into()))
        );
    }

    #[test]
    fn test_undeclared_reference() {
        let data = typed(types_of(&[("Foo", &[("x", "Missing")])]), "Foo");
        assert!(matches!(
            data.validate(),
            Err(Eip712Error::UndeclaredType { .. })
        ));
    }

    #[test]
    fn test_self_reference_rejected() {
        let data = typed(types_of(&[("Node", &[("next", "Node")])]), "Node");
        assert_eq!(data.validate(), Err(Eip712Error::CyclicType("Node".into())));
    }

    #[test]
    fn test_indirect_cycle_rejected() {
        let data = typed(
            types_of(&[("A", &[("b", "B[]")]), ("B", &[("a", "A")])]),
            "A",
        );
        assert!(matches!(data.validate(), Err(Eip712Error::CyclicType(_))));
    }

    #[test]
    fn test_empty_parts_rejected() {
        let mut data = typed(types_of(&[("Foo", &[("x", "uint256")])]), "Foo");
        data.message = serde_json::json!({});
        assert_eq!(data.validate(), Err(Eip712Error::EmptyField("message")));

        let mut data = typed(types_of(&[("Foo", &[("x", "uint256")])]), "Foo");
        data.domain = Eip712Domain::default();
        assert_eq!(data.validate(), Err(Eip712Error::EmptyField("domain")));
    }

    #[test]
    fn test_signature_bytes() {
        let sig = Eip712Signature::new([1u8; 32], [2u8; 32], 28);
        let parsed = Eip712Signature::from_hex(&sig.to_hex()).unwrap();
        assert_eq!(parsed, sig);
        assert_eq!(parsed.recovery_id().unwrap(), 1);
        assert!(Eip712Signature::new([1u8; 32], [2u8; 32], 29).recovery_id().is_err());
    }
}
