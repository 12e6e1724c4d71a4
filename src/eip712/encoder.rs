//! EIP-712 Type Encoding
//!
//! `encodeType`, `encodeData` and the per-field 32-byte word encoding.
//! Integers use full 256-bit arithmetic.

use super::types::*;
use primitive_types::U256;
use serde_json::Value;
use std::collections::BTreeSet;
use tiny_keccak::{Hasher, Keccak};

/// Encode a struct type string: primary type first, dependencies sorted
///
/// "Mail(Person from,Person to,string contents)Person(string name,address wallet)"
pub fn encode_type(type_name: &str, types: &TypeMap) -> Result<String, Eip712Error> {
    let fields = types
        .get(type_name)
        .ok_or_else(|| Eip712Error::InvalidType(type_name.to_string()))?;

    let mut result = format_type_string(type_name, fields);

    // BTreeSet iterates in sorted order
    for dep in find_type_dependencies(type_name, types) {
        if dep == type_name {
            continue;
        }
        if let Some(dep_fields) = types.get(&dep) {
            result.push_str(&format_type_string(&dep, dep_fields));
        }
    }

    Ok(result)
}

fn format_type_string(type_name: &str, fields: &[TypedDataField]) -> String {
    let members: Vec<String> = fields
        .iter()
        .map(|f| format!("{} {}", f.type_name, f.name))
        .collect();
    format!("{}({})", type_name, members.join(","))
}

/// All struct types reachable from `type_name`, itself included
pub fn find_type_dependencies(type_name: &str, types: &TypeMap) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let mut pending = vec![type_name.to_string()];

    while let Some(current) = pending.pop() {
        if found.contains(&current) {
            continue;
        }
        let Some(fields) = types.get(&current) else {
            continue;
        };
        for field in fields {
            let base = base_type(&field.type_name);
            if types.contains_key(base) && !found.contains(base) {
                pending.push(base.to_string());
            }
        }
        found.insert(current);
    }

    found
}

/// typeHash = keccak256(encodeType(type))
pub fn type_hash(type_name: &str, types: &TypeMap) -> Result<[u8; 32], Eip712Error> {
    Ok(keccak256(encode_type(type_name, types)?.as_bytes()))
}

/// typeHash || enc(field_1) || ... || enc(field_n)
pub fn encode_data(type_name: &str, value: &Value, types: &TypeMap) -> Result<Vec<u8>, Eip712Error> {
    let obj = value.as_object().ok_or_else(|| invalid_value(type_name, value))?;
    let fields = types
        .get(type_name)
        .ok_or_else(|| Eip712Error::InvalidType(type_name.to_string()))?;

    let mut encoded = Vec::with_capacity(32 * (fields.len() + 1));
    encoded.extend_from_slice(&type_hash(type_name, types)?);

    for field in fields {
        let field_value = obj
            .get(&field.name)
            .ok_or_else(|| Eip712Error::MissingField(format!("{}.{}", type_name, field.name)))?;
        encoded.extend_from_slice(&encode_field(&field.type_name, field_value, types)?);
    }

    Ok(encoded)
}

/// Encode one member value into its 32-byte word
///
/// Strings and bytes are hashed, nested structs go through hashStruct and
/// arrays hash the concatenation of their element words.
pub fn encode_field(type_name: &str, value: &Value, types: &TypeMap) -> Result<[u8; 32], Eip712Error> {
    if let Some((element_type, fixed_len)) = split_array_type(type_name)? {
        let items = value.as_array().ok_or_else(|| invalid_value(type_name, value))?;
        if let Some(expected) = fixed_len {
            if items.len() != expected {
                return Err(Eip712Error::InvalidValue {
                    type_name: type_name.to_string(),
                    value: format!("expected {} elements, got {}", expected, items.len()),
                });
            }
        }

        let mut concatenated = Vec::with_capacity(32 * items.len());
        for item in items {
            concatenated.extend_from_slice(&encode_field(element_type, item, types)?);
        }
        return Ok(keccak256(&concatenated));
    }

    match type_name {
        "string" => {
            let s = value.as_str().ok_or_else(|| invalid_value(type_name, value))?;
            Ok(keccak256(s.as_bytes()))
        }
        "bytes" => {
            let s = value.as_str().ok_or_else(|| invalid_value(type_name, value))?;
            Ok(keccak256(&parse_hex(s)?))
        }
        _ if types.contains_key(type_name) => Ok(keccak256(&encode_data(type_name, value, types)?)),
        _ => encode_atomic(type_name, value),
    }
}

/// ABI-encode a fixed-size scalar
fn encode_atomic(type_name: &str, value: &Value) -> Result<[u8; 32], Eip712Error> {
    let mut word = [0u8; 32];

    if type_name == "address" {
        let addr = value.as_str().ok_or_else(|| invalid_value(type_name, value))?;
        word[12..].copy_from_slice(&parse_address(addr)?);
        return Ok(word);
    }

    if type_name == "bool" {
        let b = value.as_bool().ok_or_else(|| invalid_value(type_name, value))?;
        word[31] = b as u8;
        return Ok(word);
    }

    if let Some(bits) = integer_bits(type_name) {
        let n = if type_name.starts_with("uint") {
            let n = parse_uint(type_name, value)?;
            if n.bits() > bits as usize {
                return Err(overflow(type_name, value));
            }
            n
        } else {
            encode_signed(type_name, bits, value)?
        };
        n.to_big_endian(&mut word);
        return Ok(word);
    }

    if let Some(size) = type_name.strip_prefix("bytes") {
        let size: usize = size
            .parse()
            .map_err(|_| Eip712Error::InvalidType(type_name.to_string()))?;
        let s = value.as_str().ok_or_else(|| invalid_value(type_name, value))?;
        let bytes = parse_hex(s)?;
        if bytes.len() > size {
            return Err(Eip712Error::InvalidValue {
                type_name: type_name.to_string(),
                value: format!("{} bytes exceeds {}", bytes.len(), size),
            });
        }
        // Right-padded
        word[..bytes.len()].copy_from_slice(&bytes);
        return Ok(word);
    }

    Err(Eip712Error::InvalidType(type_name.to_string()))
}

/// Two's-complement encoding of an intN value
fn encode_signed(type_name: &str, bits: u32, value: &Value) -> Result<U256, Eip712Error> {
    let (negative, magnitude) = parse_signed(type_name, value)?;
    let limit = U256::one() << (bits as usize - 1);

    let in_range = if negative {
        magnitude <= limit
    } else {
        magnitude < limit
    };
    if !in_range {
        return Err(overflow(type_name, value));
    }

    if negative {
        Ok(magnitude.overflowing_neg().0)
    } else {
        Ok(magnitude)
    }
}

/// Unsigned integer from a JSON number, decimal string or 0x-hex string
fn parse_uint(type_name: &str, value: &Value) -> Result<U256, Eip712Error> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| invalid_value(type_name, value)),
        Value::String(s) => parse_uint_str(type_name, s),
        _ => Err(invalid_value(type_name, value)),
    }
}

fn parse_uint_str(type_name: &str, s: &str) -> Result<U256, Eip712Error> {
    let s = s.trim();
    let invalid = || Eip712Error::InvalidValue {
        type_name: type_name.to_string(),
        value: s.to_string(),
    };

    if let Some(digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if digits.is_empty() || digits.len() > 64 {
            return Err(invalid());
        }
        let padded = if digits.len() % 2 == 1 {
            format!("0{}", digits)
        } else {
            digits.to_string()
        };
        let bytes = hex::decode(padded).map_err(|_| invalid())?;
        return Ok(U256::from_big_endian(&bytes));
    }

    U256::from_dec_str(s).map_err(|_| invalid())
}

/// (is_negative, magnitude)
fn parse_signed(type_name: &str, value: &Value) -> Result<(bool, U256), Eip712Error> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok((i < 0, U256::from(i.unsigned_abs())))
            } else if let Some(u) = n.as_u64() {
                Ok((false, U256::from(u)))
            } else {
                Err(invalid_value(type_name, value))
            }
        }
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix('-') {
                Some(rest) => Ok((true, parse_uint_str(type_name, rest)?)),
                None => Ok((false, parse_uint_str(type_name, s)?)),
            }
        }
        _ => Err(invalid_value(type_name, value)),
    }
}

/// Parse a 20-byte hex address (checksum not enforced)
pub fn parse_address(addr: &str) -> Result<[u8; 20], Eip712Error> {
    let digits = addr.strip_prefix("0x").unwrap_or(addr);
    if digits.len() != 40 {
        return Err(Eip712Error::InvalidAddress(format!(
            "expected 40 hex chars, got {}",
            digits.len()
        )));
    }

    let bytes = hex::decode(digits).map_err(|e| Eip712Error::InvalidAddress(e.to_string()))?;
    let mut result = [0u8; 20];
    result.copy_from_slice(&bytes);
    Ok(result)
}

fn invalid_value(type_name: &str, value: &Value) -> Eip712Error {
    Eip712Error::InvalidValue {
        type_name: type_name.to_string(),
        value: value.to_string(),
    }
}

fn overflow(type_name: &str, value: &Value) -> Eip712Error {
    Eip712Error::InvalidValue {
        type_name: type_name.to_string(),
        value: format!("{} out of range", value),
    }
}

/// Keccak-256
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}
