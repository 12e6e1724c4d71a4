//! EIP-712 Hashing
//!
//! Domain separator, struct hash and the final signing digest.

use super::encoder::{encode_data, keccak256};
use super::types::*;
use serde::Serialize;

/// Magic prefix for EIP-712 encoding
const EIP712_PREFIX: &[u8] = b"\x19\x01";

/// domainSeparator = hashStruct(EIP712Domain)
pub fn domain_separator(typed_data: &TypedData) -> Result<[u8; 32], Eip712Error> {
    let mut types = typed_data.types.clone();
    types.insert(DOMAIN_TYPE.to_string(), typed_data.domain_fields());

    let domain = serde_json::to_value(&typed_data.domain)
        .map_err(|e| Eip712Error::InvalidJson(e.to_string()))?;

    hash_struct(DOMAIN_TYPE, &domain, &types)
}

/// hashStruct(s) = keccak256(typeHash || encodeData(s))
pub fn hash_struct(
    type_name: &str,
    data: &serde_json::Value,
    types: &TypeMap,
) -> Result<[u8; 32], Eip712Error> {
    Ok(keccak256(&encode_data(type_name, data, types)?))
}

/// Digest handed to the signer:
/// keccak256("\x19\x01" || domainSeparator || hashStruct(message))
pub fn hash_typed_data(typed_data: &TypedData) -> Result<[u8; 32], Eip712Error> {
    Ok(get_pre_image(typed_data)?.final_hash)
}

/// Intermediate hashes, for display or external verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712PreImage {
    #[serde(serialize_with = "hex_0x")]
    pub domain_separator: [u8; 32],
    #[serde(serialize_with = "hex_0x")]
    pub struct_hash: [u8; 32],
    #[serde(serialize_with = "hex_0x")]
    pub final_hash: [u8; 32],
}

fn hex_0x<S: serde::Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

/// Validate, then compute every hash in the pipeline
pub fn get_pre_image(typed_data: &TypedData) -> Result<Eip712PreImage, Eip712Error> {
    typed_data.validate()?;

    let domain_separator = domain_separator(typed_data)?;
    let struct_hash = hash_struct(&typed_data.primary_type, &typed_data.message, &typed_data.types)?;

    let mut data = [0u8; 66];
    data[..2].copy_from_slice(EIP712_PREFIX);
    data[2..34].copy_from_slice(&domain_separator);
    data[34..].copy_from_slice(&struct_hash);

    Ok(Eip712PreImage {
        domain_separator,
        struct_hash,
        final_hash: keccak256(&data),
    })
}

#[cfg(test)]
mod hasher_tests {
    use super::*;
    use crate::eip712::tests::mail_example;

    #[test]
    fn test_mail_domain_separator() {
        let separator = domain_separator(&mail_example()).unwrap();
        assert_eq!(
            hex::encode(separator),
            "f2cee375fa42b42143804025fc449deafd50cc031ca257e0b194a650a912090f"
        );
    }

    #[test]
    fn test_pre_image_consistent_with_digest() {
        let typed_data = mail_example();
        let pre_image = get_pre_image(&typed_data).unwrap();
        assert_eq!(pre_image.final_hash, hash_typed_data(&typed_data).unwrap());
        assert_eq!(
            hex::encode(pre_image.struct_hash),
            "c52c0ee5d84264471806290a3f2c4cecfc5490626bf912d01f240d7a274b371e"
        );
    }

    #[test]
    fn test_pre_image_serializes_as_hex() {
        let pre_image = get_pre_image(&mail_example()).unwrap();
        let json = serde_json::to_value(&pre_image).unwrap();
        assert!(json["finalHash"].as_str().unwrap().starts_with("0xbe609aee"));
    }

    #[test]
    fn test_inferred_domain_matches_declared() {
        let mut typed_data = mail_example();
        let declared = hash_typed_data(&typed_data).unwrap();

        typed_data.types.remove(DOMAIN_TYPE);
        assert_eq!(hash_typed_data(&typed_data).unwrap(), declared);
    }
}
