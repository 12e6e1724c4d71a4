//! secp256k1 ECDSA verification by public-key recovery

use super::SchemeError;
use crate::eip712::{checksum_address, public_key_to_address};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1};
use subtle::ConstantTimeEq;

/// secp256k1 group order n, big-endian
const CURVE_ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];

/// r || s || v, each part checked independently
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdsaComponents {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// Normalized to 0/1
    pub recovery_id: u8,
}

impl EcdsaComponents {
    pub fn parse(signature: &[u8]) -> Result<Self, SchemeError> {
        if signature.len() != 65 {
            return Err(SchemeError::InvalidSignature(format!(
                "ECDSA signature must be 65 bytes, got {}",
                signature.len()
            )));
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&signature[..32]);
        s.copy_from_slice(&signature[32..64]);

        if !is_valid_scalar(&r) {
            return Err(SchemeError::InvalidSignature("r is out of range".into()));
        }
        if !is_valid_scalar(&s) {
            return Err(SchemeError::InvalidSignature("s is out of range".into()));
        }

        let recovery_id = match signature[64] {
            0 | 1 => signature[64],
            27 | 28 => signature[64] - 27,
            v => {
                return Err(SchemeError::InvalidSignature(format!(
                    "recovery byte must be 0, 1, 27 or 28, got {}",
                    v
                )))
            }
        };

        Ok(Self { r, s, recovery_id })
    }
}

/// 0 < scalar < n
fn is_valid_scalar(scalar: &[u8; 32]) -> bool {
    scalar.iter().any(|&b| b != 0) && scalar.as_slice() < CURVE_ORDER.as_slice()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdsaOutcome {
    pub is_valid: bool,
    /// EIP-55 address of the recovered key
    pub recovered_address: String,
}

/// Recover the signer of `digest` and compare it with `expected`
///
/// `expected` is a 33/65-byte SEC1 public key or a 20-byte address.
pub fn verify(digest: &[u8; 32], signature: &[u8], expected: &[u8]) -> Result<EcdsaOutcome, SchemeError> {
    let components = EcdsaComponents::parse(signature)?;
    let recovered = recover(digest, &components)?;
    let address = public_key_to_address(&recovered);

    let is_valid = match expected.len() {
        20 => bool::from(address.as_slice().ct_eq(expected)),
        33 | 65 => {
            let key = PublicKey::from_slice(expected)
                .map_err(|e| SchemeError::InvalidPublicKey(e.to_string()))?;
            bool::from(recovered.serialize().as_slice().ct_eq(key.serialize().as_slice()))
        }
        n => {
            return Err(SchemeError::InvalidPublicKey(format!(
                "expected a 20-byte address or 33/65-byte key, got {} bytes",
                n
            )))
        }
    };

    Ok(EcdsaOutcome {
        is_valid,
        recovered_address: checksum_address(&address),
    })
}

/// Public key that produced `components` over `digest`
pub fn recover(digest: &[u8; 32], components: &EcdsaComponents) -> Result<PublicKey, SchemeError> {
    let secp = Secp256k1::verification_only();

    let recovery_id = RecoveryId::from_i32(components.recovery_id as i32)
        .map_err(|e| SchemeError::InvalidSignature(e.to_string()))?;

    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(&components.r);
    compact[32..].copy_from_slice(&components.s);

    let signature = RecoverableSignature::from_compact(&compact, recovery_id)
        .map_err(|e| SchemeError::InvalidSignature(e.to_string()))?;

    secp.recover_ecdsa(&Message::from_digest(*digest), &signature)
        .map_err(|e| SchemeError::InvalidSignature(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::LocalKeyAgent;

    fn signed(digest: &[u8; 32]) -> (LocalKeyAgent, [u8; 65]) {
        let agent = LocalKeyAgent::random();
        let sig = agent.sign_digest(digest);
        (agent, sig)
    }

    #[test]
    fn test_verify_against_address_and_key() {
        let digest = [9u8; 32];
        let (agent, sig) = signed(&digest);

        let address = hex::decode(agent.address().trim_start_matches("0x")).unwrap();
        let outcome = verify(&digest, &sig, &address).unwrap();
        assert!(outcome.is_valid);
        assert_eq!(outcome.recovered_address, agent.address());

        let key = hex::decode(agent.public_key_hex().trim_start_matches("0x")).unwrap();
        assert!(verify(&digest, &sig, &key).unwrap().is_valid);
    }

    #[test]
    fn test_wrong_digest_does_not_match() {
        let (agent, sig) = signed(&[1u8; 32]);
        let key = hex::decode(agent.public_key_hex().trim_start_matches("0x")).unwrap();
        assert!(!verify(&[2u8; 32], &sig, &key).unwrap().is_valid);
    }

    #[test]
    fn test_zero_recovery_byte_accepted() {
        let digest = [3u8; 32];
        let (agent, mut sig) = signed(&digest);
        sig[64] -= 27;
        let address = hex::decode(agent.address().trim_start_matches("0x")).unwrap();
        assert!(verify(&digest, &sig, &address).unwrap().is_valid);
    }

    #[test]
    fn test_component_checks() {
        let mut sig = [1u8; 65];
        sig[64] = 27;
        assert!(EcdsaComponents::parse(&sig).is_ok());

        let mut zero_r = sig;
        zero_r[..32].copy_from_slice(&[0u8; 32]);
        assert!(EcdsaComponents::parse(&zero_r).is_err());

        let mut high_s = sig;
        high_s[32..64].copy_from_slice(&CURVE_ORDER);
        assert!(EcdsaComponents::parse(&high_s).is_err());

        let mut bad_v = sig;
        bad_v[64] = 29;
        assert!(EcdsaComponents::parse(&bad_v).is_err());

        assert!(EcdsaComponents::parse(&sig[..64]).is_err());
    }
}
