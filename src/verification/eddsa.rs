//! Ed25519 verification

use super::SchemeError;
use ed25519_dalek::{Signature, VerifyingKey};

pub fn verify(message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool, SchemeError> {
    let signature: [u8; 64] = signature.try_into().map_err(|_| {
        SchemeError::InvalidSignature(format!("EdDSA signature must be 64 bytes, got {}", signature.len()))
    })?;
    let public_key: [u8; 32] = public_key.try_into().map_err(|_| {
        SchemeError::InvalidPublicKey(format!("Ed25519 public key must be 32 bytes, got {}", public_key.len()))
    })?;

    let verifying_key =
        VerifyingKey::from_bytes(&public_key).map_err(|e| SchemeError::InvalidPublicKey(e.to_string()))?;
    let signature = Signature::from_bytes(&signature);

    Ok(verifying_key.verify_strict(message, &signature).is_ok())
}
