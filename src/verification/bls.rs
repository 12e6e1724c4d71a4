//! BLS12-381 verification (min-pk, proof-of-possession ciphersuite)

use super::SchemeError;
use blst::min_pk::{PublicKey, Signature};
use blst::BLST_ERROR;

/// Domain separation tag (Ethereum consensus compatible)
pub const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

pub fn verify(message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool, SchemeError> {
    if signature.len() != 96 {
        return Err(SchemeError::InvalidSignature(format!(
            "BLS signature must be 96 bytes, got {}",
            signature.len()
        )));
    }
    if public_key.len() != 48 {
        return Err(SchemeError::InvalidPublicKey(format!(
            "BLS public key must be 48 bytes, got {}",
            public_key.len()
        )));
    }

    let public_key = PublicKey::key_validate(public_key)
        .map_err(|e| SchemeError::InvalidPublicKey(format!("{:?}", e)))?;
    let signature =
        Signature::from_bytes(signature).map_err(|e| SchemeError::InvalidSignature(format!("{:?}", e)))?;

    Ok(signature.verify(true, message, DST, &[], &public_key, true) == BLST_ERROR::BLST_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blst::min_pk::SecretKey;

    fn keypair() -> (SecretKey, [u8; 48]) {
        let secret = SecretKey::key_gen(&[42u8; 32], &[]).unwrap();
        let public = secret.sk_to_pk().to_bytes();
        (secret, public)
    }

    #[test]
    fn test_verify() {
        let (secret, public) = keypair();
        let signature = secret.sign(b"attest", DST, &[]).to_bytes();

        assert!(verify(b"attest", &signature, &public).unwrap());
        assert!(!verify(b"other", &signature, &public).unwrap());
    }

    #[test]
    fn test_lengths() {
        let (_, public) = keypair();
        assert!(matches!(
            verify(b"m", &[0u8; 64], &public),
            Err(SchemeError::InvalidSignature(_))
        ));
        assert!(matches!(
            verify(b"m", &[0u8; 96], &[0u8; 32]),
            Err(SchemeError::InvalidPublicKey(_))
        ));
    }
}
