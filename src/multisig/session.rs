//! Session state for one multi-signature transaction

use crate::types::{CollectedSignature, MultiSigSigningResponse};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiSigStatus {
    Pending,
    /// Quorum reached; late signatures are still recorded
    Completed,
    Cancelled,
    Expired,
}

impl fmt::Display for MultiSigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MultiSigStatus::Pending => "pending",
            MultiSigStatus::Completed => "completed",
            MultiSigStatus::Cancelled => "cancelled",
            MultiSigStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSigSession {
    pub transaction_id: String,
    pub chain_id: String,
    pub topic: String,
    pub payload: String,
    pub required_signatures: usize,
    /// Authorized signers in declaration order
    pub signers: Vec<String>,
    /// Accepted signatures in insertion order
    pub signatures: Vec<CollectedSignature>,
    pub status: MultiSigStatus,
    pub created_at: u64,
    pub expires_at: u64,
    pub completed_at: Option<u64>,
}

impl MultiSigSession {
    pub fn is_authorized(&self, signer: &str) -> bool {
        self.signers.iter().any(|s| same_signer(s, signer))
    }

    pub fn has_signed(&self, signer: &str) -> bool {
        self.signatures.iter().any(|s| same_signer(&s.signer, signer))
    }

    pub fn pending_signers(&self) -> Vec<String> {
        self.signers
            .iter()
            .filter(|s| !self.has_signed(s))
            .cloned()
            .collect()
    }

    pub fn quorum_met(&self) -> bool {
        self.signatures.len() >= self.required_signatures
    }

    pub fn is_complete(&self) -> bool {
        self.status == MultiSigStatus::Completed
    }

    /// Mark a pending session expired once `now` passes `expires_at`.
    /// Returns true when this call made the transition.
    pub fn refresh_expiry(&mut self, now: u64) -> bool {
        if self.status == MultiSigStatus::Pending && now > self.expires_at {
            self.status = MultiSigStatus::Expired;
            return true;
        }
        false
    }

    pub fn to_response(&self, completed_by_this_call: bool) -> MultiSigSigningResponse {
        MultiSigSigningResponse {
            transaction_id: self.transaction_id.clone(),
            status: self.status,
            required_signatures: self.required_signatures,
            signatures: self.signatures.clone(),
            pending_signers: self.pending_signers(),
            is_complete: self.is_complete(),
            completed_by_this_call,
            expires_at: self.expires_at,
        }
    }
}

/// Signer identities compare case-insensitively so checksummed and
/// lowercase addresses name the same signer
pub fn same_signer(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> MultiSigSession {
        MultiSigSession {
            transaction_id: "tx".into(),
            chain_id: "eip155:1".into(),
            topic: "t".into(),
            payload: "0x01".into(),
            required_signatures: 2,
            signers: vec!["0xAa".into(), "0xbb".into(), "0xcc".into()],
            signatures: Vec::new(),
            status: MultiSigStatus::Pending,
            created_at: 0,
            expires_at: 100,
            completed_at: None,
        }
    }

    #[test]
    fn test_signer_matching_ignores_case() {
        let mut s = session();
        assert!(s.is_authorized("0xaa"));
        assert!(!s.is_authorized("0xdd"));

        s.signatures.push(CollectedSignature {
            signer: "0xAA".into(),
            signature: "0x00".into(),
            added_at: 1,
        });
        assert!(s.has_signed("0xaa"));
        assert_eq!(s.pending_signers(), vec!["0xbb".to_string(), "0xcc".to_string()]);
    }

    #[test]
    fn test_expiry_only_from_pending() {
        let mut s = session();
        assert!(!s.refresh_expiry(100));
        assert!(s.refresh_expiry(101));
        assert_eq!(s.status, MultiSigStatus::Expired);
        assert!(!s.refresh_expiry(200));

        let mut done = session();
        done.status = MultiSigStatus::Completed;
        assert!(!done.refresh_expiry(500));
    }
}
