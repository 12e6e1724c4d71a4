//! BIP-32 Derivation Paths
//!
//! Strict parsing of `m(/<index>'?)+` plus advisory warnings for paths that
//! parse but look unusual for an account key.

use std::fmt;
use std::str::FromStr;

/// Hardened offset for BIP-32 derivation
pub const HARDENED: u32 = 0x8000_0000;

/// Standard BIP purposes
pub mod bip_purposes {
    pub const BIP44: u32 = 44;
    pub const BIP49: u32 = 49;
    pub const BIP84: u32 = 84;
    pub const BIP86: u32 = 86;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DerivationPathError {
    #[error("derivation path must start with 'm/'")]
    MissingRoot,

    #[error("empty path component at position {0}")]
    EmptyComponent(usize),

    #[error("invalid path component '{0}'")]
    InvalidComponent(String),

    #[error("path component {0} exceeds the non-hardened range")]
    IndexOutOfRange(u32),
}

impl From<DerivationPathError> for crate::error::SigningError {
    fn from(e: DerivationPathError) -> Self {
        crate::error::SigningError::invalid_request(e.to_string())
    }
}

/// Single component of a derivation path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivationComponent {
    pub index: u32,
    pub hardened: bool,
}

impl DerivationComponent {
    /// Index with the hardened bit applied
    pub fn full_index(&self) -> u32 {
        if self.hardened {
            self.index | HARDENED
        } else {
            self.index
        }
    }
}

impl fmt::Display for DerivationComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hardened {
            write!(f, "{}'", self.index)
        } else {
            write!(f, "{}", self.index)
        }
    }
}

/// Parsed derivation path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationPath {
    components: Vec<DerivationComponent>,
}

impl DerivationPath {
    pub fn components(&self) -> &[DerivationComponent] {
        &self.components
    }

    pub fn purpose(&self) -> Option<u32> {
        self.components.first().map(|c| c.index)
    }

    pub fn coin_type(&self) -> Option<u32> {
        self.components.get(1).map(|c| c.index)
    }

    /// Things a device user would want to double-check
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(purpose) = self.purpose() {
            use bip_purposes::*;
            if ![BIP44, BIP49, BIP84, BIP86].contains(&purpose) {
                warnings.push(format!("non-standard purpose {}", purpose));
            }
        }

        if self.components.iter().take(3).any(|c| !c.hardened) {
            warnings.push("purpose, coin type and account should be hardened".to_string());
        }

        if let Some(index) = self.components.get(4).map(|c| c.index) {
            if index > 10_000 {
                warnings.push(format!("very high address index {}", index));
            }
        }

        warnings
    }
}

impl FromStr for DerivationPath {
    type Err = DerivationPathError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let rest = path.strip_prefix("m/").ok_or(DerivationPathError::MissingRoot)?;

        let components = rest
            .split('/')
            .enumerate()
            .map(|(position, part)| parse_component(position, part))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { components })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

fn parse_component(position: usize, part: &str) -> Result<DerivationComponent, DerivationPathError> {
    if part.is_empty() {
        return Err(DerivationPathError::EmptyComponent(position));
    }

    let (digits, hardened) = match part.strip_suffix('\'') {
        Some(digits) => (digits, true),
        None => (part, false),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DerivationPathError::InvalidComponent(part.to_string()));
    }

    let index: u32 = digits
        .parse()
        .map_err(|_| DerivationPathError::InvalidComponent(part.to_string()))?;
    if index >= HARDENED {
        return Err(DerivationPathError::IndexOutOfRange(index));
    }

    Ok(DerivationComponent { index, hardened })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_standard_paths() {
        let path: DerivationPath = "m/44'/60'/0'/0/0".parse().unwrap();
        assert_eq!(path.components().len(), 5);
        assert_eq!(path.purpose(), Some(44));
        assert_eq!(path.coin_type(), Some(60));
        assert_eq!(path.components()[0].full_index(), 44 | HARDENED);
        assert_eq!(path.to_string(), "m/44'/60'/0'/0/0");
        assert!(path.warnings().is_empty());
    }

    #[test]
    fn test_rejects_malformed() {
        let cases = [
            "",
            "m",
            "m/",
            "44'/60'",
            "M/44'",
            "m/44'//0",
            "m/44h/60'",
            "m/-1",
            "m/abc",
            "m/'",
            "m/2147483648",
            "m/44'/60' ",
        ];
        for case in cases {
            assert!(case.parse::<DerivationPath>().is_err(), "{:?}", case);
        }
    }

    #[test]
    fn test_warnings() {
        let path: DerivationPath = "m/44/60/0/0/0".parse().unwrap();
        assert!(path.warnings().iter().any(|w| w.contains("hardened")));

        let path: DerivationPath = "m/7'/60'/0'".parse().unwrap();
        assert!(path.warnings().iter().any(|w| w.contains("purpose 7")));
    }
}
