//! Account abstraction over a local private key

use crate::error::HedgeError;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use std::fmt;
use std::path::Path;

/// One hedge side's on-chain identity.
///
/// Holds no nonce or balance state; both are read fresh from the chain
/// before every use.
#[derive(Clone)]
pub struct Account {
    address: Address,
    signer: PrivateKeySigner,
}

impl Account {
    /// Derive an account from a hex private key (with or without 0x prefix)
    pub fn from_private_key(private_key: &str) -> Result<Self, HedgeError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|_| HedgeError::Configuration("unparsable private key".to_string()))?;
        Ok(Self::from_signer(signer))
    }

    pub fn from_signer(signer: PrivateKeySigner) -> Self {
        Self {
            address: signer.address(),
            signer,
        }
    }

    /// Fresh random account
    pub fn random() -> Self {
        Self::from_signer(PrivateKeySigner::random())
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }
}

// Never print key material
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.address)
    }
}

/// Read the two hedge accounts from a key file, one key per line
pub fn load_private_keys(path: impl AsRef<Path>) -> Result<(Account, Account), HedgeError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        HedgeError::Configuration(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_private_keys(&contents)
}

/// Parse exactly two private keys; blank lines are ignored
pub fn parse_private_keys(contents: &str) -> Result<(Account, Account), HedgeError> {
    let keys: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if keys.len() != 2 {
        return Err(HedgeError::Configuration(format!(
            "key file must contain exactly two private keys, found {}",
            keys.len()
        )));
    }

    let first = Account::from_private_key(keys[0])?;
    let second = Account::from_private_key(keys[1])?;
    if first.address() == second.address() {
        return Err(HedgeError::Configuration(
            "both private keys resolve to the same address".to_string(),
        ));
    }
    Ok((first, second))
}
