//! Chain id parsing and the expected-network check

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

lazy_static::lazy_static! {
    /// `0x`-prefixed hex chain id
    static ref HEX_CHAIN_ID: Regex =
        Regex::new(r"^0[xX][0-9a-fA-F]+$").expect("Invalid hex chain id regex");

    /// Plain decimal chain id
    static ref DECIMAL_CHAIN_ID: Regex =
        Regex::new(r"^[0-9]+$").expect("Invalid decimal chain id regex");
}

/// Numeric chain identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl ChainId {
    /// Parse a chain id as reported by a wallet agent
    ///
    /// Accepts `0x`-prefixed hex or plain decimal. Anything else, including
    /// the empty string and values that overflow `u64`, is malformed.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();

        let parsed = if HEX_CHAIN_ID.is_match(trimmed) {
            u64::from_str_radix(&trimmed[2..], 16)
        } else if DECIMAL_CHAIN_ID.is_match(trimmed) {
            trimmed.parse::<u64>()
        } else {
            return Err(Error::MalformedIdentifier(raw.to_string()));
        };

        parsed
            .map(ChainId)
            .map_err(|_| Error::MalformedIdentifier(raw.to_string()))
    }

    /// Hex form used in wallet requests (`0x1`, `0x89`)
    pub fn to_hex(&self) -> String {
        format!("0x{:x}", self.0)
    }
}

impl FromStr for ChainId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Checks reported network ids against the expected one
#[derive(Debug, Clone)]
pub struct NetworkValidator {
    expected: ChainId,
}

impl NetworkValidator {
    pub fn new(expected: ChainId) -> Self {
        Self { expected }
    }

    /// Build from the configured expected id string
    pub fn from_config(expected: &str) -> Result<Self> {
        Ok(Self::new(ChainId::parse(expected)?))
    }

    pub fn expected(&self) -> ChainId {
        self.expected
    }

    /// Is `network_id` the expected network?
    ///
    /// Fails with [`Error::MalformedIdentifier`] if the id cannot be parsed.
    pub fn validate(&self, network_id: &str) -> Result<bool> {
        Ok(ChainId::parse(network_id)? == self.expected)
    }
}

/// Native currency of a network, as wallet agents expect it when adding one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Default for NativeCurrency {
    fn default() -> Self {
        Self {
            name: "Ether".to_string(),
            symbol: "ETH".to_string(),
            decimals: 18,
        }
    }
}

/// Parameters for asking an agent to add a network it does not know yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkParams {
    /// Hex chain id
    pub chain_id: String,
    pub chain_name: String,
    pub rpc_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub block_explorer_urls: Vec<String>,
    pub native_currency: NativeCurrency,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_and_decimal() {
        assert_eq!(ChainId::parse("0x1").unwrap(), ChainId(1));
        assert_eq!(ChainId::parse("0X89").unwrap(), ChainId(137));
        assert_eq!(ChainId::parse("137").unwrap(), ChainId(137));
        assert_eq!(ChainId::parse(" 0xaa36a7 ").unwrap(), ChainId(11_155_111));
    }

    #[test]
    fn test_parse_malformed() {
        for raw in ["", "0x", "0xzz", "mainnet", "-1", "1.5", "0xffffffffffffffffff"] {
            let err = ChainId::parse(raw).unwrap_err();
            assert!(
                matches!(err, Error::MalformedIdentifier(ref id) if id == raw),
                "expected malformed for {:?}, got {:?}",
                raw,
                err
            );
        }
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(ChainId(1).to_hex(), "0x1");
        assert_eq!(ChainId(137).to_hex(), "0x89");
        assert_eq!(ChainId(5).to_string(), "0x5");
    }

    #[test]
    fn test_validate() {
        let validator = NetworkValidator::from_config("0x1").unwrap();
        assert!(validator.validate("0x1").unwrap());
        assert!(validator.validate("1").unwrap());
        assert!(!validator.validate("0x5").unwrap());
        assert!(matches!(
            validator.validate("not-a-chain"),
            Err(Error::MalformedIdentifier(_))
        ));
    }

    #[test]
    fn test_network_params_serialize() {
        let params = NetworkParams {
            chain_id: "0x89".to_string(),
            chain_name: "Polygon".to_string(),
            rpc_urls: vec!["https://polygon-rpc.com".to_string()],
            block_explorer_urls: vec![],
            native_currency: NativeCurrency {
                name: "MATIC".to_string(),
                symbol: "MATIC".to_string(),
                decimals: 18,
            },
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["chainId"], "0x89");
        assert_eq!(json["rpcUrls"][0], "https://polygon-rpc.com");
        assert!(json.get("blockExplorerUrls").is_none());
    }
}
