//! Common types for the selector
//!
//! Centralizes the selection mode and server record definitions shared by
//! the algorithms in this crate and the runtime in `selector`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SelectorError;

/// Separator between the network and the `host:port` part of a server key
pub const ADDRESS_SEPARATOR: char = '@';

/// Default declared weight when metadata carries none
pub const DEFAULT_WEIGHT: i64 = 1;

/// How a server is picked on every outbound call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectMode {
    /// Uniform random draw
    #[default]
    Random,
    /// Cursor increment modulo the server count
    RoundRobin,
    /// Jump consistent hash over the call arguments
    ConsistentHash,
    /// Smooth weighted round-robin over declared weights
    WeightedRoundRobin,
    /// Smooth weighted round-robin over weights derived from probed latency
    WeightedIcmp,
    /// Nearest servers by great-circle distance, ties broken at random
    Closest,
}

impl SelectMode {
    /// Whether this mode drives selection through the weighted records
    pub fn is_weighted(&self) -> bool {
        matches!(self, SelectMode::WeightedRoundRobin | SelectMode::WeightedIcmp)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SelectMode::Random => "random",
            SelectMode::RoundRobin => "round_robin",
            SelectMode::ConsistentHash => "consistent_hash",
            SelectMode::WeightedRoundRobin => "weighted_round_robin",
            SelectMode::WeightedIcmp => "weighted_icmp",
            SelectMode::Closest => "closest",
        }
    }
}

impl fmt::Display for SelectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectMode {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "random" | "randomselect" => Ok(SelectMode::Random),
            "roundrobin" => Ok(SelectMode::RoundRobin),
            "consistenthash" => Ok(SelectMode::ConsistentHash),
            "weightedroundrobin" => Ok(SelectMode::WeightedRoundRobin),
            "weightedicmp" | "weightedlatency" => Ok(SelectMode::WeightedIcmp),
            "closest" => Ok(SelectMode::Closest),
            _ => Err(SelectorError::UnsupportedMode(s.to_string())),
        }
    }
}

/// One registered server instance as seen by the weighted strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRecord {
    /// Server key, `network@host:port`
    pub key: String,
    /// Raw metadata value from the registry
    pub raw_metadata: String,
    /// Declared (or latency derived) weight
    pub weight: i64,
    /// Working weight, recovers toward `weight` after every step
    pub effective_weight: i64,
    /// Running score of the smooth weighted round-robin
    pub current_weight: i64,
    /// Declared liveness tag
    pub state: String,
    /// Logical partition tag
    pub group: String,
}

impl ServerRecord {
    /// Create a record with default weight and empty state/group
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            raw_metadata: String::new(),
            weight: DEFAULT_WEIGHT,
            effective_weight: DEFAULT_WEIGHT,
            current_weight: 0,
            state: String::new(),
            group: String::new(),
        }
    }

    /// Set both declared and effective weight
    pub fn with_weight(mut self, weight: i64) -> Self {
        self.set_weight(weight);
        self
    }

    /// Overwrite both declared and effective weight
    pub fn set_weight(&mut self, weight: i64) {
        self.weight = weight;
        self.effective_weight = weight;
    }
}

/// A server key split into its dial parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerAddress<'a> {
    /// Network name, e.g. `tcp`
    pub network: &'a str,
    /// `host:port`
    pub address: &'a str,
}

impl<'a> ServerAddress<'a> {
    /// Split `network@host:port` on the first separator
    pub fn parse(key: &'a str) -> Result<Self, SelectorError> {
        match key.split_once(ADDRESS_SEPARATOR) {
            Some((network, address)) if !network.is_empty() && !address.is_empty() => {
                Ok(Self { network, address })
            }
            _ => Err(SelectorError::InvalidAddress(key.to_string())),
        }
    }

    /// Host part of `host:port`, without IPv6 brackets
    pub fn host(&self) -> &'a str {
        let host = match self.address.rsplit_once(':') {
            Some((host, _port)) => host,
            None => self.address,
        };
        host.trim_start_matches('[').trim_end_matches(']')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_mode_parse() {
        assert_eq!("random".parse::<SelectMode>().unwrap(), SelectMode::Random);
        assert_eq!("RoundRobin".parse::<SelectMode>().unwrap(), SelectMode::RoundRobin);
        assert_eq!("consistent-hash".parse::<SelectMode>().unwrap(), SelectMode::ConsistentHash);
        assert_eq!("weighted_icmp".parse::<SelectMode>().unwrap(), SelectMode::WeightedIcmp);
        assert_eq!("Closest".parse::<SelectMode>().unwrap(), SelectMode::Closest);

        let err = "least_active".parse::<SelectMode>().unwrap_err();
        assert_eq!(err, SelectorError::UnsupportedMode("least_active".to_string()));
        assert!(err.to_string().contains("least_active"));
    }

    #[test]
    fn test_select_mode_defaults_to_random() {
        assert_eq!(SelectMode::default(), SelectMode::Random);
    }

    #[test]
    fn test_select_mode_display_roundtrips() {
        for mode in [
            SelectMode::Random,
            SelectMode::RoundRobin,
            SelectMode::ConsistentHash,
            SelectMode::WeightedRoundRobin,
            SelectMode::WeightedIcmp,
            SelectMode::Closest,
        ] {
            assert_eq!(mode.to_string().parse::<SelectMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_server_address_parse() {
        let addr = ServerAddress::parse("tcp@127.0.0.1:8972").unwrap();
        assert_eq!(addr.network, "tcp");
        assert_eq!(addr.address, "127.0.0.1:8972");
        assert_eq!(addr.host(), "127.0.0.1");

        let v6 = ServerAddress::parse("tcp6@[::1]:8972").unwrap();
        assert_eq!(v6.host(), "::1");
    }

    #[test]
    fn test_server_address_malformed() {
        assert!(matches!(
            ServerAddress::parse("127.0.0.1:8972"),
            Err(SelectorError::InvalidAddress(_))
        ));
        assert!(ServerAddress::parse("@127.0.0.1:8972").is_err());
        assert!(ServerAddress::parse("tcp@").is_err());
    }
}
