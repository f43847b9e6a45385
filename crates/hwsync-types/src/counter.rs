use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of value an ACL counter accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterType {
    Packets,
    Bytes,
}

impl CounterType {
    pub const ALL: [CounterType; 2] = [CounterType::Packets, CounterType::Bytes];

    /// Suffix appended to an ACL counter name ("acl1" -> "acl1.packets").
    pub const fn as_str(&self) -> &'static str {
        match self {
            CounterType::Packets => "packets",
            CounterType::Bytes => "bytes",
        }
    }
}

impl fmt::Display for CounterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "packets" => Ok(CounterType::Packets),
            "bytes" => Ok(CounterType::Bytes),
            _ => Err(ParseError::InvalidCounterType(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("packets".parse::<CounterType>().unwrap(), CounterType::Packets);
        assert_eq!("BYTES".parse::<CounterType>().unwrap(), CounterType::Bytes);
        assert!("drops".parse::<CounterType>().is_err());
    }
}
