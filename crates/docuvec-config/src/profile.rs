//! Embedding request profiles

use serde::{Deserialize, Serialize};

/// Named performance/latency tradeoff for embedding requests
///
/// `Rt` is the realtime/low-latency path used by interactive chat; `Bulk` is
/// the throughput-oriented path used by ingestion. The profile selects both
/// the per-model queue a request is routed to and the dispatcher's wait
/// timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Realtime: small batches, tight timeout
    Rt,
    /// Bulk: large batches, generous timeout
    Bulk,
}

impl Profile {
    /// All known profiles
    pub const fn all() -> &'static [Self] {
        &[Self::Rt, Self::Bulk]
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rt => write!(f, "rt"),
            Self::Bulk => write!(f, "bulk"),
        }
    }
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rt" => Ok(Self::Rt),
            "bulk" => Ok(Self::Bulk),
            _ => Err(format!("Unknown profile: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_serde() {
        let json = serde_json::to_string(&Profile::Rt).unwrap();
        assert_eq!(json, "\"rt\"");
        let back: Profile = serde_json::from_str("\"bulk\"").unwrap();
        assert_eq!(back, Profile::Bulk);
    }
}
