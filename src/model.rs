//! Wire model for the launcher status API.
//!
//! These types mirror the JSON payload returned by the status query endpoint.
//! Only the fields the exporter reads are declared; unknown fields are
//! ignored during deserialization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The query address of a server as reported by the status API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Endpoint {
    pub ip: String,
    pub port: u32,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Status of a single server as reported by the query API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerStatus {
    /// Display name reported by the server. Empty means the server did not
    /// answer the status query properly and the response is degraded.
    #[serde(default)]
    pub name: String,

    /// Current player count.
    #[serde(default)]
    pub players: i64,

    /// Maximum player slots, when reported.
    #[serde(default)]
    pub max_players: i64,

    /// Canonical query endpoint reported by the API. Allows the remote
    /// source of truth to override locally configured addressing in labels.
    #[serde(default)]
    pub endpoint: Endpoint,
}

/// Top-level response envelope of the status query API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub result: ServerStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_renders_host_port() {
        let e = Endpoint {
            ip: "10.99.1.10".into(),
            port: 2302,
        };
        assert_eq!(e.to_string(), "10.99.1.10:2302");
    }

    #[test]
    fn deserializes_query_response() {
        let body = r#"{
            "result": {
                "name": "Deer Isle",
                "players": 12,
                "max_players": 60,
                "endpoint": { "ip": "10.0.0.1", "port": 2302 },
                "map": "deerisle",
                "version": "1.26"
            }
        }"#;

        let resp: QueryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.result.name, "Deer Isle");
        assert_eq!(resp.result.players, 12);
        assert_eq!(resp.result.max_players, 60);
        assert_eq!(resp.result.endpoint.to_string(), "10.0.0.1:2302");
    }
}
