//! Process-wide configuration, parsed once from the environment at startup.

use std::collections::HashMap;

/// Environment-driven operator configuration (spec.md §6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub leader_election_enabled: bool,
    pub operator_name: String,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
    pub health_port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_map(&std::env::vars().collect())
    }

    /// Pure parsing logic, kept separate from `from_env` so tests can cover
    /// every default/override combination without mutating process-global
    /// environment state.
    fn from_map(vars: &HashMap<String, String>) -> Self {
        let get = |key: &str| vars.get(key).cloned();
        let get_bool = |key: &str, default: bool| {
            get(key).map_or(default, |v| v.eq_ignore_ascii_case("true"))
        };

        Self {
            leader_election_enabled: get_bool("LEADER_ELECTION_ENABLED", true),
            operator_name: get("OPERATOR_NAME").unwrap_or_else(|| "cupcake".to_string()),
            metrics_enabled: get_bool("METRICS_ENABLED", true),
            metrics_port: get("METRICS_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            health_port: get("HEALTH_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8081),
        }
    }
}
