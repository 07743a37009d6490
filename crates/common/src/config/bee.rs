use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Runtime configuration of a single storage node
///
/// Fields mirror the node's own command line flags; they are exported to
/// provisioners as `BEE_<FIELD>` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BeeConfig {
    pub api_addr: String,
    pub bootnodes: String,
    pub clef_signer_enable: bool,
    pub clef_signer_endpoint: String,
    pub cors_allowed_origins: String,
    pub data_dir: String,
    pub db_capacity: u64,
    pub debug_api_addr: String,
    pub debug_api_enable: bool,
    pub gateway_mode: bool,
    pub global_pinning_enabled: bool,
    pub nat_addr: String,
    pub network_id: u64,
    pub p2p_addr: String,
    pub p2p_quic_enable: bool,
    pub p2p_ws_enable: bool,
    pub password: String,
    pub payment_early: u64,
    pub payment_threshold: u64,
    pub payment_tolerance: u64,
    pub postage_stamp_address: String,
    pub price_oracle_address: String,
    pub resolver_options: String,
    pub standalone: bool,
    pub swap_enable: bool,
    pub swap_endpoint: String,
    pub swap_factory_address: String,
    pub swap_initial_deposit: u64,
    pub tracing_enabled: bool,
    pub tracing_endpoint: String,
    pub tracing_service_name: String,
    pub verbosity: u64,
    pub welcome_message: String,
}

impl Default for BeeConfig {
    fn default() -> Self {
        Self {
            api_addr: ":1633".to_string(),
            bootnodes: String::new(),
            clef_signer_enable: false,
            clef_signer_endpoint: String::new(),
            cors_allowed_origins: String::new(),
            data_dir: "/home/bee/.bee".to_string(),
            db_capacity: 5_000_000,
            debug_api_addr: ":1635".to_string(),
            debug_api_enable: true,
            gateway_mode: false,
            global_pinning_enabled: true,
            nat_addr: String::new(),
            network_id: 1987,
            p2p_addr: ":1634".to_string(),
            p2p_quic_enable: false,
            p2p_ws_enable: false,
            password: String::new(),
            payment_early: 1_000_000_000_000,
            payment_threshold: 10_000_000_000_000,
            payment_tolerance: 50_000_000_000_000,
            postage_stamp_address: String::new(),
            price_oracle_address: String::new(),
            resolver_options: String::new(),
            standalone: false,
            swap_enable: false,
            swap_endpoint: String::new(),
            swap_factory_address: String::new(),
            swap_initial_deposit: 0,
            tracing_enabled: false,
            tracing_endpoint: String::new(),
            tracing_service_name: "bee".to_string(),
            verbosity: 5,
            welcome_message: String::new(),
        }
    }
}

impl BeeConfig {
    /// Export as `BEE_*` environment variables, skipping empty strings
    pub fn to_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(self) else {
            return env;
        };

        for (key, value) in fields {
            let value = match value {
                serde_json::Value::String(s) if s.is_empty() => continue,
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            let key = format!("BEE_{}", key.replace('-', "_").to_uppercase());
            env.insert(key, value);
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_export() {
        let config = BeeConfig {
            bootnodes: "/dns4/a /dns4/b".into(),
            db_capacity: 1000,
            ..Default::default()
        };
        let env = config.to_env();
        assert_eq!(env["BEE_BOOTNODES"], "/dns4/a /dns4/b");
        assert_eq!(env["BEE_DB_CAPACITY"], "1000");
        assert_eq!(env["BEE_DEBUG_API_ENABLE"], "true");
        assert_eq!(env["BEE_API_ADDR"], ":1633");
        assert!(!env.contains_key("BEE_PASSWORD"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: BeeConfig = toml::from_str("network-id = 10\nswap-enable = true").unwrap();
        assert_eq!(config.network_id, 10);
        assert!(config.swap_enable);
        assert_eq!(config.p2p_addr, ":1634");
    }
}
