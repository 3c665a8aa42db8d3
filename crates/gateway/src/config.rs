use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use contract_client::signature::DEFAULT_CHAIN_ID;
use contract_client::ContractConfig;
use upload::pinata::{DEFAULT_API_URL, DEFAULT_GATEWAY_URL};
use upload::{PinataConfig, UploadLimits};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

pub struct GatewayConfig {
    pub http_addr: SocketAddr,
    /// `None` runs against an in-memory chain.
    pub contract: Option<ContractConfig>,
    pub chain_id: u64,
    pub relayer_key: Option<String>,
    /// `None` keeps proofs in memory.
    pub pinata: Option<PinataConfig>,
    pub upload_limits: UploadLimits,
    pub read_timeout: Duration,
    pub signing_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            contract: None,
            chain_id: DEFAULT_CHAIN_ID,
            relayer_key: None,
            pinata: None,
            upload_limits: UploadLimits::default(),
            read_timeout: Duration::from_secs(15),
            signing_timeout: Duration::from_secs(120),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = parse::<SocketAddr>(&lookup, "HTTP_ADDR")? {
            config.http_addr = addr;
        }
        if let Some(chain_id) = parse::<u64>(&lookup, "CHAIN_ID")? {
            config.chain_id = chain_id;
        }

        if let Some(contract_address) = parse::<Address>(&lookup, "CONTRACT_ADDRESS")? {
            let mut contract = ContractConfig {
                contract_address,
                ..ContractConfig::default()
            };
            if let Some(rpc_url) = lookup("RPC_URL") {
                contract.rpc_url = rpc_url;
            }
            if let Some(secs) = parse::<u64>(&lookup, "CONFIRM_TIMEOUT_SECS")? {
                contract.confirm_timeout = Duration::from_secs(secs);
            }
            config.contract = Some(contract);
        }
        config.relayer_key = lookup("RELAYER_KEY").filter(|k| !k.is_empty());

        if let Some(jwt) = lookup("PINATA_JWT").filter(|k| !k.is_empty()) {
            let mut pinata = PinataConfig::new(jwt);
            pinata.api_url = lookup("PINATA_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
            pinata.gateway_url =
                lookup("PINATA_GATEWAY_URL").unwrap_or_else(|| DEFAULT_GATEWAY_URL.into());
            config.pinata = Some(pinata);
        }

        if let Some(max_files) = parse::<usize>(&lookup, "MAX_FILES")? {
            config.upload_limits.max_files = max_files;
        }
        if let Some(max_file_size) = parse::<u64>(&lookup, "MAX_FILE_SIZE")? {
            config.upload_limits.max_file_size = max_file_size;
        }
        if let Some(secs) = parse::<u64>(&lookup, "READ_TIMEOUT_SECS")? {
            config.read_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&lookup, "SIGNING_TIMEOUT_SECS")? {
            config.signing_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn contract_address(&self) -> Address {
        self.contract
            .as_ref()
            .map(|c| c.contract_address)
            .unwrap_or(Address::ZERO)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(var)
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_run_offline() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.contract.is_none());
        assert!(config.pinata.is_none());
        assert_eq!(config.chain_id, 4202);
        assert_eq!(config.upload_limits.max_files, 10);
        assert_eq!(config.upload_limits.max_file_size, 10 * 1024 * 1024);
    }

    #[test]
    fn reads_chain_and_pinning_settings() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("CONTRACT_ADDRESS", "0x5FbDB2315678afecb367f032d93F642f64180aa3"),
            ("RPC_URL", "http://10.0.0.2:8545"),
            ("CONFIRM_TIMEOUT_SECS", "30"),
            ("PINATA_JWT", "jwt"),
            ("MAX_FILES", "3"),
        ]))
        .unwrap();

        let contract = config.contract.unwrap();
        assert_eq!(contract.rpc_url, "http://10.0.0.2:8545");
        assert_eq!(contract.confirm_timeout, Duration::from_secs(30));
        let pinata = config.pinata.unwrap();
        assert_eq!(pinata.api_url, DEFAULT_API_URL);
        assert_eq!(config.upload_limits.max_files, 3);
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = GatewayConfig::from_lookup(lookup(&[("MAX_FILES", "many")]))
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("MAX_FILES"));
    }
}
