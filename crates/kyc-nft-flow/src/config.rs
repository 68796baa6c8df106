use std::{collections::HashMap, time::Duration};

use bon::Builder;
use serde::{Deserialize, Serialize};
use url::Url;

use kyc_nft_core::{
    Error, ErrorCode,
    types::{Blockchain, BlockchainNetwork, VerificationType},
    watcher::WatchConfig,
};
use kyc_nft_kit::{metadata::DEFAULT_IPFS_GATEWAY, networks::ContractConfig};

fn default_watch_interval_secs() -> u64 {
    3
}

fn default_watch_max_retries() -> u32 {
    40
}

fn default_ipfs_gateway() -> String {
    DEFAULT_IPFS_GATEWAY.to_string()
}

/// Configuration of a [`KycNft`](crate::sdk::KycNft) instance.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkConfig {
    /// Base URL of the backend API. Paths are joined below it.
    pub api_base_url: Url,
    /// Sent as a bearer token with every backend request.
    #[builder(into)]
    #[serde(default)]
    pub api_key: Option<String>,
    pub enabled_networks: Vec<BlockchainNetwork>,
    /// Credential contract per network and verification type.
    #[builder(default)]
    #[serde(default)]
    pub contracts: Vec<ContractConfig>,
    /// Replaces the public RPC endpoint of a network.
    #[builder(default)]
    #[serde(default)]
    pub rpc_urls: HashMap<BlockchainNetwork, Url>,
    #[builder(default = default_watch_interval_secs())]
    #[serde(default = "default_watch_interval_secs")]
    pub watch_interval_secs: u64,
    #[builder(default = default_watch_max_retries())]
    #[serde(default = "default_watch_max_retries")]
    pub watch_max_retries: u32,
    #[builder(default = default_ipfs_gateway(), into)]
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs_gateway: String,
    /// Where redirecting wallets send the user back after signing.
    #[serde(default)]
    pub callback_url: Option<Url>,
}

impl SdkConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: SdkConfig = serde_json::from_str(json).map_err(|e| {
            Error::configuration(
                ErrorCode::InvalidConfiguration,
                format!("Invalid SDK configuration: {e}"),
            )
            .with_source(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.enabled_networks.is_empty() {
            return Err(invalid("At least one network must be enabled"));
        }
        if self.api_base_url.cannot_be_a_base() {
            return Err(invalid(format!(
                "API base URL {} cannot have paths joined to it",
                self.api_base_url
            )));
        }

        for (i, contract) in self.contracts.iter().enumerate() {
            let duplicate = self.contracts[..i].iter().any(|other| {
                other.network == contract.network
                    && other.verification_type == contract.verification_type
            });
            if duplicate {
                return Err(invalid(format!(
                    "Contract for {:?} on {} is configured twice",
                    contract.verification_type, contract.network
                )));
            }
        }

        for network in self.rpc_urls.keys() {
            if !self.is_enabled(*network) {
                return Err(invalid(format!(
                    "RPC URL given for {network}, which is not enabled"
                )));
            }
        }

        Ok(())
    }

    pub fn is_enabled(&self, network: BlockchainNetwork) -> bool {
        self.enabled_networks.contains(&network)
    }

    /// Enabled networks of one chain, in configuration order.
    pub fn enabled_networks_of(&self, blockchain: Blockchain) -> Vec<BlockchainNetwork> {
        self.enabled_networks
            .iter()
            .copied()
            .filter(|n| n.blockchain() == blockchain)
            .collect()
    }

    pub fn contract(
        &self,
        network: BlockchainNetwork,
        verification_type: VerificationType,
    ) -> Result<&ContractConfig, Error> {
        self.contracts
            .iter()
            .find(|c| c.network == network && c.verification_type == verification_type)
            .ok_or_else(|| {
                Error::configuration(
                    ErrorCode::ContractNotConfigured,
                    format!("No {verification_type:?} contract configured for {network}"),
                )
            })
    }

    pub fn rpc_url(&self, network: BlockchainNetwork) -> Option<Url> {
        self.rpc_urls.get(&network).cloned()
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig::builder()
            .interval(Duration::from_secs(self.watch_interval_secs))
            .max_retries(self.watch_max_retries)
            .build()
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::configuration(ErrorCode::InvalidConfiguration, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "api_base_url": "https://staging.kycnft.example/api/",
        "enabled_networks": ["PolygonAmoy", "NearTestnet"],
        "contracts": [
            { "network": "PolygonAmoy", "verification_type": "KYC", "address": "0x5Cc0f3bB5E1E2D4e2fB2d4c1e4aE0F1a0B9fC4D1" },
            { "network": "NearTestnet", "verification_type": "KYC", "address": "kyc.testnet" }
        ]
    }"#;

    #[test]
    fn test_parse_applies_defaults() {
        let config = SdkConfig::from_json(CONFIG).unwrap();
        assert_eq!(config.watch_interval_secs, 3);
        assert_eq!(config.watch_max_retries, 40);
        assert_eq!(config.ipfs_gateway, DEFAULT_IPFS_GATEWAY);
        assert_eq!(config.watch_config(), WatchConfig::default());
        assert_eq!(
            config.enabled_networks_of(Blockchain::Near),
            vec![BlockchainNetwork::NearTestnet]
        );
    }

    #[test]
    fn test_contract_lookup() {
        let config = SdkConfig::from_json(CONFIG).unwrap();
        let near = config
            .contract(BlockchainNetwork::NearTestnet, VerificationType::Kyc)
            .unwrap();
        assert_eq!(near.address, "kyc.testnet");

        let err = config
            .contract(
                BlockchainNetwork::NearTestnet,
                VerificationType::AccreditedInvestor,
            )
            .unwrap_err();
        assert!(err.is(ErrorCode::ContractNotConfigured));
    }

    #[test]
    fn test_rejects_invalid_configuration() {
        let err = SdkConfig::from_json(r#"{ "api_base_url": "nope" }"#).unwrap_err();
        assert!(err.is(ErrorCode::InvalidConfiguration));

        let empty = SdkConfig::builder()
            .api_base_url(Url::parse("https://api.example/").unwrap())
            .enabled_networks(vec![])
            .build();
        assert!(empty.validate().is_err());

        let duplicate = SdkConfig::builder()
            .api_base_url(Url::parse("https://api.example/").unwrap())
            .enabled_networks(vec![BlockchainNetwork::AptosTestnet])
            .contracts(vec![
                ContractConfig::builder()
                    .network(BlockchainNetwork::AptosTestnet)
                    .verification_type(VerificationType::Kyc)
                    .address("0x1")
                    .build(),
                ContractConfig::builder()
                    .network(BlockchainNetwork::AptosTestnet)
                    .verification_type(VerificationType::Kyc)
                    .address("0x2")
                    .build(),
            ])
            .build();
        assert!(duplicate.validate().is_err());
    }
}
