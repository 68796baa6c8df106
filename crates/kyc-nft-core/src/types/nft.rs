use serde::{Deserialize, Serialize};

use crate::types::NetworkAndAddress;

/// Display metadata of a credential NFT.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Best-effort result of checking one address on one network.
///
/// Either `has_valid_nft` (plus optional `tokens`) or `error` is set; the
/// checked `network_and_address` is always echoed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftCheckResult {
    pub network_and_address: NetworkAndAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_valid_nft: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<TokenDetails>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NftCheckResult {
    pub fn valid(network_and_address: NetworkAndAddress, tokens: Vec<TokenDetails>) -> Self {
        NftCheckResult {
            network_and_address,
            has_valid_nft: Some(true),
            tokens: Some(tokens),
            error: None,
        }
    }

    pub fn invalid(network_and_address: NetworkAndAddress) -> Self {
        NftCheckResult {
            network_and_address,
            has_valid_nft: Some(false),
            tokens: None,
            error: None,
        }
    }

    pub fn failed(network_and_address: NetworkAndAddress, error: impl ToString) -> Self {
        NftCheckResult {
            network_and_address,
            has_valid_nft: None,
            tokens: None,
            error: Some(error.to_string()),
        }
    }
}
