use kyc_nft_core::types::BlockchainNetwork;

use crate::networks::network_config;

/// Link to `tx_hash` on the block explorer of `network`.
pub fn transaction_url(network: BlockchainNetwork, tx_hash: &str) -> String {
    let explorer = network_config(network).explorer;
    format!(
        "{}{}{}{}",
        explorer.base_url, explorer.transaction_path, tx_hash, explorer.query_suffix
    )
}
