//! Supported networks and their chain providers.

use bon::Builder;
use serde::{Deserialize, Serialize};
use url::Url;

use kyc_nft_core::{
    Error, ErrorCode,
    types::{
        AnyJson, Blockchain, BlockchainNetwork, BoxError, NetworkAndAddress, NftCheckResult,
        TokenDetails, Transaction, VerificationType,
    },
    watcher::{LookupError, TransactionLookup},
};

use crate::{
    concepts::{MintRequest, Minter, NftChecker, SubmitOutcome, Wallet},
    rpc::HttpTransport,
};

pub mod aptos;
pub mod evm;
pub mod near;
pub mod svm;

pub use aptos::AptosProvider;
pub use evm::EvmProvider;
pub use near::NearProvider;
pub use svm::SvmProvider;

/// Block explorer link layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExplorerConfig {
    pub base_url: &'static str,
    pub transaction_path: &'static str,
    pub query_suffix: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeCurrency {
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
}

/// Static description of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
    pub network: BlockchainNetwork,
    pub display_name: &'static str,
    /// EIP-155 chain id. EVM networks only.
    pub chain_id: Option<u64>,
    pub rpc_url: &'static str,
    pub native_currency: NativeCurrency,
    pub explorer: ExplorerConfig,
}

impl NetworkConfig {
    pub fn rpc_url(&self) -> Result<Url, Error> {
        Url::parse(self.rpc_url).map_err(|e| {
            Error::configuration(
                ErrorCode::InvalidConfiguration,
                format!("Invalid RPC URL for {}: {e}", self.network),
            )
        })
    }
}

/// Look up the static description of `network`.
pub fn network_config(network: BlockchainNetwork) -> NetworkConfig {
    use BlockchainNetwork::*;
    match network {
        EthereumMainnet => evm::networks::ETHEREUM_MAINNET,
        EthereumSepolia => evm::networks::ETHEREUM_SEPOLIA,
        PolygonMainnet => evm::networks::POLYGON_MAINNET,
        PolygonAmoy => evm::networks::POLYGON_AMOY,
        BaseMainnet => evm::networks::BASE_MAINNET,
        BaseSepolia => evm::networks::BASE_SEPOLIA,
        CeloMainnet => evm::networks::CELO_MAINNET,
        CeloAlfajores => evm::networks::CELO_ALFAJORES,
        NearMainnet => near::networks::NEAR_MAINNET,
        NearTestnet => near::networks::NEAR_TESTNET,
        SolanaMainnet => svm::networks::SOLANA_MAINNET,
        SolanaDevnet => svm::networks::SOLANA_DEVNET,
        SolanaTestnet => svm::networks::SOLANA_TESTNET,
        AptosMainnet => aptos::networks::APTOS_MAINNET,
        AptosTestnet => aptos::networks::APTOS_TESTNET,
    }
}

/// The EVM network with EIP-155 `chain_id`, if supported.
pub fn evm_network_by_chain_id(chain_id: u64) -> Option<BlockchainNetwork> {
    BlockchainNetwork::ALL
        .into_iter()
        .find(|n| network_config(*n).chain_id == Some(chain_id))
}

/// Where the credential contract of one verification type lives on one network.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    pub network: BlockchainNetwork,
    pub verification_type: VerificationType,
    #[builder(into)]
    pub address: String,
}

/// Fold a credential check into a result that never fails.
pub(crate) fn contain(
    network_and_address: NetworkAndAddress,
    checked: Result<Option<Vec<TokenDetails>>, Error>,
) -> NftCheckResult {
    match checked {
        Ok(Some(tokens)) => NftCheckResult::valid(network_and_address, tokens),
        Ok(None) => NftCheckResult::invalid(network_and_address),
        Err(err) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "Credential check on {} failed: {err}",
                network_and_address.blockchain_network
            );

            NftCheckResult::failed(network_and_address, err)
        }
    }
}

pub(crate) fn ensure_network(
    expected: BlockchainNetwork,
    network_and_address: &NetworkAndAddress,
) -> Result<(), Error> {
    if network_and_address.blockchain_network == expected {
        Ok(())
    } else {
        Err(Error::status(
            ErrorCode::NetworkNotSupported,
            format!(
                "Provider for {expected} cannot check {}",
                network_and_address.blockchain_network
            ),
        ))
    }
}

pub(crate) fn unexpected(what: impl std::fmt::Display) -> Error {
    Error::internal(ErrorCode::UnexpectedResponse, what.to_string())
}

/// A provider for any supported chain.
#[derive(Debug, Clone)]
pub enum ChainProvider<T> {
    Evm(EvmProvider<T>),
    Near(NearProvider<T>),
    Solana(SvmProvider<T>),
    Aptos(AptosProvider<T>),
}

impl<T: HttpTransport> ChainProvider<T> {
    /// Build the provider for `network` reading from `contract`.
    ///
    /// `rpc_url` overrides the public endpoint of the network table.
    pub fn new(
        transport: T,
        network: BlockchainNetwork,
        contract: &str,
        rpc_url: Option<Url>,
    ) -> Result<Self, Error> {
        let config = network_config(network);
        let rpc_url = match rpc_url {
            Some(url) => url,
            None => config.rpc_url()?,
        };

        Ok(match network.blockchain() {
            Blockchain::Ethereum => {
                ChainProvider::Evm(EvmProvider::new(transport, config, rpc_url, contract)?)
            }
            Blockchain::Near => {
                ChainProvider::Near(NearProvider::new(transport, config, rpc_url, contract))
            }
            Blockchain::Solana => {
                ChainProvider::Solana(SvmProvider::new(transport, config, rpc_url, contract)?)
            }
            Blockchain::Aptos => {
                ChainProvider::Aptos(AptosProvider::new(transport, config, rpc_url, contract))
            }
        })
    }

    pub fn network(&self) -> BlockchainNetwork {
        self.config().network
    }

    pub fn config(&self) -> &NetworkConfig {
        match self {
            ChainProvider::Evm(p) => &p.config,
            ChainProvider::Near(p) => &p.config,
            ChainProvider::Solana(p) => &p.config,
            ChainProvider::Aptos(p) => &p.config,
        }
    }

    /// Look up transactions signed by `sender`.
    pub fn transactions_of<'a>(&'a self, sender: &'a str) -> ChainTransactions<'a, T> {
        ChainTransactions {
            provider: self,
            sender,
        }
    }

    /// The account or address of the credential contract.
    pub fn contract(&self) -> String {
        match self {
            ChainProvider::Evm(p) => p.contract.to_string(),
            ChainProvider::Near(p) => p.contract.clone(),
            ChainProvider::Solana(p) => p.program_id.to_string(),
            ChainProvider::Aptos(p) => p.contract.clone(),
        }
    }

    /// Replace the gateway used to dereference `ipfs://` metadata.
    pub fn with_ipfs_gateway(mut self, gateway: impl Into<String>) -> Self {
        let gateway = gateway.into();
        match &mut self {
            ChainProvider::Evm(p) => p.ipfs_gateway = gateway,
            ChainProvider::Near(p) => p.ipfs_gateway = gateway,
            ChainProvider::Solana(p) => p.ipfs_gateway = gateway,
            ChainProvider::Aptos(p) => p.ipfs_gateway = gateway,
        }
        self
    }
}

impl<T: HttpTransport> NftChecker for ChainProvider<T> {
    async fn has_valid_nft(&self, address: &str) -> Result<bool, Error> {
        match self {
            ChainProvider::Evm(p) => p.has_valid_nft(address).await,
            ChainProvider::Near(p) => p.has_valid_nft(address).await,
            ChainProvider::Solana(p) => p.has_valid_nft(address).await,
            ChainProvider::Aptos(p) => p.has_valid_nft(address).await,
        }
    }

    async fn get_valid_nfts(&self, network_and_address: NetworkAndAddress) -> NftCheckResult {
        match self {
            ChainProvider::Evm(p) => p.get_valid_nfts(network_and_address).await,
            ChainProvider::Near(p) => p.get_valid_nfts(network_and_address).await,
            ChainProvider::Solana(p) => p.get_valid_nfts(network_and_address).await,
            ChainProvider::Aptos(p) => p.get_valid_nfts(network_and_address).await,
        }
    }
}

/// Transaction lookups for transactions signed by one account.
#[derive(Debug)]
pub struct ChainTransactions<'a, T> {
    provider: &'a ChainProvider<T>,
    sender: &'a str,
}

impl<T: HttpTransport> TransactionLookup for ChainTransactions<'_, T> {
    async fn transaction_status(&self, tx_hash: &str) -> Result<Transaction, LookupError> {
        match self.provider {
            ChainProvider::Evm(p) => p.transaction_status(tx_hash).await,
            ChainProvider::Near(p) => p.transaction_status(tx_hash, self.sender).await,
            ChainProvider::Solana(p) => p.transaction_status(tx_hash).await,
            ChainProvider::Aptos(p) => p.transaction_status(tx_hash).await,
        }
    }
}

impl<T: HttpTransport> Minter for ChainProvider<T> {
    async fn submit_mint<W: Wallet>(
        &self,
        wallet: &W,
        request: MintRequest<'_>,
    ) -> Result<SubmitOutcome, BoxError> {
        match self {
            ChainProvider::Evm(p) => p.submit_mint(wallet, request).await,
            ChainProvider::Near(p) => p.submit_mint(wallet, request).await,
            ChainProvider::Solana(p) => p.submit_mint(wallet, request).await,
            ChainProvider::Aptos(p) => p.submit_mint(wallet, request).await,
        }
    }

    fn token_id(&self, confirmed: &AnyJson) -> Result<String, Error> {
        match self {
            ChainProvider::Evm(p) => p.token_id(confirmed),
            ChainProvider::Near(p) => p.token_id(confirmed),
            ChainProvider::Solana(p) => p.token_id(confirmed),
            ChainProvider::Aptos(p) => p.token_id(confirmed),
        }
    }
}
