//! EVM chains: credential reads through `eth_call` and mints through the
//! injected wallet.

use std::{str::FromStr, time::Duration};

use alloy_core::{
    sol,
    sol_types::{SolCall, SolEvent, SolType, sol_data},
};
use alloy_primitives::{Address, B256, U256};
use serde_json::json;
use url::Url;

use kyc_nft_core::{
    Error, ErrorCode,
    polling::{PollError, PollOptions, poll},
    types::{AnyJson, BoxError, NetworkAndAddress, NftCheckResult, TokenDetails, Transaction},
    watcher::{LookupError, TransactionLookup},
};

use crate::{
    concepts::{MintRequest, Minter, NftChecker, SubmitOutcome, Wallet},
    errors::classify,
    metadata::{DEFAULT_IPFS_GATEWAY, fetch_metadata},
    networks::{NetworkConfig, contain, ensure_network, unexpected},
    rpc::{HttpTransport, JsonRpcClient},
};

sol! {
    interface IKycNft {
        function hasValidToken(address owner) external view returns (bool);
        function tokenOfOwnerByIndex(address owner, uint256 index) external view returns (uint256);
        function tokenURI(uint256 tokenId) external view returns (string);
        function getRequiredMintCostForCode(uint32 authCode, address destination) external view returns (uint256);
        function mintWithCode(uint32 authCode) external payable;

        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    }
}

#[derive(Debug, Clone)]
pub struct EvmProvider<T> {
    pub config: NetworkConfig,
    pub rpc: JsonRpcClient<T>,
    pub contract: Address,
    pub ipfs_gateway: String,
    /// Gas estimation is retried while the wallet has no answer yet.
    pub estimate_interval: Duration,
    pub estimate_retries: u32,
}

impl<T: HttpTransport> EvmProvider<T> {
    pub fn new(
        transport: T,
        config: NetworkConfig,
        rpc_url: Url,
        contract: &str,
    ) -> Result<Self, Error> {
        let contract = Address::from_str(contract).map_err(|e| {
            Error::configuration(
                ErrorCode::InvalidConfiguration,
                format!("Invalid contract address {contract} on {}: {e}", config.network),
            )
        })?;

        Ok(EvmProvider {
            config,
            rpc: JsonRpcClient::new(transport, rpc_url),
            contract,
            ipfs_gateway: DEFAULT_IPFS_GATEWAY.to_string(),
            estimate_interval: Duration::from_secs(1),
            estimate_retries: 5,
        })
    }

    /// Read-only call of the credential contract.
    async fn call<C: SolCall>(&self, call: &C) -> Result<Vec<u8>, Error> {
        let params = json!([
            { "to": self.contract.to_string(), "data": encode_hex(&call.abi_encode()) },
            "latest"
        ]);
        let result: String = self.rpc.call_as("eth_call", params).await?;
        decode_hex(&result)
    }

    async fn check(&self, address: &str) -> Result<Option<Vec<TokenDetails>>, Error> {
        if !self.has_valid_nft(address).await? {
            return Ok(None);
        }
        let owner = parse_address(address)?;

        let token_id = decode::<sol_data::Uint<256>>(
            &self
                .call(&IKycNft::tokenOfOwnerByIndexCall {
                    owner,
                    index: U256::ZERO,
                })
                .await?,
        )?;
        let uri = decode::<sol_data::String>(
            &self
                .call(&IKycNft::tokenURICall { tokenId: token_id })
                .await?,
        )?;

        let metadata = fetch_metadata(&self.rpc.transport, &uri, &self.ipfs_gateway).await?;
        Ok(Some(vec![
            metadata.into_token_details(token_id.to_string(), &self.ipfs_gateway),
        ]))
    }

    /// Make sure the wallet is on this provider's chain, adding the chain to
    /// the wallet if it does not know it.
    async fn ensure_chain<W: Wallet>(&self, wallet: &W) -> Result<(), BoxError> {
        let chain_id = self.config.chain_id.ok_or_else(|| {
            Error::configuration(
                ErrorCode::InvalidConfiguration,
                format!("{} has no chain id", self.config.network),
            )
        })?;

        let current = wallet.request("eth_chainId", json!([])).await?;
        if current.as_str().and_then(|c| parse_u64(c).ok()) == Some(chain_id) {
            return Ok(());
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Switching wallet to chain {chain_id}");

        let hex_chain_id = format!("0x{chain_id:x}");
        let switched = wallet
            .request(
                "wallet_switchEthereumChain",
                json!([{ "chainId": hex_chain_id }]),
            )
            .await;

        match switched {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = classify(err);
                if !err.is(ErrorCode::ChainMissing) {
                    return Err(err.into());
                }

                let currency = self.config.native_currency;
                wallet
                    .request(
                        "wallet_addEthereumChain",
                        json!([{
                            "chainId": hex_chain_id,
                            "chainName": self.config.display_name,
                            "nativeCurrency": {
                                "name": currency.name,
                                "symbol": currency.symbol,
                                "decimals": currency.decimals,
                            },
                            "rpcUrls": [self.rpc.url.as_str()],
                            "blockExplorerUrls": [self.config.explorer.base_url],
                        }]),
                    )
                    .await?;
                Ok(())
            }
        }
    }

    async fn estimate_gas<W: Wallet>(&self, wallet: &W, tx: &AnyJson) -> Result<String, BoxError> {
        let estimated = poll(
            || wallet.request("eth_estimateGas", json!([tx])),
            self.estimate_interval,
            self.estimate_retries,
            PollOptions::builder()
                .resolve_predicate(Box::new(|gas: &AnyJson| gas.is_string()))
                .build(),
        )
        .await;

        match estimated {
            Ok(gas) => Ok(gas.as_str().unwrap_or_default().to_string()),
            Err(PollError::TimeOut(timeout)) => Err(Error::transaction(
                ErrorCode::CostEstimationTimeout,
                format!("Gas estimation gave no result after {} attempts", timeout.attempts),
            )
            .into()),
            Err(PollError::Operation(err)) => Err(err.into()),
        }
    }

    /// EIP-1559 fees when the chain reports a base fee, a legacy gas price otherwise.
    async fn apply_fees(&self, tx: &mut AnyJson) -> Result<(), Error> {
        let block = self
            .rpc
            .call("eth_getBlockByNumber", json!(["latest", false]))
            .await?;

        match block.get("baseFeePerGas").and_then(AnyJson::as_str) {
            Some(base_fee) => {
                let base_fee = parse_quantity(base_fee)?;
                let priority: String = self
                    .rpc
                    .call_as("eth_maxPriorityFeePerGas", json!([]))
                    .await?;
                let priority = parse_quantity(&priority)?;
                let max_fee = base_fee
                    .saturating_mul(U256::from(2))
                    .saturating_add(priority);

                tx["maxPriorityFeePerGas"] = json!(format!("0x{priority:x}"));
                tx["maxFeePerGas"] = json!(format!("0x{max_fee:x}"));
            }
            None => {
                let price: String = self.rpc.call_as("eth_gasPrice", json!([])).await?;
                tx["gasPrice"] = json!(price);
            }
        }
        Ok(())
    }
}

impl<T: HttpTransport> NftChecker for EvmProvider<T> {
    async fn has_valid_nft(&self, address: &str) -> Result<bool, Error> {
        let owner = parse_address(address)?;
        let result = self.call(&IKycNft::hasValidTokenCall { owner }).await?;
        decode::<sol_data::Bool>(&result)
    }

    async fn get_valid_nfts(&self, network_and_address: NetworkAndAddress) -> NftCheckResult {
        let checked = match ensure_network(self.config.network, &network_and_address) {
            Ok(()) => self.check(&network_and_address.address).await,
            Err(err) => Err(err),
        };
        contain(network_and_address, checked)
    }
}

impl<T: HttpTransport> TransactionLookup for EvmProvider<T> {
    async fn transaction_status(&self, tx_hash: &str) -> Result<Transaction, LookupError> {
        let receipt = self
            .rpc
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await
            .map_err(|e| LookupError::Other(e.into()))?;

        if receipt.is_null() {
            return Err(LookupError::DoesNotExist(tx_hash.to_string()));
        }

        Ok(match receipt.get("status").and_then(AnyJson::as_str) {
            Some("0x1") => Transaction::success(receipt),
            Some("0x0") => Transaction::failure(receipt),
            _ => Transaction::unknown(Some(receipt)),
        })
    }
}

impl<T: HttpTransport> Minter for EvmProvider<T> {
    async fn submit_mint<W: Wallet>(
        &self,
        wallet: &W,
        request: MintRequest<'_>,
    ) -> Result<SubmitOutcome, BoxError> {
        self.ensure_chain(wallet).await?;

        let from = parse_address(&request.chain_and_address.address)?;
        let auth_code = parse_auth_code(&request.auth.authorization_code)?;

        let cost = decode::<sol_data::Uint<256>>(
            &self
                .call(&IKycNft::getRequiredMintCostForCodeCall {
                    authCode: auth_code,
                    destination: from,
                })
                .await?,
        )?;

        let mut tx = json!({
            "from": from.to_string(),
            "to": self.contract.to_string(),
            "data": encode_hex(&IKycNft::mintWithCodeCall { authCode: auth_code }.abi_encode()),
            "value": format!("0x{cost:x}"),
        });
        let gas = self.estimate_gas(wallet, &tx).await?;
        tx["gas"] = json!(gas);
        self.apply_fees(&mut tx).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Sending mint with code {auth_code} on {}",
            self.config.network
        );

        let hash = wallet.request("eth_sendTransaction", json!([tx])).await?;
        let tx_hash = hash
            .as_str()
            .ok_or_else(|| unexpected(format!("Wallet returned no transaction hash: {hash}")))?;

        Ok(SubmitOutcome::Submitted {
            tx_hash: tx_hash.to_string(),
        })
    }

    /// The id of the token transferred from the zero address by the contract.
    fn token_id(&self, receipt: &AnyJson) -> Result<String, Error> {
        let logs = receipt
            .get("logs")
            .and_then(AnyJson::as_array)
            .ok_or_else(|| unexpected("Receipt carries no logs"))?;

        for log in logs {
            let from_contract = log
                .get("address")
                .and_then(AnyJson::as_str)
                .and_then(|a| Address::from_str(a).ok())
                == Some(self.contract);
            let topics: Vec<B256> = log
                .get("topics")
                .and_then(AnyJson::as_array)
                .map(|topics| {
                    topics
                        .iter()
                        .filter_map(AnyJson::as_str)
                        .filter_map(|t| B256::from_str(t).ok())
                        .collect()
                })
                .unwrap_or_default();

            if from_contract
                && topics.len() == 4
                && topics[0] == IKycNft::Transfer::SIGNATURE_HASH
                && topics[1] == B256::ZERO
            {
                return Ok(U256::from_be_slice(topics[3].as_slice()).to_string());
            }
        }

        Err(unexpected("Receipt has no mint Transfer event"))
    }
}

fn parse_address(address: &str) -> Result<Address, Error> {
    Address::from_str(address).map_err(|e| {
        Error::status(
            ErrorCode::InvalidAddress,
            format!("Invalid EVM address {address}: {e}"),
        )
    })
}

fn parse_auth_code(code: &str) -> Result<u32, Error> {
    code.parse()
        .map_err(|e| unexpected(format!("Invalid authorization code {code}: {e}")))
}

fn parse_u64(quantity: &str) -> Result<u64, Error> {
    u64::from_str_radix(quantity.trim_start_matches("0x"), 16)
        .map_err(|e| unexpected(format!("Invalid quantity {quantity}: {e}")))
}

fn parse_quantity(quantity: &str) -> Result<U256, Error> {
    U256::from_str_radix(quantity.trim_start_matches("0x"), 16)
        .map_err(|e| unexpected(format!("Invalid quantity {quantity}: {e}")))
}

fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn decode_hex(data: &str) -> Result<Vec<u8>, Error> {
    hex::decode(data.trim_start_matches("0x"))
        .map_err(|e| unexpected(format!("Invalid hex payload: {e}")))
}

fn decode<S: SolType>(data: &[u8]) -> Result<S::RustType, Error> {
    S::abi_decode(data).map_err(|e| unexpected(format!("Invalid ABI payload: {e}")))
}

pub mod networks {
    use kyc_nft_core::types::BlockchainNetwork;

    use crate::networks::{ExplorerConfig, NativeCurrency, NetworkConfig};

    const ETHER: NativeCurrency = NativeCurrency {
        name: "Ether",
        symbol: "ETH",
        decimals: 18,
    };

    const POL: NativeCurrency = NativeCurrency {
        name: "POL",
        symbol: "POL",
        decimals: 18,
    };

    const CELO: NativeCurrency = NativeCurrency {
        name: "Celo",
        symbol: "CELO",
        decimals: 18,
    };

    const fn explorer(base_url: &'static str) -> ExplorerConfig {
        ExplorerConfig {
            base_url,
            transaction_path: "/tx/",
            query_suffix: "",
        }
    }

    pub const ETHEREUM_MAINNET: NetworkConfig = NetworkConfig {
        network: BlockchainNetwork::EthereumMainnet,
        display_name: "Ethereum Mainnet",
        chain_id: Some(1),
        rpc_url: "https://eth.llamarpc.com",
        native_currency: ETHER,
        explorer: explorer("https://etherscan.io"),
    };

    pub const ETHEREUM_SEPOLIA: NetworkConfig = NetworkConfig {
        network: BlockchainNetwork::EthereumSepolia,
        display_name: "Ethereum Sepolia",
        chain_id: Some(11155111),
        rpc_url: "https://rpc.sepolia.org",
        native_currency: ETHER,
        explorer: explorer("https://sepolia.etherscan.io"),
    };

    pub const POLYGON_MAINNET: NetworkConfig = NetworkConfig {
        network: BlockchainNetwork::PolygonMainnet,
        display_name: "Polygon Mainnet",
        chain_id: Some(137),
        rpc_url: "https://polygon-rpc.com",
        native_currency: POL,
        explorer: explorer("https://polygonscan.com"),
    };

    pub const POLYGON_AMOY: NetworkConfig = NetworkConfig {
        network: BlockchainNetwork::PolygonAmoy,
        display_name: "Polygon Amoy",
        chain_id: Some(80002),
        rpc_url: "https://rpc-amoy.polygon.technology",
        native_currency: POL,
        explorer: explorer("https://amoy.polygonscan.com"),
    };

    pub const BASE_MAINNET: NetworkConfig = NetworkConfig {
        network: BlockchainNetwork::BaseMainnet,
        display_name: "Base",
        chain_id: Some(8453),
        rpc_url: "https://mainnet.base.org",
        native_currency: ETHER,
        explorer: explorer("https://basescan.org"),
    };

    pub const BASE_SEPOLIA: NetworkConfig = NetworkConfig {
        network: BlockchainNetwork::BaseSepolia,
        display_name: "Base Sepolia",
        chain_id: Some(84532),
        rpc_url: "https://sepolia.base.org",
        native_currency: ETHER,
        explorer: explorer("https://sepolia.basescan.org"),
    };

    pub const CELO_MAINNET: NetworkConfig = NetworkConfig {
        network: BlockchainNetwork::CeloMainnet,
        display_name: "Celo Mainnet",
        chain_id: Some(42220),
        rpc_url: "https://forno.celo.org",
        native_currency: CELO,
        explorer: explorer("https://celoscan.io"),
    };

    pub const CELO_ALFAJORES: NetworkConfig = NetworkConfig {
        network: BlockchainNetwork::CeloAlfajores,
        display_name: "Celo Alfajores",
        chain_id: Some(44787),
        rpc_url: "https://alfajores-forno.celo-testnet.org",
        native_currency: CELO,
        explorer: explorer("https://alfajores.celoscan.io"),
    };
}
