//! Aptos: credential reads through REST `view` functions.

use serde_json::json;
use url::Url;

use kyc_nft_core::{
    Error, ErrorCode,
    types::{AnyJson, BoxError, NetworkAndAddress, NftCheckResult, TokenDetails, Transaction},
    watcher::{LookupError, TransactionLookup},
};

use crate::{
    concepts::{MintRequest, Minter, NftChecker, SubmitOutcome, Wallet},
    errors::classify,
    metadata::{DEFAULT_IPFS_GATEWAY, fetch_metadata, resolve_uri},
    networks::{NetworkConfig, contain, ensure_network, unexpected},
    rpc::HttpTransport,
};

pub const MODULE: &str = "kycdao_sbt";

const TOKEN_TYPE: &str = "0x4::token::Token";
const MINT_EVENT: &str = "0x4::collection::Mint";

#[derive(Debug, Clone)]
pub struct AptosProvider<T> {
    pub config: NetworkConfig,
    pub transport: T,
    /// REST root of the fullnode, e.g. `https://fullnode.mainnet.aptoslabs.com/v1`.
    pub base_url: Url,
    /// Account the credential module is published under.
    pub contract: String,
    pub ipfs_gateway: String,
}

impl<T: HttpTransport> AptosProvider<T> {
    pub fn new(transport: T, config: NetworkConfig, base_url: Url, contract: &str) -> Self {
        AptosProvider {
            config,
            transport,
            base_url,
            contract: contract.to_string(),
            ipfs_gateway: DEFAULT_IPFS_GATEWAY.to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let url = format!("{}/{path}", self.base_url.as_str().trim_end_matches('/'));
        Url::parse(&url).map_err(|e| {
            Error::configuration(
                ErrorCode::InvalidConfiguration,
                format!("Invalid Aptos endpoint {url}: {e}"),
            )
        })
    }

    fn function(&self, name: &str) -> String {
        format!("{}::{MODULE}::{name}", self.contract)
    }

    /// Call a view function and return its first result.
    async fn view(
        &self,
        function: &str,
        type_arguments: &[&str],
        arguments: AnyJson,
    ) -> Result<AnyJson, Error> {
        let body = json!({
            "function": function,
            "type_arguments": type_arguments,
            "arguments": arguments,
        });
        let result = self
            .transport
            .post_json(&self.endpoint("view")?, &body)
            .await
            .map_err(classify)?;

        result
            .get(0)
            .cloned()
            .ok_or_else(|| unexpected(format!("View {function} returned nothing")))
    }

    async fn token_string(&self, field: &str, token: &str) -> Result<String, Error> {
        self.view(&format!("0x4::token::{field}"), &[TOKEN_TYPE], json!([token]))
            .await?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| unexpected(format!("Token {field} is not a string")))
    }

    async fn check(&self, address: &str) -> Result<Option<Vec<TokenDetails>>, Error> {
        if !self.has_valid_nft(address).await? {
            return Ok(None);
        }

        let token = self
            .view(&self.function("get_token_address"), &[], json!([address]))
            .await?;
        let token = token
            .as_str()
            .ok_or_else(|| unexpected("Token address is not a string"))?;

        let name = self.token_string("name", token).await?;
        let description = self.token_string("description", token).await?;
        let uri = self.token_string("uri", token).await?;
        let metadata = fetch_metadata(&self.transport, &uri, &self.ipfs_gateway).await?;

        Ok(Some(vec![TokenDetails {
            token_id: Some(token.to_string()),
            name: Some(name),
            description: Some(description),
            image: metadata
                .image
                .map(|image| resolve_uri(&image, &self.ipfs_gateway)),
        }]))
    }
}

impl<T: HttpTransport> NftChecker for AptosProvider<T> {
    async fn has_valid_nft(&self, address: &str) -> Result<bool, Error> {
        self.view(&self.function("has_valid_token"), &[], json!([address]))
            .await?
            .as_bool()
            .ok_or_else(|| unexpected("has_valid_token returned a non-boolean"))
    }

    async fn get_valid_nfts(&self, network_and_address: NetworkAndAddress) -> NftCheckResult {
        let checked = match ensure_network(self.config.network, &network_and_address) {
            Ok(()) => self.check(&network_and_address.address).await,
            Err(err) => Err(err),
        };
        contain(network_and_address, checked)
    }
}

impl<T: HttpTransport> TransactionLookup for AptosProvider<T> {
    async fn transaction_status(&self, tx_hash: &str) -> Result<Transaction, LookupError> {
        let url = self.endpoint(&format!("transactions/by_hash/{tx_hash}"))?;
        let tx = match self.transport.get_json(&url).await {
            Ok(tx) => tx,
            Err(err) if err.is_not_found() => {
                return Err(LookupError::DoesNotExist(tx_hash.to_string()));
            }
            Err(err) => return Err(LookupError::Other(classify(err))),
        };

        if tx.get("type").and_then(AnyJson::as_str) == Some("pending_transaction") {
            return Ok(Transaction::started());
        }
        Ok(match tx.get("success").and_then(AnyJson::as_bool) {
            Some(true) => Transaction::success(tx),
            Some(false) => Transaction::failure(tx),
            None => Transaction::unknown(Some(tx)),
        })
    }
}

impl<T: HttpTransport> Minter for AptosProvider<T> {
    async fn submit_mint<W: Wallet>(
        &self,
        wallet: &W,
        request: MintRequest<'_>,
    ) -> Result<SubmitOutcome, BoxError> {
        let auth_code: u32 = request.auth.authorization_code.parse().map_err(|e| {
            unexpected(format!(
                "Invalid authorization code {}: {e}",
                request.auth.authorization_code
            ))
        })?;

        let payload = json!({
            "payload": {
                "type": "entry_function_payload",
                "function": self.function("mint_with_code"),
                "type_arguments": [],
                "arguments": [auth_code],
            }
        });
        let result = wallet.request("signAndSubmitTransaction", payload).await?;

        let hash = result
            .get("hash")
            .and_then(AnyJson::as_str)
            .ok_or_else(|| unexpected(format!("Wallet returned no transaction hash: {result}")))?;
        Ok(SubmitOutcome::Submitted {
            tx_hash: hash.to_string(),
        })
    }

    /// The token address announced by the collection's `Mint` event.
    fn token_id(&self, tx: &AnyJson) -> Result<String, Error> {
        tx.get("events")
            .and_then(AnyJson::as_array)
            .into_iter()
            .flatten()
            .filter(|event| event.get("type").and_then(AnyJson::as_str) == Some(MINT_EVENT))
            .find_map(|event| event.pointer("/data/token").and_then(AnyJson::as_str))
            .map(str::to_string)
            .ok_or_else(|| unexpected("Transaction has no collection Mint event"))
    }
}

pub mod networks {
    use kyc_nft_core::types::BlockchainNetwork;

    use crate::networks::{ExplorerConfig, NativeCurrency, NetworkConfig};

    const APT: NativeCurrency = NativeCurrency {
        name: "Aptos Coin",
        symbol: "APT",
        decimals: 8,
    };

    pub const APTOS_MAINNET: NetworkConfig = NetworkConfig {
        network: BlockchainNetwork::AptosMainnet,
        display_name: "Aptos Mainnet",
        chain_id: None,
        rpc_url: "https://fullnode.mainnet.aptoslabs.com/v1",
        native_currency: APT,
        explorer: ExplorerConfig {
            base_url: "https://explorer.aptoslabs.com",
            transaction_path: "/txn/",
            query_suffix: "?network=mainnet",
        },
    };

    pub const APTOS_TESTNET: NetworkConfig = NetworkConfig {
        network: BlockchainNetwork::AptosTestnet,
        display_name: "Aptos Testnet",
        chain_id: None,
        rpc_url: "https://fullnode.testnet.aptoslabs.com/v1",
        native_currency: APT,
        explorer: ExplorerConfig {
            base_url: "https://explorer.aptoslabs.com",
            transaction_path: "/txn/",
            query_suffix: "?network=testnet",
        },
    };
}
