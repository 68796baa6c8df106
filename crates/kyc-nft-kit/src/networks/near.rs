//! Near: credential reads through `call_function` view queries, mints through
//! the wallet's `requestSignTransactions`, which may redirect the page.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use kyc_nft_core::{
    Error, ErrorCode,
    types::{AnyJson, BoxError, NetworkAndAddress, NftCheckResult, TokenDetails, Transaction},
    watcher::LookupError,
};

use crate::{
    concepts::{MintRequest, Minter, NftChecker, SubmitOutcome, Wallet},
    metadata::{DEFAULT_IPFS_GATEWAY, resolve_uri},
    networks::{NetworkConfig, contain, ensure_network, unexpected},
    rpc::{HttpTransport, JsonRpcClient, RpcCallError},
};

const MINT_GAS: &str = "300000000000000";

#[derive(Debug, Clone)]
pub struct NearProvider<T> {
    pub config: NetworkConfig,
    pub rpc: JsonRpcClient<T>,
    pub contract: String,
    pub ipfs_gateway: String,
}

#[derive(Debug, Deserialize)]
struct NearToken {
    token_id: String,
    #[serde(default)]
    metadata: Option<NearTokenMetadata>,
}

#[derive(Debug, Deserialize)]
struct NearTokenMetadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    media: Option<String>,
}

impl<T: HttpTransport> NearProvider<T> {
    pub fn new(transport: T, config: NetworkConfig, rpc_url: Url, contract: &str) -> Self {
        NearProvider {
            config,
            rpc: JsonRpcClient::new(transport, rpc_url),
            contract: contract.to_string(),
            ipfs_gateway: DEFAULT_IPFS_GATEWAY.to_string(),
        }
    }

    /// Run a view method of the credential contract and decode its JSON result.
    async fn view(&self, method: &str, args: AnyJson) -> Result<AnyJson, Error> {
        let params = json!({
            "request_type": "call_function",
            "finality": "final",
            "account_id": self.contract,
            "method_name": method,
            "args_base64": STANDARD.encode(args.to_string()),
        });
        let result = self.rpc.call("query", params).await?;

        if let Some(error) = result.get("error").and_then(AnyJson::as_str) {
            return Err(unexpected(format!("Near view {method} failed: {error}")));
        }
        let bytes: Vec<u8> = result
            .get("result")
            .and_then(AnyJson::as_array)
            .ok_or_else(|| unexpected(format!("Near view {method} returned no result")))?
            .iter()
            .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect::<Option<_>>()
            .ok_or_else(|| unexpected(format!("Near view {method} returned non-byte data")))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| unexpected(format!("Near view {method} returned invalid JSON: {e}")))
    }

    async fn check(&self, address: &str) -> Result<Option<Vec<TokenDetails>>, Error> {
        if !self.has_valid_nft(address).await? {
            return Ok(None);
        }

        let tokens: Vec<NearToken> = serde_json::from_value(
            self.view("nft_tokens_for_owner", json!({ "account_id": address }))
                .await?,
        )
        .map_err(|e| unexpected(format!("Unexpected Near token listing: {e}")))?;

        tokens
            .into_iter()
            .map(|token| self.token_details(token))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn token_details(&self, token: NearToken) -> Result<TokenDetails, Error> {
        let invalid = || {
            Error::internal(
                ErrorCode::MetadataInvalid,
                format!("Near NFT metadata is invalid for token {}", token.token_id),
            )
        };
        let metadata = token.metadata.as_ref().ok_or_else(invalid)?;
        let (Some(title), Some(description), Some(media)) =
            (&metadata.title, &metadata.description, &metadata.media)
        else {
            return Err(invalid());
        };

        Ok(TokenDetails {
            token_id: Some(token.token_id.clone()),
            name: Some(title.clone()),
            description: Some(description.clone()),
            image: Some(resolve_uri(media, &self.ipfs_gateway)),
        })
    }

    /// Status of `tx_hash` signed by `sender`.
    ///
    /// Near nodes route status queries by the signer's shard, so the lookup
    /// needs the sender next to the hash.
    pub async fn transaction_status(
        &self,
        tx_hash: &str,
        sender: &str,
    ) -> Result<Transaction, LookupError> {
        let outcome = match self.rpc.call("tx", json!([tx_hash, sender])).await {
            Ok(outcome) => outcome,
            Err(RpcCallError::Rpc(err)) if is_unknown_transaction(&err) => {
                return Err(LookupError::DoesNotExist(tx_hash.to_string()));
            }
            Err(err) => return Err(LookupError::Other(err.into())),
        };

        Ok(match outcome.get("status") {
            Some(AnyJson::Object(status)) if status.contains_key("Failure") => {
                Transaction::failure(outcome)
            }
            Some(AnyJson::Object(status))
                if status.contains_key("SuccessValue") || status.contains_key("SuccessReceiptId") =>
            {
                Transaction::success(outcome)
            }
            Some(AnyJson::String(s)) if s == "Started" => Transaction::started(),
            Some(AnyJson::String(s)) if s == "NotStarted" => {
                Transaction::new(kyc_nft_core::types::TransactionStatus::NotStarted, None)
            }
            _ => Transaction::unknown(Some(outcome)),
        })
    }
}

fn is_unknown_transaction(err: &crate::rpc::JsonRpcError) -> bool {
    err.cause_name() == Some("UNKNOWN_TRANSACTION")
        || err
            .data
            .as_ref()
            .and_then(AnyJson::as_str)
            .is_some_and(|d| d.contains("doesn't exist"))
}

impl<T: HttpTransport> NftChecker for NearProvider<T> {
    async fn has_valid_nft(&self, address: &str) -> Result<bool, Error> {
        self.view("has_valid_token", json!({ "address": address }))
            .await?
            .as_bool()
            .ok_or_else(|| unexpected("Near has_valid_token returned a non-boolean"))
    }

    async fn get_valid_nfts(&self, network_and_address: NetworkAndAddress) -> NftCheckResult {
        let checked = match ensure_network(self.config.network, &network_and_address) {
            Ok(()) => self.check(&network_and_address.address).await,
            Err(err) => Err(err),
        };
        contain(network_and_address, checked)
    }
}

impl<T: HttpTransport> Minter for NearProvider<T> {
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
        let deposit = request.auth.price.as_deref().unwrap_or("0");

        let mut params = json!({
            "transactions": [{
                "receiverId": self.contract,
                "actions": [{
                    "type": "FunctionCall",
                    "params": {
                        "methodName": "mint_with_code",
                        "args": { "auth_code": auth_code },
                        "gas": MINT_GAS,
                        "deposit": deposit,
                    }
                }]
            }]
        });
        if let Some(callback) = request.callback_url {
            params["callbackUrl"] = json!(callback.as_str());
        }

        let result = wallet.request("requestSignTransactions", params).await?;
        Ok(submit_outcome(&result)?)
    }

    /// The token id announced by the `nft_mint` event of the outcome.
    fn token_id(&self, outcome: &AnyJson) -> Result<String, Error> {
        outcome
            .get("receipts_outcome")
            .and_then(AnyJson::as_array)
            .into_iter()
            .flatten()
            .filter_map(|receipt| receipt.pointer("/outcome/logs")?.as_array())
            .flatten()
            .filter_map(|log| log.as_str()?.strip_prefix("EVENT_JSON:"))
            .filter_map(|event| serde_json::from_str::<AnyJson>(event).ok())
            .filter(|event| event.get("event").and_then(AnyJson::as_str) == Some("nft_mint"))
            .find_map(|event| {
                event
                    .pointer("/data/0/token_ids/0")
                    .and_then(AnyJson::as_str)
                    .map(str::to_string)
            })
            .ok_or_else(|| unexpected("Outcome has no nft_mint event"))
    }
}

/// Interpret what `requestSignTransactions` answered.
fn submit_outcome(result: &AnyJson) -> Result<SubmitOutcome, Error> {
    if let Some(url) = result.get("redirectUrl").and_then(AnyJson::as_str) {
        return Ok(SubmitOutcome::Redirect {
            url: url.to_string(),
        });
    }

    let hashes = result.get("transactionHashes").unwrap_or(result);
    let last = match hashes {
        AnyJson::String(joined) => joined.split(',').map(str::trim).last(),
        AnyJson::Array(list) => list.iter().filter_map(AnyJson::as_str).last(),
        _ => None,
    };
    match last {
        Some(tx_hash) if !tx_hash.is_empty() => Ok(SubmitOutcome::Submitted {
            tx_hash: tx_hash.to_string(),
        }),
        _ => Err(unexpected(format!(
            "Near wallet returned no transaction hash: {result}"
        ))),
    }
}

pub mod networks {
    use kyc_nft_core::types::BlockchainNetwork;

    use crate::networks::{ExplorerConfig, NativeCurrency, NetworkConfig};

    const NEAR: NativeCurrency = NativeCurrency {
        name: "NEAR",
        symbol: "NEAR",
        decimals: 24,
    };

    pub const NEAR_MAINNET: NetworkConfig = NetworkConfig {
        network: BlockchainNetwork::NearMainnet,
        display_name: "NEAR Mainnet",
        chain_id: None,
        rpc_url: "https://rpc.mainnet.near.org",
        native_currency: NEAR,
        explorer: ExplorerConfig {
            base_url: "https://nearblocks.io",
            transaction_path: "/txns/",
            query_suffix: "",
        },
    };

    pub const NEAR_TESTNET: NetworkConfig = NetworkConfig {
        network: BlockchainNetwork::NearTestnet,
        display_name: "NEAR Testnet",
        chain_id: None,
        rpc_url: "https://rpc.testnet.near.org",
        native_currency: NEAR,
        explorer: ExplorerConfig {
            base_url: "https://testnet.nearblocks.io",
            transaction_path: "/txns/",
            query_suffix: "",
        },
    };
}
