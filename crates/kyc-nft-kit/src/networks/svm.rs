//! Solana: credential state lives in a status account derived from the owner.

use std::{
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::json;
use solana_pubkey::Pubkey;
use url::Url;

use kyc_nft_core::{
    Error, ErrorCode,
    types::{AnyJson, BoxError, NetworkAndAddress, NftCheckResult, TokenDetails, Transaction},
    watcher::{LookupError, TransactionLookup},
};

use crate::{
    concepts::{MintRequest, Minter, NftChecker, SubmitOutcome, Wallet},
    metadata::DEFAULT_IPFS_GATEWAY,
    networks::{NetworkConfig, contain, ensure_network, unexpected},
    rpc::{HttpTransport, JsonRpcClient},
};

pub const STATUS_SEED: &[u8] = b"kycdao_status";

pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// `[8-byte discriminator][is_valid u8][expiry i64 LE]`
const STATUS_LEN: usize = 8 + 1 + 8;

/// The decoded status account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialStatus {
    pub is_valid: bool,
    /// Unix seconds.
    pub expiry: i64,
}

impl CredentialStatus {
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        if data.len() < STATUS_LEN {
            return Err(unexpected(format!(
                "Status account holds {} bytes, expected at least {STATUS_LEN}",
                data.len()
            )));
        }
        let mut expiry = [0u8; 8];
        expiry.copy_from_slice(&data[9..STATUS_LEN]);

        Ok(CredentialStatus {
            is_valid: data[8] != 0,
            expiry: i64::from_le_bytes(expiry),
        })
    }

    pub fn is_valid_at(&self, now: i64) -> bool {
        self.is_valid && self.expiry > now
    }
}

#[derive(Debug, Clone)]
pub struct SvmProvider<T> {
    pub config: NetworkConfig,
    pub rpc: JsonRpcClient<T>,
    pub program_id: Pubkey,
    pub ipfs_gateway: String,
}

impl<T: HttpTransport> SvmProvider<T> {
    pub fn new(
        transport: T,
        config: NetworkConfig,
        rpc_url: Url,
        program_id: &str,
    ) -> Result<Self, Error> {
        let program_id = Pubkey::from_str(program_id).map_err(|e| {
            Error::configuration(
                ErrorCode::InvalidConfiguration,
                format!("Invalid program id {program_id} on {}: {e}", config.network),
            )
        })?;

        Ok(SvmProvider {
            config,
            rpc: JsonRpcClient::new(transport, rpc_url),
            program_id,
            ipfs_gateway: DEFAULT_IPFS_GATEWAY.to_string(),
        })
    }

    /// The status account of `owner`.
    pub fn status_address(&self, owner: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[STATUS_SEED, owner.as_ref()], &self.program_id).0
    }

    async fn status(&self, owner: &Pubkey) -> Result<Option<CredentialStatus>, Error> {
        let account = self
            .rpc
            .call(
                "getAccountInfo",
                json!([
                    self.status_address(owner).to_string(),
                    { "encoding": "base64", "commitment": "confirmed" }
                ]),
            )
            .await?;

        let Some(value) = account.get("value").filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let encoded = value
            .pointer("/data/0")
            .and_then(AnyJson::as_str)
            .ok_or_else(|| unexpected("Status account has no base64 data"))?;
        let data = STANDARD
            .decode(encoded)
            .map_err(|e| unexpected(format!("Invalid status account data: {e}")))?;

        CredentialStatus::decode(&data).map(Some)
    }

    async fn tokens(&self, owner: &Pubkey) -> Result<Vec<TokenDetails>, Error> {
        let accounts = self
            .rpc
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner.to_string(),
                    { "programId": TOKEN_PROGRAM_ID },
                    { "encoding": "jsonParsed" }
                ]),
            )
            .await?;

        Ok(accounts
            .get("value")
            .and_then(AnyJson::as_array)
            .into_iter()
            .flatten()
            .filter_map(|account| account.pointer("/account/data/parsed/info"))
            .filter(|info| {
                info.pointer("/tokenAmount/amount").and_then(AnyJson::as_str) == Some("1")
                    && info.pointer("/tokenAmount/decimals").and_then(AnyJson::as_u64) == Some(0)
            })
            .filter_map(|info| info.get("mint").and_then(AnyJson::as_str))
            .map(|mint| TokenDetails {
                token_id: Some(mint.to_string()),
                ..Default::default()
            })
            .collect())
    }

    async fn check(&self, address: &str) -> Result<Option<Vec<TokenDetails>>, Error> {
        if !self.has_valid_nft(address).await? {
            return Ok(None);
        }
        let owner = parse_pubkey(address)?;
        self.tokens(&owner).await.map(Some)
    }
}

fn parse_pubkey(address: &str) -> Result<Pubkey, Error> {
    Pubkey::from_str(address).map_err(|e| {
        Error::status(
            ErrorCode::InvalidAddress,
            format!("Invalid Solana address {address}: {e}"),
        )
    })
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

impl<T: HttpTransport> NftChecker for SvmProvider<T> {
    async fn has_valid_nft(&self, address: &str) -> Result<bool, Error> {
        let owner = parse_pubkey(address)?;
        Ok(self
            .status(&owner)
            .await?
            .is_some_and(|status| status.is_valid_at(now())))
    }

    async fn get_valid_nfts(&self, network_and_address: NetworkAndAddress) -> NftCheckResult {
        let checked = match ensure_network(self.config.network, &network_and_address) {
            Ok(()) => self.check(&network_and_address.address).await,
            Err(err) => Err(err),
        };
        contain(network_and_address, checked)
    }
}

impl<T: HttpTransport> TransactionLookup for SvmProvider<T> {
    async fn transaction_status(&self, tx_hash: &str) -> Result<Transaction, LookupError> {
        let tx = self
            .rpc
            .call(
                "getTransaction",
                json!([
                    tx_hash,
                    {
                        "encoding": "json",
                        "commitment": "confirmed",
                        "maxSupportedTransactionVersion": 0
                    }
                ]),
            )
            .await
            .map_err(|e| LookupError::Other(e.into()))?;

        if tx.is_null() {
            return Err(LookupError::DoesNotExist(tx_hash.to_string()));
        }

        Ok(match tx.get("meta").filter(|m| !m.is_null()) {
            None => Transaction::unknown(Some(tx)),
            Some(meta) if meta.get("err").is_none_or(AnyJson::is_null) => Transaction::success(tx),
            Some(_) => Transaction::failure(tx),
        })
    }
}

impl<T: HttpTransport> Minter for SvmProvider<T> {
    /// Sign and send the mint transaction the backend prepared.
    async fn submit_mint<W: Wallet>(
        &self,
        wallet: &W,
        request: MintRequest<'_>,
    ) -> Result<SubmitOutcome, BoxError> {
        let transaction = request
            .auth
            .mint_transaction
            .as_deref()
            .ok_or_else(|| unexpected("Backend prepared no Solana mint transaction"))?;

        let result = wallet
            .request(
                "signAndSendTransaction",
                json!({ "transaction": transaction, "encoding": "base64" }),
            )
            .await?;

        let signature = result
            .get("signature")
            .unwrap_or(&result)
            .as_str()
            .ok_or_else(|| unexpected(format!("Wallet returned no signature: {result}")))?;

        Ok(SubmitOutcome::Submitted {
            tx_hash: signature.to_string(),
        })
    }

    /// The mint of the first post-transaction token balance.
    fn token_id(&self, tx: &AnyJson) -> Result<String, Error> {
        tx.pointer("/meta/postTokenBalances/0/mint")
            .and_then(AnyJson::as_str)
            .map(str::to_string)
            .ok_or_else(|| unexpected("Transaction has no post token balance"))
    }
}

pub mod networks {
    use kyc_nft_core::types::BlockchainNetwork;

    use crate::networks::{ExplorerConfig, NativeCurrency, NetworkConfig};

    const SOL: NativeCurrency = NativeCurrency {
        name: "Solana",
        symbol: "SOL",
        decimals: 9,
    };

    const fn explorer(query_suffix: &'static str) -> ExplorerConfig {
        ExplorerConfig {
            base_url: "https://explorer.solana.com",
            transaction_path: "/tx/",
            query_suffix,
        }
    }

    pub const SOLANA_MAINNET: NetworkConfig = NetworkConfig {
        network: BlockchainNetwork::SolanaMainnet,
        display_name: "Solana Mainnet",
        chain_id: None,
        rpc_url: "https://api.mainnet-beta.solana.com",
        native_currency: SOL,
        explorer: explorer(""),
    };

    pub const SOLANA_DEVNET: NetworkConfig = NetworkConfig {
        network: BlockchainNetwork::SolanaDevnet,
        display_name: "Solana Devnet",
        chain_id: None,
        rpc_url: "https://api.devnet.solana.com",
        native_currency: SOL,
        explorer: explorer("?cluster=devnet"),
    };

    pub const SOLANA_TESTNET: NetworkConfig = NetworkConfig {
        network: BlockchainNetwork::SolanaTestnet,
        display_name: "Solana Testnet",
        chain_id: None,
        rpc_url: "https://api.testnet.solana.com",
        native_currency: SOL,
        explorer: explorer("?cluster=testnet"),
    };
}
