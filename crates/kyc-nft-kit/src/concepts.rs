//! Core traits connecting the SDK to wallets and chains.

use url::Url;

use kyc_nft_core::{
    Error,
    types::{AnyJson, BoxError, ChainAndAddress, MintAuthResponse, NetworkAndAddress, NftCheckResult},
};

/// A connected wallet, driven by request/response calls.
///
/// Methods follow the conventions of each chain's injected wallet: EIP-1193
/// names on EVM (`eth_sendTransaction`, `personal_sign`, ...), and
/// `signMessage`, `signAndSendTransaction`, `requestSignTransactions`,
/// `signAndSubmitTransaction` on Solana, Near and Aptos. Wallet errors are left
/// raw so the classifier can recognize them.
pub trait Wallet {
    type Error: std::error::Error + Send + Sync + 'static;

    fn request(
        &self,
        method: &str,
        params: AnyJson,
    ) -> impl Future<Output = Result<AnyJson, Self::Error>>;
}

/// Reads credential state from a chain.
pub trait NftChecker {
    /// Whether `address` holds a valid credential on this network.
    fn has_valid_nft(&self, address: &str) -> impl Future<Output = Result<bool, Error>>;

    /// Credential state and token details of one wallet.
    ///
    /// Never fails. A failed check is reported inside the result so sibling
    /// checks can still complete.
    fn get_valid_nfts(
        &self,
        network_and_address: NetworkAndAddress,
    ) -> impl Future<Output = NftCheckResult>;
}

/// Everything a chain needs to submit a mint.
#[derive(Debug, Clone, Copy)]
pub struct MintRequest<'a> {
    pub chain_and_address: &'a ChainAndAddress,
    pub auth: &'a MintAuthResponse,
    /// Where a redirecting wallet should return to.
    pub callback_url: Option<&'a Url>,
}

/// What a submission produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted { tx_hash: String },
    /// The wallet navigates away. The flow resumes when the user comes back.
    Redirect { url: String },
}

/// Submits authorized mints and reads their result.
pub trait Minter {
    fn submit_mint<W: Wallet>(
        &self,
        wallet: &W,
        request: MintRequest<'_>,
    ) -> impl Future<Output = Result<SubmitOutcome, BoxError>>;

    /// The token id minted by a confirmed transaction.
    fn token_id(&self, confirmed: &AnyJson) -> Result<String, Error>;
}
