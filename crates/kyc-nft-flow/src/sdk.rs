//! The SDK entry point.

use std::{collections::HashMap, sync::Arc};

use futures::future::join_all;
use url::Url;

use kyc_nft_core::{
    Error, ErrorCode,
    classifier::{Classifier, TelemetrySink},
    types::{
        BlockchainNetwork, ChainAndAddress, MintingData, MintingState, MintingStep,
        NetworkAndAddress, NftCheckResult, PendingMint, Session, UserDetails, VerificationType,
    },
};
use kyc_nft_kit::{
    api_client::{ApiStatus, BackendApi, UpdateUserRequest},
    concepts::{NftChecker, Wallet},
    errors::{classify, default_transformers},
    explorer,
    networks::ChainProvider,
    rpc::HttpTransport,
};

use crate::{
    config::SdkConfig,
    guard::SessionState,
    minting::{Authorized, MintContext, MintResult, MintingFlow, Submission, Submitted},
    storage::{InMemoryStore, PendingMintStore},
};

/// How [`KycNft::start_minting`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintOutcome {
    Minted(MintResult),
    /// Send the user to `url`. When the wallet returns, pass the URL it
    /// returned to into [`KycNft::resume_minting`].
    Redirect { url: String },
}

/// Owns the session, the connected wallet and the minting memo of one user.
///
/// Every public operation reports its failure through the classifier, so
/// callers only ever see [`Error`].
pub struct KycNft<B, T, W> {
    config: SdkConfig,
    api: B,
    transport: T,
    classifier: Classifier,
    store: Box<dyn PendingMintStore>,
    wallet: Option<W>,
    chain_and_address: Option<ChainAndAddress>,
    session: SessionState,
    minting_state: Option<MintingState>,
}

#[cfg(feature = "tracing")]
fn default_telemetry() -> Arc<dyn TelemetrySink> {
    Arc::new(kyc_nft_core::classifier::TracingTelemetry)
}

#[cfg(not(feature = "tracing"))]
fn default_telemetry() -> Arc<dyn TelemetrySink> {
    Arc::new(kyc_nft_core::classifier::NoopTelemetry)
}

#[cfg(feature = "http-client")]
impl<W: Wallet> KycNft<kyc_nft_kit::api_client::BackendClient, kyc_nft_kit::rpc::ReqwestTransport, W> {
    /// An SDK talking to the configured backend and public RPC endpoints over HTTP.
    pub fn from_config(config: SdkConfig) -> Result<Self, Error> {
        use kyc_nft_kit::api_client::BackendClient;

        let invalid = |e: kyc_nft_kit::api_client::BackendClientError| {
            Error::configuration(
                ErrorCode::InvalidConfiguration,
                format!("Invalid backend client configuration: {e}"),
            )
            .with_source(e)
        };

        let mut api = BackendClient::new(config.api_base_url.clone()).map_err(invalid)?;
        if let Some(api_key) = &config.api_key {
            api = api.with_api_key(api_key).map_err(invalid)?;
        }
        KycNft::new(config, api, kyc_nft_kit::rpc::ReqwestTransport::default())
    }
}

impl<B, T, W> KycNft<B, T, W>
where
    B: BackendApi,
    T: HttpTransport + Clone,
    W: Wallet,
{
    pub fn new(config: SdkConfig, api: B, transport: T) -> Result<Self, Error> {
        config.validate()?;
        Ok(KycNft {
            config,
            api,
            transport,
            classifier: Classifier::new(default_transformers(), default_telemetry()),
            store: Box::new(InMemoryStore::default()),
            wallet: None,
            chain_and_address: None,
            session: SessionState::default(),
            minting_state: None,
        })
    }

    /// Report classified failures to `telemetry` instead of the log.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.classifier = Classifier::new(default_transformers(), telemetry);
        self
    }

    /// Persist pending mints in `store`, e.g. a [`FileStore`](crate::storage::FileStore).
    pub fn with_store(mut self, store: impl PendingMintStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn api(&self) -> &B {
        &self.api
    }

    pub fn wallet(&self) -> Option<&W> {
        self.wallet.as_ref()
    }

    pub fn connected_wallet(&self) -> Option<&ChainAndAddress> {
        self.chain_and_address.as_ref()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.session.as_ref()
    }

    pub fn user(&self) -> Option<&UserDetails> {
        self.session.user.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.chain_and_address
            .as_ref()
            .is_some_and(|wallet| self.session.user_for(wallet).is_some())
    }

    /// The authorization memo of an attempt that did not run to its end.
    pub fn minting_state(&self) -> Option<&MintingState> {
        self.minting_state.as_ref()
    }

    fn report<V>(&self, operation: &str, result: Result<V, Error>) -> Result<V, Error> {
        result.map_err(|err| self.classifier.report(operation, Box::new(err)))
    }

    /// Check the backend, make sure it serves every enabled network, and
    /// load the current session.
    pub async fn initialize(&mut self) -> Result<ApiStatus, Error> {
        let result = self.initialize_inner().await;
        self.report("initialize", result)
    }

    async fn initialize_inner(&mut self) -> Result<ApiStatus, Error> {
        let status = self.api.get_status().await.map_err(classify)?;
        let networks = self.api.get_networks().await.map_err(classify)?;

        if let Some(missing) = self
            .config
            .enabled_networks
            .iter()
            .find(|enabled| !networks.iter().any(|n| n.id == **enabled))
        {
            return Err(Error::status(
                ErrorCode::NetworkNotSupported,
                format!("Backend does not support {missing}"),
            ));
        }

        self.session
            .refresh(&self.api, self.chain_and_address.as_ref())
            .await?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Initialized against backend {:?}", status.version);

        Ok(status)
    }

    /// Use `wallet`, signed in as `address` on `network`.
    ///
    /// Switching to a different wallet drops the minting memo. The session is
    /// refreshed for the new wallet.
    pub async fn connect_wallet(
        &mut self,
        network: BlockchainNetwork,
        address: &str,
        wallet: W,
    ) -> Result<(), Error> {
        let result = self.connect_wallet_inner(network, address, wallet).await;
        self.report("connect_wallet", result)
    }

    async fn connect_wallet_inner(
        &mut self,
        network: BlockchainNetwork,
        address: &str,
        wallet: W,
    ) -> Result<(), Error> {
        if !self.config.is_enabled(network) {
            return Err(Error::status(
                ErrorCode::NetworkNotEnabled,
                format!("{network} is not enabled"),
            ));
        }
        if address.trim().is_empty() {
            return Err(Error::status(
                ErrorCode::InvalidAddress,
                "Wallet address is empty",
            ));
        }

        let connected = ChainAndAddress::new(network, address.trim());
        if !self
            .chain_and_address
            .as_ref()
            .is_some_and(|current| current.same_wallet(&connected))
        {
            self.minting_state = None;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Connected {} on {network}", connected.address);

        self.wallet = Some(wallet);
        self.chain_and_address = Some(connected);
        self.session
            .refresh(&self.api, self.chain_and_address.as_ref())
            .await
    }

    /// Forget the wallet along with everything cached for it.
    pub fn disconnect_wallet(&mut self) {
        self.wallet = None;
        self.chain_and_address = None;
        self.minting_state = None;
        self.session.clear();
    }

    pub async fn refresh_session(&mut self) -> Result<(), Error> {
        let result = self
            .session
            .refresh(&self.api, self.chain_and_address.as_ref())
            .await;
        self.report("refresh_session", result)
    }

    /// Log in with the connected wallet by signing the session nonce.
    pub async fn register_or_login(&mut self) -> Result<UserDetails, Error> {
        let result = match (self.wallet.as_ref(), self.chain_and_address.as_ref()) {
            (Some(wallet), Some(connected)) => {
                self.session.login(&self.api, wallet, connected).await
            }
            _ => Err(not_connected()),
        };
        self.report("register_or_login", result)
    }

    pub async fn accept_disclaimer(&mut self) -> Result<(), Error> {
        let result = self.accept_disclaimer_inner().await;
        self.report("accept_disclaimer", result)
    }

    async fn accept_disclaimer_inner(&mut self) -> Result<(), Error> {
        let user = self.session.user.as_ref().ok_or_else(not_logged_in)?;
        if user.has_accepted_disclaimer() {
            return Ok(());
        }

        self.api.accept_disclaimer().await.map_err(classify)?;
        self.session
            .refresh(&self.api, self.chain_and_address.as_ref())
            .await
    }

    pub async fn update_email(&mut self, email: &str) -> Result<UserDetails, Error> {
        let result = self.update_email_inner(email).await;
        self.report("update_email", result)
    }

    async fn update_email_inner(&mut self, email: &str) -> Result<UserDetails, Error> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(Error::status(
                ErrorCode::EmailInvalid,
                format!("Invalid email address: {email}"),
            ));
        }
        if self.session.user.is_none() {
            return Err(not_logged_in());
        }

        let user = self
            .api
            .update_user(&UpdateUserRequest {
                email: Some(email.to_string()),
            })
            .await
            .map_err(classify)?;
        self.session.set_user(user.clone());
        Ok(user)
    }

    /// The provider for `network` reading the contract of `verification_type`.
    fn provider(
        &self,
        network: BlockchainNetwork,
        verification_type: VerificationType,
    ) -> Result<ChainProvider<T>, Error> {
        if !self.config.is_enabled(network) {
            return Err(Error::status(
                ErrorCode::NetworkNotEnabled,
                format!("{network} is not enabled"),
            ));
        }
        let contract = self.config.contract(network, verification_type)?;
        Ok(ChainProvider::new(
            self.transport.clone(),
            network,
            &contract.address,
            self.config.rpc_url(network),
        )?
        .with_ipfs_gateway(self.config.ipfs_gateway.clone()))
    }

    pub async fn has_valid_nft(
        &self,
        verification_type: VerificationType,
        network_and_address: &NetworkAndAddress,
    ) -> Result<bool, Error> {
        self.classifier
            .catch("has_valid_nft", async {
                self.provider(network_and_address.blockchain_network, verification_type)?
                    .has_valid_nft(&network_and_address.address)
                    .await
            })
            .await
    }

    /// Credential state of one address. A failure is reported in the result.
    pub async fn check_nfts(
        &self,
        verification_type: VerificationType,
        network_and_address: NetworkAndAddress,
    ) -> NftCheckResult {
        match self.provider(network_and_address.blockchain_network, verification_type) {
            Ok(provider) => provider.get_valid_nfts(network_and_address).await,
            Err(err) => NftCheckResult::failed(network_and_address, err),
        }
    }

    /// Credential state of the connected wallet on every enabled network of its chain.
    ///
    /// Networks are checked concurrently. One failing network does not affect
    /// the others.
    pub async fn get_valid_nfts(
        &self,
        verification_type: VerificationType,
    ) -> Result<Vec<NftCheckResult>, Error> {
        let connected = match self.chain_and_address.as_ref() {
            Some(connected) => connected,
            None => return self.report("get_valid_nfts", Err(not_connected())),
        };

        let checks = self
            .config
            .enabled_networks_of(connected.blockchain)
            .into_iter()
            .map(|network| {
                self.check_nfts(
                    verification_type,
                    NetworkAndAddress::new(network, connected.address.clone()),
                )
            });
        Ok(join_all(checks).await)
    }

    /// Mint a credential for the connected wallet.
    ///
    /// The authorization memo is cleared when this returns, whatever the
    /// outcome. A redirecting wallet ends the call with
    /// [`MintOutcome::Redirect`] and the attempt is kept for
    /// [`KycNft::resume_minting`].
    pub async fn start_minting(&mut self, minting_data: MintingData) -> Result<MintOutcome, Error> {
        let result = self.mint(minting_data).await;
        self.minting_state = None;
        self.report("start_minting", result)
    }

    async fn mint(&mut self, minting_data: MintingData) -> Result<MintOutcome, Error> {
        let (wallet, connected) = match (self.wallet.as_ref(), self.chain_and_address.as_ref()) {
            (Some(wallet), Some(connected)) => (wallet, connected),
            _ => return Err(not_connected()),
        };
        let provider = self.provider(connected.blockchain_network, minting_data.verification_type)?;

        let ctx = MintContext {
            api: &self.api,
            provider: &provider,
            wallet,
            store: &*self.store,
            watch: self.config.watch_config(),
            callback_url: self.config.callback_url.as_ref(),
        };

        let authorized = MintingFlow::new(
            ctx,
            self.session.user.as_ref(),
            Some(connected),
            minting_data,
        )?
        .authorize(&mut self.minting_state)
        .await?;

        let outcome = complete(authorized).await;
        forget_on_failure(&*self.store, outcome)
    }

    /// Continue the persisted attempt after a redirecting wallet sent the
    /// user back to `return_url`.
    ///
    /// The wallet reports the signed transactions in the `transactionHashes`
    /// query parameter, or a failure in `errorCode` and `errorMessage`. An
    /// attempt that already knows its transaction resumes at confirmation.
    pub async fn resume_minting(&mut self, return_url: &Url) -> Result<MintResult, Error> {
        let result = self.resume(return_url).await;
        self.minting_state = None;
        self.report("resume_minting", result)
    }

    async fn resume(&mut self, return_url: &Url) -> Result<MintResult, Error> {
        let mut pending = self.store.load()?.ok_or_else(|| {
            Error::internal(ErrorCode::Internal, "There is no pending mint to resume")
        })?;

        let (wallet, connected) = match (self.wallet.as_ref(), self.chain_and_address.as_ref()) {
            (Some(wallet), Some(connected)) if connected.same_wallet(&pending.chain_and_address) => {
                (wallet, connected)
            }
            _ => {
                return Err(Error::status(
                    ErrorCode::WalletNotConnected,
                    format!(
                        "Connect {} on {} to resume minting",
                        pending.chain_and_address.address,
                        pending.chain_and_address.blockchain_network
                    ),
                ));
            }
        };

        let query: HashMap<String, String> = return_url.query_pairs().into_owned().collect();

        if let Some(code) = query.get("errorCode") {
            let message = query.get("errorMessage").unwrap_or(code);
            return forget_on_failure(&*self.store, Err(redirect_error(code, message)));
        }

        if let Some(hash) = query
            .get("transactionHashes")
            .and_then(|hashes| hashes.split(',').map(str::trim).filter(|h| !h.is_empty()).last())
        {
            pending.step = MintingStep::Confirming;
            pending.tx_hash = Some(hash.to_string());
            self.store.save(&pending)?;
        }

        if pending.tx_hash.is_none() {
            let err = Error::transaction(
                ErrorCode::TransactionNotFound,
                format!("Wallet returned without a transaction for mint {}", pending.attempt_id),
            );
            return forget_on_failure(&*self.store, Err(err));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Resuming mint {} of {} at {:?}",
            pending.attempt_id,
            connected.address,
            pending.step
        );

        let provider = self.provider(
            connected.blockchain_network,
            pending.minting_data.verification_type,
        )?;
        let ctx = MintContext {
            api: &self.api,
            provider: &provider,
            wallet,
            store: &*self.store,
            watch: self.config.watch_config(),
            callback_url: self.config.callback_url.as_ref(),
        };

        let result = async { Submitted::resume(ctx, pending)?.confirm().await?.reconcile().await }.await;
        forget_on_failure(&*self.store, result)
    }

    /// The attempt kept for [`KycNft::resume_minting`], if any.
    pub fn pending_mint(&self) -> Result<Option<PendingMint>, Error> {
        let result = self.store.load().map_err(Error::from);
        self.report("pending_mint", result)
    }

    /// Explorer link of a transaction.
    pub fn transaction_url(&self, network: BlockchainNetwork, tx_hash: &str) -> String {
        explorer::transaction_url(network, tx_hash)
    }
}

async fn complete<B, T, W>(authorized: Authorized<'_, B, T, W>) -> Result<MintOutcome, Error>
where
    B: BackendApi,
    T: HttpTransport,
    W: Wallet,
{
    match authorized.submit().await? {
        Submission::Submitted(submitted) => Ok(MintOutcome::Minted(
            submitted.confirm().await?.reconcile().await?,
        )),
        Submission::Redirected(redirected) => Ok(MintOutcome::Redirect {
            url: redirected.url,
        }),
    }
}

fn not_connected() -> Error {
    Error::status(ErrorCode::WalletNotConnected, "Wallet is not connected")
}

fn not_logged_in() -> Error {
    Error::status(ErrorCode::UserNotLoggedIn, "User is not logged in")
}

/// A failed attempt is not resumable.
fn forget_on_failure<V>(store: &dyn PendingMintStore, result: Result<V, Error>) -> Result<V, Error> {
    if result.is_err() {
        if let Err(_err) = store.clear() {
            #[cfg(feature = "tracing")]
            tracing::warn!("Failed to forget pending mint: {_err}");
        }
    }
    result
}

/// The failure a redirecting wallet reported on return.
fn redirect_error(code: &str, message: &str) -> Error {
    if code.to_lowercase().contains("reject") {
        Error::wallet(ErrorCode::UserRejectedRequest, None, message)
    } else {
        Error::wallet(
            ErrorCode::WalletInternal,
            None,
            format!("Wallet error {code}: {message}"),
        )
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use serde_json::json;

    use kyc_nft_core::types::{Blockchain, MintAuthResponse};
    use kyc_nft_kit::{
        api_client::{ApiError, ApiErrorBody, BackendNetwork},
        networks::ContractConfig,
    };

    use super::*;
    use crate::test_utils::{
        MockBackend, MockTransport, MockWallet, auth, session, user_with_account,
    };

    const ALICE: &str = "alice.testnet";

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, Option<ErrorCode>)>>);

    impl TelemetrySink for Recorder {
        fn report(&self, operation: &str, error: &Error) {
            self.0
                .lock()
                .unwrap()
                .push((operation.to_string(), error.code()));
        }
    }

    fn contract(network: BlockchainNetwork, address: &str) -> ContractConfig {
        ContractConfig::builder()
            .network(network)
            .verification_type(VerificationType::Kyc)
            .address(address)
            .build()
    }

    fn config() -> SdkConfig {
        SdkConfig::builder()
            .api_base_url(Url::parse("https://staging.kycnft.example/api/").unwrap())
            .enabled_networks(vec![
                BlockchainNetwork::NearTestnet,
                BlockchainNetwork::AptosTestnet,
                BlockchainNetwork::AptosMainnet,
            ])
            .contracts(vec![
                contract(BlockchainNetwork::NearTestnet, "kyc.testnet"),
                contract(BlockchainNetwork::AptosTestnet, "0xc0ffee"),
            ])
            .watch_interval_secs(1)
            .watch_max_retries(5)
            .build()
    }

    fn kyc() -> MintingData {
        MintingData::builder()
            .disclaimer_accepted(true)
            .verification_type(VerificationType::Kyc)
            .build()
    }

    fn near_user_session() -> Session {
        Session {
            user: Some(user_with_account(Blockchain::Near, ALICE)),
            ..session(None)
        }
    }

    type Sdk = KycNft<MockBackend, MockTransport, MockWallet>;

    async fn connected_sdk(
        api: MockBackend,
        transport: &MockTransport,
        wallet: MockWallet,
    ) -> Sdk {
        let mut sdk = KycNft::new(config(), api, transport.clone()).unwrap();
        sdk.connect_wallet(BlockchainNetwork::NearTestnet, ALICE, wallet)
            .await
            .unwrap();
        sdk
    }

    fn near_outcome(token_id: &str) -> serde_json::Value {
        let event = json!({
            "standard": "nep171",
            "version": "1.0.0",
            "event": "nft_mint",
            "data": [{ "owner_id": ALICE, "token_ids": [token_id] }]
        });
        json!({
            "status": { "SuccessValue": "" },
            "receipts_outcome": [{ "outcome": { "logs": [format!("EVENT_JSON:{event}")] } }]
        })
    }

    #[tokio::test]
    async fn test_initialize_requires_backend_support() {
        let api = MockBackend {
            networks: vec![BackendNetwork {
                id: BlockchainNetwork::NearTestnet,
                blockchain: Blockchain::Near,
                native_coin_symbol: Some("NEAR".into()),
            }],
            ..Default::default()
        };
        let recorder = Arc::new(Recorder::default());
        let mut sdk: Sdk = KycNft::new(config(), api, MockTransport::default())
            .unwrap()
            .with_telemetry(recorder.clone());

        let err = sdk.initialize().await.unwrap_err();
        assert!(err.is(ErrorCode::NetworkNotSupported));
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![(
                "initialize".to_string(),
                Some(ErrorCode::NetworkNotSupported)
            )]
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_disabled_network() {
        let mut sdk: Sdk =
            KycNft::new(config(), MockBackend::default(), MockTransport::default()).unwrap();

        let err = sdk
            .connect_wallet(BlockchainNetwork::SolanaDevnet, "9WzD", MockWallet::default())
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::NetworkNotEnabled));
        assert!(sdk.connected_wallet().is_none());
    }

    #[tokio::test]
    async fn test_connect_drops_user_of_another_wallet() {
        let api = MockBackend::default()
            .with_session(Ok(Some(near_user_session())))
            .with_created_session(session(Some(ChainAndAddress::new(
                BlockchainNetwork::NearTestnet,
                "bob.testnet",
            ))));
        let mut sdk: Sdk = KycNft::new(config(), api, MockTransport::default()).unwrap();

        sdk.connect_wallet(BlockchainNetwork::NearTestnet, "bob.testnet", MockWallet::default())
            .await
            .unwrap();

        assert!(sdk.user().is_none());
        assert!(!sdk.is_logged_in());
        assert_eq!(sdk.api().calls(), vec!["get_session", "create_session"]);
    }

    #[tokio::test]
    async fn test_update_email() {
        let transport = MockTransport::default();
        let mut updated = user_with_account(Blockchain::Near, ALICE);
        updated.email = Some("alice@example.com".into());
        let api = MockBackend::default()
            .with_session(Ok(Some(near_user_session())))
            .with_updated_user(updated.clone());
        let mut sdk = connected_sdk(api, &transport, MockWallet::default()).await;

        let err = sdk.update_email("not-an-email").await.unwrap_err();
        assert!(err.is(ErrorCode::EmailInvalid));

        let user = sdk.update_email(" alice@example.com ").await.unwrap();
        assert_eq!(user, updated);
        assert_eq!(sdk.user(), Some(&updated));
        assert_eq!(
            sdk.session().and_then(|s| s.user.as_ref()),
            Some(&updated)
        );
    }

    #[tokio::test]
    async fn test_get_valid_nfts_contains_failures() {
        let transport = MockTransport::default();
        transport.push(Ok(json!([false])));
        let api = MockBackend::default().with_created_session(session(Some(
            ChainAndAddress::new(BlockchainNetwork::AptosTestnet, "0x5e1f"),
        )));
        let mut sdk: Sdk = KycNft::new(config(), api, transport.clone()).unwrap();
        sdk.connect_wallet(BlockchainNetwork::AptosTestnet, "0x5e1f", MockWallet::default())
            .await
            .unwrap();

        let results = sdk.get_valid_nfts(VerificationType::Kyc).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].network_and_address,
            NetworkAndAddress::new(BlockchainNetwork::AptosTestnet, "0x5e1f")
        );
        assert_eq!(results[0].has_valid_nft, Some(false));
        assert!(results[0].error.is_none());
        assert_eq!(
            results[1].network_and_address.blockchain_network,
            BlockchainNetwork::AptosMainnet
        );
        assert!(results[1].error.as_deref().unwrap().contains("contract"));
    }

    #[tokio::test]
    async fn test_minting_requires_a_wallet() {
        let mut sdk: Sdk =
            KycNft::new(config(), MockBackend::default(), MockTransport::default()).unwrap();
        let err = sdk.start_minting(kyc()).await.unwrap_err();
        assert!(err.is(ErrorCode::WalletNotConnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_redirect_then_resume() {
        let transport = MockTransport::default();
        let api = MockBackend::default()
            .with_session(Ok(Some(near_user_session())))
            .with_authorization(Ok(auth("1001")));
        let wallet = MockWallet::with(vec![Ok(json!({
            "redirectUrl": "https://testnet.mynearwallet.com/sign?transactions=abc"
        }))]);
        let mut sdk = connected_sdk(api, &transport, wallet).await;

        let outcome = sdk.start_minting(kyc()).await.unwrap();
        assert_eq!(
            outcome,
            MintOutcome::Redirect {
                url: "https://testnet.mynearwallet.com/sign?transactions=abc".into()
            }
        );
        assert!(sdk.minting_state().is_none());
        let pending = sdk.pending_mint().unwrap().unwrap();
        assert_eq!(pending.step, MintingStep::SubmissionPending);

        transport.push_rpc(near_outcome("42"));
        let return_url =
            Url::parse("https://dapp.example/mint?transactionHashes=5a1f%2C9Qa1").unwrap();
        let result = sdk.resume_minting(&return_url).await.unwrap();

        assert_eq!(result.token_id, "42");
        assert_eq!(result.tx_hash, "9Qa1");
        assert_eq!(
            result.transaction_url,
            "https://testnet.nearblocks.io/txns/9Qa1"
        );
        assert_eq!(transport.bodies()[0]["params"], json!(["9Qa1", ALICE]));
        assert_eq!(sdk.api().finalized.borrow()[0].token_id, "42");
        assert!(sdk.pending_mint().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resume_after_wallet_rejection() {
        let transport = MockTransport::default();
        let api = MockBackend::default()
            .with_session(Ok(Some(near_user_session())))
            .with_authorization(Ok(auth("1001")));
        let wallet = MockWallet::with(vec![Ok(json!({ "redirectUrl": "https://wallet" }))]);
        let mut sdk = connected_sdk(api, &transport, wallet).await;
        sdk.start_minting(kyc()).await.unwrap();

        let return_url = Url::parse(
            "https://dapp.example/mint?errorCode=userRejected&errorMessage=User%20rejected%20transaction",
        )
        .unwrap();
        let err = sdk.resume_minting(&return_url).await.unwrap_err();

        assert!(err.is_rejected_by_user());
        assert_eq!(err.message(), "User rejected transaction");
        assert!(sdk.pending_mint().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resume_requires_the_same_wallet() {
        let transport = MockTransport::default();
        let api = MockBackend::default()
            .with_session(Ok(Some(near_user_session())))
            .with_authorization(Ok(auth("1001")));
        let wallet = MockWallet::with(vec![Ok(json!({ "redirectUrl": "https://wallet" }))]);
        let mut sdk = connected_sdk(api, &transport, wallet).await;
        sdk.start_minting(kyc()).await.unwrap();
        sdk.disconnect_wallet();

        let return_url = Url::parse("https://dapp.example/mint?transactionHashes=9Qa1").unwrap();
        let err = sdk.resume_minting(&return_url).await.unwrap_err();

        assert!(err.is(ErrorCode::WalletNotConnected));
        assert!(sdk.pending_mint().unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_attempt_reuses_authorization() {
        let not_yet = json!({
            "code": -32000,
            "message": "Server error",
            "data": "Transaction 7Fe2 doesn't exist",
            "cause": { "name": "UNKNOWN_TRANSACTION" }
        });
        let transport = MockTransport::default();
        transport
            .push_rpc_error(not_yet.clone())
            .push_rpc_error(not_yet);
        let api = MockBackend::default()
            .with_session(Ok(Some(near_user_session())))
            .with_authorization(Ok(MintAuthResponse {
                authorization_tx_id: Some("7Fe2".into()),
                ..auth("1001")
            }));
        let wallet = MockWallet::with(vec![Ok(json!({ "redirectUrl": "https://wallet" }))]);
        let mut sdk = connected_sdk(api, &transport, wallet).await;

        let interrupted =
            tokio::time::timeout(Duration::from_millis(1500), sdk.start_minting(kyc())).await;
        assert!(interrupted.is_err());
        assert!(sdk.minting_state().unwrap().matches(
            &ChainAndAddress::new(BlockchainNetwork::NearTestnet, ALICE),
            &kyc()
        ));

        transport.push_rpc(json!({ "status": { "SuccessValue": "" } }));
        let outcome = sdk.start_minting(kyc()).await.unwrap();

        assert!(matches!(outcome, MintOutcome::Redirect { .. }));
        let authorizations = sdk
            .api()
            .calls()
            .into_iter()
            .filter(|call| *call == "authorize_minting")
            .count();
        assert_eq!(authorizations, 1);
        assert!(sdk.minting_state().is_none());
    }

    #[tokio::test]
    async fn test_price_rejection_surfaces_as_status() {
        let transport = MockTransport::default();
        let api = MockBackend::default()
            .with_session(Ok(Some(near_user_session())))
            .with_authorization(Err(ApiError::new(
                409,
                ApiErrorBody::Simple {
                    code: "PriceTooHigh".into(),
                    description: "Price too high".into(),
                },
            )));
        let mut sdk = connected_sdk(api, &transport, MockWallet::default()).await;

        let err = sdk.start_minting(kyc()).await.unwrap_err();
        assert!(err.is(ErrorCode::NetworkPriceTooHigh));
        assert!(sdk.pending_mint().unwrap().is_none());
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+c@mail.example.org"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("alice@@example.com"));
        assert!(!is_valid_email("ali ce@example.com"));
        assert!(!is_valid_email("alice@example..com"));
    }
}
