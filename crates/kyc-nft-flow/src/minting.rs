//! The minting state machine.
//!
//! Each step consumes the previous state and yields the next one:
//! [`MintingFlow::authorize`] → [`Authorized::submit`] → [`Submitted::confirm`]
//! → [`Confirmed::reconcile`]. A wallet that signs through a redirect ends the
//! flow early with [`Submission::Redirected`]; the persisted attempt is picked
//! up again with [`Submitted::resume`].

use url::Url;

use kyc_nft_core::{
    Error, ErrorCode,
    classifier::error_chain,
    types::{
        AnyJson, BlockchainNetwork, BoxError, ChainAndAddress, MintAuthResponse, MintingData,
        MintingState, MintingStep, PendingMint, UserDetails,
    },
    watcher::{WatchConfig, wait_for_transaction},
};
use kyc_nft_kit::{
    api_client::{ApiError, ApiErrorBody, AuthorizeMintingRequest, BackendApi, FinalizeTokenRequest},
    concepts::{MintRequest, Minter, SubmitOutcome, Wallet},
    errors::classify,
    explorer::transaction_url,
    networks::ChainProvider,
    rpc::HttpTransport,
};

use crate::storage::{PendingMintStore, new_attempt_id};

/// Collaborators shared by every step of one attempt.
pub struct MintContext<'a, B, T, W> {
    pub api: &'a B,
    pub provider: &'a ChainProvider<T>,
    pub wallet: &'a W,
    pub store: &'a dyn PendingMintStore,
    pub watch: WatchConfig,
    /// Where a redirecting wallet sends the user back to.
    pub callback_url: Option<&'a Url>,
}

impl<B, T, W> Clone for MintContext<'_, B, T, W> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B, T, W> Copy for MintContext<'_, B, T, W> {}

/// An attempt that passed its entry checks and is not authorized yet.
pub struct MintingFlow<'a, B, T, W> {
    pub ctx: MintContext<'a, B, T, W>,
    pub chain_and_address: ChainAndAddress,
    pub minting_data: MintingData,
    account_id: u64,
    accept_disclaimer: bool,
    /// An authorization of the account that is on chain but not minted yet.
    outstanding: Option<MintAuthResponse>,
}

/// Authorization obtained, nothing submitted yet.
pub struct Authorized<'a, B, T, W> {
    pub ctx: MintContext<'a, B, T, W>,
    pub chain_and_address: ChainAndAddress,
    pub minting_data: MintingData,
    pub auth: MintAuthResponse,
}

/// What [`Authorized::submit`] led to.
pub enum Submission<'a, B, T, W> {
    Submitted(Submitted<'a, B, T, W>),
    /// The wallet takes over. The attempt is persisted at `SubmissionPending`.
    Redirected(Redirected),
}

/// The user has to follow `url` to sign the mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirected {
    pub url: String,
    pub pending: PendingMint,
}

/// The mint transaction is broadcast and awaits confirmation.
pub struct Submitted<'a, B, T, W> {
    pub ctx: MintContext<'a, B, T, W>,
    pub pending: PendingMint,
    pub tx_hash: String,
}

/// The mint transaction succeeded on chain.
pub struct Confirmed<'a, B, T, W> {
    pub ctx: MintContext<'a, B, T, W>,
    pub pending: PendingMint,
    pub tx_hash: String,
    /// Chain-native receipt or outcome of the mint transaction.
    pub receipt: AnyJson,
}

/// A minted and finalized credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintResult {
    pub network: BlockchainNetwork,
    pub token_id: String,
    pub tx_hash: String,
    pub transaction_url: String,
}

impl<'a, B, T, W> MintingFlow<'a, B, T, W>
where
    B: BackendApi,
    T: HttpTransport,
    W: Wallet,
{
    /// Check everything an attempt needs before any state changes.
    pub fn new(
        ctx: MintContext<'a, B, T, W>,
        user: Option<&UserDetails>,
        chain_and_address: Option<&ChainAndAddress>,
        minting_data: MintingData,
    ) -> Result<Self, Error> {
        let chain_and_address = chain_and_address.ok_or_else(|| {
            Error::status(ErrorCode::WalletNotConnected, "Wallet is not connected")
        })?;
        let user = user.ok_or_else(|| {
            Error::status(ErrorCode::UserNotLoggedIn, "User is not logged in")
        })?;
        let account = user.account_for(chain_and_address).ok_or_else(|| {
            Error::status(
                ErrorCode::UserNotLoggedIn,
                format!(
                    "User is not logged in with {}",
                    chain_and_address.address
                ),
            )
        })?;

        if ctx.provider.network() != chain_and_address.blockchain_network {
            return Err(Error::status(
                ErrorCode::NetworkNotSupported,
                format!(
                    "Cannot mint on {} with a provider for {}",
                    chain_and_address.blockchain_network,
                    ctx.provider.network()
                ),
            ));
        }

        if !user.has_accepted_disclaimer() && !minting_data.disclaimer_accepted {
            return Err(Error::status(
                ErrorCode::TermsNotAccepted,
                "The disclaimer has to be accepted before minting",
            ));
        }

        if !user.is_verified_for(minting_data.verification_type) {
            return Err(Error::status(
                ErrorCode::UserNotVerified,
                format!(
                    "User is not verified for {:?}",
                    minting_data.verification_type
                ),
            ));
        }

        let outstanding = account
            .tokens
            .iter()
            .find(|token| {
                token.is_reusable_authorization()
                    && token.network == Some(chain_and_address.blockchain_network)
            })
            .map(|token| MintAuthResponse {
                authorization_code: token.authorization_code.clone(),
                authorization_tx_id: token.authorization_tx_id.clone(),
                mint_transaction: None,
                price: None,
            });

        Ok(MintingFlow {
            ctx,
            chain_and_address: chain_and_address.clone(),
            account_id: account.id,
            accept_disclaimer: !user.has_accepted_disclaimer(),
            outstanding,
            minting_data,
        })
    }

    pub fn step(&self) -> MintingStep {
        MintingStep::NotAuthorized
    }

    /// Obtain an authorization, reusing `memo` when it was made for the same inputs.
    ///
    /// Otherwise an unminted authorization the account already holds on this
    /// network is redeemed before the backend is asked for a new one.
    /// A fresh authorization is written to `memo` as soon as the backend grants
    /// it. If the backend staged the authorization on chain, its transaction
    /// is awaited before the attempt counts as authorized.
    pub async fn authorize(
        self,
        memo: &mut Option<MintingState>,
    ) -> Result<Authorized<'a, B, T, W>, Error> {
        let reusable = memo
            .as_ref()
            .filter(|state| state.matches(&self.chain_and_address, &self.minting_data))
            .map(|state| state.mint_auth_response.clone());

        let auth = match reusable {
            Some(auth) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "Reusing authorization {} for {}",
                    auth.authorization_code,
                    self.chain_and_address.address
                );

                auth
            }
            None => {
                *memo = None;

                if self.accept_disclaimer {
                    self.ctx.api.accept_disclaimer().await.map_err(classify)?;
                }

                let auth = match self.outstanding.clone() {
                    Some(auth) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            "Redeeming outstanding authorization {}",
                            auth.authorization_code
                        );

                        auth
                    }
                    None => self
                        .ctx
                        .api
                        .authorize_minting(&AuthorizeMintingRequest {
                            blockchain_account_id: self.account_id,
                            network: self.chain_and_address.blockchain_network,
                            verification_type: self.minting_data.verification_type,
                            selected_image_id: self.minting_data.image_id.clone(),
                            subscription_duration: self.minting_data.subscription_years,
                        })
                        .await
                        .map_err(authorization_error)?,
                };

                *memo = Some(MintingState {
                    chain_and_address: self.chain_and_address.clone(),
                    minting_data: self.minting_data.clone(),
                    mint_auth_response: auth.clone(),
                });
                auth
            }
        };

        if let Some(tx_id) = &auth.authorization_tx_id {
            #[cfg(feature = "tracing")]
            tracing::debug!("Waiting for authorization transaction {tx_id}");

            let contract = self.ctx.provider.contract();
            wait_for_transaction(
                &self.ctx.provider.transactions_of(&contract),
                tx_id,
                &self.ctx.watch,
            )
            .await?;
        }

        Ok(Authorized {
            ctx: self.ctx,
            chain_and_address: self.chain_and_address,
            minting_data: self.minting_data,
            auth,
        })
    }
}

impl<'a, B, T, W> Authorized<'a, B, T, W>
where
    B: BackendApi,
    T: HttpTransport,
    W: Wallet,
{
    pub fn step(&self) -> MintingStep {
        MintingStep::Authorized
    }

    /// Hand the mint to the wallet.
    ///
    /// The attempt is persisted before the wallet is asked, and again with
    /// the transaction hash once the wallet returns one.
    pub async fn submit(self) -> Result<Submission<'a, B, T, W>, Error> {
        let mut pending = PendingMint {
            attempt_id: new_attempt_id(),
            chain_and_address: self.chain_and_address,
            minting_data: self.minting_data,
            mint_auth_response: self.auth,
            step: MintingStep::SubmissionPending,
            tx_hash: None,
        };
        self.ctx.store.save(&pending)?;

        let outcome = self
            .ctx
            .provider
            .submit_mint(
                self.ctx.wallet,
                MintRequest {
                    chain_and_address: &pending.chain_and_address,
                    auth: &pending.mint_auth_response,
                    callback_url: self.ctx.callback_url,
                },
            )
            .await
            .map_err(classify)?;

        match outcome {
            SubmitOutcome::Submitted { tx_hash } => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "Mint {} submitted as {tx_hash}",
                    pending.attempt_id
                );

                pending.step = MintingStep::Confirming;
                pending.tx_hash = Some(tx_hash.clone());
                self.ctx.store.save(&pending)?;

                Ok(Submission::Submitted(Submitted {
                    ctx: self.ctx,
                    pending,
                    tx_hash,
                }))
            }
            SubmitOutcome::Redirect { url } => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Mint {} continues at {url}", pending.attempt_id);

                Ok(Submission::Redirected(Redirected { url, pending }))
            }
        }
    }
}

impl<'a, B, T, W> Submitted<'a, B, T, W>
where
    B: BackendApi,
    T: HttpTransport,
    W: Wallet,
{
    /// Continue a persisted attempt whose transaction hash is known.
    pub fn resume(ctx: MintContext<'a, B, T, W>, pending: PendingMint) -> Result<Self, Error> {
        let tx_hash = match (&pending.step, &pending.tx_hash) {
            (MintingStep::Confirming, Some(hash)) => hash.clone(),
            (step, _) => {
                return Err(Error::internal(
                    ErrorCode::Internal,
                    format!(
                        "Mint {} cannot be confirmed from step {step:?}",
                        pending.attempt_id
                    ),
                ));
            }
        };

        if ctx.provider.network() != pending.chain_and_address.blockchain_network {
            return Err(Error::status(
                ErrorCode::NetworkNotSupported,
                format!(
                    "Mint {} was submitted on {}",
                    pending.attempt_id, pending.chain_and_address.blockchain_network
                ),
            ));
        }

        Ok(Submitted {
            ctx,
            pending,
            tx_hash,
        })
    }

    pub fn step(&self) -> MintingStep {
        MintingStep::Confirming
    }

    /// Wait until the mint transaction succeeds. A failed transaction is final.
    pub async fn confirm(self) -> Result<Confirmed<'a, B, T, W>, Error> {
        let sender = &self.pending.chain_and_address.address;
        let transaction = wait_for_transaction(
            &self.ctx.provider.transactions_of(sender),
            &self.tx_hash,
            &self.ctx.watch,
        )
        .await?;

        let receipt = transaction.data.ok_or_else(|| {
            Error::internal(
                ErrorCode::UnexpectedResponse,
                format!("Transaction {} succeeded without a receipt", self.tx_hash),
            )
        })?;

        Ok(Confirmed {
            ctx: self.ctx,
            pending: self.pending,
            tx_hash: self.tx_hash,
            receipt,
        })
    }
}

impl<B, T, W> Confirmed<'_, B, T, W>
where
    B: BackendApi,
    T: HttpTransport,
    W: Wallet,
{
    /// Report the minted token to the backend and forget the attempt.
    pub async fn reconcile(self) -> Result<MintResult, Error> {
        let token_id = self.ctx.provider.token_id(&self.receipt)?;

        self.ctx
            .api
            .finalize_token(&FinalizeTokenRequest {
                authorization_code: self.pending.mint_auth_response.authorization_code.clone(),
                minting_tx_id: self.tx_hash.clone(),
                token_id: token_id.clone(),
            })
            .await
            .map_err(classify)?;

        self.ctx.store.clear()?;

        let network = self.pending.chain_and_address.blockchain_network;

        #[cfg(feature = "tracing")]
        tracing::info!("Minted token {token_id} on {network}");

        Ok(MintResult {
            network,
            transaction_url: transaction_url(network, &self.tx_hash),
            token_id,
            tx_hash: self.tx_hash,
        })
    }
}

/// Backend codes rejecting an authorization because minting is too expensive.
const PRICE_ERROR_CODES: [&str; 2] = ["GasPriceTooHigh", "PriceTooHigh"];

fn is_price_rejection(body: &ApiErrorBody) -> bool {
    body.error_code()
        .is_some_and(|code| PRICE_ERROR_CODES.contains(&code))
        || body.message().to_lowercase().contains("price too high")
}

/// Classify an authorization failure, singling out price rejections.
fn authorization_error(err: impl Into<BoxError>) -> Error {
    let err = err.into();
    let price_too_high = error_chain(&*err)
        .filter_map(|cause| cause.downcast_ref::<ApiError>())
        .any(|api| is_price_rejection(&api.body));

    if price_too_high {
        Error::status(
            ErrorCode::NetworkPriceTooHigh,
            "Minting is too expensive on this network right now",
        )
        .with_source(err)
    } else {
        classify(err)
    }
}
