//! Keeps the cached session and user congruent with the connected wallet.

use serde_json::json;

use kyc_nft_core::{
    Error, ErrorCode,
    types::{AnyJson, Blockchain, ChainAndAddress, Session, UserDetails},
};
use kyc_nft_kit::{
    api_client::{BackendApi, CreateSessionRequest, CreateUserRequest},
    concepts::Wallet,
    errors::classify,
};

/// Prefix of the message a wallet signs to log in.
pub const LOGIN_MESSAGE_PREFIX: &str = "kycDAO-login-";

/// Client-side copy of the backend session.
///
/// Always replaced as a whole, never patched field by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub session: Option<Session>,
    pub user: Option<UserDetails>,
}

impl SessionState {
    pub fn from_session(session: Session) -> Self {
        SessionState {
            user: session.user.clone(),
            session: Some(session),
        }
    }

    /// Drop whatever no longer belongs to `connected`.
    ///
    /// A user is kept only if one of its accounts is the connected wallet; a
    /// stale user takes its session with it. A session without a user is kept
    /// only if it was opened for the connected wallet.
    pub fn reconciled(self, connected: Option<&ChainAndAddress>) -> Self {
        match (&self.user, &self.session) {
            (Some(user), _) => {
                if connected.is_some_and(|wallet| user.owns_wallet(wallet)) {
                    self
                } else {
                    SessionState::default()
                }
            }
            (None, Some(session)) => {
                if connected.is_some_and(|wallet| session.belongs_to(wallet)) {
                    self
                } else {
                    SessionState::default()
                }
            }
            (None, None) => self,
        }
    }

    /// The user, if logged in with the connected wallet.
    pub fn user_for(&self, connected: &ChainAndAddress) -> Option<&UserDetails> {
        self.user.as_ref().filter(|user| user.owns_wallet(connected))
    }

    /// Re-read the backend session and enforce wallet consistency.
    ///
    /// A session that does not survive the check, or a missing one, is
    /// replaced by a fresh session for the connected wallet. Without a wallet
    /// the cache is cleared. Other backend failures propagate.
    pub async fn refresh<B: BackendApi>(
        &mut self,
        api: &B,
        connected: Option<&ChainAndAddress>,
    ) -> Result<(), Error> {
        let fetched = match api.get_session().await {
            Ok(session) => session,
            Err(err) => {
                let err = classify(err);
                if !err.is(ErrorCode::UserNotLoggedIn) {
                    return Err(err);
                }
                None
            }
        };

        let refreshed = match fetched {
            Some(session) => SessionState::from_session(session).reconciled(connected),
            None => SessionState::default(),
        };

        *self = match (refreshed.session.is_some(), connected) {
            (false, Some(wallet)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "No session for {} on {}, creating one",
                    wallet.address,
                    wallet.blockchain_network
                );

                create_session(api, wallet).await?
            }
            _ => refreshed,
        };

        Ok(())
    }

    /// Log in with the connected wallet, creating the user if needed.
    ///
    /// The wallet signs the session nonce. The backend registers the wallet
    /// on first login.
    pub async fn login<B: BackendApi, W: Wallet>(
        &mut self,
        api: &B,
        wallet: &W,
        connected: &ChainAndAddress,
    ) -> Result<UserDetails, Error> {
        if let Some(user) = self.user_for(connected) {
            return Ok(user.clone());
        }

        if !self
            .session
            .as_ref()
            .is_some_and(|session| session.belongs_to(connected))
        {
            self.refresh(api, Some(connected)).await?;
        }
        if let Some(user) = self.user_for(connected) {
            return Ok(user.clone());
        }

        let session = self.session.clone().ok_or_else(|| {
            Error::internal(ErrorCode::Internal, "No session to log in with")
        })?;

        let request = sign_login(wallet, connected, &session.nonce).await?;
        let user = api.create_user(&request).await.map_err(classify)?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Logged in as user {}", user.id);

        *self = SessionState {
            session: Some(Session {
                user: Some(user.clone()),
                ..session
            }),
            user: Some(user.clone()),
        };

        Ok(user)
    }

    /// Replace the cached user, keeping the session in step with it.
    pub fn set_user(&mut self, user: UserDetails) {
        let session = self.session.clone().map(|session| Session {
            user: Some(user.clone()),
            ..session
        });
        *self = SessionState {
            session,
            user: Some(user),
        };
    }

    pub fn clear(&mut self) {
        *self = SessionState::default();
    }
}

async fn create_session<B: BackendApi>(
    api: &B,
    wallet: &ChainAndAddress,
) -> Result<SessionState, Error> {
    let session = api
        .create_session(&CreateSessionRequest {
            blockchain: wallet.blockchain,
            address: wallet.address.clone(),
        })
        .await
        .map_err(classify)?;
    Ok(SessionState::from_session(session))
}

/// Have the wallet sign the login message for `nonce`.
async fn sign_login<W: Wallet>(
    wallet: &W,
    connected: &ChainAndAddress,
    nonce: &str,
) -> Result<CreateUserRequest, Error> {
    let message = format!("{LOGIN_MESSAGE_PREFIX}{nonce}");

    let signed = match connected.blockchain {
        Blockchain::Ethereum => {
            let data = format!("0x{}", hex::encode(message.as_bytes()));
            wallet
                .request("personal_sign", json!([data, connected.address]))
                .await
        }
        Blockchain::Near | Blockchain::Solana | Blockchain::Aptos => {
            wallet
                .request("signMessage", json!({ "message": message }))
                .await
        }
    }
    .map_err(classify)?;

    let (signature, public_key) = match &signed {
        AnyJson::String(signature) => (Some(signature.clone()), None),
        AnyJson::Object(fields) => (
            fields
                .get("signature")
                .and_then(AnyJson::as_str)
                .map(str::to_string),
            fields
                .get("publicKey")
                .and_then(AnyJson::as_str)
                .map(str::to_string),
        ),
        _ => (None, None),
    };

    let signature = signature.ok_or_else(|| {
        Error::internal(
            ErrorCode::UnexpectedResponse,
            format!("Wallet returned no signature: {signed}"),
        )
    })?;

    Ok(CreateUserRequest {
        signature,
        public_key,
    })
}
