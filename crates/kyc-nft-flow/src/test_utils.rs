use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use serde_json::json;
use url::Url;

use kyc_nft_core::types::{
    AnyJson, Blockchain, BlockchainAccount, ChainAndAddress, MintAuthResponse, Session,
    UserDetails, VerificationRequest, VerificationStatus, VerificationType,
};
use kyc_nft_kit::{
    api_client::{
        ApiError, ApiErrorBody, ApiStatus, AuthorizeMintingRequest, BackendApi, BackendNetwork,
        CreateSessionRequest, CreateUserRequest, FinalizeTokenRequest, UpdateUserRequest,
    },
    concepts::Wallet,
    rpc::{HttpTransport, JsonRpcError, TransportError},
};

pub fn session(chain_and_address: Option<ChainAndAddress>) -> Session {
    Session {
        id: "s1".into(),
        expires: None,
        nonce: "n0nce".into(),
        chain_and_address,
        user: None,
    }
}

/// A verified user who accepted the disclaimer and owns one wallet.
pub fn user_with_account(blockchain: Blockchain, address: &str) -> UserDetails {
    UserDetails {
        id: 7,
        email: None,
        email_confirmed: None,
        disclaimer_accepted: Some("2024-01-01T00:00:00Z".into()),
        blockchain_accounts: vec![BlockchainAccount {
            id: 11,
            blockchain,
            address: address.to_string(),
            tokens: vec![],
        }],
        verification_requests: vec![VerificationRequest {
            verification_type: VerificationType::Kyc,
            status: VerificationStatus::Verified,
        }],
    }
}

pub fn auth(code: &str) -> MintAuthResponse {
    MintAuthResponse {
        authorization_code: code.to_string(),
        authorization_tx_id: None,
        mint_transaction: None,
        price: None,
    }
}

fn missing(what: &str) -> ApiError {
    ApiError::new(500, ApiErrorBody::Text(format!("no {what} scripted")))
}

/// A backend answering from a script and recording what it was asked.
#[derive(Debug, Default)]
pub struct MockBackend {
    pub sessions: RefCell<VecDeque<Result<Option<Session>, ApiError>>>,
    pub created_session: RefCell<Option<Session>>,
    pub created_user: RefCell<Option<UserDetails>>,
    pub updated_user: RefCell<Option<UserDetails>>,
    pub authorizations: RefCell<VecDeque<Result<MintAuthResponse, ApiError>>>,
    pub created_users: RefCell<Vec<CreateUserRequest>>,
    pub updates: RefCell<Vec<UpdateUserRequest>>,
    pub authorize_requests: RefCell<Vec<AuthorizeMintingRequest>>,
    pub finalized: RefCell<Vec<FinalizeTokenRequest>>,
    pub networks: Vec<BackendNetwork>,
    pub(crate) log: RefCell<Vec<&'static str>>,
}

impl MockBackend {
    pub fn with_session(self, answer: Result<Option<Session>, ApiError>) -> Self {
        self.sessions.borrow_mut().push_back(answer);
        self
    }

    pub fn with_created_session(self, session: Session) -> Self {
        *self.created_session.borrow_mut() = Some(session);
        self
    }

    pub fn with_created_user(self, user: UserDetails) -> Self {
        *self.created_user.borrow_mut() = Some(user);
        self
    }

    pub fn with_updated_user(self, user: UserDetails) -> Self {
        *self.updated_user.borrow_mut() = Some(user);
        self
    }

    pub fn with_authorization(self, answer: Result<MintAuthResponse, ApiError>) -> Self {
        self.authorizations.borrow_mut().push_back(answer);
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.log.borrow().clone()
    }

    fn record(&self, call: &'static str) {
        self.log.borrow_mut().push(call);
    }
}

impl BackendApi for MockBackend {
    type Error = ApiError;

    async fn get_status(&self) -> Result<ApiStatus, Self::Error> {
        self.record("get_status");
        Ok(ApiStatus::default())
    }

    async fn get_networks(&self) -> Result<Vec<BackendNetwork>, Self::Error> {
        self.record("get_networks");
        Ok(self.networks.clone())
    }

    async fn get_session(&self) -> Result<Option<Session>, Self::Error> {
        self.record("get_session");
        self.sessions.borrow_mut().pop_front().unwrap_or(Ok(None))
    }

    async fn create_session(&self, _request: &CreateSessionRequest) -> Result<Session, Self::Error> {
        self.record("create_session");
        self.created_session
            .borrow()
            .clone()
            .ok_or_else(|| missing("session"))
    }

    async fn create_user(&self, request: &CreateUserRequest) -> Result<UserDetails, Self::Error> {
        self.record("create_user");
        self.created_users.borrow_mut().push(request.clone());
        self.created_user.borrow().clone().ok_or_else(|| missing("user"))
    }

    async fn update_user(&self, request: &UpdateUserRequest) -> Result<UserDetails, Self::Error> {
        self.record("update_user");
        self.updates.borrow_mut().push(request.clone());
        self.updated_user.borrow().clone().ok_or_else(|| missing("user"))
    }

    async fn accept_disclaimer(&self) -> Result<(), Self::Error> {
        self.record("accept_disclaimer");
        Ok(())
    }

    async fn authorize_minting(
        &self,
        request: &AuthorizeMintingRequest,
    ) -> Result<MintAuthResponse, Self::Error> {
        self.record("authorize_minting");
        self.authorize_requests.borrow_mut().push(request.clone());
        self.authorizations
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(missing("authorization")))
    }

    async fn finalize_token(&self, request: &FinalizeTokenRequest) -> Result<(), Self::Error> {
        self.record("finalize_token");
        self.finalized.borrow_mut().push(request.clone());
        Ok(())
    }
}

/// A wallet answering from a script.
#[derive(Debug, Default)]
pub struct MockWallet {
    pub answers: RefCell<VecDeque<Result<AnyJson, JsonRpcError>>>,
    pub requests: RefCell<Vec<(String, AnyJson)>>,
}

impl MockWallet {
    pub fn with(answers: Vec<Result<AnyJson, JsonRpcError>>) -> Self {
        MockWallet {
            answers: RefCell::new(answers.into()),
            requests: RefCell::default(),
        }
    }

    pub fn methods(&self) -> Vec<String> {
        self.requests.borrow().iter().map(|(m, _)| m.clone()).collect()
    }
}

impl Wallet for MockWallet {
    type Error = JsonRpcError;

    async fn request(&self, method: &str, params: AnyJson) -> Result<AnyJson, Self::Error> {
        self.requests.borrow_mut().push((method.to_string(), params));
        self.answers
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(JsonRpcError::new(-32603, "no more answers")))
    }
}

/// Node responses shared by every provider built from a clone.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    answers: Rc<RefCell<VecDeque<Result<AnyJson, TransportError>>>>,
    requests: Rc<RefCell<Vec<(String, Option<AnyJson>)>>>,
}

impl MockTransport {
    pub fn push(&self, answer: Result<AnyJson, TransportError>) -> &Self {
        self.answers.borrow_mut().push_back(answer);
        self
    }

    /// Queue a successful JSON-RPC result.
    pub fn push_rpc(&self, result: AnyJson) -> &Self {
        self.push(Ok(json!({ "jsonrpc": "2.0", "id": 1, "result": result })))
    }

    /// Queue a JSON-RPC error.
    pub fn push_rpc_error(&self, error: AnyJson) -> &Self {
        self.push(Ok(json!({ "jsonrpc": "2.0", "id": 1, "error": error })))
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests.borrow().iter().map(|(u, _)| u.clone()).collect()
    }

    pub fn bodies(&self) -> Vec<AnyJson> {
        self.requests
            .borrow()
            .iter()
            .filter_map(|(_, body)| body.clone())
            .collect()
    }

    fn next(&self) -> Result<AnyJson, TransportError> {
        self.answers
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(TransportError::Request("no more answers".into())))
    }
}

impl HttpTransport for MockTransport {
    async fn get_json(&self, url: &Url) -> Result<AnyJson, TransportError> {
        self.requests.borrow_mut().push((url.to_string(), None));
        self.next()
    }

    async fn post_json(&self, url: &Url, body: &AnyJson) -> Result<AnyJson, TransportError> {
        self.requests
            .borrow_mut()
            .push((url.to_string(), Some(body.clone())));
        self.next()
    }
}
