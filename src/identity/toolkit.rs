//! REST identity provider speaking the identity-toolkit account API
//! (`accounts:signInWithPassword`, `accounts:signUp`, `accounts:delete`, `accounts:sendOobCode`)
//! and the secure-token refresh endpoint.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::principal::Principal;
use super::provider::{AuthChannel, AuthStream, IdentityProvider, ProvisioningSession};
use crate::error::{AppError, AppResult};

const DELETE_ACCOUNT_KIND: &str = "identitytoolkit#DeleteAccountResponse";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: String,
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    #[serde(default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Map the provider's upper-case error tags to operator-readable text.
fn describe(tag: &str) -> &'static str {
    match tag.split(':').next().unwrap_or("").trim() {
        "EMAIL_EXISTS" => "The email address is already in use by another account.",
        "EMAIL_NOT_FOUND" => "There is no account for this email.",
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => "Invalid credentials",
        "USER_DISABLED" => "The account has been disabled.",
        "WEAK_PASSWORD" => "Password should be at least 6 characters.",
        "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "USER_NOT_FOUND" => "The credential token is invalid or expired.",
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "Too many attempts. Try again later.",
        _ => "The identity provider rejected the request.",
    }
}

#[derive(Debug, Clone)]
struct Endpoint {
    client: Client,
    identity_url: String,
    token_url: String,
    api_key: String,
}

impl Endpoint {
    fn account_url(&self, action: &str) -> String {
        format!("{}/accounts:{}", self.identity_url.trim_end_matches('/'), action)
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> AppResult<T> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }
        let tag = resp
            .json::<ErrorEnvelope>()
            .await
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("HTTP_{}", status.as_u16()));
        debug!(target: "ispdesk::identity", "toolkit error status={} tag={}", status, tag);
        let code = tag.split(':').next().unwrap_or("").trim().to_lowercase();
        Err(AppError::auth(code, describe(&tag)))
    }

    async fn account_call<B: Serialize + ?Sized, T: DeserializeOwned>(&self, action: &str, body: &B) -> AppResult<T> {
        let resp = self
            .client
            .post(self.account_url(action))
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn password_call(&self, action: &str, email: &str, password: &str) -> AppResult<AccountResponse> {
        self.account_call(action, &PasswordRequest { email, password, return_secure_token: true }).await
    }
}

/// Identity provider backed by the identity-toolkit REST API.
pub struct IdentityToolkit {
    endpoint: Endpoint,
    auth: AuthChannel,
    refresh_token: Mutex<Option<String>>,
}

impl IdentityToolkit {
    pub fn new(identity_url: &str, token_url: &str, api_key: &str) -> AppResult<Self> {
        let client = Client::builder().build()?;
        Ok(Self::with_client(client, identity_url, token_url, api_key))
    }

    pub fn with_client(client: Client, identity_url: &str, token_url: &str, api_key: &str) -> Self {
        Self {
            endpoint: Endpoint {
                client,
                identity_url: identity_url.to_string(),
                token_url: token_url.to_string(),
                api_key: api_key.to_string(),
            },
            auth: AuthChannel::default(),
            refresh_token: Mutex::new(None),
        }
    }
}

#[async_trait]
impl IdentityProvider for IdentityToolkit {
    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Principal> {
        let acct = self.endpoint.password_call("signInWithPassword", email, password).await?;
        *self.refresh_token.lock() = acct.refresh_token;
        let principal = Principal { uid: acct.local_id, email: acct.email, id_token: acct.id_token };
        info!(target: "ispdesk::identity", "signed in uid={}", principal.uid);
        self.auth.publish(Some(principal.clone()));
        Ok(principal)
    }

    async fn sign_out(&self) -> AppResult<()> {
        *self.refresh_token.lock() = None;
        self.auth.publish(None);
        Ok(())
    }

    async fn refresh(&self) -> AppResult<Principal> {
        let Some(current) = self.auth.current() else {
            return Err(AppError::auth("not_signed_in", "No signed-in session to refresh"));
        };
        let Some(token) = self.refresh_token.lock().clone() else {
            return Err(AppError::auth("no_refresh_token", "The session has no refresh credential"));
        };
        let url = format!("{}/token", self.endpoint.token_url.trim_end_matches('/'));
        let resp = self
            .endpoint
            .client
            .post(url)
            .query(&[("key", self.endpoint.api_key.as_str())])
            .form(&[("grant_type", "refresh_token"), ("refresh_token", token.as_str())])
            .send()
            .await?;
        let refreshed: RefreshResponse = Endpoint::decode(resp).await?;
        *self.refresh_token.lock() = Some(refreshed.refresh_token);
        let principal = Principal { uid: refreshed.user_id, email: current.email, id_token: refreshed.id_token };
        debug!(target: "ispdesk::identity", "token refreshed uid={}", principal.uid);
        self.auth.publish(Some(principal.clone()));
        Ok(principal)
    }

    fn current(&self) -> Option<Principal> { self.auth.current() }

    fn subscribe(&self) -> AuthStream { self.auth.subscribe() }

    async fn provision(&self, email: &str, password: &str) -> AppResult<Box<dyn ProvisioningSession>> {
        let acct = self.endpoint.password_call("signUp", email, password).await?;
        info!(target: "ispdesk::identity", "provisioned account uid={}", acct.local_id);
        Ok(Box::new(ToolkitProvisioning { uid: acct.local_id, id_token: Some(acct.id_token) }))
    }

    async fn delete_account(&self, id_token: &str) -> AppResult<()> {
        let resp: DeleteResponse = self
            .endpoint
            .account_call("delete", &serde_json::json!({ "idToken": id_token }))
            .await?;
        if resp.kind.as_deref() == Some(DELETE_ACCOUNT_KIND) {
            debug!(target: "ispdesk::identity", "account deleted");
        }
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> AppResult<()> {
        let _: serde_json::Value = self
            .endpoint
            .account_call("sendOobCode", &serde_json::json!({ "requestType": "PASSWORD_RESET", "email": email }))
            .await?;
        Ok(())
    }
}

/// Isolated session for a signed-up account. Signing out discards its token locally; the
/// account itself stays.
struct ToolkitProvisioning {
    uid: String,
    id_token: Option<String>,
}

#[async_trait]
impl ProvisioningSession for ToolkitProvisioning {
    fn uid(&self) -> &str { &self.uid }

    fn is_active(&self) -> bool { self.id_token.is_some() }

    async fn id_token(&mut self) -> AppResult<String> {
        self.id_token
            .clone()
            .ok_or_else(|| AppError::auth("session_closed", "Provisioning session already signed out"))
    }

    async fn sign_out(&mut self) -> AppResult<()> {
        self.id_token = None;
        Ok(())
    }
}
