// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider client.
//!
//! Handles:
//! - Email/password sign-in and registration
//! - Federated sign-in (Google, GitHub, Microsoft) from a credential the
//!   browser obtained in the provider popup
//! - Mapping provider failures onto `AuthError`

use crate::error::{AppError, AuthError, Result};
use crate::models::{AuthProvider, Identity};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// OAuth credential returned by a provider popup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthCredential {
    pub id_token: Option<String>,
    pub access_token: Option<String>,
}

impl OAuthCredential {
    fn is_empty(&self) -> bool {
        self.id_token.as_deref().is_none_or(str::is_empty)
            && self.access_token.as_deref().is_none_or(str::is_empty)
    }
}

/// Supported ways to sign in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInMethod {
    Google(OAuthCredential),
    GitHub(OAuthCredential),
    Microsoft(OAuthCredential),
    Email { email: String, password: String },
    SignUp { email: String, password: String },
}

impl SignInMethod {
    /// Build a method from its wire name (`google`, `github`, `microsoft`,
    /// `email`, `signup-email`) and the accompanying inputs.
    pub fn parse(
        method: &str,
        email: Option<&str>,
        password: Option<&str>,
        credential: OAuthCredential,
    ) -> Result<Self> {
        let federated = |wrap: fn(OAuthCredential) -> SignInMethod| {
            if credential.is_empty() {
                return Err(AppError::Validation(
                    "Provider credential required".to_string(),
                ));
            }
            Ok(wrap(credential.clone()))
        };

        let email_and_password = || {
            let email = email.map(str::trim).unwrap_or_default();
            let password = password.map(str::trim).unwrap_or_default();
            if email.is_empty() || password.is_empty() {
                return Err(AppError::Validation(
                    "Email and password required".to_string(),
                ));
            }
            Ok((email.to_string(), password.to_string()))
        };

        match method {
            "google" => federated(SignInMethod::Google),
            "github" => federated(SignInMethod::GitHub),
            "microsoft" => federated(SignInMethod::Microsoft),
            "email" => {
                let (email, password) = email_and_password()?;
                Ok(SignInMethod::Email { email, password })
            }
            "signup-email" => {
                let (email, password) = email_and_password()?;
                Ok(SignInMethod::SignUp { email, password })
            }
            other => Err(AuthError::UnknownMethod(other.to_string()).into()),
        }
    }

    /// Wire name, for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            SignInMethod::Google(_) => "google",
            SignInMethod::GitHub(_) => "github",
            SignInMethod::Microsoft(_) => "microsoft",
            SignInMethod::Email { .. } => "email",
            SignInMethod::SignUp { .. } => "signup-email",
        }
    }

    fn federated(&self) -> Option<(AuthProvider, &OAuthCredential)> {
        match self {
            SignInMethod::Google(c) => Some((AuthProvider::Google, c)),
            SignInMethod::GitHub(c) => Some((AuthProvider::GitHub, c)),
            SignInMethod::Microsoft(c) => Some((AuthProvider::Microsoft, c)),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Firebase Identity Toolkit REST client
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest {
    post_body: String,
    request_uri: String,
    return_secure_token: bool,
    return_idp_credential: bool,
}

/// Successful sign-in response (fields we use).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    provider_id: Option<String>,
}

impl AuthResponse {
    fn into_identity(self, fallback: AuthProvider) -> Identity {
        let provider = self
            .provider_id
            .as_deref()
            .map(AuthProvider::from_provider_id)
            .filter(|p| *p != AuthProvider::Unknown)
            .unwrap_or(fallback);

        Identity {
            uid: self.local_id,
            display_name: self.display_name.filter(|n| !n.is_empty()),
            email: self.email.filter(|e| !e.is_empty()),
            photo_url: self.photo_url.filter(|p| !p.is_empty()),
            provider,
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Map an Identity Toolkit error code onto the error taxonomy.
///
/// Codes may carry a suffix (`TOO_MANY_ATTEMPTS_TRY_LATER : ...`).
fn map_provider_error(message: &str) -> AppError {
    let code = message.split_whitespace().next().unwrap_or(message);
    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL" => {
            AuthError::InvalidCredentials.into()
        }
        "EMAIL_EXISTS" => AuthError::EmailExists.into(),
        "USER_DISABLED" => AuthError::Disabled.into(),
        "USER_CANCELLED" => AuthError::Cancelled.into(),
        "WEAK_PASSWORD" | "MISSING_PASSWORD" | "MISSING_EMAIL" => {
            AppError::Validation(message.to_string())
        }
        _ => AuthError::Provider(message.to_string()).into(),
    }
}

/// Firebase Identity Toolkit client.
#[derive(Clone)]
pub struct FirebaseAuthClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    /// Request URI reported for federated sign-ins (the frontend origin)
    request_uri: String,
}

impl FirebaseAuthClient {
    pub fn new(api_key: String, request_uri: String) -> anyhow::Result<Self> {
        Self::with_base_url(api_key, request_uri, IDENTITY_TOOLKIT_URL.to_string())
    }

    /// Client against a non-default endpoint (Auth emulator).
    pub fn with_base_url(
        api_key: String,
        request_uri: String,
        base_url: String,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
            request_uri,
        })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Identity> {
        let body = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response: AuthResponse = self.post("accounts:signInWithPassword", &body).await?;
        Ok(response.into_identity(AuthProvider::Password))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity> {
        let body = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response: AuthResponse = self.post("accounts:signUp", &body).await?;
        Ok(response.into_identity(AuthProvider::Password))
    }

    async fn sign_in_with_idp(
        &self,
        provider: AuthProvider,
        credential: &OAuthCredential,
    ) -> Result<Identity> {
        let body = IdpRequest {
            post_body: idp_post_body(provider, credential),
            request_uri: self.request_uri.clone(),
            return_secure_token: true,
            return_idp_credential: true,
        };
        let response: AuthResponse = self.post("accounts:signInWithIdp", &body).await?;
        Ok(response.into_identity(provider))
    }

    /// POST to an Identity Toolkit endpoint and parse the JSON response.
    async fn post<B: Serialize, R: DeserializeOwned>(&self, endpoint: &str, body: &B) -> Result<R> {
        let url = format!(
            "{}/{}?key={}",
            self.base_url,
            endpoint,
            urlencoding::encode(&self.api_key)
        );

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Backend(format!("Identity request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| AppError::Backend(format!("Identity JSON parse error: {}", e)));
        }

        let text = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&text) {
                return Err(map_provider_error(&envelope.error.message));
            }
        }

        Err(AppError::Backend(format!("Identity HTTP {}: {}", status, text)))
    }
}

/// Form-encoded `postBody` for `accounts:signInWithIdp`.
fn idp_post_body(provider: AuthProvider, credential: &OAuthCredential) -> String {
    let mut parts = Vec::new();
    if let Some(token) = credential.id_token.as_deref().filter(|t| !t.is_empty()) {
        parts.push(format!("id_token={}", urlencoding::encode(token)));
    }
    if let Some(token) = credential.access_token.as_deref().filter(|t| !t.is_empty()) {
        parts.push(format!("access_token={}", urlencoding::encode(token)));
    }
    parts.push(format!("providerId={}", provider.provider_id()));
    parts.join("&")
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory directory (local development and tests)
// ─────────────────────────────────────────────────────────────────────────────

struct Account {
    password: String,
    identity: Identity,
}

/// Process-local account directory.
#[derive(Default)]
pub struct MemoryDirectory {
    accounts: Mutex<HashMap<String, Account>>,
    federated: Mutex<HashMap<String, Identity>>,
    next_uid: AtomicU64,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as a provider credential for `identity`.
    pub fn register_federated(&self, token: &str, identity: Identity) {
        self.federated
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(token.to_string(), identity);
    }

    fn sign_up(&self, email: &str, password: &str) -> Result<Identity> {
        let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        let key = email.to_ascii_lowercase();
        if accounts.contains_key(&key) {
            return Err(AuthError::EmailExists.into());
        }

        let n = self.next_uid.fetch_add(1, Ordering::SeqCst) + 1;
        let identity = Identity {
            uid: format!("local-{}", n),
            display_name: None,
            email: Some(email.to_string()),
            photo_url: None,
            provider: AuthProvider::Password,
        };
        accounts.insert(
            key,
            Account {
                password: password.to_string(),
                identity: identity.clone(),
            },
        );
        Ok(identity)
    }

    fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        match accounts.get(&email.to_ascii_lowercase()) {
            Some(account) if account.password == password => Ok(account.identity.clone()),
            _ => Err(AuthError::InvalidCredentials.into()),
        }
    }

    fn sign_in_federated(
        &self,
        provider: AuthProvider,
        credential: &OAuthCredential,
    ) -> Result<Identity> {
        let federated = self.federated.lock().unwrap_or_else(|e| e.into_inner());
        [&credential.id_token, &credential.access_token]
            .into_iter()
            .flatten()
            .find_map(|token| federated.get(token))
            .filter(|identity| identity.provider == provider)
            .cloned()
            .ok_or_else(|| AuthError::Provider("INVALID_IDP_RESPONSE".to_string()).into())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IdentityService
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
enum IdentityBackend {
    Firebase(FirebaseAuthClient),
    Memory(Arc<MemoryDirectory>),
}

/// Signs users in against the configured identity provider.
#[derive(Clone)]
pub struct IdentityService {
    backend: IdentityBackend,
}

impl IdentityService {
    pub fn firebase(client: FirebaseAuthClient) -> Self {
        Self {
            backend: IdentityBackend::Firebase(client),
        }
    }

    pub fn memory(directory: Arc<MemoryDirectory>) -> Self {
        Self {
            backend: IdentityBackend::Memory(directory),
        }
    }

    /// Sign in (or register) and return the authenticated identity.
    pub async fn sign_in(&self, method: &SignInMethod) -> Result<Identity> {
        let result = match (&self.backend, method) {
            (IdentityBackend::Firebase(client), SignInMethod::Email { email, password }) => {
                client.sign_in_with_password(email, password).await
            }
            (IdentityBackend::Firebase(client), SignInMethod::SignUp { email, password }) => {
                client.sign_up(email, password).await
            }
            (IdentityBackend::Firebase(client), federated) => match federated.federated() {
                Some((provider, credential)) => client.sign_in_with_idp(provider, credential).await,
                None => Err(AuthError::UnknownMethod(method.name().to_string()).into()),
            },
            (IdentityBackend::Memory(dir), SignInMethod::Email { email, password }) => {
                dir.sign_in(email, password)
            }
            (IdentityBackend::Memory(dir), SignInMethod::SignUp { email, password }) => {
                dir.sign_up(email, password)
            }
            (IdentityBackend::Memory(dir), federated) => match federated.federated() {
                Some((provider, credential)) => dir.sign_in_federated(provider, credential),
                None => Err(AuthError::UnknownMethod(method.name().to_string()).into()),
            },
        };

        match &result {
            Ok(identity) => tracing::info!(
                uid = %identity.uid,
                method = method.name(),
                provider = identity.provider.label(),
                "Sign-in succeeded"
            ),
            Err(e) => tracing::warn!(method = method.name(), error = %e, "Sign-in failed"),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred(id_token: &str) -> OAuthCredential {
        OAuthCredential {
            id_token: Some(id_token.to_string()),
            access_token: None,
        }
    }

    #[test]
    fn test_parse_methods() {
        assert!(matches!(
            SignInMethod::parse("google", None, None, cred("tok")).unwrap(),
            SignInMethod::Google(_)
        ));
        assert!(matches!(
            SignInMethod::parse("github", None, None, cred("tok")).unwrap(),
            SignInMethod::GitHub(_)
        ));
        assert_eq!(
            SignInMethod::parse("email", Some(" a@b.c "), Some("pw"), OAuthCredential::default())
                .unwrap(),
            SignInMethod::Email {
                email: "a@b.c".to_string(),
                password: "pw".to_string()
            }
        );
        assert!(matches!(
            SignInMethod::parse("signup-email", Some("a@b.c"), Some("pw"), OAuthCredential::default())
                .unwrap(),
            SignInMethod::SignUp { .. }
        ));
    }

    #[test]
    fn test_parse_rejects_missing_inputs_and_unknown_methods() {
        let err = SignInMethod::parse("email", Some("a@b.c"), Some("  "), OAuthCredential::default())
            .unwrap_err();
        assert!(err.is_validation());

        let err = SignInMethod::parse("microsoft", None, None, OAuthCredential::default()).unwrap_err();
        assert!(err.is_validation());

        let err = SignInMethod::parse("myspace", None, None, OAuthCredential::default()).unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::UnknownMethod(ref m)) if m == "myspace"));
    }

    #[test]
    fn test_map_provider_error() {
        assert!(matches!(
            map_provider_error("INVALID_LOGIN_CREDENTIALS"),
            AppError::Auth(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            map_provider_error("EMAIL_EXISTS"),
            AppError::Auth(AuthError::EmailExists)
        ));
        assert!(matches!(
            map_provider_error("WEAK_PASSWORD : Password should be at least 6 characters"),
            AppError::Validation(_)
        ));
        assert!(matches!(
            map_provider_error("TOO_MANY_ATTEMPTS_TRY_LATER : slow down"),
            AppError::Auth(AuthError::Provider(_))
        ));
    }

    #[test]
    fn test_idp_post_body_encodes_tokens() {
        let credential = OAuthCredential {
            id_token: Some("a.b=c".to_string()),
            access_token: Some("x y".to_string()),
        };
        assert_eq!(
            idp_post_body(AuthProvider::Google, &credential),
            "id_token=a.b%3Dc&access_token=x%20y&providerId=google.com"
        );
    }

    #[test]
    fn test_auth_response_provider_fallback() {
        let response: AuthResponse = serde_json::from_value(serde_json::json!({
            "localId": "uid-1",
            "email": "a@b.c",
            "displayName": "",
            "providerId": "github.com"
        }))
        .unwrap();
        let identity = response.into_identity(AuthProvider::Password);
        assert_eq!(identity.uid, "uid-1");
        assert_eq!(identity.provider, AuthProvider::GitHub);
        assert!(identity.display_name.is_none());
    }

    #[tokio::test]
    async fn test_memory_sign_up_then_sign_in() {
        let service = IdentityService::memory(Arc::new(MemoryDirectory::new()));
        let signup = SignInMethod::SignUp {
            email: "ada@example.com".to_string(),
            password: "secret".to_string(),
        };

        let created = service.sign_in(&signup).await.unwrap();
        assert_eq!(created.provider, AuthProvider::Password);

        let err = service.sign_in(&signup).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::EmailExists)));

        let signed_in = service
            .sign_in(&SignInMethod::Email {
                email: "ADA@example.com".to_string(),
                password: "secret".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(signed_in.uid, created.uid);

        let err = service
            .sign_in(&SignInMethod::Email {
                email: "ada@example.com".to_string(),
                password: "wrong".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_memory_federated_sign_in() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.register_federated(
            "google-token",
            Identity {
                uid: "g-1".to_string(),
                display_name: Some("Grace Hopper".to_string()),
                email: None,
                photo_url: None,
                provider: AuthProvider::Google,
            },
        );
        let service = IdentityService::memory(directory);

        let identity = service
            .sign_in(&SignInMethod::Google(cred("google-token")))
            .await
            .unwrap();
        assert_eq!(identity.uid, "g-1");

        // Token issued for a different provider is rejected
        assert!(service
            .sign_in(&SignInMethod::GitHub(cred("google-token")))
            .await
            .is_err());
    }
}
