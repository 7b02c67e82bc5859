//! Sign-in, registration and user administration.

use std::sync::Arc;

use reqwest::Method;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use hivegate_auth::{Role, SessionStore, User, decode_unverified};
use hivegate_core::UserId;

use crate::error::GatewayError;
use crate::http::Auth;
use crate::records::{AllowedRegion, UserAccount};
use crate::resource::{ResourceClient, to_body};

#[derive(Serialize)]
struct LoginRequest<'a> {
    email_or_username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: String,
}

/// New account request. The server always creates workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub username: String,
}

impl RegisterInput {
    fn validate(&self) -> Result<(), GatewayError> {
        if self.username.trim().is_empty() {
            return Err(GatewayError::Validation("username is required".to_string()));
        }
        if self.password.is_empty() {
            return Err(GatewayError::Validation("password is required".to_string()));
        }
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
            _ => Err(GatewayError::Validation(format!(
                "'{email}' is not an email address"
            ))),
        }
    }
}

/// Public authentication endpoints.
#[derive(Clone)]
pub struct AuthClient {
    client: ResourceClient,
}

impl AuthClient {
    pub fn new(client: ResourceClient) -> Self {
        Self { client }
    }

    /// Exchange credentials for a token and sign `store` in.
    ///
    /// The profile is read with the freshly issued token. Accounts that may
    /// not read user records (workers) get a profile built from the token
    /// claims instead.
    pub async fn login(
        &self,
        store: &SessionStore,
        identifier: &str,
        password: &str,
    ) -> Result<User, GatewayError> {
        let body = to_body(&LoginRequest {
            email_or_username: identifier.trim(),
            password,
        })?;
        let LoginResponse { token } = self
            .client
            .send(Method::POST, "/auth/login", Some(&body), Auth::Anonymous)
            .await?;

        let claims = decode_unverified(&token)
            .map_err(|e| GatewayError::Transport(format!("login returned an unusable token: {e}")))?;

        let path = format!("/api/user/{}", claims.user_id);
        let profile = self
            .client
            .send::<Option<UserAccount>>(Method::GET, &path, None, Auth::Token(&token))
            .await;

        let user = match profile {
            Ok(Some(mut account)) => {
                account.user_id.get_or_insert(claims.user_id);
                User::try_from(account)?
            }
            Ok(None) => profile_from_claims(claims.user_id, claims.role, identifier),
            Err(GatewayError::RequestFailed { status: 403, .. }) => {
                tracing::debug!(user_id = %claims.user_id, "profile read refused; using token claims");
                profile_from_claims(claims.user_id, claims.role, identifier)
            }
            Err(err) => return Err(err),
        };

        store.login(user.clone(), token)?;
        Ok(user)
    }

    /// Create a worker account. Returns the server's confirmation message.
    pub async fn register(&self, input: &RegisterInput) -> Result<String, GatewayError> {
        input.validate()?;

        let body = to_body(input)?;
        let response: Option<MessageResponse> = self
            .client
            .send(Method::POST, "/auth/register", Some(&body), Auth::Anonymous)
            .await?;

        tracing::info!(username = %input.username, "account registered");
        Ok(response.map(|r| r.message).unwrap_or_default())
    }
}

fn profile_from_claims(id: UserId, role: Role, identifier: &str) -> User {
    let identifier = identifier.trim();
    let (username, email) = match identifier.split_once('@') {
        Some((local, _)) => (local.to_string(), identifier.to_string()),
        None => (identifier.to_string(), String::new()),
    };
    User {
        id,
        full_name: username.clone(),
        username,
        role,
        email,
    }
}

#[derive(Serialize)]
struct RoleChange {
    user_id: UserId,
    role: Role,
}

/// Administrative user operations.
#[derive(Clone)]
pub struct UserAdmin {
    client: ResourceClient,
    session: Arc<SessionStore>,
}

impl UserAdmin {
    pub fn new(client: ResourceClient, session: Arc<SessionStore>) -> Self {
        Self { client, session }
    }

    /// Change a user's role. When the target is the signed-in user the
    /// cached profile follows.
    pub async fn change_role(&self, user_id: UserId, role: Role) -> Result<(), GatewayError> {
        let body = to_body(&RoleChange { user_id, role })?;
        self.client
            .send::<IgnoredAny>(Method::PUT, "/api/user/role", Some(&body), Auth::Session)
            .await?;
        tracing::info!(user_id = %user_id, role = %role, "role changed");

        if let Some(mut me) = self.session.current().user().cloned() {
            if me.id == user_id {
                me.role = role;
                self.session.refresh_user(me)?;
            }
        }
        Ok(())
    }

    pub async fn allowed_regions(&self, user_id: UserId) -> Result<Vec<AllowedRegion>, GatewayError> {
        self.client
            .list_related("user", user_id, "allowed-regions")
            .await
    }
}
