//! Authentication service layer
//!
//! Registration, login, token refresh and logout. Tokens are verified on
//! every use; the session store decides whether a verified token is still live.

use super::jwt::{IssuedToken, TokenKind, TokenService};
use super::password::{hash_password, verify_password, DUMMY_PASSWORD_HASH};
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use inkwell_core::{CredentialStore, InkwellError, NewUser, Role, SessionStore, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

/// Message for every credential failure
const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password must not be empty"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LogoutRequest {
    /// Refresh token to revoke along with the current access token
    pub refresh_token: Option<String>,
}

/// Token response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub access_token: String,
    /// Present on login only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub id: u64,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// Request origin, for the audit trail
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientContext {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    tokens: Arc<TokenService>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            users,
            sessions,
            tokens,
        }
    }

    /// Create a `USER` account
    pub async fn register(
        &self,
        request: RegisterRequest,
        client: &ClientContext,
    ) -> Result<UserInfo, AppError> {
        let request = RegisterRequest {
            email: request.email.trim().to_string(),
            password: request.password,
        };

        if let Err(e) = request.validate() {
            audit_log(&AuditEvent::RegistrationFailure {
                email: request.email.clone(),
                reason: e.to_string(),
                ip_address: client.ip_address.clone(),
            });
            return Err(AppError::BadRequest(validation_message(&e)));
        }
        if request.password.trim().is_empty() {
            return Err(AppError::BadRequest("Password must not be empty".to_string()));
        }

        let password = request.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let user = match self
            .users
            .create_user(NewUser {
                email: request.email.clone(),
                password_hash,
            })
            .await
        {
            Ok(user) => user,
            Err(InkwellError::Conflict(_)) => {
                audit_log(&AuditEvent::RegistrationFailure {
                    email: request.email,
                    reason: "email already registered".to_string(),
                    ip_address: client.ip_address.clone(),
                });
                return Err(AppError::Conflict("Email already registered".to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        audit_log(&AuditEvent::RegistrationSuccess {
            user_id: user.id,
            email: user.email.clone(),
            ip_address: client.ip_address.clone(),
        });

        Ok(user.into())
    }

    /// Check credentials, then issue an access/refresh pair with a session
    /// for each. Unknown email and wrong password return the same error.
    pub async fn login(
        &self,
        request: LoginRequest,
        client: &ClientContext,
    ) -> Result<AuthResponse, AppError> {
        let email = request.email.trim();
        if email.is_empty() || request.password.is_empty() {
            return Err(AppError::BadRequest(
                "Email and password are required".to_string(),
            ));
        }

        let fail = |reason: &str| {
            audit_log(&AuditEvent::LoginFailure {
                email: email.to_string(),
                reason: reason.to_string(),
                ip_address: client.ip_address.clone(),
                user_agent: client.user_agent.clone(),
            });
            AppError::Unauthorized(INVALID_CREDENTIALS.to_string())
        };

        let Some(user) = self.users.find_by_email(email).await? else {
            // Unknown emails cost one Argon2 run, same as a wrong password.
            let password = request.password;
            let _ = tokio::task::spawn_blocking(move || {
                verify_password(&password, DUMMY_PASSWORD_HASH)
            })
            .await;
            return Err(fail("unknown email"));
        };

        let password = request.password.clone();
        let hash = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("password verification task failed: {e}")))?
            .map_err(|e| AppError::Internal(format!("stored hash for user {}: {e}", user.id)))?;
        if !matches {
            return Err(fail("wrong password"));
        }

        let access = self.issue(user.id, user.role, TokenKind::Access)?;
        let refresh = self.issue(user.id, user.role, TokenKind::Refresh)?;

        // No token is handed out without its session.
        self.record_session(&access).await?;
        if let Err(e) = self.record_session(&refresh).await {
            if let Err(cleanup) = self.sessions.delete(&access.token).await {
                tracing::warn!(
                    error = %cleanup,
                    subject_id = user.id,
                    "Failed to drop access session after refresh session write failed"
                );
            }
            return Err(e);
        }

        audit_log(&AuditEvent::LoginSuccess {
            user_id: user.id,
            email: user.email,
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        });

        Ok(AuthResponse {
            expires_in: access.ttl().as_secs(),
            access_token: access.token,
            refresh_token: Some(refresh.token),
            token_type: "Bearer".to_string(),
        })
    }

    /// Mint a new access token carrying the user's current role.
    ///
    /// This is how a promoted user obtains an `AUTHOR` token.
    pub async fn refresh(
        &self,
        request: RefreshRequest,
        client: &ClientContext,
    ) -> Result<AuthResponse, AppError> {
        let unauthorized = || AppError::Unauthorized("Invalid or expired token".to_string());

        let claims = self
            .tokens
            .verify_kind(&request.refresh_token, TokenKind::Refresh)
            .map_err(|_| unauthorized())?;
        let subject_id = claims.subject_id().map_err(|_| unauthorized())?;

        match self.sessions.get(&request.refresh_token).await? {
            Some(owner) if owner == subject_id => {}
            _ => return Err(unauthorized()),
        }

        let user = self
            .users
            .find_by_id(subject_id)
            .await?
            .ok_or_else(unauthorized)?;

        let access = self.issue(user.id, user.role, TokenKind::Access)?;
        self.record_session(&access).await?;

        audit_log(&AuditEvent::TokenRefresh {
            user_id: user.id,
            role: user.role,
            ip_address: client.ip_address.clone(),
        });

        Ok(AuthResponse {
            expires_in: access.ttl().as_secs(),
            access_token: access.token,
            refresh_token: None,
            token_type: "Bearer".to_string(),
        })
    }

    /// Revoke the current access token and, if given, a refresh token owned
    /// by the same user
    pub async fn logout(
        &self,
        subject_id: u64,
        access_token: &str,
        request: LogoutRequest,
        client: &ClientContext,
    ) -> Result<(), AppError> {
        self.sessions.delete(access_token).await?;
        let mut revoked = 1;

        if let Some(refresh_token) = request.refresh_token.as_deref() {
            let owned = self
                .tokens
                .verify_kind(refresh_token, TokenKind::Refresh)
                .ok()
                .and_then(|claims| claims.subject_id().ok())
                == Some(subject_id);

            if owned {
                self.sessions.delete(refresh_token).await?;
                revoked += 1;
            } else {
                tracing::debug!(subject_id, "Ignoring refresh token not owned by caller");
            }
        }

        audit_log(&AuditEvent::Logout {
            user_id: subject_id,
            sessions_revoked: revoked,
            ip_address: client.ip_address.clone(),
        });

        Ok(())
    }

    pub async fn get_user(&self, subject_id: u64) -> Result<UserInfo, AppError> {
        self.users
            .find_by_id(subject_id)
            .await?
            .map(UserInfo::from)
            .ok_or_else(|| AppError::NotFound("User".to_string()))
    }

    fn issue(&self, subject_id: u64, role: Role, kind: TokenKind) -> Result<IssuedToken, AppError> {
        self.tokens
            .issue(subject_id, role, kind)
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    async fn record_session(&self, issued: &IssuedToken) -> Result<(), AppError> {
        let subject_id = issued
            .claims
            .subject_id()
            .map_err(|e| AppError::Internal(e.to_string()))?;
        self.sessions
            .put(&issued.token, subject_id, issued.ttl())
            .await?;
        Ok(())
    }
}

fn validation_message(errors: &validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .next()
        .unwrap_or_else(|| "Invalid input".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use inkwell_core::{MemorySessionStore, MemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    /// Session store that refuses every write after the first `allowed`
    struct FailingWrites {
        inner: MemorySessionStore,
        allowed: usize,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl SessionStore for FailingWrites {
        async fn put(&self, token: &str, subject_id: u64, ttl: Duration) -> inkwell_core::Result<()> {
            if self.writes.fetch_add(1, Ordering::SeqCst) >= self.allowed {
                return Err(InkwellError::Unavailable("session store".to_string()));
            }
            self.inner.put(token, subject_id, ttl).await
        }

        async fn get(&self, token: &str) -> inkwell_core::Result<Option<u64>> {
            self.inner.get(token).await
        }

        async fn delete(&self, token: &str) -> inkwell_core::Result<()> {
            self.inner.delete(token).await
        }

        async fn ping(&self) -> inkwell_core::Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        service: AuthService,
        users: Arc<MemoryStore>,
        sessions: Arc<MemorySessionStore>,
        tokens: Arc<TokenService>,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(MemoryStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let tokens = Arc::new(TokenService::new(
            "test-secret",
            "inkwell",
            Duration::from_secs(900),
            Duration::from_secs(86_400),
        ));
        Fixture {
            service: AuthService::new(users.clone(), sessions.clone(), tokens.clone()),
            users,
            sessions,
            tokens,
        }
    }

    fn register_request(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_assigns_user_role() {
        let f = fixture();
        let user = f
            .service
            .register(register_request(" a@b.com ", "secret1"), &ClientContext::default())
            .await
            .unwrap();

        assert_eq!(user.email, "a@b.com");
        assert_eq!(user.role, Role::User);

        let stored = f.users.find_by_email("a@b.com").await.unwrap().unwrap();
        assert!(stored.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let f = fixture();
        let ctx = ClientContext::default();

        for (email, password) in [("", "secret1"), ("not-an-email", "secret1"), ("a@b.com", ""), ("a@b.com", "   ")] {
            let result = f.service.register(register_request(email, password), &ctx).await;
            assert!(
                matches!(result, Err(AppError::BadRequest(_))),
                "accepted {email:?}/{password:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_register_duplicate_conflicts() {
        let f = fixture();
        let ctx = ClientContext::default();
        f.service
            .register(register_request("a@b.com", "secret1"), &ctx)
            .await
            .unwrap();

        let result = f
            .service
            .register(register_request("a@b.com", "other"), &ctx)
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_login_unknown_user_creates_no_session() {
        let f = fixture();
        let result = f
            .service
            .login(login_request("a@b.com", "secret1"), &ClientContext::default())
            .await;

        match result {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, INVALID_CREDENTIALS),
            other => panic!("expected Unauthorized, got {other:?}"),
        }
        assert!(f.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_login_wrong_password_same_message() {
        let f = fixture();
        let ctx = ClientContext::default();
        f.service
            .register(register_request("a@b.com", "secret1"), &ctx)
            .await
            .unwrap();

        match f.service.login(login_request("a@b.com", "nope"), &ctx).await {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, INVALID_CREDENTIALS),
            other => panic!("expected Unauthorized, got {other:?}"),
        }
        assert!(f.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_login_unknown_email_still_pays_for_hashing() {
        let f = fixture();
        let ctx = ClientContext::default();
        f.service
            .register(register_request("a@b.com", "secret1"), &ctx)
            .await
            .unwrap();

        let started = Instant::now();
        let wrong = f.service.login(login_request("a@b.com", "nope"), &ctx).await;
        let wrong_password = started.elapsed();

        let started = Instant::now();
        let unknown = f.service.login(login_request("z@b.com", "nope"), &ctx).await;
        let unknown_email = started.elapsed();

        assert!(matches!(wrong, Err(AppError::Unauthorized(_))));
        assert!(matches!(unknown, Err(AppError::Unauthorized(_))));
        assert!(
            unknown_email * 4 >= wrong_password,
            "unknown email took {unknown_email:?}, wrong password {wrong_password:?}"
        );
    }

    #[tokio::test]
    async fn test_login_drops_access_session_when_refresh_write_fails() {
        let users = Arc::new(MemoryStore::new());
        let sessions = Arc::new(FailingWrites {
            inner: MemorySessionStore::new(),
            allowed: 1,
            writes: AtomicUsize::new(0),
        });
        let tokens = Arc::new(TokenService::new(
            "test-secret",
            "inkwell",
            Duration::from_secs(900),
            Duration::from_secs(86_400),
        ));
        let service = AuthService::new(users, sessions.clone(), tokens);
        let ctx = ClientContext::default();
        service
            .register(register_request("a@b.com", "secret1"), &ctx)
            .await
            .unwrap();

        let result = service.login(login_request("a@b.com", "secret1"), &ctx).await;

        assert!(matches!(result, Err(AppError::ServiceUnavailable(_))));
        assert_eq!(sessions.writes.load(Ordering::SeqCst), 2);
        assert!(sessions.inner.is_empty().await);
    }

    #[tokio::test]
    async fn test_login_records_sessions() {
        let f = fixture();
        let ctx = ClientContext::default();
        let user = f
            .service
            .register(register_request("a@b.com", "secret1"), &ctx)
            .await
            .unwrap();

        let response = f
            .service
            .login(login_request("a@b.com", "secret1"), &ctx)
            .await
            .unwrap();

        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 900);
        assert_eq!(
            f.sessions.get(&response.access_token).await.unwrap(),
            Some(user.id)
        );
        let refresh = response.refresh_token.unwrap();
        assert_eq!(f.sessions.get(&refresh).await.unwrap(), Some(user.id));

        let claims = f.tokens.verify(&response.access_token).unwrap();
        assert_eq!(claims.subject_id().unwrap(), user.id);
        assert_eq!(claims.role, Role::User);
    }

    #[tokio::test]
    async fn test_refresh_picks_up_current_role() {
        let f = fixture();
        let ctx = ClientContext::default();
        let user = f
            .service
            .register(register_request("a@b.com", "secret1"), &ctx)
            .await
            .unwrap();
        let login = f
            .service
            .login(login_request("a@b.com", "secret1"), &ctx)
            .await
            .unwrap();

        assert!(f
            .users
            .update_role(user.id, Role::User, Role::Author)
            .await
            .unwrap());

        let refreshed = f
            .service
            .refresh(
                RefreshRequest {
                    refresh_token: login.refresh_token.unwrap(),
                },
                &ctx,
            )
            .await
            .unwrap();

        let claims = f.tokens.verify(&refreshed.access_token).unwrap();
        assert_eq!(claims.role, Role::Author);
        assert!(refreshed.refresh_token.is_none());
        assert_eq!(
            f.sessions.get(&refreshed.access_token).await.unwrap(),
            Some(user.id)
        );
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let f = fixture();
        let ctx = ClientContext::default();
        f.service
            .register(register_request("a@b.com", "secret1"), &ctx)
            .await
            .unwrap();
        let login = f
            .service
            .login(login_request("a@b.com", "secret1"), &ctx)
            .await
            .unwrap();

        let result = f
            .service
            .refresh(
                RefreshRequest {
                    refresh_token: login.access_token,
                },
                &ctx,
            )
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_logout_revokes_both_sessions() {
        let f = fixture();
        let ctx = ClientContext::default();
        let user = f
            .service
            .register(register_request("a@b.com", "secret1"), &ctx)
            .await
            .unwrap();
        let login = f
            .service
            .login(login_request("a@b.com", "secret1"), &ctx)
            .await
            .unwrap();
        let refresh = login.refresh_token.clone().unwrap();

        f.service
            .logout(
                user.id,
                &login.access_token,
                LogoutRequest {
                    refresh_token: Some(refresh.clone()),
                },
                &ctx,
            )
            .await
            .unwrap();

        assert_eq!(f.sessions.get(&login.access_token).await.unwrap(), None);
        assert_eq!(f.sessions.get(&refresh).await.unwrap(), None);

        let result = f
            .service
            .refresh(RefreshRequest { refresh_token: refresh }, &ctx)
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }
}
