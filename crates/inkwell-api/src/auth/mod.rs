//! Authentication and authorization
//!
//! - Token issuance and verification (HS256)
//! - Password hashing with Argon2id
//! - Gate middleware: bearer parsing, session liveness, role policy
//! - Registration, login, refresh, logout
//! - `USER -> AUTHOR` promotion

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod promotion;
pub mod service;

pub use jwt::{Claims, IssuedToken, TokenError, TokenKind, TokenService};
pub use middleware::{
    auth_middleware, authorize, bearer_token, parse_bearer, require_role, AuthError, Identity,
};
pub use password::{hash_password, verify_password, PasswordError};
pub use promotion::PromotionService;
pub use service::{
    AuthResponse, AuthService, ClientContext, LoginRequest, LogoutRequest, RefreshRequest,
    RegisterRequest, UserInfo,
};
