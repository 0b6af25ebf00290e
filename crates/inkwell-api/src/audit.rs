//! Security audit logging for authentication events
//!
//! Every event is written at INFO level on the `audit` target, with the
//! serialized event attached as a JSON field. Route the target separately
//! to feed security monitoring:
//!
//! ```text
//! RUST_LOG=info,audit=info
//! ```
//!
//! Passwords and tokens are never part of an event.
//!
//! Author: hephaex@gmail.com

use chrono::Utc;
use inkwell_core::Role;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    LoginSuccess {
        user_id: u64,
        email: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Unknown email and wrong password are both recorded here; only the
    /// audit trail distinguishes them
    LoginFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    RegistrationSuccess {
        user_id: u64,
        email: String,
        ip_address: Option<String>,
    },

    RegistrationFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
    },

    Logout {
        user_id: u64,
        sessions_revoked: usize,
        ip_address: Option<String>,
    },

    TokenRefresh {
        user_id: u64,
        role: Role,
        ip_address: Option<String>,
    },

    InvalidToken {
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    AccessDenied {
        user_id: u64,
        resource: String,
        required_role: Role,
        actual_role: Role,
        ip_address: Option<String>,
    },

    /// `USER -> AUTHOR`
    Promotion { user_id: u64, author_id: u64 },
}

impl AuditEvent {
    fn summary(&self) -> &'static str {
        match self {
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::RegistrationSuccess { .. } => "Registration successful",
            AuditEvent::RegistrationFailure { .. } => "Registration failed",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::TokenRefresh { .. } => "Token refresh",
            AuditEvent::InvalidToken { .. } => "Invalid token",
            AuditEvent::AccessDenied { .. } => "Access denied",
            AuditEvent::Promotion { .. } => "User promoted to author",
        }
    }

    fn user_id(&self) -> Option<u64> {
        match self {
            AuditEvent::LoginSuccess { user_id, .. }
            | AuditEvent::RegistrationSuccess { user_id, .. }
            | AuditEvent::Logout { user_id, .. }
            | AuditEvent::TokenRefresh { user_id, .. }
            | AuditEvent::AccessDenied { user_id, .. }
            | AuditEvent::Promotion { user_id, .. } => Some(*user_id),
            AuditEvent::LoginFailure { .. }
            | AuditEvent::RegistrationFailure { .. }
            | AuditEvent::InvalidToken { .. } => None,
        }
    }

    fn ip_address(&self) -> Option<&str> {
        match self {
            AuditEvent::LoginSuccess { ip_address, .. }
            | AuditEvent::LoginFailure { ip_address, .. }
            | AuditEvent::RegistrationSuccess { ip_address, .. }
            | AuditEvent::RegistrationFailure { ip_address, .. }
            | AuditEvent::Logout { ip_address, .. }
            | AuditEvent::TokenRefresh { ip_address, .. }
            | AuditEvent::InvalidToken { ip_address, .. }
            | AuditEvent::AccessDenied { ip_address, .. } => ip_address.as_deref(),
            AuditEvent::Promotion { .. } => None,
        }
    }
}

/// Write an audit event on the `audit` target
pub fn audit_log(event: &AuditEvent) {
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    info!(
        target: "audit",
        timestamp = %Utc::now(),
        event = %event_json,
        user_id = ?event.user_id(),
        ip_address = ?event.ip_address(),
        "{}",
        event.summary()
    );
}

/// Client IP from proxy headers (`X-Forwarded-For` first hop, then `X-Real-IP`)
pub fn extract_ip_address(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(first) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
    {
        let first = first.trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
}

pub fn extract_user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
