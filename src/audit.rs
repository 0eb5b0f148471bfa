/// Audit trail for security-relevant events
///
/// Entries go to the tracing pipeline: successes at info, failures at warn.
/// Never put passwords or raw tokens in an entry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Register,
    Login,
    Refresh,
    Logout,
    LogoutAll,
    Activate,
    Deactivate,
    ProfileUpdate,
    ProfileDelete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Register => "REGISTER",
            AuditAction::Login => "LOGIN",
            AuditAction::Refresh => "REFRESH",
            AuditAction::Logout => "LOGOUT",
            AuditAction::LogoutAll => "LOGOUT_ALL",
            AuditAction::Activate => "ACTIVATE",
            AuditAction::Deactivate => "DEACTIVATE",
            AuditAction::ProfileUpdate => "PROFILE_UPDATE",
            AuditAction::ProfileDelete => "PROFILE_DELETE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditLog {
    pub log_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    /// user, session, ...
    pub resource_type: String,
    pub resource_id: Option<String>,
    /// Actor, when known
    pub user_id: Option<String>,
    pub status: AuditStatus,
    pub message: String,
    pub previous_state: Option<String>,
    pub new_state: Option<String>,
}

impl AuditLog {
    pub fn new(
        action: AuditAction,
        resource_type: &str,
        status: AuditStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            log_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            action,
            resource_type: resource_type.to_string(),
            resource_id: None,
            user_id: None,
            status,
            message: message.into(),
            previous_state: None,
            new_state: None,
        }
    }

    pub fn success(action: AuditAction, resource_type: &str, message: impl Into<String>) -> Self {
        Self::new(action, resource_type, AuditStatus::Success, message)
    }

    pub fn failure(action: AuditAction, resource_type: &str, message: impl Into<String>) -> Self {
        Self::new(action, resource_type, AuditStatus::Failure, message)
    }

    pub fn with_resource_id(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn with_user_id(mut self, user_id: impl ToString) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn with_state_change(mut self, previous: impl ToString, new: impl ToString) -> Self {
        self.previous_state = Some(previous.to_string());
        self.new_state = Some(new.to_string());
        self
    }

    /// Emit the entry
    pub fn record(&self) {
        match self.status {
            AuditStatus::Failure => tracing::warn!(
                log_id = %self.log_id,
                action = %self.action,
                resource_type = %self.resource_type,
                resource_id = ?self.resource_id,
                user_id = ?self.user_id,
                status = "FAILURE",
                message = %self.message,
                "Audit log entry"
            ),
            AuditStatus::Success => tracing::info!(
                log_id = %self.log_id,
                action = %self.action,
                resource_type = %self.resource_type,
                resource_id = ?self.resource_id,
                user_id = ?self.user_id,
                status = "SUCCESS",
                previous_state = ?self.previous_state,
                new_state = ?self.new_state,
                message = %self.message,
                "Audit log entry"
            ),
        }
    }
}
