// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies shared by the REST handlers. All types derive
//! `ToSchema` for the OpenAPI document. Request types expose `validate()`,
//! which handlers call before touching the store.
//!
//! ## Model Categories
//!
//! - **Accounts**: the caller's profile, roles and permissions
//! - **Teacher Codes**: validation, consumption and self-service codes
//! - **Admin**: pagination and management payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;
use crate::storage::repository::{
    normalize_email, CodeStatus, StoredAccount, StoredTeacherCode,
};

/// Minimum password length for complete-signup.
pub const MIN_PASSWORD_LENGTH: usize = 8;

pub const DEFAULT_PAGE_LIMIT: usize = 100;
pub const MAX_PAGE_LIMIT: usize = 1000;

fn require(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{field} is required")));
    }
    Ok(())
}

/// Loose shape check: one `@` with a non-empty local part and a dotted domain.
pub fn is_plausible_email(email: &str) -> bool {
    let email = normalize_email(email);
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

// =============================================================================
// Account Models
// =============================================================================

/// Public view of an account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UserData {
    pub id: String,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
}

impl UserData {
    pub fn new(account: &StoredAccount, roles: impl IntoIterator<Item = String>) -> Self {
        Self {
            id: account.id.clone(),
            email: account.email.clone(),
            name: account.name.clone(),
            roles: roles.into_iter().collect(),
        }
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub is_verified: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub roles: Vec<String>,
    /// Union of the permissions of every held role
    pub permissions: Vec<String>,
}

/// A teacher whose content the caller can access.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccessibleTeacher {
    pub teacher_id: String,
    pub teacher_name: String,
    pub granted_at: DateTime<Utc>,
}

/// A student assigned to the calling teacher.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignedStudent {
    pub student_id: String,
    pub student_name: String,
    pub student_email: String,
    pub assigned_at: DateTime<Utc>,
}

// =============================================================================
// Teacher Code Models
// =============================================================================

/// Request carrying only a teacher code.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TeacherCodeRequest {
    pub teacher_code: String,
}

impl TeacherCodeRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        require(&self.teacher_code, "teacher_code")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TeacherCodeValidity {
    pub is_valid: bool,
}

/// Grant the teacher role to an existing account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignTeacherCodeRequest {
    pub teacher_code: String,
    pub user_id: String,
}

impl AssignTeacherCodeRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        require(&self.teacher_code, "teacher_code")?;
        require(&self.user_id, "user_id")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignTeacherCodeResponse {
    pub success: bool,
    pub user_data: UserData,
}

/// Consume a code for an account identified by its Clerk user id.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SignupWithCodeRequest {
    pub teacher_code: String,
    pub clerk_user_id: String,
}

impl SignupWithCodeRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        require(&self.teacher_code, "teacher_code")?;
        require(&self.clerk_user_id, "clerk_user_id")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SignupWithCodeResponse {
    pub user_id: String,
    pub role_assigned: bool,
}

/// Create a password account and consume a code in one step.
#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct CompleteSignupRequest {
    pub name: String,
    pub email: String,
    #[schema(min_length = 8)]
    pub password: String,
    pub teacher_code: String,
}

impl CompleteSignupRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        require(&self.name, "name")?;
        require(&self.email, "email")?;
        require(&self.teacher_code, "teacher_code")?;
        if !is_plausible_email(&self.email) {
            return Err(ApiError::bad_request("email is not a valid address"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ApiError::bad_request(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for CompleteSignupRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompleteSignupRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("teacher_code", &self.teacher_code)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompleteSignupResponse {
    pub user_id: String,
}

/// The caller's own teacher code.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OwnTeacherCodeResponse {
    pub teacher_code: String,
    pub is_active: bool,
    pub use_count: u32,
    pub max_uses: u32,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<StoredTeacherCode> for OwnTeacherCodeResponse {
    fn from(code: StoredTeacherCode) -> Self {
        Self {
            teacher_code: code.code,
            is_active: code.is_active,
            use_count: code.use_count,
            max_uses: code.max_uses,
            expires_at: code.expires_at,
        }
    }
}

// =============================================================================
// Admin Models
// =============================================================================

/// `skip` / `limit` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    /// Records to skip (default 0)
    pub skip: Option<usize>,
    /// Maximum records to return (default 100, max 1000)
    pub limit: Option<usize>,
}

impl Pagination {
    /// Resolved `(skip, limit)`.
    pub fn resolve(&self) -> Result<(usize, usize), ApiError> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(ApiError::bad_request(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        Ok((self.skip.unwrap_or(0), limit))
    }
}

/// Admin view of an account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminUserItem {
    pub id: String,
    pub email: String,
    pub name: String,
    pub is_verified: bool,
    pub is_active: bool,
    pub clerk_user_id: Option<String>,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminUserListResponse {
    pub users: Vec<AdminUserItem>,
    /// Total number of accounts
    pub total: u64,
}

/// Result of an assign-role or remove-role call.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleChangeResponse {
    pub user_id: String,
    pub role: String,
    /// False when the call was a no-op
    pub changed: bool,
    pub roles: Vec<String>,
}

/// Create an invitation code.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateTeacherCodeRequest {
    /// Maximum consumptions (default 1, 0 = unlimited)
    #[serde(default)]
    pub max_uses: Option<u32>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CreateTeacherCodeRequest {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ApiError> {
        if self.expires_at.is_some_and(|expires_at| expires_at <= now) {
            return Err(ApiError::bad_request("expires_at must be in the future"));
        }
        Ok(())
    }
}

/// Admin view of a teacher code, with its status at request time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TeacherCodeDetails {
    pub id: String,
    pub code: String,
    pub teacher_id: Option<String>,
    pub created_by: Option<String>,
    pub max_uses: u32,
    pub use_count: u32,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub status: CodeStatus,
    pub created_at: DateTime<Utc>,
}

impl TeacherCodeDetails {
    pub fn at(code: StoredTeacherCode, now: DateTime<Utc>) -> Self {
        let status = code.status(now);
        Self {
            id: code.id,
            code: code.code,
            teacher_id: code.teacher_id,
            created_by: code.created_by,
            max_uses: code.max_uses,
            use_count: code.use_count,
            expires_at: code.expires_at,
            is_active: code.is_active,
            status,
            created_at: code.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateAssignmentRequest {
    pub teacher_id: String,
    pub student_id: String,
}

impl CreateAssignmentRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        require(&self.teacher_id, "teacher_id")?;
        require(&self.student_id, "student_id")?;
        if self.teacher_id == self.student_id {
            return Err(ApiError::bad_request("A teacher cannot be assigned to themselves"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GrantAccessRequest {
    pub student_id: String,
    pub teacher_id: String,
}

impl GrantAccessRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        require(&self.student_id, "student_id")?;
        require(&self.teacher_id, "teacher_id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn signup(email: &str, password: &str) -> CompleteSignupRequest {
        CompleteSignupRequest {
            name: "Ada".into(),
            email: email.into(),
            password: password.into(),
            teacher_code: "ABCD1234".into(),
        }
    }

    #[test]
    fn complete_signup_validation() {
        assert!(signup("ada@example.com", "correct-horse").validate().is_ok());

        let err = signup("ada@example.com", "short").validate().unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("at least 8"));

        assert!(signup("not-an-email", "correct-horse").validate().is_err());
        assert!(signup("a@b@example.com", "correct-horse").validate().is_err());

        let mut missing_name = signup("ada@example.com", "correct-horse");
        missing_name.name = "   ".into();
        assert_eq!(
            missing_name.validate().unwrap_err().message,
            "name is required"
        );
    }

    #[test]
    fn signup_debug_hides_password() {
        let rendered = format!("{:?}", signup("ada@example.com", "hunter2-hunter2"));
        assert!(rendered.contains("ada@example.com"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn blank_teacher_code_rejected() {
        let request = TeacherCodeRequest {
            teacher_code: " ".into(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn pagination_defaults_and_bounds() {
        assert_eq!(Pagination::default().resolve().unwrap(), (0, 100));
        let page = Pagination {
            skip: Some(20),
            limit: Some(1000),
        };
        assert_eq!(page.resolve().unwrap(), (20, 1000));

        let too_big = Pagination {
            skip: None,
            limit: Some(1001),
        };
        assert!(too_big.resolve().is_err());
        let zero = Pagination {
            skip: None,
            limit: Some(0),
        };
        assert!(zero.resolve().is_err());
    }

    #[test]
    fn create_code_rejects_past_expiry() {
        let now = Utc::now();
        let past = CreateTeacherCodeRequest {
            max_uses: Some(5),
            expires_at: Some(now - chrono::Duration::minutes(1)),
        };
        assert!(past.validate(now).is_err());
        assert!(CreateTeacherCodeRequest::default().validate(now).is_ok());
    }

    #[test]
    fn self_assignment_rejected() {
        let request = CreateAssignmentRequest {
            teacher_id: "a1".into(),
            student_id: "a1".into(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn own_code_response_from_stored() {
        let stored = StoredTeacherCode {
            id: "c1".into(),
            code: "ABCD1234".into(),
            teacher_id: Some("t1".into()),
            created_by: Some("t1".into()),
            max_uses: 1,
            use_count: 0,
            expires_at: None,
            is_active: true,
            created_at: Utc::now(),
        };
        let response = OwnTeacherCodeResponse::from(stored);
        assert_eq!(response.teacher_code, "ABCD1234");
        assert_eq!(response.max_uses, 1);
    }
}
