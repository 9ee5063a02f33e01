// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Teacher-code endpoints.
//!
//! Consuming a code replaces the target account's roles with exactly
//! `teacher`. Validation here only gives early feedback: the code is checked
//! again inside the consuming transaction, so a code that was valid when
//! validated can still be refused at consumption.

use axum::{extract::State, Json};

use crate::{
    auth::{
        identity::IdentityResolver, password::hash_password, roles::permissions::ADMIN_USERS_MANAGE,
        Auth, AuthError, BuiltinRole, TokenRejection,
    },
    error::ApiError,
    models::{
        AssignTeacherCodeRequest, AssignTeacherCodeResponse, CompleteSignupRequest,
        CompleteSignupResponse, OwnTeacherCodeResponse, SignupWithCodeRequest,
        SignupWithCodeResponse, TeacherCodeRequest, TeacherCodeValidity, UserData,
    },
    state::AppState,
    storage::{
        repository::{ConsumeTarget, StoredAccount},
        AccountRepository, RbacRepository, TeacherCodeRepository,
    },
};

fn resolver(state: &AppState) -> IdentityResolver<'_> {
    IdentityResolver::new(&state.db, state.identity.as_ref(), state.clock.as_ref())
}

/// Check that a teacher code exists and is consumable.
#[utoipa::path(
    post,
    path = "/v1/teacher-codes/validate",
    tag = "Teacher Codes",
    request_body = TeacherCodeRequest,
    responses(
        (status = 200, description = "Code is valid", body = TeacherCodeValidity),
        (status = 400, description = "Code is unknown, expired, exhausted or inactive", body = crate::error::ErrorBody)
    )
)]
pub async fn validate_teacher_code(
    State(state): State<AppState>,
    Json(request): Json<TeacherCodeRequest>,
) -> Result<Json<TeacherCodeValidity>, ApiError> {
    request.validate()?;
    TeacherCodeRepository::new(&state.db).validate(&request.teacher_code, state.clock.now())?;
    Ok(Json(TeacherCodeValidity { is_valid: true }))
}

/// Consume a code for the account behind a Clerk user id.
///
/// The account is provisioned from the identity provider when this is the
/// first time the user id is seen. The endpoint is unauthenticated, so it
/// refuses accounts that hold the `admin` role.
#[utoipa::path(
    post,
    path = "/v1/teacher-codes/signup",
    tag = "Teacher Codes",
    request_body = SignupWithCodeRequest,
    responses(
        (status = 200, description = "Teacher role assigned", body = SignupWithCodeResponse),
        (status = 400, description = "Invalid code or no verified email", body = crate::error::ErrorBody),
        (status = 403, description = "Target account is an administrator", body = crate::error::ErrorBody),
        (status = 404, description = "User not found", body = crate::error::ErrorBody)
    )
)]
pub async fn signup_with_code(
    State(state): State<AppState>,
    Json(request): Json<SignupWithCodeRequest>,
) -> Result<Json<SignupWithCodeResponse>, ApiError> {
    request.validate()?;
    let now = state.clock.now();
    let codes = TeacherCodeRepository::new(&state.db);
    codes.validate(&request.teacher_code, now)?;

    let resolver = resolver(&state);
    let account = match AccountRepository::new(&state.db).find_by_external_id(&request.clerk_user_id)? {
        Some(account) => account,
        None => resolver
            .provision(&request.clerk_user_id)
            .await
            .map_err(|e| match e {
                AuthError::InvalidToken(TokenRejection::UnknownSubject) => {
                    ApiError::not_found("User not found")
                }
                AuthError::NoVerifiedEmail => {
                    ApiError::bad_request("No verified email address found")
                }
                other => other.into(),
            })?,
    };

    if RbacRepository::new(&state.db).has_role(&account.id, BuiltinRole::Admin.as_str())? {
        tracing::warn!(account_id = %account.id, "Teacher code signup refused for admin account");
        return Err(ApiError::forbidden(
            "Teacher codes cannot be applied to administrator accounts",
        ));
    }

    let consumption = codes.consume(
        &request.teacher_code,
        ConsumeTarget::Existing(account.id),
        now,
    )?;
    tracing::info!(
        account_id = %consumption.account.id,
        code_id = %consumption.code.id,
        "Teacher code consumed at signup"
    );

    let account = resolver.refresh_profile(consumption.account).await;
    Ok(Json(SignupWithCodeResponse {
        user_id: account.id,
        role_assigned: true,
    }))
}

/// Create a password account and make it a teacher in one step.
#[utoipa::path(
    post,
    path = "/v1/teacher-codes/complete-signup",
    tag = "Teacher Codes",
    request_body = CompleteSignupRequest,
    responses(
        (status = 200, description = "Account created with the teacher role", body = CompleteSignupResponse),
        (status = 400, description = "Invalid input or code", body = crate::error::ErrorBody),
        (status = 409, description = "Email already registered", body = crate::error::ErrorBody)
    )
)]
pub async fn complete_signup(
    State(state): State<AppState>,
    Json(request): Json<CompleteSignupRequest>,
) -> Result<Json<CompleteSignupResponse>, ApiError> {
    request.validate()?;
    let now = state.clock.now();
    let codes = TeacherCodeRepository::new(&state.db);
    codes.validate(&request.teacher_code, now)?;

    let password_hash = hash_password(&request.password).map_err(|e| {
        tracing::error!(error = %e, "Password hashing failed");
        ApiError::internal("Internal server error")
    })?;

    let mut account = StoredAccount::new(&request.email, request.name.trim(), now);
    account.password_hash = Some(password_hash);

    let consumption = codes.consume(
        &request.teacher_code,
        ConsumeTarget::NewAccount(account),
        now,
    )?;
    tracing::info!(
        account_id = %consumption.account.id,
        code_id = %consumption.code.id,
        "Teacher account created with code"
    );

    Ok(Json(CompleteSignupResponse {
        user_id: consumption.account.id,
    }))
}

/// Grant the teacher role to an existing account.
///
/// Callers may only target their own account unless they hold
/// `admin:users:manage`.
#[utoipa::path(
    post,
    path = "/v1/teacher-codes/assign",
    tag = "Teacher Codes",
    security(("bearer_auth" = [])),
    request_body = AssignTeacherCodeRequest,
    responses(
        (status = 200, description = "Teacher role assigned", body = AssignTeacherCodeResponse),
        (status = 400, description = "Invalid code", body = crate::error::ErrorBody),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Target is another account"),
        (status = 404, description = "Account not found", body = crate::error::ErrorBody)
    )
)]
pub async fn assign_teacher_code(
    State(state): State<AppState>,
    Auth(current): Auth,
    Json(request): Json<AssignTeacherCodeRequest>,
) -> Result<Json<AssignTeacherCodeResponse>, ApiError> {
    request.validate()?;
    if request.user_id != current.id() && !current.has_permission(ADMIN_USERS_MANAGE) {
        return Err(ApiError::forbidden(
            "Cannot assign a teacher code to another account",
        ));
    }

    let now = state.clock.now();
    let consumption = TeacherCodeRepository::new(&state.db).consume(
        &request.teacher_code,
        ConsumeTarget::Existing(request.user_id.clone()),
        now,
    )?;
    tracing::info!(
        account_id = %consumption.account.id,
        assigned_by = %current.id(),
        code_id = %consumption.code.id,
        "Teacher code assigned"
    );

    let account = resolver(&state).refresh_profile(consumption.account).await;
    let roles = RbacRepository::new(&state.db).roles_of(&account.id)?;
    Ok(Json(AssignTeacherCodeResponse {
        success: true,
        user_data: UserData::new(&account, roles),
    }))
}

/// Fetch the caller's active teacher code, creating one when none exists.
#[utoipa::path(
    get,
    path = "/v1/teacher-codes/mine",
    tag = "Teacher Codes",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "The caller's code", body = OwnTeacherCodeResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Teacher or admin role required")
    )
)]
pub async fn get_own_teacher_code(
    State(state): State<AppState>,
    Auth(current): Auth,
) -> Result<Json<OwnTeacherCodeResponse>, ApiError> {
    let (code, created) = TeacherCodeRepository::new(&state.db)
        .fetch_or_create_for_teacher(current.id(), state.clock.now())?;
    if created {
        tracing::info!(account_id = %current.id(), code_id = %code.id, "Created self-service teacher code");
    }
    Ok(Json(code.into()))
}
