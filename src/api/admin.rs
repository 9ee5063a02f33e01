// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only API endpoints.
//!
//! Every route in this module sits behind
//! `require_permission("admin:users:manage")` and provides:
//! - Account, role and permission listings
//! - Role assignment and removal
//! - Teacher code invitations
//! - Teacher assignments and student access grants

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{
    auth::Auth,
    error::ApiError,
    models::{
        AdminUserItem, AdminUserListResponse, CreateAssignmentRequest, CreateTeacherCodeRequest,
        GrantAccessRequest, Pagination, RoleChangeResponse, TeacherCodeDetails,
    },
    state::AppState,
    storage::{
        repository::{
            NewTeacherCode, StoredAccess, StoredAssignment, StoredPermission, StoredRole,
        },
        AccessRepository, AccountRepository, AssignmentRepository, RbacRepository,
        TeacherCodeRepository,
    },
};

/// Uses allowed for an admin-issued code when the request leaves it unset.
pub const DEFAULT_INVITATION_MAX_USES: u32 = 1;

// ============================================================================
// Accounts, roles and permissions
// ============================================================================

/// List accounts with their roles.
#[utoipa::path(
    get,
    path = "/v1/admin/users",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(Pagination),
    responses(
        (status = 200, description = "Accounts", body = AdminUserListResponse),
        (status = 400, description = "Invalid pagination"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin:users:manage required)")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<AdminUserListResponse>, ApiError> {
    let (skip, limit) = page.resolve()?;
    let accounts = AccountRepository::new(&state.db);
    let rbac = RbacRepository::new(&state.db);

    let mut users = Vec::new();
    for account in accounts.list(skip, limit)? {
        let roles = rbac.roles_of(&account.id)?;
        users.push(AdminUserItem {
            id: account.id,
            email: account.email,
            name: account.name,
            is_verified: account.is_verified,
            is_active: account.is_active,
            clerk_user_id: account.clerk_user_id,
            roles: roles.into_iter().collect(),
            created_at: account.created_at,
        });
    }

    Ok(Json(AdminUserListResponse {
        users,
        total: accounts.count()?,
    }))
}

/// List roles with their permissions.
#[utoipa::path(
    get,
    path = "/v1/admin/roles",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(Pagination),
    responses(
        (status = 200, description = "Roles", body = Vec<StoredRole>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin:users:manage required)")
    )
)]
pub async fn list_roles(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<StoredRole>>, ApiError> {
    let (skip, limit) = page.resolve()?;
    Ok(Json(RbacRepository::new(&state.db).list_roles(skip, limit)?))
}

/// List the permission catalog.
#[utoipa::path(
    get,
    path = "/v1/admin/permissions",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(Pagination),
    responses(
        (status = 200, description = "Permissions", body = Vec<StoredPermission>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin:users:manage required)")
    )
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<StoredPermission>>, ApiError> {
    let (skip, limit) = page.resolve()?;
    Ok(Json(
        RbacRepository::new(&state.db).list_permissions(skip, limit)?,
    ))
}

fn role_change(
    state: &AppState,
    user_id: String,
    role: String,
    changed: bool,
) -> Result<Json<RoleChangeResponse>, ApiError> {
    let roles = RbacRepository::new(&state.db).roles_of(&user_id)?;
    Ok(Json(RoleChangeResponse {
        user_id,
        role,
        changed,
        roles: roles.into_iter().collect(),
    }))
}

/// Grant a role to an account. Granting a held role is a no-op.
#[utoipa::path(
    post,
    path = "/v1/admin/users/{user_id}/roles/{role_name}",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(
        ("user_id" = String, Path, description = "Account id"),
        ("role_name" = String, Path, description = "Role name")
    ),
    responses(
        (status = 200, description = "Role held", body = RoleChangeResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin:users:manage required)"),
        (status = 404, description = "Account or role not found")
    )
)]
pub async fn assign_role(
    State(state): State<AppState>,
    Auth(admin): Auth,
    Path((user_id, role_name)): Path<(String, String)>,
) -> Result<Json<RoleChangeResponse>, ApiError> {
    let changed = RbacRepository::new(&state.db).assign_role(&user_id, &role_name)?;
    if changed {
        tracing::info!(
            account_id = %user_id,
            role = %role_name,
            admin_id = %admin.id(),
            "Role assigned"
        );
    }
    role_change(&state, user_id, role_name, changed)
}

/// Revoke a role from an account. Revoking an unheld role is a no-op.
#[utoipa::path(
    delete,
    path = "/v1/admin/users/{user_id}/roles/{role_name}",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(
        ("user_id" = String, Path, description = "Account id"),
        ("role_name" = String, Path, description = "Role name")
    ),
    responses(
        (status = 200, description = "Role not held", body = RoleChangeResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin:users:manage required)"),
        (status = 404, description = "Account not found")
    )
)]
pub async fn remove_role(
    State(state): State<AppState>,
    Auth(admin): Auth,
    Path((user_id, role_name)): Path<(String, String)>,
) -> Result<Json<RoleChangeResponse>, ApiError> {
    let changed = RbacRepository::new(&state.db).remove_role(&user_id, &role_name)?;
    if changed {
        tracing::info!(
            account_id = %user_id,
            role = %role_name,
            admin_id = %admin.id(),
            "Role removed"
        );
    }
    role_change(&state, user_id, role_name, changed)
}

// ============================================================================
// Teacher codes
// ============================================================================

/// List every teacher code with its current status.
#[utoipa::path(
    get,
    path = "/v1/admin/teacher-codes",
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Teacher codes", body = Vec<TeacherCodeDetails>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin:users:manage required)")
    )
)]
pub async fn list_teacher_codes(
    State(state): State<AppState>,
) -> Result<Json<Vec<TeacherCodeDetails>>, ApiError> {
    let now = state.clock.now();
    let mut codes = TeacherCodeRepository::new(&state.db).list_all()?;
    codes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(
        codes
            .into_iter()
            .map(|code| TeacherCodeDetails::at(code, now))
            .collect(),
    ))
}

/// Issue an invitation code. The code has no owner until first consumed.
#[utoipa::path(
    post,
    path = "/v1/admin/teacher-codes",
    tag = "Admin",
    security(("bearer_auth" = [])),
    request_body = CreateTeacherCodeRequest,
    responses(
        (status = 200, description = "Code created", body = TeacherCodeDetails),
        (status = 400, description = "Expiry is not in the future"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin:users:manage required)")
    )
)]
pub async fn create_teacher_code(
    State(state): State<AppState>,
    Auth(admin): Auth,
    Json(request): Json<CreateTeacherCodeRequest>,
) -> Result<Json<TeacherCodeDetails>, ApiError> {
    let now = state.clock.now();
    request.validate(now)?;

    let code = TeacherCodeRepository::new(&state.db).create(
        NewTeacherCode {
            teacher_id: None,
            created_by: Some(admin.id().to_string()),
            max_uses: request.max_uses.unwrap_or(DEFAULT_INVITATION_MAX_USES),
            expires_at: request.expires_at,
        },
        now,
    )?;
    tracing::info!(code_id = %code.id, admin_id = %admin.id(), "Invitation code created");

    Ok(Json(TeacherCodeDetails::at(code, now)))
}

/// Deactivate a code. Deactivation is terminal.
#[utoipa::path(
    post,
    path = "/v1/admin/teacher-codes/{code}/deactivate",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(("code" = String, Path, description = "Teacher code")),
    responses(
        (status = 200, description = "Code deactivated", body = TeacherCodeDetails),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin:users:manage required)"),
        (status = 404, description = "Code not found")
    )
)]
pub async fn deactivate_teacher_code(
    State(state): State<AppState>,
    Auth(admin): Auth,
    Path(code): Path<String>,
) -> Result<Json<TeacherCodeDetails>, ApiError> {
    let code = TeacherCodeRepository::new(&state.db).deactivate(&code)?;
    tracing::info!(code_id = %code.id, admin_id = %admin.id(), "Teacher code deactivated");
    Ok(Json(TeacherCodeDetails::at(code, state.clock.now())))
}

// ============================================================================
// Teacher assignments
// ============================================================================

#[utoipa::path(
    get,
    path = "/v1/admin/teacher-assignments",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(Pagination),
    responses(
        (status = 200, description = "Assignments, including inactive ones", body = Vec<StoredAssignment>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin:users:manage required)")
    )
)]
pub async fn list_assignments(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<StoredAssignment>>, ApiError> {
    let (skip, limit) = page.resolve()?;
    Ok(Json(AssignmentRepository::new(&state.db).list(skip, limit)?))
}

/// Assign a student to a teacher, reactivating a previous pairing if one
/// exists.
#[utoipa::path(
    post,
    path = "/v1/admin/teacher-assignments",
    tag = "Admin",
    security(("bearer_auth" = [])),
    request_body = CreateAssignmentRequest,
    responses(
        (status = 200, description = "Assignment active", body = StoredAssignment),
        (status = 400, description = "Invalid teacher ID"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin:users:manage required)"),
        (status = 404, description = "Student not found"),
        (status = 409, description = "Assignment already active")
    )
)]
pub async fn create_assignment(
    State(state): State<AppState>,
    Auth(admin): Auth,
    Json(request): Json<CreateAssignmentRequest>,
) -> Result<Json<StoredAssignment>, ApiError> {
    request.validate()?;
    let assignment = AssignmentRepository::new(&state.db).create(
        &request.teacher_id,
        &request.student_id,
        admin.id(),
        state.clock.now(),
    )?;
    tracing::info!(
        assignment_id = %assignment.id,
        teacher_id = %assignment.teacher_id,
        student_id = %assignment.student_id,
        "Teacher assigned"
    );
    Ok(Json(assignment))
}

/// Soft-delete an assignment.
#[utoipa::path(
    delete,
    path = "/v1/admin/teacher-assignments/{assignment_id}",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(("assignment_id" = String, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Assignment deactivated", body = StoredAssignment),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin:users:manage required)"),
        (status = 404, description = "Assignment not found")
    )
)]
pub async fn delete_assignment(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
) -> Result<Json<StoredAssignment>, ApiError> {
    Ok(Json(
        AssignmentRepository::new(&state.db).deactivate(&assignment_id)?,
    ))
}

// ============================================================================
// Student access
// ============================================================================

#[utoipa::path(
    post,
    path = "/v1/admin/student-access",
    tag = "Admin",
    security(("bearer_auth" = [])),
    request_body = GrantAccessRequest,
    responses(
        (status = 200, description = "Access granted", body = StoredAccess),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin:users:manage required)"),
        (status = 404, description = "Student or teacher not found")
    )
)]
pub async fn grant_access(
    State(state): State<AppState>,
    Auth(admin): Auth,
    Json(request): Json<GrantAccessRequest>,
) -> Result<Json<StoredAccess>, ApiError> {
    request.validate()?;
    let access = AccessRepository::new(&state.db).grant(
        &request.student_id,
        &request.teacher_id,
        Some(admin.id()),
        state.clock.now(),
    )?;
    Ok(Json(access))
}

#[utoipa::path(
    delete,
    path = "/v1/admin/student-access/{student_id}/{teacher_id}",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(
        ("student_id" = String, Path, description = "Student account id"),
        ("teacher_id" = String, Path, description = "Teacher account id")
    ),
    responses(
        (status = 200, description = "Access revoked", body = StoredAccess),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin:users:manage required)"),
        (status = 404, description = "Grant not found")
    )
)]
pub async fn revoke_access(
    State(state): State<AppState>,
    Path((student_id, teacher_id)): Path<(String, String)>,
) -> Result<Json<StoredAccess>, ApiError> {
    Ok(Json(
        AccessRepository::new(&state.db).revoke(&student_id, &teacher_id)?,
    ))
}
