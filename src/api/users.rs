// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Endpoints about the calling account.

use axum::{extract::State, Json};

use crate::{
    auth::{Auth, CurrentAccount},
    error::ApiError,
    models::{AccessibleTeacher, AssignedStudent, CurrentUserResponse},
    state::AppState,
    storage::{AccessRepository, AccountRepository, AssignmentRepository},
};

impl From<CurrentAccount> for CurrentUserResponse {
    fn from(current: CurrentAccount) -> Self {
        let CurrentAccount { account, grants } = current;
        Self {
            id: account.id,
            email: account.email,
            name: account.name,
            is_verified: account.is_verified,
            is_active: account.is_active,
            created_at: account.created_at,
            last_login_at: account.last_login_at,
            roles: grants.roles.into_iter().collect(),
            permissions: grants.permissions.into_iter().collect(),
        }
    }
}

/// Get the current authenticated account.
///
/// Returns the account record together with its roles and the union of
/// their permissions.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Account information", body = CurrentUserResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn get_current_user(Auth(current): Auth) -> Json<CurrentUserResponse> {
    Json(current.into())
}

/// Teachers whose content the caller can access.
#[utoipa::path(
    get,
    path = "/v1/users/me/teachers",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Active access grants", body = Vec<AccessibleTeacher>),
        (status = 401, description = "Not authenticated"),
    )
)]
pub async fn list_accessible_teachers(
    State(state): State<AppState>,
    Auth(current): Auth,
) -> Result<Json<Vec<AccessibleTeacher>>, ApiError> {
    let accounts = AccountRepository::new(&state.db);
    let grants = AccessRepository::new(&state.db).active_for_student(current.id())?;

    let mut teachers = Vec::with_capacity(grants.len());
    for grant in grants {
        if let Some(teacher) = accounts.find(&grant.teacher_id)? {
            teachers.push(AccessibleTeacher {
                teacher_id: teacher.id,
                teacher_name: teacher.name,
                granted_at: grant.granted_at,
            });
        }
    }
    Ok(Json(teachers))
}

/// Students assigned to the calling teacher.
#[utoipa::path(
    get,
    path = "/v1/users/me/students",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Active assignments", body = Vec<AssignedStudent>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Missing teacher:students:view"),
    )
)]
pub async fn list_assigned_students(
    State(state): State<AppState>,
    Auth(current): Auth,
) -> Result<Json<Vec<AssignedStudent>>, ApiError> {
    let accounts = AccountRepository::new(&state.db);
    let assignments = AssignmentRepository::new(&state.db).active_for_teacher(current.id())?;

    let mut students = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        if let Some(student) = accounts.find(&assignment.student_id)? {
            students.push(AssignedStudent {
                student_id: student.id,
                student_name: student.name,
                student_email: student.email,
                assigned_at: assignment.assigned_at,
            });
        }
    }
    Ok(Json(students))
}
