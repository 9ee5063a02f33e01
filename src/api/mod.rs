// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP routes.
//!
//! | Group | Guard |
//! |-------|-------|
//! | health, code validation, signup, webhook | none |
//! | `/v1/users/me*`, `/v1/teacher-codes/assign` | authenticated |
//! | `/v1/users/me/students` | `teacher:students:view` |
//! | `/v1/teacher-codes/mine` | role `teacher` or `admin` |
//! | `/v1/admin/*` | `admin:users:manage` |

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{
        authenticate, enforce, require_permission, require_role,
        roles::permissions::{ADMIN_USERS_MANAGE, TEACHER_STUDENTS_VIEW},
        BuiltinRole, Requirement,
    },
    error::ErrorBody,
    models::{
        AccessibleTeacher, AdminUserItem, AdminUserListResponse, AssignTeacherCodeRequest,
        AssignTeacherCodeResponse, AssignedStudent, CompleteSignupRequest, CompleteSignupResponse,
        CreateAssignmentRequest, CreateTeacherCodeRequest, CurrentUserResponse,
        GrantAccessRequest, OwnTeacherCodeResponse, RoleChangeResponse, SignupWithCodeRequest,
        SignupWithCodeResponse, TeacherCodeDetails, TeacherCodeRequest, TeacherCodeValidity,
        UserData,
    },
    state::AppState,
    storage::repository::{
        CodeStatus, StoredAccess, StoredAssignment, StoredPermission, StoredRole,
    },
    webhooks::SyncOutcome,
};

pub mod admin;
pub mod health;
pub mod teacher_codes;
pub mod users;
pub mod webhooks;

const TEACHING_ROLES: &[&str] = &[BuiltinRole::Teacher.as_str(), BuiltinRole::Admin.as_str()];

/// Wrap `routes` so `requirement` is checked after authentication.
fn guarded(routes: Router<AppState>, state: &AppState, requirement: Requirement) -> Router<AppState> {
    routes
        .route_layer(from_fn_with_state(requirement, enforce))
        .route_layer(from_fn_with_state(state.clone(), authenticate))
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/teacher-codes/validate", post(teacher_codes::validate_teacher_code))
        .route("/teacher-codes/signup", post(teacher_codes::signup_with_code))
        .route(
            "/teacher-codes/complete-signup",
            post(teacher_codes::complete_signup),
        )
        .route("/webhooks/clerk", post(webhooks::clerk_webhook));

    let authenticated = Router::new()
        .route("/users/me", get(users::get_current_user))
        .route("/users/me/teachers", get(users::list_accessible_teachers))
        .route("/teacher-codes/assign", post(teacher_codes::assign_teacher_code))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    let student_viewers = guarded(
        Router::new().route("/users/me/students", get(users::list_assigned_students)),
        &state,
        require_permission(TEACHER_STUDENTS_VIEW),
    );

    let teachers = guarded(
        Router::new().route("/teacher-codes/mine", get(teacher_codes::get_own_teacher_code)),
        &state,
        require_role(TEACHING_ROLES),
    );

    let admin_routes = guarded(
        Router::new()
            .route("/admin/users", get(admin::list_users))
            .route("/admin/roles", get(admin::list_roles))
            .route("/admin/permissions", get(admin::list_permissions))
            .route(
                "/admin/users/{user_id}/roles/{role_name}",
                post(admin::assign_role).delete(admin::remove_role),
            )
            .route(
                "/admin/teacher-codes",
                get(admin::list_teacher_codes).post(admin::create_teacher_code),
            )
            .route(
                "/admin/teacher-codes/{code}/deactivate",
                post(admin::deactivate_teacher_code),
            )
            .route(
                "/admin/teacher-assignments",
                get(admin::list_assignments).post(admin::create_assignment),
            )
            .route(
                "/admin/teacher-assignments/{assignment_id}",
                delete(admin::delete_assignment),
            )
            .route("/admin/student-access", post(admin::grant_access))
            .route(
                "/admin/student-access/{student_id}/{teacher_id}",
                delete(admin::revoke_access),
            ),
        &state,
        require_permission(ADMIN_USERS_MANAGE),
    );

    let v1_routes = public
        .merge(authenticated)
        .merge(student_viewers)
        .merge(teachers)
        .merge(admin_routes);

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        users::get_current_user,
        users::list_accessible_teachers,
        users::list_assigned_students,
        teacher_codes::validate_teacher_code,
        teacher_codes::signup_with_code,
        teacher_codes::complete_signup,
        teacher_codes::assign_teacher_code,
        teacher_codes::get_own_teacher_code,
        admin::list_users,
        admin::list_roles,
        admin::list_permissions,
        admin::assign_role,
        admin::remove_role,
        admin::list_teacher_codes,
        admin::create_teacher_code,
        admin::deactivate_teacher_code,
        admin::list_assignments,
        admin::create_assignment,
        admin::delete_assignment,
        admin::grant_access,
        admin::revoke_access,
        webhooks::clerk_webhook
    ),
    components(
        schemas(
            ErrorBody,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            CurrentUserResponse,
            AccessibleTeacher,
            AssignedStudent,
            UserData,
            TeacherCodeRequest,
            TeacherCodeValidity,
            SignupWithCodeRequest,
            SignupWithCodeResponse,
            CompleteSignupRequest,
            CompleteSignupResponse,
            AssignTeacherCodeRequest,
            AssignTeacherCodeResponse,
            OwnTeacherCodeResponse,
            AdminUserItem,
            AdminUserListResponse,
            RoleChangeResponse,
            CreateTeacherCodeRequest,
            TeacherCodeDetails,
            CodeStatus,
            CreateAssignmentRequest,
            GrantAccessRequest,
            StoredRole,
            StoredPermission,
            StoredAssignment,
            StoredAccess,
            SyncOutcome,
            webhooks::WebhookAck
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Users", description = "The calling account"),
        (name = "Teacher Codes", description = "Teacher invitation codes"),
        (name = "Admin", description = "Role, code, assignment and access management"),
        (name = "Webhooks", description = "Identity provider events")
    )
)]
struct ApiDoc;
