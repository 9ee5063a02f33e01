// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Built-in roles and the permission catalog.
//!
//! Permissions follow the `resource:action` naming convention. The catalog
//! and the three built-in roles are written to the database by
//! [`RbacRepository::seed`](crate::storage::repository::RbacRepository::seed).

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Permission names.
pub mod permissions {
    pub const USER_READ: &str = "user:read";
    pub const USER_WRITE: &str = "user:write";
    pub const USER_DELETE: &str = "user:delete";
    pub const COURSE_READ: &str = "course:read";
    pub const COURSE_WRITE: &str = "course:write";
    pub const COURSE_DELETE: &str = "course:delete";
    pub const PROGRESS_READ: &str = "progress:read";
    pub const PROGRESS_WRITE: &str = "progress:write";
    pub const CHAT_READ: &str = "chat:read";
    pub const CHAT_WRITE: &str = "chat:write";
    pub const CHAT_DELETE: &str = "chat:delete";
    pub const NOTE_READ: &str = "note:read";
    pub const NOTE_WRITE: &str = "note:write";
    pub const NOTE_DELETE: &str = "note:delete";
    pub const ADMIN_USERS_MANAGE: &str = "admin:users:manage";
    pub const ADMIN_COURSES_MANAGE: &str = "admin:courses:manage";
    pub const ADMIN_SYSTEM_MANAGE: &str = "admin:system:manage";
    pub const TEACHER_CODES_MANAGE: &str = "teacher:codes:manage";
    pub const TEACHER_STUDENTS_VIEW: &str = "teacher:students:view";
}

use permissions::*;

/// Every permission known to the system, with its description.
pub const PERMISSION_CATALOG: &[(&str, &str)] = &[
    (USER_READ, "Read user information"),
    (USER_WRITE, "Modify user information"),
    (USER_DELETE, "Delete user account"),
    (COURSE_READ, "Read course information"),
    (COURSE_WRITE, "Create or modify courses"),
    (COURSE_DELETE, "Delete courses"),
    (PROGRESS_READ, "Read progress information"),
    (PROGRESS_WRITE, "Update progress information"),
    (CHAT_READ, "Read chat messages"),
    (CHAT_WRITE, "Send chat messages"),
    (CHAT_DELETE, "Delete chat messages"),
    (NOTE_READ, "Read notes"),
    (NOTE_WRITE, "Create or modify notes"),
    (NOTE_DELETE, "Delete notes"),
    (ADMIN_USERS_MANAGE, "Manage users and roles"),
    (ADMIN_COURSES_MANAGE, "Manage all courses"),
    (ADMIN_SYSTEM_MANAGE, "Manage system settings"),
    (TEACHER_CODES_MANAGE, "Manage teacher codes"),
    (TEACHER_STUDENTS_VIEW, "View assigned students"),
];

const TEACHER_PERMISSIONS: &[&str] = &[
    USER_READ,
    COURSE_READ,
    COURSE_WRITE,
    PROGRESS_READ,
    CHAT_READ,
    CHAT_WRITE,
    NOTE_READ,
    TEACHER_CODES_MANAGE,
    TEACHER_STUDENTS_VIEW,
];

const USER_PERMISSIONS: &[&str] = &[
    USER_READ,
    USER_WRITE,
    COURSE_READ,
    PROGRESS_READ,
    PROGRESS_WRITE,
    CHAT_READ,
    CHAT_WRITE,
    NOTE_READ,
    NOTE_WRITE,
    NOTE_DELETE,
];

/// Roles created at seed time.
///
/// Accounts may also hold roles created later by name; this enum only covers
/// the ones the service itself depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinRole {
    /// Every permission in the catalog
    Admin,
    /// Granted exclusively by consuming a teacher code
    Teacher,
    /// Baseline learner role, marked as the default role
    User,
}

impl BuiltinRole {
    pub const ALL: [BuiltinRole; 3] = [BuiltinRole::Admin, BuiltinRole::Teacher, BuiltinRole::User];

    pub const fn as_str(&self) -> &'static str {
        match self {
            BuiltinRole::Admin => "admin",
            BuiltinRole::Teacher => "teacher",
            BuiltinRole::User => "user",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BuiltinRole::Admin => "Administrator role",
            BuiltinRole::Teacher => "Teacher role",
            BuiltinRole::User => "Default user role",
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, BuiltinRole::User)
    }

    /// Permission names granted to this role at seed time.
    pub fn permissions(&self) -> Vec<&'static str> {
        match self {
            BuiltinRole::Admin => PERMISSION_CATALOG.iter().map(|(name, _)| *name).collect(),
            BuiltinRole::Teacher => TEACHER_PERMISSIONS.to_vec(),
            BuiltinRole::User => USER_PERMISSIONS.to_vec(),
        }
    }
}

impl std::fmt::Display for BuiltinRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
