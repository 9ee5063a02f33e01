// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the database.
//!
//! Each repository borrows the [`Database`](super::Database) and exposes the
//! operations for one entity type. Multi-entity invariants (for example
//! teacher-code consumption) are enforced inside a single write transaction
//! using the crate-private `*_in` helpers.

pub mod access;
pub mod accounts;
pub mod assignments;
pub mod rbac;
pub mod teacher_codes;

pub use access::{AccessRepository, StoredAccess};
pub use accounts::{normalize_email, AccountRepository, ExternalIdentity, LinkOutcome, StoredAccount};
pub use assignments::{AssignmentRepository, StoredAssignment};
pub use rbac::{Grants, RbacRepository, StoredPermission, StoredRole};
pub use teacher_codes::{
    CodeRejection, CodeStatus, ConsumeTarget, Consumption, NewTeacherCode, StoredTeacherCode,
    TeacherCodeRepository,
};
