// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state lives in a single embedded redb database.
//!
//! ## Layout
//!
//! ```text
//! database.rs          # tables, StorageError, transaction helpers
//! repository/
//!   accounts.rs        # accounts + email / Clerk id indexes
//!   rbac.rs            # permissions, roles, account ↔ role sets
//!   teacher_codes.rs   # invitation codes granting the teacher role
//!   assignments.rs     # admin-made teacher ↔ student pairings
//!   access.rs          # student → teacher content access grants
//! ```

pub mod database;
pub mod repository;

pub use database::{Database, StorageError, StorageResult};
pub use repository::{
    AccessRepository, AccountRepository, AssignmentRepository, RbacRepository,
    TeacherCodeRepository,
};
