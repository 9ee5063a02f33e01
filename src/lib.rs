// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Classroom Access Server - RBAC authorization for an educational platform
//!
//! Validates identity tokens issued by Clerk, maps them to local accounts,
//! enforces role and permission checks per request and runs the teacher-code
//! onboarding workflow.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Token verification, identity resolution and request guards
//! - `storage` - Embedded redb store for accounts, roles and teacher codes
//! - `webhooks` - Identity-provider event synchronization

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod state;
pub mod storage;
pub mod webhooks;

#[cfg(test)]
mod test_support;
