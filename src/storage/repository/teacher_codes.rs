// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Teacher code repository.
//!
//! A teacher code is an invitation that, when consumed, replaces the
//! consuming account's roles with exactly `teacher`.
//!
//! ## Lifecycle
//!
//! ```text
//! active ──(use_count reaches max_uses > 0)──▶ exhausted
//!   │ └───(expires_at <= now)──────────────────▶ expired
//!   └─────(admin deactivates)──────────────────▶ deactivated
//! ```
//!
//! Consumption re-checks the status and increments `use_count` inside the
//! same redb write transaction as the role grant. redb serializes write
//! transactions, so two consumers of a single-use code cannot both succeed.

use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, Rng};
use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{
    all_json, get_json, to_json, Database, StorageError, StorageResult, TEACHER_CODES,
};
use super::accounts::{self, StoredAccount};
use super::rbac;
use crate::auth::roles::BuiltinRole;

/// Number of characters in a generated code.
pub const CODE_LENGTH: usize = 8;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Uses allowed for codes created through the self-service endpoint.
pub const SELF_SERVICE_MAX_USES: u32 = 1;

/// Observable state of a code at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CodeStatus {
    Active,
    Exhausted,
    Expired,
    Deactivated,
}

/// Why a code cannot be consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodeRejection {
    #[error("Invalid teacher code")]
    NotFound,
    #[error("Teacher code has expired")]
    Expired,
    #[error("Teacher code has reached maximum uses")]
    Exhausted,
    #[error("Teacher code is no longer active")]
    Inactive,
}

impl From<CodeRejection> for StorageError {
    fn from(reason: CodeRejection) -> Self {
        StorageError::CodeRejected(reason)
    }
}

/// Teacher code stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoredTeacherCode {
    pub id: String,
    /// User-facing code (uppercase alphanumeric)
    pub code: String,
    /// Owning teacher; set on first consumption when created unowned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<String>,
    /// Account that created the code (admin or self-service teacher)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Maximum consumptions; 0 means unlimited
    pub max_uses: u32,
    pub use_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl StoredTeacherCode {
    /// Status at `now`. Deactivation wins over expiry, expiry over exhaustion.
    ///
    /// A code is valid only while `now < expires_at`.
    pub fn status(&self, now: DateTime<Utc>) -> CodeStatus {
        if !self.is_active {
            CodeStatus::Deactivated
        } else if self.expires_at.is_some_and(|expires_at| expires_at <= now) {
            CodeStatus::Expired
        } else if self.max_uses > 0 && self.use_count >= self.max_uses {
            CodeStatus::Exhausted
        } else {
            CodeStatus::Active
        }
    }

    pub fn check(&self, now: DateTime<Utc>) -> Result<(), CodeRejection> {
        match self.status(now) {
            CodeStatus::Active => Ok(()),
            CodeStatus::Expired => Err(CodeRejection::Expired),
            CodeStatus::Exhausted => Err(CodeRejection::Exhausted),
            CodeStatus::Deactivated => Err(CodeRejection::Inactive),
        }
    }
}

/// Parameters for a new code.
#[derive(Debug, Clone, Default)]
pub struct NewTeacherCode {
    pub teacher_id: Option<String>,
    pub created_by: Option<String>,
    pub max_uses: u32,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Account that receives the teacher role.
#[derive(Debug, Clone)]
pub enum ConsumeTarget {
    /// An account that already exists.
    Existing(String),
    /// An account created in the same transaction as the consumption.
    NewAccount(StoredAccount),
}

/// Result of a successful consumption.
#[derive(Debug, Clone)]
pub struct Consumption {
    pub account: StoredAccount,
    pub code: StoredTeacherCode,
}

/// Generate a random code from a cryptographically secure source.
pub fn generate_code() -> String {
    let mut rng = OsRng;
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Codes are matched case-insensitively.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Repository for teacher code operations.
pub struct TeacherCodeRepository<'a> {
    db: &'a Database,
}

impl<'a> TeacherCodeRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn find(&self, code: &str) -> StorageResult<Option<StoredTeacherCode>> {
        let read_txn = self.db.read()?;
        let table = read_txn.open_table(TEACHER_CODES)?;
        get_json(&table, &normalize_code(code))
    }

    pub fn get(&self, code: &str) -> StorageResult<StoredTeacherCode> {
        self.find(code)?
            .ok_or_else(|| StorageError::NotFound(format!("Teacher code {code} not found")))
    }

    /// Check that a code exists and is consumable, without consuming it.
    pub fn validate(&self, code: &str, now: DateTime<Utc>) -> StorageResult<StoredTeacherCode> {
        let stored = self.find(code)?.ok_or(CodeRejection::NotFound)?;
        stored.check(now)?;
        Ok(stored)
    }

    /// Create a code with a fresh, non-colliding value.
    pub fn create(&self, new: NewTeacherCode, now: DateTime<Utc>) -> StorageResult<StoredTeacherCode> {
        self.create_with(new, now, generate_code)
    }

    fn create_with<G>(
        &self,
        new: NewTeacherCode,
        now: DateTime<Utc>,
        generate: G,
    ) -> StorageResult<StoredTeacherCode>
    where
        G: FnMut() -> String,
    {
        self.db.transaction(|txn| insert_new_in(txn, new, now, generate))
    }

    /// Return the teacher's newest active code, creating one if none is
    /// consumable. The flag is `true` when a new code was created.
    ///
    /// The scan and the insert share one write transaction, so concurrent
    /// callers for the same teacher end up with the same code.
    pub fn fetch_or_create_for_teacher(
        &self,
        teacher_id: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<(StoredTeacherCode, bool)> {
        self.db.transaction(|txn| {
            let existing = {
                let table = txn.open_table(TEACHER_CODES)?;
                all_json::<StoredTeacherCode, _>(&table)?
                    .into_iter()
                    .filter(|code| code.teacher_id.as_deref() == Some(teacher_id))
                    .filter(|code| code.status(now) == CodeStatus::Active)
                    .max_by_key(|code| code.created_at)
            };
            if let Some(code) = existing {
                return Ok((code, false));
            }

            let created = insert_new_in(
                txn,
                NewTeacherCode {
                    teacher_id: Some(teacher_id.to_string()),
                    created_by: Some(teacher_id.to_string()),
                    max_uses: SELF_SERVICE_MAX_USES,
                    expires_at: None,
                },
                now,
                generate_code,
            )?;
            Ok((created, true))
        })
    }

    pub fn list_all(&self) -> StorageResult<Vec<StoredTeacherCode>> {
        let read_txn = self.db.read()?;
        let table = read_txn.open_table(TEACHER_CODES)?;
        all_json(&table)
    }

    /// Permanently deactivate a code.
    pub fn deactivate(&self, code: &str) -> StorageResult<StoredTeacherCode> {
        let key = normalize_code(code);
        self.db.transaction(|txn| {
            let mut table = txn.open_table(TEACHER_CODES)?;
            let mut stored: StoredTeacherCode = get_json(&table, &key)?
                .ok_or_else(|| StorageError::NotFound(format!("Teacher code {key} not found")))?;
            stored.is_active = false;
            let json = to_json(&stored)?;
            table.insert(key.as_str(), json.as_slice())?;
            Ok(stored)
        })
    }

    /// Consume a code for `target`.
    ///
    /// In one write transaction: re-validate the code, create the account if
    /// requested, replace its roles with `teacher`, link the code owner if
    /// unset, and increment `use_count`. Nothing is written unless every step
    /// succeeds.
    pub fn consume(
        &self,
        code: &str,
        target: ConsumeTarget,
        now: DateTime<Utc>,
    ) -> StorageResult<Consumption> {
        let key = normalize_code(code);
        self.db.transaction(|txn| {
            let mut stored: StoredTeacherCode = {
                let table = txn.open_table(TEACHER_CODES)?;
                get_json(&table, &key)?.ok_or(CodeRejection::NotFound)?
            };
            stored.check(now)?;

            let account = match target {
                ConsumeTarget::Existing(account_id) => accounts::get_in(txn, &account_id)?
                    .ok_or_else(|| StorageError::NotFound(format!("Account {account_id} not found")))?,
                ConsumeTarget::NewAccount(account) => {
                    accounts::insert_in(txn, &account)?;
                    account
                }
            };

            rbac::replace_roles_in(txn, &account.id, &[BuiltinRole::Teacher.as_str()])?;

            if stored.teacher_id.is_none() {
                stored.teacher_id = Some(account.id.clone());
            }
            stored.use_count = stored.use_count.saturating_add(1);

            let json = to_json(&stored)?;
            let mut table = txn.open_table(TEACHER_CODES)?;
            table.insert(key.as_str(), json.as_slice())?;

            Ok(Consumption {
                account,
                code: stored,
            })
        })
    }
}

/// Insert a new code, regenerating the value until it does not collide.
fn insert_new_in<G>(
    txn: &WriteTransaction,
    new: NewTeacherCode,
    now: DateTime<Utc>,
    mut generate: G,
) -> StorageResult<StoredTeacherCode>
where
    G: FnMut() -> String,
{
    let mut table = txn.open_table(TEACHER_CODES)?;
    let code = loop {
        let candidate = generate();
        if table.get(candidate.as_str())?.is_none() {
            break candidate;
        }
        tracing::debug!("Teacher code collision, regenerating");
    };

    let stored = StoredTeacherCode {
        id: uuid::Uuid::new_v4().to_string(),
        code,
        teacher_id: new.teacher_id,
        created_by: new.created_by,
        max_uses: new.max_uses,
        use_count: 0,
        expires_at: new.expires_at,
        is_active: true,
        created_at: now,
    };
    let json = to_json(&stored)?;
    table.insert(stored.code.as_str(), json.as_slice())?;
    Ok(stored)
}

/// Deactivate every code owned by an account that is being deleted.
pub(crate) fn release_owner_in(txn: &WriteTransaction, account_id: &str) -> StorageResult<()> {
    let mut table = txn.open_table(TEACHER_CODES)?;
    let owned: Vec<StoredTeacherCode> = all_json::<StoredTeacherCode, _>(&table)?
        .into_iter()
        .filter(|code| code.teacher_id.as_deref() == Some(account_id) && code.is_active)
        .collect();

    for mut code in owned {
        code.is_active = false;
        let json = to_json(&code)?;
        table.insert(code.code.as_str(), json.as_slice())?;
    }
    Ok(())
}
