// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded access-control database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `accounts`: account id → serialized StoredAccount
//! - `accounts_by_email`: normalized email → account id
//! - `accounts_by_external_id`: Clerk user id → account id
//! - `permissions`: permission name → serialized StoredPermission
//! - `roles`: role name → serialized StoredRole (including permission names)
//! - `account_roles`: account id → serialized set of role names
//! - `teacher_codes`: code → serialized StoredTeacherCode
//! - `teacher_assignments`: assignment id → serialized StoredAssignment
//! - `teacher_assignment_pairs`: `teacher_id|student_id` → assignment id
//! - `student_teacher_access`: `student_id|teacher_id` → serialized StoredAccess
//!
//! redb allows a single write transaction at a time, so every
//! read-modify-write done inside one `begin_write` is serialized against all
//! other writers.

use std::path::Path;

use redb::{ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::{de::DeserializeOwned, Serialize};

use super::repository::teacher_codes::CodeRejection;

// =============================================================================
// Table Definitions
// =============================================================================

pub(crate) const ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");

pub(crate) const ACCOUNTS_BY_EMAIL: TableDefinition<&str, &str> =
    TableDefinition::new("accounts_by_email");

pub(crate) const ACCOUNTS_BY_EXTERNAL_ID: TableDefinition<&str, &str> =
    TableDefinition::new("accounts_by_external_id");

pub(crate) const PERMISSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("permissions");

pub(crate) const ROLES: TableDefinition<&str, &[u8]> = TableDefinition::new("roles");

pub(crate) const ACCOUNT_ROLES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("account_roles");

pub(crate) const TEACHER_CODES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("teacher_codes");

pub(crate) const TEACHER_ASSIGNMENTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("teacher_assignments");

/// Key format: `teacher_id|student_id`.
pub(crate) const TEACHER_ASSIGNMENT_PAIRS: TableDefinition<&str, &str> =
    TableDefinition::new("teacher_assignment_pairs");

/// Key format: `student_id|teacher_id`.
pub(crate) const STUDENT_TEACHER_ACCESS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("student_teacher_access");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    /// A business rule refused the operation.
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    CodeRejected(CodeRejection),

    /// The seeded role catalog is missing something the code relies on.
    #[error("role catalog misconfigured: {0}")]
    Catalog(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Database
// =============================================================================

/// Embedded ACID database holding accounts, roles and teacher codes.
pub struct Database {
    db: redb::Database,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = redb::Database::create(path)?;
        Self::init(db)
    }

    /// Create a database that lives only in memory.
    pub fn in_memory() -> StorageResult<Self> {
        let db = redb::Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: redb::Database) -> StorageResult<Self> {
        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ACCOUNTS)?;
            let _ = write_txn.open_table(ACCOUNTS_BY_EMAIL)?;
            let _ = write_txn.open_table(ACCOUNTS_BY_EXTERNAL_ID)?;
            let _ = write_txn.open_table(PERMISSIONS)?;
            let _ = write_txn.open_table(ROLES)?;
            let _ = write_txn.open_table(ACCOUNT_ROLES)?;
            let _ = write_txn.open_table(TEACHER_CODES)?;
            let _ = write_txn.open_table(TEACHER_ASSIGNMENTS)?;
            let _ = write_txn.open_table(TEACHER_ASSIGNMENT_PAIRS)?;
            let _ = write_txn.open_table(STUDENT_TEACHER_ACCESS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    pub(crate) fn read(&self) -> StorageResult<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    pub(crate) fn write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Run `f` inside a single write transaction, committing only on success.
    pub(crate) fn transaction<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&WriteTransaction) -> StorageResult<T>,
    {
        let write_txn = self.write()?;
        let value = f(&write_txn)?;
        write_txn.commit()?;
        Ok(value)
    }

    /// Whether a read transaction can be opened.
    pub fn is_healthy(&self) -> bool {
        self.db.begin_read().is_ok()
    }
}

// =============================================================================
// JSON Helpers
// =============================================================================

pub(crate) fn to_json<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read and deserialize a JSON value. The access guard is released before
/// returning, so the caller may write to the same table afterwards.
pub(crate) fn get_json<T, Tbl>(table: &Tbl, key: &str) -> StorageResult<Option<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(value) => Ok(Some(from_json(value.value())?)),
        None => Ok(None),
    }
}

/// Read a string value (index tables).
pub(crate) fn get_str<Tbl>(table: &Tbl, key: &str) -> StorageResult<Option<String>>
where
    Tbl: ReadableTable<&'static str, &'static str>,
{
    Ok(table.get(key)?.map(|value| value.value().to_string()))
}

/// Deserialize every value in a JSON table, in key order.
pub(crate) fn all_json<T, Tbl>(table: &Tbl) -> StorageResult<Vec<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let mut items = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        items.push(from_json(value.value())?);
    }
    Ok(items)
}

/// Composite key for pair tables.
pub(crate) fn pair_key(left: &str, right: &str) -> String {
    format!("{left}|{right}")
}

// =============================================================================
// Tests
// =============================================================================
