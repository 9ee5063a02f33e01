// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account repository.
//!
//! Accounts are keyed by a UUID and indexed by normalized email and by the
//! Clerk user id. Both indexes are unique; every write goes through
//! [`insert_in`] / [`update_in`] so the indexes never drift from the primary
//! table.

use chrono::{DateTime, Utc};
use redb::{ReadableTable, ReadableTableMetadata, WriteTransaction};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use super::super::database::{
    get_json, get_str, to_json, Database, StorageError, StorageResult, ACCOUNTS,
    ACCOUNTS_BY_EMAIL, ACCOUNTS_BY_EXTERNAL_ID, ACCOUNT_ROLES,
};
use super::{access, assignments, teacher_codes};

/// Account stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredAccount {
    /// Unique account identifier (UUID)
    pub id: String,
    /// Normalized email address (unique)
    pub email: String,
    /// Display name
    pub name: String,
    pub is_verified: bool,
    pub is_active: bool,
    /// Clerk user id, once the account has been linked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clerk_user_id: Option<String>,
    /// Argon2 PHC string for accounts created with a password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

impl StoredAccount {
    /// New active, unverified account with a fresh id.
    pub fn new(email: &str, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email: normalize_email(email),
            name: name.into(),
            is_verified: false,
            is_active: true,
            clerk_user_id: None,
            password_hash: None,
            created_at: now,
            last_login_at: None,
        }
    }
}

/// Identity asserted by the external provider.
#[derive(Debug, Clone, Copy)]
pub struct ExternalIdentity<'a> {
    pub external_id: &'a str,
    pub email: &'a str,
    pub name: &'a str,
    pub email_verified: bool,
}

/// Result of [`AccountRepository::link_or_create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Already linked to the identity
    Existing(StoredAccount),
    /// Found by email and linked
    Linked(StoredAccount),
    Created(StoredAccount),
}

impl LinkOutcome {
    pub fn account(&self) -> &StoredAccount {
        match self {
            LinkOutcome::Existing(a) | LinkOutcome::Linked(a) | LinkOutcome::Created(a) => a,
        }
    }

    pub fn into_account(self) -> StoredAccount {
        match self {
            LinkOutcome::Existing(a) | LinkOutcome::Linked(a) | LinkOutcome::Created(a) => a,
        }
    }
}

/// Canonical form used for storage and lookups: NFKC, trimmed, lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().nfkc().collect::<String>().to_lowercase()
}

/// Repository for account operations.
pub struct AccountRepository<'a> {
    db: &'a Database,
}

impl<'a> AccountRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Get an account by ID.
    pub fn get(&self, account_id: &str) -> StorageResult<StoredAccount> {
        self.find(account_id)?
            .ok_or_else(|| StorageError::NotFound(format!("Account {account_id} not found")))
    }

    pub fn find(&self, account_id: &str) -> StorageResult<Option<StoredAccount>> {
        let read_txn = self.db.read()?;
        let table = read_txn.open_table(ACCOUNTS)?;
        get_json(&table, account_id)
    }

    pub fn find_by_email(&self, email: &str) -> StorageResult<Option<StoredAccount>> {
        let read_txn = self.db.read()?;
        let index = read_txn.open_table(ACCOUNTS_BY_EMAIL)?;
        let Some(account_id) = get_str(&index, &normalize_email(email))? else {
            return Ok(None);
        };
        let table = read_txn.open_table(ACCOUNTS)?;
        get_json(&table, &account_id)
    }

    pub fn find_by_external_id(&self, clerk_user_id: &str) -> StorageResult<Option<StoredAccount>> {
        let read_txn = self.db.read()?;
        let index = read_txn.open_table(ACCOUNTS_BY_EXTERNAL_ID)?;
        let Some(account_id) = get_str(&index, clerk_user_id)? else {
            return Ok(None);
        };
        let table = read_txn.open_table(ACCOUNTS)?;
        get_json(&table, &account_id)
    }

    /// Create a new account. Fails with `AlreadyExists` on a duplicate email
    /// or Clerk user id.
    pub fn create(&self, account: &StoredAccount) -> StorageResult<()> {
        self.db.transaction(|txn| insert_in(txn, account))
    }

    /// Replace an existing account, keeping the indexes in sync.
    pub fn update(&self, account: &StoredAccount) -> StorageResult<()> {
        self.db.transaction(|txn| update_in(txn, account))
    }

    /// Hard-delete an account together with its role set, assignments and
    /// access grants. Returns `false` when the account did not exist.
    pub fn delete(&self, account_id: &str) -> StorageResult<bool> {
        self.db.transaction(|txn| delete_in(txn, account_id))
    }

    /// Page through accounts in id order.
    pub fn list(&self, skip: usize, limit: usize) -> StorageResult<Vec<StoredAccount>> {
        let read_txn = self.db.read()?;
        let table = read_txn.open_table(ACCOUNTS)?;
        let mut accounts = Vec::with_capacity(limit.min(256));
        for entry in table.iter()?.skip(skip).take(limit) {
            let (_, value) = entry?;
            accounts.push(serde_json::from_slice(value.value())?);
        }
        Ok(accounts)
    }

    pub fn count(&self) -> StorageResult<u64> {
        let read_txn = self.db.read()?;
        let table = read_txn.open_table(ACCOUNTS)?;
        Ok(table.len()?)
    }

    /// Record a successful sign-in.
    pub fn touch_login(&self, account_id: &str, now: DateTime<Utc>) -> StorageResult<()> {
        self.db.transaction(|txn| {
            let mut account = get_in(txn, account_id)?
                .ok_or_else(|| StorageError::NotFound(format!("Account {account_id} not found")))?;
            account.last_login_at = Some(now);
            update_in(txn, &account)
        })
    }

    /// Find the account for an external identity, linking an account with
    /// the same email or creating a new one when none is linked yet.
    ///
    /// Runs in one write transaction so concurrent first requests for the
    /// same subject produce a single account.
    pub fn link_or_create(
        &self,
        identity: &ExternalIdentity<'_>,
        now: DateTime<Utc>,
    ) -> StorageResult<LinkOutcome> {
        self.db.transaction(|txn| {
            if let Some(account) = find_by_external_id_in(txn, identity.external_id)? {
                return Ok(LinkOutcome::Existing(account));
            }

            if let Some(mut account) = find_by_email_in(txn, identity.email)? {
                if let Some(previous) = account.clerk_user_id.as_deref() {
                    tracing::warn!(
                        account_id = %account.id,
                        previous = %previous,
                        current = %identity.external_id,
                        "Relinking account to a different external identity"
                    );
                }
                account.clerk_user_id = Some(identity.external_id.to_string());
                account.is_verified |= identity.email_verified;
                update_in(txn, &account)?;
                return Ok(LinkOutcome::Linked(account));
            }

            let mut account = StoredAccount::new(identity.email, identity.name, now);
            account.clerk_user_id = Some(identity.external_id.to_string());
            account.is_verified = identity.email_verified;
            insert_in(txn, &account)?;
            Ok(LinkOutcome::Created(account))
        })
    }

    /// Update the display name of the account linked to `clerk_user_id`.
    /// Returns `None` when no account is linked.
    pub fn rename_by_external_id(
        &self,
        clerk_user_id: &str,
        name: &str,
    ) -> StorageResult<Option<StoredAccount>> {
        self.db.transaction(|txn| {
            let Some(mut account) = find_by_external_id_in(txn, clerk_user_id)? else {
                return Ok(None);
            };
            if account.name != name {
                account.name = name.to_string();
                update_in(txn, &account)?;
            }
            Ok(Some(account))
        })
    }

    /// Copy profile data from the identity provider onto an account.
    ///
    /// `verified_email` replaces the stored email and marks the account
    /// verified; it is skipped (with a warning) when another account owns it.
    pub fn apply_profile(
        &self,
        account_id: &str,
        name: Option<&str>,
        verified_email: Option<&str>,
    ) -> StorageResult<StoredAccount> {
        self.db.transaction(|txn| {
            let mut account = get_in(txn, account_id)?
                .ok_or_else(|| StorageError::NotFound(format!("Account {account_id} not found")))?;

            if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
                account.name = name.to_string();
            }
            if let Some(email) = verified_email {
                let email = normalize_email(email);
                match find_by_email_in(txn, &email)? {
                    Some(owner) if owner.id != account.id => {
                        tracing::warn!(
                            account_id = %account.id,
                            "Verified email belongs to another account, keeping stored email"
                        );
                    }
                    _ => {
                        account.email = email;
                        account.is_verified = true;
                    }
                }
            }

            update_in(txn, &account)?;
            Ok(account)
        })
    }

    /// Hard-delete the account linked to `clerk_user_id`, if any.
    pub fn delete_by_external_id(&self, clerk_user_id: &str) -> StorageResult<Option<String>> {
        self.db.transaction(|txn| {
            let Some(account) = find_by_external_id_in(txn, clerk_user_id)? else {
                return Ok(None);
            };
            delete_in(txn, &account.id)?;
            Ok(Some(account.id))
        })
    }
}

// =============================================================================
// Transaction-scoped helpers
// =============================================================================

pub(crate) fn get_in(txn: &WriteTransaction, account_id: &str) -> StorageResult<Option<StoredAccount>> {
    let table = txn.open_table(ACCOUNTS)?;
    get_json(&table, account_id)
}

pub(crate) fn find_by_email_in(
    txn: &WriteTransaction,
    email: &str,
) -> StorageResult<Option<StoredAccount>> {
    let account_id = {
        let index = txn.open_table(ACCOUNTS_BY_EMAIL)?;
        get_str(&index, &normalize_email(email))?
    };
    match account_id {
        Some(id) => get_in(txn, &id),
        None => Ok(None),
    }
}

pub(crate) fn find_by_external_id_in(
    txn: &WriteTransaction,
    clerk_user_id: &str,
) -> StorageResult<Option<StoredAccount>> {
    let account_id = {
        let index = txn.open_table(ACCOUNTS_BY_EXTERNAL_ID)?;
        get_str(&index, clerk_user_id)?
    };
    match account_id {
        Some(id) => get_in(txn, &id),
        None => Ok(None),
    }
}

pub(crate) fn insert_in(txn: &WriteTransaction, account: &StoredAccount) -> StorageResult<()> {
    let email = normalize_email(&account.email);

    let mut table = txn.open_table(ACCOUNTS)?;
    if table.get(account.id.as_str())?.is_some() {
        return Err(StorageError::AlreadyExists(format!("Account {} already exists", account.id)));
    }

    let mut by_email = txn.open_table(ACCOUNTS_BY_EMAIL)?;
    if by_email.get(email.as_str())?.is_some() {
        return Err(StorageError::AlreadyExists(format!("Account with email {email} already exists")));
    }

    let mut by_external = txn.open_table(ACCOUNTS_BY_EXTERNAL_ID)?;
    if let Some(clerk_id) = account.clerk_user_id.as_deref() {
        if by_external.get(clerk_id)?.is_some() {
            return Err(StorageError::AlreadyExists(format!(
                "External identity {clerk_id} is already linked"
            )));
        }
        by_external.insert(clerk_id, account.id.as_str())?;
    }

    let mut stored = account.clone();
    stored.email = email;
    let json = to_json(&stored)?;
    table.insert(stored.id.as_str(), json.as_slice())?;
    by_email.insert(stored.email.as_str(), stored.id.as_str())?;
    Ok(())
}

pub(crate) fn update_in(txn: &WriteTransaction, account: &StoredAccount) -> StorageResult<()> {
    let previous = get_in(txn, &account.id)?
        .ok_or_else(|| StorageError::NotFound(format!("Account {} not found", account.id)))?;

    let mut stored = account.clone();
    stored.email = normalize_email(&account.email);

    if stored.email != previous.email {
        let mut by_email = txn.open_table(ACCOUNTS_BY_EMAIL)?;
        let owner = get_str(&by_email, &stored.email)?;
        if owner.is_some_and(|owner| owner != stored.id) {
            return Err(StorageError::AlreadyExists(format!(
                "Account with email {} already exists",
                stored.email
            )));
        }
        by_email.remove(previous.email.as_str())?;
        by_email.insert(stored.email.as_str(), stored.id.as_str())?;
    }

    if stored.clerk_user_id != previous.clerk_user_id {
        let mut by_external = txn.open_table(ACCOUNTS_BY_EXTERNAL_ID)?;
        if let Some(clerk_id) = stored.clerk_user_id.as_deref() {
            let owner = get_str(&by_external, clerk_id)?;
            if owner.is_some_and(|owner| owner != stored.id) {
                return Err(StorageError::AlreadyExists(format!(
                    "External identity {clerk_id} is already linked"
                )));
            }
        }
        if let Some(old) = previous.clerk_user_id.as_deref() {
            by_external.remove(old)?;
        }
        if let Some(clerk_id) = stored.clerk_user_id.as_deref() {
            by_external.insert(clerk_id, stored.id.as_str())?;
        }
    }

    let json = to_json(&stored)?;
    let mut table = txn.open_table(ACCOUNTS)?;
    table.insert(stored.id.as_str(), json.as_slice())?;
    Ok(())
}

pub(crate) fn delete_in(txn: &WriteTransaction, account_id: &str) -> StorageResult<bool> {
    let Some(account) = get_in(txn, account_id)? else {
        return Ok(false);
    };

    {
        let mut table = txn.open_table(ACCOUNTS)?;
        table.remove(account_id)?;
        let mut by_email = txn.open_table(ACCOUNTS_BY_EMAIL)?;
        by_email.remove(account.email.as_str())?;
        if let Some(clerk_id) = account.clerk_user_id.as_deref() {
            let mut by_external = txn.open_table(ACCOUNTS_BY_EXTERNAL_ID)?;
            by_external.remove(clerk_id)?;
        }
        let mut roles = txn.open_table(ACCOUNT_ROLES)?;
        roles.remove(account_id)?;
    }

    assignments::purge_account_in(txn, account_id)?;
    access::purge_account_in(txn, account_id)?;
    teacher_codes::release_owner_in(txn, account_id)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("accounts.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn normalize_email_folds_case_and_width() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
        // Fullwidth characters fold under NFKC
        assert_eq!(normalize_email("ｂｏｂ@example.com"), "bob@example.com");
    }

    #[test]
    fn create_and_lookup_by_all_keys() {
        let (db, _dir) = temp_db();
        let repo = AccountRepository::new(&db);

        let mut account = StoredAccount::new("Teacher@Example.com", "Ada", Utc::now());
        account.clerk_user_id = Some("user_1".into());
        repo.create(&account).unwrap();

        assert_eq!(repo.get(&account.id).unwrap().email, "teacher@example.com");
        assert_eq!(
            repo.find_by_email("TEACHER@example.com").unwrap().unwrap().id,
            account.id
        );
        assert_eq!(
            repo.find_by_external_id("user_1").unwrap().unwrap().id,
            account.id
        );
    }

    #[test]
    fn duplicate_email_rejected() {
        let (db, _dir) = temp_db();
        let repo = AccountRepository::new(&db);

        repo.create(&StoredAccount::new("a@example.com", "A", Utc::now()))
            .unwrap();
        let result = repo.create(&StoredAccount::new("A@example.com", "B", Utc::now()));
        assert!(matches!(result, Err(StorageError::AlreadyExists(_))));
    }

    #[test]
    fn update_moves_indexes() {
        let (db, _dir) = temp_db();
        let repo = AccountRepository::new(&db);

        let mut account = StoredAccount::new("old@example.com", "A", Utc::now());
        repo.create(&account).unwrap();

        account.email = "new@example.com".into();
        account.clerk_user_id = Some("user_9".into());
        repo.update(&account).unwrap();

        assert!(repo.find_by_email("old@example.com").unwrap().is_none());
        assert!(repo.find_by_email("new@example.com").unwrap().is_some());
        assert!(repo.find_by_external_id("user_9").unwrap().is_some());
    }

    #[test]
    fn update_rejects_taken_external_id() {
        let (db, _dir) = temp_db();
        let repo = AccountRepository::new(&db);

        let mut first = StoredAccount::new("one@example.com", "One", Utc::now());
        first.clerk_user_id = Some("user_1".into());
        repo.create(&first).unwrap();

        let mut second = StoredAccount::new("two@example.com", "Two", Utc::now());
        repo.create(&second).unwrap();
        second.clerk_user_id = Some("user_1".into());
        assert!(matches!(
            repo.update(&second),
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[test]
    fn delete_removes_indexes() {
        let (db, _dir) = temp_db();
        let repo = AccountRepository::new(&db);

        let mut account = StoredAccount::new("gone@example.com", "Gone", Utc::now());
        account.clerk_user_id = Some("user_gone".into());
        repo.create(&account).unwrap();

        assert!(repo.delete(&account.id).unwrap());
        assert!(!repo.delete(&account.id).unwrap());
        assert!(repo.find_by_email("gone@example.com").unwrap().is_none());
        assert!(repo.find_by_external_id("user_gone").unwrap().is_none());

        // Email becomes reusable
        repo.create(&StoredAccount::new("gone@example.com", "Again", Utc::now()))
            .unwrap();
    }

    #[test]
    fn list_paginates() {
        let (db, _dir) = temp_db();
        let repo = AccountRepository::new(&db);
        for i in 0..5 {
            repo.create(&StoredAccount::new(&format!("u{i}@example.com"), "U", Utc::now()))
                .unwrap();
        }

        assert_eq!(repo.count().unwrap(), 5);
        assert_eq!(repo.list(0, 2).unwrap().len(), 2);
        assert_eq!(repo.list(4, 100).unwrap().len(), 1);
        assert!(repo.list(10, 100).unwrap().is_empty());
    }

    #[test]
    fn touch_login_sets_timestamp() {
        let (db, _dir) = temp_db();
        let repo = AccountRepository::new(&db);
        let account = StoredAccount::new("t@example.com", "T", Utc::now());
        repo.create(&account).unwrap();

        let now = Utc::now();
        repo.touch_login(&account.id, now).unwrap();
        assert_eq!(repo.get(&account.id).unwrap().last_login_at, Some(now));
    }

    fn identity<'a>(external_id: &'a str, email: &'a str) -> ExternalIdentity<'a> {
        ExternalIdentity {
            external_id,
            email,
            name: "Linked",
            email_verified: true,
        }
    }

    #[test]
    fn link_or_create_is_idempotent() {
        let (db, _dir) = temp_db();
        let repo = AccountRepository::new(&db);

        let created = repo
            .link_or_create(&identity("user_1", "New@Ex.com"), Utc::now())
            .unwrap();
        let LinkOutcome::Created(account) = created else {
            panic!("expected a new account");
        };
        assert_eq!(account.email, "new@ex.com");
        assert!(account.is_verified);

        let again = repo
            .link_or_create(&identity("user_1", "new@ex.com"), Utc::now())
            .unwrap();
        assert_eq!(again, LinkOutcome::Existing(account));
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn link_or_create_links_by_email() {
        let (db, _dir) = temp_db();
        let repo = AccountRepository::new(&db);
        let invited = StoredAccount::new("invited@example.com", "Invited", Utc::now());
        repo.create(&invited).unwrap();

        let outcome = repo
            .link_or_create(&identity("user_2", "INVITED@example.com"), Utc::now())
            .unwrap();
        assert!(matches!(outcome, LinkOutcome::Linked(_)));
        assert_eq!(outcome.account().id, invited.id);
        // Name is kept from the invitation
        assert_eq!(outcome.account().name, "Invited");
        assert_eq!(
            repo.find_by_external_id("user_2").unwrap().unwrap().id,
            invited.id
        );
    }

    #[test]
    fn rename_and_delete_by_external_id() {
        let (db, _dir) = temp_db();
        let repo = AccountRepository::new(&db);
        assert!(repo.rename_by_external_id("user_none", "X").unwrap().is_none());
        assert!(repo.delete_by_external_id("user_none").unwrap().is_none());

        let account = repo
            .link_or_create(&identity("user_3", "r@example.com"), Utc::now())
            .unwrap()
            .into_account();
        let renamed = repo.rename_by_external_id("user_3", "Grace").unwrap().unwrap();
        assert_eq!(renamed.name, "Grace");

        assert_eq!(
            repo.delete_by_external_id("user_3").unwrap(),
            Some(account.id.clone())
        );
        assert!(repo.find(&account.id).unwrap().is_none());
        assert!(repo.delete_by_external_id("user_3").unwrap().is_none());
    }

    #[test]
    fn apply_profile_updates_name_and_email() {
        let (db, _dir) = temp_db();
        let repo = AccountRepository::new(&db);
        let account = StoredAccount::new("old@example.com", "Old", Utc::now());
        repo.create(&account).unwrap();
        repo.create(&StoredAccount::new("taken@example.com", "Other", Utc::now()))
            .unwrap();

        let updated = repo
            .apply_profile(&account.id, Some("Ada Lovelace"), Some("New@Example.com"))
            .unwrap();
        assert_eq!(updated.name, "Ada Lovelace");
        assert_eq!(updated.email, "new@example.com");
        assert!(updated.is_verified);

        // Email owned by someone else is left alone
        let kept = repo
            .apply_profile(&account.id, None, Some("taken@example.com"))
            .unwrap();
        assert_eq!(kept.email, "new@example.com");
        assert_eq!(kept.name, "Ada Lovelace");
    }
}
