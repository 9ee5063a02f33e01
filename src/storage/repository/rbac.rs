// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Roles, permissions and the account ↔ role mapping.
//!
//! Permissions are never granted to accounts directly. An account's
//! effective permission set is the union of the permissions of every role it
//! holds.

use std::collections::BTreeSet;

use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{
    get_json, to_json, Database, StorageError, StorageResult, ACCOUNTS, ACCOUNT_ROLES,
    PERMISSIONS, ROLES,
};
use crate::auth::roles::{BuiltinRole, PERMISSION_CATALOG};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoredPermission {
    /// `resource:action` name
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoredRole {
    pub name: String,
    pub description: String,
    /// Marks the baseline role for new accounts
    pub is_default: bool,
    /// Names of the permissions this role grants
    pub permissions: BTreeSet<String>,
}

/// Roles and effective permissions of one account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grants {
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
}

impl Grants {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Repository for RBAC operations.
pub struct RbacRepository<'a> {
    db: &'a Database,
}

impl<'a> RbacRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Write the permission catalog and the built-in roles.
    ///
    /// Idempotent: existing rows are kept, missing permissions are added to
    /// existing built-in roles.
    pub fn seed(&self) -> StorageResult<()> {
        self.db.transaction(|txn| {
            let mut permissions = txn.open_table(PERMISSIONS)?;
            for (name, description) in PERMISSION_CATALOG {
                if permissions.get(*name)?.is_none() {
                    let json = to_json(&StoredPermission {
                        name: name.to_string(),
                        description: description.to_string(),
                    })?;
                    permissions.insert(*name, json.as_slice())?;
                }
            }

            let mut roles = txn.open_table(ROLES)?;
            for builtin in BuiltinRole::ALL {
                let existing: Option<StoredRole> = get_json(&roles, builtin.as_str())?;
                let mut role = existing.unwrap_or_else(|| StoredRole {
                    name: builtin.as_str().to_string(),
                    description: builtin.description().to_string(),
                    is_default: builtin.is_default(),
                    permissions: BTreeSet::new(),
                });
                role.permissions
                    .extend(builtin.permissions().into_iter().map(str::to_string));
                let json = to_json(&role)?;
                roles.insert(builtin.as_str(), json.as_slice())?;
            }
            Ok(())
        })?;

        tracing::info!(
            permissions = PERMISSION_CATALOG.len(),
            roles = BuiltinRole::ALL.len(),
            "RBAC catalog seeded"
        );
        Ok(())
    }

    pub fn list_permissions(&self, skip: usize, limit: usize) -> StorageResult<Vec<StoredPermission>> {
        let read_txn = self.db.read()?;
        let table = read_txn.open_table(PERMISSIONS)?;
        let mut items = Vec::new();
        for entry in table.iter()?.skip(skip).take(limit) {
            let (_, value) = entry?;
            items.push(serde_json::from_slice(value.value())?);
        }
        Ok(items)
    }

    pub fn list_roles(&self, skip: usize, limit: usize) -> StorageResult<Vec<StoredRole>> {
        let read_txn = self.db.read()?;
        let table = read_txn.open_table(ROLES)?;
        let mut items = Vec::new();
        for entry in table.iter()?.skip(skip).take(limit) {
            let (_, value) = entry?;
            items.push(serde_json::from_slice(value.value())?);
        }
        Ok(items)
    }

    pub fn get_role(&self, name: &str) -> StorageResult<StoredRole> {
        let read_txn = self.db.read()?;
        let table = read_txn.open_table(ROLES)?;
        get_json(&table, name)?.ok_or_else(|| StorageError::NotFound(format!("Role {name} not found")))
    }

    /// Names of the roles held by an account (empty for unknown accounts).
    pub fn roles_of(&self, account_id: &str) -> StorageResult<BTreeSet<String>> {
        let read_txn = self.db.read()?;
        let table = read_txn.open_table(ACCOUNT_ROLES)?;
        Ok(get_json(&table, account_id)?.unwrap_or_default())
    }

    /// Union of the permissions of every role the account holds.
    pub fn permissions_of(&self, account_id: &str) -> StorageResult<BTreeSet<String>> {
        Ok(self.grants_of(account_id)?.permissions)
    }

    pub fn has_role(&self, account_id: &str, role: &str) -> StorageResult<bool> {
        Ok(self.roles_of(account_id)?.contains(role))
    }

    /// Roles and permissions read from one consistent snapshot.
    pub fn grants_of(&self, account_id: &str) -> StorageResult<Grants> {
        let read_txn = self.db.read()?;
        let account_roles = read_txn.open_table(ACCOUNT_ROLES)?;
        let roles: BTreeSet<String> = get_json(&account_roles, account_id)?.unwrap_or_default();

        let role_table = read_txn.open_table(ROLES)?;
        let mut permissions = BTreeSet::new();
        for name in &roles {
            // A role deleted from the catalog simply grants nothing
            if let Some(role) = get_json::<StoredRole, _>(&role_table, name)? {
                permissions.extend(role.permissions);
            }
        }

        Ok(Grants { roles, permissions })
    }

    /// Grant a role. Returns `false` when the account already held it.
    pub fn assign_role(&self, account_id: &str, role: &str) -> StorageResult<bool> {
        self.db.transaction(|txn| {
            ensure_account_in(txn, account_id)?;
            ensure_role_in(txn, role)?;

            let mut roles = roles_of_in(txn, account_id)?;
            if !roles.insert(role.to_string()) {
                return Ok(false);
            }
            write_roles_in(txn, account_id, &roles)?;
            Ok(true)
        })
    }

    /// Revoke a role. Returns `false` when the account did not hold it.
    pub fn remove_role(&self, account_id: &str, role: &str) -> StorageResult<bool> {
        self.db.transaction(|txn| {
            ensure_account_in(txn, account_id)?;

            let mut roles = roles_of_in(txn, account_id)?;
            if !roles.remove(role) {
                return Ok(false);
            }
            write_roles_in(txn, account_id, &roles)?;
            Ok(true)
        })
    }
}

// =============================================================================
// Transaction-scoped helpers
// =============================================================================

pub(crate) fn roles_of_in(txn: &WriteTransaction, account_id: &str) -> StorageResult<BTreeSet<String>> {
    let table = txn.open_table(ACCOUNT_ROLES)?;
    Ok(get_json(&table, account_id)?.unwrap_or_default())
}

fn write_roles_in(
    txn: &WriteTransaction,
    account_id: &str,
    roles: &BTreeSet<String>,
) -> StorageResult<()> {
    let json = to_json(roles)?;
    let mut table = txn.open_table(ACCOUNT_ROLES)?;
    table.insert(account_id, json.as_slice())?;
    Ok(())
}

/// Replace the account's whole role set with `roles`.
pub(crate) fn replace_roles_in(
    txn: &WriteTransaction,
    account_id: &str,
    roles: &[&str],
) -> StorageResult<()> {
    for role in roles {
        let table = txn.open_table(ROLES)?;
        if table.get(*role)?.is_none() {
            return Err(StorageError::Catalog(format!("role '{role}' is not seeded")));
        }
    }
    let set: BTreeSet<String> = roles.iter().map(|r| r.to_string()).collect();
    write_roles_in(txn, account_id, &set)
}

pub(crate) fn has_role_in(txn: &WriteTransaction, account_id: &str, role: &str) -> StorageResult<bool> {
    Ok(roles_of_in(txn, account_id)?.contains(role))
}

fn ensure_account_in(txn: &WriteTransaction, account_id: &str) -> StorageResult<()> {
    let table = txn.open_table(ACCOUNTS)?;
    if table.get(account_id)?.is_none() {
        return Err(StorageError::NotFound(format!("Account {account_id} not found")));
    }
    Ok(())
}

fn ensure_role_in(txn: &WriteTransaction, role: &str) -> StorageResult<()> {
    let table = txn.open_table(ROLES)?;
    if table.get(role)?.is_none() {
        return Err(StorageError::NotFound(format!("Role {role} not found")));
    }
    Ok(())
}
