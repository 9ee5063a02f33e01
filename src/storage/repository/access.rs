// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Student → teacher content access grants.
//!
//! Downstream content services ask [`AccessRepository::has_access`] before
//! showing a teacher's catalog to a student. Only active grants count.

use chrono::{DateTime, Utc};
use redb::WriteTransaction;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{
    all_json, from_json, get_json, pair_key, to_json, Database, StorageError, StorageResult,
    STUDENT_TEACHER_ACCESS,
};
use super::accounts;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoredAccess {
    pub student_id: String,
    pub teacher_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granted_by: Option<String>,
    pub is_active: bool,
    pub granted_at: DateTime<Utc>,
}

pub struct AccessRepository<'a> {
    db: &'a Database,
}

impl<'a> AccessRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Grant (or re-activate) access. Idempotent for an already active grant.
    pub fn grant(
        &self,
        student_id: &str,
        teacher_id: &str,
        granted_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> StorageResult<StoredAccess> {
        self.db.transaction(|txn| {
            if accounts::get_in(txn, student_id)?.is_none() {
                return Err(StorageError::NotFound("Student not found".to_string()));
            }
            if accounts::get_in(txn, teacher_id)?.is_none() {
                return Err(StorageError::NotFound("Teacher not found".to_string()));
            }

            let key = pair_key(student_id, teacher_id);
            let mut table = txn.open_table(STUDENT_TEACHER_ACCESS)?;
            let existing: Option<StoredAccess> = get_json(&table, &key)?;
            let access = match existing {
                Some(access) if access.is_active => return Ok(access),
                _ => StoredAccess {
                    student_id: student_id.to_string(),
                    teacher_id: teacher_id.to_string(),
                    granted_by: granted_by.map(str::to_string),
                    is_active: true,
                    granted_at: now,
                },
            };
            let json = to_json(&access)?;
            table.insert(key.as_str(), json.as_slice())?;
            Ok(access)
        })
    }

    /// Deactivate a grant.
    pub fn revoke(&self, student_id: &str, teacher_id: &str) -> StorageResult<StoredAccess> {
        let key = pair_key(student_id, teacher_id);
        self.db.transaction(|txn| {
            let mut table = txn.open_table(STUDENT_TEACHER_ACCESS)?;
            let mut access: StoredAccess = get_json(&table, &key)?
                .ok_or_else(|| StorageError::NotFound("Access grant not found".to_string()))?;
            access.is_active = false;
            let json = to_json(&access)?;
            table.insert(key.as_str(), json.as_slice())?;
            Ok(access)
        })
    }

    /// Whether the student currently has access to the teacher's content.
    pub fn has_access(&self, student_id: &str, teacher_id: &str) -> StorageResult<bool> {
        let read_txn = self.db.read()?;
        let table = read_txn.open_table(STUDENT_TEACHER_ACCESS)?;
        let access: Option<StoredAccess> = get_json(&table, &pair_key(student_id, teacher_id))?;
        Ok(access.is_some_and(|a| a.is_active))
    }

    /// Active grants held by a student.
    pub fn active_for_student(&self, student_id: &str) -> StorageResult<Vec<StoredAccess>> {
        // '}' sorts right after '|', so this range covers exactly `student_id|*`
        let start = format!("{student_id}|");
        let end = format!("{student_id}}}");

        let read_txn = self.db.read()?;
        let table = read_txn.open_table(STUDENT_TEACHER_ACCESS)?;
        let mut grants = Vec::new();
        for entry in table.range(start.as_str()..end.as_str())? {
            let (_, value) = entry?;
            let access: StoredAccess = from_json(value.value())?;
            if access.is_active {
                grants.push(access);
            }
        }
        Ok(grants)
    }
}

/// Remove every grant that references the account.
pub(crate) fn purge_account_in(txn: &WriteTransaction, account_id: &str) -> StorageResult<()> {
    let mut table = txn.open_table(STUDENT_TEACHER_ACCESS)?;
    let doomed: Vec<String> = all_json::<StoredAccess, _>(&table)?
        .into_iter()
        .filter(|a| a.student_id == account_id || a.teacher_id == account_id)
        .map(|a| pair_key(&a.student_id, &a.teacher_id))
        .collect();

    for key in doomed {
        table.remove(key.as_str())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::{AccountRepository, StoredAccount};

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("access.redb")).unwrap();
        (db, dir)
    }

    fn account(db: &Database, email: &str) -> StoredAccount {
        let account = StoredAccount::new(email, "Test", Utc::now());
        AccountRepository::new(db).create(&account).unwrap();
        account
    }

    #[test]
    fn grant_revoke_and_regrant() {
        let (db, _dir) = temp_db();
        let repo = AccessRepository::new(&db);
        let student = account(&db, "s@example.com");
        let teacher = account(&db, "t@example.com");

        assert!(!repo.has_access(&student.id, &teacher.id).unwrap());

        repo.grant(&student.id, &teacher.id, Some("admin-1"), Utc::now())
            .unwrap();
        // Second grant is a no-op
        repo.grant(&student.id, &teacher.id, Some("admin-2"), Utc::now())
            .unwrap();
        assert!(repo.has_access(&student.id, &teacher.id).unwrap());

        repo.revoke(&student.id, &teacher.id).unwrap();
        assert!(!repo.has_access(&student.id, &teacher.id).unwrap());

        let regranted = repo
            .grant(&student.id, &teacher.id, Some("admin-3"), Utc::now())
            .unwrap();
        assert_eq!(regranted.granted_by.as_deref(), Some("admin-3"));
        assert!(repo.has_access(&student.id, &teacher.id).unwrap());
    }

    #[test]
    fn access_is_directional() {
        let (db, _dir) = temp_db();
        let repo = AccessRepository::new(&db);
        let student = account(&db, "s@example.com");
        let teacher = account(&db, "t@example.com");

        repo.grant(&student.id, &teacher.id, None, Utc::now()).unwrap();
        assert!(!repo.has_access(&teacher.id, &student.id).unwrap());
    }

    #[test]
    fn active_for_student_scopes_by_prefix() {
        let (db, _dir) = temp_db();
        let repo = AccessRepository::new(&db);
        let student = account(&db, "s@example.com");
        let other = account(&db, "o@example.com");
        let t1 = account(&db, "t1@example.com");
        let t2 = account(&db, "t2@example.com");

        repo.grant(&student.id, &t1.id, None, Utc::now()).unwrap();
        repo.grant(&student.id, &t2.id, None, Utc::now()).unwrap();
        repo.grant(&other.id, &t1.id, None, Utc::now()).unwrap();
        repo.revoke(&student.id, &t2.id).unwrap();

        let grants = repo.active_for_student(&student.id).unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].teacher_id, t1.id);
    }

    #[test]
    fn grant_requires_both_accounts() {
        let (db, _dir) = temp_db();
        let repo = AccessRepository::new(&db);
        let student = account(&db, "s@example.com");

        assert!(matches!(
            repo.grant(&student.id, "ghost", None, Utc::now()),
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            repo.revoke(&student.id, "ghost"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn deleting_teacher_purges_grants() {
        let (db, _dir) = temp_db();
        let repo = AccessRepository::new(&db);
        let student = account(&db, "s@example.com");
        let teacher = account(&db, "t@example.com");
        repo.grant(&student.id, &teacher.id, None, Utc::now()).unwrap();

        AccountRepository::new(&db).delete(&teacher.id).unwrap();
        assert!(repo.active_for_student(&student.id).unwrap().is_empty());
    }
}
