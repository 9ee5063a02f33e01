// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Teacher ↔ student assignments made by administrators.
//!
//! At most one row exists per (teacher, student) pair. Removing an
//! assignment only deactivates it; assigning the pair again reactivates the
//! same row.

use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{
    all_json, get_json, get_str, pair_key, to_json, Database, StorageError, StorageResult,
    TEACHER_ASSIGNMENTS, TEACHER_ASSIGNMENT_PAIRS,
};
use super::{accounts, rbac};
use crate::auth::roles::BuiltinRole;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoredAssignment {
    pub id: String,
    pub teacher_id: String,
    pub student_id: String,
    /// Admin who made (or last reactivated) the assignment
    pub assigned_by: String,
    pub is_active: bool,
    pub assigned_at: DateTime<Utc>,
}

pub struct AssignmentRepository<'a> {
    db: &'a Database,
}

impl<'a> AssignmentRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Assign a student to a teacher.
    ///
    /// - teacher missing or without the `teacher` role → `Rejected`
    /// - student missing → `NotFound`
    /// - active pair already present → `AlreadyExists`
    /// - inactive pair present → reactivated
    pub fn create(
        &self,
        teacher_id: &str,
        student_id: &str,
        assigned_by: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<StoredAssignment> {
        self.db.transaction(|txn| {
            let teacher_ok = accounts::get_in(txn, teacher_id)?.is_some()
                && rbac::has_role_in(txn, teacher_id, BuiltinRole::Teacher.as_str())?;
            if !teacher_ok {
                return Err(StorageError::Rejected("Invalid teacher ID".to_string()));
            }
            if accounts::get_in(txn, student_id)?.is_none() {
                return Err(StorageError::NotFound("Student not found".to_string()));
            }

            let key = pair_key(teacher_id, student_id);
            let existing_id = {
                let pairs = txn.open_table(TEACHER_ASSIGNMENT_PAIRS)?;
                get_str(&pairs, &key)?
            };

            let mut table = txn.open_table(TEACHER_ASSIGNMENTS)?;
            let assignment = match existing_id {
                Some(id) => {
                    let mut existing: StoredAssignment = get_json(&table, &id)?
                        .ok_or_else(|| StorageError::NotFound(format!("Assignment {id} not found")))?;
                    if existing.is_active {
                        return Err(StorageError::AlreadyExists(
                            "Teacher assignment already exists".to_string(),
                        ));
                    }
                    existing.is_active = true;
                    existing.assigned_by = assigned_by.to_string();
                    existing.assigned_at = now;
                    existing
                }
                None => {
                    let created = StoredAssignment {
                        id: uuid::Uuid::new_v4().to_string(),
                        teacher_id: teacher_id.to_string(),
                        student_id: student_id.to_string(),
                        assigned_by: assigned_by.to_string(),
                        is_active: true,
                        assigned_at: now,
                    };
                    let mut pairs = txn.open_table(TEACHER_ASSIGNMENT_PAIRS)?;
                    pairs.insert(key.as_str(), created.id.as_str())?;
                    created
                }
            };

            let json = to_json(&assignment)?;
            table.insert(assignment.id.as_str(), json.as_slice())?;
            Ok(assignment)
        })
    }

    pub fn get(&self, assignment_id: &str) -> StorageResult<StoredAssignment> {
        let read_txn = self.db.read()?;
        let table = read_txn.open_table(TEACHER_ASSIGNMENTS)?;
        get_json(&table, assignment_id)?
            .ok_or_else(|| StorageError::NotFound("Assignment not found".to_string()))
    }

    pub fn list(&self, skip: usize, limit: usize) -> StorageResult<Vec<StoredAssignment>> {
        let read_txn = self.db.read()?;
        let table = read_txn.open_table(TEACHER_ASSIGNMENTS)?;
        let mut items = Vec::new();
        for entry in table.iter()?.skip(skip).take(limit) {
            let (_, value) = entry?;
            items.push(serde_json::from_slice(value.value())?);
        }
        Ok(items)
    }

    /// Active assignments where `teacher_id` is the teacher.
    pub fn active_for_teacher(&self, teacher_id: &str) -> StorageResult<Vec<StoredAssignment>> {
        let read_txn = self.db.read()?;
        let table = read_txn.open_table(TEACHER_ASSIGNMENTS)?;
        Ok(all_json::<StoredAssignment, _>(&table)?
            .into_iter()
            .filter(|a| a.is_active && a.teacher_id == teacher_id)
            .collect())
    }

    /// Soft delete.
    pub fn deactivate(&self, assignment_id: &str) -> StorageResult<StoredAssignment> {
        self.db.transaction(|txn| {
            let mut table = txn.open_table(TEACHER_ASSIGNMENTS)?;
            let mut assignment: StoredAssignment = get_json(&table, assignment_id)?
                .ok_or_else(|| StorageError::NotFound("Assignment not found".to_string()))?;
            assignment.is_active = false;
            let json = to_json(&assignment)?;
            table.insert(assignment_id, json.as_slice())?;
            Ok(assignment)
        })
    }
}

/// Remove every assignment that references the account.
pub(crate) fn purge_account_in(txn: &WriteTransaction, account_id: &str) -> StorageResult<()> {
    let mut table = txn.open_table(TEACHER_ASSIGNMENTS)?;
    let doomed: Vec<StoredAssignment> = all_json::<StoredAssignment, _>(&table)?
        .into_iter()
        .filter(|a| a.teacher_id == account_id || a.student_id == account_id)
        .collect();

    let mut pairs = txn.open_table(TEACHER_ASSIGNMENT_PAIRS)?;
    for assignment in doomed {
        table.remove(assignment.id.as_str())?;
        pairs.remove(pair_key(&assignment.teacher_id, &assignment.student_id).as_str())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::{AccountRepository, RbacRepository, StoredAccount};

    fn seeded_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("assignments.redb")).unwrap();
        RbacRepository::new(&db).seed().unwrap();
        (db, dir)
    }

    fn account(db: &Database, email: &str, role: Option<&str>) -> StoredAccount {
        let account = StoredAccount::new(email, "Test", Utc::now());
        AccountRepository::new(db).create(&account).unwrap();
        if let Some(role) = role {
            RbacRepository::new(db).assign_role(&account.id, role).unwrap();
        }
        account
    }

    #[test]
    fn create_requires_teacher_role() {
        let (db, _dir) = seeded_db();
        let repo = AssignmentRepository::new(&db);
        let not_teacher = account(&db, "nt@example.com", Some("user"));
        let student = account(&db, "s@example.com", Some("user"));

        let result = repo.create(&not_teacher.id, &student.id, "admin-1", Utc::now());
        assert!(matches!(result, Err(StorageError::Rejected(_))));
    }

    #[test]
    fn create_requires_student() {
        let (db, _dir) = seeded_db();
        let repo = AssignmentRepository::new(&db);
        let teacher = account(&db, "t@example.com", Some("teacher"));

        let result = repo.create(&teacher.id, "ghost", "admin-1", Utc::now());
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn duplicate_active_pair_conflicts_and_inactive_reactivates() {
        let (db, _dir) = seeded_db();
        let repo = AssignmentRepository::new(&db);
        let teacher = account(&db, "t@example.com", Some("teacher"));
        let student = account(&db, "s@example.com", None);

        let first = repo
            .create(&teacher.id, &student.id, "admin-1", Utc::now())
            .unwrap();
        assert!(matches!(
            repo.create(&teacher.id, &student.id, "admin-1", Utc::now()),
            Err(StorageError::AlreadyExists(_))
        ));

        repo.deactivate(&first.id).unwrap();
        let again = repo
            .create(&teacher.id, &student.id, "admin-2", Utc::now())
            .unwrap();

        assert_eq!(again.id, first.id);
        assert!(again.is_active);
        assert_eq!(again.assigned_by, "admin-2");
        assert_eq!(repo.list(0, 100).unwrap().len(), 1);
        assert_eq!(repo.active_for_teacher(&teacher.id).unwrap().len(), 1);
    }

    #[test]
    fn deleting_account_purges_assignments() {
        let (db, _dir) = seeded_db();
        let repo = AssignmentRepository::new(&db);
        let teacher = account(&db, "t@example.com", Some("teacher"));
        let student = account(&db, "s@example.com", None);
        repo.create(&teacher.id, &student.id, "admin-1", Utc::now())
            .unwrap();

        AccountRepository::new(&db).delete(&student.id).unwrap();
        assert!(repo.list(0, 100).unwrap().is_empty());
    }

    #[test]
    fn deactivate_missing_is_not_found() {
        let (db, _dir) = seeded_db();
        let repo = AssignmentRepository::new(&db);
        assert!(matches!(
            repo.deactivate("missing"),
            Err(StorageError::NotFound(_))
        ));
    }
}
