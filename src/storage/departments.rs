// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Department info repository.

use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::modules::MODULE_INFOS;
use super::{next_id, Database, StoreError, StoreResult};

/// Primary table: id → serialized DepartmentInfo (JSON bytes).
pub(crate) const DEPARTMENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("departments");

const DEPARTMENT_SEQUENCE: &str = "departments";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentInfo {
    pub id: u64,
    pub department_name: String,
    pub staff_quantity: u32,
    pub department_director: String,
    pub module_id: u64,
}

#[derive(Debug, Clone)]
pub struct NewDepartmentInfo {
    pub department_name: String,
    pub staff_quantity: u32,
    pub department_director: String,
    pub module_id: u64,
}

pub struct DepartmentRepository<'a> {
    db: &'a Database,
}

impl<'a> DepartmentRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a department. The referenced module must exist, checked in the
    /// same transaction.
    pub fn insert(&self, new: NewDepartmentInfo) -> StoreResult<DepartmentInfo> {
        let write_txn = self.db.raw().begin_write()?;
        let department = {
            let modules = write_txn.open_table(MODULE_INFOS)?;
            if modules.get(new.module_id)?.is_none() {
                return Err(StoreError::NotFound(format!("Module {}", new.module_id)));
            }

            let id = next_id(&write_txn, DEPARTMENT_SEQUENCE)?;
            let department = DepartmentInfo {
                id,
                department_name: new.department_name,
                staff_quantity: new.staff_quantity,
                department_director: new.department_director,
                module_id: new.module_id,
            };
            let json = serde_json::to_vec(&department)?;
            let mut table = write_txn.open_table(DEPARTMENTS)?;
            table.insert(id, json.as_slice())?;
            department
        };
        write_txn.commit()?;
        Ok(department)
    }

    pub fn get(&self, id: u64) -> StoreResult<DepartmentInfo> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(DEPARTMENTS)?;
        match table.get(id)? {
            Some(value) => Ok(serde_json::from_slice(value.value())?),
            None => Err(StoreError::NotFound(format!("Department {id}"))),
        }
    }
}
