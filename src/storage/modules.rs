// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Module info repository.

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{next_id, Database, StoreError, StoreResult};

/// Primary table: id → serialized ModuleInfo (JSON bytes).
pub(crate) const MODULE_INFOS: TableDefinition<u64, &[u8]> = TableDefinition::new("module_infos");

const MODULE_SEQUENCE: &str = "module_infos";

/// A course module.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub module_name: String,
    /// Module duration in nanoseconds.
    pub module_duration: i64,
    pub exam_type: String,
    pub version: u32,
}

#[derive(Debug, Clone)]
pub struct NewModuleInfo {
    pub module_name: String,
    pub module_duration: i64,
    pub exam_type: String,
}

fn decode(bytes: &[u8]) -> StoreResult<ModuleInfo> {
    Ok(serde_json::from_slice(bytes)?)
}

pub struct ModuleRepository<'a> {
    db: &'a Database,
}

impl<'a> ModuleRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn insert(&self, new: NewModuleInfo) -> StoreResult<ModuleInfo> {
        let write_txn = self.db.raw().begin_write()?;
        let module = {
            let id = next_id(&write_txn, MODULE_SEQUENCE)?;
            let now = Utc::now();
            let module = ModuleInfo {
                id,
                created_at: now,
                updated_at: now,
                module_name: new.module_name,
                module_duration: new.module_duration,
                exam_type: new.exam_type,
                version: 1,
            };
            let json = serde_json::to_vec(&module)?;
            let mut table = write_txn.open_table(MODULE_INFOS)?;
            table.insert(id, json.as_slice())?;
            module
        };
        write_txn.commit()?;
        Ok(module)
    }

    pub fn get(&self, id: u64) -> StoreResult<ModuleInfo> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(MODULE_INFOS)?;
        match table.get(id)? {
            Some(value) => decode(value.value()),
            None => Err(StoreError::NotFound(format!("Module {id}"))),
        }
    }

    /// The `limit` most recently created modules, newest first.
    pub fn latest(&self, limit: usize) -> StoreResult<Vec<ModuleInfo>> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(MODULE_INFOS)?;

        let mut modules = Vec::with_capacity(limit);
        for entry in table.iter()?.rev().take(limit) {
            let (_, value) = entry?;
            modules.push(decode(value.value())?);
        }
        Ok(modules)
    }

    /// Compare-and-swap update, same contract as `UserRepository::update`.
    pub fn update(&self, module: &ModuleInfo, expected_version: u32) -> StoreResult<ModuleInfo> {
        let write_txn = self.db.raw().begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(MODULE_INFOS)?;
            let current = match table.get(module.id)? {
                Some(value) => decode(value.value())?,
                None => return Err(StoreError::EditConflict(format!("Module {}", module.id))),
            };
            if current.version != expected_version {
                return Err(StoreError::EditConflict(format!(
                    "Module {} is at version {}, expected {expected_version}",
                    module.id, current.version
                )));
            }

            let updated = ModuleInfo {
                updated_at: Utc::now(),
                module_name: module.module_name.clone(),
                module_duration: module.module_duration,
                exam_type: module.exam_type.clone(),
                version: current.version + 1,
                ..current
            };
            let json = serde_json::to_vec(&updated)?;
            table.insert(updated.id, json.as_slice())?;
            updated
        };
        write_txn.commit()?;
        Ok(updated)
    }

    pub fn delete(&self, id: u64) -> StoreResult<()> {
        let write_txn = self.db.raw().begin_write()?;
        {
            let mut table = write_txn.open_table(MODULE_INFOS)?;
            if table.remove(id)?.is_none() {
                return Err(StoreError::NotFound(format!("Module {id}")));
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}
