//! # Redb Store
//!
//! Keeps each record kind in its own redb table, keyed by id, with the
//! record encoded by postcard. Singletons (kill switch, id counters) live in
//! a `meta` table.
//!
//! A save rewrites every table inside one write transaction, so a crash
//! leaves either the old state or the new one.

use super::StateBackend;
use crate::home::{Counters, HomeState};
use crate::model::KillSwitch;
use crate::{Result, SerraError};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

type RecordTable = TableDefinition<'static, u64, &'static [u8]>;

const ZONES: RecordTable = TableDefinition::new("zones");
const DEVICES: RecordTable = TableDefinition::new("devices");
const OUTLETS: RecordTable = TableDefinition::new("outlets");
const SENSORS: RecordTable = TableDefinition::new("sensors");
const READINGS: RecordTable = TableDefinition::new("readings");
const SCENES: RecordTable = TableDefinition::new("scenes");
const RULES: RecordTable = TableDefinition::new("rules");
const SESSIONS: RecordTable = TableDefinition::new("sessions");
const AUDIT: RecordTable = TableDefinition::new("audit");
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

const RECORD_TABLES: [RecordTable; 9] = [
    ZONES, DEVICES, OUTLETS, SENSORS, READINGS, SCENES, RULES, SESSIONS, AUDIT,
];

const META_KILL_SWITCH: &str = "kill_switch";
const META_COUNTERS: &str = "counters";

fn storage_err(e: impl std::fmt::Display) -> SerraError {
    SerraError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    postcard::to_allocvec(value).map_err(|e| SerraError::Format(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    postcard::from_bytes(bytes).map_err(|e| SerraError::Format(e.to_string()))
}

/// redb-backed [`StateBackend`].
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open the database at `path`, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path).map_err(storage_err)?;
        Ok(Self { db })
    }

    fn read_records<T: DeserializeOwned>(
        txn: &redb::ReadTransaction,
        table: RecordTable,
    ) -> Result<Vec<T>> {
        let table = match txn.open_table(table) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(storage_err(e)),
        };
        let mut records = Vec::new();
        for entry in table.iter().map_err(storage_err)? {
            let (_, value) = entry.map_err(storage_err)?;
            records.push(decode(value.value())?);
        }
        Ok(records)
    }

    fn write_records<'a, T: Serialize + 'a>(
        txn: &redb::WriteTransaction,
        table: RecordTable,
        records: impl Iterator<Item = (u64, &'a T)>,
    ) -> Result<()> {
        let mut table = txn.open_table(table).map_err(storage_err)?;
        for (id, record) in records {
            let bytes = encode(record)?;
            table.insert(id, bytes.as_slice()).map_err(storage_err)?;
        }
        Ok(())
    }
}

impl StateBackend for RedbStore {
    fn load(&self) -> Result<Option<HomeState>> {
        let txn = self.db.begin_read().map_err(storage_err)?;

        let meta = match txn.open_table(META) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(storage_err(e)),
        };
        let Some(counters) = meta.get(META_COUNTERS).map_err(storage_err)? else {
            return Ok(None);
        };
        let counters: Counters = decode(counters.value())?;
        let kill_switch: KillSwitch = match meta.get(META_KILL_SWITCH).map_err(storage_err)? {
            Some(bytes) => decode(bytes.value())?,
            None => KillSwitch::default(),
        };

        let mut state = HomeState::new();
        state.counters = counters;
        state.kill_switch = kill_switch;
        state.zones = Self::read_records(&txn, ZONES)?
            .into_iter()
            .map(|r: crate::Zone| (r.id, r))
            .collect();
        state.devices = Self::read_records(&txn, DEVICES)?
            .into_iter()
            .map(|r: crate::Device| (r.id, r))
            .collect();
        state.outlets = Self::read_records(&txn, OUTLETS)?
            .into_iter()
            .map(|r: crate::Outlet| (r.id, r))
            .collect();
        state.sensors = Self::read_records(&txn, SENSORS)?
            .into_iter()
            .map(|r: crate::Sensor| (r.id, r))
            .collect();
        state.readings = Self::read_records(&txn, READINGS)?
            .into_iter()
            .map(|r: crate::Reading| (r.id, r))
            .collect();
        state.scenes = Self::read_records(&txn, SCENES)?
            .into_iter()
            .map(|r: crate::Scene| (r.id, r))
            .collect();
        state.rules = Self::read_records(&txn, RULES)?
            .into_iter()
            .map(|r: crate::SceneRule| (r.id, r))
            .collect();
        state.sessions = Self::read_records(&txn, SESSIONS)?
            .into_iter()
            .map(|r: crate::AutomationSession| (r.id, r))
            .collect();
        state.audit = Self::read_records(&txn, AUDIT)?
            .into_iter()
            .map(|r: crate::AuditEntry| (r.id, r))
            .collect();
        Ok(Some(state))
    }

    fn save(&self, state: &HomeState) -> Result<()> {
        let txn = self.db.begin_write().map_err(storage_err)?;
        for table in RECORD_TABLES {
            txn.delete_table(table).map_err(storage_err)?;
        }

        Self::write_records(&txn, ZONES, state.zones.iter().map(|(k, v)| (k.0, v)))?;
        Self::write_records(&txn, DEVICES, state.devices.iter().map(|(k, v)| (k.0, v)))?;
        Self::write_records(&txn, OUTLETS, state.outlets.iter().map(|(k, v)| (k.0, v)))?;
        Self::write_records(&txn, SENSORS, state.sensors.iter().map(|(k, v)| (k.0, v)))?;
        Self::write_records(&txn, READINGS, state.readings.iter().map(|(k, v)| (k.0, v)))?;
        Self::write_records(&txn, SCENES, state.scenes.iter().map(|(k, v)| (k.0, v)))?;
        Self::write_records(&txn, RULES, state.rules.iter().map(|(k, v)| (k.0, v)))?;
        Self::write_records(&txn, SESSIONS, state.sessions.iter().map(|(k, v)| (k.0, v)))?;
        Self::write_records(&txn, AUDIT, state.audit.iter().map(|(k, v)| (k.0, v)))?;

        {
            let mut meta = txn.open_table(META).map_err(storage_err)?;
            let counters = encode(&state.counters)?;
            meta.insert(META_COUNTERS, counters.as_slice())
                .map_err(storage_err)?;
            let kill_switch = encode(&state.kill_switch)?;
            meta.insert(META_KILL_SWITCH, kill_switch.as_slice())
                .map_err(storage_err)?;
        }

        txn.commit().map_err(storage_err)
    }

    fn kind(&self) -> &'static str {
        "redb"
    }
}
