use crate::domain::models::{Alarm, AlarmId, DayMask};
use crate::infrastructure::error::InfraError;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

const ALARM_COLUMNS: &str = "id, hour, minute, repeat, days, enabled, name, sound, vibrate, volume,
     use_24_hour_format, use_nfc, nfc_tag_id, use_dismiss_early, dismiss_early_minutes";

/// Durable, ordered alarm records. Row order always matches list position.
pub trait AlarmStore: Send + Sync {
    /// Inserts `alarm` so that it becomes the `position`-th row. Returns the row
    /// id; a negative value means the row was not written.
    fn add(&self, alarm: &Alarm, position: usize) -> Result<i64, InfraError>;
    fn update(&self, alarm: &Alarm) -> Result<(), InfraError>;
    fn delete(&self, alarm: &Alarm) -> Result<(), InfraError>;
    fn swap_order(&self, first: &Alarm, second: &Alarm) -> Result<(), InfraError>;
    fn read_all(&self) -> Result<Vec<Alarm>, InfraError>;

    fn find(&self, alarm_id: AlarmId) -> Result<Option<Alarm>, InfraError> {
        Ok(self
            .read_all()?
            .into_iter()
            .find(|alarm| alarm.id == alarm_id))
    }
}

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SqliteAlarmStore {
    db_path: PathBuf,
}

impl SqliteAlarmStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }

    fn sort_order_of(transaction: &Transaction<'_>, alarm_id: AlarmId) -> Result<i64, InfraError> {
        transaction
            .query_row(
                "SELECT sort_order FROM alarms WHERE id = ?1",
                params![alarm_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| InfraError::InvalidRecord(format!("alarm {alarm_id} is not stored")))
    }
}

impl AlarmStore for SqliteAlarmStore {
    fn add(&self, alarm: &Alarm, position: usize) -> Result<i64, InfraError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;

        let offset = i64::try_from(position)
            .map_err(|_| InfraError::InvalidRecord(format!("position {position} too large")))?;
        let displaced: Option<i64> = transaction
            .query_row(
                "SELECT sort_order FROM alarms ORDER BY sort_order LIMIT 1 OFFSET ?1",
                params![offset],
                |row| row.get(0),
            )
            .optional()?;
        let sort_order = match displaced {
            Some(sort_order) => {
                transaction.execute(
                    "UPDATE alarms SET sort_order = sort_order + 1 WHERE sort_order >= ?1",
                    params![sort_order],
                )?;
                sort_order
            }
            None => transaction.query_row(
                "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM alarms",
                [],
                |row| row.get(0),
            )?,
        };

        transaction.execute(
            &format!(
                "INSERT INTO alarms (sort_order, {ALARM_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ),
            params![
                sort_order,
                alarm.id,
                alarm.hour,
                alarm.minute,
                alarm.repeat,
                alarm.days.bits(),
                alarm.enabled,
                alarm.name,
                alarm.sound,
                alarm.vibrate,
                alarm.volume,
                alarm.use_24_hour_format,
                alarm.use_nfc,
                alarm.nfc_tag_id,
                alarm.use_dismiss_early,
                alarm.dismiss_early_minutes,
            ],
        )?;
        let row_id = transaction.last_insert_rowid();
        transaction.commit()?;
        Ok(row_id)
    }

    fn update(&self, alarm: &Alarm) -> Result<(), InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE alarms SET
               hour = ?2, minute = ?3, repeat = ?4, days = ?5, enabled = ?6, name = ?7,
               sound = ?8, vibrate = ?9, volume = ?10, use_24_hour_format = ?11,
               use_nfc = ?12, nfc_tag_id = ?13, use_dismiss_early = ?14,
               dismiss_early_minutes = ?15
             WHERE id = ?1",
            params![
                alarm.id,
                alarm.hour,
                alarm.minute,
                alarm.repeat,
                alarm.days.bits(),
                alarm.enabled,
                alarm.name,
                alarm.sound,
                alarm.vibrate,
                alarm.volume,
                alarm.use_24_hour_format,
                alarm.use_nfc,
                alarm.nfc_tag_id,
                alarm.use_dismiss_early,
                alarm.dismiss_early_minutes,
            ],
        )?;
        if changed == 0 {
            return Err(InfraError::InvalidRecord(format!(
                "alarm {} is not stored",
                alarm.id
            )));
        }
        Ok(())
    }

    fn delete(&self, alarm: &Alarm) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute("DELETE FROM alarms WHERE id = ?1", params![alarm.id])?;
        Ok(())
    }

    fn swap_order(&self, first: &Alarm, second: &Alarm) -> Result<(), InfraError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        let first_order = Self::sort_order_of(&transaction, first.id)?;
        let second_order = Self::sort_order_of(&transaction, second.id)?;
        transaction.execute(
            "UPDATE alarms SET sort_order = ?2 WHERE id = ?1",
            params![first.id, second_order],
        )?;
        transaction.execute(
            "UPDATE alarms SET sort_order = ?2 WHERE id = ?1",
            params![second.id, first_order],
        )?;
        transaction.commit()?;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<Alarm>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {ALARM_COLUMNS} FROM alarms ORDER BY sort_order, id"
        ))?;
        let rows = statement.query_map([], alarm_from_row)?;

        let mut alarms = Vec::new();
        for row in rows {
            let alarm = row?;
            alarm.validate().map_err(InfraError::InvalidRecord)?;
            alarms.push(alarm);
        }
        Ok(alarms)
    }

    fn find(&self, alarm_id: AlarmId) -> Result<Option<Alarm>, InfraError> {
        let connection = self.connect()?;
        connection
            .query_row(
                &format!("SELECT {ALARM_COLUMNS} FROM alarms WHERE id = ?1"),
                params![alarm_id],
                alarm_from_row,
            )
            .optional()
            .map_err(InfraError::from)
    }
}

fn alarm_from_row(row: &Row<'_>) -> rusqlite::Result<Alarm> {
    Ok(Alarm {
        id: row.get(0)?,
        hour: row.get(1)?,
        minute: row.get(2)?,
        repeat: row.get(3)?,
        days: DayMask::from_bits(row.get(4)?),
        enabled: row.get(5)?,
        name: row.get(6)?,
        sound: row.get(7)?,
        vibrate: row.get(8)?,
        volume: row.get(9)?,
        use_24_hour_format: row.get(10)?,
        use_nfc: row.get(11)?,
        nfc_tag_id: row.get(12)?,
        use_dismiss_early: row.get(13)?,
        dismiss_early_minutes: row.get(14)?,
    })
}

#[derive(Debug, Default)]
pub struct InMemoryAlarmStore {
    state: Mutex<InMemoryRows>,
}

#[derive(Debug, Default)]
struct InMemoryRows {
    alarms: Vec<Alarm>,
    next_row_id: i64,
}

impl InMemoryAlarmStore {
    pub fn with_alarms(alarms: Vec<Alarm>) -> Self {
        let next_row_id = i64::try_from(alarms.len()).unwrap_or(i64::MAX);
        Self {
            state: Mutex::new(InMemoryRows {
                alarms,
                next_row_id,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, InMemoryRows>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("alarm store lock poisoned: {error}")))
    }

    fn index_of(rows: &InMemoryRows, alarm_id: AlarmId) -> Result<usize, InfraError> {
        rows.alarms
            .iter()
            .position(|alarm| alarm.id == alarm_id)
            .ok_or_else(|| InfraError::InvalidRecord(format!("alarm {alarm_id} is not stored")))
    }
}

impl AlarmStore for InMemoryAlarmStore {
    fn add(&self, alarm: &Alarm, position: usize) -> Result<i64, InfraError> {
        let mut rows = self.lock()?;
        if rows.alarms.iter().any(|stored| stored.id == alarm.id) {
            return Err(InfraError::InvalidRecord(format!(
                "alarm {} is already stored",
                alarm.id
            )));
        }
        let position = position.min(rows.alarms.len());
        rows.alarms.insert(position, alarm.clone());
        rows.next_row_id += 1;
        Ok(rows.next_row_id)
    }

    fn update(&self, alarm: &Alarm) -> Result<(), InfraError> {
        let mut rows = self.lock()?;
        let index = Self::index_of(&rows, alarm.id)?;
        rows.alarms[index] = alarm.clone();
        Ok(())
    }

    fn delete(&self, alarm: &Alarm) -> Result<(), InfraError> {
        let mut rows = self.lock()?;
        rows.alarms.retain(|stored| stored.id != alarm.id);
        Ok(())
    }

    fn swap_order(&self, first: &Alarm, second: &Alarm) -> Result<(), InfraError> {
        let mut rows = self.lock()?;
        let first_index = Self::index_of(&rows, first.id)?;
        let second_index = Self::index_of(&rows, second.id)?;
        rows.alarms.swap(first_index, second_index);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<Alarm>, InfraError> {
        Ok(self.lock()?.alarms.clone())
    }
}
