use std::path::Path;

use acolyte_core::{
    Actor, ActorDirectory, Arguments, BindArgs, FlowInstance, FlowStatus, FlowStorage,
    FlowTemplate, InstanceFilter, JobActionData, JobInstance, JobStatus, NewFlowInstance,
    NewFlowTemplate, START_STEP,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::lock::BUSY_TIMEOUT;
use crate::{Result, StoreError};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

const TEMPLATE_COLUMNS: &str =
    "id, flow_meta, name, bind_args, max_run_instance, creator, created_on";
const INSTANCE_COLUMNS: &str =
    "id, flow_template_id, initiator, current_step, status, description, created_on, updated_on";
const JOB_INSTANCE_COLUMNS: &str =
    "id, flow_instance_id, step_name, status, trigger_actor, created_on, updated_on";
const ACTION_COLUMNS: &str =
    "id, job_instance_id, action, actor, arguments, data, created_on, updated_on";

/// SQLite repository for flows, action records, flow context and actors.
///
/// Thread-safe via internal `Mutex<Connection>`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run pending migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let mut store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        debug!(path = %path.display(), "Opened flow store");
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let mut store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&mut self) -> Result<()> {
        let conn = self.conn.get_mut();
        embedded::migrations::runner()
            .run(conn)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    // ── Templates ───────────────────────────────────────────────────

    pub fn insert_template(&self, new: NewFlowTemplate) -> Result<FlowTemplate> {
        let now = Utc::now();
        let bind_args = serde_json::to_string(&new.bind_args)?;

        let conn = self.conn();
        conn.execute(
            "INSERT INTO flow_templates (flow_meta, name, bind_args, max_run_instance, creator, created_on)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.flow_meta,
                new.name,
                bind_args,
                new.max_run_instance,
                new.creator,
                now.to_rfc3339()
            ],
        )?;

        Ok(FlowTemplate {
            id: conn.last_insert_rowid(),
            flow_meta: new.flow_meta,
            name: new.name,
            bind_args: new.bind_args,
            max_run_instance: new.max_run_instance,
            creator: new.creator,
            created_on: now,
        })
    }

    pub fn get_template(&self, id: i64) -> Result<Option<FlowTemplate>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {TEMPLATE_COLUMNS} FROM flow_templates WHERE id = ?1"),
                params![id],
                row_to_template,
            )
            .optional()?)
    }

    pub fn get_template_by_name(&self, name: &str) -> Result<Option<FlowTemplate>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {TEMPLATE_COLUMNS} FROM flow_templates WHERE name = ?1"),
                params![name],
                row_to_template,
            )
            .optional()?)
    }

    pub fn list_templates(&self) -> Result<Vec<FlowTemplate>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare(&format!("SELECT {TEMPLATE_COLUMNS} FROM flow_templates ORDER BY id"))?;
        let rows = stmt.query_map([], row_to_template)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    // ── Instances ───────────────────────────────────────────────────

    pub fn insert_instance(&self, new: NewFlowInstance) -> Result<FlowInstance> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let conn = self.conn();
        conn.execute(
            "INSERT INTO flow_instances (flow_template_id, initiator, current_step, status, description, created_on, updated_on)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                new.flow_template_id,
                new.initiator,
                START_STEP,
                FlowStatus::Init.as_str(),
                new.description,
                now_str
            ],
        )?;

        Ok(FlowInstance {
            id: conn.last_insert_rowid(),
            flow_template_id: new.flow_template_id,
            initiator: new.initiator,
            current_step: START_STEP.to_string(),
            status: FlowStatus::Init,
            description: new.description,
            created_on: now,
            updated_on: now,
        })
    }

    pub fn get_instance(&self, id: i64) -> Result<Option<FlowInstance>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {INSTANCE_COLUMNS} FROM flow_instances WHERE id = ?1"),
                params![id],
                row_to_instance,
            )
            .optional()?)
    }

    pub fn count_running_instances(&self, template_id: i64) -> Result<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM flow_instances
             WHERE flow_template_id = ?1 AND status IN (?2, ?3)",
            params![
                template_id,
                FlowStatus::Init.as_str(),
                FlowStatus::Running.as_str()
            ],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn update_instance_status(&self, id: i64, status: FlowStatus) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE flow_instances SET status = ?1, updated_on = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("flow instance {id}")));
        }
        Ok(())
    }

    pub fn update_instance_step(&self, id: i64, step: &str) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE flow_instances SET current_step = ?1, updated_on = ?2 WHERE id = ?3",
            params![step, Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("flow instance {id}")));
        }
        Ok(())
    }

    pub fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<FlowInstance>> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(status) = filter.status {
            values.push(SqlValue::Text(status.as_str().to_string()));
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(template_id) = filter.flow_template_id {
            values.push(SqlValue::Integer(template_id));
            clauses.push(format!("flow_template_id = ?{}", values.len()));
        }
        if let Some(offset_id) = filter.offset_id {
            values.push(SqlValue::Integer(offset_id));
            clauses.push(format!("id < ?{}", values.len()));
        }
        values.push(SqlValue::Integer(filter.limit as i64));

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {INSTANCE_COLUMNS} FROM flow_instances {where_clause} ORDER BY id DESC LIMIT ?{}",
            values.len()
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_instance)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    // ── Job instances ───────────────────────────────────────────────

    pub fn insert_job_instance(
        &self,
        flow_instance_id: i64,
        step: &str,
        trigger_actor: i64,
    ) -> Result<JobInstance> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let conn = self.conn();
        conn.execute(
            "INSERT INTO job_instances (flow_instance_id, step_name, status, trigger_actor, created_on, updated_on)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                flow_instance_id,
                step,
                JobStatus::Running.as_str(),
                trigger_actor,
                now_str
            ],
        )?;

        Ok(JobInstance {
            id: conn.last_insert_rowid(),
            flow_instance_id,
            step_name: step.to_string(),
            status: JobStatus::Running,
            trigger_actor,
            created_on: now,
            updated_on: now,
        })
    }

    pub fn get_job_instance(&self, flow_instance_id: i64, step: &str) -> Result<Option<JobInstance>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {JOB_INSTANCE_COLUMNS} FROM job_instances
                     WHERE flow_instance_id = ?1 AND step_name = ?2"
                ),
                params![flow_instance_id, step],
                row_to_job_instance,
            )
            .optional()?)
    }

    pub fn update_job_instance_status(&self, id: i64, status: JobStatus) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE job_instances SET status = ?1, updated_on = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("job instance {id}")));
        }
        Ok(())
    }

    pub fn list_job_instances(&self, flow_instance_id: i64) -> Result<Vec<JobInstance>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_INSTANCE_COLUMNS} FROM job_instances WHERE flow_instance_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![flow_instance_id], row_to_job_instance)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    // ── Action records ──────────────────────────────────────────────

    pub fn insert_action_data(
        &self,
        job_instance_id: i64,
        action: &str,
        actor: i64,
        arguments: &Arguments,
    ) -> Result<JobActionData> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();
        let args_json = serde_json::to_string(arguments)?;

        let conn = self.conn();
        conn.execute(
            "INSERT INTO job_action_data (job_instance_id, action, actor, arguments, created_on, updated_on)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![job_instance_id, action, actor, args_json, now_str],
        )?;

        Ok(JobActionData {
            id: conn.last_insert_rowid(),
            job_instance_id,
            action: action.to_string(),
            actor,
            arguments: arguments.clone(),
            data: None,
            created_on: now,
            updated_on: now,
        })
    }

    pub fn get_action_data(&self, job_instance_id: i64, action: &str) -> Result<Option<JobActionData>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {ACTION_COLUMNS} FROM job_action_data
                     WHERE job_instance_id = ?1 AND action = ?2"
                ),
                params![job_instance_id, action],
                row_to_action,
            )
            .optional()?)
    }

    pub fn save_action_data(&self, id: i64, data: &Value) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE job_action_data SET data = ?1, updated_on = ?2 WHERE id = ?3",
            params![serde_json::to_string(data)?, Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("action record {id}")));
        }
        Ok(())
    }

    pub fn delete_action_data(&self, id: i64) -> Result<()> {
        self.conn()
            .execute("DELETE FROM job_action_data WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn list_action_data(&self, job_instance_id: i64) -> Result<Vec<JobActionData>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACTION_COLUMNS} FROM job_action_data WHERE job_instance_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![job_instance_id], row_to_action)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    // ── Flow context ────────────────────────────────────────────────

    pub fn context_get(&self, flow_instance_id: i64, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM flow_context WHERE flow_instance_id = ?1 AND key = ?2",
                params![flow_instance_id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
    }

    pub fn context_set(&self, flow_instance_id: i64, key: &str, value: &Value) -> Result<()> {
        self.conn().execute(
            "INSERT INTO flow_context (flow_instance_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (flow_instance_id, key) DO UPDATE SET value = excluded.value",
            params![flow_instance_id, key, serde_json::to_string(value)?],
        )?;
        Ok(())
    }

    pub fn context_remove(&self, flow_instance_id: i64, key: &str) -> Result<bool> {
        let removed = self.conn().execute(
            "DELETE FROM flow_context WHERE flow_instance_id = ?1 AND key = ?2",
            params![flow_instance_id, key],
        )?;
        Ok(removed > 0)
    }

    pub fn context_items(&self, flow_instance_id: i64) -> Result<Vec<(String, Value)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT key, value FROM flow_context WHERE flow_instance_id = ?1 ORDER BY key",
        )?;
        let rows = stmt.query_map(params![flow_instance_id], |row| {
            Ok((row.get::<_, String>(0)?, json_column::<Value>(row, 1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn context_clear(&self, flow_instance_id: i64) -> Result<()> {
        self.conn().execute(
            "DELETE FROM flow_context WHERE flow_instance_id = ?1",
            params![flow_instance_id],
        )?;
        Ok(())
    }

    // ── Actors ──────────────────────────────────────────────────────

    pub fn add_actor(&self, email: &str, name: &str) -> Result<Actor> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO actors (email, name) VALUES (?1, ?2)",
            params![email, name],
        )?;
        Ok(Actor {
            id: conn.last_insert_rowid(),
            email: email.to_string(),
            name: name.to_string(),
        })
    }

    pub fn get_actor(&self, id: i64) -> Result<Option<Actor>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, email, name FROM actors WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Actor {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }
}

// ── Engine storage traits ───────────────────────────────────────────

impl FlowStorage for SqliteStore {
    fn insert_template(&self, template: NewFlowTemplate) -> acolyte_core::Result<FlowTemplate> {
        Ok(SqliteStore::insert_template(self, template)?)
    }

    fn get_template(&self, id: i64) -> acolyte_core::Result<Option<FlowTemplate>> {
        Ok(SqliteStore::get_template(self, id)?)
    }

    fn get_template_by_name(&self, name: &str) -> acolyte_core::Result<Option<FlowTemplate>> {
        Ok(SqliteStore::get_template_by_name(self, name)?)
    }

    fn list_templates(&self) -> acolyte_core::Result<Vec<FlowTemplate>> {
        Ok(SqliteStore::list_templates(self)?)
    }

    fn insert_instance(&self, instance: NewFlowInstance) -> acolyte_core::Result<FlowInstance> {
        Ok(SqliteStore::insert_instance(self, instance)?)
    }

    fn get_instance(&self, id: i64) -> acolyte_core::Result<Option<FlowInstance>> {
        Ok(SqliteStore::get_instance(self, id)?)
    }

    fn count_running_instances(&self, template_id: i64) -> acolyte_core::Result<usize> {
        Ok(SqliteStore::count_running_instances(self, template_id)?)
    }

    fn update_instance_status(&self, id: i64, status: FlowStatus) -> acolyte_core::Result<()> {
        Ok(SqliteStore::update_instance_status(self, id, status)?)
    }

    fn update_instance_step(&self, id: i64, step: &str) -> acolyte_core::Result<()> {
        Ok(SqliteStore::update_instance_step(self, id, step)?)
    }

    fn list_instances(&self, filter: &InstanceFilter) -> acolyte_core::Result<Vec<FlowInstance>> {
        Ok(SqliteStore::list_instances(self, filter)?)
    }

    fn insert_job_instance(
        &self,
        flow_instance_id: i64,
        step: &str,
        trigger_actor: i64,
    ) -> acolyte_core::Result<JobInstance> {
        Ok(SqliteStore::insert_job_instance(
            self,
            flow_instance_id,
            step,
            trigger_actor,
        )?)
    }

    fn get_job_instance(
        &self,
        flow_instance_id: i64,
        step: &str,
    ) -> acolyte_core::Result<Option<JobInstance>> {
        Ok(SqliteStore::get_job_instance(self, flow_instance_id, step)?)
    }

    fn update_job_instance_status(&self, id: i64, status: JobStatus) -> acolyte_core::Result<()> {
        Ok(SqliteStore::update_job_instance_status(self, id, status)?)
    }

    fn list_job_instances(&self, flow_instance_id: i64) -> acolyte_core::Result<Vec<JobInstance>> {
        Ok(SqliteStore::list_job_instances(self, flow_instance_id)?)
    }

    fn insert_action_data(
        &self,
        job_instance_id: i64,
        action: &str,
        actor: i64,
        arguments: &Arguments,
    ) -> acolyte_core::Result<JobActionData> {
        Ok(SqliteStore::insert_action_data(
            self,
            job_instance_id,
            action,
            actor,
            arguments,
        )?)
    }

    fn get_action_data(
        &self,
        job_instance_id: i64,
        action: &str,
    ) -> acolyte_core::Result<Option<JobActionData>> {
        Ok(SqliteStore::get_action_data(self, job_instance_id, action)?)
    }

    fn save_action_data(&self, id: i64, data: &Value) -> acolyte_core::Result<()> {
        Ok(SqliteStore::save_action_data(self, id, data)?)
    }

    fn delete_action_data(&self, id: i64) -> acolyte_core::Result<()> {
        Ok(SqliteStore::delete_action_data(self, id)?)
    }

    fn list_action_data(&self, job_instance_id: i64) -> acolyte_core::Result<Vec<JobActionData>> {
        Ok(SqliteStore::list_action_data(self, job_instance_id)?)
    }

    fn context_get(&self, flow_instance_id: i64, key: &str) -> acolyte_core::Result<Option<Value>> {
        Ok(SqliteStore::context_get(self, flow_instance_id, key)?)
    }

    fn context_set(&self, flow_instance_id: i64, key: &str, value: &Value) -> acolyte_core::Result<()> {
        Ok(SqliteStore::context_set(self, flow_instance_id, key, value)?)
    }

    fn context_remove(&self, flow_instance_id: i64, key: &str) -> acolyte_core::Result<bool> {
        Ok(SqliteStore::context_remove(self, flow_instance_id, key)?)
    }

    fn context_items(&self, flow_instance_id: i64) -> acolyte_core::Result<Vec<(String, Value)>> {
        Ok(SqliteStore::context_items(self, flow_instance_id)?)
    }

    fn context_clear(&self, flow_instance_id: i64) -> acolyte_core::Result<()> {
        Ok(SqliteStore::context_clear(self, flow_instance_id)?)
    }
}

impl ActorDirectory for SqliteStore {
    fn get_actor(&self, id: i64) -> acolyte_core::Result<Option<Actor>> {
        Ok(SqliteStore::get_actor(self, id)?)
    }

    fn add_actor(&self, email: &str, name: &str) -> acolyte_core::Result<Actor> {
        Ok(SqliteStore::add_actor(self, email, name)?)
    }
}

// ── Row mapping ─────────────────────────────────────────────────────

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn json_column<T: DeserializeOwned>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn flow_status_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<FlowStatus> {
    let raw: String = row.get(idx)?;
    FlowStatus::parse(&raw).ok_or_else(|| conversion_error(idx, format!("unknown flow status '{raw}'")))
}

fn job_status_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<JobStatus> {
    let raw: String = row.get(idx)?;
    JobStatus::parse(&raw).ok_or_else(|| conversion_error(idx, format!("unknown job status '{raw}'")))
}

fn row_to_template(row: &rusqlite::Row<'_>) -> rusqlite::Result<FlowTemplate> {
    Ok(FlowTemplate {
        id: row.get(0)?,
        flow_meta: row.get(1)?,
        name: row.get(2)?,
        bind_args: json_column::<BindArgs>(row, 3)?,
        max_run_instance: row.get(4)?,
        creator: row.get(5)?,
        created_on: parse_dt(&row.get::<_, String>(6)?),
    })
}

fn row_to_instance(row: &rusqlite::Row<'_>) -> rusqlite::Result<FlowInstance> {
    Ok(FlowInstance {
        id: row.get(0)?,
        flow_template_id: row.get(1)?,
        initiator: row.get(2)?,
        current_step: row.get(3)?,
        status: flow_status_column(row, 4)?,
        description: row.get(5)?,
        created_on: parse_dt(&row.get::<_, String>(6)?),
        updated_on: parse_dt(&row.get::<_, String>(7)?),
    })
}

fn row_to_job_instance(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobInstance> {
    Ok(JobInstance {
        id: row.get(0)?,
        flow_instance_id: row.get(1)?,
        step_name: row.get(2)?,
        status: job_status_column(row, 3)?,
        trigger_actor: row.get(4)?,
        created_on: parse_dt(&row.get::<_, String>(5)?),
        updated_on: parse_dt(&row.get::<_, String>(6)?),
    })
}

fn row_to_action(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobActionData> {
    let data: Option<String> = row.get(5)?;
    Ok(JobActionData {
        id: row.get(0)?,
        job_instance_id: row.get(1)?,
        action: row.get(2)?,
        actor: row.get(3)?,
        arguments: json_column::<Arguments>(row, 4)?,
        data: data
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| conversion_error(5, e))?,
        created_on: parse_dt(&row.get::<_, String>(6)?),
        updated_on: parse_dt(&row.get::<_, String>(7)?),
    })
}
