//! Persistence traits consumed by the engine.
//!
//! # Architecture
//!
//! ```text
//! FlowStorage (trait)        - templates, instances, job instances,
//!                              action records, flow context
//!     └── MemoryStorage      - in-memory implementation (acolyte-core)
//!     └── SqliteStore        - SQLite implementation (acolyte-store)
//!
//! ActorDirectory (trait)     - actor lookup
//!     └── MemoryStorage
//!     └── SqliteStore
//! ```

use serde_json::Value;

use crate::Result;
use crate::model::{
    Actor, Arguments, FlowInstance, FlowStatus, FlowTemplate, InstanceFilter, JobActionData,
    JobInstance, JobStatus, NewFlowInstance, NewFlowTemplate,
};

/// Storage for everything the engine persists.
///
/// Lookups by id return `Ok(None)` when the row is absent. Unique
/// constraint violations on insert return
/// [`EngineError::Conflict`](crate::EngineError::Conflict).
pub trait FlowStorage: Send + Sync {
    // ── Template Operations ─────────────────────────────────────────────

    /// Insert a template. Names are unique.
    fn insert_template(&self, template: NewFlowTemplate) -> Result<FlowTemplate>;

    fn get_template(&self, id: i64) -> Result<Option<FlowTemplate>>;

    fn get_template_by_name(&self, name: &str) -> Result<Option<FlowTemplate>>;

    /// All templates, ascending by id.
    fn list_templates(&self) -> Result<Vec<FlowTemplate>>;

    // ── Instance Operations ─────────────────────────────────────────────

    /// Insert an instance in status INIT at step `start`.
    fn insert_instance(&self, instance: NewFlowInstance) -> Result<FlowInstance>;

    fn get_instance(&self, id: i64) -> Result<Option<FlowInstance>>;

    /// Number of non-terminal (INIT or RUNNING) instances of a template.
    fn count_running_instances(&self, template_id: i64) -> Result<usize>;

    fn update_instance_status(&self, id: i64, status: FlowStatus) -> Result<()>;

    fn update_instance_step(&self, id: i64, step: &str) -> Result<()>;

    /// Instances matching `filter`, descending by id.
    fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<FlowInstance>>;

    // ── Job Instance Operations ─────────────────────────────────────────

    /// Insert a RUNNING job instance. `(flow_instance_id, step)` is unique.
    fn insert_job_instance(
        &self,
        flow_instance_id: i64,
        step: &str,
        trigger_actor: i64,
    ) -> Result<JobInstance>;

    fn get_job_instance(&self, flow_instance_id: i64, step: &str) -> Result<Option<JobInstance>>;

    fn update_job_instance_status(&self, id: i64, status: JobStatus) -> Result<()>;

    /// Job instances of a flow instance, ascending by id.
    fn list_job_instances(&self, flow_instance_id: i64) -> Result<Vec<JobInstance>>;

    // ── Action Record Operations ────────────────────────────────────────

    /// Insert an action record. `(job_instance_id, action)` is unique.
    fn insert_action_data(
        &self,
        job_instance_id: i64,
        action: &str,
        actor: i64,
        arguments: &Arguments,
    ) -> Result<JobActionData>;

    fn get_action_data(&self, job_instance_id: i64, action: &str)
    -> Result<Option<JobActionData>>;

    /// Overwrite the handler data of an action record.
    fn save_action_data(&self, id: i64, data: &Value) -> Result<()>;

    fn delete_action_data(&self, id: i64) -> Result<()>;

    /// Action records of a job instance, ascending by id.
    fn list_action_data(&self, job_instance_id: i64) -> Result<Vec<JobActionData>>;

    // ── Flow Context Operations ─────────────────────────────────────────

    fn context_get(&self, flow_instance_id: i64, key: &str) -> Result<Option<Value>>;

    fn context_set(&self, flow_instance_id: i64, key: &str, value: &Value) -> Result<()>;

    /// Returns whether the key existed.
    fn context_remove(&self, flow_instance_id: i64, key: &str) -> Result<bool>;

    /// All entries of an instance, ascending by key.
    fn context_items(&self, flow_instance_id: i64) -> Result<Vec<(String, Value)>>;

    fn context_clear(&self, flow_instance_id: i64) -> Result<()>;
}

/// Lookup of the people allowed to start flows and act on steps.
pub trait ActorDirectory: Send + Sync {
    fn get_actor(&self, id: i64) -> Result<Option<Actor>>;

    fn add_actor(&self, email: &str, name: &str) -> Result<Actor>;

    fn actor_exists(&self, id: i64) -> Result<bool> {
        Ok(self.get_actor(id)?.is_some())
    }
}
