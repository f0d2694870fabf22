//! In-memory storage backend.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::flow::START_STEP;
use crate::model::{
    Actor, Arguments, FlowInstance, FlowStatus, FlowTemplate, InstanceFilter, JobActionData,
    JobInstance, JobStatus, NewFlowInstance, NewFlowTemplate,
};
use crate::storage::{ActorDirectory, FlowStorage};

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    templates: BTreeMap<i64, FlowTemplate>,
    instances: BTreeMap<i64, FlowInstance>,
    job_instances: BTreeMap<i64, JobInstance>,
    actions: BTreeMap<i64, JobActionData>,
    context: HashMap<i64, BTreeMap<String, Value>>,
    actors: BTreeMap<i64, Actor>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Thread-safe in-memory implementation of [`FlowStorage`] and
/// [`ActorDirectory`] with the same uniqueness rules as the SQL backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(what: &str, id: i64) -> EngineError {
    EngineError::NotFound(format!("{what} {id}"))
}

impl FlowStorage for MemoryStorage {
    fn insert_template(&self, new: NewFlowTemplate) -> Result<FlowTemplate> {
        let mut t = self.tables.lock();
        if t.templates.values().any(|x| x.name == new.name) {
            return Err(EngineError::Conflict(format!(
                "flow template name '{}' already exists",
                new.name
            )));
        }
        let template = FlowTemplate {
            id: t.next_id(),
            flow_meta: new.flow_meta,
            name: new.name,
            bind_args: new.bind_args,
            max_run_instance: new.max_run_instance,
            creator: new.creator,
            created_on: Utc::now(),
        };
        t.templates.insert(template.id, template.clone());
        Ok(template)
    }

    fn get_template(&self, id: i64) -> Result<Option<FlowTemplate>> {
        Ok(self.tables.lock().templates.get(&id).cloned())
    }

    fn get_template_by_name(&self, name: &str) -> Result<Option<FlowTemplate>> {
        Ok(self
            .tables
            .lock()
            .templates
            .values()
            .find(|t| t.name == name)
            .cloned())
    }

    fn list_templates(&self) -> Result<Vec<FlowTemplate>> {
        Ok(self.tables.lock().templates.values().cloned().collect())
    }

    fn insert_instance(&self, new: NewFlowInstance) -> Result<FlowInstance> {
        let mut t = self.tables.lock();
        let now = Utc::now();
        let instance = FlowInstance {
            id: t.next_id(),
            flow_template_id: new.flow_template_id,
            initiator: new.initiator,
            current_step: START_STEP.to_string(),
            status: FlowStatus::Init,
            description: new.description,
            created_on: now,
            updated_on: now,
        };
        t.instances.insert(instance.id, instance.clone());
        Ok(instance)
    }

    fn get_instance(&self, id: i64) -> Result<Option<FlowInstance>> {
        Ok(self.tables.lock().instances.get(&id).cloned())
    }

    fn count_running_instances(&self, template_id: i64) -> Result<usize> {
        Ok(self
            .tables
            .lock()
            .instances
            .values()
            .filter(|i| i.flow_template_id == template_id && !i.status.is_terminal())
            .count())
    }

    fn update_instance_status(&self, id: i64, status: FlowStatus) -> Result<()> {
        let mut t = self.tables.lock();
        let instance = t
            .instances
            .get_mut(&id)
            .ok_or_else(|| not_found("flow instance", id))?;
        instance.status = status;
        instance.updated_on = Utc::now();
        Ok(())
    }

    fn update_instance_step(&self, id: i64, step: &str) -> Result<()> {
        let mut t = self.tables.lock();
        let instance = t
            .instances
            .get_mut(&id)
            .ok_or_else(|| not_found("flow instance", id))?;
        instance.current_step = step.to_string();
        instance.updated_on = Utc::now();
        Ok(())
    }

    fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<FlowInstance>> {
        let t = self.tables.lock();
        Ok(t.instances
            .values()
            .rev()
            .filter(|i| filter.matches(i))
            .take(filter.limit)
            .cloned()
            .collect())
    }

    fn insert_job_instance(
        &self,
        flow_instance_id: i64,
        step: &str,
        trigger_actor: i64,
    ) -> Result<JobInstance> {
        let mut t = self.tables.lock();
        if t.job_instances
            .values()
            .any(|j| j.flow_instance_id == flow_instance_id && j.step_name == step)
        {
            return Err(EngineError::Conflict(format!(
                "job instance for step '{step}' of flow instance {flow_instance_id} already exists"
            )));
        }
        let now = Utc::now();
        let job = JobInstance {
            id: t.next_id(),
            flow_instance_id,
            step_name: step.to_string(),
            status: JobStatus::Running,
            trigger_actor,
            created_on: now,
            updated_on: now,
        };
        t.job_instances.insert(job.id, job.clone());
        Ok(job)
    }

    fn get_job_instance(&self, flow_instance_id: i64, step: &str) -> Result<Option<JobInstance>> {
        Ok(self
            .tables
            .lock()
            .job_instances
            .values()
            .find(|j| j.flow_instance_id == flow_instance_id && j.step_name == step)
            .cloned())
    }

    fn update_job_instance_status(&self, id: i64, status: JobStatus) -> Result<()> {
        let mut t = self.tables.lock();
        let job = t
            .job_instances
            .get_mut(&id)
            .ok_or_else(|| not_found("job instance", id))?;
        job.status = status;
        job.updated_on = Utc::now();
        Ok(())
    }

    fn list_job_instances(&self, flow_instance_id: i64) -> Result<Vec<JobInstance>> {
        Ok(self
            .tables
            .lock()
            .job_instances
            .values()
            .filter(|j| j.flow_instance_id == flow_instance_id)
            .cloned()
            .collect())
    }

    fn insert_action_data(
        &self,
        job_instance_id: i64,
        action: &str,
        actor: i64,
        arguments: &Arguments,
    ) -> Result<JobActionData> {
        let mut t = self.tables.lock();
        if t.actions
            .values()
            .any(|a| a.job_instance_id == job_instance_id && a.action == action)
        {
            return Err(EngineError::Conflict(format!(
                "action '{action}' of job instance {job_instance_id} already recorded"
            )));
        }
        let now = Utc::now();
        let record = JobActionData {
            id: t.next_id(),
            job_instance_id,
            action: action.to_string(),
            actor,
            arguments: arguments.clone(),
            data: None,
            created_on: now,
            updated_on: now,
        };
        t.actions.insert(record.id, record.clone());
        Ok(record)
    }

    fn get_action_data(
        &self,
        job_instance_id: i64,
        action: &str,
    ) -> Result<Option<JobActionData>> {
        Ok(self
            .tables
            .lock()
            .actions
            .values()
            .find(|a| a.job_instance_id == job_instance_id && a.action == action)
            .cloned())
    }

    fn save_action_data(&self, id: i64, data: &Value) -> Result<()> {
        let mut t = self.tables.lock();
        let record = t
            .actions
            .get_mut(&id)
            .ok_or_else(|| not_found("action record", id))?;
        record.data = Some(data.clone());
        record.updated_on = Utc::now();
        Ok(())
    }

    fn delete_action_data(&self, id: i64) -> Result<()> {
        self.tables.lock().actions.remove(&id);
        Ok(())
    }

    fn list_action_data(&self, job_instance_id: i64) -> Result<Vec<JobActionData>> {
        Ok(self
            .tables
            .lock()
            .actions
            .values()
            .filter(|a| a.job_instance_id == job_instance_id)
            .cloned()
            .collect())
    }

    fn context_get(&self, flow_instance_id: i64, key: &str) -> Result<Option<Value>> {
        Ok(self
            .tables
            .lock()
            .context
            .get(&flow_instance_id)
            .and_then(|kv| kv.get(key))
            .cloned())
    }

    fn context_set(&self, flow_instance_id: i64, key: &str, value: &Value) -> Result<()> {
        self.tables
            .lock()
            .context
            .entry(flow_instance_id)
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn context_remove(&self, flow_instance_id: i64, key: &str) -> Result<bool> {
        Ok(self
            .tables
            .lock()
            .context
            .get_mut(&flow_instance_id)
            .and_then(|kv| kv.remove(key))
            .is_some())
    }

    fn context_items(&self, flow_instance_id: i64) -> Result<Vec<(String, Value)>> {
        Ok(self
            .tables
            .lock()
            .context
            .get(&flow_instance_id)
            .map(|kv| kv.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn context_clear(&self, flow_instance_id: i64) -> Result<()> {
        self.tables.lock().context.remove(&flow_instance_id);
        Ok(())
    }
}

impl ActorDirectory for MemoryStorage {
    fn get_actor(&self, id: i64) -> Result<Option<Actor>> {
        Ok(self.tables.lock().actors.get(&id).cloned())
    }

    fn add_actor(&self, email: &str, name: &str) -> Result<Actor> {
        let mut t = self.tables.lock();
        if t.actors.values().any(|a| a.email == email) {
            return Err(EngineError::Conflict(format!(
                "actor with email '{email}' already exists"
            )));
        }
        let actor = Actor {
            id: t.next_id(),
            email: email.to_string(),
            name: name.to_string(),
        };
        t.actors.insert(actor.id, actor.clone());
        Ok(actor)
    }
}
