//! Flow execution engine.
//!
//! `FlowExecutor` owns the step-transition state machine: `start_flow`
//! creates and initializes an instance, `handle_job_action` validates and
//! applies one action against the active step. Both return a
//! [`ServiceResult`] and never an error.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::binding::{ArgSources, ArgumentError, resolve_args};
use crate::context::{ActionScope, FlowContext, Signal};
use crate::error::EngineError;
use crate::field::FieldRule;
use crate::flow::{FINISH_STEP, FlowMeta, START_STEP};
use crate::job::TRIGGER;
use crate::lock::{NamedLock, with_lock};
use crate::model::{Arguments, FlowInstance, FlowStatus, JobInstance, JobStatus, NewFlowInstance};
use crate::registry::Definitions;
use crate::result::{Rejection, ServiceResult};
use crate::storage::{ActorDirectory, FlowStorage};

type Outcome<T> = std::result::Result<T, Rejection>;

/// Longest accepted instance description, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 128;

/// Default prefix of named lock keys.
pub const DEFAULT_LOCK_NAMESPACE: &str = "acolyte";

fn reject(reason: &str) -> Rejection {
    Rejection::bad_request(reason)
}

/// Storage conflicts on insert mean a concurrent caller got there first.
fn conflict_as(reason: &'static str) -> impl FnOnce(EngineError) -> Rejection {
    move |err| match err {
        EngineError::Conflict(_) => reject(reason),
        other => other.into(),
    }
}

/// Runs flow instances against registered definitions.
pub struct FlowExecutor {
    definitions: Arc<Definitions>,
    storage: Arc<dyn FlowStorage>,
    actors: Arc<dyn ActorDirectory>,
    locks: Arc<dyn NamedLock>,
    lock_namespace: String,
}

impl FlowExecutor {
    pub fn new(
        definitions: Arc<Definitions>,
        storage: Arc<dyn FlowStorage>,
        actors: Arc<dyn ActorDirectory>,
        locks: Arc<dyn NamedLock>,
    ) -> Self {
        Self {
            definitions,
            storage,
            actors,
            locks,
            lock_namespace: DEFAULT_LOCK_NAMESPACE.to_string(),
        }
    }

    /// Prefix for lock keys.
    pub fn with_lock_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.lock_namespace = namespace.into();
        self
    }

    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    fn lock_key(&self, kind: &str, id: i64) -> String {
        format!("{}:{kind}:{id}", self.lock_namespace)
    }

    // ─────────────────────────────────────────────────────────────────────
    // start_flow
    // ─────────────────────────────────────────────────────────────────────

    /// Create an instance of `template_id`, run the start hook and mark it
    /// RUNNING. On success the payload is the instance.
    pub fn start_flow(
        &self,
        template_id: i64,
        initiator: i64,
        description: &str,
        args: &Arguments,
    ) -> ServiceResult {
        match self.try_start_flow(template_id, initiator, description, args) {
            Ok(instance) => ServiceResult::ok_view(&instance),
            Err(rejection) => {
                debug!(template_id, reason = %rejection.reason, "start_flow rejected");
                rejection.into()
            }
        }
    }

    fn try_start_flow(
        &self,
        template_id: i64,
        initiator: i64,
        description: &str,
        args: &Arguments,
    ) -> Outcome<FlowInstance> {
        let template = self
            .storage
            .get_template(template_id)?
            .ok_or_else(|| reject("invalid_flow_template"))?;
        let meta = self
            .definitions
            .meta(&template.flow_meta)
            .ok_or_else(|| reject("invalid_flow_meta"))?;
        if !self.actors.actor_exists(initiator)? {
            return Err(reject("invalid_initiator"));
        }

        FieldRule::string()
            .optional()
            .max_len(MAX_DESCRIPTION_LEN)
            .apply("description", Some(&Value::from(description)))
            .map_err(|error| ArgumentError {
                qualifier: "start".into(),
                error,
            })?;

        let start_args = resolve_args(
            "start",
            &meta.start_rules,
            ArgSources {
                request: Some(args),
                template: None,
                meta: Some(&meta.start_args),
            },
        )?;

        let new = NewFlowInstance {
            flow_template_id: template.id,
            initiator,
            description: description.to_string(),
        };
        let instance = if template.max_run_instance > 0 {
            let limit = template.max_run_instance as usize;
            let key = self.lock_key("flow_template", template.id);
            with_lock(self.locks.as_ref(), &key, || -> Outcome<FlowInstance> {
                let running = self.storage.count_running_instances(template.id)?;
                if running >= limit {
                    debug!(template_id, running, limit, "Instance limit reached");
                    return Err(reject("too_many_instance"));
                }
                Ok(self.storage.insert_instance(new)?)
            })??
        } else {
            self.storage.insert_instance(new)?
        };
        info!(
            instance_id = instance.id,
            template_id,
            meta = %meta.name,
            "Flow instance created"
        );

        let mut ctx = FlowContext::for_flow(self.storage.as_ref(), instance.id);
        if let Err(e) = meta.hooks().on_start(&mut ctx, &start_args) {
            return Err(self.hook_failed(meta, instance.id, "start", e));
        }

        if meta.steps().is_empty() {
            self.finish_instance(meta, instance.id)?;
        } else {
            self.storage
                .update_instance_status(instance.id, FlowStatus::Running)?;
        }

        let instance = self
            .storage
            .get_instance(instance.id)?
            .ok_or_else(|| EngineError::NotFound(format!("flow instance {}", instance.id)))?;
        Ok(instance)
    }

    // ─────────────────────────────────────────────────────────────────────
    // handle_job_action
    // ─────────────────────────────────────────────────────────────────────

    /// Apply `action` of `step` to an instance on behalf of `actor`.
    ///
    /// Returns the handler's result on success. Calls on the same instance
    /// are serialized.
    pub fn handle_job_action(
        &self,
        instance_id: i64,
        step: &str,
        action: &str,
        actor: i64,
        args: &Arguments,
    ) -> ServiceResult {
        let key = self.lock_key("flow_instance", instance_id);
        let outcome = match with_lock(self.locks.as_ref(), &key, || {
            self.try_handle_job_action(instance_id, step, action, actor, args)
        }) {
            Ok(outcome) => outcome,
            Err(e) => Err(e.into()),
        };
        match outcome {
            Ok(result) => result,
            Err(rejection) => {
                debug!(instance_id, step, action, reason = %rejection.reason, "Action rejected");
                rejection.into()
            }
        }
    }

    fn try_handle_job_action(
        &self,
        instance_id: i64,
        step: &str,
        action: &str,
        actor: i64,
        args: &Arguments,
    ) -> Outcome<ServiceResult> {
        let instance = self
            .storage
            .get_instance(instance_id)?
            .ok_or_else(|| reject("invalid_flow_instance"))?;
        if instance.status != FlowStatus::Running {
            return Err(reject("invalid_status"));
        }

        let template = self
            .storage
            .get_template(instance.flow_template_id)?
            .ok_or_else(|| reject("unknown_flow_template"))?;
        let meta = self
            .definitions
            .meta(&template.flow_meta)
            .ok_or_else(|| reject("unknown_flow_meta"))?;
        if !self.actors.actor_exists(actor)? {
            return Err(reject("invalid_actor"));
        }

        let job_ref = meta
            .job_ref(step)
            .ok_or_else(|| reject("unknown_target_step"))?;
        let job = self
            .definitions
            .job(&job_ref.job)
            .ok_or_else(|| reject("unknown_job"))?;
        let event = job
            .event(action)
            .ok_or_else(|| reject("unknown_action_handler"))?;

        let existing = self.check_transition(meta, &instance, step, action)?;

        let resolved = resolve_args(
            &format!("{step}.{action}"),
            &event.args,
            ArgSources {
                request: Some(args),
                template: template.bind_args(step, action),
                meta: job_ref.bind_args(action),
            },
        )?;

        let job_instance = match existing {
            Some(job_instance) => job_instance,
            None => {
                let job_instance = self
                    .storage
                    .insert_job_instance(instance.id, step, actor)
                    .map_err(conflict_as("action_already_runned"))?;
                self.storage.update_instance_step(instance.id, step)?;
                info!(instance_id, step, "Step triggered");
                job_instance
            }
        };

        let record = self
            .storage
            .insert_action_data(job_instance.id, action, actor, &resolved)
            .map_err(conflict_as("action_already_runned"))?;

        let mut ctx = FlowContext::for_action(
            self.storage.as_ref(),
            instance.id,
            ActionScope {
                step: step.to_string(),
                action: action.to_string(),
                job_instance_id: job_instance.id,
                action_data_id: record.id,
            },
        );
        let result = match (event.handler)(&mut ctx, &resolved) {
            Ok(result) => result,
            Err(e) => {
                error!(instance_id, step, action, error = %e, "Action handler failed");
                self.storage.delete_action_data(record.id)?;
                return Err(Rejection::service_error("handler_failed", e.to_string()));
            }
        };
        let signal = ctx.signal();

        if !result.is_success() {
            warn!(
                instance_id,
                step,
                action,
                reason = result.reason().unwrap_or_default(),
                "Action rejected by handler, rolling back"
            );
            self.storage.delete_action_data(record.id)?;
            return Ok(result);
        }

        match signal {
            Some(Signal::Stop) => {
                let stop_args = match self.stop_args(meta) {
                    Ok(stop_args) => stop_args,
                    Err(rejection) => {
                        self.storage.delete_action_data(record.id)?;
                        return Err(rejection);
                    }
                };
                self.stop_instance(meta, instance.id, &job_instance, &stop_args)?
            }
            Some(Signal::Finish) => {
                self.storage
                    .update_job_instance_status(job_instance.id, JobStatus::Finished)?;
                info!(instance_id, step, "Step finished");
                if meta.next_step(step) == Some(FINISH_STEP) {
                    self.finish_instance(meta, instance.id)?;
                }
            }
            None => {}
        }

        Ok(result)
    }

    /// State-machine guard. Returns the job instance of `step` when the
    /// action targets the current step, `None` when it triggers the next.
    fn check_transition(
        &self,
        meta: &FlowMeta,
        instance: &FlowInstance,
        step: &str,
        action: &str,
    ) -> Outcome<Option<JobInstance>> {
        let current = instance.current_step.as_str();

        if step == current {
            let job_instance = self
                .storage
                .get_job_instance(instance.id, step)?
                .ok_or_else(|| reject("unknown_current_step"))?;
            if job_instance.status == JobStatus::Finished {
                return Err(reject("step_already_runned"));
            }
            if self
                .storage
                .get_action_data(job_instance.id, action)?
                .is_some()
            {
                return Err(reject("action_already_runned"));
            }
            if action != TRIGGER
                && self
                    .storage
                    .get_action_data(job_instance.id, TRIGGER)?
                    .is_none()
            {
                return Err(reject("no_trigger"));
            }
            return Ok(Some(job_instance));
        }

        if current != START_STEP {
            let current_job = self
                .storage
                .get_job_instance(instance.id, current)?
                .ok_or_else(|| reject("unknown_current_step"))?;
            if current_job.status != JobStatus::Finished {
                return Err(reject("current_step_unfinished"));
            }
        }
        if meta.next_step(current) != Some(step) {
            return Err(reject("invalid_target_step"));
        }
        if action != TRIGGER {
            return Err(reject("no_trigger"));
        }
        Ok(None)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Terminal transitions
    // ─────────────────────────────────────────────────────────────────────

    fn finish_instance(&self, meta: &FlowMeta, instance_id: i64) -> Outcome<()> {
        self.storage
            .update_instance_status(instance_id, FlowStatus::Finished)?;
        info!(instance_id, meta = %meta.name, "Flow instance finished");

        let mut ctx = FlowContext::for_flow(self.storage.as_ref(), instance_id);
        meta.hooks()
            .on_finish(&mut ctx)
            .map_err(|e| self.hook_failed(meta, instance_id, "finish", e))
    }

    /// Stop args of a registered meta already resolved at registration.
    fn stop_args(&self, meta: &FlowMeta) -> Outcome<Arguments> {
        Ok(resolve_args(
            "stop",
            &meta.stop_rules,
            ArgSources {
                meta: Some(&meta.stop_args),
                ..Default::default()
            },
        )?)
    }

    fn stop_instance(
        &self,
        meta: &FlowMeta,
        instance_id: i64,
        job: &JobInstance,
        stop_args: &Arguments,
    ) -> Outcome<()> {
        self.storage
            .update_job_instance_status(job.id, JobStatus::Stopped)?;
        self.storage
            .update_instance_status(instance_id, FlowStatus::Stopped)?;
        info!(instance_id, step = %job.step_name, "Flow instance stopped");

        let mut ctx = FlowContext::for_flow(self.storage.as_ref(), instance_id);
        meta.hooks()
            .on_stop(&mut ctx, stop_args)
            .map_err(|e| self.hook_failed(meta, instance_id, "stop", e))
    }

    fn hook_failed(&self, meta: &FlowMeta, instance_id: i64, hook: &str, err: EngineError) -> Rejection {
        error!(instance_id, hook, error = %err, "Flow hook failed");
        self.mark_exception(meta, instance_id, &err);
        Rejection::service_error("hook_failed", format!("{hook} hook: {err}"))
    }

    /// Move the instance to EXCEPTION and tell the meta. Failures here are
    /// logged only.
    fn mark_exception(&self, meta: &FlowMeta, instance_id: i64, err: &EngineError) {
        if let Err(e) = self
            .storage
            .update_instance_status(instance_id, FlowStatus::Exception)
        {
            error!(instance_id, error = %e, "Failed to mark flow instance as EXCEPTION");
            return;
        }
        warn!(instance_id, meta = %meta.name, "Flow instance moved to EXCEPTION");

        let mut ctx = FlowContext::for_flow(self.storage.as_ref(), instance_id);
        if let Err(e) = meta.hooks().on_exception(&mut ctx, err) {
            error!(instance_id, error = %e, "Exception hook failed");
        }
    }
}
