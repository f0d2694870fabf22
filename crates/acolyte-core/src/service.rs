//! Management and read API over definitions and persisted flows.

use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::binding::validate_template_bind_args;
use crate::error::EngineError;
use crate::model::{Actor, BindArgs, FlowStatus, FlowTemplate, InstanceFilter, NewFlowTemplate};
use crate::registry::Definitions;
use crate::result::{Rejection, ServiceResult, StatusCode};
use crate::storage::{ActorDirectory, FlowStorage};
use crate::view::{
    FlowInstanceView, FlowMetaDetailView, FlowMetaView, JobArgView, JobInstanceView, JobView,
    StepDetailView,
};

type Outcome<T> = std::result::Result<T, Rejection>;

/// Page size when the caller passes 0.
pub const DEFAULT_PAGE_SIZE: usize = 20;
/// Largest accepted page size.
pub const MAX_PAGE_SIZE: usize = 100;
pub const MAX_TEMPLATE_NAME_LEN: usize = 64;

fn not_found(reason: &str) -> Rejection {
    Rejection {
        status: StatusCode::NotFound,
        reason: reason.to_string(),
        message: None,
        detail: None,
    }
}

fn respond<T: Serialize>(outcome: Outcome<T>) -> ServiceResult {
    match outcome {
        Ok(view) => ServiceResult::ok_view(&view),
        Err(rejection) => rejection.into(),
    }
}

/// Query and management operations. Shares definitions and storage with
/// the [`FlowExecutor`](crate::FlowExecutor).
pub struct FlowService {
    definitions: Arc<Definitions>,
    storage: Arc<dyn FlowStorage>,
    actors: Arc<dyn ActorDirectory>,
}

impl FlowService {
    pub fn new(
        definitions: Arc<Definitions>,
        storage: Arc<dyn FlowStorage>,
        actors: Arc<dyn ActorDirectory>,
    ) -> Self {
        Self {
            definitions,
            storage,
            actors,
        }
    }

    // ── Definitions ─────────────────────────────────────────────────────

    pub fn get_all_flow_meta(&self) -> ServiceResult {
        let metas: Vec<FlowMetaView> = self.definitions.metas.all().map(Into::into).collect();
        ServiceResult::ok_view(&metas)
    }

    pub fn get_flow_meta_info(&self, name: &str) -> ServiceResult {
        respond(self.flow_meta_info(name))
    }

    fn flow_meta_info(&self, name: &str) -> Outcome<FlowMetaDetailView> {
        let meta = self
            .definitions
            .meta(name)
            .ok_or_else(|| not_found("flow_meta_not_exist"))?;

        let mut steps = Vec::with_capacity(meta.steps().len());
        for job_ref in meta.steps() {
            let job = self.definitions.jobs.get(&job_ref.job).map_err(EngineError::from)?;
            steps.push(StepDetailView {
                step: job_ref.step.clone(),
                job: job.into(),
                bind_args: serde_json::to_value(&job_ref.bind_args).map_err(EngineError::from)?,
            });
        }
        Ok(FlowMetaDetailView {
            name: meta.name.clone(),
            description: meta.description.clone(),
            start_args: meta.start_rules.iter().map(JobArgView::from).collect(),
            stop_args: meta.stop_rules.iter().map(JobArgView::from).collect(),
            steps,
        })
    }

    pub fn get_all_jobs(&self) -> ServiceResult {
        let jobs: Vec<JobView> = self.definitions.jobs.all().map(Into::into).collect();
        ServiceResult::ok_view(&jobs)
    }

    pub fn get_job_info(&self, name: &str) -> ServiceResult {
        respond(
            self.definitions
                .job(name)
                .map(JobView::from)
                .ok_or_else(|| not_found("job_not_exist")),
        )
    }

    // ── Templates ───────────────────────────────────────────────────────

    /// Create a template after pre-validating its bind args against every
    /// job event of the meta. The coerced bind args are stored.
    pub fn create_flow_template(
        &self,
        flow_meta: &str,
        name: &str,
        bind_args: &BindArgs,
        max_run_instance: i64,
        creator: i64,
    ) -> ServiceResult {
        respond(self.try_create_flow_template(flow_meta, name, bind_args, max_run_instance, creator))
    }

    fn try_create_flow_template(
        &self,
        flow_meta: &str,
        name: &str,
        bind_args: &BindArgs,
        max_run_instance: i64,
        creator: i64,
    ) -> Outcome<FlowTemplate> {
        let meta = self
            .definitions
            .meta(flow_meta)
            .ok_or_else(|| Rejection::bad_request("flow_meta_not_exist"))?;

        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_TEMPLATE_NAME_LEN {
            return Err(Rejection::bad_request("invalid_template_name"));
        }
        if self.storage.get_template_by_name(name)?.is_some() {
            return Err(Rejection::bad_request("name_already_exist"));
        }
        if !self.actors.actor_exists(creator)? {
            return Err(Rejection::bad_request("invalid_creator_id"));
        }
        let max_run_instance = u32::try_from(max_run_instance)
            .map_err(|_| Rejection::bad_request("invalid_max_run_instance"))?;

        let bind_args = validate_template_bind_args(meta, &self.definitions.jobs, bind_args)?;

        let template = self
            .storage
            .insert_template(NewFlowTemplate {
                flow_meta: meta.name.clone(),
                name: name.to_string(),
                bind_args,
                max_run_instance,
                creator,
            })
            .map_err(|e| match e {
                EngineError::Conflict(_) => Rejection::bad_request("name_already_exist"),
                other => other.into(),
            })?;
        info!(template_id = template.id, name, meta = flow_meta, "Flow template created");
        Ok(template)
    }

    pub fn get_all_flow_templates(&self) -> ServiceResult {
        respond(self.storage.list_templates().map_err(Rejection::from))
    }

    pub fn get_flow_template(&self, id: i64) -> ServiceResult {
        respond(
            self.storage
                .get_template(id)
                .map_err(Rejection::from)
                .and_then(|t| t.ok_or_else(|| not_found("flow_template_not_exist"))),
        )
    }

    // ── Instances ───────────────────────────────────────────────────────

    /// An instance with its job instances and their action records.
    pub fn get_flow_instance(&self, id: i64) -> ServiceResult {
        respond(self.flow_instance(id))
    }

    fn flow_instance(&self, id: i64) -> Outcome<FlowInstanceView> {
        let instance = self
            .storage
            .get_instance(id)?
            .ok_or_else(|| not_found("flow_instance_not_exist"))?;
        let job_instances = self
            .storage
            .list_job_instances(id)?
            .into_iter()
            .map(|job_instance| -> crate::Result<JobInstanceView> {
                let actions = self.storage.list_action_data(job_instance.id)?;
                Ok(JobInstanceView {
                    job_instance,
                    actions,
                })
            })
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(FlowInstanceView {
            instance,
            job_instances,
        })
    }

    /// Instances newest first, paged by `offset_id` (exclusive upper id
    /// bound). A `limit` of 0 selects the default page size.
    pub fn get_flow_instances(
        &self,
        status: Option<&str>,
        template_id: Option<i64>,
        offset_id: Option<i64>,
        limit: usize,
    ) -> ServiceResult {
        let status = match status.map(FlowStatus::parse) {
            Some(None) => return ServiceResult::bad_request("invalid_status", None),
            Some(parsed) => parsed,
            None => None,
        };
        let limit = match limit {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };
        let filter = InstanceFilter {
            status,
            flow_template_id: template_id,
            offset_id,
            limit,
        };
        respond(self.storage.list_instances(&filter).map_err(Rejection::from))
    }

    // ── Actors ──────────────────────────────────────────────────────────

    pub fn get_actor(&self, id: i64) -> ServiceResult {
        respond(
            self.actors
                .get_actor(id)
                .map_err(Rejection::from)
                .and_then(|a| a.ok_or_else(|| not_found("actor_not_exist"))),
        )
    }

    pub fn add_actor(&self, email: &str, name: &str) -> ServiceResult {
        respond(self.try_add_actor(email, name))
    }

    fn try_add_actor(&self, email: &str, name: &str) -> Outcome<Actor> {
        let valid_email = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
            .map(|re| re.is_match(email))
            .unwrap_or(false);
        if !valid_email {
            return Err(Rejection::bad_request("invalid_email"));
        }
        if name.trim().is_empty() {
            return Err(Rejection::bad_request("invalid_name"));
        }
        let actor = self
            .actors
            .add_actor(email, name.trim())
            .map_err(|e| match e {
                EngineError::Conflict(_) => Rejection::bad_request("email_already_exist"),
                other => other.into(),
            })?;
        info!(actor_id = actor.id, "Actor added");
        Ok(actor)
    }
}
