//! Persisted records of the engine: templates, instances, job instances,
//! action records and actors.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resolved or raw argument map of one action.
pub type Arguments = serde_json::Map<String, Value>;

/// Template bind args: step → event → argument map.
pub type BindArgs = BTreeMap<String, BTreeMap<String, Arguments>>;

/// A named, parameterized instantiation of a flow meta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowTemplate {
    pub id: i64,
    pub flow_meta: String,
    pub name: String,
    pub bind_args: BindArgs,
    /// Maximum number of non-terminal instances; 0 means unbounded.
    pub max_run_instance: u32,
    pub creator: i64,
    pub created_on: DateTime<Utc>,
}

impl FlowTemplate {
    /// Bound args for `(step, event)`, if the template binds any.
    pub fn bind_args(&self, step: &str, event: &str) -> Option<&Arguments> {
        self.bind_args.get(step).and_then(|events| events.get(event))
    }
}

/// Insert payload for a new template.
#[derive(Debug, Clone)]
pub struct NewFlowTemplate {
    pub flow_meta: String,
    pub name: String,
    pub bind_args: BindArgs,
    pub max_run_instance: u32,
    pub creator: i64,
}

/// Lifecycle status of a flow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStatus {
    Init,
    Running,
    Finished,
    Stopped,
    Exception,
}

impl FlowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Stopped => "STOPPED",
            Self::Exception => "EXCEPTION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INIT" => Some(Self::Init),
            "RUNNING" => Some(Self::Running),
            "FINISHED" => Some(Self::Finished),
            "STOPPED" => Some(Self::Stopped),
            "EXCEPTION" => Some(Self::Exception),
            _ => None,
        }
    }

    /// FINISHED, STOPPED and EXCEPTION absorb every further action.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Stopped | Self::Exception)
    }
}

impl std::fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of a flow template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowInstance {
    pub id: i64,
    pub flow_template_id: i64,
    pub initiator: i64,
    pub current_step: String,
    pub status: FlowStatus,
    pub description: String,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

/// Insert payload for a new instance. Stored as INIT at step `start`.
#[derive(Debug, Clone)]
pub struct NewFlowInstance {
    pub flow_template_id: i64,
    pub initiator: i64,
    pub description: String,
}

/// Lifecycle status of a job instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Finished,
    Stopped,
    Exception,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Stopped => "STOPPED",
            Self::Exception => "EXCEPTION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RUNNING" => Some(Self::Running),
            "FINISHED" => Some(Self::Finished),
            "STOPPED" => Some(Self::Stopped),
            "EXCEPTION" => Some(Self::Exception),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run record of one step within one flow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInstance {
    pub id: i64,
    pub flow_instance_id: i64,
    pub step_name: String,
    pub status: JobStatus,
    pub trigger_actor: i64,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

/// Record of one executed action. `(job_instance_id, action)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobActionData {
    pub id: i64,
    pub job_instance_id: i64,
    pub action: String,
    pub actor: i64,
    pub arguments: Arguments,
    pub data: Option<Value>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

/// A person allowed to start flows and act on steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub email: String,
    pub name: String,
}

/// Filter for instance listings, paged by descending id.
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    pub status: Option<FlowStatus>,
    pub flow_template_id: Option<i64>,
    /// Only instances with an id below this one.
    pub offset_id: Option<i64>,
    pub limit: usize,
}

impl InstanceFilter {
    pub fn matches(&self, instance: &FlowInstance) -> bool {
        self.status.is_none_or(|s| s == instance.status)
            && self
                .flow_template_id
                .is_none_or(|t| t == instance.flow_template_id)
            && self.offset_id.is_none_or(|o| instance.id < o)
    }
}
