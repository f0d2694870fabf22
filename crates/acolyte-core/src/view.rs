//! Serializable views returned in [`ServiceResult`](crate::ServiceResult)
//! payloads.

use serde::Serialize;
use serde_json::Value;

use crate::field::{FieldKind, FieldRule};
use crate::flow::FlowMeta;
use crate::job::{BindMark, JobArg, JobRef, JobSpec};
use crate::model::{FlowInstance, JobActionData, JobInstance};

#[derive(Debug, Clone, Serialize)]
pub struct FieldInfoView {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
}

impl From<&FieldRule> for FieldInfoView {
    fn from(rule: &FieldRule) -> Self {
        let mut view = FieldInfoView {
            kind: rule.kind.type_name(),
            required: rule.required,
            default: rule.default.clone(),
            min: None,
            max: None,
            min_len: None,
            max_len: None,
            regex: None,
        };
        match &rule.kind {
            FieldKind::Int { min, max } => {
                view.min = min.map(Value::from);
                view.max = max.map(Value::from);
            }
            FieldKind::Float { min, max } => {
                view.min = min.map(Value::from);
                view.max = max.map(Value::from);
            }
            FieldKind::Str {
                min_len,
                max_len,
                regex,
            } => {
                view.min_len = *min_len;
                view.max_len = *max_len;
                view.regex = regex.as_ref().map(|r| r.as_str().to_string());
            }
            _ => {}
        }
        view
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobArgView {
    pub name: String,
    pub mark: BindMark,
    pub comment: String,
    pub field: FieldInfoView,
}

impl From<&JobArg> for JobArgView {
    fn from(arg: &JobArg) -> Self {
        Self {
            name: arg.name.clone(),
            mark: arg.mark,
            comment: arg.comment.clone(),
            field: (&arg.rule).into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobEventView {
    pub name: String,
    pub args: Vec<JobArgView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub name: String,
    pub description: String,
    pub events: Vec<JobEventView>,
}

impl From<&JobSpec> for JobView {
    fn from(job: &JobSpec) -> Self {
        Self {
            name: job.name.clone(),
            description: job.description.clone(),
            events: job
                .events()
                .map(|(name, event)| JobEventView {
                    name: name.to_string(),
                    args: event.args.iter().map(JobArgView::from).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRefView {
    pub step: String,
    pub job: String,
}

impl From<&JobRef> for JobRefView {
    fn from(r: &JobRef) -> Self {
        Self {
            step: r.step.clone(),
            job: r.job.clone(),
        }
    }
}

/// Summary of a flow meta.
#[derive(Debug, Clone, Serialize)]
pub struct FlowMetaView {
    pub name: String,
    pub description: String,
    pub steps: Vec<JobRefView>,
}

impl From<&FlowMeta> for FlowMetaView {
    fn from(meta: &FlowMeta) -> Self {
        Self {
            name: meta.name.clone(),
            description: meta.description.clone(),
            steps: meta.steps().iter().map(JobRefView::from).collect(),
        }
    }
}

/// One step of a meta with its job's full contract.
#[derive(Debug, Clone, Serialize)]
pub struct StepDetailView {
    pub step: String,
    pub job: JobView,
    /// Values the meta binds, per event.
    pub bind_args: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowMetaDetailView {
    pub name: String,
    pub description: String,
    pub start_args: Vec<JobArgView>,
    pub stop_args: Vec<JobArgView>,
    pub steps: Vec<StepDetailView>,
}

/// A job instance with its action records.
#[derive(Debug, Clone, Serialize)]
pub struct JobInstanceView {
    #[serde(flatten)]
    pub job_instance: JobInstance,
    pub actions: Vec<JobActionData>,
}

/// A flow instance with its job instances.
#[derive(Debug, Clone, Serialize)]
pub struct FlowInstanceView {
    #[serde(flatten)]
    pub instance: FlowInstance,
    pub job_instances: Vec<JobInstanceView>,
}
