//! Job definitions: named events, their argument contracts and handlers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::FlowContext;
use crate::error::Result;
use crate::field::FieldRule;
use crate::model::Arguments;
use crate::result::ServiceResult;

/// The mandatory first event of every step.
pub const TRIGGER: &str = "trigger";

/// Which argument sources a value may come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BindMark {
    /// Request, then template, then meta.
    Auto,
    /// Template only.
    Static,
    /// Meta only.
    Const,
}

impl BindMark {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Static => "STATIC",
            Self::Const => "CONST",
        }
    }
}

/// Declaration of one argument of one event.
#[derive(Debug, Clone)]
pub struct JobArg {
    pub name: String,
    pub rule: FieldRule,
    pub mark: BindMark,
    pub comment: String,
}

impl JobArg {
    pub fn new(name: impl Into<String>, rule: FieldRule, mark: BindMark) -> Self {
        Self {
            name: name.into(),
            rule,
            mark,
            comment: String::new(),
        }
    }

    pub fn auto(name: impl Into<String>, rule: FieldRule) -> Self {
        Self::new(name, rule, BindMark::Auto)
    }

    pub fn fixed(name: impl Into<String>, rule: FieldRule) -> Self {
        Self::new(name, rule, BindMark::Static)
    }

    pub fn constant(name: impl Into<String>, rule: FieldRule) -> Self {
        Self::new(name, rule, BindMark::Const)
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

/// Callback run for one event of a job.
///
/// A returned `Err` is an unexpected failure; a business rejection is an
/// `Ok` carrying a non-success [`ServiceResult`].
pub type ActionHandler =
    Arc<dyn Fn(&mut FlowContext<'_>, &Arguments) -> Result<ServiceResult> + Send + Sync>;

/// One declared event: its arguments and its handler.
#[derive(Clone)]
pub struct JobEvent {
    pub args: Vec<JobArg>,
    pub handler: ActionHandler,
}

impl fmt::Debug for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobEvent")
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Immutable job definition.
///
/// Events keep their declaration order so they can be listed without
/// invoking any handler.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub description: String,
    events: Vec<(String, JobEvent)>,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            events: Vec::new(),
        }
    }

    /// Declare `event` with its arguments and handler. Re-declaring an
    /// event replaces it.
    pub fn on<F>(mut self, event: impl Into<String>, args: Vec<JobArg>, handler: F) -> Self
    where
        F: Fn(&mut FlowContext<'_>, &Arguments) -> Result<ServiceResult> + Send + Sync + 'static,
    {
        let event = event.into();
        let entry = JobEvent {
            args,
            handler: Arc::new(handler),
        };
        match self.events.iter_mut().find(|(name, _)| *name == event) {
            Some(slot) => slot.1 = entry,
            None => self.events.push((event, entry)),
        }
        self
    }

    pub fn event(&self, name: &str) -> Option<&JobEvent> {
        self.events
            .iter()
            .find(|(event, _)| event == name)
            .map(|(_, e)| e)
    }

    pub fn events(&self) -> impl Iterator<Item = (&str, &JobEvent)> {
        self.events.iter().map(|(name, e)| (name.as_str(), e))
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.event(name).is_some()
    }
}

/// Binds a step of a flow meta to a job, with the meta's bound args.
#[derive(Debug, Clone)]
pub struct JobRef {
    pub step: String,
    pub job: String,
    /// event → argument map; the most restrictive binding tier.
    pub bind_args: BTreeMap<String, Arguments>,
}

impl JobRef {
    pub fn new(step: impl Into<String>, job: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            job: job.into(),
            bind_args: BTreeMap::new(),
        }
    }

    pub fn bind(mut self, event: impl Into<String>, args: Arguments) -> Self {
        self.bind_args.insert(event.into(), args);
        self
    }

    pub fn bind_args(&self, event: &str) -> Option<&Arguments> {
        self.bind_args.get(event)
    }
}
