//! Flow meta definitions and lifecycle hooks.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::context::FlowContext;
use crate::error::{EngineError, Result};
use crate::job::{JobArg, JobRef};
use crate::model::Arguments;

/// Sentinel step of an instance that has not triggered any step yet.
pub const START_STEP: &str = "start";

/// Sentinel successor of the last step.
pub const FINISH_STEP: &str = "finish";

/// Flow-level lifecycle callbacks.
///
/// Hooks run with a flow-scoped context: they may read and write context
/// keys but cannot `save` action data, and their finish/stop signals are
/// ignored.
pub trait FlowHooks: Send + Sync {
    /// Called once after the instance row is created, before it is RUNNING.
    fn on_start(&self, _ctx: &mut FlowContext<'_>, _args: &Arguments) -> Result<()> {
        Ok(())
    }

    /// Called after a step handler stopped the instance.
    fn on_stop(&self, _ctx: &mut FlowContext<'_>, _args: &Arguments) -> Result<()> {
        Ok(())
    }

    /// Called after the last step finished.
    fn on_finish(&self, _ctx: &mut FlowContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called after the instance moved to EXCEPTION. An error returned here
    /// is logged and otherwise ignored.
    fn on_exception(&self, _ctx: &mut FlowContext<'_>, _error: &EngineError) -> Result<()> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl FlowHooks for NoopHooks {}

/// Immutable flow definition: an ordered list of steps.
#[derive(Clone)]
pub struct FlowMeta {
    pub name: String,
    pub description: String,
    steps: Vec<JobRef>,
    pub start_rules: Vec<JobArg>,
    pub start_args: Arguments,
    pub stop_rules: Vec<JobArg>,
    pub stop_args: Arguments,
    hooks: Arc<dyn FlowHooks>,
}

impl fmt::Debug for FlowMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowMeta")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("start_args", &self.start_args)
            .field("stop_args", &self.stop_args)
            .finish_non_exhaustive()
    }
}

impl FlowMeta {
    /// Build a meta from its steps. Step names must be unique and must not
    /// collide with the `start`/`finish` sentinels.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        steps: Vec<JobRef>,
    ) -> Result<Self> {
        let name = name.into();
        let mut seen = HashSet::new();
        for step in &steps {
            if step.step == START_STEP || step.step == FINISH_STEP {
                return Err(EngineError::InvalidDefinition(format!(
                    "flow meta '{name}': step name '{}' is reserved",
                    step.step
                )));
            }
            if !seen.insert(step.step.as_str()) {
                return Err(EngineError::InvalidDefinition(format!(
                    "flow meta '{name}': duplicate step '{}'",
                    step.step
                )));
            }
        }

        Ok(Self {
            name,
            description: description.into(),
            steps,
            start_rules: Vec::new(),
            start_args: Arguments::new(),
            stop_rules: Vec::new(),
            stop_args: Arguments::new(),
            hooks: Arc::new(NoopHooks),
        })
    }

    pub fn with_start_args(mut self, rules: Vec<JobArg>, defaults: Arguments) -> Self {
        self.start_rules = rules;
        self.start_args = defaults;
        self
    }

    pub fn with_stop_args(mut self, rules: Vec<JobArg>, defaults: Arguments) -> Self {
        self.stop_rules = rules;
        self.stop_args = defaults;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn FlowHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn hooks(&self) -> &dyn FlowHooks {
        self.hooks.as_ref()
    }

    pub fn steps(&self) -> &[JobRef] {
        &self.steps
    }

    pub(crate) fn replace_steps(&mut self, steps: Vec<JobRef>) {
        self.steps = steps;
    }

    pub fn job_ref(&self, step: &str) -> Option<&JobRef> {
        self.steps.iter().find(|r| r.step == step)
    }

    /// Successor of `current`: `start` maps to the first step, the last
    /// step maps to `finish`. Unknown steps have no successor.
    pub fn next_step(&self, current: &str) -> Option<&str> {
        if current == START_STEP {
            return Some(self.steps.first().map_or(FINISH_STEP, |r| r.step.as_str()));
        }
        let idx = self.steps.iter().position(|r| r.step == current)?;
        Some(
            self.steps
                .get(idx + 1)
                .map_or(FINISH_STEP, |r| r.step.as_str()),
        )
    }
}
