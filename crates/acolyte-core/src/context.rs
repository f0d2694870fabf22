//! Execution context handed to job handlers and flow hooks.
//!
//! The context never calls back into the executor. Handlers record their
//! outcome as a [`Signal`]; the executor reads it after the handler returns
//! and performs the transition itself.

use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::storage::FlowStorage;

/// Outcome a handler declares for its step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The current step is complete.
    Finish,
    /// The whole instance terminates.
    Stop,
}

/// Identity of the action record a step context is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionScope {
    pub step: String,
    pub action: String,
    pub job_instance_id: i64,
    pub action_data_id: i64,
}

/// Handle over one flow instance's persistent key/value store, optionally
/// bound to one action record.
pub struct FlowContext<'a> {
    store: &'a dyn FlowStorage,
    flow_instance_id: i64,
    scope: Option<ActionScope>,
    signal: Option<Signal>,
}

impl<'a> FlowContext<'a> {
    /// Flow-scoped context, used by the lifecycle hooks.
    pub fn for_flow(store: &'a dyn FlowStorage, flow_instance_id: i64) -> Self {
        Self {
            store,
            flow_instance_id,
            scope: None,
            signal: None,
        }
    }

    /// Context bound to one action record, used by step handlers.
    pub fn for_action(store: &'a dyn FlowStorage, flow_instance_id: i64, scope: ActionScope) -> Self {
        Self {
            store,
            flow_instance_id,
            scope: Some(scope),
            signal: None,
        }
    }

    pub fn flow_instance_id(&self) -> i64 {
        self.flow_instance_id
    }

    /// Step this context acts on, if any.
    pub fn step(&self) -> Option<&str> {
        self.scope.as_ref().map(|s| s.step.as_str())
    }

    pub fn scope(&self) -> Option<&ActionScope> {
        self.scope.as_ref()
    }

    // ── Key/Value Store ─────────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.store.context_get(self.flow_instance_id, key)
    }

    /// Last write wins.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.store
            .context_set(self.flow_instance_id, key, &value.into())
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        self.store.context_remove(self.flow_instance_id, key)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.items()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.items()?.into_iter().map(|(k, _)| k).collect())
    }

    pub fn items(&self) -> Result<Vec<(String, Value)>> {
        self.store.context_items(self.flow_instance_id)
    }

    /// Remove every key of this instance.
    pub fn clear(&self) -> Result<()> {
        self.store.context_clear(self.flow_instance_id)
    }

    // ── Action Data ─────────────────────────────────────────────────────

    /// Overwrite the data of the bound action record.
    pub fn save(&self, data: impl Into<Value>) -> Result<()> {
        let scope = self.scope.as_ref().ok_or(EngineError::NoActionScope)?;
        self.store.save_action_data(scope.action_data_id, &data.into())
    }

    // ── Signals ─────────────────────────────────────────────────────────

    /// Declare the current step complete. Has no effect after `stop`.
    pub fn finish(&mut self) {
        if self.signal != Some(Signal::Stop) {
            self.signal = Some(Signal::Finish);
        }
    }

    /// Declare the whole instance terminated.
    pub fn stop(&mut self) {
        self.signal = Some(Signal::Stop);
    }

    pub fn signal(&self) -> Option<Signal> {
        self.signal
    }
}

impl std::fmt::Debug for FlowContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowContext")
            .field("flow_instance_id", &self.flow_instance_id)
            .field("scope", &self.scope)
            .field("signal", &self.signal)
            .finish()
    }
}
