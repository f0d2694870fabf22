//! Definition registries for flow metas and jobs.
//!
//! Registration happens through ordinary calls at startup; the populated
//! [`Definitions`] is then shared read-only (behind an `Arc`) with the
//! executor and the service.

use std::collections::HashMap;

use crate::binding::{ArgSources, resolve_args};
use crate::error::{EngineError, RegistryError, Result};
use crate::flow::FlowMeta;
use crate::job::{BindMark, JobSpec};

/// Name-keyed registry that keeps registration order.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    kind: &'static str,
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, item: T) -> std::result::Result<(), RegistryError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(RegistryError::AlreadyExists {
                kind: self.kind,
                name,
            });
        }
        self.index.insert(name, self.items.len());
        self.items.push(item);
        Ok(())
    }

    pub fn get(&self, name: &str) -> std::result::Result<&T, RegistryError> {
        self.index
            .get(name)
            .map(|&i| &self.items[i])
            .ok_or_else(|| RegistryError::NotFound {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registered definitions in registration order. Restartable.
    pub fn all(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The two registries the engine reads from.
#[derive(Debug, Clone)]
pub struct Definitions {
    pub metas: Registry<FlowMeta>,
    pub jobs: Registry<JobSpec>,
}

impl Default for Definitions {
    fn default() -> Self {
        Self::new()
    }
}

impl Definitions {
    pub fn new() -> Self {
        Self {
            metas: Registry::new("flow meta"),
            jobs: Registry::new("job"),
        }
    }

    pub fn register_job(&mut self, job: JobSpec) -> Result<()> {
        self.jobs.register(job.name.clone(), job)?;
        Ok(())
    }

    /// Register a meta whose jobs are already registered.
    ///
    /// Meta-bound values are coerced through their field rules here, so the
    /// resolver can treat them as well-typed at action time.
    pub fn register_meta(&mut self, mut meta: FlowMeta) -> Result<()> {
        if self.metas.contains(&meta.name) {
            return Err(RegistryError::AlreadyExists {
                kind: "flow meta",
                name: meta.name,
            }
            .into());
        }

        let mut coerced_steps = Vec::with_capacity(meta.steps().len());
        for job_ref in meta.steps() {
            let job = self.jobs.get(&job_ref.job)?;
            let mut job_ref = job_ref.clone();

            for (event, bound) in job_ref.bind_args.iter_mut() {
                let declared = job.event(event).ok_or_else(|| {
                    EngineError::InvalidDefinition(format!(
                        "flow meta '{}': step '{}' binds unknown event '{event}' of job '{}'",
                        meta.name, job_ref.step, job.name
                    ))
                })?;
                for arg in &declared.args {
                    if let Some(raw) = bound.get(&arg.name) {
                        let value = arg.rule.apply(&arg.name, Some(raw)).map_err(|e| {
                            EngineError::InvalidDefinition(format!(
                                "flow meta '{}': {}.{event}: {e}",
                                meta.name, job_ref.step
                            ))
                        })?;
                        bound.insert(arg.name.clone(), value);
                    }
                }
            }

            for (event, declared) in job.events() {
                for arg in declared.args.iter().filter(|a| a.mark == BindMark::Const) {
                    let bound = job_ref
                        .bind_args(event)
                        .and_then(|b| b.get(&arg.name))
                        .is_some_and(|v| !v.is_null());
                    if !bound && arg.rule.required && arg.rule.default.is_none() {
                        return Err(EngineError::InvalidDefinition(format!(
                            "flow meta '{}': const arg '{}' of {}.{event} has no bound value",
                            meta.name, arg.name, job_ref.step
                        )));
                    }
                }
            }
            coerced_steps.push(job_ref);
        }
        meta.replace_steps(coerced_steps);

        for arg in &meta.start_rules {
            if let Some(raw) = meta.start_args.get(&arg.name) {
                let value = arg.rule.apply(&arg.name, Some(raw)).map_err(|e| {
                    EngineError::InvalidDefinition(format!("flow meta '{}': start: {e}", meta.name))
                })?;
                meta.start_args.insert(arg.name.clone(), value);
            }
        }

        // Stop args have no request source, so they resolve fully here.
        meta.stop_args = resolve_args(
            "stop",
            &meta.stop_rules,
            ArgSources {
                meta: Some(&meta.stop_args),
                ..Default::default()
            },
        )
        .map_err(|e| EngineError::InvalidDefinition(format!("flow meta '{}': {e}", meta.name)))?;

        self.metas.register(meta.name.clone(), meta)?;
        Ok(())
    }

    pub fn meta(&self, name: &str) -> Option<&FlowMeta> {
        self.metas.get(name).ok()
    }

    pub fn job(&self, name: &str) -> Option<&JobSpec> {
        self.jobs.get(name).ok()
    }
}
