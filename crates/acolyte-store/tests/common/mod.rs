//! Shared fixtures: a `counting` meta with one `count` step (job `counter`).

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use acolyte_core::{
    Arguments, Definitions, FieldRule, FlowExecutor, FlowMeta, FlowService, FlowStorage,
    JobArg, JobRef, JobSpec, NamedLock, ServiceResult, TRIGGER,
};
use acolyte_store::{SqliteLock, SqliteStore};
use serde_json::{Value, json};

pub fn args(value: Value) -> Arguments {
    match value {
        Value::Object(map) => map,
        _ => Arguments::new(),
    }
}

pub fn definitions() -> Arc<Definitions> {
    let mut defs = Definitions::new();
    defs.register_job(
        JobSpec::new("counter", "Counts to a target")
            .on(
                TRIGGER,
                vec![JobArg::auto("target", FieldRule::int().min(1))],
                |ctx, args| {
                    let target = args["target"].as_i64().unwrap_or(1);
                    ctx.set("target", target)?;
                    ctx.save(json!({"target": target}))?;
                    Ok(ServiceResult::ok(target))
                },
            )
            .on("done", vec![], |ctx, _| {
                ctx.finish();
                Ok(ServiceResult::ok(ctx.get("target")?.unwrap_or(Value::Null)))
            }),
    )
    .unwrap();
    defs.register_meta(
        FlowMeta::new("counting", "Count once", vec![JobRef::new("count", "counter")]).unwrap(),
    )
    .unwrap();
    Arc::new(defs)
}

/// One process's view of a database file: its own store connection and
/// its own lock service.
pub struct Handle {
    pub executor: FlowExecutor,
    pub service: FlowService,
    pub store: Arc<SqliteStore>,
    pub actor: i64,
}

impl Handle {
    /// Open with a [`SqliteLock`] on the same file.
    pub fn open(path: &Path) -> Self {
        let store = Arc::new(SqliteStore::open(path).unwrap());
        let locks = Arc::new(SqliteLock::open(path).unwrap());
        Self::assemble(store.clone(), store, locks)
    }

    /// Open with custom storage and lock service over the same file.
    pub fn assemble(
        store: Arc<SqliteStore>,
        storage: Arc<dyn FlowStorage>,
        locks: Arc<dyn NamedLock>,
    ) -> Self {
        let defs = definitions();
        let actor = match store.get_actor(1).unwrap() {
            Some(actor) => actor.id,
            None => store.add_actor("ops@example.com", "Ops").unwrap().id,
        };
        let executor = FlowExecutor::new(defs.clone(), storage.clone(), store.clone(), locks);
        let service = FlowService::new(defs, storage, store.clone());
        Self {
            executor,
            service,
            store,
            actor,
        }
    }

    pub fn template(&self, name: &str, max_run_instance: i64) -> i64 {
        let rs = self.service.create_flow_template(
            "counting",
            name,
            &Default::default(),
            max_run_instance,
            self.actor,
        );
        assert!(rs.is_success(), "template creation failed: {rs:?}");
        rs.data.unwrap()["id"].as_i64().unwrap()
    }

    pub fn start(&self, template: i64) -> ServiceResult {
        self.executor
            .start_flow(template, self.actor, "", &Arguments::new())
    }

    pub fn started(&self, template: i64) -> i64 {
        let rs = self.start(template);
        assert!(rs.is_success(), "start_flow failed: {rs:?}");
        rs.data.unwrap()["id"].as_i64().unwrap()
    }

    pub fn act(&self, instance: i64, action: &str, request: Value) -> ServiceResult {
        self.executor
            .handle_job_action(instance, "count", action, self.actor, &args(request))
    }
}
