//! Shared fixtures: an `approval` meta with a `review` step (job
//! `reviewer`) followed by an `archive` step (job `archiver`).

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use acolyte_core::{
    ActorDirectory, Arguments, BindArgs, Definitions, EngineError, FieldRule, FlowContext, FlowExecutor,
    FlowHooks, FlowMeta, FlowService, InProcessLock, JobArg, JobRef, JobSpec, MemoryStorage,
    ServiceResult, TRIGGER,
};
use serde_json::{Value, json};

pub fn args(value: Value) -> Arguments {
    match value {
        Value::Object(map) => map,
        _ => Arguments::new(),
    }
}

/// Records hook invocations as `"<hook>:<instance>"`.
#[derive(Default)]
pub struct RecordingHooks {
    pub calls: Mutex<Vec<String>>,
    pub fail_on_start: bool,
    pub fail_on_stop: bool,
}

impl RecordingHooks {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl FlowHooks for RecordingHooks {
    fn on_start(&self, ctx: &mut FlowContext<'_>, args: &Arguments) -> acolyte_core::Result<()> {
        if self.fail_on_start {
            return Err(EngineError::Hook("refused".into()));
        }
        ctx.set("started_by", args.get("owner").cloned().unwrap_or(Value::Null))?;
        self.calls
            .lock()
            .unwrap()
            .push(format!("start:{}", ctx.flow_instance_id()));
        Ok(())
    }

    fn on_stop(&self, ctx: &mut FlowContext<'_>, args: &Arguments) -> acolyte_core::Result<()> {
        if self.fail_on_stop {
            return Err(EngineError::Hook("cannot stop".into()));
        }
        ctx.set("stop_reason", args.get("reason").cloned().unwrap_or(Value::Null))?;
        self.calls
            .lock()
            .unwrap()
            .push(format!("stop:{}", ctx.flow_instance_id()));
        Ok(())
    }

    fn on_finish(&self, ctx: &mut FlowContext<'_>) -> acolyte_core::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("finish:{}", ctx.flow_instance_id()));
        Ok(())
    }

    fn on_exception(&self, ctx: &mut FlowContext<'_>, error: &EngineError) -> acolyte_core::Result<()> {
        ctx.set("failure", error.to_string())?;
        self.calls
            .lock()
            .unwrap()
            .push(format!("exception:{}", ctx.flow_instance_id()));
        Ok(())
    }
}

fn reviewer() -> JobSpec {
    JobSpec::new("reviewer", "Adds the bound numbers, then multiplies on decide")
        .on(
            TRIGGER,
            vec![
                JobArg::constant("a", FieldRule::int()),
                JobArg::fixed("b", FieldRule::int()),
            ],
            |ctx, args| {
                let sum = args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0);
                ctx.set("sum", sum)?;
                ctx.save(json!({"sum": sum}))?;
                Ok(ServiceResult::ok(sum))
            },
        )
        .on(
            "decide",
            vec![JobArg::auto("c", FieldRule::int())],
            |ctx, args| {
                let c = args["c"].as_i64().unwrap_or(0);
                if c == 0 {
                    return Ok(ServiceResult::bad_request("wrong_answer", None));
                }
                let sum = ctx.get("sum")?.and_then(|v| v.as_i64()).unwrap_or(0);
                ctx.finish();
                Ok(ServiceResult::ok(sum * c))
            },
        )
        .on("reject", vec![], |ctx, _| {
            ctx.stop();
            Ok(ServiceResult::ok_empty())
        })
        .on("explode", vec![], |_, _| {
            Err(EngineError::Handler("boom".into()))
        })
}

fn archiver() -> JobSpec {
    JobSpec::new("archiver", "Archives the result").on(
        TRIGGER,
        vec![JobArg::auto("x", FieldRule::int().min(1))],
        |ctx, args| {
            ctx.finish();
            Ok(ServiceResult::ok(args["x"].clone()))
        },
    )
}

pub struct Harness {
    pub executor: FlowExecutor,
    pub service: FlowService,
    pub storage: Arc<MemoryStorage>,
    pub hooks: Arc<RecordingHooks>,
    pub actor: i64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_hooks(RecordingHooks::default())
    }

    pub fn with_hooks(hooks: RecordingHooks) -> Self {
        let hooks = Arc::new(hooks);
        let mut defs = Definitions::new();
        defs.register_job(reviewer()).unwrap();
        defs.register_job(archiver()).unwrap();
        defs.register_meta(
            FlowMeta::new(
                "approval",
                "Review then archive",
                vec![
                    JobRef::new("review", "reviewer").bind(TRIGGER, args(json!({"a": 5}))),
                    JobRef::new("archive", "archiver"),
                ],
            )
            .unwrap()
            .with_start_args(
                vec![JobArg::auto("owner", FieldRule::string().optional())],
                args(json!({"owner": "nobody"})),
            )
            .with_stop_args(
                vec![JobArg::constant("reason", FieldRule::string())],
                args(json!({"reason": "rejected"})),
            )
            .with_hooks(hooks.clone()),
        )
        .unwrap();
        defs.register_meta(FlowMeta::new("empty", "No steps", vec![]).unwrap().with_hooks(hooks.clone()))
            .unwrap();

        let defs = Arc::new(defs);
        let storage = Arc::new(MemoryStorage::new());
        let actor = storage.add_actor("reviewer@example.com", "Reviewer").unwrap().id;
        let executor = FlowExecutor::new(
            defs.clone(),
            storage.clone(),
            storage.clone(),
            Arc::new(InProcessLock::new()),
        );
        let service = FlowService::new(defs, storage.clone(), storage.clone());

        Self {
            executor,
            service,
            storage,
            hooks,
            actor,
        }
    }

    /// Create an `approval` template binding `b=2`.
    pub fn template(&self, name: &str, max_run_instance: i64) -> i64 {
        let mut bind = BindArgs::new();
        bind.entry("review".into())
            .or_default()
            .insert(TRIGGER.into(), args(json!({"b": 2})));
        let rs = self
            .service
            .create_flow_template("approval", name, &bind, max_run_instance, self.actor);
        assert!(rs.is_success(), "template creation failed: {rs:?}");
        rs.data.unwrap()["id"].as_i64().unwrap()
    }

    pub fn start(&self, template_id: i64) -> ServiceResult {
        self.executor
            .start_flow(template_id, self.actor, "test run", &Arguments::new())
    }

    /// Start an instance and return its id.
    pub fn started(&self, template_id: i64) -> i64 {
        let rs = self.start(template_id);
        assert!(rs.is_success(), "start_flow failed: {rs:?}");
        rs.data.unwrap()["id"].as_i64().unwrap()
    }

    pub fn act(&self, instance: i64, step: &str, action: &str, request: Value) -> ServiceResult {
        self.executor
            .handle_job_action(instance, step, action, self.actor, &args(request))
    }
}
