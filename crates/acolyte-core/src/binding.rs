//! Parameter binding: merges request, template and meta argument tiers
//! according to each argument's [`BindMark`], then applies its field rule.

use serde_json::Value;
use thiserror::Error;

use crate::field::FieldError;
use crate::flow::FlowMeta;
use crate::job::{BindMark, JobArg, JobSpec};
use crate::model::{Arguments, BindArgs};
use crate::registry::Registry;
use crate::result::Rejection;

/// The three raw argument tiers for one `(step, event)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgSources<'a> {
    pub request: Option<&'a Arguments>,
    pub template: Option<&'a Arguments>,
    pub meta: Option<&'a Arguments>,
}

fn lookup<'a>(tier: Option<&'a Arguments>, name: &str) -> Option<&'a Value> {
    tier.and_then(|args| args.get(name)).filter(|v| !v.is_null())
}

/// Raw value for `name` under `mark`, before field coercion.
///
/// AUTO: request, then template, then meta. STATIC: template only.
/// CONST: meta only. JSON `null` counts as absent.
pub fn pick<'a>(mark: BindMark, name: &str, sources: &ArgSources<'a>) -> Option<&'a Value> {
    match mark {
        BindMark::Auto => lookup(sources.request, name)
            .or_else(|| lookup(sources.template, name))
            .or_else(|| lookup(sources.meta, name)),
        BindMark::Static => lookup(sources.template, name),
        BindMark::Const => lookup(sources.meta, name),
    }
}

/// A declared argument failed its field rule.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}: {}", self.qualified_field(), self.error)]
pub struct ArgumentError {
    /// `start`, `stop` or `<step>.<event>`.
    pub qualifier: String,
    pub error: FieldError,
}

impl ArgumentError {
    /// `<qualifier>.<arg>`.
    pub fn qualified_field(&self) -> String {
        format!("{}.{}", self.qualifier, self.error.field)
    }

    /// Machine-readable reason, e.g. `review.decide.c_invalid_type`.
    pub fn reason_code(&self) -> String {
        format!("{}_{}", self.qualified_field(), self.error.reason.as_str())
    }
}

/// Resolve the declared arguments of one event.
///
/// Stops at the first failing argument. Request keys that are not declared
/// are dropped.
pub fn resolve_args(
    qualifier: &str,
    decls: &[JobArg],
    sources: ArgSources<'_>,
) -> Result<Arguments, ArgumentError> {
    let mut resolved = Arguments::new();
    for arg in decls {
        let raw = pick(arg.mark, &arg.name, &sources);
        let value = arg
            .rule
            .apply(&arg.name, raw)
            .map_err(|error| ArgumentError {
                qualifier: qualifier.to_string(),
                error,
            })?;
        resolved.insert(arg.name.clone(), value);
    }
    tracing::debug!(qualifier, args = resolved.len(), "Resolved arguments");
    Ok(resolved)
}

/// Template bind args that cannot be stored.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateBindError {
    #[error("step '{0}' is not part of the flow meta")]
    UnknownStep(String),

    #[error("step '{step}' has no event '{event}'")]
    UnknownEvent { step: String, event: String },

    #[error("'{step}.{event}.{arg}' is a const argument and cannot be bound by a template")]
    ConstBound {
        step: String,
        event: String,
        arg: String,
    },

    #[error(transparent)]
    Field(#[from] ArgumentError),
}

impl TemplateBindError {
    pub fn reason(&self) -> String {
        match self {
            Self::UnknownStep(_) => "unknown_bind_step".into(),
            Self::UnknownEvent { .. } => "unknown_bind_event".into(),
            Self::ConstBound { .. } => "not_allow_bind_const".into(),
            Self::Field(e) => e.reason_code(),
        }
    }
}

impl From<TemplateBindError> for Rejection {
    fn from(err: TemplateBindError) -> Self {
        match err {
            TemplateBindError::Field(e) => e.into(),
            other => Rejection::bad_request(other.reason()).with_message(other.to_string()),
        }
    }
}

/// Pre-validate a template's bind args against every job event its meta
/// will invoke, returning the coerced map to store.
///
/// CONST arguments may not be bound. STATIC arguments are checked even when
/// absent, so a required one without a value is rejected here rather than
/// at action time. Bound AUTO values are coerced. Undeclared keys are
/// dropped.
pub fn validate_template_bind_args(
    meta: &FlowMeta,
    jobs: &Registry<JobSpec>,
    bind_args: &BindArgs,
) -> Result<BindArgs, TemplateBindError> {
    for (step, events) in bind_args {
        let job = meta
            .job_ref(step)
            .and_then(|r| jobs.get(&r.job).ok())
            .ok_or_else(|| TemplateBindError::UnknownStep(step.clone()))?;
        if let Some(event) = events.keys().find(|e| !job.has_event(e)) {
            return Err(TemplateBindError::UnknownEvent {
                step: step.clone(),
                event: event.clone(),
            });
        }
    }

    let mut coerced = BindArgs::new();
    for job_ref in meta.steps() {
        let Ok(job) = jobs.get(&job_ref.job) else {
            continue;
        };
        for (event, declared) in job.events() {
            let bound = bind_args
                .get(&job_ref.step)
                .and_then(|events| events.get(event));
            let qualifier = format!("{}.{event}", job_ref.step);
            let mut out = Arguments::new();

            for arg in &declared.args {
                let raw = lookup(bound, &arg.name);
                match arg.mark {
                    BindMark::Const => {
                        if raw.is_some() {
                            return Err(TemplateBindError::ConstBound {
                                step: job_ref.step.clone(),
                                event: event.to_string(),
                                arg: arg.name.clone(),
                            });
                        }
                    }
                    BindMark::Static | BindMark::Auto => {
                        if raw.is_none() && arg.mark == BindMark::Auto {
                            continue;
                        }
                        let value = arg.rule.apply(&arg.name, raw).map_err(|error| {
                            ArgumentError {
                                qualifier: qualifier.clone(),
                                error,
                            }
                        })?;
                        if raw.is_some() {
                            out.insert(arg.name.clone(), value);
                        }
                    }
                }
            }

            if !out.is_empty() {
                coerced
                    .entry(job_ref.step.clone())
                    .or_default()
                    .insert(event.to_string(), out);
            }
        }
    }
    Ok(coerced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldReason, FieldRule};
    use crate::job::{JobRef, TRIGGER};
    use crate::result::{ServiceResult, StatusCode};
    use proptest::prelude::*;
    use serde_json::json;

    fn args(pairs: &[(&str, Value)]) -> Arguments {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn fixture() -> (FlowMeta, Registry<JobSpec>) {
        fn ok(_: &mut crate::FlowContext<'_>, _: &Arguments) -> crate::Result<ServiceResult> {
            Ok(ServiceResult::ok_empty())
        }
        let mut jobs = Registry::new("job");
        jobs.register(
            "reviewer",
            JobSpec::new("reviewer", "")
                .on(
                    TRIGGER,
                    vec![
                        JobArg::constant("a", FieldRule::int()),
                        JobArg::fixed("b", FieldRule::int()),
                    ],
                    ok,
                )
                .on("decide", vec![JobArg::auto("c", FieldRule::int())], ok),
        )
        .unwrap();
        let meta = FlowMeta::new(
            "approval",
            "",
            vec![JobRef::new("review", "reviewer").bind(TRIGGER, args(&[("a", json!(5))]))],
        )
        .unwrap();
        (meta, jobs)
    }

    #[test]
    fn test_static_and_const_ignore_request() {
        let request = args(&[("a", json!(100)), ("b", json!(100))]);
        let template = args(&[("b", json!(2))]);
        let meta = args(&[("a", json!(5))]);
        let decls = vec![
            JobArg::constant("a", FieldRule::int()),
            JobArg::fixed("b", FieldRule::int()),
        ];
        let resolved = resolve_args(
            "review.trigger",
            &decls,
            ArgSources {
                request: Some(&request),
                template: Some(&template),
                meta: Some(&meta),
            },
        )
        .unwrap();
        assert_eq!(resolved, args(&[("a", json!(5)), ("b", json!(2))]));
    }

    #[test]
    fn test_undeclared_request_keys_dropped() {
        let request = args(&[("c", json!("3")), ("extra", json!(true))]);
        let resolved = resolve_args(
            "review.decide",
            &[JobArg::auto("c", FieldRule::int())],
            ArgSources {
                request: Some(&request),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(resolved, args(&[("c", json!(3))]));
    }

    #[test]
    fn test_null_request_falls_through() {
        let request = args(&[("c", Value::Null)]);
        let template = args(&[("c", json!(4))]);
        let sources = ArgSources {
            request: Some(&request),
            template: Some(&template),
            meta: None,
        };
        assert_eq!(pick(BindMark::Auto, "c", &sources), Some(&json!(4)));
    }

    #[test]
    fn test_field_error_carries_qualified_reason() {
        let request = args(&[("c", json!("x"))]);
        let err = resolve_args(
            "review.decide",
            &[JobArg::auto("c", FieldRule::int())],
            ArgSources {
                request: Some(&request),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.qualified_field(), "review.decide.c");
        assert_eq!(err.reason_code(), "review.decide.c_invalid_type");
        assert_eq!(err.error.reason, FieldReason::InvalidType);

        let rejection: Rejection = err.into();
        assert_eq!(rejection.status, StatusCode::BadRequest);
        assert_eq!(rejection.detail.unwrap()["expect"], json!("int"));
    }

    #[test]
    fn test_missing_required_is_empty() {
        let err = resolve_args(
            "archive.trigger",
            &[JobArg::auto("x", FieldRule::int())],
            ArgSources::default(),
        )
        .unwrap_err();
        assert_eq!(err.reason_code(), "archive.trigger.x_empty");
    }

    #[test]
    fn test_template_validation_coerces_and_rejects_const() {
        let (meta, jobs) = fixture();

        let mut bind = BindArgs::new();
        bind.entry("review".into())
            .or_default()
            .insert(TRIGGER.into(), args(&[("b", json!("2")), ("junk", json!(1))]));
        let coerced = validate_template_bind_args(&meta, &jobs, &bind).unwrap();
        assert_eq!(coerced["review"][TRIGGER], args(&[("b", json!(2))]));

        bind.get_mut("review")
            .unwrap()
            .get_mut(TRIGGER)
            .unwrap()
            .insert("a".into(), json!(9));
        let err = validate_template_bind_args(&meta, &jobs, &bind).unwrap_err();
        assert_eq!(err.reason(), "not_allow_bind_const");
    }

    #[test]
    fn test_template_validation_requires_static() {
        let (meta, jobs) = fixture();
        let err = validate_template_bind_args(&meta, &jobs, &BindArgs::new()).unwrap_err();
        assert_eq!(err.reason(), "review.trigger.b_empty");
    }

    #[test]
    fn test_template_validation_unknown_step_and_event() {
        let (meta, jobs) = fixture();
        let mut bind = BindArgs::new();
        bind.entry("ghost".into()).or_default();
        assert_eq!(
            validate_template_bind_args(&meta, &jobs, &bind).unwrap_err().reason(),
            "unknown_bind_step"
        );

        let mut bind = BindArgs::new();
        bind.entry("review".into())
            .or_default()
            .insert("ghost".into(), Arguments::new());
        assert_eq!(
            validate_template_bind_args(&meta, &jobs, &bind).unwrap_err().reason(),
            "unknown_bind_event"
        );
    }

    fn tier(v: Option<i64>) -> Arguments {
        v.map(|v| args(&[("v", json!(v))])).unwrap_or_default()
    }

    proptest! {
        #[test]
        fn prop_auto_precedence(
            request in proptest::option::of(any::<i64>()),
            template in proptest::option::of(any::<i64>()),
            meta in proptest::option::of(any::<i64>()),
        ) {
            let (r, t, m) = (tier(request), tier(template), tier(meta));
            let sources = ArgSources { request: Some(&r), template: Some(&t), meta: Some(&m) };
            let expected = request.or(template).or(meta).map(|v| json!(v));
            prop_assert_eq!(pick(BindMark::Auto, "v", &sources).cloned(), expected);
        }

        #[test]
        fn prop_const_and_static_are_immutable(
            request in proptest::option::of(any::<i64>()),
            template in any::<i64>(),
            meta in any::<i64>(),
        ) {
            let (r, t, m) = (tier(request), tier(Some(template)), tier(Some(meta)));
            let sources = ArgSources { request: Some(&r), template: Some(&t), meta: Some(&m) };
            prop_assert_eq!(pick(BindMark::Const, "v", &sources).cloned(), Some(json!(meta)));
            prop_assert_eq!(pick(BindMark::Static, "v", &sources).cloned(), Some(json!(template)));
        }
    }
}
