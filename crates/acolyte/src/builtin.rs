//! Built-in flow definitions shipped with the binary.
//!
//! `mooncake_flow`: a programmer grabs mooncakes, HR finds out who did it,
//! and the boss decides whether the flow finishes or stops.

use acolyte_core::{
    Definitions, EngineError, FieldRule, FlowMeta, JobArg, JobRef, JobSpec, Result,
    ServiceResult, TRIGGER,
};
use regex::Regex;

pub const MOONCAKE_FLOW: &str = "mooncake_flow";

/// Registry holding every built-in job and flow meta.
pub fn definitions() -> Result<Definitions> {
    let mut defs = Definitions::new();
    defs.register_job(programmer())?;
    defs.register_job(hr()?)?;
    defs.register_job(boss())?;
    defs.register_meta(FlowMeta::new(
        MOONCAKE_FLOW,
        "Mooncake grabbing flow",
        vec![
            JobRef::new("programmer", "programmer"),
            JobRef::new("hr", "hr"),
            JobRef::new("boss", "boss"),
        ],
    )?)?;
    Ok(defs)
}

fn programmer() -> JobSpec {
    JobSpec::new("programmer", "A programmer whose hobby is grabbing mooncakes")
        .on(TRIGGER, vec![], |_, _| {
            Ok(ServiceResult::ok("Fine, back to overtime to pay the mortgage"))
        })
        .on(
            "midautumn",
            vec![
                JobArg::auto(
                    "cake_num",
                    FieldRule::int().optional().default_value(1).min(1),
                )
                .comment("Number of mooncakes grabbed"),
            ],
            |ctx, args| {
                let cake_num = args.get("cake_num").and_then(|v| v.as_i64()).unwrap_or(1);
                ctx.finish();
                Ok(ServiceResult::ok(format!("I grabbed {cake_num} mooncakes")))
            },
        )
}

fn hr() -> Result<JobSpec> {
    let word = Regex::new(r"^\w+$").map_err(|e| EngineError::InvalidDefinition(e.to_string()))?;
    Ok(JobSpec::new("hr", "HR, on the trail of mooncake-grabbing programmers")
        .on(TRIGGER, vec![], |_, _| {
            Ok(ServiceResult::ok("Someone seems to have grabbed mooncakes"))
        })
        .on(
            "found",
            vec![JobArg::auto("who", FieldRule::string().regex(word)).comment("Who grabbed them")],
            |ctx, args| {
                let who = args.get("who").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                ctx.finish();
                Ok(ServiceResult::ok(format!(
                    "It was {who}, reporting to the boss!"
                )))
            },
        ))
}

fn boss() -> JobSpec {
    JobSpec::new("boss", "The boss, whose mood is company policy")
        .on(TRIGGER, vec![], |_, _| {
            Ok(ServiceResult::ok("It's not what you can do, it's what you should do"))
        })
        .on(
            "hr_report",
            vec![JobArg::auto("mood", FieldRule::string()).comment("The boss's mood")],
            |ctx, args| {
                if args.get("mood").and_then(|v| v.as_str()) == Some("good") {
                    ctx.finish();
                    Ok(ServiceResult::ok("Geek culture, no big deal"))
                } else {
                    ctx.stop();
                    Ok(ServiceResult::ok("Against company values, handle it seriously"))
                }
            },
        )
}
