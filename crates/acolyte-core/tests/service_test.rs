//! Integration tests for FlowService.

mod common;

use acolyte_core::{BindArgs, StatusCode, TRIGGER};
use common::{Harness, args};
use serde_json::json;

fn bind(step: &str, event: &str, value: serde_json::Value) -> BindArgs {
    let mut bind = BindArgs::new();
    bind.entry(step.into())
        .or_default()
        .insert(event.into(), args(value));
    bind
}

#[test]
fn test_meta_listing_and_detail() {
    let h = Harness::new();

    let rs = h.service.get_all_flow_meta();
    let metas = rs.data.unwrap();
    assert_eq!(metas[0]["name"], json!("approval"));
    assert_eq!(metas[0]["steps"][1], json!({"step": "archive", "job": "archiver"}));
    assert_eq!(metas[1]["name"], json!("empty"));

    let rs = h.service.get_flow_meta_info("approval");
    let detail = rs.data.unwrap();
    assert_eq!(detail["start_args"][0]["name"], json!("owner"));
    let review = &detail["steps"][0];
    assert_eq!(review["job"]["name"], json!("reviewer"));
    assert_eq!(review["job"]["events"][0]["args"][0]["mark"], json!("CONST"));
    assert_eq!(review["bind_args"][TRIGGER]["a"], json!(5));

    let rs = h.service.get_flow_meta_info("ghost");
    assert_eq!(rs.status, StatusCode::NotFound);
    assert_eq!(rs.reason(), Some("flow_meta_not_exist"));
}

#[test]
fn test_job_info() {
    let h = Harness::new();
    let rs = h.service.get_job_info("archiver");
    let job = rs.data.unwrap();
    assert_eq!(job["events"][0]["name"], json!(TRIGGER));
    assert_eq!(job["events"][0]["args"][0]["field"]["min"], json!(1));

    assert_eq!(h.service.get_job_info("ghost").reason(), Some("job_not_exist"));
    assert_eq!(h.service.get_all_jobs().data.unwrap().as_array().unwrap().len(), 2);
}

#[test]
fn test_create_template_validation() {
    let h = Harness::new();
    let good = bind("review", TRIGGER, json!({"b": "2"}));

    let rs = h.service.create_flow_template("ghost", "t", &good, 0, h.actor);
    assert_eq!(rs.reason(), Some("flow_meta_not_exist"));

    let rs = h.service.create_flow_template("approval", "t", &good, 0, 9999);
    assert_eq!(rs.reason(), Some("invalid_creator_id"));

    let rs = h.service.create_flow_template("approval", "t", &good, -1, h.actor);
    assert_eq!(rs.reason(), Some("invalid_max_run_instance"));

    let rs = h.service.create_flow_template("approval", "", &good, 0, h.actor);
    assert_eq!(rs.reason(), Some("invalid_template_name"));

    let with_const = bind("review", TRIGGER, json!({"a": 1, "b": 2}));
    let rs = h.service.create_flow_template("approval", "t", &with_const, 0, h.actor);
    assert_eq!(rs.reason(), Some("not_allow_bind_const"));

    let rs = h.service.create_flow_template("approval", "t", &BindArgs::new(), 0, h.actor);
    assert_eq!(rs.reason(), Some("review.trigger.b_empty"));

    let bad_auto = {
        let mut b = good.clone();
        b.entry("archive".into())
            .or_default()
            .insert(TRIGGER.into(), args(json!({"x": "many"})));
        b
    };
    let rs = h.service.create_flow_template("approval", "t", &bad_auto, 0, h.actor);
    assert_eq!(rs.status, StatusCode::BadRequest);
    assert_eq!(rs.reason(), Some("archive.trigger.x_invalid_type"));

    let rs = h.service.create_flow_template("approval", "t", &good, 2, h.actor);
    assert!(rs.is_success(), "{rs:?}");
    let template = rs.data.unwrap();
    // Stored coerced.
    assert_eq!(template["bind_args"]["review"][TRIGGER]["b"], json!(2));
    assert_eq!(template["max_run_instance"], json!(2));

    let rs = h.service.create_flow_template("approval", "t", &good, 0, h.actor);
    assert_eq!(rs.reason(), Some("name_already_exist"));
}

#[test]
fn test_template_bound_auto_arg_is_used() {
    let h = Harness::new();
    let mut bind_args = bind("review", TRIGGER, json!({"b": 2}));
    bind_args
        .entry("archive".into())
        .or_default()
        .insert(TRIGGER.into(), args(json!({"x": 9})));
    let rs = h
        .service
        .create_flow_template("approval", "auto", &bind_args, 0, h.actor);
    let template = rs.data.unwrap()["id"].as_i64().unwrap();

    let instance = h.started(template);
    h.act(instance, "review", TRIGGER, json!({}));
    h.act(instance, "review", "decide", json!({"c": 1}));
    let rs = h.act(instance, "archive", TRIGGER, json!({}));
    assert_eq!(rs.data, Some(json!(9)));
}

#[test]
fn test_template_queries() {
    let h = Harness::new();
    let id = h.template("listed", 0);

    let all = h.service.get_all_flow_templates().data.unwrap();
    assert_eq!(all.as_array().unwrap().len(), 1);

    let rs = h.service.get_flow_template(id);
    assert_eq!(rs.data.unwrap()["name"], json!("listed"));

    let rs = h.service.get_flow_template(id + 1000);
    assert_eq!(rs.status, StatusCode::NotFound);
    assert_eq!(rs.reason(), Some("flow_template_not_exist"));
}

#[test]
fn test_instance_detail_and_listing() {
    let h = Harness::new();
    let template = h.template("t", 0);
    let first = h.started(template);
    let second = h.started(template);
    h.act(first, "review", TRIGGER, json!({}));
    h.act(first, "review", "reject", json!({}));

    let rs = h.service.get_flow_instance(first);
    let detail = rs.data.unwrap();
    assert_eq!(detail["status"], json!("STOPPED"));
    let jobs = detail["job_instances"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["step_name"], json!("review"));
    let actions: Vec<_> = jobs[0]["actions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["action"].clone())
        .collect();
    assert_eq!(actions, vec![json!(TRIGGER), json!("reject")]);

    assert_eq!(
        h.service.get_flow_instance(9999).reason(),
        Some("flow_instance_not_exist")
    );

    let ids = |rs: acolyte_core::ServiceResult| -> Vec<i64> {
        rs.data
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["id"].as_i64().unwrap())
            .collect()
    };
    assert_eq!(ids(h.service.get_flow_instances(None, None, None, 0)), vec![second, first]);
    assert_eq!(
        ids(h.service.get_flow_instances(Some("running"), Some(template), None, 0)),
        vec![second]
    );
    assert_eq!(
        ids(h.service.get_flow_instances(None, None, Some(second), 0)),
        vec![first]
    );
    assert_eq!(ids(h.service.get_flow_instances(None, None, None, 1)), vec![second]);
    assert_eq!(
        h.service
            .get_flow_instances(Some("paused"), None, None, 0)
            .reason(),
        Some("invalid_status")
    );
}

#[test]
fn test_actors() {
    let h = Harness::new();
    let rs = h.service.add_actor("boss@example.com", "Boss");
    assert!(rs.is_success());
    let id = rs.data.unwrap()["id"].as_i64().unwrap();
    assert_eq!(h.service.get_actor(id).data.unwrap()["name"], json!("Boss"));

    assert_eq!(
        h.service.add_actor("boss@example.com", "Other").reason(),
        Some("email_already_exist")
    );
    assert_eq!(h.service.add_actor("not-an-email", "X").reason(), Some("invalid_email"));
    assert_eq!(h.service.get_actor(9999).reason(), Some("actor_not_exist"));
}
