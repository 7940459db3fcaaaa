use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;

use engine::{
    ActionTemplate, Arg, Concept, Extension, Frame, OperationSpec, Outcome, Pattern, QueryError,
    Record, Rule, SyncEngine, SyncError, Value, lit, record, var,
};

/// Echo concept used to observe what the engine dispatches.
struct Lab;

#[async_trait]
impl Concept for Lab {
    fn name(&self) -> &'static str {
        "Lab"
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![
            OperationSpec::action("Lab", "a").inputs(&["x", "y"]).success(&["y"]),
            OperationSpec::action("Lab", "b").inputs(&["x"]),
            OperationSpec::action("Lab", "c").inputs(&["y"]),
            OperationSpec::query("Lab", "_rows").inputs(&["n"]).success(&["row"]),
            OperationSpec::query("Lab", "_broken"),
        ]
    }

    async fn perform(&self, action: &str, inputs: Record) -> Outcome {
        match action {
            "a" => Outcome::success(record! { "y" => inputs.get("y").cloned().unwrap_or(Value::Null) }),
            "b" | "c" => Outcome::done(),
            other => Outcome::error(format!("unknown action {other}")),
        }
    }

    async fn query(&self, query: &str, inputs: Record) -> Result<Vec<Record>, QueryError> {
        match query {
            "_rows" => {
                let n = inputs.get("n").and_then(Value::as_i64).unwrap_or(0);
                Ok((0..n).map(|row| record! { "row" => row * 10 }).collect())
            }
            _ => Err(QueryError::new("storage offline")),
        }
    }
}

fn request(path: &str) -> Pattern {
    Pattern::on("Requesting.request")
        .input("path", lit(path))
        .outputs(&["request"])
}

fn respond() -> ActionTemplate {
    ActionTemplate::call("Requesting.respond").args(&["request"])
}

fn lab_rules() -> Vec<Rule> {
    vec![
        Rule::new("Start")
            .when(request("/join").inputs(&["x", "y"]))
            .then(ActionTemplate::call("Lab.a").args(&["x", "y"]))
            .then(ActionTemplate::call("Lab.b").args(&["x"])),
        Rule::new("Join")
            .when(Pattern::on("Lab.a").inputs(&["x"]).outputs(&["y"]))
            .when(Pattern::on("Lab.b").inputs(&["x"]))
            .then(ActionTemplate::call("Lab.c").args(&["y"])),
        Rule::new("JoinRespond")
            .when(request("/join"))
            .when(Pattern::on("Lab.c").inputs(&["y"]))
            .then(respond().args(&["y"])),
        Rule::new("FanOut")
            .when(request("/fan").inputs(&["n"]))
            .where_with(Extension::new(&["n"], &["row"], |frame: Frame, queries| async move {
                let rows = queries
                    .query("Lab._rows", record! { "n" => frame.require_i64("n")? })
                    .await?;
                Ok(rows
                    .into_iter()
                    .filter_map(|row| row.get("row").cloned())
                    .map(|row| frame.with("row", row))
                    .collect())
            }))
            .then(ActionTemplate::call("Lab.c").arg("y", var("row"))),
        Rule::new("Rebind")
            .when(request("/rebind").inputs(&["y"]))
            .where_with(Extension::new(&["y"], &["z"], |frame: Frame, _| async move {
                Ok(vec![frame.with("z", 1).with("request", "someone-else")])
            }))
            .then(ActionTemplate::call("Lab.c").args(&["y"]))
            .then(respond()),
        Rule::new("Relay")
            .when(Pattern::on("Lab.a").input("x", lit(0)).outputs(&["y"]))
            .then(ActionTemplate::call("Lab.c").args(&["y"])),
        Rule::new("Broken")
            .when(request("/broken"))
            .where_with(Extension::new(&[], &[], |frame: Frame, queries| async move {
                queries.query("Lab._broken", Record::new()).await?;
                Ok(vec![frame])
            }))
            .then(respond()),
        Rule::new("Twice")
            .when(request("/twice"))
            .then(respond().arg("n", lit(1)))
            .then(respond().arg("n", lit(2))),
        Rule::new("EchoA")
            .when(request("/double"))
            .then(respond().arg("by", lit("a"))),
        Rule::new("EchoB")
            .when(request("/double"))
            .then(respond().arg("by", lit("b"))),
    ]
}

async fn lab_engine() -> SyncEngine {
    SyncEngine::builder()
        .concept(Lab)
        .syncs(lab_rules())
        .build()
        .await
        .unwrap()
}

fn ys(report: &engine::ChainReport) -> Vec<Value> {
    report
        .invocations("Lab.c")
        .filter_map(|event| event.inputs.get("y").cloned())
        .collect()
}

#[tokio::test]
async fn unbound_variable_rejects_the_whole_rule_base() {
    let mut rules = lab_rules();
    rules.push(
        Rule::new("Sloppy")
            .when(request("/sloppy"))
            .then(ActionTemplate::call("Lab.c").arg("y", var("total"))),
    );

    let err = SyncEngine::builder()
        .concept(Lab)
        .syncs(rules)
        .build()
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SyncError::UnboundVariable {
            rule: "Sloppy".to_string(),
            variable: "total".to_string()
        }
    );
}

#[tokio::test]
async fn joins_never_cross_chains() {
    let engine = lab_engine().await;

    let (first, second) = tokio::join!(
        engine.run_request(record! { "path" => "/join", "x" => 1, "y" => 7 }),
        engine.run_request(record! { "path" => "/join", "x" => 1, "y" => 9 }),
    );

    assert_eq!(ys(&first), vec![Value::from(7)]);
    assert_eq!(ys(&second), vec![Value::from(9)]);
    assert_eq!(first.response, Some(record! { "y" => 7 }));
    assert_eq!(second.response, Some(record! { "y" => 9 }));
    assert_ne!(first.causal_id, second.causal_id);
    assert!(first.events.iter().all(|event| event.causal_id == first.causal_id));
}

#[tokio::test]
async fn where_fan_out_dispatches_once_per_row() {
    let engine = lab_engine().await;
    let report = engine.run_request(record! { "path" => "/fan", "n" => 2 }).await;

    let mut dispatched = ys(&report);
    dispatched.sort_by_key(|y| y.as_i64());
    assert_eq!(dispatched, vec![Value::from(0), Value::from(10)]);
}

#[tokio::test]
async fn where_with_no_rows_dispatches_nothing() {
    let engine = lab_engine().await;
    let report = engine.run_request(record! { "path" => "/fan", "n" => 0 }).await;

    assert!(ys(&report).is_empty());
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.response, None);
}

#[tokio::test]
async fn failing_query_is_answered_with_an_error() {
    let engine = lab_engine().await;
    let response = engine
        .request(record! { "path" => "/broken" })
        .await
        .unwrap();

    let message = response.get("error").and_then(Value::as_str).unwrap();
    assert!(message.contains("storage offline"), "{message}");
}

#[tokio::test]
async fn where_cannot_rebind_matched_variables() {
    let engine = lab_engine().await;
    let report = engine
        .run_request(record! { "path" => "/rebind", "y" => 7 })
        .await;

    assert!(ys(&report).is_empty());
    assert_eq!(report.responds(), 1);
    let response = report.response.unwrap();
    assert_eq!(response["error"], "where step rebound variable \"request\"");
}

#[tokio::test]
async fn invoked_actions_cascade_without_a_response() {
    let engine = lab_engine().await;
    let report = engine
        .invoke("Lab.a", record! { "x" => 0, "y" => 3 })
        .await
        .unwrap();

    assert_eq!(ys(&report), vec![Value::from(3)]);
    assert_eq!(report.responds(), 0);
    assert_eq!(report.response, None);
    assert!(report.events.iter().all(|event| event.causal_id == report.causal_id));

    assert_eq!(
        engine.invoke("Lab._rows", record! { "n" => 1 }).await.err(),
        Some(SyncError::NoSuchOperation("Lab._rows".to_string()))
    );
}

#[tokio::test]
async fn a_chain_responds_at_most_once() {
    let engine = lab_engine().await;

    let twice = engine.run_request(record! { "path" => "/twice" }).await;
    assert_eq!(twice.invocations("Requesting.respond").count(), 1);
    assert_eq!(twice.response, Some(record! { "n" => 1 }));

    let double = engine.run_request(record! { "path" => "/double" }).await;
    assert_eq!(double.invocations("Requesting.respond").count(), 1);
    assert_eq!(double.responds(), 1);
}

#[tokio::test]
async fn request_times_out_when_nothing_answers() {
    let slow = Rule::new("Slow")
        .when(request("/slow"))
        .where_with(Extension::new(&[], &[], |frame: Frame, _| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(vec![frame])
        }))
        .then(respond());
    let engine = SyncEngine::builder()
        .sync(slow)
        .request_timeout(Duration::from_millis(20))
        .build()
        .await
        .unwrap();

    assert_eq!(
        engine.request(record! { "path" => "/slow" }).await,
        Err(SyncError::Timeout)
    );
}

/// In-memory stand-ins for the user and folder stores.
#[derive(Default)]
struct Users {
    by_name: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl Concept for Users {
    fn name(&self) -> &'static str {
        "Authentication"
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![
            OperationSpec::action("Authentication", "createUser")
                .inputs(&["username", "displayName", "password"])
                .success(&["user"]),
        ]
    }

    async fn perform(&self, _action: &str, inputs: Record) -> Outcome {
        let username = inputs.get("username").and_then(Value::as_str).unwrap_or_default();
        let mut users = self.by_name.lock().await;
        if users.contains_key(username) {
            return Outcome::error("Username already exists.");
        }
        let id = format!("user-{}", users.len() + 1);
        users.insert(username.to_string(), id.clone());
        Outcome::success(record! { "user" => id })
    }
}

#[derive(Default)]
struct Folders {
    created: Mutex<Vec<Record>>,
}

#[async_trait]
impl Concept for Folders {
    fn name(&self) -> &'static str {
        "Folder"
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![
            OperationSpec::action("Folder", "createFolder")
                .inputs(&["owner", "name", "parent"])
                .success(&["folder"]),
        ]
    }

    async fn perform(&self, _action: &str, inputs: Record) -> Outcome {
        let mut created = self.created.lock().await;
        created.push(inputs);
        Outcome::success(record! { "folder" => format!("folder-{}", created.len()) })
    }
}

fn create_user_rules() -> Vec<Rule> {
    let create_request = || {
        request("/Authentication/createUser").inputs(&["username", "displayName", "password"])
    };
    vec![
        Rule::new("CreateUserRequest")
            .when(create_request())
            .then(
                ActionTemplate::call("Authentication.createUser")
                    .args(&["username", "displayName", "password"]),
            ),
        Rule::new("CreateUserResponse")
            .when(create_request())
            .when(Pattern::on("Authentication.createUser").outputs(&["user"]))
            .then(
                ActionTemplate::call("Folder.createFolder")
                    .arg("owner", var("user"))
                    .arg("name", lit(".root"))
                    .arg("parent", Arg::Lit(Value::Null)),
            )
            .then(respond().args(&["user"])),
        Rule::new("CreateUserResponseError")
            .when(create_request())
            .when(Pattern::on("Authentication.createUser").error())
            .then(respond().args(&["error"])),
    ]
}

#[tokio::test]
async fn create_user_end_to_end() {
    let folders = Arc::new(Folders::default());
    let engine = SyncEngine::builder()
        .concept(Users::default())
        .shared_concept(folders.clone())
        .syncs(create_user_rules())
        .build()
        .await
        .unwrap();

    let alice = record! {
        "path" => "/Authentication/createUser",
        "username" => "alice",
        "displayName" => "Alice",
        "password" => "pw",
    };

    let created = engine.run_request(alice.clone()).await;
    assert_eq!(created.response, Some(record! { "user" => "user-1" }));
    assert_eq!(created.responds(), 1);
    {
        let folders = folders.created.lock().await;
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].get("owner"), Some(&Value::from("user-1")));
        assert_eq!(folders[0].get("name"), Some(&Value::from(".root")));
    }

    let duplicate = engine.run_request(alice).await;
    assert_eq!(
        duplicate.response,
        Some(record! { "error" => "Username already exists." })
    );
    assert_eq!(duplicate.responds(), 1);
    assert_eq!(duplicate.invocations("Folder.createFolder").count(), 0);
    assert_eq!(folders.created.lock().await.len(), 1);
}
