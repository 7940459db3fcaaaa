//! Sign-up. The only route that runs without a session token.

use engine::{ActionTemplate, Pattern, Rule, Value, lit, var};

use crate::{
    ROOT_FOLDER,
    pipeline::{request, respond, respond_error},
};

const CREATE_USER: &str = "Authentication.createUser";

pub(crate) fn rules() -> Vec<Rule> {
    let create = || {
        request(
            "/Authentication/createUser",
            &["username", "displayName", "password"],
        )
    };
    vec![
        Rule::new("CreateUserRequest").when(create()).then(
            ActionTemplate::call(CREATE_USER).args(&["username", "displayName", "password"]),
        ),
        Rule::new("CreateUserResponse")
            .when(create())
            .when(Pattern::on(CREATE_USER).outputs(&["user"]))
            .then(
                ActionTemplate::call("Folder.createFolder")
                    .arg("owner", var("user"))
                    .arg("name", lit(ROOT_FOLDER))
                    .arg("parent", lit(Value::Null)),
            )
            .then(respond().args(&["user"])),
        Rule::new("CreateUserResponseError")
            .when(create())
            .when(Pattern::on(CREATE_USER).error())
            .then(respond_error()),
    ]
}
