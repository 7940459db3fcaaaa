//! Group routes. Membership changes keep every member's folder tree in step:
//! a new group lands in a folder of its creator, an invited user finds it in
//! their root folder, and a departing member loses it from whichever folder
//! held it.

use engine::{ActionTemplate, Arg, Extension, Frame, Rule, lit, record, var, var_or};

use crate::{
    ROOT_FOLDER,
    pipeline::{Pipeline, request, respond},
};

const FOLDER_BY_GROUP: &str = "Folder._getFolderByGroupAndUser";

/// Binds `memberFolder` to the folder holding `group` for `member`. Yields no
/// frame when the member never filed the group.
fn member_folder() -> Extension {
    Extension::new(
        &["member", "group"],
        &["memberFolder"],
        |frame: Frame, queries| async move {
            let rows = queries
                .query(
                    FOLDER_BY_GROUP,
                    record! {
                        "user" => frame.require_str("member")?,
                        "group" => frame.require_str("group")?,
                    },
                )
                .await?;
            Ok(rows
                .into_iter()
                .filter_map(|row| row.get("folder").cloned())
                .map(|folder| frame.with("memberFolder", folder))
                .collect())
        },
    )
}

fn remove_from_member_folder() -> ActionTemplate {
    ActionTemplate::call("Folder.removeGroupFromFolder")
        .arg("user", var("member"))
        .arg("folder", var("memberFolder"))
        .args(&["group"])
}

/// Pipeline plus the rule dropping the group from the member's folders once
/// the membership is gone.
fn with_cleanup(pipeline: Pipeline) -> Vec<Rule> {
    let cleanup = pipeline
        .follow_up("Cleanup")
        .when(pipeline.succeeded())
        .where_with(member_folder())
        .then(remove_from_member_folder());
    let mut rules = pipeline.rules();
    rules.push(cleanup);
    rules
}

pub(crate) fn rules() -> Vec<Rule> {
    let create_group = Pipeline::new(
        "CreateGroup",
        request("/Group/createGroup", &["creator", "name", "token"])
            .input("description", var_or("description", ""))
            .input("folderName", var_or("folderName", ROOT_FOLDER)),
        "creator",
        ActionTemplate::call("Group.createGroup").args(&["creator", "name", "description"]),
    )
    .outputs(&["group"])
    .effect(
        ActionTemplate::call("Folder.addGroupToFolder")
            .arg("user", var("creator"))
            .args(&["folderName", "group"]),
    )
    .respond(respond().arg(
        "group",
        Arg::record([
            ("_id", var("group")),
            ("name", var("name")),
            ("description", var("description")),
            ("creator", var("creator")),
        ]),
    ));

    let add_user = Pipeline::new(
        "AddUser",
        request("/Group/addUser", &["group", "inviter", "newMember", "token"]),
        "inviter",
        ActionTemplate::call("Group.addUser").args(&["group", "inviter", "newMember"]),
    )
    .effect(
        ActionTemplate::call("Folder.addGroupToFolder")
            .arg("user", var("newMember"))
            .arg("folderName", lit(ROOT_FOLDER))
            .args(&["group"]),
    );

    let remove_user = Pipeline::new(
        "RemoveUser",
        request("/Group/removeUser", &["group", "remover", "member", "token"]),
        "remover",
        ActionTemplate::call("Group.removeUser").args(&["group", "remover", "member"]),
    );

    let leave_group = Pipeline::new(
        "LeaveGroup",
        request("/Group/leaveGroup", &["group", "member", "token"]),
        "member",
        ActionTemplate::call("Group.leaveGroup").args(&["group", "member"]),
    );

    let delete_group = Pipeline::new(
        "DeleteGroup",
        request("/Group/deleteGroup", &["group", "user", "token"]),
        "user",
        ActionTemplate::call("Group.deleteGroup").args(&["group"]),
    );

    let mut rules = Vec::new();
    rules.extend(create_group.rules());
    rules.extend(add_user.rules());
    rules.extend(with_cleanup(remove_user));
    rules.extend(with_cleanup(leave_group));
    rules.extend(delete_group.rules());
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn departures_clean_up_the_member_folder() {
        let names: Vec<String> = rules().iter().map(|rule| rule.name().to_string()).collect();
        assert!(names.contains(&"RemoveUserCleanup".to_string()));
        assert!(names.contains(&"LeaveGroupCleanup".to_string()));
        assert!(!names.contains(&"DeleteGroupCleanup".to_string()));
    }

    #[test]
    fn cleanup_waits_for_the_membership_change() {
        let rules = rules();
        let cleanup = rules
            .iter()
            .find(|rule| rule.name() == "LeaveGroupCleanup")
            .unwrap();
        let operations: Vec<&str> = cleanup
            .patterns()
            .iter()
            .map(|pattern| pattern.operation.as_str())
            .collect();
        assert_eq!(
            operations,
            [
                "Requesting.request",
                "Authentication.validateToken",
                "Group.leaveGroup"
            ]
        );
    }
}
