//! Folder routes. Each acts on the folders of the token owner.

use engine::{ActionTemplate, Rule};

use crate::pipeline::{Pipeline, request, respond};

pub(crate) fn rules() -> Vec<Rule> {
    [
        Pipeline::new(
            "CreateFolder",
            request("/Folder/createFolder", &["owner", "name", "parent", "token"]),
            "owner",
            ActionTemplate::call("Folder.createFolder").args(&["owner", "name", "parent"]),
        )
        .outputs(&["folder"])
        .respond(respond().args(&["folder"])),
        Pipeline::new(
            "RenameFolder",
            request("/Folder/renameFolder", &["user", "folder", "name", "token"]),
            "user",
            ActionTemplate::call("Folder.renameFolder").args(&["user", "folder", "name"]),
        )
        .outputs(&["success"])
        .respond(respond().args(&["success"])),
        Pipeline::new(
            "DeleteFolder",
            request("/Folder/deleteFolder", &["user", "folder", "token"]),
            "user",
            ActionTemplate::call("Folder.deleteFolder").args(&["user", "folder"]),
        )
        .outputs(&["folderDeleted"])
        .respond(respond().args(&["folderDeleted"])),
        Pipeline::new(
            "MoveFolder",
            request(
                "/Folder/moveFolder",
                &["user", "folderToMove", "newParent", "token"],
            ),
            "user",
            ActionTemplate::call("Folder.moveFolder").args(&["user", "folderToMove", "newParent"]),
        )
        .outputs(&["folder"])
        .respond(respond().args(&["folder"])),
        Pipeline::new(
            "AddGroupToFolder",
            request(
                "/Folder/addGroupToFolder",
                &["user", "folderName", "group", "token"],
            ),
            "user",
            ActionTemplate::call("Folder.addGroupToFolder").args(&["user", "folderName", "group"]),
        ),
        Pipeline::new(
            "RemoveGroupFromFolder",
            request(
                "/Folder/removeGroupFromFolder",
                &["user", "folder", "group", "token"],
            ),
            "user",
            ActionTemplate::call("Folder.removeGroupFromFolder").args(&["user", "folder", "group"]),
        ),
        Pipeline::new(
            "ListSubfolders",
            request("/Folder/listSubfolders", &["user", "parent", "token"]),
            "user",
            ActionTemplate::call("Folder.listSubfolders").args(&["user", "parent"]),
        )
        .outputs(&["folders"])
        .respond(respond().args(&["folders"])),
    ]
    .into_iter()
    .flat_map(Pipeline::rules)
    .collect()
}
