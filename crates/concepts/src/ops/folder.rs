use std::collections::HashMap;

use async_trait::async_trait;
use engine::{Concept, OperationSpec, Outcome, QueryError, Record, Value, record};
use sea_orm::{
    ActiveValue, ConnectionTrait, DatabaseConnection, QueryFilter, QueryOrder, TransactionTrait,
    prelude::*, sea_query::OnConflict,
};

use crate::{
    ConceptError, ResultConcept, folder_groups,
    folders::{self, ROOT_FOLDER},
    util::{new_id, optional_str, outcome, required_str},
};

use super::with_tx;

const NAME: &str = "Folder";

/// Per-user folder trees holding groups.
#[derive(Clone, Debug)]
pub struct Folder {
    database: DatabaseConnection,
}

impl Folder {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    /// Create a folder for `owner`. Names are unique per owner.
    pub async fn create_folder(
        &self,
        owner: &str,
        name: &str,
        parent: Option<&str>,
    ) -> ResultConcept<String> {
        with_tx!(self, |db_tx| {
            if find_by_name(&db_tx, owner, name).await?.is_some() {
                return Err(ConceptError::Rejected(format!(
                    "A folder with the name \"{name}\" already exists for this owner."
                )));
            }

            let id = new_id();
            folders::ActiveModel {
                id: ActiveValue::Set(id.clone()),
                owner: ActiveValue::Set(owner.to_string()),
                name: ActiveValue::Set(name.to_string()),
                parent: ActiveValue::Set(parent.map(str::to_string)),
            }
            .insert(&db_tx)
            .await?;
            Ok(id)
        })
    }

    /// Re-parent a folder. An unknown or missing parent makes it top-level.
    pub async fn move_folder(
        &self,
        user: &str,
        folder: &str,
        new_parent: Option<&str>,
    ) -> ResultConcept<String> {
        with_tx!(self, |db_tx| {
            let model = owned(&db_tx, user, folder).await?.ok_or_else(|| {
                ConceptError::Rejected(format!(
                    "Current Folder not found: A folder with the id \"{folder}\" doesn't exist for this user."
                ))
            })?;

            let parent = match new_parent {
                Some(parent) => owned(&db_tx, user, parent).await?,
                None => None,
            };
            if let Some(parent) = &parent {
                if is_within(&db_tx, &parent.id, folder).await? {
                    return Err(ConceptError::Rejected(
                        "A folder cannot be moved into itself or one of its subfolders."
                            .to_string(),
                    ));
                }
            }

            let id = model.id.clone();
            let mut active: folders::ActiveModel = model.into();
            active.parent = ActiveValue::Set(parent.map(|parent| parent.id));
            active.update(&db_tx).await?;
            Ok(id)
        })
    }

    /// File `group` under the user's folder called `folder_name`. Idempotent.
    pub async fn add_group_to_folder(
        &self,
        user: &str,
        folder_name: &str,
        group: &str,
    ) -> ResultConcept<()> {
        with_tx!(self, |db_tx| {
            let folder = find_by_name(&db_tx, user, folder_name)
                .await?
                .ok_or_else(|| {
                    ConceptError::Rejected(format!(
                        "Folder \"{folder_name}\" not found for user {user}."
                    ))
                })?;
            file_groups(&db_tx, &folder.id, [group.to_string()]).await?;
            Ok(())
        })
    }

    pub async fn remove_group_from_folder(
        &self,
        user: &str,
        folder: &str,
        group: &str,
    ) -> ResultConcept<()> {
        with_tx!(self, |db_tx| {
            if owned(&db_tx, user, folder).await?.is_none() {
                return Err(ConceptError::Rejected(format!(
                    "Folder \"{folder}\" not found for user {user}."
                )));
            }
            let removed = folder_groups::Entity::delete_many()
                .filter(folder_groups::Column::FolderId.eq(folder.to_string()))
                .filter(folder_groups::Column::GroupId.eq(group.to_string()))
                .exec(&db_tx)
                .await?;
            if removed.rows_affected == 0 {
                return Err(ConceptError::Rejected(format!(
                    "Group \"{group}\" is not in folder \"{folder}\"."
                )));
            }
            Ok(())
        })
    }

    /// Delete a folder. Its groups and subfolders move to its parent, or to
    /// the owner's root folder when it had none.
    pub async fn delete_folder(&self, user: &str, folder: &str) -> ResultConcept<String> {
        with_tx!(self, |db_tx| {
            let model = owned(&db_tx, user, folder).await?.ok_or_else(|| {
                ConceptError::Rejected(format!("Folder \"{folder}\" not found for user {user}."))
            })?;

            let target = match &model.parent {
                Some(parent) => Some(parent.clone()),
                None => find_by_name(&db_tx, user, ROOT_FOLDER)
                    .await?
                    .filter(|root| root.id != model.id)
                    .map(|root| root.id),
            };

            let groups = groups_of(&db_tx, &model.id).await?;
            let children = folders::Entity::find()
                .filter(folders::Column::Parent.eq(model.id.clone()))
                .all(&db_tx)
                .await?;

            folder_groups::Entity::delete_many()
                .filter(folder_groups::Column::FolderId.eq(model.id.clone()))
                .exec(&db_tx)
                .await?;
            folders::Entity::delete_by_id(model.id.clone())
                .exec(&db_tx)
                .await?;

            match &target {
                Some(target) => {
                    file_groups(&db_tx, target, groups).await?;
                }
                None => tracing::warn!(
                    "no root folder for user {user}: contents of folder {folder} are left top-level"
                ),
            }
            for child in children {
                let mut active: folders::ActiveModel = child.into();
                active.parent = ActiveValue::Set(target.clone());
                active.update(&db_tx).await?;
            }
            Ok(model.id)
        })
    }

    pub async fn rename_folder(&self, user: &str, folder: &str, name: &str) -> ResultConcept<()> {
        with_tx!(self, |db_tx| {
            let model = owned(&db_tx, user, folder)
                .await?
                .ok_or_else(|| ConceptError::Rejected(format!("Folder \"{folder}\" not found.")))?;
            if let Some(existing) = find_by_name(&db_tx, user, name).await? {
                if existing.id != model.id {
                    return Err(ConceptError::Rejected(format!(
                        "A folder with the name \"{name}\" already exists."
                    )));
                }
            }

            let mut active: folders::ActiveModel = model.into();
            active.name = ActiveValue::Set(name.to_string());
            active.update(&db_tx).await?;
            Ok(())
        })
    }

    pub async fn list_folders(&self, user: &str) -> ResultConcept<Vec<Record>> {
        let models = folders::Entity::find()
            .filter(folders::Column::Owner.eq(user.to_string()))
            .order_by_asc(folders::Column::Name)
            .all(&self.database)
            .await?;
        self.with_groups(models).await
    }

    pub async fn folder_by_id(&self, user: &str, folder: &str) -> ResultConcept<Option<Record>> {
        let Some(model) = owned(&self.database, user, folder).await? else {
            return Ok(None);
        };
        Ok(self.with_groups(vec![model]).await?.pop())
    }

    pub async fn list_subfolders(&self, user: &str, parent: &str) -> ResultConcept<Vec<Record>> {
        let models = folders::Entity::find()
            .filter(folders::Column::Owner.eq(user.to_string()))
            .filter(folders::Column::Parent.eq(parent.to_string()))
            .order_by_asc(folders::Column::Name)
            .all(&self.database)
            .await?;
        self.with_groups(models).await
    }

    /// Top-level folders of `user`.
    pub async fn root_folders(&self, user: &str) -> ResultConcept<Vec<Record>> {
        let models = folders::Entity::find()
            .filter(folders::Column::Owner.eq(user.to_string()))
            .filter(folders::Column::Parent.is_null())
            .order_by_asc(folders::Column::Name)
            .all(&self.database)
            .await?;
        self.with_groups(models).await
    }

    pub async fn groups_in_folder(&self, user: &str, folder: &str) -> ResultConcept<Vec<String>> {
        match owned(&self.database, user, folder).await? {
            Some(model) => groups_of(&self.database, &model.id).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn groups_in_folder_by_name(&self, user: &str, name: &str) -> ResultConcept<Vec<String>> {
        match find_by_name(&self.database, user, name).await? {
            Some(model) => groups_of(&self.database, &model.id).await,
            None => Ok(Vec::new()),
        }
    }

    /// The user's folder that currently holds `group`.
    pub async fn folder_by_group(&self, user: &str, group: &str) -> ResultConcept<Option<folders::Model>> {
        Ok(folders::Entity::find()
            .inner_join(folder_groups::Entity)
            .filter(folders::Column::Owner.eq(user.to_string()))
            .filter(folder_groups::Column::GroupId.eq(group.to_string()))
            .one(&self.database)
            .await?)
    }

    pub async fn root_id(&self, user: &str) -> ResultConcept<Option<String>> {
        Ok(find_by_name(&self.database, user, ROOT_FOLDER)
            .await?
            .map(|root| root.id))
    }

    async fn with_groups(&self, models: Vec<folders::Model>) -> ResultConcept<Vec<Record>> {
        let ids: Vec<String> = models.iter().map(|model| model.id.clone()).collect();
        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        for row in folder_groups::Entity::find()
            .filter(folder_groups::Column::FolderId.is_in(ids))
            .order_by_asc(folder_groups::Column::GroupId)
            .all(&self.database)
            .await?
        {
            groups.entry(row.folder_id).or_default().push(row.group_id);
        }
        Ok(models
            .iter()
            .map(|model| model.to_record(groups.remove(&model.id).unwrap_or_default()))
            .collect())
    }

    async fn dispatch(&self, action: &str, inputs: &Record) -> ResultConcept<Record> {
        match action {
            "createFolder" => {
                let folder = self
                    .create_folder(
                        &required_str(inputs, "owner")?,
                        &required_str(inputs, "name")?,
                        optional_str(inputs, "parent")?.as_deref(),
                    )
                    .await?;
                Ok(record! { "folder" => folder })
            }
            "moveFolder" => {
                let folder = self
                    .move_folder(
                        &required_str(inputs, "user")?,
                        &required_str(inputs, "folderToMove")?,
                        optional_str(inputs, "newParent")?.as_deref(),
                    )
                    .await?;
                Ok(record! { "folder" => folder })
            }
            "addGroupToFolder" => {
                self.add_group_to_folder(
                    &required_str(inputs, "user")?,
                    &required_str(inputs, "folderName")?,
                    &required_str(inputs, "group")?,
                )
                .await?;
                Ok(Record::new())
            }
            "removeGroupFromFolder" => {
                self.remove_group_from_folder(
                    &required_str(inputs, "user")?,
                    &required_str(inputs, "folder")?,
                    &required_str(inputs, "group")?,
                )
                .await?;
                Ok(Record::new())
            }
            "deleteFolder" => {
                let deleted = self
                    .delete_folder(&required_str(inputs, "user")?, &required_str(inputs, "folder")?)
                    .await?;
                Ok(record! { "folderDeleted" => deleted })
            }
            "renameFolder" => {
                self.rename_folder(
                    &required_str(inputs, "user")?,
                    &required_str(inputs, "folder")?,
                    &required_str(inputs, "name")?,
                )
                .await?;
                Ok(record! { "success" => true })
            }
            "listSubfolders" => {
                let folders = self
                    .list_subfolders(&required_str(inputs, "user")?, &required_str(inputs, "parent")?)
                    .await?;
                Ok(record! { "folders" => folders })
            }
            "getRootFolder" => {
                let folders = self.root_folders(&required_str(inputs, "user")?).await?;
                Ok(record! { "folders" => folders })
            }
            other => Err(ConceptError::UnknownOperation(format!("{NAME}.{other}"))),
        }
    }

    async fn lookup(&self, query: &str, inputs: &Record) -> ResultConcept<Vec<Record>> {
        let user = required_str(inputs, "user")?;
        let rows = match query {
            "_listFolders" => folder_rows(self.list_folders(&user).await?),
            "_getFolderById" => folder_rows(
                self.folder_by_id(&user, &required_str(inputs, "folder")?)
                    .await?
                    .into_iter()
                    .collect(),
            ),
            "_listSubfolders" => {
                folder_rows(self.list_subfolders(&user, &required_str(inputs, "parent")?).await?)
            }
            "_getRootFolder" => folder_rows(self.root_folders(&user).await?),
            "_listGroupsInFolder" => group_rows(
                self.groups_in_folder(&user, &required_str(inputs, "folder")?)
                    .await?,
            ),
            "_listGroupsInFolderByName" => group_rows(
                self.groups_in_folder_by_name(&user, &required_str(inputs, "name")?)
                    .await?,
            ),
            "_getFolderByGroupAndUser" => self
                .folder_by_group(&user, &required_str(inputs, "group")?)
                .await?
                .map(|model| record! { "folder" => model.id, "name" => model.name })
                .into_iter()
                .collect(),
            "_getRootId" => self
                .root_id(&user)
                .await?
                .map(|root| record! { "folder" => root })
                .into_iter()
                .collect(),
            other => return Err(ConceptError::UnknownOperation(format!("{NAME}.{other}"))),
        };
        Ok(rows)
    }
}

fn folder_rows(folders: Vec<Record>) -> Vec<Record> {
    folders
        .into_iter()
        .map(|info| {
            let id = info.get("_id").cloned().unwrap_or(Value::Null);
            record! { "folder" => id, "folderInfo" => info }
        })
        .collect()
}

fn group_rows(groups: Vec<String>) -> Vec<Record> {
    groups
        .into_iter()
        .map(|group| record! { "group" => group })
        .collect()
}

async fn owned<C>(db: &C, user: &str, folder: &str) -> ResultConcept<Option<folders::Model>>
where
    C: ConnectionTrait,
{
    Ok(folders::Entity::find_by_id(folder.to_string())
        .filter(folders::Column::Owner.eq(user.to_string()))
        .one(db)
        .await?)
}

async fn find_by_name<C>(db: &C, owner: &str, name: &str) -> ResultConcept<Option<folders::Model>>
where
    C: ConnectionTrait,
{
    Ok(folders::Entity::find()
        .filter(folders::Column::Owner.eq(owner.to_string()))
        .filter(folders::Column::Name.eq(name.to_string()))
        .one(db)
        .await?)
}

async fn groups_of<C>(db: &C, folder: &str) -> ResultConcept<Vec<String>>
where
    C: ConnectionTrait,
{
    Ok(folder_groups::Entity::find()
        .filter(folder_groups::Column::FolderId.eq(folder.to_string()))
        .order_by_asc(folder_groups::Column::GroupId)
        .all(db)
        .await?
        .into_iter()
        .map(|row| row.group_id)
        .collect())
}

async fn file_groups<C, I>(db: &C, folder: &str, groups: I) -> ResultConcept<()>
where
    C: ConnectionTrait,
    I: IntoIterator<Item = String>,
{
    for group in groups {
        folder_groups::Entity::insert(folder_groups::ActiveModel {
            folder_id: ActiveValue::Set(folder.to_string()),
            group_id: ActiveValue::Set(group),
        })
        .on_conflict(
            OnConflict::columns([folder_groups::Column::FolderId, folder_groups::Column::GroupId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    }
    Ok(())
}

/// True when `candidate` is `folder` or one of its descendants.
async fn is_within<C>(db: &C, candidate: &str, folder: &str) -> ResultConcept<bool>
where
    C: ConnectionTrait,
{
    let mut current = Some(candidate.to_string());
    while let Some(id) = current {
        if id == folder {
            return Ok(true);
        }
        current = folders::Entity::find_by_id(id)
            .one(db)
            .await?
            .and_then(|model| model.parent);
    }
    Ok(false)
}

#[async_trait]
impl Concept for Folder {
    fn name(&self) -> &'static str {
        NAME
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![
            OperationSpec::action(NAME, "createFolder")
                .inputs(&["owner", "name", "parent"])
                .success(&["folder"]),
            OperationSpec::action(NAME, "moveFolder")
                .inputs(&["user", "folderToMove", "newParent"])
                .success(&["folder"]),
            OperationSpec::action(NAME, "addGroupToFolder").inputs(&["user", "folderName", "group"]),
            OperationSpec::action(NAME, "removeGroupFromFolder").inputs(&["user", "folder", "group"]),
            OperationSpec::action(NAME, "deleteFolder")
                .inputs(&["user", "folder"])
                .success(&["folderDeleted"]),
            OperationSpec::action(NAME, "renameFolder")
                .inputs(&["user", "folder", "name"])
                .success(&["success"]),
            OperationSpec::action(NAME, "listSubfolders")
                .inputs(&["user", "parent"])
                .success(&["folders"]),
            OperationSpec::action(NAME, "getRootFolder")
                .inputs(&["user"])
                .success(&["folders"]),
            OperationSpec::query(NAME, "_listFolders")
                .inputs(&["user"])
                .success(&["folder", "folderInfo"]),
            OperationSpec::query(NAME, "_getFolderById")
                .inputs(&["user", "folder"])
                .success(&["folder", "folderInfo"]),
            OperationSpec::query(NAME, "_listSubfolders")
                .inputs(&["user", "parent"])
                .success(&["folder", "folderInfo"]),
            OperationSpec::query(NAME, "_getRootFolder")
                .inputs(&["user"])
                .success(&["folder", "folderInfo"]),
            OperationSpec::query(NAME, "_listGroupsInFolder")
                .inputs(&["user", "folder"])
                .success(&["group"]),
            OperationSpec::query(NAME, "_listGroupsInFolderByName")
                .inputs(&["user", "name"])
                .success(&["group"]),
            OperationSpec::query(NAME, "_getFolderByGroupAndUser")
                .inputs(&["user", "group"])
                .success(&["folder", "name"]),
            OperationSpec::query(NAME, "_getRootId")
                .inputs(&["user"])
                .success(&["folder"]),
        ]
    }

    async fn perform(&self, action: &str, inputs: Record) -> Outcome {
        outcome(self.dispatch(action, &inputs).await)
    }

    async fn query(&self, query: &str, inputs: Record) -> Result<Vec<Record>, QueryError> {
        self.lookup(query, &inputs)
            .await
            .map_err(|err| QueryError::new(err.to_string()))
    }
}
