use async_trait::async_trait;
use engine::{Concept, OperationSpec, Outcome, QueryError, Record, record};
use sea_orm::{
    ActiveValue, DatabaseTransaction, DatabaseConnection, QueryFilter, QueryOrder, TransactionTrait,
    prelude::*,
};

use crate::{
    ConceptError, ResultConcept, group_members, groups,
    util::{new_id, optional_str, outcome, required_str},
};

use super::with_tx;

const NAME: &str = "Group";

/// Groups of users sharing expenses.
#[derive(Clone, Debug)]
pub struct Group {
    database: DatabaseConnection,
}

impl Group {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    /// Create a group; the creator becomes its first member.
    pub async fn create_group(
        &self,
        creator: &str,
        name: &str,
        description: &str,
    ) -> ResultConcept<String> {
        with_tx!(self, |db_tx| {
            let id = new_id();
            groups::ActiveModel {
                id: ActiveValue::Set(id.clone()),
                name: ActiveValue::Set(name.to_string()),
                description: ActiveValue::Set(description.to_string()),
                creator: ActiveValue::Set(creator.to_string()),
            }
            .insert(&db_tx)
            .await?;
            join(&db_tx, &id, creator).await?;
            Ok(id)
        })
    }

    pub async fn add_user(&self, group: &str, inviter: &str, new_member: &str) -> ResultConcept<()> {
        with_tx!(self, |db_tx| {
            let (_, members) = load(&db_tx, group).await?;
            if !members.iter().any(|member| member == inviter) {
                return Err(ConceptError::Rejected(
                    "Inviter is not a member of the group.".to_string(),
                ));
            }
            if members.iter().any(|member| member == new_member) {
                return Err(ConceptError::Rejected(
                    "New member is already in the group.".to_string(),
                ));
            }
            join(&db_tx, group, new_member).await?;
            Ok(())
        })
    }

    pub async fn remove_user(&self, group: &str, remover: &str, member: &str) -> ResultConcept<()> {
        with_tx!(self, |db_tx| {
            let (model, members) = load(&db_tx, group).await?;
            if !members.iter().any(|m| m == remover) {
                return Err(ConceptError::Rejected(
                    "Remover is not a member of the group.".to_string(),
                ));
            }
            if !members.iter().any(|m| m == member) {
                return Err(ConceptError::Rejected(
                    "Member to remove is not in the group.".to_string(),
                ));
            }
            if member == model.creator && members.len() == 1 {
                return Err(ConceptError::Rejected(
                    "Cannot remove the creator if they are the last member.".to_string(),
                ));
            }
            leave(&db_tx, group, member).await?;
            Ok(())
        })
    }

    pub async fn leave_group(&self, group: &str, member: &str) -> ResultConcept<()> {
        with_tx!(self, |db_tx| {
            let (model, members) = load(&db_tx, group).await?;
            if !members.iter().any(|m| m == member) {
                return Err(ConceptError::Rejected("Member is not in the group.".to_string()));
            }
            if member == model.creator && members.len() == 1 {
                return Err(ConceptError::Rejected(
                    "Cannot leave if you are the only member and the creator.".to_string(),
                ));
            }
            leave(&db_tx, group, member).await?;
            Ok(())
        })
    }

    /// Delete a group nobody but its creator still belongs to.
    pub async fn delete_group(&self, group: &str) -> ResultConcept<()> {
        with_tx!(self, |db_tx| {
            let (model, members) = load(&db_tx, group).await?;
            if members.iter().any(|member| *member != model.creator) {
                return Err(ConceptError::Rejected(
                    "Cannot delete a group with active members.".to_string(),
                ));
            }
            group_members::Entity::delete_many()
                .filter(group_members::Column::GroupId.eq(group.to_string()))
                .exec(&db_tx)
                .await?;
            groups::Entity::delete_by_id(group.to_string())
                .exec(&db_tx)
                .await?;
            Ok(())
        })
    }

    pub async fn members(&self, group: &str) -> ResultConcept<Vec<String>> {
        Ok(group_members::Entity::find()
            .filter(group_members::Column::GroupId.eq(group.to_string()))
            .order_by_asc(group_members::Column::UserId)
            .all(&self.database)
            .await?
            .into_iter()
            .map(|row| row.user_id)
            .collect())
    }

    pub async fn is_member(&self, group: &str, user: &str) -> ResultConcept<bool> {
        let found = group_members::Entity::find_by_id((group.to_string(), user.to_string()))
            .one(&self.database)
            .await?;
        Ok(found.is_some())
    }

    pub async fn group_info(&self, group: &str) -> ResultConcept<Option<Record>> {
        let Some(model) = groups::Entity::find_by_id(group.to_string())
            .one(&self.database)
            .await?
        else {
            return Ok(None);
        };
        let members = self.members(group).await?;
        Ok(Some(model.to_record(members)))
    }

    async fn dispatch(&self, action: &str, inputs: &Record) -> ResultConcept<Record> {
        match action {
            "createGroup" => {
                let group = self
                    .create_group(
                        &required_str(inputs, "creator")?,
                        &required_str(inputs, "name")?,
                        &optional_str(inputs, "description")?.unwrap_or_default(),
                    )
                    .await?;
                Ok(record! { "group" => group })
            }
            "addUser" => {
                self.add_user(
                    &required_str(inputs, "group")?,
                    &required_str(inputs, "inviter")?,
                    &required_str(inputs, "newMember")?,
                )
                .await?;
                Ok(Record::new())
            }
            "removeUser" => {
                self.remove_user(
                    &required_str(inputs, "group")?,
                    &required_str(inputs, "remover")?,
                    &required_str(inputs, "member")?,
                )
                .await?;
                Ok(Record::new())
            }
            "leaveGroup" => {
                self.leave_group(&required_str(inputs, "group")?, &required_str(inputs, "member")?)
                    .await?;
                Ok(record! { "left" => true })
            }
            "deleteGroup" => {
                self.delete_group(&required_str(inputs, "group")?).await?;
                Ok(Record::new())
            }
            other => Err(ConceptError::UnknownOperation(format!("{NAME}.{other}"))),
        }
    }

    async fn lookup(&self, query: &str, inputs: &Record) -> ResultConcept<Vec<Record>> {
        let group = required_str(inputs, "group")?;
        let rows = match query {
            "_listMembers" => self
                .members(&group)
                .await?
                .into_iter()
                .map(|member| record! { "member" => member })
                .collect(),
            "_isMember" => {
                let user = required_str(inputs, "user")?;
                if self.is_member(&group, &user).await? {
                    vec![record! { "member" => user }]
                } else {
                    Vec::new()
                }
            }
            "_getGroup" => self
                .group_info(&group)
                .await?
                .map(|info| record! { "groupInfo" => info })
                .into_iter()
                .collect(),
            other => return Err(ConceptError::UnknownOperation(format!("{NAME}.{other}"))),
        };
        Ok(rows)
    }
}

async fn load(db_tx: &DatabaseTransaction, group: &str) -> ResultConcept<(groups::Model, Vec<String>)> {
    let model = groups::Entity::find_by_id(group.to_string())
        .one(db_tx)
        .await?
        .ok_or_else(|| ConceptError::KeyNotFound("Group".to_string()))?;
    let members = group_members::Entity::find()
        .filter(group_members::Column::GroupId.eq(group.to_string()))
        .all(db_tx)
        .await?
        .into_iter()
        .map(|row| row.user_id)
        .collect();
    Ok((model, members))
}

async fn join(db_tx: &DatabaseTransaction, group: &str, user: &str) -> ResultConcept<()> {
    group_members::ActiveModel {
        group_id: ActiveValue::Set(group.to_string()),
        user_id: ActiveValue::Set(user.to_string()),
    }
    .insert(db_tx)
    .await?;
    Ok(())
}

async fn leave(db_tx: &DatabaseTransaction, group: &str, user: &str) -> ResultConcept<()> {
    group_members::Entity::delete_by_id((group.to_string(), user.to_string()))
        .exec(db_tx)
        .await?;
    Ok(())
}

#[async_trait]
impl Concept for Group {
    fn name(&self) -> &'static str {
        NAME
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![
            OperationSpec::action(NAME, "createGroup")
                .inputs(&["creator", "name", "description"])
                .success(&["group"]),
            OperationSpec::action(NAME, "addUser").inputs(&["group", "inviter", "newMember"]),
            OperationSpec::action(NAME, "removeUser").inputs(&["group", "remover", "member"]),
            OperationSpec::action(NAME, "leaveGroup")
                .inputs(&["group", "member"])
                .success(&["left"]),
            OperationSpec::action(NAME, "deleteGroup").inputs(&["group"]),
            OperationSpec::query(NAME, "_listMembers")
                .inputs(&["group"])
                .success(&["member"]),
            OperationSpec::query(NAME, "_isMember")
                .inputs(&["group", "user"])
                .success(&["member"]),
            OperationSpec::query(NAME, "_getGroup")
                .inputs(&["group"])
                .success(&["groupInfo"]),
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
