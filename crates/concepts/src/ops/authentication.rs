use async_trait::async_trait;
use engine::{Concept, OperationSpec, Outcome, QueryError, Record, record};
use sea_orm::{ActiveValue, DatabaseConnection, QueryFilter, TransactionTrait, prelude::*};

use crate::{
    ConceptError, ResultConcept, users,
    util::{new_id, normalize_username, outcome, required_str},
};

use super::with_tx;

const NAME: &str = "Authentication";

/// Users, credentials and session tokens.
#[derive(Clone, Debug)]
pub struct Authentication {
    database: DatabaseConnection,
}

impl Authentication {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    /// Register a user and return its id.
    pub async fn create_user(
        &self,
        username: &str,
        display_name: &str,
        password: &str,
    ) -> ResultConcept<String> {
        let username = normalize_username(username);
        with_tx!(self, |db_tx| {
            let existing = users::Entity::find()
                .filter(users::Column::Username.eq(username.clone()))
                .one(&db_tx)
                .await?;
            if existing.is_some() {
                return Err(ConceptError::ExistingKey("Username".to_string()));
            }

            let id = new_id();
            users::ActiveModel {
                id: ActiveValue::Set(id.clone()),
                username: ActiveValue::Set(username),
                display_name: ActiveValue::Set(display_name.to_string()),
                password: ActiveValue::Set(password.to_string()),
                token: ActiveValue::Set(None),
            }
            .insert(&db_tx)
            .await?;
            Ok(id)
        })
    }

    pub async fn edit_user(&self, user: &str, token: &str, display_name: &str) -> ResultConcept<()> {
        let model = self.require_session(user, token).await?;
        let mut active: users::ActiveModel = model.into();
        active.display_name = ActiveValue::Set(display_name.to_string());
        active.update(&self.database).await?;
        Ok(())
    }

    pub async fn delete_user(&self, user: &str, token: &str) -> ResultConcept<()> {
        self.require_session(user, token).await?;
        users::Entity::delete_by_id(user.to_string())
            .exec(&self.database)
            .await?;
        Ok(())
    }

    /// Check the password and open a fresh session. Returns `(user, token)`.
    pub async fn authenticate(&self, username: &str, password: &str) -> ResultConcept<(String, String)> {
        let model = users::Entity::find()
            .filter(users::Column::Username.eq(normalize_username(username)))
            .one(&self.database)
            .await?
            .ok_or_else(|| ConceptError::KeyNotFound("User".to_string()))?;
        if model.password != password {
            return Err(ConceptError::Rejected("Invalid password.".to_string()));
        }

        let token = new_id();
        let user = model.id.clone();
        let mut active: users::ActiveModel = model.into();
        active.token = ActiveValue::Set(Some(token.clone()));
        active.update(&self.database).await?;
        Ok((user, token))
    }

    /// Succeeds when `token` is the user's current session token.
    pub async fn validate_token(&self, user: &str, token: &str) -> ResultConcept<String> {
        users::Entity::find_by_id(user.to_string())
            .filter(users::Column::Token.eq(token.to_string()))
            .one(&self.database)
            .await?
            .map(|model| model.id)
            .ok_or(ConceptError::Unauthenticated)
    }

    pub async fn logout(&self, user: &str, token: &str) -> ResultConcept<()> {
        let model = self.require_session(user, token).await?;
        let mut active: users::ActiveModel = model.into();
        active.token = ActiveValue::Set(None);
        active.update(&self.database).await?;
        Ok(())
    }

    pub async fn user_by_id(&self, user: &str) -> ResultConcept<Option<users::Model>> {
        Ok(users::Entity::find_by_id(user.to_string())
            .one(&self.database)
            .await?)
    }

    pub async fn user_by_username(&self, username: &str) -> ResultConcept<Option<users::Model>> {
        Ok(users::Entity::find()
            .filter(users::Column::Username.eq(normalize_username(username)))
            .one(&self.database)
            .await?)
    }

    async fn require_session(&self, user: &str, token: &str) -> ResultConcept<users::Model> {
        users::Entity::find_by_id(user.to_string())
            .filter(users::Column::Token.eq(token.to_string()))
            .one(&self.database)
            .await?
            .ok_or_else(|| ConceptError::Rejected("Invalid token.".to_string()))
    }

    async fn dispatch(&self, action: &str, inputs: &Record) -> ResultConcept<Record> {
        match action {
            "createUser" => {
                let user = self
                    .create_user(
                        &required_str(inputs, "username")?,
                        &required_str(inputs, "displayName")?,
                        &required_str(inputs, "password")?,
                    )
                    .await?;
                Ok(record! { "user" => user })
            }
            "editUser" => {
                self.edit_user(
                    &required_str(inputs, "user")?,
                    &required_str(inputs, "token")?,
                    &required_str(inputs, "newDisplayName")?,
                )
                .await?;
                Ok(Record::new())
            }
            "deleteUser" => {
                self.delete_user(&required_str(inputs, "user")?, &required_str(inputs, "token")?)
                    .await?;
                Ok(Record::new())
            }
            "authenticate" => {
                let (user, token) = self
                    .authenticate(
                        &required_str(inputs, "username")?,
                        &required_str(inputs, "password")?,
                    )
                    .await?;
                Ok(record! { "user" => user, "token" => token })
            }
            "validateToken" => {
                let user = self
                    .validate_token(&required_str(inputs, "user")?, &required_str(inputs, "token")?)
                    .await?;
                Ok(record! { "user" => user })
            }
            "logout" => {
                self.logout(&required_str(inputs, "user")?, &required_str(inputs, "token")?)
                    .await?;
                Ok(Record::new())
            }
            other => Err(ConceptError::UnknownOperation(format!("{NAME}.{other}"))),
        }
    }

    async fn lookup(&self, query: &str, inputs: &Record) -> ResultConcept<Vec<Record>> {
        let found = match query {
            "_getUserById" => self.user_by_id(&required_str(inputs, "user")?).await?,
            "_getUserByUsername" => {
                self.user_by_username(&required_str(inputs, "username")?)
                    .await?
            }
            other => return Err(ConceptError::UnknownOperation(format!("{NAME}.{other}"))),
        };
        Ok(found
            .map(|model| record! { "userInfo" => model.user_info() })
            .into_iter()
            .collect())
    }
}

#[async_trait]
impl Concept for Authentication {
    fn name(&self) -> &'static str {
        NAME
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![
            OperationSpec::action(NAME, "createUser")
                .inputs(&["username", "displayName", "password"])
                .success(&["user"]),
            OperationSpec::action(NAME, "editUser").inputs(&["user", "token", "newDisplayName"]),
            OperationSpec::action(NAME, "deleteUser").inputs(&["user", "token"]),
            OperationSpec::action(NAME, "authenticate")
                .inputs(&["username", "password"])
                .success(&["user", "token"]),
            OperationSpec::action(NAME, "validateToken")
                .inputs(&["user", "token"])
                .success(&["user"]),
            OperationSpec::action(NAME, "logout").inputs(&["user", "token"]),
            OperationSpec::query(NAME, "_getUserById")
                .inputs(&["user"])
                .success(&["userInfo"]),
            OperationSpec::query(NAME, "_getUserByUsername")
                .inputs(&["username"])
                .success(&["userInfo"]),
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
