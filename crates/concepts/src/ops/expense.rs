use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine::{Concept, OperationSpec, Outcome, QueryError, Record, Value, record};
use sea_orm::{
    ActiveValue, Condition, DatabaseConnection, DatabaseTransaction, QueryFilter, QueryOrder,
    TransactionTrait, prelude::*,
};

use crate::{
    ConceptError, ResultConcept, expenses, user_splits,
    util::{
        SplitInput, new_id, optional_amount, optional_date, optional_splits, optional_str, outcome,
        required_amount, required_str,
    },
};

use super::with_tx;

const NAME: &str = "Expense";
const DEFAULT_TITLE: &str = "Untitled expense";
const DEFAULT_CATEGORY: &str = "General";

/// Fields of a new expense. Everything but `group` and `payer` has a default.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewExpense {
    pub group: String,
    pub payer: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub total_cost: Option<i64>,
    pub date: Option<DateTime<Utc>>,
    pub splits: Option<Vec<(String, i64)>>,
}

/// Partial update of an expense; `None` keeps the stored value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpenseChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub total_cost: Option<i64>,
    pub date: Option<DateTime<Utc>>,
    pub payer: Option<String>,
    pub splits: Option<Vec<(String, i64)>>,
}

/// Result of an edit: the payer before and after it.
#[derive(Clone, Debug, PartialEq)]
pub struct EditedExpense {
    pub id: String,
    pub previous_payer: String,
    pub payer: String,
}

/// What a deleted expense left behind.
#[derive(Clone, Debug, PartialEq)]
pub struct DeletedExpense {
    pub id: String,
    pub payer: String,
    pub splits: Vec<user_splits::Model>,
}

/// Shared expenses and the per-user splits of each.
#[derive(Clone, Debug)]
pub struct Expense {
    database: DatabaseConnection,
}

impl Expense {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    pub async fn create_expense(&self, new: NewExpense) -> ResultConcept<String> {
        let total_cost = new.total_cost.unwrap_or(0);
        check_cost(total_cost)?;
        if let Some(splits) = &new.splits {
            check_splits(splits, total_cost)?;
        }

        with_tx!(self, |db_tx| {
            let id = new_id();
            expenses::ActiveModel {
                id: ActiveValue::Set(id.clone()),
                title: ActiveValue::Set(new.title.unwrap_or_else(|| DEFAULT_TITLE.to_string())),
                description: ActiveValue::Set(new.description),
                category: ActiveValue::Set(
                    new.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
                ),
                total_cost: ActiveValue::Set(total_cost),
                date: ActiveValue::Set(new.date.unwrap_or_else(Utc::now)),
                group_id: ActiveValue::Set(new.group),
                payer: ActiveValue::Set(new.payer),
            }
            .insert(&db_tx)
            .await?;
            for (user, amount_owed) in new.splits.unwrap_or_default() {
                insert_split(&db_tx, &id, &user, amount_owed).await?;
            }
            Ok(id)
        })
    }

    /// Apply `changes`. New splits replace the old ones and must add up to
    /// the resulting total.
    pub async fn edit_expense(
        &self,
        expense: &str,
        changes: ExpenseChanges,
    ) -> ResultConcept<EditedExpense> {
        if let Some(total_cost) = changes.total_cost {
            check_cost(total_cost)?;
        }

        with_tx!(self, |db_tx| {
            let model = find_expense(&db_tx, expense).await?;
            let total_cost = changes.total_cost.unwrap_or(model.total_cost);
            if let Some(splits) = &changes.splits {
                check_splits(splits, total_cost)?;
            }
            let previous_payer = model.payer.clone();
            let payer = changes.payer.clone().unwrap_or_else(|| previous_payer.clone());

            let mut active: expenses::ActiveModel = model.into();
            if let Some(title) = changes.title {
                active.title = ActiveValue::Set(title);
            }
            if let Some(description) = changes.description {
                active.description = ActiveValue::Set(Some(description));
            }
            if let Some(category) = changes.category {
                active.category = ActiveValue::Set(category);
            }
            if let Some(date) = changes.date {
                active.date = ActiveValue::Set(date);
            }
            if let Some(payer) = changes.payer {
                active.payer = ActiveValue::Set(payer);
            }
            active.total_cost = ActiveValue::Set(total_cost);
            active.update(&db_tx).await?;

            if let Some(splits) = changes.splits {
                user_splits::Entity::delete_many()
                    .filter(user_splits::Column::ExpenseId.eq(expense.to_string()))
                    .exec(&db_tx)
                    .await?;
                for (user, amount_owed) in splits {
                    insert_split(&db_tx, expense, &user, amount_owed).await?;
                }
            }
            Ok(EditedExpense {
                id: expense.to_string(),
                previous_payer,
                payer,
            })
        })
    }

    /// Delete an expense with its splits and hand the splits back.
    pub async fn delete_expense(&self, expense: &str) -> ResultConcept<DeletedExpense> {
        with_tx!(self, |db_tx| {
            let model = find_expense(&db_tx, expense).await?;
            let splits = splits_of(&db_tx, expense).await?;
            user_splits::Entity::delete_many()
                .filter(user_splits::Column::ExpenseId.eq(expense.to_string()))
                .exec(&db_tx)
                .await?;
            expenses::Entity::delete_by_id(model.id.clone())
                .exec(&db_tx)
                .await?;
            Ok(DeletedExpense {
                id: model.id,
                payer: model.payer,
                splits,
            })
        })
    }

    pub async fn add_user_split(
        &self,
        expense: &str,
        user: &str,
        amount_owed: i64,
    ) -> ResultConcept<user_splits::Model> {
        check_owed(amount_owed)?;
        with_tx!(self, |db_tx| {
            find_expense(&db_tx, expense).await?;
            let split = insert_split(&db_tx, expense, user, amount_owed).await?;
            Ok(split)
        })
    }

    pub async fn edit_user_split(
        &self,
        expense: &str,
        user: &str,
        amount_owed: i64,
    ) -> ResultConcept<user_splits::Model> {
        check_owed(amount_owed)?;
        with_tx!(self, |db_tx| {
            let model = user_splits::Entity::find()
                .filter(user_splits::Column::ExpenseId.eq(expense.to_string()))
                .filter(user_splits::Column::UserId.eq(user.to_string()))
                .one(&db_tx)
                .await?
                .ok_or_else(|| ConceptError::Rejected("UserSplit not found".to_string()))?;
            let mut active: user_splits::ActiveModel = model.into();
            active.amount_owed = ActiveValue::Set(amount_owed);
            let split = active.update(&db_tx).await?;
            Ok(split)
        })
    }

    /// Remove one split of `expense` and hand it back.
    pub async fn remove_user_split(
        &self,
        expense: &str,
        split: &str,
    ) -> ResultConcept<user_splits::Model> {
        with_tx!(self, |db_tx| {
            let model = user_splits::Entity::find_by_id(split.to_string())
                .filter(user_splits::Column::ExpenseId.eq(expense.to_string()))
                .one(&db_tx)
                .await?
                .ok_or_else(|| ConceptError::Rejected("UserSplit not found".to_string()))?;
            user_splits::Entity::delete_by_id(model.id.clone())
                .exec(&db_tx)
                .await?;
            Ok(model)
        })
    }

    pub async fn expenses_by_group(&self, group: &str) -> ResultConcept<Vec<expenses::Model>> {
        Ok(expenses::Entity::find()
            .filter(expenses::Column::GroupId.eq(group.to_string()))
            .order_by_desc(expenses::Column::Date)
            .all(&self.database)
            .await?)
    }

    /// Expenses `user` paid or owes a share of.
    pub async fn expenses_by_user(&self, user: &str) -> ResultConcept<Vec<expenses::Model>> {
        let owing: Vec<String> = user_splits::Entity::find()
            .filter(user_splits::Column::UserId.eq(user.to_string()))
            .all(&self.database)
            .await?
            .into_iter()
            .map(|split| split.expense_id)
            .collect();
        Ok(expenses::Entity::find()
            .filter(
                Condition::any()
                    .add(expenses::Column::Payer.eq(user.to_string()))
                    .add(expenses::Column::Id.is_in(owing)),
            )
            .order_by_desc(expenses::Column::Date)
            .all(&self.database)
            .await?)
    }

    pub async fn expense_by_id(&self, expense: &str) -> ResultConcept<Option<expenses::Model>> {
        Ok(expenses::Entity::find_by_id(expense.to_string())
            .one(&self.database)
            .await?)
    }

    pub async fn split_by_id(&self, split: &str) -> ResultConcept<Option<user_splits::Model>> {
        Ok(user_splits::Entity::find_by_id(split.to_string())
            .one(&self.database)
            .await?)
    }

    pub async fn splits_by_expense(&self, expense: &str) -> ResultConcept<Vec<user_splits::Model>> {
        Ok(user_splits::Entity::find()
            .filter(user_splits::Column::ExpenseId.eq(expense.to_string()))
            .order_by_asc(user_splits::Column::UserId)
            .all(&self.database)
            .await?)
    }

    pub async fn split_for(&self, expense: &str, user: &str) -> ResultConcept<Option<user_splits::Model>> {
        Ok(user_splits::Entity::find()
            .filter(user_splits::Column::ExpenseId.eq(expense.to_string()))
            .filter(user_splits::Column::UserId.eq(user.to_string()))
            .one(&self.database)
            .await?)
    }

    async fn dispatch(&self, action: &str, inputs: &Record) -> ResultConcept<Record> {
        match action {
            "createExpense" => {
                let user = required_str(inputs, "user")?;
                let new = NewExpense {
                    group: required_str(inputs, "group")?,
                    payer: optional_str(inputs, "payer")?.unwrap_or(user),
                    title: optional_str(inputs, "title")?,
                    description: optional_str(inputs, "description")?,
                    category: optional_str(inputs, "category")?,
                    total_cost: optional_amount(inputs, "totalCost")?,
                    date: optional_date(inputs, "date")?,
                    splits: split_pairs(optional_splits(inputs, "splits")?),
                };
                let expense = self.create_expense(new).await?;
                Ok(record! { "expense" => expense })
            }
            "editExpense" => {
                let changes = ExpenseChanges {
                    title: optional_str(inputs, "title")?,
                    description: optional_str(inputs, "description")?,
                    category: optional_str(inputs, "category")?,
                    total_cost: optional_amount(inputs, "totalCost")?,
                    date: optional_date(inputs, "date")?,
                    payer: optional_str(inputs, "payer")?,
                    splits: split_pairs(optional_splits(inputs, "splits")?),
                };
                let edited = self
                    .edit_expense(&required_str(inputs, "expenseToEdit")?, changes)
                    .await?;
                Ok(record! {
                    "newExpense" => edited.id,
                    "previousPayer" => edited.previous_payer,
                    "payer" => edited.payer,
                })
            }
            "deleteExpense" => {
                let deleted = self
                    .delete_expense(&required_str(inputs, "expenseToDelete")?)
                    .await?;
                let splits: Vec<Value> = deleted
                    .splits
                    .iter()
                    .map(|split| {
                        Value::Object(record! {
                            "user" => split.user_id.clone(),
                            "amountOwed" => split.amount_owed,
                        })
                    })
                    .collect();
                Ok(record! {
                    "deletedExpense" => deleted.id,
                    "payer" => deleted.payer,
                    "splits" => splits,
                })
            }
            "addUserSplit" => {
                let split = self
                    .add_user_split(
                        &required_str(inputs, "expense")?,
                        &required_str(inputs, "user")?,
                        required_amount(inputs, "amountOwed")?,
                    )
                    .await?;
                Ok(record! { "split" => split.id })
            }
            "editUserSplit" => {
                let split = self
                    .edit_user_split(
                        &required_str(inputs, "expense")?,
                        &required_str(inputs, "user")?,
                        required_amount(inputs, "amountOwed")?,
                    )
                    .await?;
                Ok(record! { "split" => split.id })
            }
            "removeUserSplit" => {
                let split = self
                    .remove_user_split(
                        &required_str(inputs, "expense")?,
                        &required_str(inputs, "userSplit")?,
                    )
                    .await?;
                Ok(record! {
                    "user" => split.user_id,
                    "amountOwed" => split.amount_owed,
                })
            }
            other => Err(ConceptError::UnknownOperation(format!("{NAME}.{other}"))),
        }
    }

    async fn lookup(&self, query: &str, inputs: &Record) -> ResultConcept<Vec<Record>> {
        let rows = match query {
            "_getExpensesByGroup" => expense_rows(
                self.expenses_by_group(&required_str(inputs, "group")?)
                    .await?,
            ),
            "_getExpensesByUser" => {
                expense_rows(self.expenses_by_user(&required_str(inputs, "user")?).await?)
            }
            "_getExpenseById" => expense_rows(
                self.expense_by_id(&required_str(inputs, "expenseId")?)
                    .await?
                    .into_iter()
                    .collect(),
            ),
            "_getUserSplitById" => split_rows(
                self.split_by_id(&required_str(inputs, "userSplit")?)
                    .await?
                    .into_iter()
                    .collect(),
            ),
            "_getSplitsByExpense" => split_rows(
                self.splits_by_expense(&required_str(inputs, "expense")?)
                    .await?,
            ),
            "_getSplitForExpense" => split_rows(
                self.split_for(
                    &required_str(inputs, "expense")?,
                    &required_str(inputs, "user")?,
                )
                .await?
                .into_iter()
                .collect(),
            ),
            other => return Err(ConceptError::UnknownOperation(format!("{NAME}.{other}"))),
        };
        Ok(rows)
    }
}

fn check_cost(total_cost: i64) -> ResultConcept<()> {
    if total_cost < 0 {
        return Err(ConceptError::Rejected(
            "totalCost cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn check_owed(amount_owed: i64) -> ResultConcept<()> {
    if amount_owed < 0 {
        return Err(ConceptError::Rejected(
            "amountOwed cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn check_splits(splits: &[(String, i64)], total_cost: i64) -> ResultConcept<()> {
    for (_, amount_owed) in splits {
        if *amount_owed < 0 {
            return Err(ConceptError::InvalidAmount(
                "split amountOwed cannot be negative".to_string(),
            ));
        }
    }
    let sum = splits
        .iter()
        .try_fold(0i64, |sum, (_, amount)| sum.checked_add(*amount))
        .ok_or_else(|| ConceptError::InvalidAmount("sum of splits overflows".to_string()))?;
    if sum != total_cost {
        return Err(ConceptError::Rejected(
            "Sum of splits must equal totalCost".to_string(),
        ));
    }
    Ok(())
}

fn split_pairs(splits: Option<Vec<SplitInput>>) -> Option<Vec<(String, i64)>> {
    splits.map(|splits| {
        splits
            .into_iter()
            .map(|split| (split.user, split.amount_owed))
            .collect()
    })
}

fn expense_rows(models: Vec<expenses::Model>) -> Vec<Record> {
    models
        .into_iter()
        .map(|model| {
            record! {
                "expense" => model.id.clone(),
                "payer" => model.payer.clone(),
                "totalCost" => model.total_cost,
                "expenseInfo" => model.to_record(),
            }
        })
        .collect()
}

fn split_rows(models: Vec<user_splits::Model>) -> Vec<Record> {
    models
        .into_iter()
        .map(|model| {
            record! {
                "split" => model.id,
                "user" => model.user_id,
                "amountOwed" => model.amount_owed,
                "expense" => model.expense_id,
            }
        })
        .collect()
}

async fn find_expense(db_tx: &DatabaseTransaction, expense: &str) -> ResultConcept<expenses::Model> {
    expenses::Entity::find_by_id(expense.to_string())
        .one(db_tx)
        .await?
        .ok_or_else(|| ConceptError::Rejected("Expense not found".to_string()))
}

async fn splits_of(db_tx: &DatabaseTransaction, expense: &str) -> ResultConcept<Vec<user_splits::Model>> {
    Ok(user_splits::Entity::find()
        .filter(user_splits::Column::ExpenseId.eq(expense.to_string()))
        .order_by_asc(user_splits::Column::UserId)
        .all(db_tx)
        .await?)
}

async fn insert_split(
    db_tx: &DatabaseTransaction,
    expense: &str,
    user: &str,
    amount_owed: i64,
) -> ResultConcept<user_splits::Model> {
    Ok(user_splits::ActiveModel {
        id: ActiveValue::Set(new_id()),
        expense_id: ActiveValue::Set(expense.to_string()),
        user_id: ActiveValue::Set(user.to_string()),
        amount_owed: ActiveValue::Set(amount_owed),
    }
    .insert(db_tx)
    .await?)
}

#[async_trait]
impl Concept for Expense {
    fn name(&self) -> &'static str {
        NAME
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![
            OperationSpec::action(NAME, "createExpense")
                .inputs(&[
                    "user",
                    "group",
                    "title",
                    "category",
                    "totalCost",
                    "date",
                    "payer",
                    "description",
                    "splits",
                ])
                .success(&["expense"]),
            OperationSpec::action(NAME, "editExpense")
                .inputs(&[
                    "expenseToEdit",
                    "title",
                    "description",
                    "category",
                    "totalCost",
                    "date",
                    "payer",
                    "splits",
                ])
                .success(&["newExpense", "previousPayer", "payer"]),
            OperationSpec::action(NAME, "deleteExpense")
                .inputs(&["expenseToDelete"])
                .success(&["deletedExpense", "payer", "splits"]),
            OperationSpec::action(NAME, "addUserSplit")
                .inputs(&["expense", "user", "amountOwed"])
                .success(&["split"]),
            OperationSpec::action(NAME, "editUserSplit")
                .inputs(&["expense", "user", "amountOwed"])
                .success(&["split"]),
            OperationSpec::action(NAME, "removeUserSplit")
                .inputs(&["expense", "userSplit"])
                .success(&["user", "amountOwed"]),
            OperationSpec::query(NAME, "_getExpensesByGroup")
                .inputs(&["group"])
                .success(&["expense", "payer", "totalCost", "expenseInfo"]),
            OperationSpec::query(NAME, "_getExpensesByUser")
                .inputs(&["user"])
                .success(&["expense", "payer", "totalCost", "expenseInfo"]),
            OperationSpec::query(NAME, "_getExpenseById")
                .inputs(&["expenseId"])
                .success(&["expense", "payer", "totalCost", "expenseInfo"]),
            OperationSpec::query(NAME, "_getUserSplitById")
                .inputs(&["userSplit"])
                .success(&["split", "user", "amountOwed", "expense"]),
            OperationSpec::query(NAME, "_getSplitsByExpense")
                .inputs(&["expense"])
                .success(&["split", "user", "amountOwed", "expense"]),
            OperationSpec::query(NAME, "_getSplitForExpense")
                .inputs(&["expense", "user"])
                .success(&["split", "user", "amountOwed", "expense"]),
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
