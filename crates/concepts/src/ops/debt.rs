use async_trait::async_trait;
use engine::{Concept, OperationSpec, Outcome, QueryError, Record, record};
use sea_orm::{
    ActiveValue, Condition, DatabaseConnection, DatabaseTransaction, QueryFilter, QueryOrder,
    TransactionTrait, prelude::*,
};

use crate::{
    ConceptError, ResultConcept, debts,
    util::{new_id, outcome, required_amount, required_str},
};

use super::with_tx;

const NAME: &str = "Debt";

/// Running balances between pairs of users.
#[derive(Clone, Debug)]
pub struct Debt {
    database: DatabaseConnection,
}

/// Canonical order of a pair: `(low, high, sign)` where `sign` turns an
/// amount seen from `first` into the stored orientation.
fn ordered<'a>(first: &'a str, second: &'a str) -> (&'a str, &'a str, i64) {
    if first <= second {
        (first, second, 1)
    } else {
        (second, first, -1)
    }
}

impl Debt {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    pub async fn create_debt(&self, user_a: &str, user_b: &str) -> ResultConcept<String> {
        if user_a == user_b {
            return Err(ConceptError::Rejected(
                "A debt needs two different users.".to_string(),
            ));
        }
        with_tx!(self, |db_tx| {
            if find_pair(&db_tx, user_a, user_b).await?.is_some() {
                return Err(ConceptError::ExistingKey("Debt".to_string()));
            }
            let debt = insert_pair(&db_tx, user_a, user_b).await?;
            Ok(debt.id)
        })
    }

    /// `receiver` now owes `payer` `amount` more. Negative amounts reverse.
    pub async fn update_debt(&self, payer: &str, receiver: &str, amount: i64) -> ResultConcept<String> {
        if payer == receiver {
            return Err(ConceptError::Rejected(
                "A debt needs two different users.".to_string(),
            ));
        }
        with_tx!(self, |db_tx| {
            let model = match find_pair(&db_tx, payer, receiver).await? {
                Some(model) => model,
                None => insert_pair(&db_tx, payer, receiver).await?,
            };
            let (_, _, sign) = ordered(payer, receiver);
            let balance = amount
                .checked_mul(sign)
                .and_then(|delta| model.balance.checked_add(delta))
                .ok_or_else(|| ConceptError::InvalidAmount("debt balance overflows".to_string()))?;

            let id = model.id.clone();
            let mut active: debts::ActiveModel = model.into();
            active.balance = ActiveValue::Set(balance);
            active.update(&db_tx).await?;
            Ok(id)
        })
    }

    pub async fn delete_debt(&self, user_a: &str, user_b: &str) -> ResultConcept<()> {
        let (low, high, _) = ordered(user_a, user_b);
        let removed = debts::Entity::delete_many()
            .filter(debts::Column::UserA.eq(low.to_string()))
            .filter(debts::Column::UserB.eq(high.to_string()))
            .exec(&self.database)
            .await?;
        if removed.rows_affected == 0 {
            return Err(ConceptError::KeyNotFound("Debt".to_string()));
        }
        Ok(())
    }

    /// The pair's debt and its balance seen from `user_a`.
    pub async fn debt(&self, user_a: &str, user_b: &str) -> ResultConcept<Option<(String, i64)>> {
        let (low, high, _) = ordered(user_a, user_b);
        let found = debts::Entity::find()
            .filter(debts::Column::UserA.eq(low.to_string()))
            .filter(debts::Column::UserB.eq(high.to_string()))
            .one(&self.database)
            .await?;
        Ok(found.map(|model| {
            let balance = model.balance_for(user_a);
            (model.id, balance)
        }))
    }

    pub async fn debts_for(&self, user: &str) -> ResultConcept<Vec<debts::Model>> {
        Ok(debts::Entity::find()
            .filter(
                Condition::any()
                    .add(debts::Column::UserA.eq(user.to_string()))
                    .add(debts::Column::UserB.eq(user.to_string())),
            )
            .order_by_asc(debts::Column::Id)
            .all(&self.database)
            .await?)
    }

    /// Sum of all balances seen from `user`: positive when others owe them.
    pub async fn net_balance(&self, user: &str) -> ResultConcept<i64> {
        Ok(self
            .debts_for(user)
            .await?
            .iter()
            .map(|model| model.balance_for(user))
            .sum())
    }

    async fn dispatch(&self, action: &str, inputs: &Record) -> ResultConcept<Record> {
        match action {
            "createDebt" => {
                let debt = self
                    .create_debt(&required_str(inputs, "userA")?, &required_str(inputs, "userB")?)
                    .await?;
                Ok(record! { "debt" => debt })
            }
            "updateDebt" => {
                let debt = self
                    .update_debt(
                        &required_str(inputs, "payer")?,
                        &required_str(inputs, "receiver")?,
                        required_amount(inputs, "amount")?,
                    )
                    .await?;
                Ok(record! { "debt" => debt })
            }
            "deleteDebt" => {
                self.delete_debt(&required_str(inputs, "userA")?, &required_str(inputs, "userB")?)
                    .await?;
                Ok(Record::new())
            }
            other => Err(ConceptError::UnknownOperation(format!("{NAME}.{other}"))),
        }
    }

    async fn lookup(&self, query: &str, inputs: &Record) -> ResultConcept<Vec<Record>> {
        let rows = match query {
            "_getDebt" => self
                .debt(&required_str(inputs, "userA")?, &required_str(inputs, "userB")?)
                .await?
                .map(|(debt, balance)| record! { "debt" => debt, "balance" => balance })
                .into_iter()
                .collect(),
            "_listDebtsForUser" => {
                let user = required_str(inputs, "user")?;
                self.debts_for(&user)
                    .await?
                    .iter()
                    .map(|model| {
                        record! {
                            "debt" => model.id.clone(),
                            "counterparty" => model.counterparty(&user).to_string(),
                            "balance" => model.balance_for(&user),
                        }
                    })
                    .collect()
            }
            "_getNetBalance" => {
                let balance = self.net_balance(&required_str(inputs, "user")?).await?;
                vec![record! { "balance" => balance }]
            }
            other => return Err(ConceptError::UnknownOperation(format!("{NAME}.{other}"))),
        };
        Ok(rows)
    }
}

async fn find_pair(
    db_tx: &DatabaseTransaction,
    first: &str,
    second: &str,
) -> ResultConcept<Option<debts::Model>> {
    let (low, high, _) = ordered(first, second);
    Ok(debts::Entity::find()
        .filter(debts::Column::UserA.eq(low.to_string()))
        .filter(debts::Column::UserB.eq(high.to_string()))
        .one(db_tx)
        .await?)
}

async fn insert_pair(db_tx: &DatabaseTransaction, first: &str, second: &str) -> ResultConcept<debts::Model> {
    let (low, high, _) = ordered(first, second);
    Ok(debts::ActiveModel {
        id: ActiveValue::Set(new_id()),
        user_a: ActiveValue::Set(low.to_string()),
        user_b: ActiveValue::Set(high.to_string()),
        balance: ActiveValue::Set(0),
    }
    .insert(db_tx)
    .await?)
}

#[async_trait]
impl Concept for Debt {
    fn name(&self) -> &'static str {
        NAME
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![
            OperationSpec::action(NAME, "createDebt")
                .inputs(&["userA", "userB"])
                .success(&["debt"]),
            OperationSpec::action(NAME, "updateDebt")
                .inputs(&["payer", "receiver", "amount"])
                .success(&["debt"]),
            OperationSpec::action(NAME, "deleteDebt").inputs(&["userA", "userB"]),
            OperationSpec::query(NAME, "_getDebt")
                .inputs(&["userA", "userB"])
                .success(&["debt", "balance"]),
            OperationSpec::query(NAME, "_listDebtsForUser")
                .inputs(&["user"])
                .success(&["debt", "counterparty", "balance"]),
            OperationSpec::query(NAME, "_getNetBalance")
                .inputs(&["user"])
                .success(&["balance"]),
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
