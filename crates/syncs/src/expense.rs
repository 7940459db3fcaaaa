//! Expense routes and the debt bookkeeping behind them.
//!
//! Every split is a debt from its user to the expense payer, so each route
//! that changes splits or payers replays the difference through
//! `Debt.updateDebt`. Splits owed by the payer themself never become debts.

use engine::{ActionTemplate, Extension, Frame, Queries, ResultSync, Rule, Value, record, var};

use crate::pipeline::{Pipeline, request, respond};

const EXPENSE_BY_ID: &str = "Expense._getExpenseById";
const SPLITS_BY_EXPENSE: &str = "Expense._getSplitsByExpense";

/// `Debt.updateDebt` from the bound `debtor` to `creditor`.
fn update_debt() -> ActionTemplate {
    ActionTemplate::call("Debt.updateDebt")
        .arg("payer", var("creditor"))
        .arg("receiver", var("debtor"))
        .arg("amount", var("amount"))
}

/// Frames binding `debtor` and `amount` per split in `splits`, each amount
/// scaled by `sign`.
fn debt_frames(frame: &Frame, creditor: &str, splits: &[Value], sign: i64) -> Vec<Frame> {
    splits
        .iter()
        .filter_map(|split| {
            let debtor = split.get("user")?.as_str()?;
            let owed = split.get("amountOwed")?.as_i64()?;
            (debtor != creditor).then(|| {
                frame
                    .with("debtor", debtor)
                    .with("amount", owed.saturating_mul(sign))
            })
        })
        .collect()
}

async fn payer_of(queries: &Queries, expense: &str) -> ResultSync<Option<String>> {
    let row = queries
        .first(EXPENSE_BY_ID, record! { "expenseId" => expense })
        .await?;
    Ok(row
        .and_then(|row| row.get("payer").cloned())
        .and_then(|payer| payer.as_str().map(str::to_string)))
}

async fn splits_of(queries: &Queries, expense: &str) -> ResultSync<Vec<Value>> {
    let rows = queries
        .query(SPLITS_BY_EXPENSE, record! { "expense" => expense })
        .await?;
    Ok(rows.into_iter().map(Value::Object).collect())
}

/// New expense: every split becomes a debt to the stored payer.
fn debts_of_new_expense() -> Extension {
    Extension::new(
        &["expense"],
        &["creditor", "debtor", "amount"],
        |frame: Frame, queries| async move {
            let expense = frame.require_str("expense")?;
            let Some(creditor) = payer_of(&queries, expense).await? else {
                return Ok(Vec::new());
            };
            let splits = splits_of(&queries, expense).await?;
            let frame = frame.with("creditor", creditor.as_str());
            Ok(debt_frames(&frame, &creditor, &splits, 1))
        },
    )
}

/// Deleted expense: the returned splits are owed back by the payer.
fn debts_of_deleted_expense() -> Extension {
    Extension::new(
        &["creditor", "splits"],
        &["debtor", "amount"],
        |frame: Frame, _| async move {
            let creditor = frame.require_str("creditor")?;
            let splits = frame
                .require("splits")?
                .as_array()
                .cloned()
                .unwrap_or_default();
            Ok(debt_frames(&frame, creditor, &splits, -1))
        },
    )
}

/// Changed payer: splits move from `previousPayer` to `newPayer`. `release`
/// selects the side handled, bound as `creditor`.
fn debts_of_moved_payer(release: bool) -> Extension {
    Extension::new(
        &["newExpense", "previousPayer", "newPayer"],
        &["creditor", "debtor", "amount"],
        move |frame: Frame, queries| async move {
            let previous = frame.require_str("previousPayer")?;
            let new = frame.require_str("newPayer")?;
            if previous == new {
                return Ok(Vec::new());
            }
            let (creditor, sign) = if release { (previous, -1) } else { (new, 1) };
            let splits = splits_of(&queries, frame.require_str("newExpense")?).await?;
            let frame = frame.with("creditor", creditor);
            Ok(debt_frames(&frame, creditor, &splits, sign))
        },
    )
}

/// Added split: the split user owes the payer, unless they are the payer.
fn debt_of_added_split() -> Extension {
    Extension::new(
        &["expense", "user"],
        &["creditor"],
        |frame: Frame, queries| async move {
            let Some(creditor) = payer_of(&queries, frame.require_str("expense")?).await? else {
                return Ok(Vec::new());
            };
            if creditor == frame.require_str("user")? {
                return Ok(Vec::new());
            }
            Ok(vec![frame.with("creditor", creditor)])
        },
    )
}

/// Removed split: the split user no longer owes the payer, unless they are
/// the payer.
fn debt_of_removed_split() -> Extension {
    Extension::new(
        &["expense", "debtor", "owed"],
        &["creditor", "amount"],
        |frame: Frame, queries| async move {
            let Some(creditor) = payer_of(&queries, frame.require_str("expense")?).await? else {
                return Ok(Vec::new());
            };
            if creditor == frame.require_str("debtor")? {
                return Ok(Vec::new());
            }
            let amount = frame.require_i64("owed")?.saturating_neg();
            Ok(vec![frame.with("creditor", creditor).with("amount", amount)])
        },
    )
}

pub(crate) fn rules() -> Vec<Rule> {
    let mut rules = Vec::new();

    let create = Pipeline::new(
        "CreateExpense",
        request(
            "/Expense/createExpense",
            &[
                "user",
                "group",
                "token",
                "title",
                "description",
                "category",
                "totalCost",
                "date",
                "payer",
                "splits",
            ],
        ),
        "user",
        ActionTemplate::call("Expense.createExpense").args(&[
            "user",
            "group",
            "title",
            "description",
            "category",
            "totalCost",
            "date",
            "payer",
            "splits",
        ]),
    )
    .outputs(&["expense"])
    .respond(respond().args(&["expense"]));
    rules.push(
        create
            .follow_up("Debts")
            .when(create.succeeded())
            .where_with(debts_of_new_expense())
            .then(update_debt()),
    );
    rules.extend(create.rules());

    let edit = Pipeline::new(
        "EditExpense",
        request(
            "/Expense/editExpense",
            &[
                "user",
                "expenseToEdit",
                "token",
                "title",
                "description",
                "category",
                "totalCost",
                "date",
                "payer",
            ],
        ),
        "user",
        ActionTemplate::call("Expense.editExpense").args(&[
            "expenseToEdit",
            "title",
            "description",
            "category",
            "totalCost",
            "date",
            "payer",
        ]),
    )
    .outputs(&["newExpense", "previousPayer"])
    .output("payer", var("newPayer"))
    .respond(respond().arg("expense", var("newExpense")));
    for (suffix, release) in [("ReleaseDebts", true), ("AssignDebts", false)] {
        rules.push(
            edit.follow_up(suffix)
                .when(edit.succeeded())
                .where_with(debts_of_moved_payer(release))
                .then(update_debt()),
        );
    }
    rules.extend(edit.rules());

    let delete = Pipeline::new(
        "DeleteExpense",
        request("/Expense/deleteExpense", &["user", "expenseToDelete", "token"]),
        "user",
        ActionTemplate::call("Expense.deleteExpense").args(&["expenseToDelete"]),
    )
    .outputs(&["deletedExpense", "splits"])
    .output("payer", var("creditor"));
    rules.push(
        delete
            .follow_up("ReverseDebts")
            .when(delete.succeeded())
            .where_with(debts_of_deleted_expense())
            .then(update_debt()),
    );
    rules.extend(delete.rules());

    let add_split = Pipeline::new(
        "AddUserSplit",
        request(
            "/Expense/addUserSplit",
            &["expense", "user", "creator", "amountOwed", "token"],
        ),
        "creator",
        ActionTemplate::call("Expense.addUserSplit").args(&["expense", "user", "amountOwed"]),
    )
    .outputs(&["split"])
    .respond(respond().args(&["split"]));
    rules.push(
        add_split
            .follow_up("Debt")
            .when(add_split.succeeded())
            .where_with(debt_of_added_split())
            .then(
                ActionTemplate::call("Debt.updateDebt")
                    .arg("payer", var("creditor"))
                    .arg("receiver", var("user"))
                    .arg("amount", var("amountOwed")),
            ),
    );
    rules.extend(add_split.rules());

    let remove_split = Pipeline::new(
        "RemoveUserSplit",
        request(
            "/Expense/removeUserSplit",
            &["expense", "userSplit", "creator", "token"],
        ),
        "creator",
        ActionTemplate::call("Expense.removeUserSplit").args(&["expense", "userSplit"]),
    )
    .output("user", var("debtor"))
    .output("amountOwed", var("owed"));
    rules.push(
        remove_split
            .follow_up("Debt")
            .when(remove_split.succeeded())
            .where_with(debt_of_removed_split())
            .then(update_debt()),
    );
    rules.extend(remove_split.rules());

    rules
}
