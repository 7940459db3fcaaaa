//! Manual debt routes.

use engine::{ActionTemplate, Rule};

use crate::pipeline::{Pipeline, request, respond};

pub(crate) fn rules() -> Vec<Rule> {
    [
        Pipeline::new(
            "CreateDebt",
            request("/Debt/createDebt", &["user", "userA", "userB", "token"]),
            "user",
            ActionTemplate::call("Debt.createDebt").args(&["userA", "userB"]),
        )
        .outputs(&["debt"])
        .respond(respond().args(&["debt"])),
        Pipeline::new(
            "UpdateDebt",
            request(
                "/Debt/updateDebt",
                &["payer", "receiver", "amount", "creator", "token"],
            ),
            "creator",
            ActionTemplate::call("Debt.updateDebt").args(&["payer", "receiver", "amount"]),
        )
        .outputs(&["debt"])
        .respond(respond().args(&["debt"])),
        Pipeline::new(
            "DeleteDebt",
            request("/Debt/deleteDebt", &["userA", "userB", "token"]),
            "userA",
            ActionTemplate::call("Debt.deleteDebt").args(&["userA", "userB"]),
        ),
    ]
    .into_iter()
    .flat_map(Pipeline::rules)
    .collect()
}
