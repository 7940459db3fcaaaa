//! The rule base wiring the ledger's concepts together.
//!
//! Every HTTP route handled through `Requesting.request` is a family of rules
//! here; see [`pipeline`] for the shape most of them share. Rules are static:
//! [`all`] is called once when the engine is built.

use engine::Rule;

mod authentication;
mod debt;
mod expense;
mod folder;
mod group;
mod pipeline;

/// Name of the folder created for every new user.
pub const ROOT_FOLDER: &str = ".root";

/// The complete rule base.
pub fn all() -> Vec<Rule> {
    let rules: Vec<Rule> = [
        authentication::rules(),
        folder::rules(),
        group::rules(),
        expense::rules(),
        debt::rules(),
    ]
    .into_iter()
    .flatten()
    .collect();
    tracing::debug!("{} sync rules declared", rules.len());
    rules
}
