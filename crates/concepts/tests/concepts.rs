use concepts::{
    Authentication, ConceptError, Debt, Expense, ExpenseChanges, Folder, Group, NewExpense,
    ROOT_FOLDER,
};
use engine::{Concept, Outcome, record};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};

async fn database() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

#[tokio::test]
async fn usernames_are_unique_ignoring_case() {
    let auth = Authentication::new(database().await);
    auth.create_user("Alice", "Alice A.", "pw").await.unwrap();

    let err = auth.create_user("alice", "Other", "pw").await.unwrap_err();
    assert_eq!(err, ConceptError::ExistingKey("Username".to_string()));
    assert_eq!(err.to_string(), "Username already exists.");
}

#[tokio::test]
async fn sessions_validate_and_end_on_logout() {
    let auth = Authentication::new(database().await);
    let user = auth.create_user("bob", "Bob", "secret").await.unwrap();

    assert_eq!(
        auth.authenticate("bob", "wrong").await.unwrap_err().to_string(),
        "Invalid password."
    );
    let (id, token) = auth.authenticate("BOB", "secret").await.unwrap();
    assert_eq!(id, user);
    assert_eq!(auth.validate_token(&user, &token).await.unwrap(), user);

    auth.logout(&user, &token).await.unwrap();
    assert_eq!(
        auth.validate_token(&user, &token).await.unwrap_err(),
        ConceptError::Unauthenticated
    );
}

#[tokio::test]
async fn user_info_never_exposes_credentials() {
    let auth = Authentication::new(database().await);
    let user = auth.create_user("carol", "Carol", "pw").await.unwrap();

    let rows = auth
        .query("_getUserById", record! { "user" => user.clone() })
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let info = rows[0]["userInfo"].as_object().unwrap();
    assert_eq!(info["_id"], user.as_str());
    assert_eq!(info["displayName"], "Carol");
    assert!(!info.contains_key("password"));

    let none = auth
        .query("_getUserByUsername", record! { "username" => "nobody" })
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn perform_reports_missing_fields_as_errors() {
    let auth = Authentication::new(database().await);
    let outcome = auth
        .perform("createUser", record! { "username" => "dave", "password" => "pw" })
        .await;
    assert_eq!(outcome, Outcome::error("displayName is required."));
}

#[tokio::test]
async fn deleting_a_folder_moves_its_contents_to_the_parent() {
    let folders = Folder::new(database().await);
    let root = folders.create_folder("u1", ROOT_FOLDER, None).await.unwrap();
    let trips = folders.create_folder("u1", "trips", Some(&root)).await.unwrap();
    let summer = folders.create_folder("u1", "summer", Some(&trips)).await.unwrap();
    folders.add_group_to_folder("u1", "trips", "g1").await.unwrap();
    folders.add_group_to_folder("u1", "trips", "g1").await.unwrap();

    folders.delete_folder("u1", &trips).await.unwrap();

    assert_eq!(folders.groups_in_folder("u1", &root).await.unwrap(), vec!["g1"]);
    let children = folders.list_subfolders("u1", &root).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["_id"], summer.as_str());
}

#[tokio::test]
async fn top_level_folders_fall_back_to_the_root_folder() {
    let folders = Folder::new(database().await);
    let root = folders.create_folder("u1", ROOT_FOLDER, None).await.unwrap();
    let work = folders.create_folder("u1", "work", None).await.unwrap();
    folders.add_group_to_folder("u1", "work", "g2").await.unwrap();

    folders.delete_folder("u1", &work).await.unwrap();

    assert_eq!(folders.groups_in_folder("u1", &root).await.unwrap(), vec!["g2"]);
    let found = folders.folder_by_group("u1", "g2").await.unwrap().unwrap();
    assert_eq!(found.id, root);
}

#[tokio::test]
async fn folders_cannot_move_under_their_descendants() {
    let folders = Folder::new(database().await);
    let a = folders.create_folder("u1", "a", None).await.unwrap();
    let b = folders.create_folder("u1", "b", Some(&a)).await.unwrap();

    let err = folders.move_folder("u1", &a, Some(&b)).await.unwrap_err();
    assert!(err.to_string().contains("cannot be moved"));

    // An unknown parent makes the folder top-level.
    folders.move_folder("u1", &b, Some("missing")).await.unwrap();
    let roots = folders.root_folders("u1").await.unwrap();
    assert_eq!(roots.len(), 2);
}

#[tokio::test]
async fn folder_names_are_unique_per_owner() {
    let folders = Folder::new(database().await);
    folders.create_folder("u1", "home", None).await.unwrap();
    folders.create_folder("u2", "home", None).await.unwrap();
    assert!(folders.create_folder("u1", "home", None).await.is_err());

    let other = folders.create_folder("u1", "other", None).await.unwrap();
    let err = folders.rename_folder("u1", &other, "home").await.unwrap_err();
    assert_eq!(err.to_string(), "A folder with the name \"home\" already exists.");
}

#[tokio::test]
async fn group_membership_rules() {
    let groups = Group::new(database().await);
    let group = groups.create_group("alice", "Flat", "rent").await.unwrap();
    assert!(groups.is_member(&group, "alice").await.unwrap());

    assert_eq!(
        groups.add_user(&group, "mallory", "bob").await.unwrap_err().to_string(),
        "Inviter is not a member of the group."
    );
    groups.add_user(&group, "alice", "bob").await.unwrap();
    assert_eq!(
        groups.add_user(&group, "alice", "bob").await.unwrap_err().to_string(),
        "New member is already in the group."
    );

    assert_eq!(
        groups.delete_group(&group).await.unwrap_err().to_string(),
        "Cannot delete a group with active members."
    );
    groups.leave_group(&group, "bob").await.unwrap();
    assert_eq!(
        groups.leave_group(&group, "alice").await.unwrap_err().to_string(),
        "Cannot leave if you are the only member and the creator."
    );
    groups.delete_group(&group).await.unwrap();
    assert!(groups.members(&group).await.unwrap().is_empty());
}

#[tokio::test]
async fn expense_splits_must_add_up() {
    let expenses = Expense::new(database().await);
    let new = NewExpense {
        group: "g1".to_string(),
        payer: "alice".to_string(),
        total_cost: Some(1000),
        splits: Some(vec![("bob".to_string(), 600), ("carol".to_string(), 300)]),
        ..Default::default()
    };
    assert_eq!(
        expenses.create_expense(new.clone()).await.unwrap_err().to_string(),
        "Sum of splits must equal totalCost"
    );

    let expense = expenses
        .create_expense(NewExpense {
            splits: Some(vec![("bob".to_string(), 600), ("carol".to_string(), 400)]),
            ..new
        })
        .await
        .unwrap();
    let splits = expenses.splits_by_expense(&expense).await.unwrap();
    assert_eq!(splits.len(), 2);

    let negative = ExpenseChanges {
        total_cost: Some(-1),
        ..Default::default()
    };
    assert_eq!(
        expenses.edit_expense(&expense, negative).await.unwrap_err().to_string(),
        "totalCost cannot be negative"
    );
}

#[tokio::test]
async fn deleting_an_expense_returns_its_splits() {
    let expenses = Expense::new(database().await);
    let expense = expenses
        .create_expense(NewExpense {
            group: "g1".to_string(),
            payer: "alice".to_string(),
            total_cost: Some(500),
            splits: Some(vec![("bob".to_string(), 500)]),
            ..Default::default()
        })
        .await
        .unwrap();

    let outcome = expenses
        .perform("deleteExpense", record! { "expenseToDelete" => expense.clone() })
        .await;
    let record = outcome.record();
    assert!(outcome.is_success());
    assert_eq!(record["payer"], "alice");
    assert_eq!(record["splits"][0]["user"], "bob");
    assert_eq!(record["splits"][0]["amountOwed"], 500);

    assert!(expenses.expense_by_id(&expense).await.unwrap().is_none());
    assert!(expenses.splits_by_expense(&expense).await.unwrap().is_empty());
}

#[tokio::test]
async fn removing_a_split_returns_it() {
    let expenses = Expense::new(database().await);
    let expense = expenses
        .create_expense(NewExpense {
            group: "g1".to_string(),
            payer: "alice".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let split = expenses.add_user_split(&expense, "bob", 300).await.unwrap();

    let outcome = expenses
        .perform(
            "removeUserSplit",
            record! { "expense" => expense.clone(), "userSplit" => split.id.clone() },
        )
        .await;
    assert!(outcome.is_success());
    assert_eq!(outcome.record()["user"], "bob");
    assert_eq!(outcome.record()["amountOwed"], 300);
    assert!(expenses.split_by_id(&split.id).await.unwrap().is_none());
}

#[tokio::test]
async fn removing_an_unknown_split_fails() {
    let expenses = Expense::new(database().await);
    let outcome = expenses
        .perform("removeUserSplit", record! { "expense" => "e1", "userSplit" => "s1" })
        .await;
    assert_eq!(outcome.error_message(), Some("UserSplit not found"));
}

#[tokio::test]
async fn debts_net_out_in_both_directions() {
    let debts = Debt::new(database().await);
    debts.update_debt("alice", "bob", 700).await.unwrap();
    debts.update_debt("bob", "alice", 200).await.unwrap();

    let (_, balance) = debts.debt("alice", "bob").await.unwrap().unwrap();
    assert_eq!(balance, 500);
    let (_, balance) = debts.debt("bob", "alice").await.unwrap().unwrap();
    assert_eq!(balance, -500);
    assert_eq!(debts.net_balance("alice").await.unwrap(), 500);

    assert_eq!(
        debts.create_debt("bob", "alice").await.unwrap_err(),
        ConceptError::ExistingKey("Debt".to_string())
    );
    debts.delete_debt("bob", "alice").await.unwrap();
    assert!(debts.debts_for("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn debt_listing_reports_the_counterparty() {
    let debts = Debt::new(database().await);
    debts.update_debt("carol", "alice", 300).await.unwrap();

    let rows = debts
        .query("_listDebtsForUser", record! { "user" => "alice" })
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["counterparty"], "carol");
    assert_eq!(rows[0]["balance"], -300);
}
