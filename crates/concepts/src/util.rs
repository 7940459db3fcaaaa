//! Internal helpers for input validation and conversion.
//!
//! These utilities are **not** part of the public API. Operation inputs
//! arrive as loosely typed records; the helpers below turn them into typed
//! values and report missing or malformed fields consistently.

use chrono::{DateTime, NaiveDate, Utc};
use engine::{Outcome, Record, Value};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::{ConceptError, ResultConcept};

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Canonical form of a username: trimmed, NFKC, lowercase.
pub(crate) fn normalize_username(value: &str) -> String {
    value.trim().nfkc().collect::<String>().to_lowercase()
}

/// Map an operation result onto its outcome record.
pub(crate) fn outcome(result: ResultConcept<Record>) -> Outcome {
    match result {
        Ok(record) => Outcome::success(record),
        Err(err) => err.into(),
    }
}

fn present<'a>(inputs: &'a Record, field: &str) -> Option<&'a Value> {
    inputs.get(field).filter(|value| !value.is_null())
}

/// Non-empty string field.
pub(crate) fn required_str(inputs: &Record, field: &str) -> ResultConcept<String> {
    optional_str(inputs, field)?.ok_or_else(|| ConceptError::MissingField(field.to_string()))
}

/// String field; absent, null and blank all read as `None`.
pub(crate) fn optional_str(inputs: &Record, field: &str) -> ResultConcept<Option<String>> {
    match present(inputs, field) {
        None => Ok(None),
        Some(Value::String(value)) => {
            let trimmed = value.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Some(_) => Err(ConceptError::WrongType {
            field: field.to_string(),
            expected: "a string",
        }),
    }
}

pub(crate) fn required_amount(inputs: &Record, field: &str) -> ResultConcept<i64> {
    optional_amount(inputs, field)?.ok_or_else(|| ConceptError::MissingField(field.to_string()))
}

/// Integer amount in minor units.
pub(crate) fn optional_amount(inputs: &Record, field: &str) -> ResultConcept<Option<i64>> {
    match present(inputs, field) {
        None => Ok(None),
        Some(value) => value.as_i64().map(Some).ok_or_else(|| ConceptError::WrongType {
            field: field.to_string(),
            expected: "an integer amount",
        }),
    }
}

/// RFC 3339 timestamp or plain `YYYY-MM-DD` date (midnight UTC).
pub(crate) fn optional_date(inputs: &Record, field: &str) -> ResultConcept<Option<DateTime<Utc>>> {
    let Some(raw) = optional_str(inputs, field)? else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| ConceptError::WrongType {
            field: field.to_string(),
            expected: "a date",
        })
}

/// One `{ user, amountOwed }` element of a split list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SplitInput {
    pub user: String,
    pub amount_owed: i64,
}

pub(crate) fn optional_splits(inputs: &Record, field: &str) -> ResultConcept<Option<Vec<SplitInput>>> {
    let wrong = || ConceptError::WrongType {
        field: field.to_string(),
        expected: "a list of { user, amountOwed }",
    };
    let Some(value) = present(inputs, field) else {
        return Ok(None);
    };
    let items = value.as_array().ok_or_else(wrong)?;

    let mut splits = Vec::with_capacity(items.len());
    for item in items {
        let split = item.as_object().ok_or_else(wrong)?;
        let user = required_str(split, "user")?;
        let amount_owed = required_amount(split, "amountOwed")?;
        if amount_owed < 0 {
            return Err(ConceptError::InvalidAmount(
                "split amountOwed cannot be negative".to_string(),
            ));
        }
        splits.push(SplitInput { user, amount_owed });
    }
    Ok(Some(splits))
}

#[cfg(test)]
mod tests {
    use engine::record;

    use super::*;

    #[test]
    fn username_is_case_and_width_insensitive() {
        assert_eq!(normalize_username("  Alice "), "alice");
        assert_eq!(normalize_username("ＢＯＢ"), "bob");
    }

    #[test]
    fn blank_strings_are_missing() {
        let inputs = record! { "name" => "   ", "count" => 3 };
        assert_eq!(
            required_str(&inputs, "name"),
            Err(ConceptError::MissingField("name".to_string()))
        );
        assert!(matches!(
            required_str(&inputs, "count"),
            Err(ConceptError::WrongType { .. })
        ));
        assert_eq!(optional_str(&inputs, "other"), Ok(None));
    }

    #[test]
    fn dates_accept_rfc3339_and_plain_days() {
        let inputs = record! { "a" => "2025-03-01T10:30:00+01:00", "b" => "2025-03-01", "c" => "soon" };
        let a = optional_date(&inputs, "a").unwrap().unwrap();
        assert_eq!(a.to_rfc3339(), "2025-03-01T09:30:00+00:00");
        let b = optional_date(&inputs, "b").unwrap().unwrap();
        assert_eq!(b.to_rfc3339(), "2025-03-01T00:00:00+00:00");
        assert!(optional_date(&inputs, "c").is_err());
    }

    #[test]
    fn splits_are_parsed_and_validated() {
        let inputs = record! {
            "splits" => serde_json::json!([{ "user": "u1", "amountOwed": 250 }]),
            "bad" => serde_json::json!([{ "user": "u1", "amountOwed": -1 }]),
        };
        assert_eq!(
            optional_splits(&inputs, "splits"),
            Ok(Some(vec![SplitInput {
                user: "u1".to_string(),
                amount_owed: 250
            }]))
        );
        assert!(matches!(
            optional_splits(&inputs, "bad"),
            Err(ConceptError::InvalidAmount(_))
        ));
    }
}
