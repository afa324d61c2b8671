use std::collections::BTreeMap;

use chrono::NaiveDate;
use rocket::serde::json::Json;
use validator::{Validate, ValidationErrors};

use crate::error::AppError;

/// Runs `validator` rules on a JSON body and unwraps it.
pub trait JsonValidateExt<T> {
    fn validate_body(self) -> Result<T, AppError>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validate_body(self) -> Result<T, AppError> {
        self.validate()
            .map_err(|errors| AppError::Validation(describe(&errors)))?;
        Ok(self.into_inner())
    }
}

/// Flattens field errors into `field: message; field: message`, sorted by field.
pub fn describe(errors: &ValidationErrors) -> String {
    let mut by_field: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (field, field_errors) in errors.field_errors() {
        let messages = field_errors.iter().map(|error| {
            error
                .message
                .clone()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("invalid value ({})", error.code))
        });
        by_field
            .entry(field.to_string())
            .or_default()
            .extend(messages);
    }

    by_field
        .into_iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parses an optional `YYYY-MM-DD` query parameter.
pub fn parse_date(value: Option<&str>, field: &str) -> Result<Option<NaiveDate>, AppError> {
    value
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                AppError::Validation(format!("{} must be a date in YYYY-MM-DD format", field))
            })
        })
        .transpose()
}

/// Parses an optional non-negative numeric id from a query parameter.
pub fn parse_id(value: Option<&str>, field: &str) -> Result<Option<i64>, AppError> {
    value
        .filter(|raw| !raw.is_empty())
        .map(|raw| match raw.parse::<i64>() {
            Ok(id) if id >= 0 => Ok(id),
            _ => Err(AppError::Validation(format!(
                "{} must be a non-negative integer",
                field
            ))),
        })
        .transpose()
}
