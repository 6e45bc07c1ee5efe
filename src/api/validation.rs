//! Request body binding and field validation.

use axum::{
    extract::{FromRequest, Request},
    Json,
};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;

use super::error::{ApiError, FieldViolation};

/// Implemented by request bodies that carry field rules.
pub trait Validate {
    /// # Errors
    /// Returns `ApiError::Validation` listing every offending field.
    fn validate(&self) -> Result<(), ApiError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rule {
    Required,
    Email,
    Alphanum,
    Min(i64),
    Max(i64),
    Gte(i64),
}

impl Rule {
    fn message(self, field: &str) -> String {
        match self {
            Self::Required => format!("the {field} field is required"),
            Self::Email => format!("the {field} field is invalid"),
            Self::Alphanum => format!("the {field} field must be of type alphanumeric"),
            Self::Min(param) => format!("the {field} field must have a minimum value of {param}"),
            Self::Max(param) => format!("the {field} field must have a maximum value of {param}"),
            Self::Gte(_) => format!("the {field} field value must be greater or equal to one"),
        }
    }

    fn accepts_text(self, value: &str) -> bool {
        let length = i64::try_from(value.chars().count()).unwrap_or(i64::MAX);
        match self {
            Self::Required => !value.is_empty(),
            Self::Email => valid_email(value),
            Self::Alphanum => valid_alphanum(value),
            Self::Min(param) | Self::Gte(param) => length >= param,
            Self::Max(param) => length <= param,
        }
    }

    const fn accepts_number(self, value: i64) -> bool {
        match self {
            Self::Required => value != 0,
            Self::Min(param) | Self::Gte(param) => value >= param,
            Self::Max(param) => value <= param,
            Self::Email | Self::Alphanum => false,
        }
    }
}

static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());
static ALPHANUM: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+$").ok());

pub fn valid_email(email: &str) -> bool {
    EMAIL.as_ref().is_some_and(|re| re.is_match(email))
}

pub fn valid_alphanum(value: &str) -> bool {
    ALPHANUM.as_ref().is_some_and(|re| re.is_match(value))
}

/// Collects the first failing rule of each field, in call order.
#[derive(Debug, Default)]
pub struct Validator {
    violations: Vec<FieldViolation>,
}

impl Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&mut self, field: &str, value: &str, rules: &[Rule]) -> &mut Self {
        if let Some(rule) = rules.iter().find(|rule| !rule.accepts_text(value)) {
            self.violations
                .push(FieldViolation::new(field, rule.message(field)));
        }
        self
    }

    /// Absent values are skipped; present ones must pass every rule.
    pub fn optional_text(&mut self, field: &str, value: Option<&str>, rules: &[Rule]) -> &mut Self {
        match value {
            Some(value) => self.text(field, value, rules),
            None => self,
        }
    }

    pub fn number(&mut self, field: &str, value: i64, rules: &[Rule]) -> &mut Self {
        if let Some(rule) = rules.iter().find(|rule| !rule.accepts_number(value)) {
            self.violations
                .push(FieldViolation::new(field, rule.message(field)));
        }
        self
    }

    pub fn reject(&mut self, field: &str, msg: impl Into<String>) -> &mut Self {
        self.violations.push(FieldViolation::new(field, msg));
        self
    }

    /// # Errors
    /// Returns `ApiError::Validation` when any field failed.
    pub fn finish(&mut self) -> Result<(), ApiError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(std::mem::take(&mut self.violations)))
        }
    }
}

/// JSON body extractor that runs [`Validate`] before the handler sees it.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}
