//! Parsing and checking of JSON request bodies.
//!
//! Bodies (and sync candidates) are deserialised into typed structs and then
//! checked with their `validator` rules. Both kinds of failure come back as a
//! [`ValidationErrors`] map keyed by field name, which the server returns as
//! a 400 body.

use std::borrow::Cow;

use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;
pub use validator::{Validate, ValidationError, ValidationErrors};

/// Key used for errors that concern the whole body rather than one field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Deserialise `body` into `T` and run its validation rules.
///
/// A body that does not deserialise (wrong JSON type, missing required
/// field, unknown choice) is reported under [`NON_FIELD_ERRORS`] with the
/// deserialiser's message.
pub fn parse<T>(body: &Value) -> Result<T, ValidationErrors>
where
  T: DeserializeOwned + Validate,
{
  let parsed = T::deserialize(body)
    .map_err(|e| field_error(NON_FIELD_ERRORS, "invalid", e.to_string()))?;
  parsed.validate()?;
  Ok(parsed)
}

/// A map holding one error for `field`.
pub fn field_error(
  field: &'static str,
  code: &'static str,
  message: impl Into<Cow<'static, str>>,
) -> ValidationErrors {
  let mut errors = ValidationErrors::new();
  errors.add(field, with_message(code, message));
  errors
}

fn with_message(
  code: &'static str,
  message: impl Into<Cow<'static, str>>,
) -> ValidationError {
  let mut error = ValidationError::new(code);
  error.message = Some(message.into());
  error
}

// ─── Custom rules ────────────────────────────────────────────────────────────

pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
  if value.trim().is_empty() {
    return Err(with_message("blank", "This field may not be blank."));
  }
  Ok(())
}

// ─── Deserialisers ───────────────────────────────────────────────────────────

/// For `Option<Option<T>>` fields: absent stays `None` (with
/// `#[serde(default)]`), an explicit `null` becomes `Some(None)`.
pub(crate) fn nullable<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(d).map(Some)
}

/// For optional fields that may be omitted but not sent as `null`.
pub(crate) fn present<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  T::deserialize(d).map(Some)
}

/// A client `local_id`: a string (trimmed) or a number in decimal form.
pub fn key_text<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Key {
    Text(String),
    Number(serde_json::Number),
  }

  Ok(Option::<Key>::deserialize(d)?.map(|key| match key {
    Key::Text(text) => text.trim().to_owned(),
    Key::Number(number) => number.to_string(),
  }))
}

pub(crate) fn nullable_key<'de, D>(d: D) -> Result<Option<Option<String>>, D::Error>
where
  D: Deserializer<'de>,
{
  key_text(d).map(Some)
}
