//! Identities: the principals that report and manage incidents.
//!
//! Credentials are opaque to this crate: the store keeps an argon2 PHC string
//! next to each identity, but [`Identity`] itself never carries it, so it can
//! be serialised straight into responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;
use validator::{Validate, ValidateEmail, ValidationError};

use crate::validate::{self, ValidationErrors, present};

const NAME_MAX: usize = 150;

// ─── Role ────────────────────────────────────────────────────────────────────

/// What an identity is allowed to do. Exactly one per identity.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  #[default]
  Citizen,
  #[serde(rename = "admin", alias = "administrator")]
  #[strum(to_string = "admin", serialize = "administrator")]
  Administrator,
}

impl Role {
  /// The role requested at creation. Unset or unrecognised tags fall back to
  /// [`Role::Citizen`] instead of failing.
  pub fn from_tag_lossy(tag: Option<&Value>) -> Self {
    tag
      .and_then(Value::as_str)
      .and_then(|t| t.trim().parse().ok())
      .unwrap_or_default()
  }
}

// ─── Identity ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
  pub id:          Uuid,
  pub username:    String,
  pub email:       String,
  pub first_name:  String,
  pub last_name:   String,
  pub role:        Role,
  pub date_joined: DateTime<Utc>,
}

/// Input to [`crate::store::IncidentStore::create_identity`]. `id` and
/// `date_joined` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewIdentity {
  pub username:      String,
  pub email:         String,
  pub first_name:    String,
  pub last_name:     String,
  pub role:          Role,
  /// argon2 PHC string, never the plaintext password.
  pub password_hash: String,
}

/// Field changes for [`crate::store::IncidentStore::update_identity`]. `None`
/// leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct IdentityChanges {
  pub username:      Option<String>,
  pub email:         Option<String>,
  pub first_name:    Option<String>,
  pub last_name:     Option<String>,
  pub role:          Option<Role>,
  pub password_hash: Option<String>,
}

impl IdentityChanges {
  /// Apply the non-credential fields to `identity`.
  pub fn apply(&self, identity: &mut Identity) {
    if let Some(username) = &self.username {
      identity.username.clone_from(username);
    }
    if let Some(email) = &self.email {
      identity.email.clone_from(email);
    }
    if let Some(first_name) = &self.first_name {
      identity.first_name.clone_from(first_name);
    }
    if let Some(last_name) = &self.last_name {
      identity.last_name.clone_from(last_name);
    }
    if let Some(role) = self.role {
      identity.role = role;
    }
  }
}

// ─── Request validation ──────────────────────────────────────────────────────

/// A self-registration request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Registration {
  #[validate(custom(function = "valid_username"))]
  pub username:   String,
  #[serde(default)]
  #[validate(custom(function = "valid_email"))]
  pub email:      String,
  #[serde(default)]
  #[validate(length(max = 150))]
  pub first_name: Option<String>,
  #[serde(default)]
  #[validate(length(max = 150))]
  pub last_name:  Option<String>,
  /// The role asked for. Whether it is honoured is the caller's decision.
  #[serde(default, deserialize_with = "lossy_role")]
  pub role:       Role,
  pub password:   String,
}

impl Registration {
  pub fn from_json(body: &Value) -> Result<Self, ValidationErrors> {
    validate::parse(body)
  }

  pub fn into_new_identity(self, password_hash: String) -> NewIdentity {
    NewIdentity {
      username: self.username,
      email: self.email,
      first_name: self.first_name.unwrap_or_default(),
      last_name: self.last_name.unwrap_or_default(),
      role: self.role,
      password_hash,
    }
  }
}

/// An administrative update. Unlike registration, an unknown role here is
/// an error rather than a silent downgrade.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct IdentityUpdate {
  #[serde(default, deserialize_with = "present")]
  #[validate(custom(function = "valid_username"))]
  pub username:   Option<String>,
  #[serde(default)]
  #[validate(custom(function = "valid_email"))]
  pub email:      Option<String>,
  #[serde(default)]
  #[validate(length(max = 150))]
  pub first_name: Option<String>,
  #[serde(default)]
  #[validate(length(max = 150))]
  pub last_name:  Option<String>,
  #[serde(default, deserialize_with = "present")]
  pub role:       Option<Role>,
  #[serde(default, deserialize_with = "present")]
  pub password:   Option<String>,
}

impl IdentityUpdate {
  /// Parse a partial (PATCH) body. Nothing is required.
  pub fn from_json(body: &Value) -> Result<Self, ValidationErrors> {
    validate::parse(body)
  }

  /// Parse a full (PUT) body, which must carry `username` and `password`.
  pub fn replacement(body: &Value) -> Result<Self, ValidationErrors> {
    let update = Self::from_json(body)?;

    let mut errors = ValidationErrors::new();
    if update.username.is_none() {
      errors.add("username", required());
    }
    if update.password.is_none() {
      errors.add("password", required());
    }
    if !errors.errors().is_empty() {
      return Err(errors);
    }
    Ok(update)
  }

  pub fn into_changes(self, password_hash: Option<String>) -> IdentityChanges {
    IdentityChanges {
      username: self.username,
      email: self.email,
      first_name: self.first_name,
      last_name: self.last_name,
      role: self.role,
      password_hash,
    }
  }
}

fn required() -> ValidationError {
  let mut error = ValidationError::new("required");
  error.message = Some("This field is required.".into());
  error
}

fn lossy_role<'de, D>(d: D) -> Result<Role, D::Error>
where
  D: Deserializer<'de>,
{
  Value::deserialize(d).map(|tag| Role::from_tag_lossy(Some(&tag)))
}

fn valid_username(username: &str) -> Result<(), ValidationError> {
  let valid = !username.is_empty()
    && username.chars().count() <= NAME_MAX
    && username
      .chars()
      .all(|c| c.is_alphanumeric() || "@.+-_".contains(c));
  if !valid {
    let mut error = ValidationError::new("username");
    error.message = Some(
      "Enter a valid username. This value may contain only letters, numbers, \
       and @/./+/-/_ characters."
        .into(),
    );
    return Err(error);
  }
  Ok(())
}

/// Blank is allowed; anything else must look like an address.
fn valid_email(email: &str) -> Result<(), ValidationError> {
  if email.is_empty() || email.validate_email() {
    return Ok(());
  }
  let mut error = ValidationError::new("email");
  error.message = Some("Enter a valid email address.".into());
  Err(error)
}
