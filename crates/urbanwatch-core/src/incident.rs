//! Incident records, one reported urban issue each.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;
use validator::Validate;

use crate::validate::{
  self, ValidationErrors, key_text, not_blank, nullable, nullable_key, present,
};

// ─── Tags ────────────────────────────────────────────────────────────────────

/// What kind of incident was reported.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IncidentType {
  Fire,
  Accident,
  Flood,
  Infrastructure,
  Other,
}

/// Where an incident is in its handling. Moves `new` → `in_progress` →
/// `resolved`.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IncidentStatus {
  #[default]
  New,
  InProgress,
  Resolved,
}

// ─── Incident ────────────────────────────────────────────────────────────────

/// A persisted incident, in the form returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
  pub id:                   Uuid,
  /// The reporting identity. Never changes after creation.
  pub user:                 Uuid,
  /// Username of [`Incident::user`], resolved at read time.
  pub user_username:        String,
  pub incident_type:        IncidentType,
  pub title:                String,
  pub description:          String,
  /// Reference to the uploaded photo; storage is handled elsewhere.
  pub photo:                String,
  pub latitude:             f64,
  pub longitude:            f64,
  pub address:              Option<String>,
  /// Server-assigned; never changes after creation.
  pub created_at:           DateTime<Utc>,
  pub updated_at:           DateTime<Utc>,
  pub status:               IncidentStatus,
  /// The description came from speech-to-text input.
  pub is_voice_description: bool,
  /// Client-generated idempotency key for offline sync.
  pub local_id:             Option<String>,
}

impl Incident {
  /// The idempotency key, if one was supplied and is not blank.
  pub fn idempotency_key(&self) -> Option<&str> {
    self.local_id.as_deref().filter(|k| !k.is_empty())
  }
}

// ─── NewIncident ─────────────────────────────────────────────────────────────

/// Input to [`crate::store::IncidentStore::create_incident`]. The owner,
/// `id`, and both timestamps are supplied by the store, never by clients.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct NewIncident {
  pub incident_type:        IncidentType,
  #[validate(length(max = 100), custom(function = "not_blank"))]
  pub title:                String,
  #[validate(custom(function = "not_blank"))]
  pub description:          String,
  #[validate(length(max = 100), custom(function = "not_blank"))]
  pub photo:                String,
  #[validate(range(min = -90.0, max = 90.0))]
  pub latitude:             f64,
  #[validate(range(min = -180.0, max = 180.0))]
  pub longitude:            f64,
  #[serde(default)]
  #[validate(length(max = 255))]
  pub address:              Option<String>,
  #[serde(default)]
  pub status:               IncidentStatus,
  #[serde(default)]
  pub is_voice_description: bool,
  #[serde(default, deserialize_with = "key_text")]
  #[validate(length(max = 100))]
  pub local_id:             Option<String>,
}

impl NewIncident {
  /// Parse and validate an untyped incident body.
  ///
  /// Read-only fields (`id`, `user`, `user_username`, `created_at`,
  /// `updated_at`) and unknown fields are ignored, so a client can never set
  /// the owner.
  pub fn from_json(body: &Value) -> Result<Self, ValidationErrors> {
    validate::parse(body)
  }

  /// The idempotency key, if one was supplied and is not blank.
  pub fn idempotency_key(&self) -> Option<&str> {
    self.local_id.as_deref().filter(|k| !k.is_empty())
  }
}

// ─── IncidentChanges ─────────────────────────────────────────────────────────

/// Field changes for [`crate::store::IncidentStore::update_incident`].
///
/// `None` leaves a field untouched; for the nullable fields `Some(None)`
/// clears the value. Ownership cannot be changed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Validate)]
pub struct IncidentChanges {
  #[serde(default, deserialize_with = "present")]
  pub incident_type:        Option<IncidentType>,
  #[serde(default, deserialize_with = "present")]
  #[validate(length(max = 100), custom(function = "not_blank"))]
  pub title:                Option<String>,
  #[serde(default, deserialize_with = "present")]
  #[validate(custom(function = "not_blank"))]
  pub description:          Option<String>,
  #[serde(default, deserialize_with = "present")]
  #[validate(length(max = 100), custom(function = "not_blank"))]
  pub photo:                Option<String>,
  #[serde(default, deserialize_with = "present")]
  #[validate(range(min = -90.0, max = 90.0))]
  pub latitude:             Option<f64>,
  #[serde(default, deserialize_with = "present")]
  #[validate(range(min = -180.0, max = 180.0))]
  pub longitude:            Option<f64>,
  #[serde(default, deserialize_with = "nullable")]
  #[validate(length(max = 255))]
  pub address:              Option<Option<String>>,
  #[serde(default, deserialize_with = "present")]
  pub status:               Option<IncidentStatus>,
  #[serde(default, deserialize_with = "present")]
  pub is_voice_description: Option<bool>,
  #[serde(default, deserialize_with = "nullable_key")]
  #[validate(length(max = 100))]
  pub local_id:             Option<Option<String>>,
}

impl IncidentChanges {
  /// Parse a partial (PATCH) body. Only the fields present are checked.
  pub fn from_json(body: &Value) -> Result<Self, ValidationErrors> {
    validate::parse(body)
  }

  /// Parse a full (PUT) body. Every required field must be present and
  /// valid, but optional fields the body omits are left untouched rather
  /// than reset, so a replacement never clears `local_id` or rewinds
  /// `status` by accident.
  pub fn replacement(body: &Value) -> Result<Self, ValidationErrors> {
    NewIncident::from_json(body)?;
    Self::from_json(body)
  }

  /// Apply every set field to `incident`. Timestamps are the caller's job.
  pub fn apply(self, incident: &mut Incident) {
    if let Some(v) = self.incident_type {
      incident.incident_type = v;
    }
    if let Some(v) = self.title {
      incident.title = v;
    }
    if let Some(v) = self.description {
      incident.description = v;
    }
    if let Some(v) = self.photo {
      incident.photo = v;
    }
    if let Some(v) = self.latitude {
      incident.latitude = v;
    }
    if let Some(v) = self.longitude {
      incident.longitude = v;
    }
    if let Some(v) = self.address {
      incident.address = v;
    }
    if let Some(v) = self.status {
      incident.status = v;
    }
    if let Some(v) = self.is_voice_description {
      incident.is_voice_description = v;
    }
    if let Some(v) = self.local_id {
      incident.local_id = v;
    }
  }

  /// The non-blank idempotency key this change would set, if any.
  pub fn new_idempotency_key(&self) -> Option<&str> {
    self
      .local_id
      .as_ref()
      .and_then(Option::as_deref)
      .filter(|k| !k.is_empty())
  }
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// Parameters for [`crate::store::IncidentStore::list_incidents`].
#[derive(Debug, Clone, Default)]
pub struct IncidentQuery {
  /// Restrict to incidents reported by this identity. `None` lists all.
  pub owner:         Option<Uuid>,
  pub status:        Option<IncidentStatus>,
  pub incident_type: Option<IncidentType>,
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn body() -> Value {
    json!({
      "incident_type": "flood",
      "title": "Flooded underpass",
      "description": "Water up to the wheel arches",
      "photo": "incidents/underpass.jpg",
      "latitude": 5.3599,
      "longitude": -4.0083,
    })
  }

  fn incident_from(input: NewIncident) -> Incident {
    let now = Utc::now();
    Incident {
      id: Uuid::new_v4(),
      user: Uuid::new_v4(),
      user_username: "ana".into(),
      incident_type: input.incident_type,
      title: input.title,
      description: input.description,
      photo: input.photo,
      latitude: input.latitude,
      longitude: input.longitude,
      address: input.address,
      created_at: now,
      updated_at: now,
      status: input.status,
      is_voice_description: input.is_voice_description,
      local_id: input.local_id,
    }
  }

  #[test]
  fn minimal_body_gets_defaults() {
    let input = NewIncident::from_json(&body()).unwrap();
    assert_eq!(input.incident_type, IncidentType::Flood);
    assert_eq!(input.status, IncidentStatus::New);
    assert!(!input.is_voice_description);
    assert_eq!(input.address, None);
    assert_eq!(input.idempotency_key(), None);
  }

  #[test]
  fn missing_required_field_is_rejected() {
    for field in ["incident_type", "title", "description", "photo", "latitude", "longitude"] {
      let mut b = body();
      b.as_object_mut().unwrap().remove(field);
      let err = NewIncident::from_json(&b).unwrap_err();
      let message = err.field_errors()[validate::NON_FIELD_ERRORS][0]
        .message
        .clone()
        .unwrap();
      assert!(message.contains(field), "{field}: {message}");
    }
  }

  #[test]
  fn out_of_range_coordinates_are_rejected() {
    let mut b = body();
    b["latitude"] = json!(91.0);
    b["longitude"] = json!(-180.5);
    let err = NewIncident::from_json(&b).unwrap_err();
    let fields = err.field_errors();
    assert_eq!(fields["latitude"][0].code, "range");
    assert_eq!(fields["longitude"][0].code, "range");
  }

  #[test]
  fn blank_and_overlong_text_is_rejected() {
    let mut b = body();
    b["title"] = json!("  ");
    b["photo"] = json!("p".repeat(101));
    let err = NewIncident::from_json(&b).unwrap_err();
    let fields = err.field_errors();
    assert_eq!(fields["title"][0].code, "blank");
    assert_eq!(fields["photo"][0].code, "length");
  }

  #[test]
  fn client_supplied_owner_and_timestamps_are_ignored() {
    let mut b = body();
    b["user"] = json!("00000000-0000-0000-0000-000000000000");
    b["created_at"] = json!("1999-01-01T00:00:00Z");
    b["id"] = json!(42);
    assert!(NewIncident::from_json(&b).is_ok());
  }

  #[test]
  fn bad_choices_are_rejected() {
    let mut b = body();
    b["incident_type"] = json!("earthquake");
    let err = NewIncident::from_json(&b).unwrap_err();
    let message = err.field_errors()[validate::NON_FIELD_ERRORS][0]
      .message
      .clone()
      .unwrap();
    assert!(message.contains("earthquake"));

    let mut b = body();
    b["status"] = json!("closed");
    assert!(NewIncident::from_json(&b).is_err());
  }

  #[test]
  fn explicit_status_and_voice_flag_are_kept() {
    let mut b = body();
    b["status"] = json!("in_progress");
    b["is_voice_description"] = json!(true);
    b["local_id"] = json!("dev-1:17");
    b["address"] = json!("Boulevard de Marseille");
    let input = NewIncident::from_json(&b).unwrap();
    assert_eq!(input.status, IncidentStatus::InProgress);
    assert!(input.is_voice_description);
    assert_eq!(input.idempotency_key(), Some("dev-1:17"));
    assert_eq!(input.address.as_deref(), Some("Boulevard de Marseille"));
  }

  #[test]
  fn blank_local_id_is_not_a_key() {
    let mut b = body();
    b["local_id"] = json!("");
    let input = NewIncident::from_json(&b).unwrap();
    assert_eq!(input.local_id.as_deref(), Some(""));
    assert_eq!(input.idempotency_key(), None);

    b["local_id"] = json!(" 42 ");
    assert_eq!(NewIncident::from_json(&b).unwrap().idempotency_key(), Some("42"));
  }

  #[test]
  fn partial_changes_validate_only_present_fields() {
    let changes =
      IncidentChanges::from_json(&json!({ "status": "resolved", "address": null }))
        .unwrap();
    assert_eq!(changes.status, Some(IncidentStatus::Resolved));
    assert_eq!(changes.address, Some(None));
    assert_eq!(changes.title, None);

    let err = IncidentChanges::from_json(&json!({ "title": "" })).unwrap_err();
    assert!(err.field_errors().contains_key("title"));

    assert!(IncidentChanges::from_json(&json!({ "title": null })).is_err());
  }

  #[test]
  fn replacement_requires_every_required_field() {
    let mut b = body();
    b.as_object_mut().unwrap().remove("photo");
    assert!(IncidentChanges::replacement(&b).is_err());
  }

  #[test]
  fn replacement_keeps_omitted_optionals() {
    let mut original = body();
    original["local_id"] = json!("off-1");
    original["address"] = json!("Rue 12");
    original["status"] = json!("resolved");
    original["is_voice_description"] = json!(true);
    let mut incident = incident_from(NewIncident::from_json(&original).unwrap());

    let mut replacement = body();
    replacement["title"] = json!("Underpass drained");
    let changes = IncidentChanges::replacement(&replacement).unwrap();
    assert_eq!(changes.status, None);
    assert_eq!(changes.local_id, None);
    changes.apply(&mut incident);

    assert_eq!(incident.title, "Underpass drained");
    assert_eq!(incident.status, IncidentStatus::Resolved);
    assert_eq!(incident.local_id.as_deref(), Some("off-1"));
    assert_eq!(incident.address.as_deref(), Some("Rue 12"));
    assert!(incident.is_voice_description);
  }

  #[test]
  fn apply_keeps_untouched_fields() {
    let mut incident = incident_from(NewIncident::from_json(&body()).unwrap());
    incident.address = Some("old".into());
    let owner = incident.user;

    IncidentChanges {
      status: Some(IncidentStatus::Resolved),
      address: Some(None),
      ..Default::default()
    }
    .apply(&mut incident);

    assert_eq!(incident.status, IncidentStatus::Resolved);
    assert_eq!(incident.address, None);
    assert_eq!(incident.title, "Flooded underpass");
    assert_eq!(incident.user, owner);
  }

  #[test]
  fn type_and_status_tags() {
    assert_eq!(IncidentStatus::InProgress.as_ref(), "in_progress");
    assert_eq!(
      "infrastructure".parse::<IncidentType>().unwrap(),
      IncidentType::Infrastructure
    );
    assert_eq!(
      serde_json::to_value(IncidentStatus::InProgress).unwrap(),
      json!("in_progress")
    );
  }
}
