//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings with microsecond precision, so they sort
//! lexically. Enum tags use their `strum` string forms. UUIDs are hyphenated
//! lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use urbanwatch_core::{identity::Identity, incident::Incident};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// The current time at the precision the store keeps, so values handed back
/// from a write compare equal to what a later read returns.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Tags ─────────────────────────────────────────────────────────────────────

pub fn decode_tag<T: FromStr>(column: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| Error::UnknownTag { column, value: s.to_owned() })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// The column list matching [`RawIdentity`]'s field order.
pub const IDENTITY_COLUMNS: &str =
  "user_id, username, email, first_name, last_name, role, date_joined";

/// Raw strings read directly from a `users` row.
pub struct RawIdentity {
  pub user_id:     String,
  pub username:    String,
  pub email:       String,
  pub first_name:  String,
  pub last_name:   String,
  pub role:        String,
  pub date_joined: String,
}

impl RawIdentity {
  /// Read the columns of [`IDENTITY_COLUMNS`], starting at index 0.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:     row.get(0)?,
      username:    row.get(1)?,
      email:       row.get(2)?,
      first_name:  row.get(3)?,
      last_name:   row.get(4)?,
      role:        row.get(5)?,
      date_joined: row.get(6)?,
    })
  }

  pub fn into_identity(self) -> Result<Identity> {
    Ok(Identity {
      id:          decode_uuid(&self.user_id)?,
      username:    self.username,
      email:       self.email,
      first_name:  self.first_name,
      last_name:   self.last_name,
      role:        decode_tag("role", &self.role)?,
      date_joined: decode_dt(&self.date_joined)?,
    })
  }
}

/// The select list matching [`RawIncident`]'s field order; expects
/// `incidents i JOIN users u`.
pub const INCIDENT_COLUMNS: &str = "
  i.incident_id, i.user_id, u.username, i.incident_type, i.title,
  i.description, i.photo, i.latitude, i.longitude, i.address,
  i.created_at, i.updated_at, i.status, i.is_voice_description, i.local_id";

/// Raw values read directly from an `incidents` row joined with its owner.
pub struct RawIncident {
  pub incident_id:          String,
  pub user_id:              String,
  pub username:             String,
  pub incident_type:        String,
  pub title:                String,
  pub description:          String,
  pub photo:                String,
  pub latitude:             f64,
  pub longitude:            f64,
  pub address:              Option<String>,
  pub created_at:           String,
  pub updated_at:           String,
  pub status:               String,
  pub is_voice_description: bool,
  pub local_id:             Option<String>,
}

impl RawIncident {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      incident_id:          row.get(0)?,
      user_id:              row.get(1)?,
      username:             row.get(2)?,
      incident_type:        row.get(3)?,
      title:                row.get(4)?,
      description:          row.get(5)?,
      photo:                row.get(6)?,
      latitude:             row.get(7)?,
      longitude:            row.get(8)?,
      address:              row.get(9)?,
      created_at:           row.get(10)?,
      updated_at:           row.get(11)?,
      status:               row.get(12)?,
      is_voice_description: row.get(13)?,
      local_id:             row.get(14)?,
    })
  }

  pub fn into_incident(self) -> Result<Incident> {
    Ok(Incident {
      id:                   decode_uuid(&self.incident_id)?,
      user:                 decode_uuid(&self.user_id)?,
      user_username:        self.username,
      incident_type:        decode_tag("incident_type", &self.incident_type)?,
      title:                self.title,
      description:          self.description,
      photo:                self.photo,
      latitude:             self.latitude,
      longitude:            self.longitude,
      address:              self.address,
      created_at:           decode_dt(&self.created_at)?,
      updated_at:           decode_dt(&self.updated_at)?,
      status:               decode_tag("status", &self.status)?,
      is_voice_description: self.is_voice_description,
      local_id:             self.local_id,
    })
  }
}
