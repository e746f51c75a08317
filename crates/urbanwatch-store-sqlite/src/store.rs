//! [`SqliteStore`]: the SQLite implementation of [`IncidentStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use urbanwatch_core::{
  identity::{Identity, IdentityChanges, NewIdentity},
  incident::{Incident, IncidentChanges, IncidentQuery, NewIncident},
  store::IncidentStore,
};

use crate::{
  encode::{
    encode_dt, encode_uuid, now, RawIdentity, RawIncident, IDENTITY_COLUMNS,
    INCIDENT_COLUMNS,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Urbanwatch record store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert a new incident row. With `skip_duplicate`, a clash on the
  /// idempotency key inserts nothing and returns `false`.
  async fn insert_incident(
    &self,
    id: Uuid,
    input: NewIncident,
    owner: Uuid,
    skip_duplicate: bool,
  ) -> Result<bool> {
    let id_str    = encode_uuid(id);
    let owner_str = encode_uuid(owner);
    let at_str    = encode_dt(now());
    let type_str  = input.incident_type.as_ref().to_owned();
    let status    = input.status.as_ref().to_owned();
    let conflict  = if skip_duplicate { "ON CONFLICT DO NOTHING" } else { "" };

    let inserted = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "INSERT INTO incidents (
             incident_id, user_id, incident_type, title, description, photo,
             latitude, longitude, address, created_at, updated_at, status,
             is_voice_description, local_id
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10, ?11, ?12, ?13)
           {conflict}"
        );
        let changed = conn.execute(&sql, rusqlite::params![
          id_str,
          owner_str,
          type_str,
          input.title,
          input.description,
          input.photo,
          input.latitude,
          input.longitude,
          input.address,
          at_str,
          status,
          input.is_voice_description,
          input.local_id,
        ])?;
        Ok(changed == 1)
      })
      .await?;

    Ok(inserted)
  }

  async fn fetch_incident(&self, id: Uuid) -> Result<Incident> {
    self.get_incident(id).await?.ok_or(Error::Vanished(id))
  }
}

// ─── IncidentStore impl ──────────────────────────────────────────────────────

impl IncidentStore for SqliteStore {
  type Error = Error;

  // ── Identities ────────────────────────────────────────────────────────────

  async fn create_identity(&self, input: NewIdentity) -> Result<Identity> {
    let identity = Identity {
      id:          Uuid::new_v4(),
      username:    input.username,
      email:       input.email,
      first_name:  input.first_name,
      last_name:   input.last_name,
      role:        input.role,
      date_joined: now(),
    };

    let id_str   = encode_uuid(identity.id);
    let at_str   = encode_dt(identity.date_joined);
    let role_str = identity.role.as_ref().to_owned();
    let username = identity.username.clone();
    let email    = identity.email.clone();
    let first    = identity.first_name.clone();
    let last     = identity.last_name.clone();
    let hash     = input.password_hash;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO users (
             user_id, username, email, first_name, last_name, role,
             password_hash, date_joined
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![id_str, username, email, first, last, role_str, hash, at_str],
        )?;
        Ok(())
      })
      .await?;

    tracing::debug!(id = %identity.id, username = %identity.username, "created identity");
    Ok(identity)
  }

  async fn get_identity(&self, id: Uuid) -> Result<Option<Identity>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawIdentity> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE user_id = ?1"),
            rusqlite::params![id_str],
            RawIdentity::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawIdentity::into_identity).transpose()
  }

  async fn get_credentials(
    &self,
    username: String,
  ) -> Result<Option<(Identity, String)>> {
    let raw: Option<(RawIdentity, String)> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {IDENTITY_COLUMNS}, password_hash FROM users WHERE username = ?1"
            ),
            rusqlite::params![username],
            |row| Ok((RawIdentity::from_row(row)?, row.get(7)?)),
          )
          .optional()?)
      })
      .await?;

    raw
      .map(|(raw, hash)| Ok((raw.into_identity()?, hash)))
      .transpose()
  }

  async fn list_identities(&self) -> Result<Vec<Identity>> {
    let raws: Vec<RawIdentity> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {IDENTITY_COLUMNS} FROM users ORDER BY date_joined, rowid"
        ))?;
        let rows = stmt
          .query_map([], RawIdentity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawIdentity::into_identity).collect()
  }

  async fn update_identity(
    &self,
    id: Uuid,
    changes: IdentityChanges,
  ) -> Result<Option<Identity>> {
    let Some(mut identity) = self.get_identity(id).await? else {
      return Ok(None);
    };
    changes.apply(&mut identity);

    let id_str   = encode_uuid(id);
    let role_str = identity.role.as_ref().to_owned();
    let username = identity.username.clone();
    let email    = identity.email.clone();
    let first    = identity.first_name.clone();
    let last     = identity.last_name.clone();
    let hash     = changes.password_hash;

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE users SET
             username = ?2, email = ?3, first_name = ?4, last_name = ?5,
             role = ?6, password_hash = COALESCE(?7, password_hash)
           WHERE user_id = ?1",
          rusqlite::params![id_str, username, email, first, last, role_str, hash],
        )?)
      })
      .await?;

    Ok((changed == 1).then_some(identity))
  }

  async fn delete_identity(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM users WHERE user_id = ?1", rusqlite::params![
          id_str
        ])?)
      })
      .await?;

    Ok(changed == 1)
  }

  // ── Incidents ─────────────────────────────────────────────────────────────

  async fn local_id_exists(&self, local_id: String) -> Result<bool> {
    let exists = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT 1 FROM incidents WHERE local_id = ?1",
            rusqlite::params![local_id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false))
      })
      .await?;

    Ok(exists)
  }

  async fn create_incident(
    &self,
    input: NewIncident,
    owner: Uuid,
  ) -> Result<Incident> {
    let id = Uuid::new_v4();
    self.insert_incident(id, input, owner, false).await?;
    self.fetch_incident(id).await
  }

  async fn insert_incident_if_absent(
    &self,
    input: NewIncident,
    owner: Uuid,
  ) -> Result<Option<Incident>> {
    let id = Uuid::new_v4();
    if !self.insert_incident(id, input, owner, true).await? {
      return Ok(None);
    }
    self.fetch_incident(id).await.map(Some)
  }

  async fn get_incident(&self, id: Uuid) -> Result<Option<Incident>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawIncident> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {INCIDENT_COLUMNS}
               FROM incidents i JOIN users u ON u.user_id = i.user_id
               WHERE i.incident_id = ?1"
            ),
            rusqlite::params![id_str],
            RawIncident::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawIncident::into_incident).transpose()
  }

  async fn list_incidents(&self, query: IncidentQuery) -> Result<Vec<Incident>> {
    let owner_str  = query.owner.map(encode_uuid);
    let status_str = query.status.map(|s| s.as_ref().to_owned());
    let type_str   = query.incident_type.map(|t| t.as_ref().to_owned());

    let raws: Vec<RawIncident> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {INCIDENT_COLUMNS}
           FROM incidents i JOIN users u ON u.user_id = i.user_id
           WHERE (?1 IS NULL OR i.user_id = ?1)
             AND (?2 IS NULL OR i.status = ?2)
             AND (?3 IS NULL OR i.incident_type = ?3)
           ORDER BY i.created_at DESC, i.rowid DESC"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![owner_str, status_str, type_str],
            RawIncident::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawIncident::into_incident).collect()
  }

  async fn update_incident(
    &self,
    id: Uuid,
    changes: IncidentChanges,
  ) -> Result<Option<Incident>> {
    let Some(mut incident) = self.get_incident(id).await? else {
      return Ok(None);
    };
    changes.apply(&mut incident);
    incident.updated_at = now();

    let id_str   = encode_uuid(id);
    let type_str = incident.incident_type.as_ref().to_owned();
    let status   = incident.status.as_ref().to_owned();
    let at_str   = encode_dt(incident.updated_at);
    let row      = incident.clone();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE incidents SET
             incident_type = ?2, title = ?3, description = ?4, photo = ?5,
             latitude = ?6, longitude = ?7, address = ?8, updated_at = ?9,
             status = ?10, is_voice_description = ?11, local_id = ?12
           WHERE incident_id = ?1",
          rusqlite::params![
            id_str,
            type_str,
            row.title,
            row.description,
            row.photo,
            row.latitude,
            row.longitude,
            row.address,
            at_str,
            status,
            row.is_voice_description,
            row.local_id,
          ],
        )?)
      })
      .await?;

    Ok((changed == 1).then_some(incident))
  }

  async fn delete_incident(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM incidents WHERE incident_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;

    Ok(changed == 1)
  }
}
