//! Offline sync: reconcile a batch of client-side incidents with the store.
//!
//! Clients that were offline submit everything they captured in one batch,
//! each record tagged with a client-generated `local_id`. Records whose key
//! the store already knows are skipped, invalid records are dropped, and the
//! rest are persisted as owned by the caller. Candidates are processed one at
//! a time in input order, so a key repeated within one batch is created once.
//!
//! A candidate is invalid when it fails [`NewIncident`]'s rules, which
//! include the coordinate ranges: a latitude outside -90..=90 or a longitude
//! outside -180..=180 drops the record like any other invalid field.
//!
//! There is no transaction around the batch: a store failure part way through
//! leaves earlier records committed.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
  Error, Result,
  identity::Identity,
  incident::{Incident, NewIncident},
  store::IncidentStore,
  validate::{ValidationErrors, key_text},
};

// ─── Report ──────────────────────────────────────────────────────────────────

/// The outcome of one sync batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
  /// Records persisted by this batch, in input order.
  pub created:    Vec<Incident>,
  /// Candidates skipped because their key was already known.
  pub duplicates: Vec<Duplicate>,
  /// Candidates dropped because they failed validation.
  pub rejected:   Vec<Rejection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Duplicate {
  /// Position of the candidate in the submitted batch.
  pub index:    usize,
  pub local_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
  pub index:    usize,
  pub local_id: Option<String>,
  pub errors:   ValidationErrors,
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// The idempotency key carried by a raw candidate: its `local_id`, trimmed,
/// with numbers taken in decimal form. Blank keys count as absent.
pub fn idempotency_key(candidate: &Value) -> Option<String> {
  candidate
    .get("local_id")
    .and_then(|key| key_text(key).ok().flatten())
    .filter(|key| !key.is_empty())
}

/// Reconcile `payload` against `store` on behalf of `owner`.
///
/// Fails with [`Error::InvalidBatchShape`] before any store access unless
/// `payload` is a JSON array. Store failures abort the batch with
/// [`Error::Store`]; validation failures only drop the offending candidate.
pub async fn reconcile<S>(
  store: &S,
  owner: &Identity,
  payload: Value,
) -> Result<SyncReport>
where
  S: IncidentStore,
{
  let Value::Array(candidates) = payload else {
    return Err(Error::InvalidBatchShape);
  };

  let mut report = SyncReport::default();

  for (index, candidate) in candidates.iter().enumerate() {
    let key = idempotency_key(candidate);

    if let Some(key) = &key
      && store
        .local_id_exists(key.clone())
        .await
        .map_err(Error::store)?
    {
      debug!(index, local_id = %key, "skipping known incident");
      report.duplicates.push(Duplicate { index, local_id: key.clone() });
      continue;
    }

    let input = match NewIncident::from_json(candidate) {
      Ok(input) => input,
      Err(errors) => {
        debug!(index, %errors, "dropping invalid incident");
        report.rejected.push(Rejection { index, local_id: key, errors });
        continue;
      }
    };

    // The existence check above is advisory; the store makes the final call
    // so two concurrent batches cannot both create the same key.
    match store
      .insert_incident_if_absent(input, owner.id)
      .await
      .map_err(Error::store)?
    {
      Some(incident) => report.created.push(incident),
      None => {
        let local_id = key.unwrap_or_default();
        debug!(index, %local_id, "incident created concurrently; skipping");
        report.duplicates.push(Duplicate { index, local_id });
      }
    }
  }

  info!(
    owner = %owner.username,
    submitted = candidates.len(),
    created = report.created.len(),
    duplicates = report.duplicates.len(),
    rejected = report.rejected.len(),
    "sync batch reconciled"
  );

  Ok(report)
}

#[cfg(test)]
mod tests {
  use std::{
    convert::Infallible,
    io,
    sync::{
      Mutex,
      atomic::{AtomicUsize, Ordering},
    },
  };

  use chrono::Utc;
  use serde_json::json;
  use uuid::Uuid;

  use super::*;
  use crate::{
    identity::{IdentityChanges, NewIdentity, Role},
    incident::{IncidentChanges, IncidentQuery, IncidentStatus, IncidentType},
    store::StoreError,
  };

  /// Incidents in a `Vec`, counting writes. With `blind`, `local_id_exists`
  /// always answers `false`, as a concurrent writer racing the check would
  /// look.
  #[derive(Default)]
  struct MemoryStore {
    incidents: Mutex<Vec<Incident>>,
    writes:    AtomicUsize,
    blind:     bool,
  }

  impl MemoryStore {
    fn with_incident(local_id: &str) -> Self {
      let store = Self::default();
      store.incidents.lock().unwrap().push(incident(local_id));
      store
    }

    fn keys(&self) -> Vec<Option<String>> {
      self
        .incidents
        .lock()
        .unwrap()
        .iter()
        .map(|i| i.local_id.clone())
        .collect()
    }
  }

  fn incident(local_id: &str) -> Incident {
    let now = Utc::now();
    Incident {
      id: Uuid::new_v4(),
      user: Uuid::new_v4(),
      user_username: "earlier".into(),
      incident_type: IncidentType::Other,
      title: "existing".into(),
      description: "existing".into(),
      photo: "x.jpg".into(),
      latitude: 0.0,
      longitude: 0.0,
      address: None,
      created_at: now,
      updated_at: now,
      status: IncidentStatus::New,
      is_voice_description: false,
      local_id: Some(local_id.into()),
    }
  }

  impl IncidentStore for MemoryStore {
    type Error = Infallible;

    async fn create_identity(&self, _: NewIdentity) -> Result<Identity, Infallible> { unimplemented!() }
    async fn get_identity(&self, _: Uuid) -> Result<Option<Identity>, Infallible> { unimplemented!() }
    async fn get_credentials(&self, _: String) -> Result<Option<(Identity, String)>, Infallible> { unimplemented!() }
    async fn list_identities(&self) -> Result<Vec<Identity>, Infallible> { unimplemented!() }
    async fn update_identity(&self, _: Uuid, _: IdentityChanges) -> Result<Option<Identity>, Infallible> { unimplemented!() }
    async fn delete_identity(&self, _: Uuid) -> Result<bool, Infallible> { unimplemented!() }

    async fn local_id_exists(&self, local_id: String) -> Result<bool, Infallible> {
      if self.blind {
        return Ok(false);
      }
      Ok(
        self
          .incidents
          .lock()
          .unwrap()
          .iter()
          .any(|i| i.idempotency_key() == Some(local_id.as_str())),
      )
    }

    async fn create_incident(&self, input: NewIncident, owner: Uuid) -> Result<Incident, Infallible> {
      let now = Utc::now();
      let incident = Incident {
        id: Uuid::new_v4(),
        user: owner,
        user_username: "caller".into(),
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
      };
      self.writes.fetch_add(1, Ordering::SeqCst);
      self.incidents.lock().unwrap().push(incident.clone());
      Ok(incident)
    }

    async fn insert_incident_if_absent(&self, input: NewIncident, owner: Uuid) -> Result<Option<Incident>, Infallible> {
      if let Some(key) = input.idempotency_key() {
        let taken = self
          .incidents
          .lock()
          .unwrap()
          .iter()
          .any(|i| i.idempotency_key() == Some(key));
        if taken {
          return Ok(None);
        }
      }
      self.create_incident(input, owner).await.map(Some)
    }

    async fn get_incident(&self, _: Uuid) -> Result<Option<Incident>, Infallible> { unimplemented!() }
    async fn list_incidents(&self, _: IncidentQuery) -> Result<Vec<Incident>, Infallible> { unimplemented!() }
    async fn update_incident(&self, _: Uuid, _: IncidentChanges) -> Result<Option<Incident>, Infallible> { unimplemented!() }
    async fn delete_incident(&self, _: Uuid) -> Result<bool, Infallible> { unimplemented!() }
  }

  /// Delegates to a [`MemoryStore`] but fails the `fail_on`-th insert
  /// (1-based), as a full disk or dropped connection would.
  struct FailingStore {
    inner:   MemoryStore,
    inserts: AtomicUsize,
    fail_on: usize,
  }

  impl StoreError for io::Error {}

  impl IncidentStore for FailingStore {
    type Error = io::Error;

    async fn create_identity(&self, _: NewIdentity) -> Result<Identity, io::Error> { unimplemented!() }
    async fn get_identity(&self, _: Uuid) -> Result<Option<Identity>, io::Error> { unimplemented!() }
    async fn get_credentials(&self, _: String) -> Result<Option<(Identity, String)>, io::Error> { unimplemented!() }
    async fn list_identities(&self) -> Result<Vec<Identity>, io::Error> { unimplemented!() }
    async fn update_identity(&self, _: Uuid, _: IdentityChanges) -> Result<Option<Identity>, io::Error> { unimplemented!() }
    async fn delete_identity(&self, _: Uuid) -> Result<bool, io::Error> { unimplemented!() }

    async fn local_id_exists(&self, local_id: String) -> Result<bool, io::Error> {
      Ok(self.inner.local_id_exists(local_id).await.unwrap())
    }

    async fn create_incident(&self, input: NewIncident, owner: Uuid) -> Result<Incident, io::Error> {
      Ok(self.inner.create_incident(input, owner).await.unwrap())
    }

    async fn insert_incident_if_absent(&self, input: NewIncident, owner: Uuid) -> Result<Option<Incident>, io::Error> {
      if self.inserts.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
        return Err(io::Error::other("disk I/O error"));
      }
      Ok(self.inner.insert_incident_if_absent(input, owner).await.unwrap())
    }

    async fn get_incident(&self, _: Uuid) -> Result<Option<Incident>, io::Error> { unimplemented!() }
    async fn list_incidents(&self, _: IncidentQuery) -> Result<Vec<Incident>, io::Error> { unimplemented!() }
    async fn update_incident(&self, _: Uuid, _: IncidentChanges) -> Result<Option<Incident>, io::Error> { unimplemented!() }
    async fn delete_incident(&self, _: Uuid) -> Result<bool, io::Error> { unimplemented!() }
  }

  fn caller() -> Identity {
    Identity {
      id: Uuid::new_v4(),
      username: "caller".into(),
      email: String::new(),
      first_name: String::new(),
      last_name: String::new(),
      role: Role::Citizen,
      date_joined: Utc::now(),
    }
  }

  fn candidate(local_id: Option<&str>, title: &str) -> Value {
    let mut c = json!({
      "incident_type": "fire",
      "title": title,
      "description": "Smoke from a storm drain",
      "photo": "incidents/drain.jpg",
      "latitude": 5.31,
      "longitude": -4.02,
    });
    if let Some(local_id) = local_id {
      c["local_id"] = json!(local_id);
    }
    c
  }

  #[test]
  fn key_extraction() {
    assert_eq!(idempotency_key(&json!({ "local_id": " a1 " })), Some("a1".into()));
    assert_eq!(idempotency_key(&json!({ "local_id": 17 })), Some("17".into()));
    assert_eq!(idempotency_key(&json!({ "local_id": "" })), None);
    assert_eq!(idempotency_key(&json!({ "local_id": null })), None);
    assert_eq!(idempotency_key(&json!({})), None);
    assert_eq!(idempotency_key(&json!("a1")), None);
  }

  #[tokio::test]
  async fn non_array_payload_is_rejected_without_writes() {
    let store = MemoryStore::default();
    let err = reconcile(&store, &caller(), json!({ "local_id": "a" }))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::InvalidBatchShape));
    assert_eq!(err.to_string(), "Expected a list of incidents");
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn empty_batch_creates_nothing() {
    let store = MemoryStore::default();
    let report = reconcile(&store, &caller(), json!([])).await.unwrap();
    assert!(report.created.is_empty());
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn known_key_is_skipped() {
    let store = MemoryStore::with_incident("a");
    let batch = json!([candidate(Some("a"), "again"), candidate(Some("b"), "new")]);

    let report = reconcile(&store, &caller(), batch).await.unwrap();

    assert_eq!(report.created.len(), 1);
    assert_eq!(report.created[0].local_id.as_deref(), Some("b"));
    assert_eq!(report.duplicates, [Duplicate { index: 0, local_id: "a".into() }]);
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn repeated_key_in_one_batch_is_created_once() {
    let store = MemoryStore::default();
    let batch = json!([
      candidate(Some("a"), "T1"),
      candidate(Some("a"), "different fields"),
      { "incident_type": "flood", "title": "no key", "description": "d",
        "photo": "p.jpg", "latitude": 1.0, "longitude": 2.0 },
    ]);

    let report = reconcile(&store, &caller(), batch).await.unwrap();

    let titles: Vec<_> = report.created.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, ["T1", "no key"]);
    assert_eq!(report.duplicates.len(), 1);
    assert_eq!(report.duplicates[0].index, 1);
  }

  #[tokio::test]
  async fn keyless_candidates_are_never_deduplicated() {
    let store = MemoryStore::default();
    let same = candidate(None, "same");
    let batch = json!([same.clone(), same.clone(), same]);

    let report = reconcile(&store, &caller(), batch).await.unwrap();

    assert_eq!(report.created.len(), 3);
    assert_eq!(store.writes.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn invalid_candidates_are_dropped_and_reported() {
    let store = MemoryStore::default();
    let mut missing_latitude = candidate(Some("m"), "no lat");
    missing_latitude.as_object_mut().unwrap().remove("latitude");
    let batch = json!([missing_latitude, "not an object", candidate(None, "ok")]);

    let report = reconcile(&store, &caller(), batch).await.unwrap();

    assert_eq!(report.created.len(), 1);
    assert_eq!(report.created[0].title, "ok");
    assert_eq!(report.rejected.len(), 2);
    assert_eq!(report.rejected[0].index, 0);
    assert_eq!(report.rejected[0].local_id.as_deref(), Some("m"));
    let message = report.rejected[0].errors.field_errors()["non_field_errors"][0]
      .message
      .clone()
      .unwrap();
    assert!(message.contains("latitude"));
    assert_eq!(report.rejected[1].index, 1);
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn owner_is_forced_to_caller() {
    let store = MemoryStore::default();
    let me = caller();
    let mut c = candidate(Some("spoof"), "spoofed");
    c["user"] = json!(Uuid::new_v4());
    c["owner"] = json!(Uuid::new_v4());

    let report = reconcile(&store, &me, json!([c])).await.unwrap();

    assert_eq!(report.created[0].user, me.id);
  }

  #[tokio::test]
  async fn resubmitting_a_batch_creates_nothing_new() {
    let store = MemoryStore::default();
    let batch = json!([candidate(Some("x"), "one"), candidate(Some("y"), "two")]);

    let first = reconcile(&store, &caller(), batch.clone()).await.unwrap();
    let second = reconcile(&store, &caller(), batch).await.unwrap();

    assert_eq!(first.created.len(), 2);
    assert!(second.created.is_empty());
    assert_eq!(second.duplicates.len(), 2);
    assert_eq!(store.keys().len(), 2);
  }

  #[tokio::test]
  async fn lost_race_is_a_duplicate_not_a_second_record() {
    let store = MemoryStore { blind: true, ..MemoryStore::with_incident("raced") };

    let report = reconcile(&store, &caller(), json!([candidate(Some("raced"), "late")]))
      .await
      .unwrap();

    assert!(report.created.is_empty());
    assert_eq!(report.duplicates, [Duplicate { index: 0, local_id: "raced".into() }]);
    assert_eq!(store.keys(), [Some("raced".to_owned())]);
  }

  #[tokio::test]
  async fn status_defaults_to_new_unless_given() {
    let store = MemoryStore::default();
    let mut resolved = candidate(None, "resolved already");
    resolved["status"] = json!("resolved");

    let report = reconcile(&store, &caller(), json!([candidate(None, "fresh"), resolved]))
      .await
      .unwrap();

    assert_eq!(report.created[0].status, IncidentStatus::New);
    assert_eq!(report.created[1].status, IncidentStatus::Resolved);
  }

  #[tokio::test]
  async fn out_of_range_coordinates_are_dropped() {
    let store = MemoryStore::default();
    let mut north = candidate(Some("n"), "too far north");
    north["latitude"] = json!(90.5);
    let mut east = candidate(Some("e"), "too far east");
    east["longitude"] = json!(181);
    let mut edge = candidate(Some("edge"), "on the edge");
    edge["latitude"] = json!(-90);
    edge["longitude"] = json!(180);

    let report = reconcile(&store, &caller(), json!([north, east, edge]))
      .await
      .unwrap();

    assert_eq!(report.created.len(), 1);
    assert_eq!(report.created[0].local_id.as_deref(), Some("edge"));
    assert_eq!(report.rejected.len(), 2);
    assert_eq!(report.rejected[0].errors.field_errors()["latitude"][0].code, "range");
    assert_eq!(report.rejected[1].errors.field_errors()["longitude"][0].code, "range");
    assert_eq!(store.keys(), [Some("edge".to_owned())]);
  }

  #[tokio::test]
  async fn store_failure_aborts_but_keeps_earlier_records() {
    let store = FailingStore {
      inner:   MemoryStore::default(),
      inserts: AtomicUsize::new(0),
      fail_on: 3,
    };
    let batch = json!([
      candidate(Some("k1"), "one"),
      candidate(Some("k2"), "two"),
      candidate(Some("k3"), "three"),
      candidate(Some("k4"), "four"),
    ]);

    let err = reconcile(&store, &caller(), batch).await.unwrap_err();

    assert!(matches!(err, Error::Store(_)));
    assert!(err.to_string().contains("disk I/O error"));
    assert_eq!(store.inner.keys(), [Some("k1".to_owned()), Some("k2".to_owned())]);
    assert_eq!(store.inserts.load(Ordering::SeqCst), 3);
  }
}
