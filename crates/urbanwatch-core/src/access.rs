//! Authorization rules as pure functions of the requesting identity.
//!
//! Every boundary that needs a permission decision calls one of these with
//! the [`Identity`] produced by authentication; nothing here consults ambient
//! state.

use uuid::Uuid;

use crate::{
  identity::{Identity, Role},
  incident::Incident,
};

pub fn is_admin(identity: &Identity) -> bool {
  identity.role == Role::Administrator
}

/// Listing, reading, and editing other identities is admin-only.
pub fn can_manage_users(identity: &Identity) -> bool { is_admin(identity) }

/// Owners and administrators may read, modify, and delete an incident.
pub fn can_access_incident(identity: &Identity, incident: &Incident) -> bool {
  is_admin(identity) || incident.user == identity.id
}

/// The owner filter to apply when listing incidents: `None` for
/// administrators (everything is visible), otherwise the caller's own id.
pub fn incident_scope(identity: &Identity) -> Option<Uuid> {
  if is_admin(identity) { None } else { Some(identity.id) }
}
