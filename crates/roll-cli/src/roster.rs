//! The roster file standing in for the user, event and meeting services.
//!
//! ```json
//! {
//!   "users":    [{ "user_id": "42", "display_name": "Ada", "organization_id": "acme" }],
//!   "events":   [{ "id": "7", "title": "Kickoff", "organization_id": "acme" }],
//!   "meetings": [{ "id": "3" }]
//! }
//! ```

use std::{path::Path, sync::Arc};

use anyhow::Context as _;
use roll_core::{
  EntityId,
  directory::{ParentDirectories, StaticParents, StaticUsers, UserProfile},
  record::ParentType,
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct Roster {
  #[serde(default)]
  pub users:    Vec<UserProfile>,
  #[serde(default)]
  pub events:   Vec<ParentEntry>,
  #[serde(default)]
  pub meetings: Vec<ParentEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ParentEntry {
  pub id:              EntityId,
  #[serde(default)]
  pub title:           Option<String>,
  #[serde(default)]
  pub organization_id: Option<EntityId>,
}

impl Roster {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading roster {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing roster {}", path.display()))
  }

  pub fn into_directories(self) -> (StaticUsers, ParentDirectories) {
    let mut users = StaticUsers::new();
    for profile in self.users {
      users.insert(profile);
    }

    let parents = ParentDirectories::new()
      .with(ParentType::Event, Arc::new(parents_of(ParentType::Event, self.events)))
      .with(ParentType::Meeting, Arc::new(parents_of(ParentType::Meeting, self.meetings)));
    (users, parents)
  }
}

fn parents_of(kind: ParentType, entries: Vec<ParentEntry>) -> StaticParents {
  let mut parents = StaticParents::new(kind);
  for entry in entries {
    parents.insert(entry.id, entry.title, entry.organization_id);
  }
  parents
}
