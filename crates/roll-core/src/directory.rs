//! Lookup collaborators for the entities attendance records point at.
//!
//! Users, events and meetings are owned by other services. The writer only
//! needs to know whether they exist (and which organization a parent belongs
//! to), so each directory is a narrow async lookup. Parent directories are
//! registered per [`ParentType`] in a [`ParentDirectories`] table and
//! dispatched on the tag of a [`ParentRef`].

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  id::EntityId,
  record::{ParentRef, ParentType},
};

/// Failure reported by a directory backend.
pub type DirectoryError = Box<dyn std::error::Error + Send + Sync>;

// ─── Lookup results ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
  pub user_id:         EntityId,
  pub display_name:    Option<String>,
  pub organization_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentInfo {
  pub parent:          ParentRef,
  pub title:           Option<String>,
  pub organization_id: Option<EntityId>,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

#[async_trait]
pub trait UserDirectory: Send + Sync {
  /// `Ok(None)` when no such user exists.
  async fn resolve(
    &self,
    user_id: &EntityId,
  ) -> Result<Option<UserProfile>, DirectoryError>;
}

/// Resolves parents of a single [`ParentType`].
#[async_trait]
pub trait ParentDirectory: Send + Sync {
  /// `Ok(None)` when no such parent exists.
  async fn resolve(
    &self,
    parent_id: &EntityId,
  ) -> Result<Option<ParentInfo>, DirectoryError>;
}

// ─── Dispatch table ──────────────────────────────────────────────────────────

/// Parent directories keyed by the parent type they serve.
#[derive(Clone, Default)]
pub struct ParentDirectories {
  by_type: HashMap<ParentType, Arc<dyn ParentDirectory>>,
}

impl ParentDirectories {
  pub fn new() -> Self { Self::default() }

  pub fn with(mut self, kind: ParentType, directory: Arc<dyn ParentDirectory>) -> Self {
    self.by_type.insert(kind, directory);
    self
  }

  /// Resolve `parent` through the directory registered for its type.
  ///
  /// A parent type with no registered directory is rejected as an invalid
  /// argument, the same as an unknown type string.
  pub async fn resolve(&self, parent: &ParentRef) -> Result<Option<ParentInfo>> {
    let directory = self.by_type.get(&parent.kind).ok_or_else(|| {
      Error::InvalidArgument(format!("unsupported parent type: {}", parent.kind))
    })?;
    directory.resolve(&parent.id).await.map_err(Error::Directory)
  }

  /// Like [`Self::resolve`] but a missing parent is an error.
  pub async fn require(&self, parent: &ParentRef) -> Result<ParentInfo> {
    self
      .resolve(parent)
      .await?
      .ok_or_else(|| Error::ParentNotFound(parent.clone()))
  }
}

// ─── In-memory directories ───────────────────────────────────────────────────

/// A fixed set of users held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticUsers {
  users: HashMap<EntityId, UserProfile>,
}

impl StaticUsers {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&mut self, profile: UserProfile) {
    self.users.insert(profile.user_id.clone(), profile);
  }

  /// Register bare user ids with no profile details.
  pub fn with_ids<I>(ids: I) -> Self
  where
    I: IntoIterator<Item = EntityId>,
  {
    let mut users = Self::new();
    for user_id in ids {
      users.insert(UserProfile { user_id, display_name: None, organization_id: None });
    }
    users
  }

  pub fn len(&self) -> usize { self.users.len() }

  pub fn is_empty(&self) -> bool { self.users.is_empty() }
}

#[async_trait]
impl UserDirectory for StaticUsers {
  async fn resolve(
    &self,
    user_id: &EntityId,
  ) -> Result<Option<UserProfile>, DirectoryError> {
    Ok(self.users.get(user_id).cloned())
  }
}

/// A fixed set of parents of one type held in memory.
#[derive(Debug, Clone)]
pub struct StaticParents {
  kind:    ParentType,
  parents: HashMap<EntityId, ParentInfo>,
}

impl StaticParents {
  pub fn new(kind: ParentType) -> Self { Self { kind, parents: HashMap::new() } }

  /// Register a parent; `organization_id` is stamped onto records created
  /// against it.
  pub fn insert(
    &mut self,
    id: EntityId,
    title: Option<String>,
    organization_id: Option<EntityId>,
  ) {
    let parent = ParentRef::new(self.kind, id.clone());
    self.parents.insert(id, ParentInfo { parent, title, organization_id });
  }

  pub fn len(&self) -> usize { self.parents.len() }

  pub fn is_empty(&self) -> bool { self.parents.is_empty() }
}

#[async_trait]
impl ParentDirectory for StaticParents {
  async fn resolve(
    &self,
    parent_id: &EntityId,
  ) -> Result<Option<ParentInfo>, DirectoryError> {
    Ok(self.parents.get(parent_id).cloned())
  }
}
