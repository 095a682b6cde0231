//! Collaborators handed to annotation and metadata operations

use crate::policy::{AccessPolicy, DefaultAccessPolicy};
use crate::repository::{ExtenderRepository, MemoryExtenderRepository};
use crate::river::{MemoryRiverStore, RiverStore};
use async_trait::async_trait;
use margin_core::{CurrentUser, EntityLookup, MemoryDirectory, User, UserLookup};
use std::sync::Arc;

/// Stand-in for requests where nobody is logged in
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

#[async_trait]
impl CurrentUser for Anonymous {
    async fn current_user(&self) -> Option<User> {
        None
    }
}

#[derive(Clone)]
pub struct ExtenderServices {
    pub repository: Arc<dyn ExtenderRepository>,
    pub river: Arc<dyn RiverStore>,
    pub entities: Arc<dyn EntityLookup>,
    pub users: Arc<dyn UserLookup>,
    pub policy: Arc<dyn AccessPolicy>,
    pub current_user: Arc<dyn CurrentUser>,
}

impl ExtenderServices {
    pub fn new(
        repository: Arc<dyn ExtenderRepository>,
        river: Arc<dyn RiverStore>,
        directory: MemoryDirectory,
    ) -> Self {
        Self {
            repository,
            river,
            entities: Arc::new(directory.clone()),
            users: Arc::new(directory),
            policy: Arc::new(DefaultAccessPolicy::new()),
            current_user: Arc::new(Anonymous),
        }
    }

    /// Everything held in memory, nobody logged in
    pub fn in_memory(directory: MemoryDirectory) -> Self {
        Self::new(
            Arc::new(MemoryExtenderRepository::new()),
            Arc::new(MemoryRiverStore::new()),
            directory,
        )
    }

    pub fn with_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_current_user(mut self, current_user: Arc<dyn CurrentUser>) -> Self {
        self.current_user = current_user;
        self
    }

    /// Resolve the user an edit check is about: an explicit guid, or
    /// whoever is logged in
    pub(crate) async fn resolve_user(&self, user_guid: Option<margin_core::Guid>) -> Option<User> {
        match user_guid {
            None => self.current_user.current_user().await,
            Some(guid) => match self.users.get_user(guid).await {
                Ok(user) => user,
                Err(e) => {
                    e.log();
                    None
                }
            },
        }
    }
}
