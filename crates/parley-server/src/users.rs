//! User lookup.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

/// A known user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

/// Resolves user ids to users.
pub trait UserDirectory: Send + Sync {
    fn find(&self, user_id: &str) -> Option<User>;
}

/// Shared handle to a user directory.
pub type SharedUserDirectory = Arc<dyn UserDirectory>;

/// Fixed set of users, loaded at start-up.
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: HashMap<String, User>,
}

impl StaticUserDirectory {
    pub fn new(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id.clone(), u)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserDirectory for StaticUserDirectory {
    fn find(&self, user_id: &str) -> Option<User> {
        self.users.get(user_id).cloned()
    }
}
