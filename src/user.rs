//! User directory
//!
//! Maps stable user ids to display identity. Users are seeded at startup and
//! never removed; the only mutation is the online flag.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::AppError;
use crate::types::UserId;

/// A chat user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "is_online")]
    pub online: bool,
}

impl User {
    /// Create an offline user
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            display_name: display_name.into(),
            online: false,
        }
    }
}

#[derive(Debug)]
struct Entry {
    user: User,
    /// Number of live connections that joined as this user
    sessions: usize,
}

/// Registry of known users
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: RwLock<HashMap<UserId, Entry>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from a fixed seed set
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let users = users
            .into_iter()
            .map(|user| (user.id.clone(), Entry { user, sessions: 0 }))
            .collect();
        Self {
            users: RwLock::new(users),
        }
    }

    /// Register a user, replacing any previous record with the same id
    pub async fn insert(&self, user: User) {
        let mut users = self.users.write().await;
        debug!("User '{}' registered as '{}'", user.id, user.display_name);
        users.insert(user.id.clone(), Entry { user, sessions: 0 });
    }

    /// Look up a user by id
    pub async fn get(&self, id: &UserId) -> Result<User, AppError> {
        let users = self.users.read().await;
        users
            .get(id)
            .map(|entry| entry.user.clone())
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    /// Record a new connection acting as this user
    pub async fn connect(&self, id: &UserId) {
        let mut users = self.users.write().await;
        if let Some(entry) = users.get_mut(id) {
            entry.sessions += 1;
            entry.user.online = true;
        }
    }

    /// Record that a connection acting as this user has terminated
    ///
    /// The user goes offline once no connection holds it.
    pub async fn disconnect(&self, id: &UserId) {
        let mut users = self.users.write().await;
        if let Some(entry) = users.get_mut(id) {
            entry.sessions = entry.sessions.saturating_sub(1);
            if entry.sessions == 0 {
                entry.user.online = false;
                debug!("User '{}' is now offline", id);
            }
        }
    }

    /// Number of registered users
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}
