//! Session state the route guard and views read: the stored token and the
//! signed-in user.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::{endpoints, ApiError};
use crate::cache::{keys, PersistentCache};
use crate::engine::SyncEngine;
use crate::models::CurrentUser;
use crate::route::AuthState;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionToken {
    token: String,
}

/// `me` answers `{ok, user: {...}}`.
#[derive(Debug, Deserialize)]
struct MeResponse {
    user: CurrentUser,
}

pub struct AuthSession {
    cache: PersistentCache,
}

impl AuthSession {
    pub fn new(cache: PersistentCache) -> Self {
        Self { cache }
    }

    pub fn store_token(&self, token: &str) {
        self.cache.set(
            keys::SESSION_TOKEN,
            SessionToken {
                token: token.to_string(),
            },
        );
    }

    pub fn token(&self) -> Option<String> {
        self.cache
            .get::<SessionToken>(keys::SESSION_TOKEN)
            .map(|e| e.payload.token)
            .filter(|t| !t.is_empty())
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.cache.load_current_user().map(|e| e.payload)
    }

    /// Load the signed-in user from the API. An expired token signs the
    /// session out instead of failing.
    pub async fn load_user(&self, engine: &SyncEngine) -> Result<Option<CurrentUser>, ApiError> {
        if self.token().is_none() {
            return Ok(None);
        }
        let loaded = engine
            .refresh_with(keys::CURRENT_USER, &endpoints::me(), |value| {
                let me: MeResponse = serde_json::from_value(value)?;
                Ok(me.user)
            })
            .await;
        match loaded {
            Ok(entry) => {
                debug!(user = %entry.payload.name, admin = entry.payload.is_admin, "Loaded current user");
                Ok(Some(entry.payload))
            }
            Err(ApiError::Unauthorized) => {
                info!("Session token rejected, signing out");
                self.sign_out();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Forget the token and everything cached on behalf of this user.
    pub fn sign_out(&self) {
        self.cache.delete(keys::SESSION_TOKEN);
        self.cache.delete(keys::CURRENT_USER);
        self.cache.delete(keys::ADMIN_USERS);
    }
}

impl AuthState for AuthSession {
    fn has_token(&self) -> bool {
        self.token().is_some()
    }

    fn is_admin(&self) -> bool {
        self.current_user().is_some_and(|u| u.is_admin)
    }
}
