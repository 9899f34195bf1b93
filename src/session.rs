use std::sync::Arc;

use anyhow::Result;

use crate::api::Session;
use crate::storage::{self, AVATAR_KEY, TOKEN_KEY, USERNAME_KEY};

#[derive(Clone)]
pub struct Persistence {
    store: Arc<storage::Store>,
}

impl Persistence {
    pub fn new(store: Arc<storage::Store>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Result<Option<Session>> {
        let Some(token) = self.store.get(TOKEN_KEY)? else {
            return Ok(None);
        };
        if token.is_empty() {
            return Ok(None);
        }
        Ok(Some(Session {
            token,
            username: self.store.get(USERNAME_KEY)?.unwrap_or_default(),
            avatar: self.store.get(AVATAR_KEY)?.unwrap_or_default(),
        }))
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        self.store.set(TOKEN_KEY, &session.token)?;
        self.store.set(USERNAME_KEY, &session.username)?;
        self.store.set(AVATAR_KEY, &session.avatar)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(TOKEN_KEY)?;
        self.store.remove(USERNAME_KEY)?;
        self.store.remove(AVATAR_KEY)?;
        Ok(())
    }

    pub fn store(&self) -> &Arc<storage::Store> {
        &self.store
    }
}
