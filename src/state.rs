//! Shared application state.
//!
//! Rec/WebDAV credentials are supplied per login, so the Transfer Manager
//! -- and the clients it holds -- live on the `Session`, not here; `AppState`
//! only holds what's truly global: config and the session store.

use std::sync::Arc;

use crate::auth::SessionStore;
use crate::config::Config;

pub struct AppState {
    pub config: Config,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sessions: Arc::new(SessionStore::new()),
        }
    }
}
