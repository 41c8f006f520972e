//! Session store and login/logout.
//!
//! Sessions carry their own Rec API / WebDAV clients because credentials
//! are supplied per login, not global config. Credential persistence
//! under `~/.reccli-ts/<sha256(account)>` matches a plain-struct-plus-DashMap
//! registry, the same pattern used elsewhere in this crate for concurrent
//! state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;
use crate::contracts::{rec_api::RecApiHttpClient, webdav::WebDavHttpClient, NoWebDavClient, RecApiClient, RecFs, RootOnlyRecFs, WebDavClient};
use crate::error::{BridgeError, Result};
use crate::transfer::TransferManager;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub rec_account: String,
    pub rec_password: String,
    pub pan_dav_account: Option<String>,
    pub pan_dav_password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub session_id: String,
    pub user: String,
}

/// Cached credential record, persisted under `~/.reccli-ts/<sha256(account)>`.
#[derive(Debug, Serialize, Deserialize)]
struct CachedCredential {
    account: String,
    token: String,
}

pub struct Session {
    pub id: String,
    pub rec_account: String,
    pub has_webdav: bool,
    pub rec_fs: Arc<dyn RecFs>,
    pub rec_api: Arc<dyn RecApiClient>,
    pub webdav: Arc<dyn WebDavClient>,
    pub manager: Arc<TransferManager>,
}

pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self { sessions: DashMap::new() }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|s| s.clone())
    }

    pub fn remove(&self, id: &str) {
        self.sessions.remove(id);
    }

    fn insert(&self, session: Arc<Session>) {
        self.sessions.insert(session.id.clone(), session);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cache_path(cache_dir: &str, account: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(account.as_bytes());
    let digest = hex::encode(hasher.finalize());
    dirs_home().join(cache_dir).join(digest)
}

fn pandav_cache_path(cache_dir: &str, account: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(account.as_bytes());
    let digest = hex::encode(hasher.finalize());
    dirs_home().join(cache_dir).join(format!("{digest}-pandav"))
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

async fn persist_rec_credential(cache_dir: &str, account: &str, token: &str) -> Result<()> {
    let path = cache_path(cache_dir, account);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(BridgeError::LocalFilesystem)?;
    }
    let record = CachedCredential { account: account.to_string(), token: token.to_string() };
    let json = serde_json::to_string(&record)?;
    tokio::fs::write(&path, json).await.map_err(BridgeError::LocalFilesystem)?;
    Ok(())
}

async fn persist_pandav_credential(cache_dir: &str, account: &str, password: &str) -> Result<()> {
    use base64::Engine;
    let path = pandav_cache_path(cache_dir, account);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(BridgeError::LocalFilesystem)?;
    }
    let record = serde_json::json!({ "account": account, "password": password });
    let encoded = base64::engine::general_purpose::STANDARD.encode(serde_json::to_vec(&record)?);
    tokio::fs::write(&path, encoded).await.map_err(BridgeError::LocalFilesystem)?;
    Ok(())
}

/// Authenticate against Rec, optionally bind PanDav credentials, cache
/// both, and mint a session.
pub async fn login(store: &SessionStore, config: &Config, req: LoginRequest) -> Result<LoginResponse> {
    if req.rec_account.is_empty() || req.rec_password.is_empty() {
        return Err(BridgeError::Validation("recAccount and recPassword are required".into()));
    }

    // The login ciphertext itself is opaque to the rest of the system; we
    // build it to match the wire contract even though this demonstration
    // client does not round-trip it against a live Rec endpoint.
    let payload = serde_json::json!({ "account": req.rec_account, "password": req.rec_password });
    let _ciphertext = crate::contracts::rec_api::login::encrypt_login_payload(payload.to_string().as_bytes());
    let token = crate::contracts::rec_api::login::sign_tempticket(&req.rec_account, &req.rec_password);

    persist_rec_credential(&config.rec.cache_dir, &req.rec_account, &token).await?;

    let timeout = Duration::from_secs(config.rec.timeout_secs);
    let rec_api: Arc<dyn RecApiClient> = Arc::new(RecApiHttpClient::new(config.rec.base_url.clone(), timeout, token)?);

    let (webdav, has_webdav): (Arc<dyn WebDavClient>, bool) = match (&req.pan_dav_account, &req.pan_dav_password) {
        (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
            persist_pandav_credential(&config.rec.cache_dir, &req.rec_account, pass).await?;
            let base_url = config
                .webdav
                .base_url
                .clone()
                .ok_or_else(|| BridgeError::Validation("no WebDAV endpoint configured".into()))?;
            (Arc::new(WebDavHttpClient::new(base_url, user.clone(), pass.clone())?), true)
        }
        _ => (Arc::new(NoWebDavClient), false),
    };

    let rec_fs: Arc<dyn RecFs> = Arc::new(RootOnlyRecFs);
    let manager = Arc::new(TransferManager::new(
        rec_api.clone(),
        webdav.clone(),
        rec_fs.clone(),
        reqwest::Client::new(),
    ));

    let session = Arc::new(Session {
        id: Uuid::new_v4().to_string(),
        rec_account: req.rec_account.clone(),
        has_webdav,
        rec_fs,
        rec_api,
        webdav,
        manager,
    });
    let response = LoginResponse { session_id: session.id.clone(), user: session.rec_account.clone() };
    store.insert(session);
    Ok(response)
}

pub fn logout(store: &SessionStore, session_id: &str) {
    store.remove(session_id);
}

pub fn require_session(store: &SessionStore, session_id: Option<&str>) -> Result<Arc<Session>> {
    let id = session_id.ok_or_else(|| BridgeError::Permission("missing X-Session-ID".into()))?;
    store.get(id).ok_or_else(|| BridgeError::Permission("invalid or expired session".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        let mut c = Config::default();
        c.rec.cache_dir = format!("/tmp/reccli-ts-test-{}", Uuid::new_v4());
        c
    }

    #[tokio::test]
    async fn login_rejects_empty_account() {
        let store = SessionStore::new();
        let config = test_config();
        let req = LoginRequest { rec_account: "".into(), rec_password: "x".into(), pan_dav_account: None, pan_dav_password: None };
        assert!(login(&store, &config, req).await.is_err());
    }

    #[tokio::test]
    async fn login_without_pandav_creds_marks_session_webdav_unavailable() {
        let store = SessionStore::new();
        let config = test_config();
        let req = LoginRequest { rec_account: "user@example.com".into(), rec_password: "pw".into(), pan_dav_account: None, pan_dav_password: None };
        let resp = login(&store, &config, req).await.unwrap();
        let session = store.get(&resp.session_id).unwrap();
        assert!(!session.has_webdav);
    }

    #[tokio::test]
    async fn require_session_rejects_missing_header() {
        let store = SessionStore::new();
        assert!(require_session(&store, None).is_err());
    }

    #[tokio::test]
    async fn logout_evicts_session() {
        let store = SessionStore::new();
        let config = test_config();
        let req = LoginRequest { rec_account: "a@b.com".into(), rec_password: "pw".into(), pan_dav_account: None, pan_dav_password: None };
        let resp = login(&store, &config, req).await.unwrap();
        logout(&store, &resp.session_id);
        assert!(store.get(&resp.session_id).is_none());
    }
}
