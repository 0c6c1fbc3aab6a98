//! Session store for the access token, CSRF token and user profile
//!
//! The in-memory state is authoritative. When constructed with a path, every
//! mutation is mirrored to a session-scoped JSON file so a restarted client
//! resumes the same session; `clear()` deletes the file. Writes use
//! temp-file + rename and 0600 permissions because the file holds a bearer
//! token. A tokio Mutex serializes the pipeline's concurrent writers
//! (refresh, login, lazy CSRF creation).

use std::path::{Path, PathBuf};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::credential;
use crate::csrf::{generate_csrf_token, is_well_formed};
use crate::error::{Error, Result};

/// Who is logged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    ShopOwner,
    Admin,
}

/// Profile returned by the login endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub role: Role,
}

#[derive(Default)]
struct SessionState {
    access_token: Option<Secret<String>>,
    csrf_token: Option<String>,
    user: Option<UserProfile>,
}

/// On-disk mirror of `SessionState`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedSession {
    #[serde(default, rename = "accessToken", skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, rename = "csrfToken", skip_serializing_if = "Option::is_none")]
    csrf_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<UserProfile>,
}

impl From<&SessionState> for PersistedSession {
    fn from(state: &SessionState) -> Self {
        Self {
            access_token: state.access_token.as_ref().map(|t| t.expose().clone()),
            csrf_token: state.csrf_token.clone(),
            user: state.user.clone(),
        }
    }
}

/// Client session state shared by every stage of the request pipeline.
pub struct SessionStore {
    path: Option<PathBuf>,
    state: Mutex<SessionState>,
}

impl SessionStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(SessionState {
                csrf_token: Some(generate_csrf_token()),
                ..SessionState::default()
            }),
        }
    }

    /// Restore the session mirrored at `path`, or start an empty one.
    ///
    /// A CSRF token is generated and persisted if the mirror has none or
    /// holds one that is not 64 lowercase hex chars.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let persisted = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
            let persisted: PersistedSession = serde_json::from_str(&contents)
                .map_err(|e| Error::SessionParse(format!("parsing session file: {e}")))?;
            info!(
                path = %path.display(),
                authenticated = persisted.access_token.is_some(),
                "restored session"
            );
            persisted
        } else {
            info!(path = %path.display(), "session file not found, starting new session");
            PersistedSession::default()
        };

        let csrf_token = match persisted.csrf_token {
            Some(token) if is_well_formed(&token) => token,
            Some(_) => {
                warn!(path = %path.display(), "discarding malformed CSRF token from session file");
                generate_csrf_token()
            }
            None => generate_csrf_token(),
        };
        let state = SessionState {
            access_token: persisted.access_token.map(Secret::new),
            csrf_token: Some(csrf_token),
            user: persisted.user,
        };
        write_atomic(&path, &PersistedSession::from(&state)).await?;

        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Current access token, if any.
    pub async fn access_token(&self) -> Option<Secret<String>> {
        self.state.lock().await.access_token.clone()
    }

    /// Logged-in user, if any.
    pub async fn user(&self) -> Option<UserProfile> {
        self.state.lock().await.user.clone()
    }

    /// Whether a token is held and its `exp` claim (if readable) is in the future.
    pub async fn is_authenticated(&self) -> bool {
        let state = self.state.lock().await;
        match &state.access_token {
            Some(token) => !credential::is_expired(token.expose(), credential::now_millis()),
            None => false,
        }
    }

    /// Replace the access token after a refresh.
    ///
    /// Memory is updated before the mirror is written, so a failed write still
    /// leaves the new token usable for this process.
    pub async fn set_access_token(&self, token: Secret<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.access_token = Some(token);
        debug!("access token updated");
        self.persist(&state).await
    }

    /// Start an authenticated session after login.
    pub async fn establish(&self, token: Secret<String>, user: Option<UserProfile>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.access_token = Some(token);
        state.user = user;
        if state.csrf_token.is_none() {
            state.csrf_token = Some(generate_csrf_token());
        }
        info!(
            user = state.user.as_ref().map(|u| u.email.as_str()).unwrap_or("<unknown>"),
            "session established"
        );
        self.persist(&state).await
    }

    /// The session CSRF token, created on first use after a logout.
    ///
    /// Never fails: a mirror write error is logged and the in-memory token
    /// is still returned.
    pub async fn csrf_token(&self) -> String {
        let mut state = self.state.lock().await;
        if let Some(token) = &state.csrf_token {
            return token.clone();
        }
        let token = generate_csrf_token();
        state.csrf_token = Some(token.clone());
        debug!("generated CSRF token");
        if let Err(e) = self.persist(&state).await {
            warn!(error = %e, "failed to persist CSRF token");
        }
        token
    }

    /// Log out: drop the token, CSRF token and profile, and remove the mirror.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = SessionState::default();
        info!("session cleared");
        if let Some(path) = &self.path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::Io(format!("removing session file: {e}"))),
            }
        }
        Ok(())
    }

    async fn persist(&self, state: &SessionState) -> Result<()> {
        match &self.path {
            Some(path) => write_atomic(path, &PersistedSession::from(state)).await,
            None => Ok(()),
        }
    }
}

/// Write the session mirror atomically with owner-only permissions.
async fn write_atomic(path: &Path, data: &PersistedSession) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::SessionParse(format!("serializing session: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("session path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::token_with_exp;

    fn far_future_token() -> String {
        // year 2100
        token_with_exp(4_102_444_800)
    }

    fn owner() -> UserProfile {
        UserProfile {
            id: "u-1".into(),
            email: "owner@shop.test".into(),
            name: Some("Shop Owner".into()),
            role: Role::ShopOwner,
        }
    }

    #[tokio::test]
    async fn in_memory_starts_unauthenticated_with_csrf() {
        let store = SessionStore::in_memory();
        assert!(store.access_token().await.is_none());
        assert!(!store.is_authenticated().await);
        assert!(is_well_formed(&store.csrf_token().await));
    }

    #[tokio::test]
    async fn csrf_token_is_stable_within_session() {
        let store = SessionStore::in_memory();
        let a = store.csrf_token().await;
        let b = store.csrf_token().await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn clear_resets_everything_and_new_csrf_is_generated() {
        let store = SessionStore::in_memory();
        let before = store.csrf_token().await;
        store
            .establish(Secret::new(far_future_token()), Some(owner()))
            .await
            .unwrap();
        assert!(store.is_authenticated().await);

        store.clear().await.unwrap();
        assert!(store.access_token().await.is_none());
        assert!(store.user().await.is_none());
        assert!(!store.is_authenticated().await);

        let after = store.csrf_token().await;
        assert_ne!(before, after, "logout must rotate the CSRF token");
    }

    #[tokio::test]
    async fn expired_token_is_not_authenticated() {
        let store = SessionStore::in_memory();
        store
            .set_access_token(Secret::new(token_with_exp(1_000)))
            .await
            .unwrap();
        assert!(store.access_token().await.is_some());
        assert!(!store.is_authenticated().await);
    }

    #[tokio::test]
    async fn load_creates_mirror_with_csrf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = SessionStore::load(path.clone()).await.unwrap();
        assert!(path.exists());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(json["csrfToken"], store.csrf_token().await);
        assert!(json.get("accessToken").is_none());
    }

    #[tokio::test]
    async fn session_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let token = far_future_token();

        let store = SessionStore::load(path.clone()).await.unwrap();
        store
            .establish(Secret::new(token.clone()), Some(owner()))
            .await
            .unwrap();
        let csrf = store.csrf_token().await;

        let reloaded = SessionStore::load(path).await.unwrap();
        assert_eq!(reloaded.access_token().await.unwrap().expose(), &token);
        assert_eq!(reloaded.csrf_token().await, csrf);
        assert_eq!(reloaded.user().await, Some(owner()));
        assert!(reloaded.is_authenticated().await);
    }

    #[tokio::test]
    async fn refreshed_token_is_mirrored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = SessionStore::load(path.clone()).await.unwrap();
        store
            .set_access_token(Secret::from("new.access.token"))
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(json["accessToken"], "new.access.token");
    }

    #[tokio::test]
    async fn clear_removes_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = SessionStore::load(path.clone()).await.unwrap();
        store
            .set_access_token(Secret::from("a.b.c"))
            .await
            .unwrap();
        store.clear().await.unwrap();
        assert!(!path.exists());

        // Clearing twice is fine
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_csrf_in_mirror_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, r#"{"csrfToken": "<script>"}"#)
            .await
            .unwrap();

        let store = SessionStore::load(path.clone()).await.unwrap();
        let csrf = store.csrf_token().await;
        assert_ne!(csrf, "<script>");
        assert!(is_well_formed(&csrf));

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(json["csrfToken"], csrf);
    }

    #[tokio::test]
    async fn corrupt_mirror_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let result = SessionStore::load(path).await;
        assert!(matches!(result, Err(Error::SessionParse(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn mirror_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = SessionStore::load(path.clone()).await.unwrap();
        store
            .set_access_token(Secret::from("a.b.c"))
            .await
            .unwrap();

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "session file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_csrf_reads_agree() {
        let store = std::sync::Arc::new(SessionStore::in_memory());
        store.clear().await.unwrap();

        let mut handles = vec![];
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.csrf_token().await }));
        }
        let mut tokens = vec![];
        for h in handles {
            tokens.push(h.await.unwrap());
        }
        tokens.dedup();
        assert_eq!(tokens.len(), 1, "one CSRF token per session");
    }
}
