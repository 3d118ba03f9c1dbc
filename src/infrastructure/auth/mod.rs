//! # Credentials
//!
//! File-backed credential store keyed by account realm, plus the
//! client-credentials grant used to obtain and refresh access tokens.
//! The store lives in `~/.drover/credentials.json` with restricted
//! permissions; `DROVER_ACCESS_TOKEN` short-circuits it for CI use.

use crate::domain::error::ApiError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

const DROVER_DIR: &str = ".drover";
const CREDENTIALS_FILE: &str = "credentials.json";

/// Stored credentials for one realm. Client id/secret are the refresh
/// material; without them an expired token just goes stale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    /// Unix seconds. Absent for tokens of unknown lifetime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl Credentials {
    /// True when the token expires within `lead_secs` from now (or has
    /// already expired). Tokens without an expiry never report stale.
    pub fn expires_within(&self, lead_secs: i64) -> bool {
        match self.expires_at {
            Some(at) => chrono::Utc::now().timestamp() + lead_secs >= at,
            None => false,
        }
    }
}

/// Token-grant response from the identity endpoint.
#[derive(Debug, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub expires_in: i64,
    #[allow(dead_code)]
    pub token_type: String,
}

/// File-backed credential map, one entry per realm.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store under the user's home directory, creating `~/.drover` with
    /// mode 0700 on first use.
    pub fn open_default() -> Result<Self> {
        let home = dirs::home_dir().context("Could not resolve home directory")?;
        let dir = home.join(DROVER_DIR);
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
            }
        }
        Ok(Self {
            path: dir.join(CREDENTIALS_FILE),
        })
    }

    /// Store rooted at an explicit path (tests).
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_all(&self) -> HashMap<String, Credentials> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    fn write_all(&self, creds: &HashMap<String, Credentials>) -> Result<()> {
        let data = serde_json::to_string_pretty(creds)?;
        std::fs::write(&self.path, data)
            .with_context(|| format!("Failed to save credentials to {}", self.path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Full credentials for a realm, if stored.
    pub fn get(&self, realm: &str) -> Option<Credentials> {
        self.read_all().get(realm).cloned()
    }

    /// Insert or update a realm's credentials, preserving refresh material
    /// that the update does not carry.
    pub fn save(&self, realm: &str, update: Credentials) -> Result<()> {
        let mut all = self.read_all();
        let entry = all.entry(realm.to_string()).or_default();
        entry.access_token = update.access_token;
        entry.expires_at = update.expires_at.or(entry.expires_at);
        if update.client_id.is_some() {
            entry.client_id = update.client_id;
        }
        if update.client_secret.is_some() {
            entry.client_secret = update.client_secret;
        }
        self.write_all(&all)
    }

    pub fn delete(&self, realm: &str) -> Result<bool> {
        let mut all = self.read_all();
        let removed = all.remove(realm).is_some();
        if removed {
            self.write_all(&all)?;
        }
        Ok(removed)
    }
}

/// Run the client-credentials grant against the realm's identity endpoint.
pub async fn authenticate(
    http: &reqwest::Client,
    idm_base: &str,
    realm: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<AuthToken, ApiError> {
    let url = format!("{}/{}/oidc/oauth/token", idm_base, realm);
    let params = [
        ("grant_type", "client_credentials"),
        ("client_id", client_id),
        ("client_secret", client_secret),
    ];

    let response = http.post(&url).form(&params).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 401 {
            return Err(ApiError::Auth(format!(
                "Token grant rejected for realm '{}': {}",
                realm, body
            )));
        }
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<AuthToken>()
        .await
        .map_err(|e| ApiError::Body(format!("Malformed token response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::at_path(dir.path().join("credentials.json"));
        (dir, store)
    }

    #[test]
    fn test_save_and_get_roundtrip() {
        let (_dir, store) = temp_store();
        store
            .save(
                "acme",
                Credentials {
                    access_token: "tok".into(),
                    expires_at: Some(9_999_999_999),
                    client_id: Some("id".into()),
                    client_secret: Some("secret".into()),
                },
            )
            .unwrap();

        let loaded = store.get("acme").unwrap();
        assert_eq!(loaded.access_token, "tok");
        assert_eq!(loaded.client_id.as_deref(), Some("id"));
    }

    #[test]
    fn test_update_preserves_refresh_material() {
        let (_dir, store) = temp_store();
        store
            .save(
                "acme",
                Credentials {
                    access_token: "tok1".into(),
                    expires_at: Some(100),
                    client_id: Some("id".into()),
                    client_secret: Some("secret".into()),
                },
            )
            .unwrap();
        // Token-only update, as the refresh path produces
        store
            .save(
                "acme",
                Credentials {
                    access_token: "tok2".into(),
                    expires_at: Some(200),
                    ..Default::default()
                },
            )
            .unwrap();

        let loaded = store.get("acme").unwrap();
        assert_eq!(loaded.access_token, "tok2");
        assert_eq!(loaded.client_secret.as_deref(), Some("secret"));
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let (_dir, store) = temp_store();
        assert!(store.get("nobody").is_none());
        assert!(!store.delete("nobody").unwrap());
    }

    #[test]
    fn test_expiry_lead_time() {
        let now = chrono::Utc::now().timestamp();
        let soon = Credentials {
            access_token: "t".into(),
            expires_at: Some(now + 30),
            ..Default::default()
        };
        let later = Credentials {
            access_token: "t".into(),
            expires_at: Some(now + 3600),
            ..Default::default()
        };
        let unknown = Credentials {
            access_token: "t".into(),
            ..Default::default()
        };
        assert!(soon.expires_within(60));
        assert!(!later.expires_within(60));
        assert!(!unknown.expires_within(60));
    }
}
