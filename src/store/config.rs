use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::auth::UserCredential;
use super::json_store::{read_json, write_atomic_private, write_json};
use crate::core::{FacturaError, InvoiceSeries, Party};
use crate::verifactu::VerifactuConfig;

const MASTER_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Numbering of issued invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    pub prefix: String,
    /// Series of rectifying invoices.
    pub rectifying_prefix: String,
    pub padding: usize,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            prefix: "F".to_string(),
            rectifying_prefix: "R".to_string(),
            padding: 4,
        }
    }
}

impl SeriesConfig {
    /// The sequence for `prefix` in `year`, continuing after `existing`.
    pub fn sequence<'a>(
        &self,
        prefix: &str,
        year: i32,
        existing: impl IntoIterator<Item = &'a str>,
    ) -> InvoiceSeries {
        InvoiceSeries::resume(prefix, year, existing).with_padding(self.padding)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceSettings {
    pub endpoint: String,
    /// Address FACe notifies about state changes.
    pub notification_email: Option<String>,
}

impl Default for FaceSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://se-face-webservice.redsara.es/facturasrcf2".to_string(),
            notification_email: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceB2bSettings {
    pub endpoint: String,
    /// DIRe code of the issuer in the FACeB2B directory.
    pub dire_code: Option<String>,
}

impl Default for FaceB2bSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://se-faceb2b.redsara.es/ws/v1.0/invoice".to_string(),
            dire_code: None,
        }
    }
}

/// External Facturae signer, run as `program args...` with XML on stdin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerSettings {
    pub program: Option<String>,
    pub args: Vec<String>,
}

/// A secret sealed with AES-256-GCM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    pub nonce: String,
    pub ciphertext: String,
}

/// Service configuration, stored as `config.json` in the data directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// The business issuing invoices.
    pub issuer: Option<Party>,
    pub series: SeriesConfig,
    pub face: FaceSettings,
    pub faceb2b: FaceB2bSettings,
    pub verifactu: VerifactuConfig,
    pub signer: SignerSettings,
    pub user: Option<UserCredential>,
    pub secrets: BTreeMap<String, SealedSecret>,
}

impl AppConfig {
    pub fn issuer(&self) -> Result<&Party, FacturaError> {
        self.issuer
            .as_ref()
            .ok_or_else(|| FacturaError::Builder("issuer profile is not configured".into()))
    }

    /// The configuration without credentials or sealed secrets.
    pub fn public_view(&self) -> Self {
        Self {
            user: None,
            secrets: BTreeMap::new(),
            ..self.clone()
        }
    }

    pub fn set_secret(&mut self, vault: &SecretVault, name: &str, value: &str) -> Result<(), FacturaError> {
        let sealed = vault.seal(value)?;
        self.secrets.insert(name.to_string(), sealed);
        Ok(())
    }

    pub fn secret(&self, vault: &SecretVault, name: &str) -> Result<Option<String>, FacturaError> {
        self.secrets.get(name).map(|s| vault.open(s)).transpose()
    }
}

/// Loads and saves [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored configuration, or defaults if none was saved yet.
    pub fn load(&self) -> Result<AppConfig, FacturaError> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }

    pub fn save(&self, config: &AppConfig) -> Result<(), FacturaError> {
        write_json(&self.path, config)
    }

    /// Replace the editable settings, keeping the stored user and secrets.
    pub fn update(&self, mut config: AppConfig) -> Result<AppConfig, FacturaError> {
        let current = self.load()?;
        config.user = current.user;
        config.secrets = current.secrets;
        self.save(&config)?;
        tracing::info!(path = %self.path.display(), "configuration updated");
        Ok(config)
    }
}

/// Seals and opens secrets with a master key kept in its own file.
///
/// The key is created on first use.
#[derive(Debug, Clone)]
pub struct SecretVault {
    key_path: PathBuf,
}

fn crypto(what: &str) -> FacturaError {
    FacturaError::Crypto(what.to_string())
}

impl SecretVault {
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: key_path.into(),
        }
    }

    fn cipher(&self) -> Result<Aes256Gcm, FacturaError> {
        let key = self.load_or_create_key()?;
        Aes256Gcm::new_from_slice(&key).map_err(|_| crypto("invalid master key"))
    }

    pub fn seal(&self, plaintext: &str) -> Result<SealedSecret, FacturaError> {
        let cipher = self.cipher()?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| crypto("encryption failed"))?;
        Ok(SealedSecret {
            nonce: BASE64.encode(nonce_bytes),
            ciphertext: BASE64.encode(ciphertext),
        })
    }

    pub fn open(&self, sealed: &SealedSecret) -> Result<String, FacturaError> {
        let cipher = self.cipher()?;
        let nonce = BASE64
            .decode(sealed.nonce.as_bytes())
            .map_err(|_| crypto("nonce is not base64"))?;
        if nonce.len() != NONCE_LEN {
            return Err(crypto("nonce has the wrong length"));
        }
        let ciphertext = BASE64
            .decode(sealed.ciphertext.as_bytes())
            .map_err(|_| crypto("ciphertext is not base64"))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| crypto("secret cannot be opened with this master key"))?;
        String::from_utf8(plaintext).map_err(|_| crypto("secret is not UTF-8"))
    }

    fn load_or_create_key(&self) -> Result<[u8; MASTER_KEY_LEN], FacturaError> {
        let mut key = [0u8; MASTER_KEY_LEN];
        match fs::read_to_string(&self.key_path) {
            Ok(encoded) => {
                let decoded = BASE64
                    .decode(encoded.trim().as_bytes())
                    .map_err(|_| crypto("master key is not base64"))?;
                if decoded.len() != MASTER_KEY_LEN {
                    return Err(crypto("master key has the wrong length"));
                }
                key.copy_from_slice(&decoded);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                OsRng.fill_bytes(&mut key);
                write_atomic_private(&self.key_path, BASE64.encode(key).as_bytes())?;
                tracing::info!(path = %self.key_path.display(), "master key created");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        let config = store.load().unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.series.prefix, "F");
        assert!(config.issuer().is_err());
    }

    #[test]
    fn secrets_round_trip_and_stay_out_of_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let vault = SecretVault::new(dir.path().join("master.key"));
        let store = ConfigStore::new(dir.path().join("config.json"));

        let mut config = AppConfig::default();
        config.set_secret(&vault, "cert_password", "s3cr3t-pass").unwrap();
        store.save(&config).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("s3cr3t-pass"));

        let loaded = store.load().unwrap();
        assert_eq!(
            loaded.secret(&vault, "cert_password").unwrap().as_deref(),
            Some("s3cr3t-pass")
        );
        assert_eq!(loaded.secret(&vault, "missing").unwrap(), None);
        assert!(loaded.public_view().secrets.is_empty());
    }

    #[test]
    fn another_master_key_cannot_open() {
        let dir = tempfile::tempdir().unwrap();
        let sealed = SecretVault::new(dir.path().join("a.key")).seal("x").unwrap();
        let other = SecretVault::new(dir.path().join("b.key"));
        assert!(matches!(other.open(&sealed), Err(FacturaError::Crypto(_))));
    }

    #[cfg(unix)]
    #[test]
    fn master_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("master.key");
        SecretVault::new(&key_path).seal("x").unwrap();
        let mode = fs::metadata(&key_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!dir.path().join("master.key.tmp").exists());
    }

    #[test]
    fn update_keeps_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let vault = SecretVault::new(dir.path().join("master.key"));
        let store = ConfigStore::new(dir.path().join("config.json"));
        let mut config = AppConfig::default();
        config.set_secret(&vault, "api", "token").unwrap();
        store.save(&config).unwrap();

        let mut edited = AppConfig::default();
        edited.series.prefix = "FA".into();
        let saved = store.update(edited).unwrap();
        assert_eq!(saved.series.prefix, "FA");
        assert!(saved.secrets.contains_key("api"));
    }
}
