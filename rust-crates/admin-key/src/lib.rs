use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

pub const ADMIN_KEY_ROOT: &str = ".gacha";
const ADMIN_KEY_FILE: &str = "admin-key.json";
const FINGERPRINT_LEN: usize = 12;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AdminKeyRecord {
    pub key: String,
    pub saved_at: String,
    /// Machine the key was issued for; `None` means any machine.
    #[serde(default)]
    pub document_url: Option<String>,
}

impl AdminKeyRecord {
    pub fn new(key: impl Into<String>, document_url: Option<impl Into<String>>) -> Self {
        Self {
            key: key.into(),
            saved_at: Utc::now().to_rfc3339(),
            document_url: document_url.map(Into::into),
        }
    }

    pub fn applies_to(&self, document_url: &str) -> bool {
        self.document_url
            .as_deref()
            .is_none_or(|saved| saved.trim_end_matches('/') == document_url.trim_end_matches('/'))
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.key)
    }
}

/// Short SHA-256 digest of a key, safe to print.
pub fn fingerprint(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}

pub fn default_store_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(ADMIN_KEY_ROOT)
        .join(ADMIN_KEY_FILE))
}

pub fn resolve_store_path(path: Option<&str>) -> Result<PathBuf> {
    match path {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_store_path(),
    }
}

/// The privileged-access token, kept in a single JSON file.
#[derive(Debug)]
pub struct AdminKeyStore {
    path: PathBuf,
}

impl AdminKeyStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<AdminKeyRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        read_record(&self.path)
    }

    pub fn save(&self, record: &AdminKeyRecord) -> Result<()> {
        if record.key.trim().is_empty() {
            return Err(anyhow!("Refusing to store an empty admin key"));
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create admin key directory {}", parent.display())
            })?;
        }
        write_record(&self.path, record)
    }

    /// Returns whether a key was stored.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)
            .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        Ok(true)
    }

    /// The stored key, if there is one for `document_url`.
    pub fn resolve(&self, document_url: &str) -> Result<Option<String>> {
        Ok(self
            .load()?
            .filter(|record| record.applies_to(document_url))
            .map(|record| record.key))
    }
}

fn read_record(path: impl AsRef<Path>) -> Result<Option<AdminKeyRecord>> {
    let path = path.as_ref();
    let data = fs::read(path)
        .with_context(|| format!("Failed to read admin key file {}", path.display()))?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let record = serde_json::from_slice::<AdminKeyRecord>(&data)
        .with_context(|| format!("Failed to parse admin key file {}", path.display()))?;
    Ok(Some(record))
}

fn write_record(path: impl AsRef<Path>, record: &AdminKeyRecord) -> Result<()> {
    let json =
        serde_json::to_vec_pretty(record).context("Failed to serialize admin key record")?;
    fs::write(path.as_ref(), json).context("Failed to write admin key record")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    fn store(temp_dir: &TempDir) -> AdminKeyStore {
        AdminKeyStore::open(temp_dir.path().join("nested").join(ADMIN_KEY_FILE))
    }

    #[test]
    fn load__missing_file_is_no_key() {
        let temp_dir = TempDir::new("admin_key_missing").unwrap();

        let loaded = store(&temp_dir).load().unwrap();

        assert_eq!(loaded, None);
    }

    #[test]
    fn save__round_trips_through_the_file() {
        // given
        let temp_dir = TempDir::new("admin_key_save").unwrap();
        let store = store(&temp_dir);
        let record = AdminKeyRecord::new("secret", Some("http://machine.test/doc/"));

        // when
        store.save(&record).unwrap();

        // then
        assert_eq!(store.load().unwrap(), Some(record));
        assert!(store.path().exists());
    }

    #[test]
    fn resolve__only_for_the_machine_it_was_saved_for() {
        let temp_dir = TempDir::new("admin_key_resolve").unwrap();
        let store = store(&temp_dir);
        store
            .save(&AdminKeyRecord::new("secret", Some("http://machine.test/doc/")))
            .unwrap();

        assert_eq!(
            store.resolve("http://machine.test/doc").unwrap(),
            Some("secret".to_string())
        );
        assert_eq!(store.resolve("http://other.test/doc/").unwrap(), None);
    }

    #[test]
    fn resolve__unscoped_key_applies_everywhere() {
        let temp_dir = TempDir::new("admin_key_unscoped").unwrap();
        let store = store(&temp_dir);
        store
            .save(&AdminKeyRecord::new("secret", None::<String>))
            .unwrap();

        assert_eq!(
            store.resolve("http://other.test/").unwrap(),
            Some("secret".to_string())
        );
    }

    #[test]
    fn clear__removes_the_key_once() {
        let temp_dir = TempDir::new("admin_key_clear").unwrap();
        let store = store(&temp_dir);
        store
            .save(&AdminKeyRecord::new("secret", None::<String>))
            .unwrap();

        assert!(store.clear().unwrap());
        assert!(!store.clear().unwrap());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn save__rejects_blank_keys() {
        let temp_dir = TempDir::new("admin_key_blank").unwrap();

        let result = store(&temp_dir).save(&AdminKeyRecord::new("  ", None::<String>));

        assert!(result.is_err());
    }

    #[test]
    fn load__corrupt_file_is_an_error() {
        let temp_dir = TempDir::new("admin_key_corrupt").unwrap();
        let path = temp_dir.path().join(ADMIN_KEY_FILE);
        fs::write(&path, b"{ not json").unwrap();

        assert!(AdminKeyStore::open(path).load().is_err());
    }

    #[test]
    fn fingerprint__is_short_and_stable() {
        let record = AdminKeyRecord::new("secret", None::<String>);

        assert_eq!(record.fingerprint().len(), FINGERPRINT_LEN);
        assert_eq!(record.fingerprint(), fingerprint("secret"));
        assert_ne!(fingerprint("secret"), fingerprint("other"));
    }

    #[test]
    fn resolve_store_path__expands_tilde() {
        let home = std::env::var("HOME").unwrap();

        let path = resolve_store_path(Some("~/keys/admin.json")).unwrap();

        assert_eq!(path, PathBuf::from(home).join("keys/admin.json"));
    }
}
