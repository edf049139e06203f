use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::FacturaError;

fn storage(path: &Path, e: impl std::fmt::Display) -> FacturaError {
    FacturaError::Storage(format!("{}: {e}", path.display()))
}

/// Read a JSON document; `None` if the file does not exist.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, FacturaError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&raw).map(Some).map_err(|e| storage(path, e))
}

/// Write pretty JSON through a temporary sibling and a rename.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), FacturaError> {
    let data = serde_json::to_vec_pretty(value).map_err(|e| storage(path, e))?;
    write_atomic(path, &data)
}

pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<(), FacturaError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Like [`write_atomic`], but the file is readable by its owner only from
/// the moment it is created.
pub(crate) fn write_atomic_private(path: &Path, data: &[u8]) -> Result<(), FacturaError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)?;
    Ok(())
}

/// A directory of JSON documents, one file per id.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Open (and create if needed) the directory `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, FacturaError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: &str) -> Result<PathBuf, FacturaError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(FacturaError::NotFound(format!("invalid record id '{id}'")));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    /// Ids of all stored documents, sorted.
    pub fn ids(&self) -> Result<Vec<String>, FacturaError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn list<T: DeserializeOwned>(&self) -> Result<Vec<T>, FacturaError> {
        let mut out = Vec::new();
        for id in self.ids()? {
            if let Some(doc) = self.get(&id)? {
                out.push(doc);
            }
        }
        Ok(out)
    }

    pub fn get<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>, FacturaError> {
        read_json(&self.path(id)?)
    }

    pub fn put<T: Serialize>(&self, id: &str, value: &T) -> Result<(), FacturaError> {
        write_json(&self.path(id)?, value)
    }

    /// Remove `id`; false if it did not exist.
    pub fn delete(&self, id: &str) -> Result<bool, FacturaError> {
        match fs::remove_file(self.path(id)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
