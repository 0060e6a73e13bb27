//! Per-environment configuration records.
//!
//! The record is the source of truth for an environment: every operation
//! reconstructs image path, mountpoint, and distro from it rather than from
//! directory scanning. One TOML file per environment, written atomically
//! (temp file in the same directory, then rename) so readers never observe
//! a partial record.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::distro::Distro;
use crate::error::{Error, Result};

/// The central entity: one disk-image-backed environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Environment {
    pub name: String,
    pub distro: Distro,
    pub image: PathBuf,
    pub mountpoint: PathBuf,
    pub size_mb: u64,
}

/// On-disk shape: the record lives under a single `[environment]` section.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordFile {
    environment: Environment,
}

/// Directory of per-environment record files.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// Open the store at `dir`, creating the directory if missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.toml"))
    }

    /// Write or overwrite the record for `env.name`.
    pub fn save(&self, env: &Environment) -> Result<()> {
        let body = toml::to_string_pretty(&RecordFile {
            environment: env.clone(),
        })
        .map_err(|e| Error::ConfigCorrupt {
            name: env.name.clone(),
            detail: format!("serializing record: {e}"),
        })?;

        let path = self.record_path(&env.name);
        let tmp = self.dir.join(tmp_name(&env.name));
        fs::write(&tmp, body)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Load the record for `name`.
    pub fn load(&self, name: &str) -> Result<Environment> {
        let path = self.record_path(name);
        let body = match fs::read_to_string(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let record: RecordFile = toml::from_str(&body).map_err(|e| Error::ConfigCorrupt {
            name: name.to_string(),
            detail: e.to_string(),
        })?;

        let env = record.environment;
        if env.name != name {
            return Err(Error::ConfigCorrupt {
                name: name.to_string(),
                detail: format!("record names a different environment '{}'", env.name),
            });
        }
        Ok(env)
    }

    /// Names of all known environments, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("toml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove the record for `name`.
    pub fn delete(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.record_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::ConfigNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.record_path(name).exists()
    }
}

fn tmp_name(name: &str) -> String {
    let n = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!(".{name}.toml.tmp-{n}")
}
