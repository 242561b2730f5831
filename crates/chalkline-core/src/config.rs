//! On-disk layout for persisted sessions.
//!
//! Sessions live under the user configuration directory, one subdirectory
//! per profile, each holding the individual session entries. This module
//! owns the filesystem policy: where entries go, when directories are
//! created, and the user-only permissions applied to everything written.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;

const QUALIFIER: &str = "app";
const ORGANIZATION: &str = "chalkline";
const APPLICATION: &str = "chalkline-rs";

/// Maps profiles to the directories and files their session entries live in.
///
/// Nothing is created at discovery time; directories appear on the first
/// write to a profile. Directories are created 0o700 and entries 0o600 on
/// Unix, since every entry is credential material.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    root: PathBuf,
}

impl SessionPaths {
    /// Locate the session root under the user configuration directory.
    pub fn discover() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
            .ok_or(ConfigError::NoConfigDirectory)?;
        Ok(Self {
            root: dirs.config_dir().join("sessions"),
        })
    }

    pub fn profile_dir(&self, profile: &str) -> PathBuf {
        self.root.join(profile)
    }

    /// Write one entry, creating the profile directory on first use.
    pub fn write_entry(&self, profile: &str, entry: &str, payload: &str) -> Result<(), ConfigError> {
        let dir = self.profile_dir(profile);
        fs::create_dir_all(&dir).map_err(|source| ConfigError::Create {
            path: dir.clone(),
            source,
        })?;
        restrict_to_user(&dir, 0o700)?;

        let path = dir.join(entry);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| ConfigError::Create {
                path: path.clone(),
                source,
            })?;
        file.write_all(payload.as_bytes())
            .map_err(|source| ConfigError::Write {
                path: path.clone(),
                source,
            })?;
        restrict_to_user(&path, 0o600)
    }

    /// Read one entry. Absent entries are `None`, not an error.
    pub fn read_entry(&self, profile: &str, entry: &str) -> Result<Option<String>, ConfigError> {
        let path = self.profile_dir(profile).join(entry);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    /// Remove every entry for a profile. Removing a profile that was never
    /// written is fine.
    pub fn remove_profile(&self, profile: &str) -> Result<(), ConfigError> {
        let dir = self.profile_dir(profile);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ConfigError::Remove { path: dir, source }),
        }
    }

    #[cfg(test)]
    pub(crate) fn from_root_for_tests(root: PathBuf) -> Self {
        Self { root }
    }
}

fn restrict_to_user(path: &Path, mode: u32) -> Result<(), ConfigError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| {
            ConfigError::Permissions {
                path: path.to_path_buf(),
                source,
            }
        })?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

/// Failures while reading or writing the session layout.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no user configuration directory available on this system")]
    NoConfigDirectory,
    #[error("failed to create {}: {source}", path.display())]
    Create { path: PathBuf, source: io::Error },
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to remove {}: {source}", path.display())]
    Remove { path: PathBuf, source: io::Error },
    #[error("failed to restrict permissions on {}: {source}", path.display())]
    Permissions { path: PathBuf, source: io::Error },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn entries_round_trip_per_profile() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SessionPaths::from_root_for_tests(temp_dir.path().to_path_buf());

        paths.write_entry("default", "access.credential", "acc-1").unwrap();
        paths.write_entry("work", "access.credential", "acc-2").unwrap();

        assert_eq!(
            paths.read_entry("default", "access.credential").unwrap(),
            Some("acc-1".to_owned())
        );
        assert_eq!(
            paths.read_entry("work", "access.credential").unwrap(),
            Some("acc-2".to_owned())
        );
    }

    #[test]
    fn absent_entries_read_as_none() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SessionPaths::from_root_for_tests(temp_dir.path().to_path_buf());
        assert_eq!(paths.read_entry("default", "access.credential").unwrap(), None);
    }

    #[test]
    fn removing_an_unwritten_profile_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SessionPaths::from_root_for_tests(temp_dir.path().to_path_buf());
        paths.remove_profile("default").unwrap();

        paths.write_entry("default", "access.credential", "acc-1").unwrap();
        paths.remove_profile("default").unwrap();
        assert!(!paths.profile_dir("default").exists());
    }

    #[cfg(unix)]
    #[test]
    fn written_entries_are_user_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let paths = SessionPaths::from_root_for_tests(temp_dir.path().to_path_buf());
        paths.write_entry("default", "access.credential", "acc-1").unwrap();

        let dir_mode = std::fs::metadata(paths.profile_dir("default"))
            .unwrap()
            .permissions()
            .mode();
        let entry_mode = std::fs::metadata(paths.profile_dir("default").join("access.credential"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);
        assert_eq!(entry_mode & 0o777, 0o600);
    }
}
