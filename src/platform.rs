//! # Platform Collaborators
//!
//! Traits for the host checks and services the session controller depends on,
//! with desktop implementations used by the binary.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Storage and location permission checks
#[cfg_attr(test, mockall::automock)]
pub trait PermissionChecker: Send + Sync {
    fn has_storage_permission(&self) -> bool;
    fn has_location_permission(&self) -> bool;
}

/// Storage availability checks
#[cfg_attr(test, mockall::automock)]
pub trait StorageChecker: Send + Sync {
    fn is_readable(&self) -> bool;
    fn is_writable(&self) -> bool;
}

/// Receives finished session files
///
/// Failures are the uploader's concern; the controller never observes them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, path: PathBuf);
}

/// Desktop hosts have no permission model; everything is granted
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopPermissions;

impl PermissionChecker for DesktopPermissions {
    fn has_storage_permission(&self) -> bool {
        true
    }

    fn has_location_permission(&self) -> bool {
        true
    }
}

/// Checks that the log directory, or the nearest existing parent it would be
/// created under, is usable
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    dir: PathBuf,
}

impl DirectoryStorage {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    fn existing_dir(&self) -> Option<&Path> {
        self.dir
            .ancestors()
            .find(|p| p.exists())
            .filter(|p| p.is_dir())
    }
}

impl StorageChecker for DirectoryStorage {
    fn is_readable(&self) -> bool {
        self.existing_dir()
            .map(|dir| fs::read_dir(dir).is_ok())
            .unwrap_or(false)
    }

    fn is_writable(&self) -> bool {
        self.existing_dir()
            .and_then(|dir| fs::metadata(dir).ok())
            .map(|meta| !meta.permissions().readonly())
            .unwrap_or(false)
    }
}

/// Copies finished session files into an upload directory
#[derive(Debug, Clone)]
pub struct DirectoryUploader {
    dest: PathBuf,
}

impl DirectoryUploader {
    pub fn new<P: Into<PathBuf>>(dest: P) -> Self {
        Self { dest: dest.into() }
    }
}

#[async_trait]
impl Uploader for DirectoryUploader {
    async fn upload(&self, path: PathBuf) {
        let Some(file_name) = path.file_name() else {
            warn!("Cannot upload {}: no file name", path.display());
            return;
        };
        let target = self.dest.join(file_name);

        if let Err(e) = tokio::fs::create_dir_all(&self.dest).await {
            warn!("Failed to create upload directory {}: {}", self.dest.display(), e);
            return;
        }

        match tokio::fs::copy(&path, &target).await {
            Ok(bytes) => info!("Uploaded {} ({} bytes) to {}", path.display(), bytes, target.display()),
            Err(e) => warn!("Failed to upload {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_desktop_permissions_granted() {
        let permissions = DesktopPermissions;
        assert!(permissions.has_storage_permission());
        assert!(permissions.has_location_permission());
    }

    #[test]
    fn test_directory_storage_existing_dir() {
        let dir = TempDir::new().unwrap();
        let storage = DirectoryStorage::new(dir.path());
        assert!(storage.is_readable());
        assert!(storage.is_writable());
    }

    #[test]
    fn test_directory_storage_missing_dir_uses_parent() {
        let dir = TempDir::new().unwrap();
        let storage = DirectoryStorage::new(dir.path().join("logs").join("2024"));
        assert!(storage.is_readable());
        assert!(storage.is_writable());
    }

    #[test]
    fn test_directory_storage_under_a_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, "x").unwrap();

        let storage = DirectoryStorage::new(file.join("logs"));
        assert!(!storage.is_readable());
        assert!(!storage.is_writable());
    }

    #[tokio::test]
    async fn test_directory_uploader_copies_file() {
        let src_dir = TempDir::new().unwrap();
        let dest_dir = TempDir::new().unwrap();
        let src = src_dir.path().join("2024_01_01_10_00_00.csv");
        fs::write(&src, "date,time\n").unwrap();

        let uploader = DirectoryUploader::new(dest_dir.path().join("outbox"));
        uploader.upload(src.clone()).await;

        let copied = dest_dir.path().join("outbox").join("2024_01_01_10_00_00.csv");
        assert_eq!(fs::read_to_string(copied).unwrap(), "date,time\n");
    }

    #[tokio::test]
    async fn test_directory_uploader_missing_source_is_swallowed() {
        let dest_dir = TempDir::new().unwrap();
        let uploader = DirectoryUploader::new(dest_dir.path());

        // Must not panic; failure is only logged
        uploader.upload(dest_dir.path().join("missing.csv")).await;
        assert!(!dest_dir.path().join("missing.csv").exists());
    }
}
