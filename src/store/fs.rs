//! # Directory-backed service store.
//!
//! ```text
//! services_dir/
//!   ├── web/config.json     → ServiceSpec { id: "web", bundle: services_dir/web, .. }
//!   └── db/config.json      → ServiceSpec { id: "db",  bundle: services_dir/db,  .. }
//! ```
//!
//! A bundle whose `config.json` has `root.readonly = true` is mounted
//! read-only; all others get a read-write overlay. Non-directory entries are
//! skipped.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{ServiceSpec, ServiceStore};
use crate::container::MountMode;
use crate::error::StoreError;

/// Reads one service per sub-directory of `services_dir`.
#[derive(Clone, Debug)]
pub struct FsStore {
    services_dir: PathBuf,
}

impl FsStore {
    pub fn new(services_dir: impl Into<PathBuf>) -> Self {
        Self {
            services_dir: services_dir.into(),
        }
    }

    async fn load(&self, bundle: PathBuf, id: String) -> Result<ServiceSpec, StoreError> {
        let path = bundle.join("config.json");
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|source| StoreError::ReadSpec {
                path: path.clone(),
                source,
            })?;
        let spec: serde_json::Value = serde_json::from_slice(&raw)
            .map_err(|source| StoreError::InvalidSpec { path, source })?;

        Ok(ServiceSpec {
            mount: mount_mode(&spec),
            id,
            bundle,
            spec,
        })
    }
}

fn mount_mode(spec: &serde_json::Value) -> MountMode {
    let readonly = spec
        .pointer("/root/readonly")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    if readonly {
        MountMode::ReadOnly
    } else {
        MountMode::ReadWrite
    }
}

fn read_dir_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::ReadDir {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl ServiceStore for FsStore {
    async fn list_services(&self) -> Result<Vec<ServiceSpec>, StoreError> {
        let dir = &self.services_dir;
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| read_dir_err(dir, e))?;

        let mut services = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| read_dir_err(dir, e))? {
            let file_type = entry.file_type().await.map_err(|e| read_dir_err(dir, e))?;
            if !file_type.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            services.push(self.load(entry.path(), id).await?);
        }

        services.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(services)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(root: &Path, id: &str, config: &str) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.json"), config).unwrap();
    }

    #[tokio::test]
    async fn lists_bundles_sorted_with_mount_modes() {
        let dir = tempfile::tempdir().unwrap();
        bundle(dir.path(), "web", r#"{"ociVersion":"1.0.2","root":{"path":"rootfs","readonly":true}}"#);
        bundle(dir.path(), "db", r#"{"ociVersion":"1.0.2","root":{"path":"rootfs"}}"#);
        std::fs::write(dir.path().join("README"), "not a bundle").unwrap();

        let services = FsStore::new(dir.path()).list_services().await.unwrap();
        let ids: Vec<&str> = services.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["db", "web"]);

        assert_eq!(services[0].mount, MountMode::ReadWrite);
        assert_eq!(services[1].mount, MountMode::ReadOnly);
        assert_eq!(services[1].bundle, dir.path().join("web"));
        assert_eq!(services[1].spec["ociVersion"], "1.0.2");
    }

    #[tokio::test]
    async fn missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();

        let err = FsStore::new(dir.path()).list_services().await.unwrap_err();
        assert_eq!(err.as_label(), "store_read_spec");
    }

    #[tokio::test]
    async fn invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        bundle(dir.path(), "bad", "{not json");

        let err = FsStore::new(dir.path()).list_services().await.unwrap_err();
        assert_eq!(err.as_label(), "store_invalid_spec");
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsStore::new(dir.path().join("nope"))
            .list_services()
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "store_read_dir");
    }
}
