//! Service configuration store.
//!
//! The supervisor consults a [`ServiceStore`] once, at configure time, to learn
//! which services to run. [`FsStore`] reads bundles from a directory.

mod fs;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::container::MountMode;
use crate::error::StoreError;

pub use fs::FsStore;

/// One service to supervise.
#[derive(Clone, Debug)]
pub struct ServiceSpec {
    /// Unique service id, also used as container id.
    pub id: String,
    /// OCI bundle directory.
    pub bundle: PathBuf,
    /// How the bundle's rootfs is mounted when mounting is enabled.
    pub mount: MountMode,
    /// Parsed `config.json` of the bundle.
    pub spec: serde_json::Value,
}

/// Source of the service list.
#[async_trait]
pub trait ServiceStore: Send + Sync + 'static {
    /// Returns every configured service; ids are unique.
    async fn list_services(&self) -> Result<Vec<ServiceSpec>, StoreError>;
}
