//! # Bundle mount preparation.
//!
//! A bundle directory `B` is laid out as:
//! ```text
//! B/config.json
//! B/rootfs      mount target handed to the runtime
//! B/lower       read-only image contents (read-write mode only)
//! B/tmp         scratch tmpfs for overlay upper/work dirs (read-write mode only)
//! ```
//!
//! - **Read-only**: `B/rootfs` is bind-mounted onto itself so the runtime sees a mount point.
//! - **Read-write**: a private tmpfs on `B/tmp` holds `upper` and `work`; an overlay
//!   of `B/lower` is mounted on `B/rootfs`. Writes vanish when the tmpfs goes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ContainerError;

/// How a bundle's root filesystem is presented to the container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountMode {
    ReadOnly,
    ReadWrite,
}

fn rootfs(bundle: &Path) -> PathBuf {
    bundle.join("rootfs")
}

fn scratch(bundle: &Path) -> PathBuf {
    bundle.join("tmp")
}

/// Overlay mount data for the bundle's read-write layer.
pub(crate) fn overlay_options(bundle: &Path) -> String {
    let tmp = scratch(bundle);
    format!(
        "lowerdir={},upperdir={},workdir={}",
        bundle.join("lower").display(),
        tmp.join("upper").display(),
        tmp.join("work").display(),
    )
}

/// Mounts the bundle according to `mode`.
#[cfg(target_os = "linux")]
pub fn prepare(bundle: &Path, mode: MountMode) -> Result<(), ContainerError> {
    use nix::mount::{MntFlags, MsFlags, mount, umount2};

    let root = rootfs(bundle);
    match mode {
        MountMode::ReadOnly => {
            mount(
                Some(root.as_path()),
                root.as_path(),
                None::<&str>,
                MsFlags::MS_BIND,
                None::<&str>,
            )
            .map_err(|source| mount_err(&root, source))?;
        }
        MountMode::ReadWrite => {
            let tmp = scratch(bundle);
            mount(
                Some("tmpfs"),
                tmp.as_path(),
                Some("tmpfs"),
                MsFlags::empty(),
                Some("size=10%"),
            )
            .map_err(|source| mount_err(&tmp, source))?;
            undo_on_err(overlay(bundle, &tmp, &root), || {
                if let Err(e) = umount2(tmp.as_path(), MntFlags::MNT_DETACH) {
                    tracing::debug!(path = %tmp.display(), error = %e, "scratch tmpfs not released");
                }
            })?;
        }
    }
    Ok(())
}

/// Everything of the read-write layout after the scratch tmpfs is mounted.
#[cfg(target_os = "linux")]
fn overlay(bundle: &Path, tmp: &Path, root: &Path) -> Result<(), ContainerError> {
    use std::os::unix::fs::DirBuilderExt;

    use nix::mount::{MsFlags, mount};

    mount(None::<&str>, tmp, None::<&str>, MsFlags::MS_PRIVATE, None::<&str>)
        .map_err(|source| mount_err(tmp, source))?;

    let mut dirs = std::fs::DirBuilder::new();
    dirs.mode(0o744);
    dirs.create(tmp.join("upper"))?;
    dirs.create(tmp.join("work"))?;

    let opts = overlay_options(bundle);
    mount(
        Some("overlay"),
        root,
        Some("overlay"),
        MsFlags::empty(),
        Some(opts.as_str()),
    )
    .map_err(|source| mount_err(root, source))
}

/// Runs `undo` when `res` is an error, then hands `res` back unchanged.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn undo_on_err<T, E>(res: Result<T, E>, undo: impl FnOnce()) -> Result<T, E> {
    if res.is_err() {
        undo();
    }
    res
}

/// Reverses [`prepare`].
#[cfg(target_os = "linux")]
pub fn cleanup(bundle: &Path, mode: MountMode) -> Result<(), ContainerError> {
    use nix::mount::umount;

    let root = rootfs(bundle);
    umount(root.as_path()).map_err(|source| mount_err(&root, source))?;
    if mode == MountMode::ReadWrite {
        let tmp = scratch(bundle);
        umount(tmp.as_path()).map_err(|source| mount_err(&tmp, source))?;
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn prepare(_bundle: &Path, _mode: MountMode) -> Result<(), ContainerError> {
    Err(ContainerError::Unsupported("bundle mounts require linux"))
}

#[cfg(not(target_os = "linux"))]
pub fn cleanup(_bundle: &Path, _mode: MountMode) -> Result<(), ContainerError> {
    Err(ContainerError::Unsupported("bundle mounts require linux"))
}

#[cfg(target_os = "linux")]
fn mount_err(path: &Path, source: nix::Error) -> ContainerError {
    ContainerError::Mount {
        path: path.to_path_buf(),
        source,
    }
}
