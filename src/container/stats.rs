//! Runtime-reported container state and statistics.
//!
//! Field names follow the JSON emitted by `runc state` and
//! `runc events --stats`; unknown fields are ignored and missing ones default
//! to zero, so snapshots from older or newer runtimes still decode.

use serde::{Deserialize, Serialize};

/// Lifecycle status reported by the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Creating,
    Created,
    Running,
    Paused,
    Stopped,
    #[serde(other)]
    Unknown,
}

/// Output of a liveness check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub id: String,
    #[serde(default)]
    pub pid: i64,
    pub status: ContainerStatus,
}

impl ContainerState {
    #[inline]
    pub fn is_running(&self) -> bool {
        self.status == ContainerStatus::Running
    }
}

/// Point-in-time resource usage of one container.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerStats {
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub pids: PidsStats,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuStats {
    pub usage: CpuUsage,
}

/// Cumulative CPU time in nanoseconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuUsage {
    pub total: u64,
    pub kernel: u64,
    pub user: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStats {
    pub usage: MemoryEntry,
    /// Page cache, bytes.
    pub cache: u64,
}

/// Memory counters in bytes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryEntry {
    pub usage: u64,
    pub limit: u64,
    pub max: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidsStats {
    pub current: u64,
    pub limit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_partial_runc_stats() {
        let raw = r#"{
            "cpu": {"usage": {"total": 1500, "percpu": [700, 800], "kernel": 300, "user": 1200}},
            "memory": {"usage": {"usage": 8192, "limit": 65536, "max": 9000, "failcnt": 0}},
            "pids": {"current": 4}
        }"#;
        let stats: ContainerStats = serde_json::from_str(raw).unwrap();
        assert_eq!(stats.cpu.usage.total, 1500);
        assert_eq!(stats.memory.usage.limit, 65536);
        assert_eq!(stats.memory.cache, 0);
        assert_eq!(stats.pids.current, 4);
        assert_eq!(stats.pids.limit, 0);
    }

    #[test]
    fn unknown_status_does_not_fail() {
        let state: ContainerState =
            serde_json::from_str(r#"{"id":"a","pid":0,"status":"hibernating"}"#).unwrap();
        assert_eq!(state.status, ContainerStatus::Unknown);
        assert!(!state.is_running());
    }
}
