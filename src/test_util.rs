//! Fake extractor/transcoder scripts for process tests.
//!
//! Scripts are run through `sh <path>` rather than executed directly, which
//! avoids ETXTBSY races with other tests writing files concurrently.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use tempfile::TempDir;

use crate::config::Tool;

pub fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
  let path = dir.path().join(format!("{name}.sh"));
  std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
  path
}

pub fn sh_tool(path: &Path) -> Tool {
  Tool::new("sh", [path.to_string_lossy().into_owned()])
}

/// A script that records its own invocation in `<path>.spawned` before
/// running `body`.
pub fn marked_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
  script(dir, name, &format!("touch \"$0.spawned\"\n{body}"))
}

pub fn was_spawned(path: &Path) -> bool {
  let mut marker = path.as_os_str().to_owned();
  marker.push(".spawned");
  Path::new(&marker).exists()
}

/// Polls until `pid` no longer exists (killed and reaped).
#[cfg(target_os = "linux")]
pub async fn wait_gone(pid: u32, timeout: Duration) -> bool {
  let deadline = tokio::time::Instant::now() + timeout;
  let proc_dir = PathBuf::from(format!("/proc/{pid}"));

  while tokio::time::Instant::now() < deadline {
    if !proc_dir.exists() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
  }

  false
}
