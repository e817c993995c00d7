//! Host application run state: not running, running in the background, or in the foreground.
//!
//! The production probe walks procfs; [`FixedStateProbe`] reports a fixed state for tests
//! and for hosts that know their own state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppState {
    NotRunning,
    Background,
    Foreground,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppState::NotRunning => "not-running",
            AppState::Background => "background",
            AppState::Foreground => "foreground",
        };
        f.write_str(s)
    }
}

impl FromStr for AppState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "not-running" => Ok(AppState::NotRunning),
            "background" => Ok(AppState::Background),
            "foreground" => Ok(AppState::Foreground),
            other => Err(format!("unknown app state: {}", other)),
        }
    }
}

/// Computes the run state fresh on every call; implementations must not cache.
pub trait AppStateProbe: Send + Sync {
    fn current_state(&self) -> AppState;
}

/// Always reports the same state.
#[derive(Debug, Clone, Copy)]
pub struct FixedStateProbe(pub AppState);

impl AppStateProbe for FixedStateProbe {
    fn current_state(&self) -> AppState {
        self.0
    }
}

/// Finds the first process (lowest pid) whose name matches and checks whether its process
/// group owns the controlling terminal's foreground.
pub struct ProcfsProbe {
    proc_root: PathBuf,
    process_name: String,
}

impl ProcfsProbe {
    pub fn new(proc_root: impl Into<PathBuf>, process_name: impl Into<String>) -> Self {
        Self {
            proc_root: proc_root.into(),
            process_name: process_name.into(),
        }
    }

    fn find_process(&self) -> std::io::Result<Option<u32>> {
        let mut pids: Vec<u32> = std::fs::read_dir(&self.proc_root)?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().and_then(|n| n.parse().ok()))
            .collect();
        pids.sort_unstable();
        Ok(pids
            .into_iter()
            .find(|pid| self.name_matches(&self.proc_root.join(pid.to_string()))))
    }

    fn name_matches(&self, dir: &Path) -> bool {
        // Processes may exit mid-scan; unreadable entries simply don't match.
        if let Ok(raw) = std::fs::read(dir.join("cmdline")) {
            let argv0 = raw.split(|b| *b == 0).next().unwrap_or_default();
            let argv0 = String::from_utf8_lossy(argv0);
            let base = Path::new(&*argv0)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            if !base.is_empty() && base == self.process_name {
                return true;
            }
        }
        std::fs::read_to_string(dir.join("comm"))
            .map(|c| c.trim_end() == self.process_name)
            .unwrap_or(false)
    }

    fn is_foreground(&self, pid: u32) -> std::io::Result<bool> {
        let stat = std::fs::read_to_string(self.proc_root.join(pid.to_string()).join("stat"))?;
        parse_foreground(&stat).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed stat line")
        })
    }
}

/// `pid (comm) state ppid pgrp session tty_nr tpgid ...`; comm may contain spaces or parens.
fn parse_foreground(stat: &str) -> Option<bool> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let pgrp: i64 = fields.get(2)?.parse().ok()?;
    let tpgid: i64 = fields.get(5)?.parse().ok()?;
    Some(tpgid > 0 && pgrp == tpgid)
}

impl AppStateProbe for ProcfsProbe {
    fn current_state(&self) -> AppState {
        let pid = match self.find_process() {
            Ok(Some(pid)) => pid,
            Ok(None) => return AppState::NotRunning,
            Err(e) => {
                log::warn!(
                    "process enumeration under {} failed: {}",
                    self.proc_root.display(),
                    e
                );
                return AppState::NotRunning;
            }
        };
        match self.is_foreground(pid) {
            Ok(true) => AppState::Foreground,
            Ok(false) => AppState::Background,
            Err(e) => {
                log::warn!("reading state of pid {} failed: {}", pid, e);
                AppState::NotRunning
            }
        }
    }
}
