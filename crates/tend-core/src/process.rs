//! OS process table queries.
//!
//! Liveness uses signal 0; parent and name lookups go through sysinfo so the
//! same code works on Linux and macOS.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

/// How far up the ancestor chain we look for the assistant process.
const MAX_ANCESTOR_DEPTH: usize = 32;
/// Upper bound on descendants visited when searching a pane's process tree.
const MAX_TREE_NODES: usize = 256;

/// Process table operations consumed by tend.
pub trait ProcessTable: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
    fn parent(&self, pid: u32) -> Option<u32>;
    fn name(&self, pid: u32) -> Option<String>;
    fn children(&self, pid: u32) -> Vec<u32>;
}

/// Does `name` look like one of the configured assistant process names?
pub fn name_matches(name: &str, wanted: &[String]) -> bool {
    let base = name.rsplit('/').next().unwrap_or(name);
    wanted.iter().any(|w| base == w || base.starts_with(&format!("{}-", w)))
}

/// Walk from `start` up through its ancestors and return the first process
/// whose name matches. `start` itself is checked first.
pub fn find_ancestor(procs: &dyn ProcessTable, start: u32, names: &[String]) -> Option<u32> {
    let mut current = start;
    for _ in 0..MAX_ANCESTOR_DEPTH {
        if current <= 1 {
            return None;
        }
        if procs.name(current).is_some_and(|n| name_matches(&n, names)) {
            return Some(current);
        }
        current = procs.parent(current)?;
    }
    None
}

/// Breadth-first search of `root` and its descendants for a matching name.
pub fn find_in_tree(procs: &dyn ProcessTable, root: u32, names: &[String]) -> Option<u32> {
    let mut queue = VecDeque::from([root]);
    let mut seen = HashSet::new();
    while let Some(pid) = queue.pop_front() {
        if !seen.insert(pid) || seen.len() > MAX_TREE_NODES {
            continue;
        }
        if procs.name(pid).is_some_and(|n| name_matches(&n, names)) {
            return Some(pid);
        }
        queue.extend(procs.children(pid));
    }
    None
}

/// The live OS process table.
pub struct SystemProcesses {
    system: Mutex<System>,
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl SystemProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_process<T>(&self, pid: u32, f: impl FnOnce(&sysinfo::Process) -> T) -> Option<T> {
        let mut system = self.system.lock().ok()?;
        let pid = Pid::from_u32(pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(f)
    }
}

impl ProcessTable for SystemProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 || pid > i32::MAX as u32 {
            return false;
        }
        // On Unix, sending signal 0 checks if process exists
        let exists = unsafe { libc::kill(pid as i32, 0) == 0 }
            || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM);
        if !exists {
            return false;
        }
        // A zombie has exited; it just has not been reaped yet.
        self.with_process(pid, |p| p.status() != ProcessStatus::Zombie)
            .unwrap_or(true)
    }

    fn parent(&self, pid: u32) -> Option<u32> {
        self.with_process(pid, |p| p.parent().map(|pp| pp.as_u32()))
            .flatten()
    }

    fn name(&self, pid: u32) -> Option<String> {
        self.with_process(pid, |p| p.name().to_string_lossy().to_string())
    }

    fn children(&self, pid: u32) -> Vec<u32> {
        let Ok(mut system) = self.system.lock() else {
            return Vec::new();
        };
        system.refresh_processes(ProcessesToUpdate::All, true);
        let parent = Pid::from_u32(pid);
        let mut children: Vec<u32> = system
            .processes()
            .iter()
            .filter(|(_, p)| p.parent() == Some(parent))
            .map(|(child, _)| child.as_u32())
            .collect();
        children.sort_unstable();
        children
    }
}
