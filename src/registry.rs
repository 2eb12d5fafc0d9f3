//! Process registry: the single source of truth for which processes exist,
//! which core (if any) they occupy, and whether they've finished.

use crate::process::{CoreId, Process, ProcessId};
use std::collections::HashMap;
use std::sync::Mutex;

struct Inner {
    running: HashMap<ProcessId, Process>,
    finished: HashMap<ProcessId, Process>,
    next_id: ProcessId,
}

pub struct ProcessRegistry {
    inner: Mutex<Inner>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                running: HashMap::new(),
                finished: HashMap::new(),
                next_id: ProcessId::first(),
            }),
        }
    }

    /// Mints the next process id. Ids are never reused, even across
    /// finished processes.
    pub fn next_id(&self) -> ProcessId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id = id.next();
        id
    }

    /// No-op if `process.id` is already tracked (running or finished).
    pub fn insert(&self, process: Process) {
        let mut inner = self.inner.lock().unwrap();
        if inner.running.contains_key(&process.id) || inner.finished.contains_key(&process.id) {
            return;
        }
        inner.running.insert(process.id, process);
    }

    /// Moves a process from the running set to the finished set.
    pub fn mark_finished(&self, id: ProcessId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(process) = inner.running.remove(&id) {
            inner.finished.insert(id, process);
        }
    }

    pub fn get(&self, id: ProcessId) -> Option<Process> {
        let inner = self.inner.lock().unwrap();
        inner.running.get(&id).or_else(|| inner.finished.get(&id)).cloned()
    }

    /// Runs `f` against the live process without cloning it out. Used by
    /// worker threads to execute instructions in place.
    pub fn with_running_mut<R>(&self, id: ProcessId, f: impl FnOnce(&mut Process) -> R) -> Option<R> {
        let mut inner = self.inner.lock().unwrap();
        inner.running.get_mut(&id).map(f)
    }

    pub fn all(&self) -> Vec<Process> {
        let inner = self.inner.lock().unwrap();
        inner.running.values().chain(inner.finished.values()).cloned().collect()
    }

    pub fn running(&self) -> Vec<Process> {
        let inner = self.inner.lock().unwrap();
        inner.running.values().cloned().collect()
    }

    pub fn finished(&self) -> Vec<Process> {
        let inner = self.inner.lock().unwrap();
        inner.finished.values().cloned().collect()
    }

    pub fn by_core(&self, core: CoreId) -> Option<Process> {
        let inner = self.inner.lock().unwrap();
        inner.running.values().find(|p| p.assigned_core == Some(core)).cloned()
    }

    /// True if some running, not-yet-finished process is currently assigned
    /// to `core`.
    pub fn has_unfinished_on_core(&self, core: CoreId) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.running.values().any(|p| p.assigned_core == Some(core) && !p.finished)
    }

    pub fn active_per_core(&self, total_cores: usize) -> Vec<bool> {
        let inner = self.inner.lock().unwrap();
        let mut active = vec![false; total_cores];
        for process in inner.running.values() {
            if let Some(core) = process.assigned_core {
                if core < total_cores {
                    active[core] = true;
                }
            }
        }
        active
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Instruction;

    fn blank(id: ProcessId) -> Process {
        Process::new(id, format!("p{}", id.as_u64()), 64, vec![Instruction::Print { message: "hi".into() }])
    }

    #[test]
    fn ids_never_repeat() {
        let reg = ProcessRegistry::new();
        let a = reg.next_id();
        let b = reg.next_id();
        assert_ne!(a, b);
    }

    #[test]
    fn duplicate_insert_is_idempotent() {
        let reg = ProcessRegistry::new();
        let id = reg.next_id();
        reg.insert(blank(id));
        reg.insert(blank(id));
        assert_eq!(reg.running().len(), 1);
    }

    #[test]
    fn mark_finished_moves_between_lists() {
        let reg = ProcessRegistry::new();
        let id = reg.next_id();
        reg.insert(blank(id));
        reg.mark_finished(id);
        assert!(reg.running().is_empty());
        assert_eq!(reg.finished().len(), 1);
    }

    #[test]
    fn active_per_core_reflects_assignment() {
        let reg = ProcessRegistry::new();
        let id = reg.next_id();
        let mut p = blank(id);
        p.assigned_core = Some(1);
        reg.insert(p);
        let active = reg.active_per_core(2);
        assert_eq!(active, vec![false, true]);
    }

    #[test]
    fn has_unfinished_on_core_ignores_other_cores_and_finished_processes() {
        let reg = ProcessRegistry::new();
        let id = reg.next_id();
        let mut p = blank(id);
        p.assigned_core = Some(0);
        reg.insert(p);
        assert!(reg.has_unfinished_on_core(0));
        assert!(!reg.has_unfinished_on_core(1));
        reg.mark_finished(id);
        assert!(!reg.has_unfinished_on_core(0));
    }
}
