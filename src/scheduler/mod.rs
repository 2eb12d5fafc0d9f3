//! The scheduler core: ready/sleeping/waiting queues, a supervisor thread,
//! `num_cpu` worker threads, and the two dispatch policies.

mod queues;

pub use queues::Queues;

use crate::config::Config;
use crate::paging::PagingEngine;
use crate::process::{CoreId, ExecOutcome, Process, ProcessId};
use crate::registry::ProcessRegistry;
use chrono::Local;
use log::{debug, info, trace, warn};
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Maximum page-fault retries before a worker idles and tries again later.
const FAULT_RETRY_LIMIT: u32 = 5;
const FAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);
const SUPERVISOR_TICK: Duration = Duration::from_millis(10);
const WAIT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingPolicy {
    Fcfs,
    RoundRobin { quantum: u32 },
}

struct CoreTurn {
    next: CoreId,
}

enum StepOutcome {
    Finished,
    Slept,
    QuantumExpired,
    FaultStall,
}

pub struct Scheduler {
    policy: SchedulingPolicy,
    num_cpu: usize,
    delay_per_exec_ms: u64,
    mem_per_frame: usize,
    process_log_dir: PathBuf,
    registry: Arc<ProcessRegistry>,
    pager: Arc<PagingEngine>,
    queues: Mutex<Queues>,
    cv: Condvar,
    core_turn: Mutex<CoreTurn>,
    core_turn_cv: Condvar,
    running: AtomicBool,
    total_ticks: AtomicU64,
    active_ticks: AtomicU64,
    idle_ticks: AtomicU64,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Builds its own registry and paging engine, then spawns the
    /// supervisor and `num_cpu` worker threads. Worker threads run for the
    /// lifetime of the process, independent of `scheduler-start`/`-stop`
    /// (the `scheduler-start`/`-stop` commands control the random generator,
    /// not these threads).
    pub fn new(config: &Config) -> std::io::Result<Arc<Self>> {
        let registry = Arc::new(ProcessRegistry::new());
        let pager = Arc::new(
            PagingEngine::new(
                config.max_overall_mem,
                config.mem_per_frame,
                &config.backing_store_path,
                &config.paging_log_path,
            )
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?,
        );
        fs::create_dir_all(&config.process_log_dir)?;

        let scheduler = Arc::new(Self {
            policy: config.scheduler_policy(),
            num_cpu: config.num_cpu,
            delay_per_exec_ms: config.delay_per_exec_ms,
            mem_per_frame: config.mem_per_frame,
            process_log_dir: config.process_log_dir.clone(),
            registry,
            pager,
            queues: Mutex::new(Queues::new()),
            cv: Condvar::new(),
            core_turn: Mutex::new(CoreTurn { next: 0 }),
            core_turn_cv: Condvar::new(),
            running: AtomicBool::new(true),
            total_ticks: AtomicU64::new(0),
            active_ticks: AtomicU64::new(0),
            idle_ticks: AtomicU64::new(0),
            threads: Mutex::new(Vec::new()),
        });

        let supervisor = {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || scheduler.supervisor_loop())
        };
        let mut handles = vec![supervisor];
        for core_id in 0..config.num_cpu {
            let scheduler = Arc::clone(&scheduler);
            handles.push(thread::spawn(move || scheduler.worker_loop(core_id)));
        }
        *scheduler.threads.lock().unwrap() = handles;

        Ok(scheduler)
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    pub fn pager(&self) -> &Arc<PagingEngine> {
        &self.pager
    }

    pub fn num_cpu(&self) -> usize {
        self.num_cpu
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_ticks.load(Ordering::Relaxed)
    }

    pub fn active_ticks(&self) -> u64 {
        self.active_ticks.load(Ordering::Relaxed)
    }

    pub fn idle_ticks(&self) -> u64 {
        self.idle_ticks.load(Ordering::Relaxed)
    }

    /// Computes page demand, attempts admission, and pushes the process to
    /// the ready or waiting queue. Never blocks the caller.
    pub fn add_process(&self, mut process: Process) -> bool {
        let pages_needed = process.memory_required.div_ceil(self.mem_per_frame).max(1);
        let admitted = self.try_admit(&mut process, pages_needed);
        let id = process.id;
        info!("admitting process {id} ({} pages needed): {admitted}", pages_needed);
        self.registry.insert(process);
        {
            let mut queues = self.queues.lock().unwrap();
            if admitted {
                queues.ready_queue.push_back(id);
            } else {
                queues.waiting_queue.push_back(id);
            }
        }
        self.cv.notify_all();
        admitted
    }

    fn try_admit(&self, process: &mut Process, pages_needed: usize) -> bool {
        let mut reserved = Vec::with_capacity(pages_needed);
        for _ in 0..pages_needed {
            match self.pager.next_global_page_id() {
                Ok(id) => reserved.push(id),
                Err(_) => {
                    self.pager.register_process_pages(process.id, reserved);
                    self.pager.release_process_pages(process.id);
                    return false;
                },
            }
        }
        for &page_id in &reserved {
            self.pager.initialize_page_data(page_id, format!("DefaultData_PAGE{page_id}"));
        }
        self.pager.register_process_pages(process.id, reserved.clone());
        process.assigned_pages = reserved;
        true
    }

    fn retry_admission(&self, pid: ProcessId) -> bool {
        let mem_per_frame = self.mem_per_frame;
        self.registry
            .with_running_mut(pid, |p| {
                let pages_needed = p.memory_required.div_ceil(mem_per_frame).max(1);
                self.try_admit(p, pages_needed)
            })
            .unwrap_or(false)
    }

    /// Stops the dispatch loops and joins every thread. Already-running
    /// instructions complete; nothing is cancelled mid-instruction.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.cv.notify_all();
        self.core_turn_cv.notify_all();
        let handles = std::mem::take(&mut *self.threads.lock().unwrap());
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn supervisor_loop(&self) {
        while self.running.load(Ordering::Acquire) {
            self.advance_sleeping();
            self.drain_waiting();
            self.cv.notify_all();
            thread::sleep(SUPERVISOR_TICK);
            self.total_ticks.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn advance_sleeping(&self) {
        let sleeping: Vec<ProcessId> = {
            let mut queues = self.queues.lock().unwrap();
            std::mem::take(&mut queues.sleeping_list)
        };
        let mut still_sleeping = Vec::new();
        let mut woken = Vec::new();
        for pid in sleeping {
            let done = self
                .registry
                .with_running_mut(pid, |p| {
                    p.sleep_ticks_remaining = p.sleep_ticks_remaining.saturating_sub(1);
                    p.sleep_ticks_remaining == 0
                })
                .unwrap_or(true);
            if done {
                woken.push(pid);
            } else {
                still_sleeping.push(pid);
            }
        }
        let mut queues = self.queues.lock().unwrap();
        queues.sleeping_list.extend(still_sleeping);
        queues.ready_queue.extend(woken);
    }

    fn drain_waiting(&self) {
        let waiting: VecDeque<ProcessId> = {
            let mut queues = self.queues.lock().unwrap();
            std::mem::take(&mut queues.waiting_queue)
        };
        for pid in waiting {
            if self.retry_admission(pid) {
                debug!("admission retry succeeded for process {pid}");
                self.queues.lock().unwrap().ready_queue.push_back(pid);
            } else {
                self.queues.lock().unwrap().waiting_queue.push_back(pid);
            }
        }
    }

    fn worker_loop(&self, core_id: CoreId) {
        match self.policy {
            SchedulingPolicy::Fcfs => self.fcfs_worker_loop(core_id),
            SchedulingPolicy::RoundRobin { quantum } => self.round_robin_worker_loop(core_id, quantum),
        }
    }

    fn pop_ready_blocking(&self) -> Option<ProcessId> {
        let mut queues = self.queues.lock().unwrap();
        while self.running.load(Ordering::Acquire) {
            if let Some(pid) = queues.ready_queue.pop_front() {
                return Some(pid);
            }
            let (guard, _) = self.cv.wait_timeout(queues, WAIT_POLL).unwrap();
            queues = guard;
        }
        None
    }

    fn fcfs_worker_loop(&self, core_id: CoreId) {
        while self.running.load(Ordering::Acquire) {
            let Some(pid) = self.pop_ready_blocking() else { break };
            self.dispatch(pid, core_id);
            match self.execute(pid, core_id, None) {
                StepOutcome::Finished => self.finalize(pid, core_id),
                StepOutcome::Slept => self.put_to_sleep(pid),
                StepOutcome::FaultStall => self.requeue(pid),
                StepOutcome::QuantumExpired => unreachable!("FCFS never sets a quantum"),
            }
        }
    }

    fn round_robin_worker_loop(&self, core_id: CoreId, quantum: u32) {
        while self.running.load(Ordering::Acquire) {
            self.wait_for_turn(core_id);
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            let pid = self.queues.lock().unwrap().ready_queue.pop_front();
            match pid {
                Some(pid) => {
                    self.dispatch(pid, core_id);
                    match self.execute(pid, core_id, Some(quantum)) {
                        StepOutcome::Finished => self.finalize(pid, core_id),
                        StepOutcome::Slept => self.put_to_sleep(pid),
                        StepOutcome::QuantumExpired | StepOutcome::FaultStall => self.requeue(pid),
                    }
                },
                None => thread::sleep(WAIT_POLL),
            }
            self.advance_turn(core_id);
        }
    }

    fn wait_for_turn(&self, core_id: CoreId) {
        let mut turn = self.core_turn.lock().unwrap();
        while self.running.load(Ordering::Acquire) && turn.next != core_id {
            let (guard, _) = self.core_turn_cv.wait_timeout(turn, WAIT_POLL).unwrap();
            turn = guard;
        }
    }

    fn advance_turn(&self, core_id: CoreId) {
        let mut turn = self.core_turn.lock().unwrap();
        turn.next = (core_id + 1) % self.num_cpu;
        self.core_turn_cv.notify_all();
    }

    /// Each core's own worker thread is the only writer of its `assigned_core`
    /// slot, so unlike the ready/sleeping/waiting queues this needs no
    /// separate per-core availability flag: the thread itself *is* the
    /// eligibility gate.
    fn dispatch(&self, pid: ProcessId, core_id: CoreId) {
        self.registry.with_running_mut(pid, |p| p.assigned_core = Some(core_id));
    }

    fn requeue(&self, pid: ProcessId) {
        self.registry.with_running_mut(pid, |p| p.assigned_core = None);
        self.queues.lock().unwrap().ready_queue.push_back(pid);
    }

    fn put_to_sleep(&self, pid: ProcessId) {
        self.registry.with_running_mut(pid, |p| p.assigned_core = None);
        self.queues.lock().unwrap().sleeping_list.push(pid);
    }

    fn finalize(&self, pid: ProcessId, core_id: CoreId) {
        self.pager.release_process_pages(pid);
        self.registry.with_running_mut(pid, |p| {
            p.finish();
        });
        self.registry.mark_finished(pid);
        if let Some(process) = self.registry.get(pid) {
            let _ = self.write_process_log(&process);
        }
        info!("process {pid} finished on core {core_id}");
    }

    fn write_process_log(&self, process: &Process) -> std::io::Result<()> {
        let path = self.process_log_dir.join(format!("process_{}.txt", process.id.as_u64()));
        let mut out = format!("Process name: {}\nLogs:\n", process.name);
        for entry in &process.logs {
            out.push_str(&entry.render());
            out.push('\n');
        }
        fs::write(path, out)
    }

    /// Runs `pid` one instruction at a time, resolving page faults as it
    /// goes, until it finishes, sleeps, exhausts its quantum, or stalls on
    /// an unresolved fault.
    fn execute(&self, pid: ProcessId, core_id: CoreId, quantum: Option<u32>) -> StepOutcome {
        let mut executed = 0u32;
        loop {
            if let Some(q) = quantum {
                if executed >= q {
                    return StepOutcome::QuantumExpired;
                }
            }

            let page = self.registry.get(pid).and_then(|p| p.page_for_pc());
            if let Some(page_id) = page {
                if !self.pager.access_page(page_id) {
                    let mut resolved = false;
                    for _ in 0..FAULT_RETRY_LIMIT {
                        if self.pager.page_fault(page_id) {
                            resolved = true;
                            break;
                        }
                        thread::sleep(FAULT_RETRY_BACKOFF);
                    }
                    if !resolved {
                        self.idle_ticks.fetch_add(1, Ordering::Relaxed);
                        warn!("process {pid} stalled: page {page_id} unresolved");
                        return StepOutcome::FaultStall;
                    }
                }
            }

            let step = self.registry.with_running_mut(pid, |p| {
                if p.finished || p.is_program_exhausted() {
                    return None;
                }
                Some(p.step(core_id))
            });
            self.active_ticks.fetch_add(1, Ordering::Relaxed);
            executed += 1;
            if self.delay_per_exec_ms > 0 {
                thread::sleep(Duration::from_millis(self.delay_per_exec_ms));
            }
            trace!("process {pid} executed one instruction on core {core_id}");

            match step.flatten() {
                None => return StepOutcome::Finished,
                Some(ExecOutcome::Violation) => return StepOutcome::Finished,
                Some(ExecOutcome::Slept) => return StepOutcome::Slept,
                Some(ExecOutcome::Continue) => {
                    let exhausted = self
                        .registry
                        .get(pid)
                        .map(|p| p.finished || p.is_program_exhausted())
                        .unwrap_or(true);
                    if exhausted {
                        return StepOutcome::Finished;
                    }
                },
            }
        }
    }
}
