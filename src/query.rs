//! Read-only snapshots over the scheduler's registry and pager.

use crate::process::Process;
use crate::scheduler::Scheduler;
use std::fs;
use std::io;
use std::path::Path;

pub struct ProcessSummary {
    pub name: String,
    pub id: u64,
    pub created_at: String,
    pub core: Option<usize>,
    pub pc: usize,
    pub total_instructions: usize,
}

impl From<&Process> for ProcessSummary {
    fn from(p: &Process) -> Self {
        Self {
            name: p.name.clone(),
            id: p.id.as_u64(),
            created_at: p.created_at.format("%m/%d/%Y %I:%M:%S%p").to_string(),
            core: p.assigned_core,
            pc: p.pc,
            total_instructions: p.program.len(),
        }
    }
}

pub struct ProcessListing {
    pub cpu_utilization_pct: f64,
    pub running: Vec<ProcessSummary>,
    pub finished: Vec<ProcessSummary>,
}

/// `list_processes()`: utilization is the share of cores with a process
/// currently assigned.
pub fn list_processes(scheduler: &Scheduler) -> ProcessListing {
    let registry = scheduler.registry();
    let active = registry.active_per_core(scheduler.num_cpu());
    let busy_cores = active.iter().filter(|&&b| b).count();
    let cpu_utilization_pct = busy_cores as f64 / scheduler.num_cpu() as f64 * 100.0;

    ProcessListing {
        cpu_utilization_pct,
        running: registry.running().iter().map(ProcessSummary::from).collect(),
        finished: registry.finished().iter().map(ProcessSummary::from).collect(),
    }
}

pub fn render_process_listing(listing: &ProcessListing) -> String {
    let mut out = String::new();
    out.push_str(&format!("CPU utilization: {:.0}%\n", listing.cpu_utilization_pct));
    out.push_str("Running processes:\n");
    for p in &listing.running {
        out.push_str(&format!(
            "{} ({}) Core:{} {}/{}\n",
            p.name,
            p.created_at,
            p.core.map(|c| c.to_string()).unwrap_or_else(|| "-".to_owned()),
            p.pc,
            p.total_instructions
        ));
    }
    out.push_str("Finished processes:\n");
    for p in &listing.finished {
        out.push_str(&format!("{} ({}) Finished {}/{}\n", p.name, p.created_at, p.pc, p.total_instructions));
    }
    out
}

pub struct ProcessSmi {
    pub cpu_utilization_pct: f64,
    pub memory_used: usize,
    pub memory_total: usize,
    pub running: Vec<(String, usize)>,
}

/// `process_smi()`: CPU utilization plus memory used/total and a per-running
/// process memory breakdown.
pub fn process_smi(scheduler: &Scheduler) -> ProcessSmi {
    let registry = scheduler.registry();
    let pager = scheduler.pager();
    let active = registry.active_per_core(scheduler.num_cpu());
    let busy_cores = active.iter().filter(|&&b| b).count();

    ProcessSmi {
        cpu_utilization_pct: busy_cores as f64 / scheduler.num_cpu() as f64 * 100.0,
        memory_used: pager.get_used_memory(),
        memory_total: pager.get_total_memory(),
        running: registry.running().iter().map(|p| (p.name.clone(), p.memory_required)).collect(),
    }
}

pub struct VmStat {
    pub total_memory: usize,
    pub used_memory: usize,
    pub free_memory: usize,
    pub idle_ticks: u64,
    pub active_ticks: u64,
    pub total_ticks: u64,
    pub pages_in: u64,
    pub pages_out: u64,
}

/// `vmstat()`: memory and tick counters as of this call.
pub fn vmstat(scheduler: &Scheduler) -> VmStat {
    let pager = scheduler.pager();
    VmStat {
        total_memory: pager.get_total_memory(),
        used_memory: pager.get_used_memory(),
        free_memory: pager.get_free_memory(),
        idle_ticks: scheduler.idle_ticks(),
        active_ticks: scheduler.active_ticks(),
        total_ticks: scheduler.total_ticks(),
        pages_in: pager.get_pages_in(),
        pages_out: pager.get_pages_out(),
    }
}

pub fn render_vmstat(stat: &VmStat) -> String {
    format!(
        "total memory: {}\nused memory: {}\nfree memory: {}\nidle cpu ticks: {}\nactive cpu ticks: {}\n\
         total cpu ticks: {}\nnum paged in: {}\nnum paged out: {}\n",
        stat.total_memory,
        stat.used_memory,
        stat.free_memory,
        stat.idle_ticks,
        stat.active_ticks,
        stat.total_ticks,
        stat.pages_in,
        stat.pages_out
    )
}

/// `report(path)`: writes the last `list_processes` rendering to `path`.
pub fn report(scheduler: &Scheduler, path: impl AsRef<Path>) -> io::Result<()> {
    let listing = list_processes(scheduler);
    fs::write(path, render_process_listing(&listing))
}
