//! Plain-text configuration loader. Unknown keys are ignored;
//! missing or out-of-range required keys fail construction with a typed
//! [`ConfigError`] before anything else is built.

use crate::error::ConfigError;
use crate::scheduler::SchedulingPolicy;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    pub num_cpu: usize,
    pub scheduler: SchedulerKind,
    pub quantum_cycles: u32,
    pub batch_process_freq_ms: u64,
    pub min_ins: u32,
    pub max_ins: u32,
    pub delay_per_exec_ms: u64,
    pub max_overall_mem: usize,
    pub mem_per_frame: usize,
    pub min_mem_per_proc: usize,
    pub max_mem_per_proc: usize,
    pub backing_store_path: PathBuf,
    pub paging_log_path: PathBuf,
    pub process_log_dir: PathBuf,
    pub report_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    Fcfs,
    RoundRobin,
}

impl Config {
    pub fn scheduler_policy(&self) -> SchedulingPolicy {
        match self.scheduler {
            SchedulerKind::Fcfs => SchedulingPolicy::Fcfs,
            SchedulerKind::RoundRobin => SchedulingPolicy::RoundRobin { quantum: self.quantum_cycles },
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let raw = parse_lines(&text);

        let num_cpu = required_range(&raw, "num-cpu", 1, 128)?;
        let scheduler = match required_str(&raw, "scheduler")?.as_str() {
            "fcfs" => SchedulerKind::Fcfs,
            "rr" => SchedulerKind::RoundRobin,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "scheduler",
                    value: other.to_owned(),
                    reason: "must be `fcfs` or `rr`",
                })
            },
        };
        let quantum_cycles = required_min(&raw, "quantum-cycles", 1)? as u32;
        let batch_process_freq_ms = required_min(&raw, "batch-process-freq", 1)?;
        let min_ins = required_range(&raw, "min-ins", 1, 50)? as u32;
        let max_ins = required_range(&raw, "max-ins", 1, 50)? as u32;
        let delay_per_exec_ms = required_min(&raw, "delay-per-exec", 0)?;
        let max_overall_mem = required_power_of_two(&raw, "max-overall-mem")?;
        let mem_per_frame = required_power_of_two(&raw, "mem-per-frame")?;
        let min_mem_per_proc = required_power_of_two_range(&raw, "min-mem-per-proc", 64, 65536)?;
        let max_mem_per_proc = required_power_of_two_range(&raw, "max-mem-per-proc", 64, 65536)?;

        if max_ins < min_ins {
            return Err(ConfigError::InvalidValue {
                key: "max-ins",
                value: max_ins.to_string(),
                reason: "must be >= min-ins",
            });
        }
        if max_mem_per_proc < min_mem_per_proc {
            return Err(ConfigError::InvalidValue {
                key: "max-mem-per-proc",
                value: max_mem_per_proc.to_string(),
                reason: "must be >= min-mem-per-proc",
            });
        }

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self {
            num_cpu,
            scheduler,
            quantum_cycles,
            batch_process_freq_ms,
            min_ins,
            max_ins,
            delay_per_exec_ms,
            max_overall_mem,
            mem_per_frame,
            min_mem_per_proc,
            max_mem_per_proc,
            backing_store_path: optional_path(&raw, "backing-store-path", base.join("csopesy-backing-store.txt")),
            paging_log_path: optional_path(&raw, "paging-log-path", base.join("paging-log.txt")),
            process_log_dir: optional_path(&raw, "process-log-dir", base.join("logs")),
            report_path: optional_path(&raw, "report-path", base.join("csopesy.txt")),
        })
    }
}

fn parse_lines(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once(char::is_whitespace) {
            map.insert(key.trim().to_owned(), value.trim().to_owned());
        }
    }
    map
}

fn required_str(raw: &HashMap<String, String>, key: &'static str) -> Result<String, ConfigError> {
    raw.get(key).cloned().ok_or(ConfigError::MissingKey(key))
}

fn required_int(raw: &HashMap<String, String>, key: &'static str) -> Result<u64, ConfigError> {
    let value = required_str(raw, key)?;
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value,
        reason: "not a valid integer",
    })
}

fn required_min(raw: &HashMap<String, String>, key: &'static str, min: u64) -> Result<u64, ConfigError> {
    let value = required_int(raw, key)?;
    if value < min {
        return Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "below the allowed minimum",
        });
    }
    Ok(value)
}

fn required_range(raw: &HashMap<String, String>, key: &'static str, min: u64, max: u64) -> Result<usize, ConfigError> {
    let value = required_int(raw, key)?;
    if value < min || value > max {
        return Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "outside the allowed range",
        });
    }
    Ok(value as usize)
}

fn required_power_of_two(raw: &HashMap<String, String>, key: &'static str) -> Result<usize, ConfigError> {
    let value = required_int(raw, key)?;
    if value == 0 || !value.is_power_of_two() {
        return Err(ConfigError::NotPowerOfTwo { key, value });
    }
    Ok(value as usize)
}

fn required_power_of_two_range(
    raw: &HashMap<String, String>,
    key: &'static str,
    min: u64,
    max: u64,
) -> Result<usize, ConfigError> {
    let value = required_power_of_two(raw, key)?;
    if (value as u64) < min || (value as u64) > max {
        return Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "outside the allowed range",
        });
    }
    Ok(value)
}

fn optional_path(raw: &HashMap<String, String>, key: &str, default: PathBuf) -> PathBuf {
    raw.get(key).map(PathBuf::from).unwrap_or(default)
}
