//! Minimal line-oriented REPL implementing the console commands.
//! Owns no scheduling state of its own: every command is a direct call
//! into the core's public API.

use crate::config::Config;
use crate::generator;
use crate::process::{Instruction, Operand, Process, ProcessId};
use crate::query;
use crate::scheduler::Scheduler;
use log::error;
use rand::rngs::ThreadRng;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct Initialized {
    scheduler: Arc<Scheduler>,
    config: Config,
}

pub struct Console {
    config_path: PathBuf,
    state: Mutex<Option<Initialized>>,
    names: Mutex<HashMap<String, ProcessId>>,
    generator_running: Arc<AtomicBool>,
    generator_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Console {
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            state: Mutex::new(None),
            names: Mutex::new(HashMap::new()),
            generator_running: Arc::new(AtomicBool::new(false)),
            generator_handle: Mutex::new(None),
        }
    }

    /// Reads commands from `input` until `exit`. Returns the process exit
    /// code.
    pub fn run(&self, input: impl BufRead, mut output: impl Write) -> i32 {
        for line in input.lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match self.dispatch(line, &mut output) {
                Dispatch::Continue => {},
                Dispatch::Exit(code) => return code,
            }
        }
        0
    }

    fn dispatch(&self, line: &str, out: &mut impl Write) -> Dispatch {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else { return Dispatch::Continue };

        match cmd {
            "initialize" => self.cmd_initialize(out),
            "exit" => return Dispatch::Exit(0),
            "clear" => {
                let _ = write!(out, "\x1B[2J\x1B[1;1H");
            },
            "screen" => self.cmd_screen(line, out),
            "scheduler-start" => self.cmd_scheduler_start(out),
            "scheduler-stop" => self.cmd_scheduler_stop(out),
            "report-util" => self.cmd_report_util(out),
            "process-smi" => self.cmd_process_smi(out),
            "vmstat" => self.cmd_vmstat(out),
            _ => {
                let _ = writeln!(out, "unknown command: {cmd}");
            },
        }
        Dispatch::Continue
    }

    fn with_scheduler(&self, out: &mut impl Write, f: impl FnOnce(&Arc<Scheduler>)) {
        match self.state.lock().unwrap().as_ref() {
            Some(state) => f(&state.scheduler),
            None => {
                let _ = writeln!(out, "not initialized; run `initialize` first");
            },
        }
    }

    fn with_state(&self, out: &mut impl Write, f: impl FnOnce(&Arc<Scheduler>, &Config)) {
        match self.state.lock().unwrap().as_ref() {
            Some(state) => f(&state.scheduler, &state.config),
            None => {
                let _ = writeln!(out, "not initialized; run `initialize` first");
            },
        }
    }

    fn cmd_initialize(&self, out: &mut impl Write) {
        let mut guard = self.state.lock().unwrap();
        if guard.is_some() {
            let _ = writeln!(out, "already initialized");
            return;
        }
        let loaded = Config::load(&self.config_path).and_then(|cfg| {
            let scheduler = Scheduler::new(&cfg).map_err(|e| crate::error::ConfigError::Io {
                path: self.config_path.display().to_string(),
                source: e,
            })?;
            Ok((scheduler, cfg))
        });
        match loaded {
            Ok((scheduler, config)) => {
                *guard = Some(Initialized { scheduler, config });
                let _ = writeln!(out, "initialized");
            },
            Err(e) => {
                error!("initialize failed: {e}");
                let _ = writeln!(out, "initialize failed: {e}");
            },
        }
    }

    fn cmd_screen(&self, line: &str, out: &mut impl Write) {
        let rest = line["screen".len()..].trim();
        if let Some(args) = rest.strip_prefix("-s ") {
            self.screen_create(args.trim(), out);
        } else if let Some(args) = rest.strip_prefix("-c ") {
            self.screen_create_literal(args.trim(), out);
        } else if let Some(name) = rest.strip_prefix("-r ") {
            self.screen_resume(name.trim(), out);
        } else if rest.trim() == "-ls" {
            self.screen_list(out);
        } else {
            let _ = writeln!(out, "usage: screen -s|-c|-r|-ls ...");
        }
    }

    fn screen_create(&self, args: &str, out: &mut impl Write) {
        let mut it = args.split_whitespace();
        let (Some(name), Some(mem)) = (it.next(), it.next()) else {
            let _ = writeln!(out, "usage: screen -s <name> <mem>");
            return;
        };
        let Ok(memory_required) = mem.parse::<usize>() else {
            let _ = writeln!(out, "invalid memory size: {mem}");
            return;
        };
        let program = vec![Instruction::Print { message: format!("Hello from {name}") }];
        self.submit(name, memory_required, program, out);
    }

    fn screen_create_literal(&self, args: &str, out: &mut impl Write) {
        let mut it = args.splitn(3, char::is_whitespace);
        let (Some(name), Some(mem), Some(rest)) = (it.next(), it.next(), it.next()) else {
            let _ = writeln!(out, "usage: screen -c <name> <mem> \"<instr>;<instr>;...\"");
            return;
        };
        let Ok(memory_required) = mem.parse::<usize>() else {
            let _ = writeln!(out, "invalid memory size: {mem}");
            return;
        };
        let text = rest.trim().trim_matches('"');
        match parse_instructions(text) {
            Ok(program) => self.submit(name, memory_required, program, out),
            Err(e) => {
                let _ = writeln!(out, "malformed instruction list: {e}");
            },
        }
    }

    fn submit(&self, name: &str, memory_required: usize, program: Vec<Instruction>, out: &mut impl Write) {
        self.with_scheduler(out, |scheduler| {
            let id = scheduler.registry().next_id();
            let process = Process::new(id, name.to_owned(), memory_required, program);
            self.names.lock().unwrap().insert(name.to_owned(), id);
            let admitted = scheduler.add_process(process);
            let _ = writeln!(out, "submitted {name} (id {id}); admitted: {admitted}");
        });
    }

    fn screen_resume(&self, name: &str, out: &mut impl Write) {
        self.with_scheduler(out, |scheduler| {
            let Some(&id) = self.names.lock().unwrap().get(name) else {
                let _ = writeln!(out, "no such process: {name}");
                return;
            };
            match scheduler.registry().get(id) {
                Some(p) => {
                    let _ = writeln!(out, "{name} pc {}/{} finished={}", p.pc, p.program.len(), p.finished);
                    for entry in &p.logs {
                        let _ = writeln!(out, "{}", entry.render());
                    }
                },
                None => {
                    let _ = writeln!(out, "no such process: {name}");
                },
            }
        });
    }

    fn screen_list(&self, out: &mut impl Write) {
        self.with_scheduler(out, |scheduler| {
            let listing = query::list_processes(scheduler);
            let _ = write!(out, "{}", query::render_process_listing(&listing));
        });
    }

    fn cmd_scheduler_start(&self, out: &mut impl Write) {
        self.with_state(out, |scheduler, config| {
            if self.generator_running.swap(true, Ordering::AcqRel) {
                let _ = writeln!(out, "generator already running");
                return;
            }
            let scheduler = Arc::clone(scheduler);
            let config = config.clone();
            let running = Arc::clone(&self.generator_running);
            let handle = thread::spawn(move || {
                let mut rng = ThreadRng::default();
                let mut counter: u64 = 0;
                while running.load(Ordering::Acquire) {
                    counter += 1;
                    let id = scheduler.registry().next_id();
                    let process = generator::generate(id, format!("auto_{counter}"), &config, &mut rng);
                    scheduler.add_process(process);
                    thread::sleep(Duration::from_millis(config.batch_process_freq_ms));
                }
            });
            *self.generator_handle.lock().unwrap() = Some(handle);
            let _ = writeln!(out, "scheduler-start: generator running");
        });
    }

    fn cmd_scheduler_stop(&self, out: &mut impl Write) {
        self.generator_running.store(false, Ordering::Release);
        if let Some(handle) = self.generator_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        let _ = writeln!(out, "scheduler-stop: generator stopped");
    }

    fn cmd_report_util(&self, out: &mut impl Write) {
        self.with_state(out, |scheduler, config| match query::report(scheduler, &config.report_path) {
            Ok(()) => {
                let _ = writeln!(out, "report written to {}", config.report_path.display());
            },
            Err(e) => {
                let _ = writeln!(out, "report failed: {e}");
            },
        });
    }

    fn cmd_process_smi(&self, out: &mut impl Write) {
        self.with_scheduler(out, |scheduler| {
            let smi = query::process_smi(scheduler);
            let _ = writeln!(out, "CPU utilization: {:.0}%", smi.cpu_utilization_pct);
            let _ = writeln!(out, "Memory: {}/{}", smi.memory_used, smi.memory_total);
            for (name, mem) in &smi.running {
                let _ = writeln!(out, "{name}: {mem} bytes");
            }
        });
    }

    fn cmd_vmstat(&self, out: &mut impl Write) {
        self.with_scheduler(out, |scheduler| {
            let stat = query::vmstat(scheduler);
            let _ = write!(out, "{}", query::render_vmstat(&stat));
        });
    }
}

enum Dispatch {
    Continue,
    Exit(i32),
}

/// Parses `"<instr>;<instr>;..."` into [`Instruction`]s for `screen -c`.
/// Rejects malformed text before it reaches the core.
fn parse_instructions(text: &str) -> Result<Vec<Instruction>, String> {
    text.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_instruction)
        .collect()
}

fn parse_instruction(text: &str) -> Result<Instruction, String> {
    let mut tokens = text.split_whitespace();
    let op = tokens.next().ok_or("empty instruction")?.to_ascii_uppercase();
    let rest: Vec<&str> = tokens.collect();
    match op.as_str() {
        "PRINT" => Ok(Instruction::Print { message: rest.join(" ").trim_matches('"').to_owned() }),
        "DECLARE" => {
            let [name, value] = rest[..] else { return Err(format!("DECLARE expects 2 args: {text}")) };
            Ok(Instruction::Declare {
                name: name.to_owned(),
                value: value.parse().map_err(|_| format!("bad value: {value}"))?,
            })
        },
        "ADD" => {
            let [dest, a, b] = rest[..] else { return Err(format!("ADD expects 3 args: {text}")) };
            Ok(Instruction::Add { dest: dest.to_owned(), a: parse_operand(a), b: parse_operand(b) })
        },
        "SUBTRACT" => {
            let [dest, a, b] = rest[..] else { return Err(format!("SUBTRACT expects 3 args: {text}")) };
            Ok(Instruction::Subtract { dest: dest.to_owned(), a: parse_operand(a), b: parse_operand(b) })
        },
        "SLEEP" => {
            let [ticks] = rest[..] else { return Err(format!("SLEEP expects 1 arg: {text}")) };
            Ok(Instruction::Sleep { ticks: ticks.parse().map_err(|_| format!("bad tick count: {ticks}"))? })
        },
        "READ" => {
            let [name, addr] = rest[..] else { return Err(format!("READ expects 2 args: {text}")) };
            Ok(Instruction::Read { name: name.to_owned(), address: parse_hex(addr)? })
        },
        "WRITE" => {
            let [addr, value] = rest[..] else { return Err(format!("WRITE expects 2 args: {text}")) };
            Ok(Instruction::Write { address: parse_hex(addr)?, value: parse_operand(value) })
        },
        other => Err(format!("unknown instruction: {other}")),
    }
}

fn parse_operand(token: &str) -> Operand {
    match token.parse::<u16>() {
        Ok(v) => Operand::Literal(v),
        Err(_) => Operand::Symbol(token.to_owned()),
    }
}

fn parse_hex(token: &str) -> Result<u32, String> {
    let token = token.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(token, 16).map_err(|_| format!("bad hex address: {token}"))
}
