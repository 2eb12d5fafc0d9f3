//! The process object: program counter, symbol table, sleep counter,
//! assigned pages, memory map, violation flag, and log.

pub mod instruction;
pub mod symbol_table;

pub use instruction::{ExecOutcome, Instruction, Operand};
pub use symbol_table::{SymbolTable, SYMBOL_TABLE_CAPACITY};

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::fmt;

/// Index of a virtual CPU core.
pub type CoreId = usize;

/// Stable process identity. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(u64);

impl ProcessId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn first() -> Self {
        Self(1)
    }

    /// Only to be used by the process registry when minting new ids.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A READ/WRITE outside `[0, memory_required)`. Setting this also sets
/// `finished`.
#[derive(Debug, Clone)]
pub struct Violation {
    pub address: u32,
    pub at: DateTime<Local>,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub core: CoreId,
    pub detail: String,
}

impl LogEntry {
    /// `(<MM/DD/YYYY hh:mm:ssAM>) Core:<id> "<detail>"`.
    pub fn render(&self) -> String {
        format!(
            "({}) Core:{} \"{}\"",
            self.timestamp.format("%m/%d/%Y %I:%M:%S%p"),
            self.core,
            self.detail
        )
    }
}

#[derive(Debug, Clone)]
pub struct Process {
    pub id: ProcessId,
    pub name: String,
    pub memory_required: usize,
    pub program: Vec<Instruction>,
    pub pc: usize,
    pub symbols: SymbolTable,
    /// Global page ids owned by this process while admitted.
    pub assigned_pages: Vec<u64>,
    pub assigned_core: Option<CoreId>,
    pub sleep_ticks_remaining: u8,
    pub finished: bool,
    pub violation: Option<Violation>,
    pub logs: Vec<LogEntry>,
    pub memory_map: HashMap<u32, u16>,
    pub created_at: DateTime<Local>,
}

impl Process {
    pub fn new(id: ProcessId, name: String, memory_required: usize, program: Vec<Instruction>) -> Self {
        Self {
            id,
            name,
            memory_required,
            program,
            pc: 0,
            symbols: SymbolTable::new(),
            assigned_pages: Vec::new(),
            assigned_core: None,
            sleep_ticks_remaining: 0,
            finished: false,
            violation: None,
            logs: Vec::new(),
            memory_map: HashMap::new(),
            created_at: Local::now(),
        }
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleep_ticks_remaining > 0
    }

    /// `pc >= |program|`: every instruction has executed.
    pub fn is_program_exhausted(&self) -> bool {
        self.pc >= self.program.len()
    }

    pub fn address_in_range(&self, address: u32) -> bool {
        (address as usize) < self.memory_required
    }

    /// The global page id backing the instruction at the current `pc`, if
    /// any pages are assigned yet. Page `i` is assigned to the memory
    /// region `[i * frame_size, (i+1) * frame_size)`, scaled onto the
    /// process's instruction stream the same way the program counter scales
    /// onto memory: `program.len()` instructions spread evenly over
    /// `assigned_pages.len()` pages.
    pub fn page_for_pc(&self) -> Option<u64> {
        if self.assigned_pages.is_empty() {
            return None;
        }
        let pages = self.assigned_pages.len();
        let per_page = self.program.len().div_ceil(pages).max(1);
        let index = (self.pc / per_page).min(pages - 1);
        Some(self.assigned_pages[index])
    }

    /// Executes the instruction at `pc` on `core`, advancing `pc` by one.
    /// Caller must first check `!is_program_exhausted() && !is_sleeping()`.
    pub fn step(&mut self, core: CoreId) -> ExecOutcome {
        let instr = self.program[self.pc].clone();
        self.pc += 1;
        instr.execute(self, core)
    }

    pub fn log(&mut self, core: CoreId, detail: String) {
        self.logs.push(LogEntry {
            timestamp: Local::now(),
            core,
            detail,
        });
    }

    /// Sets `violation` (and `finished`) and appends the fatal log line.
    pub fn record_violation(&mut self, address: u32, core: CoreId) {
        let at = Local::now();
        self.log(
            core,
            format!(
                "Process {} shut down due to memory access violation error that occurred at {}. {:#x} invalid.",
                self.name,
                at.format("%m/%d/%Y %I:%M:%S%p"),
                address
            ),
        );
        self.violation = Some(Violation { address, at });
        self.finished = true;
    }

    /// Marks the process finished because its program ran to completion.
    /// No-op if already finished (e.g. by a violation on the last instruction).
    /// Clears `assigned_pages`: once the pager has released them the
    /// process no longer owns any.
    pub fn finish(&mut self) {
        self.finished = true;
        self.assigned_core = None;
        self.assigned_pages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program_process(n: usize, pages: usize) -> Process {
        let program: Vec<Instruction> = (0..n)
            .map(|i| Instruction::Print { message: format!("p{i}") })
            .collect();
        let mut p = Process::new(ProcessId::new(1), "p".to_owned(), 64, program);
        p.assigned_pages = (0..pages as u64).collect();
        p
    }

    #[test]
    fn pc_starts_at_zero_and_advances() {
        let mut p = program_process(3, 1);
        assert_eq!(p.pc, 0);
        p.step(0);
        assert_eq!(p.pc, 1);
    }

    #[test]
    fn program_exhausted_after_last_instruction() {
        let mut p = program_process(2, 1);
        p.step(0);
        assert!(!p.is_program_exhausted());
        p.step(0);
        assert!(p.is_program_exhausted());
    }

    #[test]
    fn page_for_pc_spreads_instructions_over_pages() {
        let p = program_process(4, 2);
        assert_eq!(p.page_for_pc(), Some(0));
    }

    #[test]
    fn violation_implies_finished() {
        let mut p = program_process(1, 1);
        p.record_violation(0x999, 0);
        assert!(p.violation.is_some());
        assert!(p.finished);
    }
}
