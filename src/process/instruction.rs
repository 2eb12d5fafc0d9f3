//! The tiny instruction set each core executes, one instruction per call to
//! [`Instruction::execute`].

use super::symbol_table::SymbolTable;
use super::{CoreId, Process};

/// An instruction operand: either a 16-bit literal or a symbol name.
/// Unknown symbols are auto-declared as 0 before use — this is a core rule,
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Literal(u16),
    Symbol(String),
}

impl Operand {
    fn resolve(&self, symbols: &mut SymbolTable) -> u16 {
        match self {
            Operand::Literal(v) => *v,
            Operand::Symbol(name) => {
                if let Some(v) = symbols.get(name) {
                    v
                } else {
                    symbols.declare(name, 0);
                    0
                }
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Print `message` verbatim, or "Value from <name>: <value>" if `message`
    /// names an existing symbol.
    Print { message: String },
    /// Declare `name` as int16 with `value` if room and unknown; else no-op.
    Declare { name: String, value: u16 },
    Add { dest: String, a: Operand, b: Operand },
    Subtract { dest: String, a: Operand, b: Operand },
    /// Yield the core for `ticks` scheduler ticks.
    Sleep { ticks: u8 },
    /// Read the word at `address` into symbol `name`, auto-declared,
    /// defaulting to 0 if never written.
    Read { name: String, address: u32 },
    /// Write `value` to the word at `address`.
    Write { address: u32, value: Operand },
}

/// Outcome of executing a single instruction, reported back to the caller so
/// the scheduler can react (yield the core, reap the process).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Continue,
    Slept,
    Violation,
}

impl Instruction {
    /// Executes this instruction against `process`, advancing its program
    /// counter and appending exactly one log line. `core` identifies
    /// the core the instruction ran on, for the log line.
    pub fn execute(&self, process: &mut Process, core: CoreId) -> ExecOutcome {
        match self {
            Instruction::Print { message } => {
                let rendered = if let Some(value) = process.symbols.get(message) {
                    format!("Value from {message}: {value}")
                } else {
                    message.clone()
                };
                process.log(core, rendered);
                ExecOutcome::Continue
            },
            Instruction::Declare { name, value } => {
                if process.symbols.declare(name, *value) {
                    process.log(core, format!("Declared variable: {name} with value: {value}"));
                } else {
                    process.log(core, "IGNORED - Symbol table full (32 variables max)".to_owned());
                }
                ExecOutcome::Continue
            },
            Instruction::Add { dest, a, b } => {
                let va = a.resolve(&mut process.symbols);
                let vb = b.resolve(&mut process.symbols);
                let result = va.wrapping_add(vb);
                process.symbols.set(dest, result);
                process.log(core, format!("ADD {dest} = {result}"));
                ExecOutcome::Continue
            },
            Instruction::Subtract { dest, a, b } => {
                let va = a.resolve(&mut process.symbols);
                let vb = b.resolve(&mut process.symbols);
                let result = va.wrapping_sub(vb);
                process.symbols.set(dest, result);
                process.log(core, format!("SUB {dest} = {result}"));
                ExecOutcome::Continue
            },
            Instruction::Sleep { ticks } => {
                process.sleep_ticks_remaining = *ticks;
                process.log(core, format!("SLEEP {ticks}"));
                ExecOutcome::Slept
            },
            Instruction::Read { name, address } => {
                if !process.address_in_range(*address) {
                    process.record_violation(*address, core);
                    return ExecOutcome::Violation;
                }
                let value = process.memory_map.get(address).copied().unwrap_or(0);
                process.symbols.set(name, value);
                process.log(core, format!("READ {name} <- [{address:#x}] = {value}"));
                ExecOutcome::Continue
            },
            Instruction::Write { address, value } => {
                if !process.address_in_range(*address) {
                    process.record_violation(*address, core);
                    return ExecOutcome::Violation;
                }
                let v = value.resolve(&mut process.symbols);
                process.memory_map.insert(*address, v);
                process.log(core, format!("WRITE [{address:#x}] = {v}"));
                ExecOutcome::Continue
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessId;

    fn new_process(memory_required: usize) -> Process {
        Process::new(ProcessId::new(1), "p1".to_owned(), memory_required, Vec::new())
    }

    #[test]
    fn print_literal_message() {
        let mut p = new_process(64);
        Instruction::Print { message: "hi".to_owned() }.execute(&mut p, 0);
        assert!(p.logs.last().unwrap().detail.ends_with("\"hi\"") || p.logs.last().unwrap().detail.contains("hi"));
    }

    #[test]
    fn print_known_symbol_renders_value() {
        let mut p = new_process(64);
        Instruction::Declare { name: "x".to_owned(), value: 8 }.execute(&mut p, 0);
        Instruction::Print { message: "x".to_owned() }.execute(&mut p, 0);
        assert!(p.logs.last().unwrap().detail.contains("Value from x: 8"));
    }

    #[test]
    fn add_auto_declares_unknown_operands() {
        let mut p = new_process(64);
        Instruction::Add {
            dest: "sum".to_owned(),
            a: Operand::Symbol("unset".to_owned()),
            b: Operand::Literal(3),
        }
        .execute(&mut p, 0);
        assert_eq!(p.symbols.get("sum"), Some(3));
        assert_eq!(p.symbols.get("unset"), Some(0));
    }

    #[test]
    fn add_wraps_on_overflow() {
        let mut p = new_process(64);
        Instruction::Declare { name: "x".to_owned(), value: u16::MAX }.execute(&mut p, 0);
        Instruction::Add {
            dest: "x".to_owned(),
            a: Operand::Symbol("x".to_owned()),
            b: Operand::Literal(3),
        }
        .execute(&mut p, 0);
        assert_eq!(p.symbols.get("x"), Some(2));
    }

    #[test]
    fn read_out_of_range_sets_violation() {
        let mut p = new_process(64);
        let outcome = Instruction::Read { name: "x".to_owned(), address: 0x80 }.execute(&mut p, 0);
        assert_eq!(outcome, ExecOutcome::Violation);
        assert!(p.violation.is_some());
        assert!(p.finished);
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut p = new_process(64);
        Instruction::Write { address: 4, value: Operand::Literal(42) }.execute(&mut p, 0);
        Instruction::Read { name: "v".to_owned(), address: 4 }.execute(&mut p, 0);
        assert_eq!(p.symbols.get("v"), Some(42));
    }

    #[test]
    fn unwritten_read_defaults_to_zero() {
        let mut p = new_process(64);
        Instruction::Read { name: "v".to_owned(), address: 8 }.execute(&mut p, 0);
        assert_eq!(p.symbols.get("v"), Some(0));
    }

    #[test]
    fn sleep_sets_counter_and_yields() {
        let mut p = new_process(64);
        let outcome = Instruction::Sleep { ticks: 3 }.execute(&mut p, 0);
        assert_eq!(outcome, ExecOutcome::Slept);
        assert_eq!(p.sleep_ticks_remaining, 3);
    }
}
