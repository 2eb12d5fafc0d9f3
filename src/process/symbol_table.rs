//! Per-process name -> value map, capacity 32.

use std::collections::HashMap;

/// Only numeric type the interpreter supports; kept as its own type so a
/// richer type system has somewhere to grow without touching call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    Int16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub ty: SymbolType,
    pub value: u16,
}

/// Capacity is fixed at 32: DECLARE past this is a silent no-op.
pub const SYMBOL_TABLE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.entries.get(name).map(|s| s.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Declares `name` with `value` if it is new and there is room.
    /// Returns `true` on insertion, `false` if the table is full (the
    /// no-op case; the caller is responsible for logging it).
    pub fn declare(&mut self, name: &str, value: u16) -> bool {
        if self.entries.contains_key(name) {
            return true;
        }
        if self.entries.len() >= SYMBOL_TABLE_CAPACITY {
            return false;
        }
        self.entries.insert(
            name.to_owned(),
            Symbol {
                ty: SymbolType::Int16,
                value,
            },
        );
        true
    }

    /// Sets an existing symbol's value, or auto-declares it at 0 first
    /// (unknown symbols are auto-declared at 0).
    /// Returns `false` if the table was full and `name` did not already exist.
    pub fn set(&mut self, name: &str, value: u16) -> bool {
        if let Some(sym) = self.entries.get_mut(name) {
            sym.value = value;
            return true;
        }
        if self.entries.len() >= SYMBOL_TABLE_CAPACITY {
            return false;
        }
        self.entries.insert(
            name.to_owned(),
            Symbol {
                ty: SymbolType::Int16,
                value,
            },
        );
        true
    }
}
