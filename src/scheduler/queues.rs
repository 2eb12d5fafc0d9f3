//! The three queues a scheduler moves process ids through.

use crate::process::ProcessId;
use std::collections::VecDeque;

#[derive(Debug)]
pub struct Queues {
    pub ready_queue: VecDeque<ProcessId>,
    pub waiting_queue: VecDeque<ProcessId>,
    pub sleeping_list: Vec<ProcessId>,
}

impl Queues {
    pub fn new() -> Self {
        Self {
            ready_queue: VecDeque::new(),
            waiting_queue: VecDeque::new(),
            sleeping_list: Vec::new(),
        }
    }
}
