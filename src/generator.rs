//! Random process generator, driven by the console's `scheduler-start`
//! ticker, not the scheduler itself.

use crate::config::Config;
use crate::process::{Instruction, Operand, Process, ProcessId};
use rand::Rng;

const INSTRUCTION_KINDS: usize = 7;

/// Builds one process with a random instruction count in
/// `[min_ins, max_ins]` and a random power-of-two memory size in
/// `[min_mem_per_proc, max_mem_per_proc]`.
pub fn generate(id: ProcessId, name: String, config: &Config, rng: &mut impl Rng) -> Process {
    let memory_required = random_power_of_two(rng, config.min_mem_per_proc, config.max_mem_per_proc);
    let count = rng.gen_range(config.min_ins..=config.max_ins);
    let program = (0..count).map(|_| random_instruction(rng)).collect();
    Process::new(id, name, memory_required, program)
}

fn random_power_of_two(rng: &mut impl Rng, min: usize, max: usize) -> usize {
    let min_shift = min.trailing_zeros();
    let max_shift = max.trailing_zeros();
    let shift = rng.gen_range(min_shift..=max_shift);
    1usize << shift
}

fn random_instruction(rng: &mut impl Rng) -> Instruction {
    match rng.gen_range(0..INSTRUCTION_KINDS) {
        0 => Instruction::Print { message: "hello from generated process".to_owned() },
        1 => Instruction::Declare { name: random_name(rng), value: rng.gen() },
        2 => Instruction::Add {
            dest: random_name(rng),
            a: random_operand(rng),
            b: random_operand(rng),
        },
        3 => Instruction::Subtract {
            dest: random_name(rng),
            a: random_operand(rng),
            b: random_operand(rng),
        },
        4 => Instruction::Sleep { ticks: rng.gen_range(1..=5) },
        5 => Instruction::Read {
            name: random_name(rng),
            address: rng.gen_range(0..64),
        },
        _ => Instruction::Write {
            address: rng.gen_range(0..64),
            value: random_operand(rng),
        },
    }
}

fn random_operand(rng: &mut impl Rng) -> Operand {
    if rng.gen_bool(0.5) {
        Operand::Literal(rng.gen_range(0..100))
    } else {
        Operand::Symbol(random_name(rng))
    }
}

fn random_name(rng: &mut impl Rng) -> String {
    let letter = (b'a' + rng.gen_range(0..26)) as char;
    format!("var_{letter}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::fs;

    fn config(tmp: &tempfile::TempDir) -> Config {
        let path = tmp.path().join("config.txt");
        fs::write(
            &path,
            "num-cpu 1\nscheduler fcfs\nquantum-cycles 1\nbatch-process-freq 1000\n\
             min-ins 2\nmax-ins 4\ndelay-per-exec 0\nmax-overall-mem 256\nmem-per-frame 64\n\
             min-mem-per-proc 64\nmax-mem-per-proc 256\n",
        )
        .unwrap();
        Config::load(&path).unwrap()
    }

    #[test]
    fn generated_process_respects_instruction_bounds() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(&tmp);
        let mut rng = StdRng::seed_from_u64(42);
        let p = generate(ProcessId::new(1), "gen".to_owned(), &cfg, &mut rng);
        assert!(p.program.len() >= cfg.min_ins as usize && p.program.len() <= cfg.max_ins as usize);
    }

    #[test]
    fn generated_memory_is_a_power_of_two_in_range() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(&tmp);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let p = generate(ProcessId::new(1), "gen".to_owned(), &cfg, &mut rng);
            assert!(p.memory_required.is_power_of_two());
            assert!(p.memory_required >= cfg.min_mem_per_proc && p.memory_required <= cfg.max_mem_per_proc);
        }
    }
}
