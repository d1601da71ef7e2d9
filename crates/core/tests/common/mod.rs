//! Shared harness for the end-to-end scenario tests.
#![allow(dead_code)]

use teem_core::{Config, Cpu, Status};

/// Cycle budget before a scenario is declared hung.
pub const MAX_CYCLES: u64 = 200_000;

/// Builds a machine with the given configuration and program.
pub fn cpu_with(config: &Config, source: &str) -> Cpu {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut cpu = Cpu::new(config);
    cpu.load_program(source).expect("scenario program must assemble");
    cpu
}

/// Runs until the machine stops being `Running`.
pub fn run(cpu: &mut Cpu) -> Status {
    for _ in 0..MAX_CYCLES {
        if cpu.status() != Status::Running {
            return cpu.status();
        }
        cpu.step();
    }
    panic!("program did not finish within {MAX_CYCLES} cycles");
}

/// Assembles, loads, and runs a program with the default configuration.
pub fn run_program(source: &str) -> Cpu {
    let mut cpu = cpu_with(&Config::default(), source);
    run(&mut cpu);
    cpu
}
