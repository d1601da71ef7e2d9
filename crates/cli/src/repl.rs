//! The interactive debugger loop.
//!
//! Commands:
//! - `step [N]` / `s`: run N cycles (default 1)
//! - `continue` / `c`: run until something happens
//! - `break <addr|label>`: set a breakpoint; `break list`, `break delete`
//! - `print <reg>`: print a register
//! - `print mem <addr> [words]`: dump memory words
//! - `show <cache|rob|lsq|predictor|regs|queue>`: engine snapshots
//! - `quit` / `q`
//!
//! Guest console output is pumped between commands; a blocked `read`
//! prompts for a line of input.

use std::collections::{BTreeSet, VecDeque};
use std::io::{self, BufRead, Write};

use anyhow::Result;

use teem_core::asm::parser::parse_register;
use teem_core::core::engine::FlushReason;
use teem_core::{Cpu, Status};

use crate::view;

/// Runs the REPL to completion; returns the process exit code.
pub fn run(mut cpu: Cpu, initial: Vec<String>) -> Result<i32> {
    let mut breakpoints: BTreeSet<u32> = BTreeSet::new();
    let mut queue: VecDeque<String> = initial.into();
    let stdin = io::stdin();

    println!(
        "loaded: entry={:#x}, {} symbols; type 'continue' to run",
        entry_of(&cpu),
        cpu.symbols().len()
    );

    loop {
        pump_console(&mut cpu)?;

        let line = match queue.pop_front() {
            Some(cmd) => cmd,
            None => {
                print!("teem> ");
                io::stdout().flush()?;
                let mut buf = String::new();
                if stdin.lock().read_line(&mut buf)? == 0 {
                    // EOF: behave like quit.
                    return Ok(cpu.exit_code().unwrap_or(0));
                }
                buf
            }
        };

        let words: Vec<&str> = line.split_whitespace().collect();
        let (cmd, args) = match words.split_first() {
            Some((cmd, args)) => (*cmd, args),
            None => continue,
        };

        match cmd {
            "step" | "s" => {
                let n = args.first().and_then(|a| a.parse().ok()).unwrap_or(1u64);
                exec(&mut cpu, Some(n), &breakpoints)?;
            }
            "continue" | "c" => {
                cpu.resume();
                exec(&mut cpu, None, &breakpoints)?;
            }
            "break" | "b" => cmd_break(&cpu, &mut breakpoints, args),
            "print" | "p" => cmd_print(&cpu, args),
            "show" => cmd_show(&cpu, args),
            "quit" | "q" => return Ok(cpu.exit_code().unwrap_or(0)),
            _ => println!("unknown command: {cmd}"),
        }
    }
}

fn entry_of(cpu: &Cpu) -> u32 {
    cpu.symbols().get("_start").copied().unwrap_or_default()
}

/// Runs cycles until the step budget runs out, a breakpoint dispatches, or
/// the machine stops being `Running`.
fn exec(cpu: &mut Cpu, steps: Option<u64>, breakpoints: &BTreeSet<u32>) -> Result<()> {
    let mut remaining = steps;

    loop {
        match cpu.status() {
            Status::Running => {}
            Status::NeedInput => {
                // Satisfy the blocked read and keep going.
                pump_console(cpu)?;
                if cpu.status() != Status::Running {
                    break;
                }
                continue;
            }
            _ => break,
        }
        if remaining == Some(0) {
            break;
        }
        if let Some(ref mut n) = remaining {
            *n -= 1;
        }

        let report = cpu.step();

        if let Some(flush) = report.flush {
            describe_flush(flush);
        }
        if report.dispatched.iter().any(|pc| breakpoints.contains(pc)) {
            println!("breakpoint");
            break;
        }
    }

    pump_console(cpu)?;
    describe_status(cpu);
    Ok(())
}

fn describe_flush(flush: FlushReason) {
    match flush {
        FlushReason::BranchMispredict { pc } => println!("branch mispredict at {pc:#x}"),
        FlushReason::JumpMispredict { pc } => println!("jump mispredict at {pc:#x}"),
        FlushReason::MemoryOrder { pc } => println!("memory-order violation at {pc:#x}"),
        FlushReason::Fault(fault) => println!("fault: {fault}"),
    }
}

fn describe_status(cpu: &Cpu) {
    match cpu.status() {
        Status::Running => println!("[cycle {}] stopped", cpu.cycles()),
        Status::Paused => println!("[cycle {}] ebreak; 'continue' to resume", cpu.cycles()),
        Status::NeedInput => {}
        Status::Halted { exit_code } => {
            println!("[cycle {}] program exited with status {exit_code}", cpu.cycles())
        }
        Status::Faulted(fault) => println!("[cycle {}] halted on fault: {fault}", cpu.cycles()),
        Status::Done => println!("[cycle {}] program finished", cpu.cycles()),
    }
}

/// Prints pending guest output; prompts for input when a `read` is blocked.
fn pump_console(cpu: &mut Cpu) -> Result<()> {
    let flush = cpu.needs_input() || cpu.status() != Status::Running;
    let output = cpu.take_output(flush);
    if !output.is_empty() {
        print!("{}", String::from_utf8_lossy(&output));
        io::stdout().flush()?;
    }

    if cpu.needs_input() {
        print!("console> ");
        io::stdout().flush()?;
        let mut buf = String::new();
        if io::stdin().lock().read_line(&mut buf)? > 0 {
            cpu.provide_input(buf.as_bytes());
        }
    }
    Ok(())
}

fn cmd_break(cpu: &Cpu, breakpoints: &mut BTreeSet<u32>, args: &[&str]) {
    match args {
        ["list"] => {
            for addr in breakpoints.iter() {
                println!("  {addr:#x}");
            }
        }
        ["delete", what] => match resolve_addr(cpu, what) {
            Some(addr) if breakpoints.remove(&addr) => println!("breakpoint removed"),
            Some(_) => println!("no breakpoint there"),
            None => println!("unknown address or label: {what}"),
        },
        [what] => match resolve_addr(cpu, what) {
            Some(addr) => {
                breakpoints.insert(addr);
                println!("breakpoint at {addr:#x}");
            }
            None => println!("unknown address or label: {what}"),
        },
        _ => println!("usage: break <addr|label> | break list | break delete <addr>"),
    }
}

fn cmd_print(cpu: &Cpu, args: &[&str]) {
    match args {
        ["mem", addr] => cmd_print(cpu, &["mem", addr, "4"]),
        ["mem", addr, count] => {
            let (Some(addr), Ok(count)) = (resolve_addr(cpu, addr), count.parse::<u32>())
            else {
                println!("usage: print mem <addr> [words]");
                return;
            };
            view::print_memory(cpu, addr, count);
        }
        [reg] => match parse_register(reg) {
            Some(id) => println!("{reg} = {:#010x}", cpu.reg(id).value()),
            None => println!("no such register: {reg}"),
        },
        _ => println!("usage: print <reg> | print mem <addr> [words]"),
    }
}

fn cmd_show(cpu: &Cpu, args: &[&str]) {
    match args.first().copied() {
        Some("cache") => view::print_cache(cpu),
        Some("rob") => view::print_rob(cpu),
        Some("lsq") => view::print_lsq(cpu),
        Some("predictor") => view::print_predictor(cpu),
        Some("regs") => view::print_regs(cpu),
        Some("queue") => view::print_queue(cpu),
        _ => println!("usage: show <cache|rob|lsq|predictor|regs|queue>"),
    }
}

/// Resolves a hex/decimal address or a program label.
fn resolve_addr(cpu: &Cpu, text: &str) -> Option<u32> {
    if let Some(addr) = cpu.symbols().get(text) {
        return Some(*addr);
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).ok();
    }
    // Bare numbers are taken as hex, like every debugger ever.
    u32::from_str_radix(text, 16).ok()
}
