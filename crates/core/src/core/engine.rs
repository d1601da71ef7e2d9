//! The cycle loop.
//!
//! Each cycle runs four phases in a fixed order:
//! 1. **Retire:** Commit executed instructions from the ROB head, resolve
//!    control flow, raise faults, run syscalls.
//! 2. **Execute:** Scan the window oldest-to-youngest, ticking every entry
//!    whose operands are ready. Completed results broadcast immediately, so
//!    a chain of single-cycle operations can finish within one scan.
//! 3. **Dispatch:** Drain the fetch queue into the ROB and LSQ, capturing
//!    source operands through the rename table.
//! 4. **Fetch:** Refill the fetch queue under predictor guidance.
//!
//! Running retire first means it observes the previous cycle's results;
//! running fetch last means redirects take effect within the same cycle.

use log::{debug, trace};

use crate::asm::instructions::Opcode;
use crate::common::{Fault, Word};
use crate::mem::Memory;
use crate::sys::syscalls::{self, SyscallOutcome, SyscallRecord};
use super::lsq::{LoadAction, LoadStoreQueue, MemKind};
use super::rename::{Checkpoint, RenameTable};
use super::rob::{Operand, Rob, RobEntry, RobTag};
use super::{Cpu, Status};

/// Why a pipeline flush happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushReason {
    /// A conditional branch resolved against its predicted direction.
    BranchMispredict { pc: u32 },
    /// An indirect jump resolved against its predicted target.
    JumpMispredict { pc: u32 },
    /// A load speculatively bypassed a store that turned out to alias.
    MemoryOrder { pc: u32 },
    /// A fault reached retirement.
    Fault(Fault),
}

/// What happened during one cycle, for the driver and the views.
#[derive(Default)]
pub struct CycleReport {
    /// Program counters dispatched into the window this cycle.
    pub dispatched: Vec<u32>,
    /// Program counters retired this cycle.
    pub retired: Vec<u32>,
    /// Flush, if one occurred.
    pub flush: Option<FlushReason>,
    /// Syscall, if one was dispatched.
    pub syscall: Option<SyscallRecord>,
}

/// Advances the machine by one cycle.
pub(crate) fn step_cycle(cpu: &mut Cpu) -> CycleReport {
    cpu.cycles += 1;
    let mut report = CycleReport::default();

    retire_stage(cpu, &mut report);
    if matches!(cpu.status, Status::Running) {
        execute_stage(cpu, &mut report);
        dispatch_stage(cpu, &mut report);
        fetch_stage(cpu);
    }
    report
}

// ---- retire ------------------------------------------------------------

fn retire_stage(cpu: &mut Cpu, report: &mut CycleReport) {
    for _ in 0..cpu.config.engine.retire_width {
        let Some(head) = cpu.rob.peek_head() else { break };

        // A faulting entry retires only once its (delayed) fault signal has
        // arrived; its value may long since have fed transient dependents.
        if head.fault.is_some() {
            if !head.executed || cpu.cycles < head.fault_ready_at {
                break;
            }
        } else if !head.executed {
            break;
        }

        let Some(entry) = cpu.rob.pop_head() else { break };
        report.retired.push(entry.pc);
        trace!("retire pc={:#x} tag={}", entry.pc, entry.tag.0);

        if let Some(fault) = entry.fault {
            raise_fault(cpu, fault, report);
            break;
        }

        match entry.instr.opcode {
            Opcode::Branch(_) => {
                let actual = entry.taken.unwrap_or(false);
                cpu.bpu.update(entry.pc, actual);
                let predicted = entry.prediction.map(|p| p.taken).unwrap_or(false);
                if actual != predicted {
                    let target = if actual {
                        entry.instr.ops[2]
                    } else {
                        entry.pc.wrapping_add(4)
                    };
                    recovery_flush(
                        cpu,
                        entry.checkpoint.as_ref(),
                        target,
                        FlushReason::BranchMispredict { pc: entry.pc },
                        report,
                    );
                    break;
                }
            }
            Opcode::Jal => {
                write_dest(cpu, &entry);
            }
            Opcode::Jalr => {
                // The link register write is architectural even when the
                // target was mispredicted.
                write_dest(cpu, &entry);
                let computed = entry.target.unwrap_or_else(|| entry.pc.wrapping_add(4));
                cpu.btb.update(entry.pc, computed);
                let predicted =
                    entry.prediction.map(|p| p.target).unwrap_or_else(|| entry.pc.wrapping_add(4));
                if computed != predicted {
                    // A target outside the text section is skipped, like a
                    // faulting memory access would be.
                    let target = if cpu.frontend.in_bounds(computed) {
                        computed
                    } else {
                        entry.pc.wrapping_add(4)
                    };
                    recovery_flush(
                        cpu,
                        entry.checkpoint.as_ref(),
                        target,
                        FlushReason::JumpMispredict { pc: entry.pc },
                        report,
                    );
                    break;
                }
            }
            Opcode::Load { .. } => {
                write_dest(cpu, &entry);
                cpu.lsq.remove(entry.tag);
            }
            Opcode::Store { .. } => {
                if let Some(slot) = cpu.lsq.remove(entry.tag) {
                    if let (Some(addr), Some(value), MemKind::Store { width }) =
                        (slot.addr, slot.value, slot.kind)
                    {
                        cpu.mem.write(addr, value, width as usize);
                    }
                }
            }
            Opcode::CboFlush => {
                if let Some(addr) = entry.target {
                    cpu.mem.flush_line(Word(addr));
                }
            }
            Opcode::FlushAll => {
                cpu.mem.flush_all();
            }
            Opcode::FenceI => {
                cpu.frontend.unstall();
            }
            Opcode::Ecall => {
                retire_ecall(cpu, &entry, report);
                break;
            }
            Opcode::Ebreak => {
                cpu.status = Status::Paused;
                cpu.frontend.redirect(entry.pc.wrapping_add(4));
                cpu.frontend.unstall();
                break;
            }
            _ => {
                write_dest(cpu, &entry);
            }
        }
    }
}

fn retire_ecall(cpu: &mut Cpu, entry: &RobEntry, report: &mut CycleReport) {
    let (outcome, record) = syscalls::dispatch(&mut cpu.regs, &mut cpu.mem, &mut cpu.console);
    cpu.last_syscall = Some(record);
    report.syscall = Some(record);
    debug!("ecall number={} outcome={:?}", record.number, outcome);

    match outcome {
        SyscallOutcome::Exit(code) => {
            cpu.status = Status::Halted { exit_code: code };
            cpu.rob.flush_all();
            cpu.lsq.clear();
            cpu.rename.clear_all();
            cpu.frontend.flush();
        }
        SyscallOutcome::Complete => {
            cpu.frontend.redirect(entry.pc.wrapping_add(4));
            cpu.frontend.unstall();
        }
        SyscallOutcome::NeedInput => {
            // Re-execute the ecall once input has arrived.
            cpu.status = Status::NeedInput;
            cpu.frontend.redirect(entry.pc);
            cpu.frontend.unstall();
        }
    }
}

fn write_dest(cpu: &mut Cpu, entry: &RobEntry) {
    if let Some(rd) = entry.rd {
        cpu.regs[rd as usize] = entry.result;
        cpu.rename.clear_if_match(rd, entry.tag);
    }
}

fn raise_fault(cpu: &mut Cpu, fault: Fault, report: &mut CycleReport) {
    debug!("fault at retire: {fault}");
    cpu.rob.flush_all();
    cpu.lsq.clear();
    cpu.rename.clear_all();
    cpu.frontend.flush();
    cpu.status = Status::Faulted(fault);
    report.flush = Some(FlushReason::Fault(fault));
    cpu.last_flush = report.flush;
}

/// Squashes everything younger than a just-retired control-flow
/// instruction and restores the frontend state from its checkpoint.
fn recovery_flush(
    cpu: &mut Cpu,
    checkpoint: Option<&Checkpoint>,
    redirect: u32,
    reason: FlushReason,
    report: &mut CycleReport,
) {
    debug!("flush: {reason:?} redirect={redirect:#x}");
    cpu.rob.flush_all();
    cpu.lsq.clear();
    match checkpoint {
        Some(cp) => {
            cpu.rename.restore(&cp.rename);
            cpu.ras.restore(&cp.ras);
        }
        None => cpu.rename.clear_all(),
    }
    cpu.frontend.flush();
    cpu.frontend.redirect(redirect);
    report.flush = Some(reason);
    cpu.last_flush = Some(reason);
}

// ---- execute -----------------------------------------------------------

fn execute_stage(cpu: &mut Cpu, report: &mut CycleReport) {
    let now = cpu.cycles;
    let tags = cpu.rob.tags_in_order();
    // Oldest load squashed by a memory-ordering violation this cycle.
    let mut violation: Option<RobTag> = None;

    for tag in tags {
        let mut completed: Option<(RobTag, Word)> = None;
        {
            let Cpu { rob, lsq, mem, .. } = cpu;
            let Some(entry) = rob.find_mut(tag) else { continue };
            if entry.executed {
                continue;
            }
            match entry.instr.opcode {
                Opcode::Load { width, signed } => {
                    exec_load(entry, lsq, mem, now, width, signed, &mut completed)
                }
                Opcode::Store { width } => {
                    exec_store(entry, lsq, mem, now, width, &mut violation)
                }
                _ => exec_simple(entry, now, &mut completed),
            }
        }
        if let Some((tag, result)) = completed {
            cpu.rob.broadcast(tag, result);
        }
    }

    if let Some(victim) = violation {
        memory_order_flush(cpu, victim, report);
    }
}

fn exec_simple(entry: &mut RobEntry, now: u64, completed: &mut Option<(RobTag, Word)>) {
    if entry.srcs.iter().any(|s| s.value().is_none()) {
        return;
    }
    if entry.remaining > 0 {
        entry.remaining -= 1;
        if entry.remaining > 0 {
            return;
        }
    }

    let src = |i: usize| entry.srcs[i].value().unwrap_or(Word::ZERO);
    let result = match entry.instr.opcode {
        Opcode::Alu(op) | Opcode::AluImm(op) => op.apply(src(0), src(1)),
        Opcode::Lui => Word(src(0).value().wrapping_shl(12)),
        Opcode::Auipc => Word(entry.pc.wrapping_add(src(0).value().wrapping_shl(12))),
        Opcode::Branch(cond) => {
            entry.taken = Some(cond.eval(src(0), src(1)));
            entry.target = Some(entry.instr.ops[2]);
            Word::ZERO
        }
        Opcode::Jal => {
            entry.target = Some(entry.instr.ops[1]);
            Word(entry.pc.wrapping_add(4))
        }
        Opcode::Jalr => {
            entry.target = Some(src(0).wrapping_add(src(1)).value());
            Word(entry.pc.wrapping_add(4))
        }
        Opcode::CboFlush => {
            entry.target = Some(src(0).wrapping_add(src(1)).value());
            Word::ZERO
        }
        Opcode::Rdcycle => Word(now as u32),
        _ => Word::ZERO,
    };

    entry.result = result;
    entry.executed = true;
    *completed = Some((entry.tag, result));
}

fn exec_load(
    entry: &mut RobEntry,
    lsq: &mut LoadStoreQueue,
    mem: &mut Memory,
    now: u64,
    width: u8,
    signed: bool,
    completed: &mut Option<(RobTag, Word)>,
) {
    let tag = entry.tag;

    // Resolve the effective address as soon as the base register is ready.
    let addr = match lsq.get(tag).and_then(|e| e.addr) {
        Some(addr) => addr,
        None => {
            let (Some(base), Some(offset)) = (entry.srcs[0].value(), entry.srcs[1].value())
            else {
                return;
            };
            let addr = base.wrapping_add(offset);
            lsq.set_addr(tag, addr);
            entry.target = Some(addr.value());
            addr
        }
    };

    let performed = lsq.get(tag).map(|e| e.performed).unwrap_or(false);
    if !performed {
        match lsq.probe_load(tag) {
            LoadAction::Forward { value, from } => {
                lsq.mark_performed(tag, Vec::new(), Some(from));
                entry.result = value;
                entry.executed = true;
                *completed = Some((tag, value));
                return;
            }
            LoadAction::Wait => return,
            LoadAction::Access { bypassed } => {
                // The access happens *now*, cache fill included, no matter
                // what older branches are still unresolved and whether the
                // address is even legal. Only the value release is delayed.
                let res = mem.read(addr, width as usize, signed);
                lsq.mark_performed(tag, bypassed, None);
                entry.result = res.value;
                entry.ready_at = Some(now + res.cycles_value);
                if res.fault {
                    entry.fault = Some(Fault::LoadAccess(addr));
                    entry.fault_ready_at = now + res.cycles_value + res.cycles_fault;
                }
            }
        }
    }

    if let Some(ready_at) = entry.ready_at {
        if now >= ready_at {
            entry.executed = true;
            *completed = Some((tag, entry.result));
        }
    }
}

fn exec_store(
    entry: &mut RobEntry,
    lsq: &mut LoadStoreQueue,
    mem: &mut Memory,
    now: u64,
    width: u8,
    violation: &mut Option<RobTag>,
) {
    let tag = entry.tag;

    // Address and value can resolve in either order.
    let addr = lsq.get(tag).and_then(|e| e.addr);
    let addr = match addr {
        Some(addr) => Some(addr),
        None => {
            match (entry.srcs[1].value(), entry.srcs[2].value()) {
                (Some(base), Some(offset)) => {
                    let addr = base.wrapping_add(offset);
                    lsq.set_addr(tag, addr);
                    entry.target = Some(addr.value());
                    if mem.is_illegal(addr, width as usize) {
                        entry.fault = Some(Fault::StoreAccess(addr));
                        entry.fault_ready_at = now;
                    }
                    // The address just resolved: any younger load that
                    // already read memory past this store is now suspect.
                    if let Some(victim) = lsq.alias_victim(tag, addr, width) {
                        if violation.map(|v| victim < v).unwrap_or(true) {
                            *violation = Some(victim);
                        }
                    }
                    Some(addr)
                }
                _ => None,
            }
        }
    };

    if lsq.get(tag).and_then(|e| e.value).is_none() {
        if let Some(value) = entry.srcs[0].value() {
            lsq.set_value(tag, value);
        }
    }

    let slot_ready = lsq
        .get(tag)
        .map(|e| e.addr.is_some() && e.value.is_some())
        .unwrap_or(false);
    if addr.is_some() && slot_ready {
        // Ready to retire; the actual memory write waits for retirement.
        entry.executed = true;
    }
}

fn memory_order_flush(cpu: &mut Cpu, victim: RobTag, report: &mut CycleReport) {
    let Some(pc) = cpu.rob.find(victim).map(|e| e.pc) else { return };
    debug!("memory-order violation, squashing from pc={pc:#x}");
    cpu.rob.flush_from(victim);
    cpu.lsq.truncate_from(victim);
    // No checkpoint exists mid-window; rebuild the rename table from the
    // survivors instead.
    cpu.rename.rebuild(&cpu.rob);
    cpu.frontend.flush();
    cpu.frontend.redirect(pc);
    report.flush = Some(FlushReason::MemoryOrder { pc });
    cpu.last_flush = report.flush;
}

// ---- dispatch and fetch ------------------------------------------------

fn dispatch_stage(cpu: &mut Cpu, report: &mut CycleReport) {
    loop {
        let Some(front) = cpu.frontend.peek() else { break };
        if cpu.rob.is_full() {
            break;
        }
        if front.instr.opcode.uses_lsq() && cpu.lsq.is_full() {
            break;
        }
        let Some(fetched) = cpu.frontend.pop() else { break };
        let instr = fetched.instr;
        let opcode = instr.opcode;
        let pc = instr.addr;

        // Capture source operands. Register reads resolve through the
        // rename table; immediates are known outright.
        let mut srcs = Vec::with_capacity(opcode.sources().len());
        for (k, &opi) in opcode.sources().iter().enumerate() {
            let op = instr.ops[opi];
            if opcode.register_sources().contains(&k) {
                srcs.push(resolve_reg(&cpu.rename, &cpu.rob, &cpu.regs, op as u8));
            } else {
                srcs.push(Operand::Value(Word(op)));
            }
        }

        // The zero register never receives a tag; writes to it vanish.
        let rd = instr.destination().filter(|r| *r != 0);

        // Snapshot recovery state for instructions that can mispredict.
        // The rename snapshot is taken before this instruction's own
        // destination is renamed.
        let checkpoint = if matches!(opcode, Opcode::Branch(_) | Opcode::Jalr) {
            Some(Checkpoint {
                rename: cpu.rename.snapshot(),
                ras: fetched.ras_checkpoint.clone().unwrap_or_default(),
                lsq_len: cpu.lsq.len(),
            })
        } else {
            None
        };

        let prediction = fetched.prediction;
        let Some(tag) = cpu.rob.allocate(pc, instr, srcs, rd, prediction, checkpoint) else {
            break;
        };

        let kind = match opcode {
            Opcode::Load { width, signed } => Some(MemKind::Load { width, signed }),
            Opcode::Store { width } => Some(MemKind::Store { width }),
            _ => None,
        };
        if let Some(kind) = kind {
            let _ = cpu.lsq.push(tag, kind);
        }

        if let Some(rd) = rd {
            cpu.rename.set_producer(rd, tag);
        }

        report.dispatched.push(pc);
        trace!("dispatch pc={pc:#x} tag={}", tag.0);
    }
}

fn resolve_reg(rename: &RenameTable, rob: &Rob, regs: &[Word; 32], reg: u8) -> Operand {
    if reg == 0 {
        return Operand::Value(Word::ZERO);
    }
    match rename.producer(reg) {
        Some(tag) => match rob.find(tag) {
            Some(e) if e.executed => Operand::Value(e.result),
            Some(_) => Operand::Pending(tag),
            // The producer already retired (a restored checkpoint can leave
            // such a mapping behind); the committed value is current.
            None => Operand::Value(regs[reg as usize]),
        },
        None => Operand::Value(regs[reg as usize]),
    }
}

fn fetch_stage(cpu: &mut Cpu) {
    let Cpu { frontend, bpu, btb, ras, .. } = cpu;
    frontend.fill(bpu, btb, ras);
}
