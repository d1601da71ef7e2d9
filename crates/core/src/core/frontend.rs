//! Frontend: instruction fetch, prediction, and the fetch queue.
//!
//! The frontend walks the text section under predictor guidance, pushing
//! fetched instructions with their predictions into a bounded queue the
//! dispatcher drains. Fetching a serializing instruction (`fence.i`,
//! `ecall`, `ebreak`) stalls the frontend until that instruction retires;
//! this also protects the return-address stack from being perturbed when a
//! serializing instruction is closely followed by a return.

use std::collections::VecDeque;

use log::trace;

use crate::asm::instructions::{Instruction, Opcode};
use crate::common::error::Fault;
use crate::units::{BranchPredictor, Btb, ReturnAddressStack};
use super::rob::Prediction;

/// A fetched instruction with its prediction state.
pub struct FetchedInstr {
    /// The instruction.
    pub instr: Instruction,
    /// Direction/target guess, for instructions that can mispredict.
    pub prediction: Option<Prediction>,
    /// RAS contents at fetch (after this instruction's own push/pop), for
    /// the recovery checkpoint.
    pub ras_checkpoint: Option<Vec<u32>>,
}

/// Fetch unit and its queue.
pub struct Frontend {
    code: Vec<Instruction>,
    base: u32,
    limit: u32,
    pc: u32,
    queue: VecDeque<FetchedInstr>,
    capacity: usize,
    stalled: bool,
}

impl Frontend {
    /// Creates a frontend over the given code, starting at `entry`.
    pub fn new(code: Vec<Instruction>, entry: u32, capacity: usize) -> Self {
        let (base, limit) = match code.first() {
            Some(first) => (first.addr, first.addr + code.len() as u32 * 4),
            None => (0, 0),
        };
        Self {
            code,
            base,
            limit,
            pc: entry,
            queue: VecDeque::new(),
            capacity: capacity.max(1),
            stalled: false,
        }
    }

    /// Whether `addr` is a valid instruction address.
    pub fn in_bounds(&self, addr: u32) -> bool {
        addr % 4 == 0 && self.base <= addr && addr < self.limit
    }

    /// The instruction at `addr`.
    pub fn instr_at(&self, addr: u32) -> Result<&Instruction, Fault> {
        if addr % 4 != 0 {
            return Err(Fault::FetchMisaligned(addr));
        }
        if !(self.base <= addr && addr < self.limit) {
            return Err(Fault::FetchOutOfBounds(addr));
        }
        Ok(&self.code[((addr - self.base) / 4) as usize])
    }

    /// Current fetch program counter.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// `[base, limit)` of the text section.
    pub fn bounds(&self) -> (u32, u32) {
        (self.base, self.limit)
    }

    /// Fills the queue, following predictions, until it is full, the PC
    /// leaves the text section, or a serializing instruction stalls fetch.
    pub fn fill(&mut self, bpu: &BranchPredictor, btb: &Btb, ras: &mut ReturnAddressStack) {
        while !self.stalled && self.queue.len() < self.capacity && self.in_bounds(self.pc) {
            let pc = self.pc;
            let instr = self.code[((pc - self.base) / 4) as usize].clone();
            let mut prediction = None;
            let mut ras_checkpoint = None;

            match instr.opcode {
                Opcode::Branch(_) => {
                    let taken = bpu.predict(pc);
                    let target = instr.ops[2];
                    prediction = Some(Prediction { taken, target });
                    ras_checkpoint = Some(ras.snapshot());
                    self.pc = if taken { target } else { pc.wrapping_add(4) };
                }
                Opcode::Jal => {
                    // Always taken; the target is in the instruction, so no
                    // misprediction is possible. The RAS learns about calls.
                    let rd = instr.ops[0] as u8;
                    let target = instr.ops[1];
                    ras.handle(pc, None, rd);
                    self.pc = target;
                }
                Opcode::Jalr => {
                    let rd = instr.ops[0] as u8;
                    let base_reg = instr.ops[1] as u8;
                    let target = ras
                        .handle(pc, Some(base_reg), rd)
                        .or_else(|| btb.lookup(pc))
                        .unwrap_or(pc.wrapping_add(4));
                    prediction = Some(Prediction { taken: true, target });
                    ras_checkpoint = Some(ras.snapshot());
                    self.pc = target;
                }
                ref op if op.is_serializing() => {
                    self.stalled = true;
                    self.pc = pc.wrapping_add(4);
                }
                _ => {
                    self.pc = pc.wrapping_add(4);
                }
            }

            trace!("fetch pc={pc:#x} next={:#x}", self.pc);
            self.queue.push_back(FetchedInstr { instr, prediction, ras_checkpoint });
        }
    }

    /// The oldest queued instruction.
    pub fn peek(&self) -> Option<&FetchedInstr> {
        self.queue.front()
    }

    /// Removes and returns the oldest queued instruction.
    pub fn pop(&mut self) -> Option<FetchedInstr> {
        self.queue.pop_front()
    }

    /// Puts an instruction back at the front (dispatch backpressure).
    pub fn requeue(&mut self, fetched: FetchedInstr) {
        self.queue.push_front(fetched);
    }

    /// Number of queued instructions.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Program counters of the queued instructions, oldest first.
    pub fn queued_pcs(&self) -> Vec<u32> {
        self.queue.iter().map(|f| f.instr.addr).collect()
    }

    /// Empties the queue and cancels any stall.
    pub fn flush(&mut self) {
        self.queue.clear();
        self.stalled = false;
    }

    /// Redirects fetch to `pc`.
    pub fn redirect(&mut self, pc: u32) {
        self.pc = pc;
    }

    /// Ends the stall a serializing instruction induced.
    pub fn unstall(&mut self) {
        self.stalled = false;
    }

    /// Whether the frontend has run out of program: nothing queued and the
    /// PC cannot fetch anything.
    pub fn is_done(&self) -> bool {
        self.queue.is_empty() && !self.stalled && !self.in_bounds(self.pc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::parser::assemble;
    use crate::config::Config;

    fn units() -> (BranchPredictor, Btb, ReturnAddressStack) {
        let c = Config::default();
        (
            BranchPredictor::new(c.predictor.index_bits, c.predictor.init_counter, false),
            Btb::new(c.predictor.btb_index_bits),
            ReturnAddressStack::new(c.predictor.ras_depth),
        )
    }

    fn frontend(src: &str, capacity: usize) -> Frontend {
        let img = assemble(src).unwrap();
        Frontend::new(img.text.code, img.entry_point, capacity)
    }

    #[test]
    fn test_sequential_fetch() {
        let (bpu, btb, mut ras) = units();
        let mut fe = frontend("  li a0, 1\n  li a1, 2\n  li a2, 3\n", 8);
        fe.fill(&bpu, &btb, &mut ras);
        assert_eq!(fe.queue_len(), 3);
        assert_eq!(fe.pop().unwrap().instr.addr, fe.bounds().0);
    }

    #[test]
    fn test_queue_capacity_limits_fetch() {
        let (bpu, btb, mut ras) = units();
        let mut fe = frontend("  li a0, 1\n  li a1, 2\n  li a2, 3\n  li a3, 4\n", 2);
        fe.fill(&bpu, &btb, &mut ras);
        assert_eq!(fe.queue_len(), 2);
        fe.pop();
        fe.fill(&bpu, &btb, &mut ras);
        assert_eq!(fe.queue_len(), 2);
    }

    #[test]
    fn test_predicted_taken_branch_redirects_fetch() {
        let (bpu, btb, mut ras) = units();
        // Default counters predict taken.
        let mut fe = frontend("top:\n  beq a0, a1, top\n  li a0, 1\n", 8);
        fe.fill(&bpu, &btb, &mut ras);
        let first = fe.pop().unwrap();
        assert_eq!(first.prediction.as_ref().map(|p| p.taken), Some(true));
        // Fetch looped back to `top` rather than falling through.
        let second = fe.pop().unwrap();
        assert_eq!(second.instr.addr, first.instr.addr);
    }

    #[test]
    fn test_serializing_instruction_stalls() {
        let (bpu, btb, mut ras) = units();
        let mut fe = frontend("  fence.i\n  li a0, 1\n", 8);
        fe.fill(&bpu, &btb, &mut ras);
        assert_eq!(fe.queue_len(), 1);
        fe.unstall();
        fe.fill(&bpu, &btb, &mut ras);
        assert_eq!(fe.queue_len(), 2);
    }

    #[test]
    fn test_call_pushes_return_address_for_ret() {
        let (bpu, btb, mut ras) = units();
        let src = "\
  call f
  li a0, 1
f:
  ret
";
        let mut fe = frontend(src, 8);
        fe.fill(&bpu, &btb, &mut ras);
        // call, then f's ret, then the return path: li. (Fetch runs on
        // past that speculatively; only the first three matter here.)
        let pcs: Vec<u32> = fe.queued_pcs();
        let base = fe.bounds().0;
        assert_eq!(&pcs[..3], &[base, base + 8, base + 4]);
        // The ret carried a prediction with the RAS target.
        fe.pop();
        let ret = fe.pop().unwrap();
        assert_eq!(ret.prediction.map(|p| p.target), Some(base + 4));
    }

    #[test]
    fn test_is_done() {
        let (bpu, btb, mut ras) = units();
        let mut fe = frontend("  li a0, 1\n", 8);
        assert!(!fe.is_done());
        fe.fill(&bpu, &btb, &mut ras);
        fe.pop();
        assert!(fe.is_done());
    }
}
