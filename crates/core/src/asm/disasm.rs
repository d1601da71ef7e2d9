//! Instruction disassembler.
//!
//! Renders decoded instructions back into canonical assembly text for the
//! inspection views and diagnostics. Registers use ABI names; memory
//! operands use the `offset(base)` spelling; code targets print as absolute
//! addresses, which the parser accepts back.

use super::instructions::{Instruction, Opcode};
use super::parser::ABI_NAMES;

fn reg(id: u32) -> &'static str {
    ABI_NAMES.get(id as usize).copied().unwrap_or("?")
}

fn imm(v: u32) -> String {
    let signed = v as i32;
    if (-4096..4096).contains(&signed) {
        format!("{signed}")
    } else {
        format!("{v:#x}")
    }
}

/// Formats one instruction as canonical assembly (without its address).
pub fn format_instruction(instr: &Instruction) -> String {
    let name = instr.opcode.mnemonic();
    let ops = &instr.ops;
    match instr.opcode {
        Opcode::Alu(_) => {
            format!("{name} {}, {}, {}", reg(ops[0]), reg(ops[1]), reg(ops[2]))
        }
        Opcode::AluImm(_) => {
            format!("{name} {}, {}, {}", reg(ops[0]), reg(ops[1]), imm(ops[2]))
        }
        Opcode::Lui | Opcode::Auipc => format!("{name} {}, {}", reg(ops[0]), imm(ops[1])),
        Opcode::Load { .. } => {
            format!("{name} {}, {}({})", reg(ops[0]), imm(ops[2]), reg(ops[1]))
        }
        Opcode::Store { .. } => {
            format!("{name} {}, {}({})", reg(ops[0]), imm(ops[2]), reg(ops[1]))
        }
        Opcode::CboFlush => format!("{name} {}({})", imm(ops[1]), reg(ops[0])),
        Opcode::Branch(_) => {
            format!("{name} {}, {}, {}", reg(ops[0]), reg(ops[1]), imm(ops[2]))
        }
        Opcode::Jal => format!("{name} {}, {}", reg(ops[0]), imm(ops[1])),
        Opcode::Jalr => format!("{name} {}, {}, {}", reg(ops[0]), reg(ops[1]), imm(ops[2])),
        Opcode::Rdcycle => format!("{name} {}", reg(ops[0])),
        Opcode::FlushAll | Opcode::FenceI | Opcode::Ecall | Opcode::Ebreak => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::parser::assemble;

    #[test]
    fn test_formatting() {
        let img = assemble(
            "  add t0, t1, t2\n  lw a0, 8(sp)\n  sw a1, -4(s0)\n  cbo.flush 16(a2)\n  ret\n",
        )
        .unwrap();
        let text: Vec<String> = img.text.code.iter().map(format_instruction).collect();
        assert_eq!(text[0], "add t0, t1, t2");
        assert_eq!(text[1], "lw a0, 8(sp)");
        assert_eq!(text[2], "sw a1, -4(s0)");
        assert_eq!(text[3], "cbo.flush 16(a2)");
        assert_eq!(text[4], "jalr zero, ra, 0");
    }

    #[test]
    fn test_round_trip_up_to_alias_normalization() {
        let source = "\
start:
  li a0, 5
  mv a1, a0
  mul a2, a0, a1
  beq a0, a1, start
  lbu t0, 3(a1)
  sh t0, 2(sp)
  jal ra, start
  rdcycle t1
  fence.i
  x.flushall
  ecall
";
        let first = assemble(source).unwrap();
        let rendered: String =
            first.text.code.iter().map(|i| format_instruction(i) + "\n").collect();
        let second = assemble(&rendered).unwrap();
        assert_eq!(first.text.code.len(), second.text.code.len());
        for (a, b) in first.text.code.iter().zip(&second.text.code) {
            assert_eq!(a.opcode, b.opcode);
            assert_eq!(a.ops, b.ops);
        }
    }
}
