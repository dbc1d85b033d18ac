//! The MIPS back end.
//!
//! Translates the TAC stream instruction by instruction for the SPIM
//! simulator, echoing each instruction's TAC form as a comment above its
//! assembly.
//!
//! # Register discipline
//!
//! A location the allocator gave a register lives in that register for the
//! whole function: formals are filled in the prologue, definitions write
//! the register, and uses read it directly with no per-use fills.  Its
//! frame slot is brought up to date only around calls, where every live
//! allocated location is spilled before the jump and refilled after it
//! (uniform caller-saves).  A location without a register is loaded into a
//! scratch register around each use and written straight back.
//!
//! # Scratch registers
//!
//! All eighteen general-purpose registers belong to the allocator, so the
//! emitter scratches in `$v0`/`$v1`.  Neither is ever live across an
//! instruction; `$v0` doubling as the call-result register composes because
//! results are moved out immediately after the jump.
//!
//! # Runtime library
//!
//! The eight builtins the generated code calls (`_Alloc`, `_PrintInt`, …)
//! are appended after the program text, so one `.asm` file runs under
//! `spim -file` with nothing else on the side.  Builtins take their
//! arguments from the caller's pushed stack slots and return in `$v0`,
//! the same convention every generated call uses.

use derive_more::Display;

use super::liveness::Liveness;
use crate::common::{id, Id, Map, Set};
use crate::middle::tac::{Instruction, Location, OpCode, Segment};

/// The MIPS register file, in register-file order.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum Register {
    #[display("$zero")]
    Zero,
    #[display("$at")]
    At,
    #[display("$v0")]
    V0,
    #[display("$v1")]
    V1,
    #[display("$a0")]
    A0,
    #[display("$a1")]
    A1,
    #[display("$a2")]
    A2,
    #[display("$a3")]
    A3,
    #[display("$t0")]
    T0,
    #[display("$t1")]
    T1,
    #[display("$t2")]
    T2,
    #[display("$t3")]
    T3,
    #[display("$t4")]
    T4,
    #[display("$t5")]
    T5,
    #[display("$t6")]
    T6,
    #[display("$t7")]
    T7,
    #[display("$s0")]
    S0,
    #[display("$s1")]
    S1,
    #[display("$s2")]
    S2,
    #[display("$s3")]
    S3,
    #[display("$s4")]
    S4,
    #[display("$s5")]
    S5,
    #[display("$s6")]
    S6,
    #[display("$s7")]
    S7,
    #[display("$t8")]
    T8,
    #[display("$t9")]
    T9,
    #[display("$k0")]
    K0,
    #[display("$k1")]
    K1,
    #[display("$gp")]
    Gp,
    #[display("$sp")]
    Sp,
    #[display("$fp")]
    Fp,
    #[display("$ra")]
    Ra,
}

/// The registers the allocator may hand out, in preference order.
pub const GENERAL_PURPOSE: [Register; 18] = [
    Register::T0,
    Register::T1,
    Register::T2,
    Register::T3,
    Register::T4,
    Register::T5,
    Register::T6,
    Register::T7,
    Register::S0,
    Register::S1,
    Register::S2,
    Register::S3,
    Register::S4,
    Register::S5,
    Register::S6,
    Register::S7,
    Register::T8,
    Register::T9,
];

pub const NUM_REGISTERS: usize = GENERAL_PURPOSE.len();

/// The assembly writer.
pub struct Mips {
    out: String,
    registers: Map<Location, Register>,
    /// String literal pool: content to `.data` label, first use wins.
    strings: Map<String, Id>,
    next_string: u32,
}

impl Mips {
    pub fn new(registers: Map<Location, Register>) -> Mips {
        Mips {
            out: String::new(),
            registers,
            strings: Map::new(),
            next_string: 0,
        }
    }

    /// Translate the whole stream and return the assembly text.
    pub fn emit(mut self, code: &[Instruction], live: &Liveness) -> String {
        self.preamble();
        for (i, instr) in code.iter().enumerate() {
            self.instruction(instr, &live.live_in[i]);
        }
        self.runtime();
        self.out
    }

    // ---- text helpers ----------------------------------------------------

    fn line(&mut self, text: &str) {
        self.out.push('\t');
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn label_line(&mut self, label: Id) {
        self.out.push_str(&format!("{label}:\n"));
    }

    fn base(segment: Segment) -> Register {
        match segment {
            Segment::FpRelative => Register::Fp,
            Segment::GpRelative => Register::Gp,
        }
    }

    // ---- register plumbing ----------------------------------------------

    /// A register holding the current value of `loc`.  An allocated
    /// location is read straight from its register; anything else is
    /// loaded into the scratch register.
    fn read(&mut self, loc: Location, scratch: Register) -> Register {
        match self.registers.get(&loc).copied() {
            Some(register) => register,
            None => {
                let base = Self::base(loc.segment);
                self.line(&format!("lw {scratch}, {}({base})", loc.offset));
                scratch
            }
        }
    }

    /// The register a definition of `loc` should compute into.
    fn def_reg(&self, loc: Location, scratch: Register) -> Register {
        self.registers.get(&loc).copied().unwrap_or(scratch)
    }

    /// Complete a definition: memory-resident locations are written back.
    fn finish_def(&mut self, loc: Location, register: Register) {
        if !self.registers.contains_key(&loc) {
            let base = Self::base(loc.segment);
            self.line(&format!("sw {register}, {}({base})", loc.offset));
        }
    }

    /// Move `value` into `loc`'s home, register or memory.
    fn write(&mut self, loc: Location, value: Register) {
        match self.registers.get(&loc).copied() {
            Some(register) => {
                if register != value {
                    self.line(&format!("move {register}, {value}"));
                }
            }
            None => {
                let base = Self::base(loc.segment);
                self.line(&format!("sw {value}, {}({base})", loc.offset));
            }
        }
    }

    // ---- instruction translation ----------------------------------------

    fn instruction(&mut self, instr: &Instruction, live_in: &Set<Location>) {
        if !matches!(instr, Instruction::Label { .. }) {
            self.out.push_str(&format!("\t# {instr}\n"));
        }
        match instr {
            Instruction::LoadConst { dst, value } => {
                let register = self.def_reg(*dst, Register::V0);
                self.line(&format!("li {register}, {value}"));
                self.finish_def(*dst, register);
            }
            Instruction::LoadStr { dst, value } => {
                let label = self.string_label(value);
                let register = self.def_reg(*dst, Register::V0);
                self.line(&format!("la {register}, {label}"));
                self.finish_def(*dst, register);
            }
            Instruction::LoadLabel { dst, label } => {
                let register = self.def_reg(*dst, Register::V0);
                self.line(&format!("la {register}, {label}"));
                self.finish_def(*dst, register);
            }
            Instruction::Assign { dst, src } => {
                let value = self.read(*src, Register::V0);
                self.write(*dst, value);
            }
            Instruction::Load { dst, src, offset } => {
                let address = self.read(*src, Register::V0);
                let register = self.def_reg(*dst, Register::V0);
                self.line(&format!("lw {register}, {offset}({address})"));
                self.finish_def(*dst, register);
            }
            Instruction::Store { dst, src, offset } => {
                let address = self.read(*dst, Register::V0);
                let value = self.read(*src, Register::V1);
                self.line(&format!("sw {value}, {offset}({address})"));
            }
            Instruction::BinaryOp { op, dst, lhs, rhs } => {
                let left = self.read(*lhs, Register::V0);
                let right = self.read(*rhs, Register::V1);
                let register = self.def_reg(*dst, Register::V0);
                match op {
                    OpCode::Div => {
                        self.line(&format!("div {left}, {right}"));
                        self.line(&format!("mflo {register}"));
                    }
                    OpCode::Mod => {
                        self.line(&format!("div {left}, {right}"));
                        self.line(&format!("mfhi {register}"));
                    }
                    _ => self.line(&format!("{} {register}, {left}, {right}", op.mips())),
                }
                self.finish_def(*dst, register);
            }
            Instruction::Label { label } => self.label_line(*label),
            Instruction::Goto { label } => self.line(&format!("b {label}")),
            Instruction::IfZ { test, label } => {
                let register = self.read(*test, Register::V0);
                self.line(&format!("beqz {register}, {label}"));
            }
            Instruction::BeginFunc { frame_size, formals } => {
                self.line("subu $sp, $sp, 8\t# decrement sp to make space to save ra, fp");
                self.line("sw $fp, 8($sp)\t# save fp");
                self.line("sw $ra, 4($sp)\t# save ra");
                self.line("addiu $fp, $sp, 8\t# set up new fp");
                if *frame_size > 0 {
                    self.line(&format!(
                        "subu $sp, $sp, {frame_size}\t# decrement sp to make space for locals/temps"
                    ));
                }
                for formal in formals {
                    if let Some(register) = self.registers.get(formal).copied() {
                        self.line(&format!("lw {register}, {}($fp)", formal.offset));
                    }
                }
            }
            Instruction::EndFunc => self.epilogue(),
            Instruction::Return { value } => {
                if let Some(value) = value {
                    let register = self.read(*value, Register::V0);
                    if register != Register::V0 {
                        self.line(&format!("move $v0, {register}"));
                    }
                }
                self.epilogue();
            }
            Instruction::PushParam { param } => {
                let register = self.read(*param, Register::V0);
                self.line("subu $sp, $sp, 4\t# decrement sp to make space for param");
                self.line(&format!("sw {register}, 4($sp)\t# copy param value to stack"));
            }
            Instruction::PopParams { bytes } => {
                self.line(&format!("add $sp, $sp, {bytes}\t# pop params off stack"));
            }
            Instruction::LCall { label, dst } => {
                self.spill(live_in);
                self.line(&format!("jal {label}\t# jump to function"));
                if let Some(dst) = dst {
                    self.write(*dst, Register::V0);
                }
                self.refill(live_in);
            }
            Instruction::ACall { addr, dst } => {
                self.spill(live_in);
                let target = self.read(*addr, Register::V0);
                self.line(&format!("jalr {target}\t# jump to function address"));
                if let Some(dst) = dst {
                    self.write(*dst, Register::V0);
                }
                self.refill(live_in);
            }
            Instruction::VTable { class, methods } => {
                self.line(".data");
                self.line(".align 2");
                self.label_line(*class);
                for method in methods {
                    self.line(&format!(".word {method}"));
                }
                self.line(".text");
            }
        }
    }

    fn epilogue(&mut self) {
        self.line("move $sp, $fp\t# pop callee frame off stack");
        self.line("lw $ra, -4($fp)\t# restore saved ra");
        self.line("lw $fp, 0($fp)\t# restore saved fp");
        self.line("jr $ra\t# return from function");
    }

    // Caller-saves: synchronize every live allocated location's frame slot
    // before a call, and bring the registers back after it.
    fn spill(&mut self, live_in: &Set<Location>) {
        for loc in live_in {
            if let Some(register) = self.registers.get(loc).copied() {
                let base = Self::base(loc.segment);
                self.line(&format!("sw {register}, {}({base})", loc.offset));
            }
        }
    }

    fn refill(&mut self, live_in: &Set<Location>) {
        for loc in live_in {
            if let Some(register) = self.registers.get(loc).copied() {
                let base = Self::base(loc.segment);
                self.line(&format!("lw {register}, {}({base})", loc.offset));
            }
        }
    }

    fn string_label(&mut self, value: &str) -> Id {
        if let Some(label) = self.strings.get(value) {
            return *label;
        }
        let label = id(&format!("_string{}", self.next_string));
        self.next_string += 1;
        self.line(".data\t\t\t# create string constant marked with label");
        self.out.push_str(&format!("{label}: .asciiz \"{value}\"\n"));
        self.line(".text");
        self.strings.insert(value.to_string(), label);
        label
    }

    fn preamble(&mut self) {
        self.out.push_str("# standard Decaf preamble\n");
        self.line(".text");
        self.line(".align 2");
        self.line(".globl main");
    }

    fn runtime(&mut self) {
        self.out.push_str(RUNTIME);
    }
}

/// SPIM implementations of the eight builtin entry points.  Arguments are
/// read from the caller's pushed stack slots (`4($sp)`, `8($sp)`); results
/// come back in `$v0`.
const RUNTIME: &str = r#"
# runtime library
_PrintInt:
	lw $a0, 4($sp)
	li $v0, 1
	syscall
	jr $ra

_PrintString:
	lw $a0, 4($sp)
	li $v0, 4
	syscall
	jr $ra

_PrintBool:
	lw $t2, 4($sp)
	beqz $t2, _PrintBoolFalse
	la $a0, _PrintBoolTrueString
	b _PrintBoolEnd
_PrintBoolFalse:
	la $a0, _PrintBoolFalseString
_PrintBoolEnd:
	li $v0, 4
	syscall
	jr $ra

	.data
_PrintBoolTrueString: .asciiz "true"
_PrintBoolFalseString: .asciiz "false"
	.text

_Alloc:
	lw $a0, 4($sp)
	li $v0, 9
	syscall
	jr $ra

_StringEqual:
	lw $t0, 4($sp)
	lw $t1, 8($sp)
	li $v0, 0
_StringEqualLoop:
	lb $t2, ($t0)
	lb $t3, ($t1)
	bne $t2, $t3, _StringEqualEnd
	beqz $t2, _StringEqualYes
	addiu $t0, $t0, 1
	addiu $t1, $t1, 1
	b _StringEqualLoop
_StringEqualYes:
	li $v0, 1
_StringEqualEnd:
	jr $ra

_Halt:
	li $v0, 10
	syscall

_ReadInteger:
	li $v0, 5
	syscall
	jr $ra

_ReadLine:
	la $a0, _ReadLineBuffer
	li $a1, 128
	li $v0, 8
	syscall
	la $t0, _ReadLineBuffer
_ReadLineLoop:
	lb $t1, ($t0)
	beqz $t1, _ReadLineEnd
	addiu $t0, $t0, 1
	bne $t1, 10, _ReadLineLoop
	sb $zero, -1($t0)
_ReadLineEnd:
	la $v0, _ReadLineBuffer
	jr $ra

	.data
_ReadLineBuffer: .space 128
	.text
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::back::cfg::Cfg;
    use crate::back::liveness;

    fn emit_bare(code: Vec<Instruction>) -> String {
        let cfg = Cfg::build(&code);
        let live = liveness::analyze(&code, &cfg);
        Mips::new(Map::new()).emit(&code, &live)
    }

    #[test]
    fn string_literals_are_pooled() {
        let a = Location::fp(id("_tmp0"), -8);
        let b = Location::fp(id("_tmp1"), -12);
        let asm = emit_bare(vec![
            Instruction::LoadStr {
                dst: a,
                value: "hi".to_string(),
            },
            Instruction::LoadStr {
                dst: b,
                value: "hi".to_string(),
            },
            Instruction::EndFunc,
        ]);
        assert_eq!(asm.matches("_string0: .asciiz \"hi\"").count(), 1);
        assert_eq!(asm.matches("la $v0, _string0").count(), 2);
    }

    #[test]
    fn memory_resident_binary_op_scratches_in_v0_v1() {
        let a = Location::fp(id("a"), -8);
        let b = Location::fp(id("b"), -12);
        let c = Location::fp(id("c"), -16);
        let asm = emit_bare(vec![
            Instruction::BinaryOp {
                op: OpCode::Add,
                dst: c,
                lhs: a,
                rhs: b,
            },
            Instruction::EndFunc,
        ]);
        assert!(asm.contains("lw $v0, -8($fp)"));
        assert!(asm.contains("lw $v1, -12($fp)"));
        assert!(asm.contains("add $v0, $v0, $v1"));
        assert!(asm.contains("sw $v0, -16($fp)"));
    }

    #[test]
    fn allocated_locations_use_their_registers() {
        let a = Location::fp(id("a"), -8);
        let b = Location::fp(id("b"), -12);
        let code = vec![
            Instruction::LoadConst { dst: a, value: 3 },
            Instruction::Assign { dst: b, src: a },
            Instruction::Return { value: Some(b) },
            Instruction::EndFunc,
        ];
        let cfg = Cfg::build(&code);
        let live = liveness::analyze(&code, &cfg);
        let registers: Map<Location, Register> =
            [(a, Register::T0), (b, Register::T1)].into_iter().collect();
        let asm = Mips::new(registers).emit(&code, &live);
        assert!(asm.contains("li $t0, 3"));
        assert!(asm.contains("move $t1, $t0"));
        assert!(asm.contains("move $v0, $t1"));
        // No frame traffic outside the prologue-free snippet.
        assert!(!asm.contains("sw $t0"));
    }

    #[test]
    fn runtime_library_rides_along() {
        let asm = emit_bare(vec![Instruction::EndFunc]);
        for entry in [
            "_Alloc:",
            "_ReadLine:",
            "_ReadInteger:",
            "_StringEqual:",
            "_PrintInt:",
            "_PrintString:",
            "_PrintBool:",
            "_Halt:",
        ] {
            assert!(asm.contains(entry), "{entry} missing from runtime");
        }
    }

    #[test]
    fn division_goes_through_mflo() {
        let a = Location::fp(id("a"), -8);
        let asm = emit_bare(vec![
            Instruction::BinaryOp {
                op: OpCode::Div,
                dst: a,
                lhs: a,
                rhs: a,
            },
            Instruction::EndFunc,
        ]);
        assert!(asm.contains("div $v0, $v1"));
        assert!(asm.contains("mflo $v0"));
    }
}
