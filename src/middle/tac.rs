//! Three-address code.
//!
//! The back end lowers the AST into one linear stream of [Instruction]s.
//! Operands are [Location]s: a semantic description of where a value lives at
//! runtime (stack frame or global segment, plus a byte offset).  Locations
//! are plain values; two of them are the same variable exactly when their
//! (name, segment, offset) triples match, and that triple is also the order
//! used for every live set and interference edge, so iteration order (and
//! with it the emitted assembly) is deterministic.

use std::fmt;

use derive_more::Display;

use crate::common::{Id, Map, Set};

/// Which base register a [Location]'s offset is relative to.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord)]
pub enum Segment {
    /// The stack frame: formals at positive offsets, locals and temporaries
    /// at offsets ≤ −8.
    #[display("fpRelative")]
    FpRelative,
    /// The global data segment.
    #[display("gpRelative")]
    GpRelative,
}

/// A variable or temporary at runtime.
///
/// Field order matters: the derived `Ord` compares name, then segment, then
/// offset, the canonical order for all ordered sets keyed by location.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location {
    pub name: Id,
    pub segment: Segment,
    pub offset: i32,
}

impl Location {
    pub fn fp(name: Id, offset: i32) -> Location {
        Location {
            name,
            segment: Segment::FpRelative,
            offset,
        }
    }

    pub fn gp(name: Id, offset: i32) -> Location {
        Location {
            name,
            segment: Segment::GpRelative,
            offset,
        }
    }

    pub fn is_frame(&self) -> bool {
        self.segment == Segment::FpRelative
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The binary operators that exist in TAC.
///
/// Relational forms beyond `<` and equality beyond `==` are rewritten by the
/// emitter in terms of these.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord)]
pub enum OpCode {
    #[display("+")]
    Add,
    #[display("-")]
    Sub,
    #[display("*")]
    Mul,
    #[display("/")]
    Div,
    #[display("%")]
    Mod,
    #[display("==")]
    Eq,
    #[display("<")]
    Less,
    #[display("&&")]
    And,
    #[display("||")]
    Or,
}

impl OpCode {
    /// The MIPS mnemonic computing this operation into a register.
    /// Division and modulo are special-cased by the emitter (`div` plus
    /// `mflo`/`mfhi`) and never consult this name.
    pub fn mips(self) -> &'static str {
        match self {
            OpCode::Add => "add",
            OpCode::Sub => "sub",
            OpCode::Mul => "mul",
            OpCode::Div => "div",
            OpCode::Mod => "rem",
            OpCode::Eq => "seq",
            OpCode::Less => "slt",
            OpCode::And => "and",
            OpCode::Or => "or",
        }
    }
}

/// Live-variable sets, ordered by [Location]'s total order.
pub type LiveSet = Set<Location>;

/// Interference adjacency, ordered the same way.
pub type InterferenceGraph = Map<Location, Set<Location>>;

/// A single TAC instruction.
#[derive(Clone, Debug)]
pub enum Instruction {
    LoadConst {
        dst: Location,
        value: i32,
    },
    LoadStr {
        dst: Location,
        value: String,
    },
    LoadLabel {
        dst: Location,
        label: Id,
    },
    Assign {
        dst: Location,
        src: Location,
    },
    /// `dst = *(src + offset)`
    Load {
        dst: Location,
        src: Location,
        offset: i32,
    },
    /// `*(dst + offset) = src`
    Store {
        dst: Location,
        src: Location,
        offset: i32,
    },
    BinaryOp {
        op: OpCode,
        dst: Location,
        lhs: Location,
        rhs: Location,
    },
    Label {
        label: Id,
    },
    Goto {
        label: Id,
    },
    IfZ {
        test: Location,
        label: Id,
    },
    /// Function prologue marker.  The frame size is backpatched once the
    /// body has been emitted and the frame cursor has settled.
    BeginFunc {
        frame_size: i32,
        formals: Vec<Location>,
    },
    EndFunc,
    Return {
        value: Option<Location>,
    },
    PushParam {
        param: Location,
    },
    PopParams {
        bytes: i32,
    },
    LCall {
        label: Id,
        dst: Option<Location>,
    },
    ACall {
        addr: Location,
        dst: Option<Location>,
    },
    VTable {
        class: Id,
        methods: Vec<Id>,
    },
}

// Globals never participate in liveness: they may alias across calls, so
// they always stay in memory.
fn frame_only<const N: usize>(locations: [Location; N]) -> LiveSet {
    locations.into_iter().filter(Location::is_frame).collect()
}

impl Instruction {
    /// Locations read by this instruction (frame-resident only).
    pub fn gen(&self) -> LiveSet {
        use Instruction::*;
        match self {
            Assign { src, .. } => frame_only([*src]),
            Load { src, .. } => frame_only([*src]),
            Store { dst, src, .. } => frame_only([*dst, *src]),
            BinaryOp { lhs, rhs, .. } => frame_only([*lhs, *rhs]),
            IfZ { test, .. } => frame_only([*test]),
            Return { value: Some(value) } => frame_only([*value]),
            PushParam { param } => frame_only([*param]),
            _ => LiveSet::new(),
        }
    }

    /// Locations written by this instruction (frame-resident only).
    pub fn kill(&self) -> LiveSet {
        use Instruction::*;
        match self {
            LoadConst { dst, .. }
            | LoadStr { dst, .. }
            | LoadLabel { dst, .. }
            | Assign { dst, .. }
            | Load { dst, .. }
            | BinaryOp { dst, .. } => frame_only([*dst]),
            LCall { dst: Some(dst), .. } | ACall { dst: Some(dst), .. } => frame_only([*dst]),
            _ => LiveSet::new(),
        }
    }

}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;
        match self {
            LoadConst { dst, value } => write!(f, "{dst} = {value}"),
            LoadStr { dst, value } => write!(f, "{dst} = \"{value}\""),
            LoadLabel { dst, label } => write!(f, "{dst} = {label}"),
            Assign { dst, src } => write!(f, "{dst} = {src}"),
            Load { dst, src, offset } => {
                if *offset != 0 {
                    write!(f, "{dst} = *({src} + {offset})")
                } else {
                    write!(f, "{dst} = *({src})")
                }
            }
            Store { dst, src, offset } => {
                if *offset != 0 {
                    write!(f, "*({dst} + {offset}) = {src}")
                } else {
                    write!(f, "*({dst}) = {src}")
                }
            }
            BinaryOp { op, dst, lhs, rhs } => write!(f, "{dst} = {lhs} {op} {rhs}"),
            Label { label } => write!(f, "{label}:"),
            Goto { label } => write!(f, "Goto {label}"),
            IfZ { test, label } => write!(f, "IfZ {test} Goto {label}"),
            BeginFunc { frame_size, .. } => write!(f, "BeginFunc {frame_size}"),
            EndFunc => write!(f, "EndFunc"),
            Return { value: Some(value) } => write!(f, "Return {value}"),
            Return { value: None } => write!(f, "Return "),
            PushParam { param } => write!(f, "PushParam {param}"),
            PopParams { bytes } => write!(f, "PopParams {bytes}"),
            LCall { label, dst: Some(dst) } => write!(f, "{dst} = LCall {label}"),
            LCall { label, dst: None } => write!(f, "LCall {label}"),
            ACall { addr, dst: Some(dst) } => write!(f, "{dst} = ACall {addr}"),
            ACall { addr, dst: None } => write!(f, "ACall {addr}"),
            VTable { class, .. } => write!(f, "VTable for class {class}"),
        }
    }
}

/// Render a TAC stream the way the `--out tac` dump shows it: labels flush
/// left, instructions indented and `;`-terminated, vtables expanded.
pub fn print_tac(code: &[Instruction]) -> String {
    use fmt::Write;

    let mut out = String::new();
    for instr in code {
        match instr {
            Instruction::Label { label } => {
                writeln!(out, "{label}:").expect("writing to a string cannot fail");
            }
            Instruction::VTable { class, methods } => {
                writeln!(out, "VTable {class} =").expect("writing to a string cannot fail");
                for method in methods {
                    writeln!(out, "\t{method},").expect("writing to a string cannot fail");
                }
                writeln!(out, "; ").expect("writing to a string cannot fail");
            }
            other => {
                writeln!(out, "\t{other} ;").expect("writing to a string cannot fail");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::id;

    fn tmp(name: &str, offset: i32) -> Location {
        Location::fp(id(name), offset)
    }

    #[test]
    fn instructions_print_in_tac_syntax() {
        let a = tmp("_tmp0", -8);
        let b = tmp("_tmp1", -12);
        let c = tmp("_tmp2", -16);
        assert_eq!(
            Instruction::LoadConst { dst: a, value: 5 }.to_string(),
            "_tmp0 = 5"
        );
        assert_eq!(
            Instruction::BinaryOp {
                op: OpCode::Less,
                dst: c,
                lhs: a,
                rhs: b
            }
            .to_string(),
            "_tmp2 = _tmp0 < _tmp1"
        );
        assert_eq!(
            Instruction::Load {
                dst: a,
                src: b,
                offset: -4
            }
            .to_string(),
            "_tmp0 = *(_tmp1 + -4)"
        );
        assert_eq!(
            Instruction::Store {
                dst: a,
                src: b,
                offset: 0
            }
            .to_string(),
            "*(_tmp0) = _tmp1"
        );
        assert_eq!(
            Instruction::IfZ {
                test: a,
                label: id("_L0")
            }
            .to_string(),
            "IfZ _tmp0 Goto _L0"
        );
        assert_eq!(
            Instruction::LCall {
                label: id("_PrintInt"),
                dst: None
            }
            .to_string(),
            "LCall _PrintInt"
        );
    }

    #[test]
    fn globals_stay_out_of_gen_and_kill() {
        let global = Location::gp(id("g"), 0);
        let local = tmp("_tmp0", -8);
        let assign = Instruction::Assign {
            dst: global,
            src: local,
        };
        assert!(assign.kill().is_empty());
        assert_eq!(assign.gen().into_iter().collect::<Vec<_>>(), vec![local]);
    }

    #[test]
    fn location_order_is_name_segment_offset() {
        let by_name_a = tmp("a", -12);
        let by_name_b = tmp("b", -8);
        assert!(by_name_a < by_name_b);

        let fp = Location::fp(id("x"), 4);
        let gp = Location::gp(id("x"), 0);
        assert!(fp < gp);

        let low = Location::fp(id("x"), -12);
        let high = Location::fp(id("x"), -8);
        assert!(low < high);
    }

    #[test]
    fn store_generates_both_operands() {
        let addr = tmp("_tmp0", -8);
        let value = tmp("_tmp1", -12);
        let store = Instruction::Store {
            dst: addr,
            src: value,
            offset: 4,
        };
        let gen = store.gen();
        assert!(gen.contains(&addr) && gen.contains(&value));
        assert!(store.kill().is_empty());
    }
}
