//! Live-variable analysis.
//!
//! Classic backward dataflow over the instruction stream, iterated to a
//! fixed point:
//!
//! - `live_out[i] = ∪ live_in[s]` over the successors `s` of `i`;
//! - `live_in[i]  = gen[i] ∪ (live_out[i] − kill[i])`.
//!
//! Each sweep walks the stream in reverse so values flow against the
//! dominant fallthrough direction; the sweep repeats while any `live_out`
//! still changes.  Only frame-resident locations participate: globals may
//! alias across calls and always stay in memory, so [Instruction::gen] and
//! [Instruction::kill] filter them out at the source.

use super::cfg::Cfg;
use crate::middle::tac::{Instruction, LiveSet};

pub struct Liveness {
    pub live_in: Vec<LiveSet>,
    pub live_out: Vec<LiveSet>,
}

pub fn analyze(code: &[Instruction], cfg: &Cfg) -> Liveness {
    let gen: Vec<LiveSet> = code.iter().map(Instruction::gen).collect();
    let kill: Vec<LiveSet> = code.iter().map(Instruction::kill).collect();
    let mut live_in = vec![LiveSet::new(); code.len()];
    let mut live_out = vec![LiveSet::new(); code.len()];

    let mut changed = true;
    while changed {
        changed = false;
        for i in (0..code.len()).rev() {
            let mut out = LiveSet::new();
            for &s in &cfg.succ[i] {
                out.extend(live_in[s].iter().copied());
            }
            if out != live_out[i] {
                changed = true;
            }
            let mut live = out.clone();
            for killed in &kill[i] {
                live.remove(killed);
            }
            live.extend(gen[i].iter().copied());
            live_out[i] = out;
            live_in[i] = live;
        }
    }

    Liveness { live_in, live_out }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::id;
    use crate::middle::tac::{Location, OpCode};

    fn tmp(name: &str, offset: i32) -> Location {
        Location::fp(id(name), offset)
    }

    //      a = 1
    //      b = 2
    //      c = a + b
    //      Return c
    #[test]
    fn straight_line_liveness() {
        let a = tmp("a", -8);
        let b = tmp("b", -12);
        let c = tmp("c", -16);
        let code = vec![
            Instruction::LoadConst { dst: a, value: 1 },
            Instruction::LoadConst { dst: b, value: 2 },
            Instruction::BinaryOp {
                op: OpCode::Add,
                dst: c,
                lhs: a,
                rhs: b,
            },
            Instruction::Return { value: Some(c) },
        ];
        let cfg = Cfg::build(&code);
        let live = analyze(&code, &cfg);

        assert!(live.live_in[0].is_empty());
        assert_eq!(live.live_out[0], [a].into_iter().collect());
        assert_eq!(live.live_in[2], [a, b].into_iter().collect());
        assert_eq!(live.live_out[2], [c].into_iter().collect());
        assert!(live.live_out[3].is_empty());
    }

    // A loop keeps its counter live around the back edge.
    //
    //      i = 0
    // _L0: IfZ i Goto _L1
    //      i = i - one    (one defined before the loop)
    //      Goto _L0
    // _L1: Return
    #[test]
    fn loop_carries_values_around_the_back_edge() {
        let i = tmp("i", -8);
        let one = tmp("one", -12);
        let code = vec![
            Instruction::LoadConst { dst: one, value: 1 },
            Instruction::LoadConst { dst: i, value: 0 },
            Instruction::Label { label: id("_L0") },
            Instruction::IfZ {
                test: i,
                label: id("_L1"),
            },
            Instruction::BinaryOp {
                op: OpCode::Sub,
                dst: i,
                lhs: i,
                rhs: one,
            },
            Instruction::Goto { label: id("_L0") },
            Instruction::Label { label: id("_L1") },
            Instruction::Return { value: None },
        ];
        let cfg = Cfg::build(&code);
        let live = analyze(&code, &cfg);

        // Both the counter and the loop-invariant operand are live at the
        // branch.
        assert_eq!(live.live_in[3], [i, one].into_iter().collect());
        // The fixed point holds everywhere.
        for idx in 0..code.len() {
            let mut out = LiveSet::new();
            for &s in &cfg.succ[idx] {
                out.extend(live.live_in[s].iter().copied());
            }
            assert_eq!(out, live.live_out[idx], "live_out mismatch at {idx}");
            let mut expect_in = out.clone();
            for killed in &code[idx].kill() {
                expect_in.remove(killed);
            }
            expect_in.extend(code[idx].gen());
            assert_eq!(expect_in, live.live_in[idx], "live_in mismatch at {idx}");
        }
    }
}
