//! Control-flow graph construction.
//!
//! One pass over the linear TAC stream.  Edges live in side tables indexed
//! by instruction position: `succ[i]` and `pred[i]` are kept symmetric.
//! `IfZ` flows both to its target and to the next instruction, `Goto` only
//! to its target, `Return` and `EndFunc` flow nowhere, and everything else
//! falls through.

use crate::common::{Id, Map};
use crate::middle::tac::Instruction;

pub struct Cfg {
    pub succ: Vec<Vec<usize>>,
    pub pred: Vec<Vec<usize>>,
}

impl Cfg {
    pub fn build(code: &[Instruction]) -> Cfg {
        // A label stands for the instruction that follows it.
        let mut labels: Map<Id, usize> = Map::new();
        for (i, instr) in code.iter().enumerate() {
            if let Instruction::Label { label } = instr {
                if i + 1 < code.len() {
                    labels.insert(*label, i + 1);
                }
            }
        }
        let resolve = |label: &Id| -> usize {
            *labels
                .get(label)
                .expect("jump target should resolve to an emitted label")
        };

        let mut succ = vec![Vec::new(); code.len()];
        for (i, instr) in code.iter().enumerate() {
            match instr {
                Instruction::Return { .. } | Instruction::EndFunc => {}
                Instruction::Goto { label } => succ[i].push(resolve(label)),
                Instruction::IfZ { label, .. } => {
                    succ[i].push(resolve(label));
                    if i + 1 < code.len() {
                        succ[i].push(i + 1);
                    }
                }
                _ => {
                    if i + 1 < code.len() {
                        succ[i].push(i + 1);
                    }
                }
            }
        }

        let mut pred = vec![Vec::new(); code.len()];
        for (i, successors) in succ.iter().enumerate() {
            for &s in successors {
                pred[s].push(i);
            }
        }
        Cfg { succ, pred }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::id;
    use crate::middle::tac::Location;

    fn tmp(offset: i32) -> Location {
        Location::fp(id(&format!("_tmp{}", -offset)), offset)
    }

    // _L0:  t = 1;  IfZ t _L0;  Goto _L1;  _L1:  Return;  EndFunc
    fn sample() -> Vec<Instruction> {
        vec![
            Instruction::Label { label: id("_L0") },
            Instruction::LoadConst {
                dst: tmp(-8),
                value: 1,
            },
            Instruction::IfZ {
                test: tmp(-8),
                label: id("_L0"),
            },
            Instruction::Goto { label: id("_L1") },
            Instruction::Label { label: id("_L1") },
            Instruction::Return { value: None },
            Instruction::EndFunc,
        ]
    }

    #[test]
    fn branch_links_target_then_fallthrough() {
        let cfg = Cfg::build(&sample());
        assert_eq!(cfg.succ[2], vec![1, 3]);
    }

    #[test]
    fn goto_links_only_its_target() {
        let cfg = Cfg::build(&sample());
        assert_eq!(cfg.succ[3], vec![5]);
    }

    #[test]
    fn return_and_endfunc_terminate() {
        let cfg = Cfg::build(&sample());
        assert!(cfg.succ[5].is_empty());
        assert!(cfg.succ[6].is_empty());
    }

    #[test]
    fn edges_are_symmetric() {
        let cfg = Cfg::build(&sample());
        for (i, successors) in cfg.succ.iter().enumerate() {
            for &s in successors {
                assert!(cfg.pred[s].contains(&i), "missing back edge {s} -> {i}");
            }
        }
        for (i, predecessors) in cfg.pred.iter().enumerate() {
            for &p in predecessors {
                assert!(cfg.succ[p].contains(&i), "missing forward edge {p} -> {i}");
            }
        }
    }
}
