//! Interference-graph register allocation.
//!
//! Works one function at a time (a `BeginFunc … EndFunc` region of the
//! stream).  The graph is built from liveness: each instruction's `live_in`
//! set forms a clique, and every location the instruction kills interferes
//! with everything live into it.  Coloring is greedy: repeatedly remove the
//! node of highest remaining degree onto a stack, then pop and assign the
//! first free register; a node whose saved neighborhood already reaches the
//! register count stays in memory.  Memory-resident locations need no spill
//! code; they are already addressable at their frame offset.

use super::liveness::Liveness;
use super::mips::{Register, GENERAL_PURPOSE, NUM_REGISTERS};
use crate::common::{Map, Set};
use crate::middle::tac::{Instruction, InterferenceGraph, Location};

/// The allocator's result: the per-function graphs (kept for inspection)
/// and one register assignment keyed by location identity.  Absence from
/// the map means the location stays in memory.
pub struct Allocation {
    pub graphs: Vec<InterferenceGraph>,
    pub registers: Map<Location, Register>,
}

pub fn allocate(code: &[Instruction], live: &Liveness) -> Allocation {
    let graphs = build_graphs(code, live);
    let mut registers = Map::new();
    for graph in &graphs {
        color(graph.clone(), &mut registers);
    }
    Allocation { graphs, registers }
}

fn build_graphs(code: &[Instruction], live: &Liveness) -> Vec<InterferenceGraph> {
    let mut graphs = Vec::new();
    let mut current: Option<InterferenceGraph> = None;
    for (i, instr) in code.iter().enumerate() {
        if matches!(instr, Instruction::BeginFunc { .. }) {
            if let Some(done) = current.take() {
                graphs.push(done);
            }
            current = Some(InterferenceGraph::new());
        }
        let Some(graph) = current.as_mut() else {
            continue;
        };

        let live_in = &live.live_in[i];
        for &a in live_in {
            graph.entry(a).or_default();
            for &b in live_in {
                if a != b {
                    graph.entry(a).or_default().insert(b);
                }
            }
        }
        for &killed in &instr.kill() {
            graph.entry(killed).or_default();
            for &alive in live_in {
                if killed != alive {
                    graph.entry(killed).or_default().insert(alive);
                    graph.entry(alive).or_default().insert(killed);
                }
            }
        }
    }
    if let Some(done) = current.take() {
        graphs.push(done);
    }
    graphs
}

fn color(mut graph: InterferenceGraph, registers: &mut Map<Location, Register>) {
    // Simplify: peel off the highest-degree node each round.  Ties go to
    // the smallest location, so the whole pass is deterministic.
    let mut stack: Vec<(Location, Set<Location>)> = Vec::new();
    while !graph.is_empty() {
        let mut best: Option<(Location, usize)> = None;
        for (&node, neighbors) in &graph {
            if best.is_none() || neighbors.len() > best.expect("just checked").1 {
                best = Some((node, neighbors.len()));
            }
        }
        let (node, _) = best.expect("graph is non-empty");
        let neighbors = graph.remove(&node).expect("chosen node is present");
        for adjacency in graph.values_mut() {
            adjacency.remove(&node);
        }
        stack.push((node, neighbors));
    }

    // Select, in reverse removal order.  A node's saved neighborhood is
    // exactly the set of nodes colored before it pops.
    while let Some((node, neighbors)) = stack.pop() {
        if neighbors.len() >= NUM_REGISTERS {
            // Stays in memory; its frame slot is its home.
            continue;
        }
        let taken: Set<Register> = neighbors
            .iter()
            .filter_map(|neighbor| registers.get(neighbor).copied())
            .collect();
        let register = GENERAL_PURPOSE
            .into_iter()
            .find(|candidate| !taken.contains(candidate))
            .expect("a node with fewer neighbors than registers has a free one");
        registers.insert(node, register);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::back::cfg::Cfg;
    use crate::back::liveness;
    use crate::back::liveness::Liveness;
    use crate::front::parse;

    fn allocation_for(source: &str) -> (Vec<Instruction>, Liveness, Allocation) {
        let program = parse(source).expect("source should parse");
        let cg = crate::back::codegen::emit_program(&program).expect("program should emit");
        let code = cg.code().to_vec();
        let cfg = Cfg::build(&code);
        let live = liveness::analyze(&code, &cfg);
        let alloc = allocate(&code, &live);
        (code, live, alloc)
    }

    #[test]
    fn coloring_never_shares_a_register_across_an_edge() {
        let (_, _, alloc) = allocation_for(
            "int fact(int n) {
                 if (n <= 1) return 1;
                 return n * fact(n - 1);
             }
             void main() { Print(fact(5)); }",
        );
        for graph in &alloc.graphs {
            for (node, neighbors) in graph {
                for neighbor in neighbors {
                    let a = alloc.registers.get(node);
                    let b = alloc.registers.get(neighbor);
                    if let (Some(a), Some(b)) = (a, b) {
                        assert_ne!(a, b, "{node} and {neighbor} share {a}");
                    }
                }
            }
        }
    }

    #[test]
    fn graph_edges_are_symmetric() {
        let (_, _, alloc) = allocation_for(
            "void main() {
                 int i;
                 int total;
                 total = 0;
                 for (i = 0; i < 10; i = i + 1) { total = total + i; }
                 Print(total);
             }",
        );
        for graph in &alloc.graphs {
            for (node, neighbors) in graph {
                for neighbor in neighbors {
                    assert!(
                        graph[neighbor].contains(node),
                        "edge {node} -> {neighbor} lacks its mirror"
                    );
                }
            }
        }
    }

    #[test]
    fn simultaneously_live_locations_interfere() {
        let (code, live, alloc) = allocation_for(
            "void main() {
                 int a;
                 int b;
                 a = 1;
                 b = 2;
                 Print(a + b);
             }",
        );
        let a = code
            .iter()
            .enumerate()
            .find_map(|(i, instr)| match instr {
                Instruction::BinaryOp { lhs, rhs, .. } => Some((i, *lhs, *rhs)),
                _ => None,
            })
            .expect("the sum should be a binary op");
        let (at, lhs, rhs) = a;
        assert!(live.live_in[at].contains(&lhs) && live.live_in[at].contains(&rhs));
        let graph = &alloc.graphs[0];
        assert!(graph[&lhs].contains(&rhs));
        if let (Some(a), Some(b)) = (alloc.registers.get(&lhs), alloc.registers.get(&rhs)) {
            assert_ne!(a, b);
        }
    }
}
