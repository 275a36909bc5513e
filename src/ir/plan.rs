// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the ADGEN project (Algorithmic Differentiation code GENeration).

use tracing::debug;

use super::{set_slot, Graph, GraphError, NodeId, Op, Slot};

/// One step of an [`EmissionPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanEntry {
    pub node: NodeId,
    /// References from the reachable graph plus dependent markings.
    pub uses: usize,
    /// `None` when the node is inlined at its point of use.
    pub slot: Option<Slot>,
}

/// Read-only topological view of a finalized graph.
#[derive(Debug, Clone)]
pub struct EmissionPlan<'g> {
    graph: &'g Graph,
    entries: Vec<PlanEntry>,
    temporaries: usize,
    arrays: usize,
}

impl<'g> EmissionPlan<'g> {
    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of scalar temporary slots.
    pub fn temporaries(&self) -> usize {
        self.temporaries
    }

    /// Number of temporary array slots.
    pub fn arrays(&self) -> usize {
        self.arrays
    }

    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.entries.iter().position(|e| e.node == node)
    }
}

impl Graph {
    /// Order the graph reachable from the dependents and assign storage.
    ///
    /// Scalar temporaries receive contiguous slots in visitation order; array
    /// nodes receive slots from a separate counter. Any previously assigned
    /// slots are cleared first, so finalizing twice yields the same plan.
    pub fn finalize(&mut self) -> Result<EmissionPlan<'_>, GraphError> {
        let order = topological_order(self, self.dependents(), |_| false)?;

        let mut uses = vec![0usize; self.len()];
        for id in &order {
            for arg in self.node(*id).args() {
                uses[arg.0] += 1;
            }
        }
        for dep in self.dependents() {
            uses[dep.0] += 1;
        }

        let nodes = self.nodes_mut();
        for node in nodes.iter_mut() {
            set_slot(node, None);
        }

        let mut temporaries = 0;
        let mut arrays = 0;
        let mut entries = Vec::with_capacity(order.len());
        for id in order {
            let node = &mut nodes[id.0];
            let slot = match node.op() {
                Op::Constant(_) | Op::Independent(_) | Op::Element(_) => None,
                Op::Array => {
                    arrays += 1;
                    Some(Slot::Array(arrays - 1))
                }
                _ if uses[id.0] > 1 || node.is_temporary_requested() => {
                    temporaries += 1;
                    Some(Slot::Temporary(temporaries - 1))
                }
                _ => None,
            };
            set_slot(node, slot);
            entries.push(PlanEntry {
                node: id,
                uses: uses[id.0],
                slot,
            });
        }

        debug!(
            nodes = entries.len(),
            temporaries, arrays, "finalized graph"
        );

        Ok(EmissionPlan {
            graph: &*self,
            entries,
            temporaries,
            arrays,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Post-order depth-first ordering of everything reachable from `roots`.
///
/// Arguments are visited in argument order and every node appears after all
/// of its arguments. Nodes for which `stop` returns true are emitted without
/// descending into their arguments. A back-edge yields
/// [`GraphError::CyclicReference`].
pub fn topological_order(
    graph: &Graph,
    roots: &[NodeId],
    stop: impl Fn(NodeId) -> bool,
) -> Result<Vec<NodeId>, GraphError> {
    let mut marks = vec![Mark::Unvisited; graph.len()];
    let mut order = Vec::new();

    for &root in roots {
        if root.0 >= graph.len() {
            return Err(GraphError::UnknownNode(root));
        }
        if marks[root.0] != Mark::Unvisited {
            continue;
        }
        marks[root.0] = Mark::InProgress;
        let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];

        while let Some(top) = stack.last_mut() {
            let (id, next) = *top;
            let args = if stop(id) { &[][..] } else { graph.node(id).args() };
            if next < args.len() {
                top.1 += 1;
                let arg = args[next];
                if arg.0 >= graph.len() {
                    return Err(GraphError::UnknownNode(arg));
                }
                match marks[arg.0] {
                    Mark::Unvisited => {
                        marks[arg.0] = Mark::InProgress;
                        stack.push((arg, 0));
                    }
                    Mark::InProgress => return Err(GraphError::CyclicReference { node: arg }),
                    Mark::Done => {}
                }
            } else {
                marks[id.0] = Mark::Done;
                order.push(id);
                stack.pop();
            }
        }
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Node, UnaryOp};

    #[test]
    fn shared_subexpressions_become_temporaries() {
        let mut g = Graph::new();
        let a = g.independent();
        let b = g.independent();
        let ab = g.binary(BinOp::Mul, a, b).unwrap();
        let s = g.unary(UnaryOp::Sin, ab).unwrap();
        let c = g.unary(UnaryOp::Cos, ab).unwrap();
        g.mark_dependent(s).unwrap();
        g.mark_dependent(c).unwrap();

        let plan = g.finalize().unwrap();
        let entry = plan.entries()[plan.position(ab).unwrap()];
        assert_eq!(entry.uses, 2);
        assert_eq!(entry.slot, Some(Slot::Temporary(0)));
        assert_eq!(plan.temporaries(), 1);
        let sin = plan.entries()[plan.position(s).unwrap()];
        assert_eq!(sin.slot, None);
    }

    #[test]
    fn discarded_recordings_do_not_force_temporaries() {
        let mut g = Graph::new();
        let a = g.independent();
        let e = g.unary(UnaryOp::Exp, a).unwrap();
        let again = g.unary(UnaryOp::Exp, a).unwrap();
        assert_eq!(e, again);
        g.mark_dependent(e).unwrap();
        let plan = g.finalize().unwrap();
        assert_eq!(plan.temporaries(), 0);
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut g = Graph::new();
        let a = g.independent();
        let sq = g.binary(BinOp::Mul, a, a).unwrap();
        let y = g.binary(BinOp::Add, sq, sq).unwrap();
        g.request_temporary(y).unwrap();
        g.mark_dependent(y).unwrap();

        let first: Vec<PlanEntry> = g.finalize().unwrap().entries().to_vec();
        let second: Vec<PlanEntry> = g.finalize().unwrap().entries().to_vec();
        assert_eq!(first, second);
        assert_eq!(g.node(y).slot(), Some(Slot::Temporary(1)));
    }

    #[test]
    fn back_edges_are_reported() {
        let nodes = vec![
            Node::new(Op::Independent(0), vec![]),
            Node::new(Op::Binary(BinOp::Add), vec![NodeId(0), NodeId(2)]),
            Node::new(Op::Unary(UnaryOp::Sin), vec![NodeId(1)]),
        ];
        let mut g = Graph::from_parts(nodes, vec![NodeId(2)]).unwrap();
        let err = g.finalize().unwrap_err();
        assert!(matches!(err, GraphError::CyclicReference { .. }));
    }

    #[test]
    fn unreachable_nodes_are_not_planned() {
        let mut g = Graph::new();
        let a = g.independent();
        let dead = g.unary(UnaryOp::Log, a).unwrap();
        let live = g.unary(UnaryOp::Sqrt, a).unwrap();
        g.mark_dependent(live).unwrap();
        let plan = g.finalize().unwrap();
        assert!(plan.position(dead).is_none());
        assert_eq!(plan.len(), 2);
    }
}
