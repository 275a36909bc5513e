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

use super::{check_arguments, Graph, GraphError, NodeId, Op};

/// Verify that a [`Graph`] upholds the recording invariants.
///
/// The verifier checks argument arity and operand kinds, rejects references
/// to nodes recorded later (which is what keeps a recorded graph acyclic),
/// and checks that the input list matches the `Independent` nodes. It returns
/// structured errors instead of panicking on invalid input.
pub fn verify_graph(graph: &Graph) -> Result<(), GraphError> {
    let nodes: Vec<_> = graph.nodes().map(|(_, node)| node.clone()).collect();

    for (id, node) in graph.nodes() {
        check_arguments(&nodes, node.op(), node.args())?;
        if let Some(&arg) = node.args().iter().find(|arg| arg.0 >= id.0) {
            return Err(GraphError::ForwardReference { node: id, arg });
        }
    }

    for (expected, input) in graph.independents().iter().enumerate() {
        match graph.get(*input).map(|n| n.op()) {
            Some(Op::Independent(k)) if *k == expected => {}
            Some(Op::Independent(k)) => {
                return Err(GraphError::InputNumbering {
                    expected,
                    found: *k,
                })
            }
            _ => return Err(GraphError::UnknownNode(*input)),
        }
    }

    for dep in graph.dependents() {
        if graph.get(*dep).is_none() {
            return Err(GraphError::UnknownNode(*dep));
        }
    }

    Ok(())
}
