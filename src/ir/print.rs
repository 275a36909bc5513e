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

use super::{Graph, Node, NodeId, Op};

/// Format a [`Graph`] into a stable, human-readable string.
///
/// The output lists nodes in arena order and is accepted by
/// [`parse_graph`](super::parse_graph).
pub fn format_graph(graph: &Graph) -> String {
    let mut out = String::from("graph {\n");
    for (id, node) in graph.nodes() {
        out.push_str(&format_node(id, node));
    }
    for dep in graph.dependents() {
        out.push_str(&format!("  dep {dep}\n"));
    }
    out.push_str("}\n");
    out
}

fn format_node(id: NodeId, node: &Node) -> String {
    let mut line = match node.op() {
        Op::Constant(value) => format!("  {id} = const {}", format_constant(*value)),
        Op::Independent(k) => format!("  {id} = indep {k}"),
        Op::Element(index) => format!("  {id} = elem {index} {}", node.args()[0]),
        Op::Call(name) if node.args().is_empty() => format!("  {id} = call {name}"),
        Op::Call(name) => format!("  {id} = call {name} {}", join_args(node.args())),
        other => format!("  {id} = {} {}", other.mnemonic(), join_args(node.args())),
    };
    if let Some(name) = node.name() {
        line.push_str(&format!(" \"{name}\""));
    }
    if node.is_temporary_requested() {
        line.push_str(" !temp");
    }
    line.push('\n');
    line
}

fn join_args(args: &[NodeId]) -> String {
    args.iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_constant(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{:?}", value)
    }
}
