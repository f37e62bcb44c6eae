//! Consumed intermediate representation.
//!
//! The engine does not parse source text. A language front end materializes
//! this IR: one flow graph per function with typed nodes for
//! assignment/call/branch/return, call edges with an explicit marker for
//! calls that could not be statically resolved, and declared formal
//! parameters per function.
//!
//! Node identifiers are program-unique: a `NodeId` appears in exactly one
//! function's flow graph, so provenance paths can cross call boundaries
//! without qualification.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::domain::context::Context;

/// Program-unique IR node identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Program-unique function identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct FunctionId(pub u32);

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Callee of a call site. `Dynamic` is the front end's explicit marker for
/// a call it could not resolve statically; the engine treats it with the
/// conservative unknown-propagation rule, never as taint-clearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallTarget {
    Static(FunctionId),
    Dynamic,
}

/// Operation performed by one flow-graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlowOp {
    /// `target = f(operands...)` for any expression: plain copies,
    /// concatenation, arithmetic and interpolation all propagate the join
    /// of their operands. An empty operand list is a constant.
    Assign {
        target: String,
        operands: Vec<String>,
    },
    /// Call site. `api` is the rule-database identifier of the invoked API
    /// when the front end knows it. `enclosing` records the syntactic
    /// constructs around the argument position, walked outward, and feeds
    /// composite-context classification.
    Call {
        target: CallTarget,
        api: Option<String>,
        args: Vec<String>,
        result: Option<String>,
        enclosing: Vec<Context>,
    },
    /// Conditional branch. Branches never propagate taint: the engine
    /// tracks explicit data flow only.
    Branch { condition: String },
    Return { value: Option<String> },
}

/// One node of a function's flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: NodeId,
    pub op: FlowOp,
    pub preds: Vec<NodeId>,
    pub succs: Vec<NodeId>,
}

impl FlowNode {
    pub fn new(id: NodeId, op: FlowOp) -> Self {
        Self {
            id,
            op,
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    pub fn is_merge(&self) -> bool {
        self.preds.len() > 1
    }
}

/// Control-flow graph of one function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    nodes: FxHashMap<NodeId, FlowNode>,
    entry: NodeId,
    order: Vec<NodeId>,
}

impl FlowGraph {
    pub fn new(entry: NodeId) -> Self {
        Self {
            nodes: FxHashMap::default(),
            entry,
            order: Vec::new(),
        }
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn add_node(&mut self, node: FlowNode) {
        if !self.nodes.contains_key(&node.id) {
            self.order.push(node.id);
        }
        self.nodes.insert(node.id, node);
    }

    /// Add a control-flow edge, updating both endpoints.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        if let Some(node) = self.nodes.get_mut(&from) {
            if !node.succs.contains(&to) {
                node.succs.push(to);
            }
        }
        if let Some(node) = self.nodes.get_mut(&to) {
            if !node.preds.contains(&from) {
                node.preds.push(from);
            }
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&FlowNode> {
        self.nodes.get(&id)
    }

    /// Nodes in insertion order, so traversals are deterministic across
    /// runs on the same IR.
    pub fn nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn predecessors(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map(|n| n.preds.as_slice()).unwrap_or(&[])
    }

    pub fn successors(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map(|n| n.succs.as_slice()).unwrap_or(&[])
    }

    /// Exit nodes: no successors.
    pub fn exits(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes().filter(|n| n.succs.is_empty())
    }
}

/// One function of the consumed program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionIr {
    pub id: FunctionId,
    pub name: String,
    /// Declared formal parameters, by variable name, in position order.
    pub params: Vec<String>,
    pub flow: FlowGraph,
}

impl FunctionIr {
    pub fn new(id: FunctionId, name: impl Into<String>, params: Vec<String>, flow: FlowGraph) -> Self {
        Self {
            id,
            name: name.into(),
            params,
            flow,
        }
    }

    /// Structural precondition check. A violation is MalformedIR: fatal for
    /// this function only, the rest of the program is still analyzed.
    pub fn validate(&self, program: &ProgramIr) -> Result<(), String> {
        if self.flow.node(self.flow.entry()).is_none() {
            return Err(format!("entry node {} does not exist", self.flow.entry()));
        }
        for node in self.flow.nodes() {
            for edge in node.preds.iter().chain(node.succs.iter()) {
                if self.flow.node(*edge).is_none() {
                    return Err(format!("dangling flow edge {} -> {}", node.id, edge));
                }
            }
            if let FlowOp::Call {
                target: CallTarget::Static(callee),
                args,
                ..
            } = &node.op
            {
                match program.function(*callee) {
                    None => {
                        return Err(format!(
                            "dangling call edge at {}: no function {}",
                            node.id, callee
                        ));
                    }
                    Some(f) if f.params.len() < args.len() => {
                        return Err(format!(
                            "call at {} passes {} args to {} declaring {} params",
                            node.id,
                            args.len(),
                            callee,
                            f.params.len()
                        ));
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }
}

/// The whole consumed program: functions plus the names treated as
/// program-visible globals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramIr {
    functions: FxHashMap<FunctionId, FunctionIr>,
    order: Vec<FunctionId>,
    globals: Vec<String>,
}

impl ProgramIr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, function: FunctionIr) {
        if !self.functions.contains_key(&function.id) {
            self.order.push(function.id);
        }
        self.functions.insert(function.id, function);
    }

    pub fn declare_global(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.globals.contains(&name) {
            self.globals.push(name);
        }
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionIr> {
        self.functions.get(&id)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionIr> {
        self.order.iter().filter_map(|id| self.functions.get(id))
    }

    pub fn function_count(&self) -> usize {
        self.order.len()
    }

    pub fn globals(&self) -> &[String] {
        &self.globals
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.globals.iter().any(|g| g == name)
    }

    /// Statically resolved call edges, caller to callee.
    pub fn call_edges(&self) -> Vec<(FunctionId, FunctionId)> {
        let mut edges = Vec::new();
        for function in self.functions() {
            for node in function.flow.nodes() {
                if let FlowOp::Call {
                    target: CallTarget::Static(callee),
                    ..
                } = &node.op
                {
                    edges.push((function.id, *callee));
                }
            }
        }
        edges
    }

    pub fn node_count(&self) -> usize {
        self.functions().map(|f| f.flow.len()).sum()
    }

    /// Total predecessor count of a node, for merge-point accounting.
    pub fn merge_degree(&self, id: NodeId) -> usize {
        for function in self.functions() {
            if let Some(node) = function.flow.node(id) {
                return node.preds.len();
            }
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_function(id: u32, entry: u32) -> FunctionIr {
        let mut flow = FlowGraph::new(NodeId(entry));
        flow.add_node(FlowNode::new(
            NodeId(entry),
            FlowOp::Assign {
                target: "x".to_string(),
                operands: vec![],
            },
        ));
        flow.add_node(FlowNode::new(
            NodeId(entry + 1),
            FlowOp::Return {
                value: Some("x".to_string()),
            },
        ));
        flow.add_edge(NodeId(entry), NodeId(entry + 1));
        FunctionIr::new(FunctionId(id), format!("fn{}", id), vec![], flow)
    }

    #[test]
    fn test_flow_graph_edges() {
        let f = linear_function(0, 10);
        assert_eq!(f.flow.successors(NodeId(10)), &[NodeId(11)]);
        assert_eq!(f.flow.predecessors(NodeId(11)), &[NodeId(10)]);
        assert_eq!(f.flow.exits().count(), 1);
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        let mut program = ProgramIr::new();
        program.add_function(linear_function(0, 10));
        let f = program.function(FunctionId(0)).unwrap();
        assert!(f.validate(&program).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_entry() {
        let flow = FlowGraph::new(NodeId(99));
        let f = FunctionIr::new(FunctionId(1), "broken", vec![], flow);
        let program = ProgramIr::new();
        assert!(f.validate(&program).unwrap_err().contains("entry node"));
    }

    #[test]
    fn test_validate_rejects_dangling_call() {
        let mut flow = FlowGraph::new(NodeId(1));
        flow.add_node(FlowNode::new(
            NodeId(1),
            FlowOp::Call {
                target: CallTarget::Static(FunctionId(42)),
                api: None,
                args: vec![],
                result: None,
                enclosing: vec![],
            },
        ));
        let f = FunctionIr::new(FunctionId(0), "caller", vec![], flow);
        let mut program = ProgramIr::new();
        program.add_function(f.clone());

        let err = f.validate(&program).unwrap_err();
        assert!(err.contains("dangling call edge"));
    }

    #[test]
    fn test_call_edges_skip_dynamic() {
        let mut flow = FlowGraph::new(NodeId(1));
        flow.add_node(FlowNode::new(
            NodeId(1),
            FlowOp::Call {
                target: CallTarget::Dynamic,
                api: None,
                args: vec!["x".to_string()],
                result: None,
                enclosing: vec![],
            },
        ));
        let mut program = ProgramIr::new();
        program.add_function(FunctionIr::new(FunctionId(0), "caller", vec![], flow));

        assert!(program.call_edges().is_empty());
    }

    #[test]
    fn test_deterministic_node_order() {
        let f = linear_function(0, 10);
        let ids: Vec<NodeId> = f.flow.nodes().map(|n| n.id).collect();
        assert_eq!(ids, vec![NodeId(10), NodeId(11)]);
    }
}
