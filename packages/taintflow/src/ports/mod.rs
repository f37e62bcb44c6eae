//! External interfaces: the consumed IR and the consumed rule database.

pub mod ir;
pub mod rules;

pub use ir::{CallTarget, FlowGraph, FlowNode, FlowOp, FunctionId, FunctionIr, NodeId, ProgramIr};
pub use rules::{RuleDatabase, RuleWarning, SanitizerSpec, SinkSpec};
