//! Function taint summaries.
//!
//! A summary captures, independently of any call site, which output slots
//! each input (formal parameter or captured global) can taint, which sinks
//! each input can reach inside the function or its callees, and which
//! outputs carry taint the function originates itself (wrapped sources).
//! Summaries are computed bottom-up over the call graph's condensation and
//! published read-only; they are invalidated only when the function's own
//! IR changes, which under the per-run ownership model means never within
//! one scan.
//!
//! Flow equality deliberately ignores internal paths: the relation, the
//! step sequence and the unknown flag decide convergence of the joint SCC
//! fixpoint, while the first-recorded path is kept for rendering.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::domain::context::AppliedStep;
use crate::domain::finding::SinkSite;
use crate::domain::label::OriginKind;
use crate::ports::ir::{FunctionId, NodeId};

/// Summary input slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaintInput {
    Param(usize),
    Global(String),
}

/// Summary output slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SummaryOutput {
    Return,
    OutParam(usize),
    Global(String),
}

/// One input-to-output transfer edge of a summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryFlow {
    pub output: SummaryOutput,
    /// Callee-internal provenance, spliced into caller labels at the call
    /// site. Not part of flow equality.
    pub path: Vec<NodeId>,
    pub steps: Vec<AppliedStep>,
    pub crossed_unknown: bool,
}

impl PartialEq for SummaryFlow {
    fn eq(&self, other: &Self) -> bool {
        self.output == other.output
            && self.steps == other.steps
            && self.crossed_unknown == other.crossed_unknown
    }
}

impl Eq for SummaryFlow {}

/// An input that reaches a sink inside the function (or transitively in a
/// callee).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkFlow {
    pub input: TaintInput,
    pub sink: SinkSite,
    pub path: Vec<NodeId>,
    pub steps: Vec<AppliedStep>,
    pub crossed_unknown: bool,
}

impl PartialEq for SinkFlow {
    fn eq(&self, other: &Self) -> bool {
        self.input == other.input
            && self.sink == other.sink
            && self.steps == other.steps
            && self.crossed_unknown == other.crossed_unknown
    }
}

impl Eq for SinkFlow {}

/// Taint the function originates itself and exposes through an output
/// slot, e.g. a wrapper returning a freshly read network parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFlow {
    pub origin: OriginKind,
    /// Node where the wrapped source fires.
    pub at: NodeId,
    pub output: SummaryOutput,
    pub path: Vec<NodeId>,
    pub steps: Vec<AppliedStep>,
    pub crossed_unknown: bool,
}

impl PartialEq for SourceFlow {
    fn eq(&self, other: &Self) -> bool {
        self.origin == other.origin
            && self.at == other.at
            && self.output == other.output
            && self.steps == other.steps
            && self.crossed_unknown == other.crossed_unknown
    }
}

impl Eq for SourceFlow {}

/// Call-site-independent taint behavior of one function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionSummary {
    pub value_flows: FxHashMap<TaintInput, Vec<SummaryFlow>>,
    pub sink_flows: Vec<SinkFlow>,
    pub source_flows: Vec<SourceFlow>,
}

impl FunctionSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flows_for(&self, input: &TaintInput) -> &[SummaryFlow] {
        self.value_flows
            .get(input)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn add_value_flow(&mut self, input: TaintInput, flow: SummaryFlow) -> bool {
        let flows = self.value_flows.entry(input).or_default();
        if flows.contains(&flow) {
            false
        } else {
            flows.push(flow);
            true
        }
    }

    pub fn add_sink_flow(&mut self, flow: SinkFlow) -> bool {
        if self.sink_flows.contains(&flow) {
            false
        } else {
            self.sink_flows.push(flow);
            true
        }
    }

    pub fn add_source_flow(&mut self, flow: SourceFlow) -> bool {
        if self.source_flows.contains(&flow) {
            false
        } else {
            self.source_flows.push(flow);
            true
        }
    }

    /// Lattice merge used by the joint SCC fixpoint: union of all flow
    /// kinds. Returns true when this summary grew. Monotone, so iteration
    /// over a strongly-connected component terminates.
    pub fn merge(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for (input, flows) in &other.value_flows {
            for flow in flows {
                changed |= self.add_value_flow(input.clone(), flow.clone());
            }
        }
        for flow in &other.sink_flows {
            changed |= self.add_sink_flow(flow.clone());
        }
        for flow in &other.source_flows {
            changed |= self.add_source_flow(flow.clone());
        }
        changed
    }

    pub fn is_identity(&self) -> bool {
        self.value_flows.is_empty() && self.sink_flows.is_empty() && self.source_flows.is_empty()
    }
}

/// Published analysis state of one function. Unknown summaries propagate
/// unknown taint conservatively to callers: unknown never means untainted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SummaryState {
    Computed(Arc<FunctionSummary>),
    Unknown { function: FunctionId, reason: String },
}

impl SummaryState {
    pub fn computed(&self) -> Option<&FunctionSummary> {
        match self {
            SummaryState::Computed(summary) => Some(summary),
            SummaryState::Unknown { .. } => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, SummaryState::Unknown { .. })
    }
}
