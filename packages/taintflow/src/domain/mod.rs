//! Core data model: taint lattice, contexts, summaries, findings.

pub mod context;
pub mod finding;
pub mod label;
pub mod summary;

pub use context::{AppliedStep, CompositeContext, Context, Strength};
pub use finding::{Classification, Finding, Severity, SinkSite};
pub use label::{LabelSet, OriginKind, TaintLabel, TaintRoot};
pub use summary::{
    FunctionSummary, SinkFlow, SourceFlow, SummaryFlow, SummaryOutput, SummaryState, TaintInput,
};
