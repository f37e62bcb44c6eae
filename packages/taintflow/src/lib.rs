/*
 * Taintflow - Source-to-Sink Taint Analysis Engine
 *
 * Hexagonal layering:
 * - domain/         : Taint lattice, contexts, summaries, findings
 * - ports/          : Consumed IR and rule database interfaces
 * - infrastructure/ : Propagation, summary resolution, verification
 * - application/    : scan() orchestration, stats, cancellation
 *
 * The engine consumes an already-materialized IR plus a rule database,
 * propagates taint labels to a fixpoint (intraprocedural worklist,
 * interprocedural SCC-condensed bottom-up summaries, rayon inside a
 * layer), and verifies neutralization against context-sensitive
 * effectiveness rules instead of clearing taint at sanitizers.
 */

#![allow(clippy::new_without_default)] // Default impl not always needed
#![allow(clippy::match_like_matches_macro)] // Match for readability
#![allow(clippy::collapsible_if)] // Readability over brevity

pub mod application;
pub mod config;
pub mod domain;
pub mod errors;
pub mod infrastructure;
pub mod ports;

pub use application::{scan, scan_with_cancellation, CancelToken, ScanOutcome, ScanStats};
pub use config::ScanConfig;
pub use domain::{
    AppliedStep, Classification, CompositeContext, Context, Finding, FunctionSummary, LabelSet,
    OriginKind, Severity, SinkSite, Strength, SummaryState, TaintLabel, TaintRoot,
};
pub use errors::{EngineError, FailureKind, FunctionFailure, Result};
pub use infrastructure::FindingReport;
pub use ports::{
    CallTarget, FlowGraph, FlowNode, FlowOp, FunctionId, FunctionIr, NodeId, ProgramIr,
    RuleDatabase, RuleWarning, SanitizerSpec, SinkSpec,
};
