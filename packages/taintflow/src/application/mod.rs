//! Scan orchestration: the single entry point wiring resolution,
//! verification, scoring and emission together.
//!
//! A scan owns everything it builds and discards it at completion; nothing
//! is cached across runs.

use std::time::Instant;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::domain::finding::{Finding, Severity, SinkSite};
use crate::domain::label::{OriginKind, TaintLabel, TaintRoot};
use crate::domain::summary::{SummaryState, TaintInput};
use crate::errors::{FunctionFailure, Result};
use crate::infrastructure::classifier::SinkClassifier;
use crate::infrastructure::emitter::{FindingEmitter, FindingReport};
use crate::infrastructure::interprocedural::{ResolvedProgram, SummaryResolver};
use crate::infrastructure::intraprocedural::modeled_call;
use crate::infrastructure::sanitizer::EffectivenessModel;
use crate::infrastructure::scoring::ConfidenceScorer;
use crate::ports::ir::{CallTarget, FlowOp, NodeId, ProgramIr};
use crate::ports::rules::{RuleDatabase, RuleWarning};

pub use crate::infrastructure::interprocedural::CancelToken;

/// Counters and timings for one scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStats {
    pub functions_analyzed: usize,
    pub nodes_analyzed: usize,
    pub unknown_propagation_edges: usize,
    pub condensation_layers: usize,
    pub resolve_time_ms: u64,
    pub verify_time_ms: u64,
    pub total_time_ms: u64,
    pub warnings: Vec<RuleWarning>,
}

/// Everything one scan produces: the ordered report, statistics, and the
/// functions that degraded to unknown summaries.
#[derive(Debug)]
pub struct ScanOutcome {
    pub report: FindingReport,
    pub stats: ScanStats,
    pub failures: Vec<FunctionFailure>,
}

pub fn scan(program: &ProgramIr, rules: &RuleDatabase, config: &ScanConfig) -> Result<ScanOutcome> {
    scan_with_cancellation(program, rules, config, &CancelToken::new())
}

pub fn scan_with_cancellation(
    program: &ProgramIr,
    rules: &RuleDatabase,
    config: &ScanConfig,
    cancel: &CancelToken,
) -> Result<ScanOutcome> {
    config.validate()?;
    let (rules, warnings) = rules.validated();

    let started = Instant::now();
    tracing::info!(
        functions = program.function_count(),
        nodes = program.node_count(),
        "scan started"
    );

    let resolved = SummaryResolver::new(program, &rules, config).resolve(cancel)?;
    let resolve_time_ms = started.elapsed().as_millis() as u64;

    let verify_started = Instant::now();
    let mut candidates = collect_candidates(program, &rules, &resolved);
    score_candidates(&mut candidates, program, config);
    let report = FindingEmitter::emit(candidates);
    let verify_time_ms = verify_started.elapsed().as_millis() as u64;

    let stats = ScanStats {
        functions_analyzed: resolved.analyses.len(),
        nodes_analyzed: program.node_count(),
        unknown_propagation_edges: resolved.unknown_edges,
        condensation_layers: resolved.layers,
        resolve_time_ms,
        verify_time_ms,
        total_time_ms: started.elapsed().as_millis() as u64,
        warnings,
    };

    tracing::info!(
        findings = report.len(),
        failures = resolved.failures.len(),
        elapsed_ms = stats.total_time_ms,
        "scan finished"
    );

    Ok(ScanOutcome {
        report,
        stats,
        failures: resolved.failures,
    })
}

/// A concrete-origin label arriving at a sink becomes a candidate finding,
/// classified by the effectiveness model. Two shapes: the label reaches a
/// sink in the function it was observed in, or it enters a call whose
/// callee summary records a path to a sink.
fn collect_candidates(
    program: &ProgramIr,
    rules: &RuleDatabase,
    resolved: &ResolvedProgram,
) -> Vec<Finding> {
    let classifier = SinkClassifier::new(rules);
    let mut candidates = Vec::new();

    for function in program.functions() {
        let Some(analysis) = resolved.analyses.get(&function.id) else { continue };

        for node in function.flow.nodes() {
            let Some(input_state) = analysis.in_states.get(&node.id) else { continue };

            if let Some(site) = classifier.classify(function.id, node) {
                let FlowOp::Call { args, .. } = &node.op else { continue };
                for slot in &site.arg_slots {
                    let Some(arg) = args.get(*slot) else { continue };
                    for label in input_state.var(arg).iter() {
                        if label.root().origin().is_none() {
                            continue;
                        }
                        let mut path = label.provenance().to_vec();
                        if path.last() != Some(&node.id) {
                            path.push(node.id);
                        }
                        candidates.push(candidate(label, &site, path));
                    }
                }
            }

            let FlowOp::Call {
                target: target @ CallTarget::Static(callee),
                api,
                args,
                ..
            } = &node.op
            else {
                continue;
            };
            if modeled_call(rules, api.as_deref(), target) {
                continue;
            }
            let Some(SummaryState::Computed(summary)) = resolved.summaries.get(callee) else {
                continue;
            };
            for flow in &summary.sink_flows {
                let labels = match &flow.input {
                    TaintInput::Param(i) => match args.get(*i) {
                        Some(arg) => input_state.var(arg),
                        None => continue,
                    },
                    TaintInput::Global(name) => input_state.var(name),
                };
                for label in labels.iter() {
                    if label.root().origin().is_none() {
                        continue;
                    }
                    let composed =
                        label.composed(node.id, &flow.path, &flow.steps, flow.crossed_unknown);
                    candidates.push(candidate(
                        &composed,
                        &flow.sink,
                        composed.provenance().to_vec(),
                    ));
                }
            }
        }
    }

    candidates
}

fn candidate(label: &TaintLabel, site: &SinkSite, path: Vec<NodeId>) -> Finding {
    let (origin, source_node) = match label.root() {
        TaintRoot::Source { origin, at } => (*origin, *at),
        // Callers filtered on a concrete origin already.
        _ => (OriginKind::UnknownExternal, NodeId(0)),
    };
    let classification =
        EffectivenessModel::evaluate(&site.context, label.steps(), label.crossed_unknown());

    Finding {
        origin,
        source_node,
        origin_context: label.origin_context(),
        sink: site.clone(),
        path,
        steps: label.steps().to_vec(),
        classification,
        severity: Severity::for_finding(classification, site.context.innermost()),
        confidence: 0.0,
        collapsed_paths: 0,
        crossed_unknown: label.crossed_unknown(),
    }
}

fn score_candidates(candidates: &mut [Finding], program: &ProgramIr, config: &ScanConfig) {
    let scorer = ConfidenceScorer::new(config);

    let mut siblings: FxHashMap<(OriginKind, NodeId, NodeId), usize> = FxHashMap::default();
    for finding in candidates.iter() {
        *siblings
            .entry((finding.origin, finding.source_node, finding.sink.node))
            .or_insert(0) += 1;
    }

    for finding in candidates.iter_mut() {
        let merges = finding
            .path
            .iter()
            .filter(|node| program.merge_degree(**node) > 1)
            .count();
        let corroborating =
            siblings[&(finding.origin, finding.source_node, finding.sink.node)];
        finding.confidence = scorer.score(
            finding.path.len(),
            merges,
            finding.crossed_unknown,
            corroborating,
        );
    }
}
