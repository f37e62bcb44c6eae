//! Interprocedural summary resolution.
//!
//! Condenses the static call graph into strongly-connected components,
//! orders them bottom-up and computes `FunctionSummary`s layer by layer:
//! components in the same layer have no summary dependency on each other
//! and run in parallel, components in a cycle are solved together by a
//! joint fixpoint. Summaries are published once per run and shared
//! read-only afterwards; nothing is cached across runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::config::ScanConfig;
use crate::domain::finding::SinkSite;
use crate::domain::label::{LabelSet, TaintRoot};
use crate::domain::summary::{
    FunctionSummary, SinkFlow, SourceFlow, SummaryFlow, SummaryOutput, SummaryState, TaintInput,
};
use crate::errors::{EngineError, FailureKind, FunctionFailure, Result};
use crate::infrastructure::classifier::SinkClassifier;
use crate::infrastructure::intraprocedural::{
    analyze_function, modeled_call, FunctionAnalysis, IntraContext, Slot, ValueState,
};
use crate::ports::ir::{CallTarget, FlowOp, FunctionId, FunctionIr, ProgramIr};
use crate::ports::rules::RuleDatabase;

/// Cooperative cancellation flag, checked between condensation layers.
/// In-flight per-function analyses are abandoned cleanly since each owns
/// its state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Everything the verification pass needs: published summaries, the final
/// per-function analyses, classified sinks, and failure accounting.
#[derive(Debug)]
pub struct ResolvedProgram {
    pub summaries: FxHashMap<FunctionId, SummaryState>,
    pub analyses: FxHashMap<FunctionId, FunctionAnalysis>,
    pub sinks: Vec<SinkSite>,
    pub failures: Vec<FunctionFailure>,
    pub unknown_edges: usize,
    pub layers: usize,
}

#[derive(Default)]
struct SccResult {
    summaries: Vec<(FunctionId, SummaryState)>,
    analyses: Vec<(FunctionId, FunctionAnalysis)>,
    failures: Vec<FunctionFailure>,
}

pub struct SummaryResolver<'a> {
    program: &'a ProgramIr,
    rules: &'a RuleDatabase,
    config: &'a ScanConfig,
}

impl<'a> SummaryResolver<'a> {
    pub fn new(program: &'a ProgramIr, rules: &'a RuleDatabase, config: &'a ScanConfig) -> Self {
        Self {
            program,
            rules,
            config,
        }
    }

    pub fn resolve(&self, cancel: &CancelToken) -> Result<ResolvedProgram> {
        let mut summaries: FxHashMap<FunctionId, SummaryState> = FxHashMap::default();
        let mut analyses: FxHashMap<FunctionId, FunctionAnalysis> = FxHashMap::default();
        let mut failures: Vec<FunctionFailure> = Vec::new();

        for function in self.program.functions() {
            if let Err(message) = function.validate(self.program) {
                tracing::warn!(function = %function.id, %message, "malformed IR, degrading to unknown summary");
                summaries.insert(
                    function.id,
                    SummaryState::Unknown {
                        function: function.id,
                        reason: message.clone(),
                    },
                );
                failures.push(FunctionFailure {
                    function: function.id,
                    kind: FailureKind::MalformedIr(message),
                });
            }
        }

        let graph = self.call_graph();
        let sccs = tarjan_scc(&graph);
        let layers = assign_layers(&graph, &sccs);
        let layer_count = layers.len();

        tracing::debug!(
            functions = self.program.function_count(),
            components = sccs.len(),
            layers = layer_count,
            "resolving summaries bottom-up"
        );

        for (depth, layer) in layers.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(layer = depth + 1, "scan cancelled between layers");
                return Err(EngineError::Cancelled);
            }

            let published = &summaries;
            let results: Vec<SccResult> = layer
                .par_iter()
                .map(|&scc| self.solve_scc(&sccs[scc], &graph, published))
                .collect();

            for result in results {
                for (id, state) in result.summaries {
                    summaries.insert(id, state);
                }
                for (id, analysis) in result.analyses {
                    analyses.insert(id, analysis);
                }
                failures.extend(result.failures);
            }
        }

        let unknown_edges = analyses.values().map(|a| a.unknown_edges).sum();
        let sinks = SinkClassifier::new(self.rules).collect(self.program);

        Ok(ResolvedProgram {
            summaries,
            analyses,
            sinks,
            failures,
            unknown_edges,
            layers: layer_count,
        })
    }

    fn call_graph(&self) -> DiGraph<FunctionId, ()> {
        let mut graph = DiGraph::new();
        let mut indices: FxHashMap<FunctionId, NodeIndex> = FxHashMap::default();
        for function in self.program.functions() {
            indices.insert(function.id, graph.add_node(function.id));
        }
        for (caller, callee) in self.program.call_edges() {
            if let (Some(&from), Some(&to)) = (indices.get(&caller), indices.get(&callee)) {
                graph.update_edge(from, to, ());
            }
        }
        graph
    }

    /// Solve one component against the already-published summaries. For a
    /// cycle this iterates a joint fixpoint: every member is re-analyzed
    /// against the members' current summaries until no summary grows.
    fn solve_scc(
        &self,
        members: &[NodeIndex],
        graph: &DiGraph<FunctionId, ()>,
        published: &FxHashMap<FunctionId, SummaryState>,
    ) -> SccResult {
        let mut result = SccResult::default();

        let mut ids: Vec<FunctionId> = members.iter().map(|&i| graph[i]).collect();
        ids.sort();

        let mut active: Vec<&FunctionIr> = ids
            .iter()
            .filter(|id| !published.get(id).map(SummaryState::is_unknown).unwrap_or(false))
            .filter_map(|id| self.program.function(*id))
            .collect();
        if active.is_empty() {
            return result;
        }

        let recursive =
            members.len() > 1 || members.iter().any(|&i| graph.contains_edge(i, i));

        let mut view = published.clone();
        for function in &active {
            view.insert(
                function.id,
                SummaryState::Computed(Arc::new(FunctionSummary::new())),
            );
        }

        let mut settled: FxHashMap<FunctionId, FunctionSummary> = active
            .iter()
            .map(|f| (f.id, FunctionSummary::new()))
            .collect();
        let mut latest: FxHashMap<FunctionId, FunctionAnalysis> = FxHashMap::default();

        let mut rounds = 0usize;
        loop {
            rounds += 1;
            if rounds > self.config.max_scc_rounds {
                // Partial summaries are never trusted.
                for function in &active {
                    tracing::warn!(function = %function.id, rounds, "component fixpoint budget exhausted");
                    result.failures.push(FunctionFailure {
                        function: function.id,
                        kind: FailureKind::NonConvergence {
                            rounds,
                            budget: self.config.max_scc_rounds,
                        },
                    });
                    result.summaries.push((
                        function.id,
                        SummaryState::Unknown {
                            function: function.id,
                            reason: "component fixpoint budget exhausted".to_string(),
                        },
                    ));
                }
                return result;
            }

            let mut changed = false;
            let mut failed: Vec<(FunctionId, FailureKind)> = Vec::new();

            for function in &active {
                let ctx = IntraContext {
                    program: self.program,
                    rules: self.rules,
                    summaries: &view,
                    config: self.config,
                };
                match analyze_function(function, &ctx) {
                    Ok(analysis) => {
                        let summary = self.build_summary(function, &analysis, &view);
                        if let Some(entry) = settled.get_mut(&function.id) {
                            changed |= entry.merge(&summary);
                        }
                        latest.insert(function.id, analysis);
                    }
                    Err(kind) => failed.push((function.id, kind)),
                }
            }

            for (id, kind) in failed {
                tracing::warn!(function = %id, failure = %kind, "function degraded to unknown summary");
                view.insert(
                    id,
                    SummaryState::Unknown {
                        function: id,
                        reason: kind.to_string(),
                    },
                );
                result.summaries.push((
                    id,
                    SummaryState::Unknown {
                        function: id,
                        reason: kind.to_string(),
                    },
                ));
                result.failures.push(FunctionFailure { function: id, kind });
                active.retain(|f| f.id != id);
                settled.remove(&id);
                latest.remove(&id);
                changed = true;
            }

            if !recursive || !changed {
                break;
            }
            for (id, summary) in &settled {
                view.insert(*id, SummaryState::Computed(Arc::new(summary.clone())));
            }
        }

        for (id, summary) in settled {
            result
                .summaries
                .push((id, SummaryState::Computed(Arc::new(summary))));
        }
        for (id, analysis) in latest {
            result.analyses.push((id, analysis));
        }
        result
    }

    /// Distill a function's fixpoint into its call-site-independent
    /// summary: returned taint, global and out-parameter effects, sinks
    /// reachable from symbolic inputs (own and transitively through
    /// callees), and taint the function originates itself.
    fn build_summary(
        &self,
        function: &FunctionIr,
        analysis: &FunctionAnalysis,
        summaries: &FxHashMap<FunctionId, SummaryState>,
    ) -> FunctionSummary {
        let mut summary = FunctionSummary::new();

        let mut returned = LabelSet::empty();
        for out in analysis.out_states.values() {
            returned = returned.join(&out.labels(&Slot::Return));
        }
        for label in returned.iter() {
            record_output(&mut summary, label, SummaryOutput::Return);
        }

        let exit_state = function.flow.exits().fold(ValueState::default(), |acc, node| {
            match analysis.out_states.get(&node.id) {
                Some(state) => acc.join(state),
                None => acc,
            }
        });
        for global in self.program.globals() {
            let seed = TaintRoot::Global(global.clone());
            for label in exit_state.var(global).iter() {
                if label.root() == &seed && label.steps().is_empty() && !label.crossed_unknown() {
                    continue;
                }
                record_output(&mut summary, label, SummaryOutput::Global(global.clone()));
            }
        }
        for (index, param) in function.params.iter().enumerate() {
            let seed = TaintRoot::Param(index);
            for label in exit_state.var(param).iter() {
                if label.root() == &seed && label.steps().is_empty() && !label.crossed_unknown() {
                    continue;
                }
                record_output(&mut summary, label, SummaryOutput::OutParam(index));
            }
        }

        let classifier = SinkClassifier::new(self.rules);
        for node in function.flow.nodes() {
            let Some(input_state) = analysis.in_states.get(&node.id) else { continue };

            if let Some(site) = classifier.classify(function.id, node) {
                let FlowOp::Call { args, .. } = &node.op else { continue };
                for slot in &site.arg_slots {
                    let Some(arg) = args.get(*slot) else { continue };
                    for label in input_state.var(arg).iter() {
                        let Some(input) = symbolic_input(label.root()) else { continue };
                        let mut path = label.provenance().to_vec();
                        path.push(node.id);
                        summary.add_sink_flow(SinkFlow {
                            input,
                            sink: site.clone(),
                            path,
                            steps: label.steps().to_vec(),
                            crossed_unknown: label.crossed_unknown(),
                        });
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
            if modeled_call(self.rules, api.as_deref(), target) {
                continue;
            }
            let Some(SummaryState::Computed(callee_summary)) = summaries.get(callee) else {
                continue;
            };
            for flow in &callee_summary.sink_flows {
                let caller_labels = match &flow.input {
                    TaintInput::Param(i) => args
                        .get(*i)
                        .map(|arg| input_state.var(arg))
                        .unwrap_or_default(),
                    TaintInput::Global(name) => input_state.var(name),
                };
                for label in caller_labels.iter() {
                    let Some(input) = symbolic_input(label.root()) else { continue };
                    let composed =
                        label.composed(node.id, &flow.path, &flow.steps, flow.crossed_unknown);
                    summary.add_sink_flow(SinkFlow {
                        input,
                        sink: flow.sink.clone(),
                        path: composed.provenance().to_vec(),
                        steps: composed.steps().to_vec(),
                        crossed_unknown: composed.crossed_unknown(),
                    });
                }
            }
        }

        summary
    }
}

fn symbolic_input(root: &TaintRoot) -> Option<TaintInput> {
    match root {
        TaintRoot::Param(i) => Some(TaintInput::Param(*i)),
        TaintRoot::Global(name) => Some(TaintInput::Global(name.clone())),
        TaintRoot::Source { .. } => None,
    }
}

fn record_output(
    summary: &mut FunctionSummary,
    label: &crate::domain::label::TaintLabel,
    output: SummaryOutput,
) {
    match label.root() {
        TaintRoot::Param(i) => {
            summary.add_value_flow(
                TaintInput::Param(*i),
                SummaryFlow {
                    output,
                    path: label.provenance().to_vec(),
                    steps: label.steps().to_vec(),
                    crossed_unknown: label.crossed_unknown(),
                },
            );
        }
        TaintRoot::Global(name) => {
            summary.add_value_flow(
                TaintInput::Global(name.clone()),
                SummaryFlow {
                    output,
                    path: label.provenance().to_vec(),
                    steps: label.steps().to_vec(),
                    crossed_unknown: label.crossed_unknown(),
                },
            );
        }
        TaintRoot::Source { origin, at } => {
            // The source fired inside this function: callers inherit the
            // concrete origin through the summary.
            let path = label.provenance().get(1..).unwrap_or(&[]).to_vec();
            summary.add_source_flow(SourceFlow {
                origin: *origin,
                at: *at,
                output,
                path,
                steps: label.steps().to_vec(),
                crossed_unknown: label.crossed_unknown(),
            });
        }
    }
}

/// Group components into bottom-up layers. `tarjan_scc` returns components
/// in reverse topological order, so every callee component is assigned a
/// layer before its callers; a component's layer is one past the deepest
/// callee layer.
fn assign_layers(graph: &DiGraph<FunctionId, ()>, sccs: &[Vec<NodeIndex>]) -> Vec<Vec<usize>> {
    let mut component_of: FxHashMap<NodeIndex, usize> = FxHashMap::default();
    for (i, scc) in sccs.iter().enumerate() {
        for &index in scc {
            component_of.insert(index, i);
        }
    }

    let mut layer_of = vec![1usize; sccs.len()];
    for (i, scc) in sccs.iter().enumerate() {
        let mut layer = 1;
        for &index in scc {
            for callee in graph.neighbors(index) {
                let j = component_of[&callee];
                if j != i {
                    layer = layer.max(layer_of[j] + 1);
                }
            }
        }
        layer_of[i] = layer;
    }

    let depth = layer_of.iter().copied().max().unwrap_or(0);
    let mut layers: Vec<Vec<usize>> = vec![Vec::new(); depth];
    for (component, layer) in layer_of.iter().enumerate() {
        layers[layer - 1].push(component);
    }
    layers
}
