//! Intraprocedural taint propagation.
//!
//! A worklist fixpoint over one function's flow graph. Each program point
//! holds a map from value slot to `LabelSet`; the transfer function
//! performs strong updates on assignment targets and call results, joins
//! at merge points, and never clears taint at a sanitizer (it threads an
//! `AppliedStep` instead). Callee behavior comes from published summaries;
//! calls without one propagate taint under the unknown rule.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

use crate::config::ScanConfig;
use crate::domain::context::AppliedStep;
use crate::domain::label::{LabelSet, TaintLabel};
use crate::domain::summary::{FunctionSummary, SourceFlow, SummaryFlow, SummaryOutput, SummaryState, TaintInput};
use crate::errors::FailureKind;
use crate::ports::ir::{CallTarget, FlowNode, FlowOp, FunctionId, FunctionIr, NodeId, ProgramIr};
use crate::ports::rules::RuleDatabase;

/// A tracked value slot: a named variable (locals, parameters and globals
/// share the namespace) or the function's pending return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    Var(String),
    Return,
}

/// Taint state at one program point. Empty label sets are never stored, so
/// map equality is state equality.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueState {
    slots: FxHashMap<Slot, LabelSet>,
}

impl ValueState {
    pub fn labels(&self, slot: &Slot) -> LabelSet {
        self.slots.get(slot).cloned().unwrap_or_default()
    }

    pub fn var(&self, name: &str) -> LabelSet {
        self.slots
            .get(&Slot::Var(name.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Strong update: the slot's previous labels are discarded.
    pub fn set(&mut self, slot: Slot, labels: LabelSet) {
        if labels.is_empty() {
            self.slots.remove(&slot);
        } else {
            self.slots.insert(slot, labels);
        }
    }

    /// Weak update: the slot's previous labels are kept.
    pub fn join_into(&mut self, slot: Slot, labels: LabelSet) {
        if labels.is_empty() {
            return;
        }
        match self.slots.get_mut(&slot) {
            Some(existing) => *existing = existing.join(&labels),
            None => {
                self.slots.insert(slot, labels);
            }
        }
    }

    /// Pointwise join, the merge operation at control-flow joins.
    pub fn join(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (slot, labels) in &other.slots {
            out.join_into(slot.clone(), labels.clone());
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Result of one function's fixpoint: per-node states plus accounting.
#[derive(Debug, Clone)]
pub struct FunctionAnalysis {
    pub function: FunctionId,
    pub in_states: FxHashMap<NodeId, ValueState>,
    pub out_states: FxHashMap<NodeId, ValueState>,
    /// Call sites where taint crossed an unresolved or unmodeled call.
    pub unknown_edges: usize,
    pub iterations: usize,
}

/// Read-only environment shared by every per-function run.
pub struct IntraContext<'a> {
    pub program: &'a ProgramIr,
    pub rules: &'a RuleDatabase,
    pub summaries: &'a FxHashMap<FunctionId, SummaryState>,
    pub config: &'a ScanConfig,
}

/// Entry state: one symbolic label per formal parameter and per declared
/// global, plus concrete source labels for entry-classified parameters.
fn seed_state(function: &FunctionIr, ctx: &IntraContext) -> ValueState {
    let mut state = ValueState::default();
    let entry = function.flow.entry();

    for (index, name) in function.params.iter().enumerate() {
        let mut set = LabelSet::singleton(TaintLabel::param(index));
        for (slot, origin) in ctx.rules.entry_sources(&function.name) {
            if *slot == index {
                set.insert(TaintLabel::source(*origin, entry));
            }
        }
        state.set(Slot::Var(name.clone()), set);
    }
    for global in ctx.program.globals() {
        state.join_into(
            Slot::Var(global.clone()),
            LabelSet::singleton(TaintLabel::global(global.clone())),
        );
    }
    state
}

/// An API the rule database fully models: its taint effect comes from its
/// declaration, never from a summary or the unknown rule.
pub(crate) fn modeled_call(rules: &RuleDatabase, api: Option<&str>, target: &CallTarget) -> bool {
    let Some(api) = api else { return false };
    if rules.sanitizer_spec(api).is_some() || rules.source_origin(api).is_some() {
        return true;
    }
    // A declared sink with a local definition still propagates through its
    // summary; only external sinks are modeled by declaration alone.
    rules.sink_spec(api).is_some() && !matches!(target, CallTarget::Static(_))
}

fn compose_set(labels: &LabelSet, call_node: NodeId, flow: &SummaryFlow) -> LabelSet {
    LabelSet::from_labels(
        labels
            .iter()
            .map(|l| l.composed(call_node, &flow.path, &flow.steps, flow.crossed_unknown)),
    )
}

fn source_flow_label(call_node: NodeId, flow: &SourceFlow) -> TaintLabel {
    TaintLabel::source(flow.origin, flow.at).composed(
        call_node,
        &flow.path,
        &flow.steps,
        flow.crossed_unknown,
    )
}

fn apply_summary(
    state: &mut ValueState,
    node: NodeId,
    args: &[String],
    result: Option<&str>,
    summary: &FunctionSummary,
    program: &ProgramIr,
) {
    let mut inputs: Vec<(TaintInput, LabelSet)> = args
        .iter()
        .enumerate()
        .map(|(i, arg)| (TaintInput::Param(i), state.var(arg)))
        .collect();
    for global in program.globals() {
        inputs.push((TaintInput::Global(global.clone()), state.var(global)));
    }

    let mut result_set = LabelSet::empty();
    let mut weak: Vec<(Slot, LabelSet)> = Vec::new();

    for (input, labels) in &inputs {
        if labels.is_empty() {
            continue;
        }
        for flow in summary.flows_for(input) {
            let composed = compose_set(labels, node, flow);
            match &flow.output {
                SummaryOutput::Return => result_set = result_set.join(&composed),
                SummaryOutput::OutParam(i) => {
                    if let Some(arg) = args.get(*i) {
                        weak.push((Slot::Var(arg.clone()), composed));
                    }
                }
                SummaryOutput::Global(name) => {
                    weak.push((Slot::Var(name.clone()), composed));
                }
            }
        }
    }

    for flow in &summary.source_flows {
        let label = source_flow_label(node, flow);
        match &flow.output {
            SummaryOutput::Return => {
                result_set.insert(label);
            }
            SummaryOutput::OutParam(i) => {
                if let Some(arg) = args.get(*i) {
                    weak.push((Slot::Var(arg.clone()), LabelSet::singleton(label)));
                }
            }
            SummaryOutput::Global(name) => {
                weak.push((Slot::Var(name.clone()), LabelSet::singleton(label)));
            }
        }
    }

    for (slot, labels) in weak {
        state.join_into(slot, labels);
    }
    // The call result is a definition: strong update, cleared when the
    // callee returns nothing tainted.
    if let Some(result) = result {
        state.set(Slot::Var(result.to_string()), result_set);
    }
}

fn transfer_call(
    state: &mut ValueState,
    node: &FlowNode,
    target: &CallTarget,
    api: Option<&str>,
    args: &[String],
    result: Option<&str>,
    ctx: &IntraContext,
) {
    let arg_join = args
        .iter()
        .fold(LabelSet::empty(), |acc, arg| acc.join(&state.var(arg)));

    if let Some(spec) = api.and_then(|a| ctx.rules.sanitizer_spec(a)) {
        // Taint survives the sanitizer; the step record is what the
        // effectiveness model later judges against the sink context.
        let step = AppliedStep::new(node.id, spec.contexts.clone(), spec.strength);
        if let Some(result) = result {
            state.set(Slot::Var(result.to_string()), arg_join.with_step(&step));
        }
        return;
    }

    if let Some(origin) = api.and_then(|a| ctx.rules.source_origin(a)) {
        if let Some(result) = result {
            let mut set = LabelSet::singleton(TaintLabel::source(origin, node.id));
            set = set.join(&arg_join.derived(node.id));
            state.set(Slot::Var(result.to_string()), set);
        }
        return;
    }

    if api.map(|a| ctx.rules.sink_spec(a).is_some()).unwrap_or(false)
        && !matches!(target, CallTarget::Static(_))
    {
        // External sink: its return value derives from the arguments but
        // introduces nothing new.
        if let Some(result) = result {
            state.set(Slot::Var(result.to_string()), arg_join.derived(node.id));
        }
        return;
    }

    match target {
        CallTarget::Static(callee) => match ctx.summaries.get(callee) {
            Some(SummaryState::Computed(summary)) => {
                apply_summary(state, node.id, args, result, summary, ctx.program);
            }
            _ => {
                if let Some(result) = result {
                    state.set(
                        Slot::Var(result.to_string()),
                        arg_join.through_unknown(node.id),
                    );
                }
            }
        },
        CallTarget::Dynamic => {
            if let Some(result) = result {
                state.set(
                    Slot::Var(result.to_string()),
                    arg_join.through_unknown(node.id),
                );
            }
        }
    }
}

fn transfer(node: &FlowNode, input: &ValueState, ctx: &IntraContext) -> ValueState {
    let mut state = input.clone();
    match &node.op {
        FlowOp::Assign { target, operands } => {
            let joined = operands
                .iter()
                .fold(LabelSet::empty(), |acc, op| acc.join(&state.var(op)));
            state.set(Slot::Var(target.clone()), joined.derived(node.id));
        }
        // Control dependence is out of scope: branches propagate nothing.
        FlowOp::Branch { .. } => {}
        FlowOp::Return { value } => {
            if let Some(value) = value {
                let labels = state.var(value).derived(node.id);
                state.join_into(Slot::Return, labels);
            }
        }
        FlowOp::Call {
            target,
            api,
            args,
            result,
            ..
        } => {
            transfer_call(
                &mut state,
                node,
                target,
                api.as_deref(),
                args,
                result.as_deref(),
                ctx,
            );
        }
    }
    state
}

/// Run the worklist fixpoint on one function. The per-point lattice is
/// finite (powerset of labels under provenance-ignoring equality) and the
/// transfer is monotone, so this converges; the iteration budget guards
/// against IR the model cannot settle on, degrading that function rather
/// than the scan.
pub fn analyze_function(
    function: &FunctionIr,
    ctx: &IntraContext,
) -> std::result::Result<FunctionAnalysis, FailureKind> {
    let seed = seed_state(function, ctx);
    let entry = function.flow.entry();

    let mut in_states: FxHashMap<NodeId, ValueState> = FxHashMap::default();
    let mut out_states: FxHashMap<NodeId, ValueState> = FxHashMap::default();

    let mut worklist: VecDeque<NodeId> = function.flow.nodes().map(|n| n.id).collect();
    let mut queued: FxHashSet<NodeId> = worklist.iter().copied().collect();

    let mut iterations = 0usize;
    while let Some(id) = worklist.pop_front() {
        queued.remove(&id);
        iterations += 1;
        if iterations > ctx.config.max_fixpoint_iterations {
            return Err(FailureKind::NonConvergence {
                rounds: iterations,
                budget: ctx.config.max_fixpoint_iterations,
            });
        }

        let Some(node) = function.flow.node(id) else { continue };

        let mut input = if id == entry { seed.clone() } else { ValueState::default() };
        for pred in function.flow.predecessors(id) {
            if let Some(out) = out_states.get(pred) {
                input = input.join(out);
            }
        }

        let output = transfer(node, &input, ctx);
        in_states.insert(id, input);

        let changed = out_states.get(&id) != Some(&output);
        if changed {
            out_states.insert(id, output);
            for succ in function.flow.successors(id) {
                if queued.insert(*succ) {
                    worklist.push_back(*succ);
                }
            }
        }
    }

    let unknown_edges = count_unknown_edges(function, &in_states, ctx);

    Ok(FunctionAnalysis {
        function: function.id,
        in_states,
        out_states,
        unknown_edges,
        iterations,
    })
}

fn count_unknown_edges(
    function: &FunctionIr,
    in_states: &FxHashMap<NodeId, ValueState>,
    ctx: &IntraContext,
) -> usize {
    let mut count = 0;
    for node in function.flow.nodes() {
        let FlowOp::Call { target, api, args, .. } = &node.op else { continue };
        if modeled_call(ctx.rules, api.as_deref(), target) {
            continue;
        }
        let unresolved = match target {
            CallTarget::Dynamic => true,
            CallTarget::Static(callee) => ctx
                .summaries
                .get(callee)
                .map(|s| s.is_unknown())
                .unwrap_or(true),
        };
        if !unresolved {
            continue;
        }
        if let Some(input) = in_states.get(&node.id) {
            if args.iter().any(|arg| !input.var(arg).is_empty()) {
                count += 1;
            }
        }
    }
    count
}
