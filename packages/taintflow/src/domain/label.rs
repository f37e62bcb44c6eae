//! Taint lattice: labels, roots, and the immutable label set.
//!
//! Labels are immutable: propagation derives new labels (`extended`,
//! `with_step`, `through_unknown`, `composed`), never mutates in place.
//! Equality and hashing ignore the provenance path so that the fixpoint
//! converges and set deduplication works; findings still render the
//! provenance of a representative label.
//!
//! A merged value keeps one label per taint root inside its `LabelSet`
//! rather than collapsing origins into a single label, so a path that
//! explains any one origin can always be reconstructed.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::domain::context::{AppliedStep, Context};
use crate::ports::ir::NodeId;

/// Where externally influenced data entered tracked computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OriginKind {
    NetworkParameter,
    Header,
    Cookie,
    StoredRecord,
    FileContent,
    Environment,
    UnknownExternal,
}

impl OriginKind {
    /// Rank used when choosing a representative label: network parameters
    /// and stored records outrank unknown-external origins.
    pub fn specificity(self) -> u8 {
        match self {
            OriginKind::NetworkParameter => 6,
            OriginKind::StoredRecord => 5,
            OriginKind::Header => 4,
            OriginKind::Cookie => 4,
            OriginKind::FileContent => 3,
            OriginKind::Environment => 2,
            OriginKind::UnknownExternal => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OriginKind::NetworkParameter => "network-parameter",
            OriginKind::Header => "header",
            OriginKind::Cookie => "cookie",
            OriginKind::StoredRecord => "stored-record",
            OriginKind::FileContent => "file-content",
            OriginKind::Environment => "environment",
            OriginKind::UnknownExternal => "unknown-external",
        }
    }
}

/// Identity of a taint label: either a concrete source occurrence, or a
/// symbolic marker used by the summary pass (one marker per formal
/// parameter or captured global, all tracked simultaneously).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaintRoot {
    /// Concrete source classified by the rule database.
    Source { origin: OriginKind, at: NodeId },
    /// Symbolic taint on formal parameter `i`.
    Param(usize),
    /// Symbolic taint on a captured global.
    Global(String),
}

impl TaintRoot {
    pub fn origin(&self) -> Option<OriginKind> {
        match self {
            TaintRoot::Source { origin, .. } => Some(*origin),
            _ => None,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        !matches!(self, TaintRoot::Source { .. })
    }
}

/// A single taint label: root identity, context at origin, provenance path,
/// neutralization steps crossed, and whether the label ever flowed through
/// an unresolved call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaintLabel {
    root: TaintRoot,
    origin_context: Option<Context>,
    provenance: Vec<NodeId>,
    steps: Vec<AppliedStep>,
    crossed_unknown: bool,
}

impl TaintLabel {
    pub fn source(origin: OriginKind, at: NodeId) -> Self {
        Self {
            root: TaintRoot::Source { origin, at },
            origin_context: None,
            provenance: vec![at],
            steps: Vec::new(),
            crossed_unknown: false,
        }
    }

    pub fn source_in_context(origin: OriginKind, at: NodeId, context: Context) -> Self {
        Self {
            origin_context: Some(context),
            ..Self::source(origin, at)
        }
    }

    pub fn param(index: usize) -> Self {
        Self {
            root: TaintRoot::Param(index),
            origin_context: None,
            provenance: Vec::new(),
            steps: Vec::new(),
            crossed_unknown: false,
        }
    }

    pub fn global(name: impl Into<String>) -> Self {
        Self {
            root: TaintRoot::Global(name.into()),
            origin_context: None,
            provenance: Vec::new(),
            steps: Vec::new(),
            crossed_unknown: false,
        }
    }

    pub fn root(&self) -> &TaintRoot {
        &self.root
    }

    pub fn origin(&self) -> Option<OriginKind> {
        self.root.origin()
    }

    pub fn origin_context(&self) -> Option<Context> {
        self.origin_context
    }

    pub fn provenance(&self) -> &[NodeId] {
        &self.provenance
    }

    pub fn steps(&self) -> &[AppliedStep] {
        &self.steps
    }

    pub fn crossed_unknown(&self) -> bool {
        self.crossed_unknown
    }

    /// Derive a label that has flowed through `node`. Provenance only ever
    /// records nodes already visited, in visit order.
    pub fn extended(&self, node: NodeId) -> Self {
        let mut next = self.clone();
        if next.provenance.last() != Some(&node) {
            next.provenance.push(node);
        }
        next
    }

    /// Derive a label that has passed a neutralization step. Appending the
    /// same step node twice is a no-op, so loop bodies converge.
    pub fn with_step(&self, step: AppliedStep) -> Self {
        let mut next = self.extended(step.node);
        if !next.steps.iter().any(|s| s.node == step.node) {
            next.steps.push(step);
        }
        next
    }

    /// Derive a label that crossed an unresolved/unmodeled call.
    pub fn through_unknown(&self, node: NodeId) -> Self {
        let mut next = self.extended(node);
        next.crossed_unknown = true;
        next
    }

    /// Splice a callee-internal flow into this label at a call site:
    /// provenance and steps of the callee flow are appended after the call
    /// node, and unknown-propagation is inherited.
    pub fn composed(
        &self,
        call_node: NodeId,
        inner_path: &[NodeId],
        inner_steps: &[AppliedStep],
        inner_unknown: bool,
    ) -> Self {
        let mut next = self.extended(call_node);
        next.provenance.extend_from_slice(inner_path);
        for step in inner_steps {
            if !next.steps.iter().any(|s| s.node == step.node) {
                next.steps.push(step.clone());
            }
        }
        next.crossed_unknown |= inner_unknown;
        next
    }
}

// Provenance is deliberately excluded: two labels with the same root,
// origin context, step sequence and unknown flag are the same fact.
impl PartialEq for TaintLabel {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
            && self.origin_context == other.origin_context
            && self.steps == other.steps
            && self.crossed_unknown == other.crossed_unknown
    }
}

impl Eq for TaintLabel {}

impl Hash for TaintLabel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.root.hash(state);
        self.origin_context.hash(state);
        self.steps.hash(state);
        self.crossed_unknown.hash(state);
    }
}

/// Small immutable set of taint labels attached to one value slot.
///
/// Join is set union under provenance-ignoring equality; on collision the
/// already-present label wins, which keeps the shortest provenance and
/// guarantees no forward references into unvisited nodes. Labels with
/// different roots are never collapsed into one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelSet {
    labels: Vec<TaintLabel>,
}

impl LabelSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn singleton(label: TaintLabel) -> Self {
        Self {
            labels: vec![label],
        }
    }

    pub fn from_labels(labels: impl IntoIterator<Item = TaintLabel>) -> Self {
        let mut set = Self::empty();
        for label in labels {
            set.insert(label);
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaintLabel> {
        self.labels.iter()
    }

    pub fn contains(&self, label: &TaintLabel) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Insert a label; returns true if the set changed. An already-present
    /// equal label (possibly with a different provenance) is kept as-is.
    pub fn insert(&mut self, label: TaintLabel) -> bool {
        if self.contains(&label) {
            false
        } else {
            self.labels.push(label);
            true
        }
    }

    /// Lattice join: set union. Monotone, so the dataflow fixpoint
    /// terminates on the finite per-point powerset.
    pub fn join(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for label in other.iter() {
            out.insert(label.clone());
        }
        out
    }

    /// All labels derived through `node`.
    pub fn derived(&self, node: NodeId) -> Self {
        Self {
            labels: self.labels.iter().map(|l| l.extended(node)).collect(),
        }
    }

    /// All labels with a neutralization step appended.
    pub fn with_step(&self, step: &AppliedStep) -> Self {
        Self {
            labels: self
                .labels
                .iter()
                .map(|l| l.with_step(step.clone()))
                .collect(),
        }
    }

    /// All labels flowed through an unresolved call.
    pub fn through_unknown(&self, node: NodeId) -> Self {
        Self {
            labels: self.labels.iter().map(|l| l.through_unknown(node)).collect(),
        }
    }

    /// Representative label for rendering: the most specific concrete
    /// origin wins; symbolic labels are only chosen when no concrete one
    /// exists.
    pub fn representative(&self) -> Option<&TaintLabel> {
        self.labels
            .iter()
            .max_by_key(|l| l.origin().map(|o| 1 + o.specificity() as i32).unwrap_or(0))
    }
}

// Set equality: order-insensitive, provenance-ignoring.
impl PartialEq for LabelSet {
    fn eq(&self, other: &Self) -> bool {
        self.labels.len() == other.labels.len()
            && self.labels.iter().all(|l| other.contains(l))
    }
}

impl Eq for LabelSet {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::Strength;

    #[test]
    fn test_equality_ignores_provenance() {
        let a = TaintLabel::source(OriginKind::Header, NodeId(1));
        let b = a.extended(NodeId(2)).extended(NodeId(3));

        assert_eq!(a, b);
        assert_ne!(a.provenance(), b.provenance());
    }

    #[test]
    fn test_distinct_origins_never_collapse() {
        let mut set = LabelSet::empty();
        set.insert(TaintLabel::source(OriginKind::NetworkParameter, NodeId(1)));
        set.insert(TaintLabel::source(OriginKind::UnknownExternal, NodeId(2)));

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_join_keeps_existing_provenance() {
        let short = TaintLabel::source(OriginKind::Cookie, NodeId(1));
        let long = short.extended(NodeId(2)).extended(NodeId(3));

        let joined = LabelSet::singleton(short.clone()).join(&LabelSet::singleton(long));
        assert_eq!(joined.len(), 1);
        assert_eq!(joined.iter().next().unwrap().provenance(), &[NodeId(1)]);
    }

    #[test]
    fn test_representative_prefers_specific_origin() {
        let set = LabelSet::from_labels([
            TaintLabel::source(OriginKind::UnknownExternal, NodeId(1)),
            TaintLabel::source(OriginKind::NetworkParameter, NodeId(2)),
            TaintLabel::param(0),
        ]);

        let rep = set.representative().unwrap();
        assert_eq!(rep.origin(), Some(OriginKind::NetworkParameter));
    }

    #[test]
    fn test_step_append_idempotent_per_node() {
        let step = AppliedStep::new(NodeId(9), vec![], Strength::Whitelist);
        let label = TaintLabel::source(OriginKind::Header, NodeId(1))
            .with_step(step.clone())
            .with_step(step);

        assert_eq!(label.steps().len(), 1);
    }

    #[test]
    fn test_steps_distinguish_labels() {
        let plain = TaintLabel::source(OriginKind::Header, NodeId(1));
        let stepped = plain.with_step(AppliedStep::new(
            NodeId(2),
            vec![],
            Strength::Blacklist,
        ));

        let mut set = LabelSet::singleton(plain);
        assert!(set.insert(stepped));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_unknown_flag_tracked() {
        let label = TaintLabel::source(OriginKind::Environment, NodeId(1));
        assert!(!label.crossed_unknown());
        assert!(label.through_unknown(NodeId(4)).crossed_unknown());
    }

    #[test]
    fn test_composed_splices_callee_flow() {
        let step = AppliedStep::new(NodeId(21), vec![], Strength::Parameterization);
        let label = TaintLabel::source(OriginKind::NetworkParameter, NodeId(1)).composed(
            NodeId(5),
            &[NodeId(20), NodeId(21)],
            std::slice::from_ref(&step),
            false,
        );

        assert_eq!(
            label.provenance(),
            &[NodeId(1), NodeId(5), NodeId(20), NodeId(21)]
        );
        assert_eq!(label.steps(), &[step]);
    }

    #[test]
    fn test_set_equality_order_insensitive() {
        let a = TaintLabel::source(OriginKind::Header, NodeId(1));
        let b = TaintLabel::param(2);

        let left = LabelSet::from_labels([a.clone(), b.clone()]);
        let right = LabelSet::from_labels([b, a]);
        assert_eq!(left, right);
    }
}
