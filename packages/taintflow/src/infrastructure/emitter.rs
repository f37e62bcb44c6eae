//! Finding deduplication and report assembly.
//!
//! Findings sharing the same (origin kind, sink node, classification)
//! triple collapse into one: the highest-confidence representative is
//! kept, the number of equivalent paths is recorded. The report iterates
//! severity-descending then confidence-descending; iteration is lazy and
//! restartable, and a fresh scan produces a fresh report.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::domain::context::Context;
use crate::domain::finding::{Classification, Finding};
use crate::domain::label::OriginKind;
use crate::ports::ir::NodeId;

pub struct FindingEmitter;

impl FindingEmitter {
    pub fn emit(findings: Vec<Finding>) -> FindingReport {
        let mut groups: FxHashMap<(OriginKind, NodeId, Classification), Finding> =
            FxHashMap::default();

        for finding in findings {
            let key = (finding.origin, finding.sink.node, finding.classification);
            match groups.get_mut(&key) {
                Some(existing) => {
                    existing.collapsed_paths += 1;
                    if finding.confidence > existing.confidence {
                        let collapsed = existing.collapsed_paths;
                        *existing = finding;
                        existing.collapsed_paths = collapsed;
                    }
                }
                None => {
                    let mut finding = finding;
                    finding.collapsed_paths = 1;
                    groups.insert(key, finding);
                }
            }
        }

        let mut findings: Vec<Finding> = groups.into_values().collect();
        findings.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(b.confidence.total_cmp(&a.confidence))
                .then(a.sink.node.cmp(&b.sink.node))
                .then(a.source_node.cmp(&b.source_node))
        });

        FindingReport { findings }
    }
}

/// The ordered, deduplicated result of one scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindingReport {
    findings: Vec<Finding>,
}

impl FindingReport {
    pub fn iter(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Findings whose sink context stack contains the given context at any
    /// layer.
    pub fn findings_for_context(&self, context: Context) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(move |f| f.sink.context.contains(context))
    }

    pub fn findings_for_origin(&self, origin: OriginKind) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.origin == origin)
    }
}
