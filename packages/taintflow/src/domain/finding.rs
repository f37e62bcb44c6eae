//! Findings: confirmed candidate flows packaged for the reporting layer.

use serde::{Deserialize, Serialize};

use crate::domain::context::{AppliedStep, CompositeContext, Context};
use crate::domain::label::OriginKind;
use crate::ports::ir::{FunctionId, NodeId};

/// Verdict of the neutralization effectiveness model for one flow.
///
/// UNKNOWN is never silently treated as SUFFICIENT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Sufficient,
    Insufficient,
    Unknown,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Sufficient => "sufficient",
            Classification::Insufficient => "insufficient",
            Classification::Unknown => "unknown",
        }
    }
}

/// Report severity. Declared least-first so the derived ordering sorts
/// ascending and reports iterate descending.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Severity of a classified flow, by verdict and innermost sink
    /// context. An INSUFFICIENT flow from a concrete origin never drops
    /// below Low, so it is always retained in the report.
    pub fn for_finding(classification: Classification, innermost: Context) -> Severity {
        match classification {
            Classification::Sufficient => Severity::Info,
            Classification::Unknown => Severity::Low,
            Classification::Insufficient => match innermost {
                Context::RawCommandInterpreter
                | Context::ScriptLiteral
                | Context::RedirectTarget
                | Context::ForwardTarget => Severity::High,
                _ => Severity::Medium,
            },
        }
    }
}

/// An IR operation classified as security-relevant: the node, its owning
/// function, the required (possibly composite, never empty) context, and
/// the argument slots to check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkSite {
    pub node: NodeId,
    pub function: FunctionId,
    pub context: CompositeContext,
    pub arg_slots: Vec<usize>,
}

/// Immutable record of one source-to-sink flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub origin: OriginKind,
    /// IR node where the source label was created.
    pub source_node: NodeId,
    pub origin_context: Option<Context>,
    pub sink: SinkSite,
    /// IR nodes connecting source to sink, in flow order.
    pub path: Vec<NodeId>,
    /// Neutralization steps encountered on the path, in flow order
    /// (possibly empty).
    pub steps: Vec<AppliedStep>,
    pub classification: Classification,
    pub severity: Severity,
    pub confidence: f32,
    /// Equivalent paths collapsed into this finding by deduplication.
    pub collapsed_paths: usize,
    pub crossed_unknown: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn test_insufficient_concrete_origin_retained() {
        for context in [
            Context::HtmlBody,
            Context::LogRecord,
            Context::CssValue,
            Context::FilesystemPath,
        ] {
            let severity = Severity::for_finding(Classification::Insufficient, context);
            assert!(severity >= Severity::Low);
        }
    }

    #[test]
    fn test_injection_contexts_rank_high() {
        assert_eq!(
            Severity::for_finding(Classification::Insufficient, Context::RawCommandInterpreter),
            Severity::High
        );
        assert_eq!(
            Severity::for_finding(Classification::Insufficient, Context::RedirectTarget),
            Severity::High
        );
        assert_eq!(
            Severity::for_finding(Classification::Sufficient, Context::RawCommandInterpreter),
            Severity::Info
        );
    }
}
