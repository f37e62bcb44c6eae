//! Sink contexts and neutralization steps.
//!
//! A `Context` names the syntactic environment a value lands in at a sink;
//! it decides which neutralization is adequate. Sinks may carry a
//! `CompositeContext`: an ordered stack of nested contexts that must be
//! neutralized innermost-first.

use serde::{Deserialize, Serialize};

use crate::ports::ir::NodeId;

/// Syntactic/semantic environment a value is placed into at a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Context {
    /// Command text of an interpreter (SQL/HQL/OS shell).
    RawCommandInterpreter,
    HtmlBody,
    HtmlAttribute,
    ScriptLiteral,
    UrlParameter,
    CssValue,
    FilesystemPath,
    RedirectTarget,
    ForwardTarget,
    LogRecord,
}

impl Context {
    /// Input domains with percent/unicode-encoded equivalent forms, where
    /// validation is only meaningful after canonicalization.
    pub fn requires_canonicalization(self) -> bool {
        matches!(self, Context::FilesystemPath | Context::RawCommandInterpreter)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Context::RawCommandInterpreter => "raw-command-interpreter",
            Context::HtmlBody => "html-body",
            Context::HtmlAttribute => "html-attribute",
            Context::ScriptLiteral => "script-literal",
            Context::UrlParameter => "url-parameter",
            Context::CssValue => "css-value",
            Context::FilesystemPath => "filesystem-path",
            Context::RedirectTarget => "redirect-target",
            Context::ForwardTarget => "forward-target",
            Context::LogRecord => "log-record",
        }
    }
}

/// Ordered stack of sink contexts, innermost-first. Never empty.
///
/// A plain sink has one layer; a nested sink (e.g. an event-handler string
/// inside an HTML attribute inside the document body) has several, and a
/// flow is adequate only if neutralization steps match the layers in this
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeContext {
    layers: Vec<Context>,
}

impl CompositeContext {
    pub fn single(context: Context) -> Self {
        Self {
            layers: vec![context],
        }
    }

    /// Build from layers ordered innermost-first. Returns `None` when the
    /// layer list is empty: every sink has at least one context.
    pub fn nested(layers: Vec<Context>) -> Option<Self> {
        if layers.is_empty() {
            None
        } else {
            Some(Self { layers })
        }
    }

    pub fn layers(&self) -> &[Context] {
        &self.layers
    }

    pub fn innermost(&self) -> Context {
        self.layers[0]
    }

    pub fn is_composite(&self) -> bool {
        self.layers.len() > 1
    }

    pub fn contains(&self, context: Context) -> bool {
        self.layers.contains(&context)
    }
}

/// How a neutralization step constrains data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strength {
    /// Accept only known-good forms.
    Whitelist,
    /// Reject known-bad forms. Never sufficient evidence on its own.
    Blacklist,
    /// Bind the value as a literal data parameter instead of command text.
    Parameterization,
    /// Reduce the value to a single canonical form before validation.
    Canonicalization,
}

impl Strength {
    pub fn as_str(self) -> &'static str {
        match self {
            Strength::Whitelist => "whitelist",
            Strength::Blacklist => "blacklist",
            Strength::Parameterization => "parameterization",
            Strength::Canonicalization => "canonicalization",
        }
    }
}

/// A neutralization step a tainted value has passed through, recorded in
/// flow order on the label. Propagation never clears taint at a sanitizer;
/// the effectiveness model judges these records against the sink context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppliedStep {
    /// IR node of the sanitizer/encoder/validator call.
    pub node: NodeId,
    /// Contexts the step is declared sound for.
    pub contexts: Vec<Context>,
    pub strength: Strength,
}

impl AppliedStep {
    pub fn new(node: NodeId, contexts: Vec<Context>, strength: Strength) -> Self {
        Self {
            node,
            contexts,
            strength,
        }
    }

    pub fn matches_context(&self, context: Context) -> bool {
        self.contexts.contains(&context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_never_empty() {
        assert!(CompositeContext::nested(vec![]).is_none());

        let ctx = CompositeContext::single(Context::HtmlBody);
        assert_eq!(ctx.layers(), &[Context::HtmlBody]);
        assert!(!ctx.is_composite());
    }

    #[test]
    fn test_nested_ordering_preserved() {
        let ctx = CompositeContext::nested(vec![
            Context::ScriptLiteral,
            Context::HtmlAttribute,
            Context::HtmlBody,
        ])
        .unwrap();

        assert_eq!(ctx.innermost(), Context::ScriptLiteral);
        assert!(ctx.is_composite());
        assert!(ctx.contains(Context::HtmlAttribute));
        assert!(!ctx.contains(Context::CssValue));
    }

    #[test]
    fn test_canonicalization_domains() {
        assert!(Context::FilesystemPath.requires_canonicalization());
        assert!(Context::RawCommandInterpreter.requires_canonicalization());
        assert!(!Context::HtmlBody.requires_canonicalization());
        assert!(!Context::RedirectTarget.requires_canonicalization());
    }

    #[test]
    fn test_step_context_match() {
        let step = AppliedStep::new(
            NodeId(7),
            vec![Context::HtmlAttribute, Context::HtmlBody],
            Strength::Whitelist,
        );
        assert!(step.matches_context(Context::HtmlBody));
        assert!(!step.matches_context(Context::ScriptLiteral));
    }
}
