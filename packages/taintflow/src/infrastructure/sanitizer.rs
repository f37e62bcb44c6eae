//! Neutralization effectiveness model.
//!
//! Judges the neutralization steps recorded on a flow against the sink's
//! (possibly composite) context. The verdict precedence:
//!
//! 1. Parameterization is total for command-text sinks: binding the value
//!    as a data parameter ends the injection question regardless of other
//!    steps, provided the innermost layer is the command interpreter.
//! 2. Otherwise every context layer, innermost-first, must be matched by a
//!    whitelist- or canonicalization-strength step declared for it, in the
//!    correct relative order along the path.
//! 3. A layer whose only matching evidence is blacklist-strength is
//!    INSUFFICIENT: rejecting known-bad forms is never adequate.
//! 4. Contexts with encoded equivalent forms (filesystem paths, command
//!    text) additionally require a canonicalization step no later than the
//!    validation that matched the layer; validate-then-decode is a bug,
//!    not a style choice.
//! 5. With no relevant step at all, a flow that crossed an
//!    unknown-propagation edge is UNKNOWN; one fully tracked is
//!    INSUFFICIENT.

use crate::domain::context::{AppliedStep, CompositeContext, Context, Strength};
use crate::domain::finding::Classification;

pub struct EffectivenessModel;

impl EffectivenessModel {
    pub fn evaluate(
        sink: &CompositeContext,
        steps: &[AppliedStep],
        crossed_unknown: bool,
    ) -> Classification {
        if sink.innermost() == Context::RawCommandInterpreter
            && steps
                .iter()
                .any(|s| s.strength == Strength::Parameterization)
        {
            return Classification::Sufficient;
        }

        let any_relevant = steps
            .iter()
            .any(|s| sink.layers().iter().any(|l| s.matches_context(*l)));
        if !any_relevant {
            return if crossed_unknown {
                Classification::Unknown
            } else {
                Classification::Insufficient
            };
        }

        // Each layer consumes a step at or after the previous layer's
        // match: inner neutralization must happen before outer.
        let mut cursor = 0usize;
        for layer in sink.layers() {
            // Blacklist-strength steps are skipped, so a layer with only
            // blacklist evidence falls through to INSUFFICIENT like a
            // layer with none.
            let matched = steps
                .iter()
                .enumerate()
                .skip(cursor)
                .find(|(_, step)| {
                    step.matches_context(*layer) && step.strength != Strength::Blacklist
                });

            let Some((index, step)) = matched else {
                return Classification::Insufficient;
            };

            if layer.requires_canonicalization()
                && step.strength != Strength::Canonicalization
                && !steps[..=index]
                    .iter()
                    .any(|s| s.strength == Strength::Canonicalization)
            {
                return Classification::Insufficient;
            }

            cursor = index + 1;
        }

        Classification::Sufficient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ir::NodeId;

    fn step(id: u32, contexts: Vec<Context>, strength: Strength) -> AppliedStep {
        AppliedStep::new(NodeId(id), contexts, strength)
    }

    #[test]
    fn test_parameterization_total_for_command_sinks() {
        let sink = CompositeContext::single(Context::RawCommandInterpreter);
        let steps = vec![
            step(1, vec![Context::HtmlBody], Strength::Blacklist),
            step(2, vec![], Strength::Parameterization),
        ];
        assert_eq!(
            EffectivenessModel::evaluate(&sink, &steps, false),
            Classification::Sufficient
        );
        // Total even when the flow crossed an unknown edge.
        assert_eq!(
            EffectivenessModel::evaluate(&sink, &steps, true),
            Classification::Sufficient
        );
    }

    #[test]
    fn test_parameterization_not_total_elsewhere() {
        let sink = CompositeContext::single(Context::HtmlBody);
        let steps = vec![step(1, vec![], Strength::Parameterization)];
        assert_eq!(
            EffectivenessModel::evaluate(&sink, &steps, false),
            Classification::Insufficient
        );
    }

    #[test]
    fn test_whitelist_matches_single_layer() {
        let sink = CompositeContext::single(Context::HtmlBody);
        let steps = vec![step(1, vec![Context::HtmlBody], Strength::Whitelist)];
        assert_eq!(
            EffectivenessModel::evaluate(&sink, &steps, false),
            Classification::Sufficient
        );
    }

    #[test]
    fn test_blacklist_never_adequate() {
        let sink = CompositeContext::single(Context::HtmlBody);
        let steps = vec![step(1, vec![Context::HtmlBody], Strength::Blacklist)];
        assert_eq!(
            EffectivenessModel::evaluate(&sink, &steps, false),
            Classification::Insufficient
        );
    }

    #[test]
    fn test_composite_layers_in_order_sufficient() {
        let sink = CompositeContext::nested(vec![
            Context::ScriptLiteral,
            Context::HtmlAttribute,
            Context::HtmlBody,
        ])
        .unwrap();
        let steps = vec![
            step(1, vec![Context::ScriptLiteral], Strength::Whitelist),
            step(2, vec![Context::HtmlAttribute], Strength::Whitelist),
            step(3, vec![Context::HtmlBody], Strength::Whitelist),
        ];
        assert_eq!(
            EffectivenessModel::evaluate(&sink, &steps, false),
            Classification::Sufficient
        );
    }

    #[test]
    fn test_composite_layers_wrong_order_insufficient() {
        // Same steps, outer encoding first: the script layer's step comes
        // before the attribute layer's in path order, but the sink needs
        // script handled first and the only script step precedes nothing.
        let sink =
            CompositeContext::nested(vec![Context::ScriptLiteral, Context::HtmlAttribute]).unwrap();
        let steps = vec![
            step(1, vec![Context::HtmlAttribute], Strength::Whitelist),
            step(2, vec![Context::ScriptLiteral], Strength::Whitelist),
        ];
        assert_eq!(
            EffectivenessModel::evaluate(&sink, &steps, false),
            Classification::Insufficient
        );
    }

    #[test]
    fn test_missing_layer_insufficient() {
        let sink =
            CompositeContext::nested(vec![Context::ScriptLiteral, Context::HtmlBody]).unwrap();
        let steps = vec![step(1, vec![Context::HtmlBody], Strength::Whitelist)];
        assert_eq!(
            EffectivenessModel::evaluate(&sink, &steps, false),
            Classification::Insufficient
        );
    }

    #[test]
    fn test_canonicalize_before_validate_required() {
        let sink = CompositeContext::single(Context::FilesystemPath);

        // Whitelist validation alone: encoded traversal sequences survive.
        let validate_only = vec![step(1, vec![Context::FilesystemPath], Strength::Whitelist)];
        assert_eq!(
            EffectivenessModel::evaluate(&sink, &validate_only, false),
            Classification::Insufficient
        );

        // Canonicalize, then validate.
        let canonical_first = vec![
            step(1, vec![Context::FilesystemPath], Strength::Canonicalization),
            step(2, vec![Context::FilesystemPath], Strength::Whitelist),
        ];
        assert_eq!(
            EffectivenessModel::evaluate(&sink, &canonical_first, false),
            Classification::Sufficient
        );

        // Validate, then canonicalize: ordering itself is the bug.
        let validate_first = vec![
            step(1, vec![Context::FilesystemPath], Strength::Whitelist),
            step(2, vec![Context::FilesystemPath], Strength::Canonicalization),
        ];
        assert_eq!(
            EffectivenessModel::evaluate(&sink, &validate_first, false),
            Classification::Insufficient
        );
    }

    #[test]
    fn test_no_steps_classification_boundary() {
        let sink = CompositeContext::single(Context::HtmlBody);
        assert_eq!(
            EffectivenessModel::evaluate(&sink, &[], false),
            Classification::Insufficient
        );
        assert_eq!(
            EffectivenessModel::evaluate(&sink, &[], true),
            Classification::Unknown
        );

        // An irrelevant step is no evidence either.
        let unrelated = vec![step(1, vec![Context::CssValue], Strength::Whitelist)];
        assert_eq!(
            EffectivenessModel::evaluate(&sink, &unrelated, true),
            Classification::Unknown
        );
    }
}
