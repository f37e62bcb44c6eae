//! Sink and composite-context classification.
//!
//! Maps call nodes to `SinkSite`s using the rule database. The required
//! context stacks the syntactic constructs the front end recorded around
//! the argument position (innermost-first) on top of the API's declared
//! base context, so a value written into an event-handler string inside an
//! HTML attribute must be neutralized for the script literal first, the
//! attribute second, and the document body last.

use crate::domain::context::CompositeContext;
use crate::domain::finding::SinkSite;
use crate::ports::ir::{FlowNode, FlowOp, FunctionId, ProgramIr};
use crate::ports::rules::RuleDatabase;

pub struct SinkClassifier<'a> {
    rules: &'a RuleDatabase,
}

impl<'a> SinkClassifier<'a> {
    pub fn new(rules: &'a RuleDatabase) -> Self {
        Self { rules }
    }

    /// Classify one node. Non-calls, calls without a known API identifier
    /// and calls whose API is not a declared sink yield `None`.
    pub fn classify(&self, function: FunctionId, node: &FlowNode) -> Option<SinkSite> {
        let FlowOp::Call {
            api,
            args,
            enclosing,
            ..
        } = &node.op
        else {
            return None;
        };
        let spec = self.rules.sink_spec(api.as_deref()?)?;

        let mut layers = enclosing.clone();
        layers.push(spec.context);
        let context = CompositeContext::nested(layers)?;

        let arg_slots = spec
            .arg_slots
            .clone()
            .unwrap_or_else(|| (0..args.len()).collect());

        Some(SinkSite {
            node: node.id,
            function,
            context,
            arg_slots,
        })
    }

    /// All sink sites of the program, in deterministic function/node order.
    pub fn collect(&self, program: &ProgramIr) -> Vec<SinkSite> {
        let mut sites = Vec::new();
        for function in program.functions() {
            for node in function.flow.nodes() {
                if let Some(site) = self.classify(function.id, node) {
                    sites.push(site);
                }
            }
        }
        sites
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::Context;
    use crate::ports::ir::{CallTarget, NodeId};
    use crate::ports::rules::SinkSpec;

    fn call_node(id: u32, api: &str, args: Vec<&str>, enclosing: Vec<Context>) -> FlowNode {
        FlowNode::new(
            NodeId(id),
            FlowOp::Call {
                target: CallTarget::Dynamic,
                api: Some(api.to_string()),
                args: args.into_iter().map(String::from).collect(),
                result: None,
                enclosing,
            },
        )
    }

    #[test]
    fn test_plain_sink() {
        let mut rules = RuleDatabase::new();
        rules.declare_sink("db.execute", SinkSpec::with_args(Context::RawCommandInterpreter, vec![0]));

        let classifier = SinkClassifier::new(&rules);
        let node = call_node(5, "db.execute", vec!["query", "timeout"], vec![]);
        let site = classifier.classify(FunctionId(0), &node).unwrap();

        assert_eq!(site.node, NodeId(5));
        assert_eq!(site.context.layers(), &[Context::RawCommandInterpreter]);
        assert_eq!(site.arg_slots, vec![0]);
    }

    #[test]
    fn test_enclosing_constructs_stack_innermost_first() {
        let mut rules = RuleDatabase::new();
        rules.declare_sink("response.write", SinkSpec::new(Context::HtmlBody));

        let classifier = SinkClassifier::new(&rules);
        let node = call_node(
            7,
            "response.write",
            vec!["markup"],
            vec![Context::ScriptLiteral, Context::HtmlAttribute],
        );
        let site = classifier.classify(FunctionId(1), &node).unwrap();

        assert_eq!(
            site.context.layers(),
            &[Context::ScriptLiteral, Context::HtmlAttribute, Context::HtmlBody]
        );
        assert_eq!(site.context.innermost(), Context::ScriptLiteral);
        // Unconstrained sink checks every argument.
        assert_eq!(site.arg_slots, vec![0]);
    }

    #[test]
    fn test_non_sink_calls_skipped() {
        let mut rules = RuleDatabase::new();
        rules.declare_sink("db.execute", SinkSpec::new(Context::RawCommandInterpreter));

        let classifier = SinkClassifier::new(&rules);
        let node = call_node(9, "string.trim", vec!["x"], vec![]);
        assert!(classifier.classify(FunctionId(0), &node).is_none());

        let anonymous = FlowNode::new(
            NodeId(10),
            FlowOp::Call {
                target: CallTarget::Dynamic,
                api: None,
                args: vec![],
                result: None,
                enclosing: vec![],
            },
        );
        assert!(classifier.classify(FunctionId(0), &anonymous).is_none());
    }
}
