//! Consumed rule database.
//!
//! Pure configuration data, versioned independently of the engine: which
//! API identifiers are sources (and with which origin kind), which are
//! sinks (and in which context), and which are sanitizers (for which
//! contexts, at which strength). Read-only for the whole run.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::domain::context::{Context, Strength};
use crate::domain::label::OriginKind;

/// Sink declaration: required neutralization context plus the argument
/// slots that must be checked (`None` = every argument).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkSpec {
    pub context: Context,
    pub arg_slots: Option<Vec<usize>>,
}

impl SinkSpec {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            arg_slots: None,
        }
    }

    pub fn with_args(context: Context, arg_slots: Vec<usize>) -> Self {
        Self {
            context,
            arg_slots: Some(arg_slots),
        }
    }
}

/// Sanitizer declaration: contexts the step is sound for and its strength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizerSpec {
    pub contexts: Vec<Context>,
    pub strength: Strength,
}

impl SanitizerSpec {
    pub fn new(contexts: Vec<Context>, strength: Strength) -> Self {
        Self { contexts, strength }
    }
}

/// Configuration warning surfaced by `validated()`, reported through scan
/// statistics rather than aborting the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleWarning {
    pub api: String,
    pub message: String,
}

/// The rule table: API identifier to role. An identifier may carry several
/// roles; conflicting ones are resolved fail-closed by `validated()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleDatabase {
    sources: FxHashMap<String, OriginKind>,
    sinks: FxHashMap<String, SinkSpec>,
    sanitizers: FxHashMap<String, SanitizerSpec>,
    /// Source classification of entry-function parameters, keyed by
    /// function name: (parameter index, origin kind).
    entry_sources: FxHashMap<String, Vec<(usize, OriginKind)>>,
}

impl RuleDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_source(&mut self, api: impl Into<String>, origin: OriginKind) {
        self.sources.insert(api.into(), origin);
    }

    pub fn declare_sink(&mut self, api: impl Into<String>, spec: SinkSpec) {
        self.sinks.insert(api.into(), spec);
    }

    pub fn declare_sanitizer(&mut self, api: impl Into<String>, spec: SanitizerSpec) {
        self.sanitizers.insert(api.into(), spec);
    }

    pub fn declare_entry_source(
        &mut self,
        function: impl Into<String>,
        param: usize,
        origin: OriginKind,
    ) {
        self.entry_sources
            .entry(function.into())
            .or_default()
            .push((param, origin));
    }

    pub fn source_origin(&self, api: &str) -> Option<OriginKind> {
        self.sources.get(api).copied()
    }

    pub fn sink_spec(&self, api: &str) -> Option<&SinkSpec> {
        self.sinks.get(api)
    }

    pub fn sanitizer_spec(&self, api: &str) -> Option<&SanitizerSpec> {
        self.sanitizers.get(api)
    }

    pub fn entry_sources(&self, function: &str) -> &[(usize, OriginKind)] {
        self.entry_sources
            .get(function)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Resolve configuration conflicts fail-closed without mutating the
    /// caller's table: an API declared both source and sanitizer loses its
    /// sanitizer role (deny by default), with a warning for the report.
    pub fn validated(&self) -> (RuleDatabase, Vec<RuleWarning>) {
        let mut clean = self.clone();
        let mut warnings = Vec::new();

        let mut conflicted: Vec<String> = self
            .sanitizers
            .keys()
            .filter(|api| self.sources.contains_key(*api))
            .cloned()
            .collect();
        conflicted.sort();

        for api in conflicted {
            tracing::warn!(api = %api, "rule conflict: source also declared sanitizer, sanitizer role suppressed");
            warnings.push(RuleWarning {
                message: format!(
                    "API '{}' declared both source and sanitizer; treating it as not a sanitizer",
                    api
                ),
                api: api.clone(),
            });
            clean.sanitizers.remove(&api);
        }

        (clean, warnings)
    }
}
