//! Analysis machinery: propagation, summary resolution, classification,
//! effectiveness verification, scoring and report assembly.

pub mod classifier;
pub mod emitter;
pub mod interprocedural;
pub mod intraprocedural;
pub mod sanitizer;
pub mod scoring;

pub use classifier::SinkClassifier;
pub use emitter::{FindingEmitter, FindingReport};
pub use interprocedural::{CancelToken, ResolvedProgram, SummaryResolver};
pub use intraprocedural::{analyze_function, FunctionAnalysis, IntraContext, Slot, ValueState};
pub use sanitizer::EffectivenessModel;
pub use scoring::ConfidenceScorer;
