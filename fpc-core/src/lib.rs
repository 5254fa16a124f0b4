#![forbid(unsafe_code)]

pub mod build;
pub mod config;
pub mod dot;
pub mod error;
pub mod fastpattern;
pub mod hpack;
pub mod mpse;
pub mod portgroup;
pub mod rule;
pub mod rulemap;
pub mod servicegroup;

pub use build::{build, teardown, BuildReport, CompiledConfig, ProtoInput, RuleCorpus};
pub use config::{load_from_path, BuilderConfig, SearchApi};
pub use error::{CompileError, Result};
pub use rule::{
    CompileMeta, DetectionOption, Direction, OptionEval, OptionId, PatternMatchData, PmType, Pmx,
    ProtoId, Rule, RuleId, RuleOptionKind,
};
