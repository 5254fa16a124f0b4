//! JSON rule-corpus loader for the demo CLI. Rule parsing itself is out of
//! scope for `fpc-core` (spec.md §1: "the core consumes already-parsed
//! rules") — this is a standalone fixture format for exercising the
//! compiler from the command line, not a rule-syntax implementation.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use fpc_core::{
    CompileError, DetectionOption, Direction, PatternMatchData, PmType, ProtoId, Result, Rule, RuleId,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ContentSpec {
    pub bytes: String,
    #[serde(default)]
    pub pm_type: PmTypeSpec,
    #[serde(default)]
    pub fast_pattern: bool,
    #[serde(default)]
    pub negated: bool,
    #[serde(default)]
    pub no_case: bool,
    #[serde(default)]
    pub is_relative: bool,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PmTypeSpec {
    #[default]
    Pkt,
    Body,
    Uri,
    Header,
    Key,
}

impl From<PmTypeSpec> for PmType {
    fn from(v: PmTypeSpec) -> Self {
        match v {
            PmTypeSpec::Pkt => PmType::Pkt,
            PmTypeSpec::Body => PmType::Body,
            PmTypeSpec::Uri => PmType::Uri,
            PmTypeSpec::Header => PmType::Header,
            PmTypeSpec::Key => PmType::Key,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProtoSpec {
    Ip,
    Icmp,
    #[default]
    Tcp,
    Udp,
}

impl From<ProtoSpec> for ProtoId {
    fn from(v: ProtoSpec) -> Self {
        match v {
            ProtoSpec::Ip => ProtoId::Ip,
            ProtoSpec::Icmp => ProtoId::Icmp,
            ProtoSpec::Tcp => ProtoId::Tcp,
            ProtoSpec::Udp => ProtoId::Udp,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum DirectionSpec {
    #[default]
    ToServer,
    ToClient,
}

impl From<DirectionSpec> for Direction {
    fn from(v: DirectionSpec) -> Self {
        match v {
            DirectionSpec::ToServer => Direction::ToServer,
            DirectionSpec::ToClient => Direction::ToClient,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct PortsSpec {
    #[serde(default)]
    pub dst: Vec<u16>,
    #[serde(default)]
    pub src: Vec<u16>,
    #[serde(default)]
    pub any: bool,
}

#[derive(Debug, Deserialize)]
pub struct RuleSpec {
    pub gid: u32,
    pub sid: u32,
    #[serde(default = "default_rev")]
    pub rev: u32,
    #[serde(default)]
    pub proto: ProtoSpec,
    #[serde(default)]
    pub direction: DirectionSpec,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub ports: PortsSpec,
    #[serde(default)]
    pub contents: Vec<ContentSpec>,
}

fn default_rev() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct CorpusSpec {
    pub rules: Vec<RuleSpec>,
}

pub struct LoadedRule {
    pub rule: Rc<Rule>,
    pub ports: PortsSpec,
}

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Vec<LoadedRule>> {
    let txt = fs::read_to_string(p).map_err(CompileError::Io)?;
    let corpus: CorpusSpec =
        serde_json::from_str(&txt).map_err(|e| CompileError::Config(format!("invalid rule corpus: {e}")))?;

    Ok(corpus.rules.into_iter().map(build_rule).collect())
}

fn build_rule(spec: RuleSpec) -> LoadedRule {
    let options = spec
        .contents
        .iter()
        .map(|c| {
            let mut pmd = PatternMatchData::new(c.bytes.clone().into_bytes(), c.pm_type.into());
            pmd.is_fast_pattern = c.fast_pattern;
            pmd.is_negated = c.negated;
            pmd.is_no_case = c.no_case;
            DetectionOption::content(pmd, c.is_relative)
        })
        .collect();

    let id = RuleId { gid: spec.gid, sid: spec.sid, rev: spec.rev };
    let mut rule = Rule::new(id, spec.proto.into(), spec.direction.into(), options);
    if let Some(service) = spec.service {
        rule = rule.with_service(service);
    }

    LoadedRule { rule: Rc::new(rule), ports: spec.ports }
}
