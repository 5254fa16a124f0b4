//! Rule (OTN) and detection-option data model — spec.md §3.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Protocol a rule is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtoId {
    Ip,
    Icmp,
    Tcp,
    Udp,
}

pub const PROTO_COUNT: usize = 4;

impl ProtoId {
    pub fn index(self) -> usize {
        match self {
            ProtoId::Ip => 0,
            ProtoId::Icmp => 1,
            ProtoId::Tcp => 2,
            ProtoId::Udp => 3,
        }
    }
}

/// Which side of a connection a rule's service binding applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    ToServer,
    ToClient,
}

/// Globally unique rule identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId {
    pub gid: u32,
    pub sid: u32,
    pub rev: u32,
}

/// Pattern-match category a content option belongs to. `PM_TYPE_MAX` is the
/// number of variants and sizes the `mpsegrp` arrays in `PortGroup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum PmType {
    Pkt = 0,
    Body = 1,
    Uri = 2,
    Header = 3,
    Key = 4,
}

pub const PM_TYPE_MAX: usize = 5;

impl PmType {
    pub const ALL: [PmType; PM_TYPE_MAX] =
        [PmType::Pkt, PmType::Body, PmType::Uri, PmType::Header, PmType::Key];
}

/// Stable identity for a detection option. Assigned once at rule-construction
/// time by whatever builds the `Rule` (the parser, or test fixtures here);
/// the compiler compares these ids, never pointers, to decide whether two
/// options are "the same" for prefix sharing. See DESIGN.md open question
/// on pointer-equality in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionId(u64);

static NEXT_OPTION_ID: AtomicU64 = AtomicU64::new(1);

impl OptionId {
    /// Mint a fresh, process-unique option id. Used by rule-construction
    /// helpers (tests, fixture loaders) standing in for the out-of-scope
    /// rule parser.
    pub fn fresh() -> Self {
        OptionId(NEXT_OPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The content-option payload (PMD).
#[derive(Debug, Clone)]
pub struct PatternMatchData {
    pub pattern_buf: Vec<u8>,
    pub pattern_size: usize,
    pub fp_offset: usize,
    pub fp_length: usize,
    pub pm_type: PmType,
    pub mpse_flags: u32,
    pub is_fast_pattern: bool,
    pub is_negated: bool,
    pub is_no_case: bool,
    pub is_literal: bool,
}

impl PatternMatchData {
    pub fn new(pattern_buf: Vec<u8>, pm_type: PmType) -> Self {
        let pattern_size = pattern_buf.len();
        PatternMatchData {
            pattern_buf,
            pattern_size,
            fp_offset: 0,
            fp_length: 0,
            pm_type,
            mpse_flags: 0,
            is_fast_pattern: false,
            is_negated: false,
            is_no_case: false,
            is_literal: true,
        }
    }
}

/// The tag distinguishing what an option node represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleOptionKind {
    Content,
    PcreRegex,
    ByteTest,
    Flowbits,
    LeafNode,
    Other(&'static str),
}

/// The packet-path callback a detection option would invoke at match time.
/// The compiler never calls this — it only threads the handle through the
/// tree so the (out-of-scope) runtime interpreter can invoke it later.
pub trait OptionEval: std::fmt::Debug {
    fn name(&self) -> &str;
}

/// One node in a rule's ordered option list.
#[derive(Debug, Clone)]
pub struct DetectionOption {
    pub id: OptionId,
    pub kind: RuleOptionKind,
    pub is_relative: bool,
    /// Present only for `RuleOptionKind::Content` options.
    pub pmd: Option<Rc<PatternMatchData>>,
    pub eval: Option<Rc<dyn OptionEval>>,
}

impl DetectionOption {
    pub fn content(pmd: PatternMatchData, is_relative: bool) -> Self {
        DetectionOption {
            id: OptionId::fresh(),
            kind: RuleOptionKind::Content,
            is_relative,
            pmd: Some(Rc::new(pmd)),
            eval: None,
        }
    }

    pub fn other(kind: RuleOptionKind, is_relative: bool) -> Self {
        DetectionOption { id: OptionId::fresh(), kind, is_relative, pmd: None, eval: None }
    }

    pub fn with_eval(mut self, eval: Rc<dyn OptionEval>) -> Self {
        self.eval = Some(eval);
        self
    }

    pub fn is_fast_pattern_only(&self) -> bool {
        self.pmd.as_ref().is_some_and(|p| p.is_fast_pattern)
    }
}

/// Mutable compile-time bookkeeping the builder updates as it processes a
/// rule. Kept behind a `RefCell` because a rule can be reachable from
/// several `PortGroup`/service-group builds at once (shared via `Rc`).
#[derive(Debug, Default)]
pub struct CompileMeta {
    pub longest_pattern_len: usize,
    pub normal_fp_only: Option<OptionId>,
    pub offload_fp_only: Option<OptionId>,
    pub warned_fp: bool,
}

/// An immutable rule (OTN) plus the interior-mutable compile metadata the
/// builder accumulates on it.
#[derive(Debug)]
pub struct Rule {
    pub id: RuleId,
    pub proto: ProtoId,
    pub builtin: bool,
    pub enabled: bool,
    pub service: Option<String>,
    pub direction: Direction,
    pub options: Vec<DetectionOption>,
    pub meta: RefCell<CompileMeta>,
}

impl Rule {
    pub fn new(
        id: RuleId,
        proto: ProtoId,
        direction: Direction,
        options: Vec<DetectionOption>,
    ) -> Self {
        Rule {
            id,
            proto,
            builtin: false,
            enabled: true,
            service: None,
            direction,
            options,
            meta: RefCell::new(CompileMeta::default()),
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn content_options(&self) -> impl Iterator<Item = (&DetectionOption, &Rc<PatternMatchData>)> {
        self.options.iter().filter_map(|o| o.pmd.as_ref().map(|pmd| (o, pmd)))
    }
}

/// Cookie attached to each pattern inserted into an MPSE.
#[derive(Debug, Clone)]
pub struct Pmx {
    pub rule: Rc<Rule>,
    pub pmd: Rc<PatternMatchData>,
}
