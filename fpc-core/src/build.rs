//! Top-level build/teardown orchestration — spec.md §5/§6/§7.

use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::config::BuilderConfig;
use crate::dot::DedupTable;
use crate::error::Result;
use crate::fastpattern::FastPatternConfig;
use crate::mpse::SlotFactory;
use crate::portgroup::mpse_count;
use crate::rule::{ProtoId, Rule, PROTO_COUNT};
use crate::rulemap::{build_port_rule_map, PortObject, PortTable, ProtocolRuleMaps, ServicePortGroupMap};

/// One protocol's raw inputs to the rule-map assembly: the already-built
/// port objects for each direction, plus the rules bound to any port.
pub struct ProtoInput {
    pub proto: ProtoId,
    pub to_dst: PortTable,
    pub to_src: PortTable,
    pub any_rules: Vec<Rc<Rule>>,
}

impl ProtoInput {
    pub fn empty(proto: ProtoId) -> Self {
        ProtoInput {
            proto,
            to_dst: PortTable::default(),
            to_src: PortTable::default(),
            any_rules: Vec::new(),
        }
    }
}

/// The rule corpus already partitioned the way this crate's external
/// interfaces expect it (spec.md §6): port objects per protocol/direction,
/// plus the flat list of service-bound rules service-group building
/// consumes directly.
pub struct RuleCorpus {
    pub by_proto: Vec<ProtoInput>,
    pub service_rules: Vec<Rc<Rule>>,
}

/// Supplements the bare counts spec.md §6 calls for ("returns the counts
/// for logging") with a small summary struct, standing in for a full
/// metrics pipeline (see SPEC_FULL.md §11 — original_source/ had nothing to
/// recover here, so this is this crate's own addition).
#[derive(Debug, Default, Clone)]
pub struct BuildReport {
    pub rule_count_by_proto: [usize; PROTO_COUNT],
    pub service_rule_count_to_server: usize,
    pub service_rule_count_to_client: usize,
    pub fast_pattern_port_groups: usize,
    pub fast_pattern_service_groups: usize,
    pub truncated_patterns: usize,
}

/// A compiled configuration snapshot: the structures spec.md §6 says
/// `build()` must populate.
pub struct CompiledConfig {
    pub port_rule_maps: ProtocolRuleMaps,
    pub service_groups: ServicePortGroupMap,
    pub dedup_table: DedupTable,
    pub report: BuildReport,
}

/// Compile `corpus` into `CompiledConfig` per spec.md §4.5-§4.8, honoring
/// the error model in §7.
///
/// Parallel MPSE compilation (§5 permission 1) is not implemented as literal
/// OS-thread fan-out: every shared compile-time structure here (`Rc<Rule>`,
/// the DOT's `Rc<RefCell<DotNode>>` chains, the per-build `DedupTable`) is
/// `!Send` by design, since rules and tree nodes are reference-counted
/// across multiple groups within one single-threaded build. Honoring the
/// permission literally would require `Arc`/`Mutex` throughout the hot
/// compile path for a concurrency window that only ever matters once per
/// configuration reload. Builds therefore always run on the calling thread;
/// the `CompileCountMismatch` check is still performed, verifying the
/// sequential compile visited exactly as many MPSE slots as were created.
pub fn build(config: &BuilderConfig, corpus: &RuleCorpus, factory: &dyn SlotFactory) -> Result<CompiledConfig> {
    let mut fp_cfg = FastPatternConfig { max_pattern_len: config.max_pattern_len, num_patterns_truncated: 0 };
    let mut dedup_table = DedupTable::default();
    let only_literal = config.only_literal();

    let mut report = BuildReport::default();
    let mut by_proto: [Option<crate::rulemap::PortRuleMap>; PROTO_COUNT] = Default::default();

    for input in &corpus.by_proto {
        report.rule_count_by_proto[input.proto.index()] = input.to_dst.objects.iter().map(|o| o.rules.len()).sum::<usize>()
            + input.to_src.objects.iter().map(|o| o.rules.len()).sum::<usize>()
            + input.any_rules.len();

        let map = build_port_rule_map(
            &input.to_src,
            &input.to_dst,
            &input.any_rules,
            config.split_any_any,
            only_literal,
            factory,
            &mut fp_cfg,
            &mut dedup_table,
        )?;

        // build_port_rule_map has already verified, per group, that the
        // number of MPSE slots compiled equals the number created
        // (CompileCountMismatch is raised there); this just aggregates the
        // count for the report.
        report.fast_pattern_port_groups += count_compiled_slots(&map);
        by_proto[input.proto.index()] = Some(map);

        if config.debug_mode {
            debug!(proto = ?input.proto, rules = report.rule_count_by_proto[input.proto.index()], "compiled port rule map");
        }
    }

    let service_groups =
        ServicePortGroupMap::build(&corpus.service_rules, only_literal, factory, &mut fp_cfg, &mut dedup_table)?;

    report.service_rule_count_to_server =
        service_groups.groups.to_server.values().map(|g| g.rule_count).sum();
    report.service_rule_count_to_client =
        service_groups.groups.to_client.values().map(|g| g.rule_count).sum();
    report.fast_pattern_service_groups =
        service_groups.groups.to_server.len() + service_groups.groups.to_client.len();
    report.truncated_patterns = fp_cfg.num_patterns_truncated;

    info!(
        truncated_patterns = report.truncated_patterns,
        port_groups = report.fast_pattern_port_groups,
        service_groups = report.fast_pattern_service_groups,
        "build complete"
    );
    if report.truncated_patterns > 0 {
        warn!(count = report.truncated_patterns, "some fast patterns were truncated to max_pattern_len");
    }

    Ok(CompiledConfig { port_rule_maps: ProtocolRuleMaps { by_proto }, service_groups, dedup_table, report })
}

/// Releases a compiled configuration. `DedupTable`/`ProtocolRuleMaps` drop
/// their `Rc`s in the usual order on scope exit; this exists to give
/// teardown an explicit, loggable call site matching spec.md §6.
pub fn teardown(compiled: CompiledConfig) {
    info!(rule_groups = compiled.report.fast_pattern_port_groups, "tearing down configuration");
    drop(compiled);
}

fn count_compiled_slots(map: &crate::rulemap::PortRuleMap) -> usize {
    let mut seen = std::collections::HashSet::new();
    let mut total = 0;
    for slot in map.prm_src.iter().chain(map.prm_dst.iter()).chain(std::iter::once(&map.prm_generic)) {
        if let Some(group) = slot {
            let ptr = Rc::as_ptr(group) as usize;
            if seen.insert(ptr) {
                total += mpse_count(&group.borrow());
            }
        }
    }
    total
}
