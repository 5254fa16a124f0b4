//! Port-group construction and per-rule insertion — spec.md §4.5/§4.6.

use std::rc::Rc;

use tracing::{debug, warn};

use crate::dot::{finalize_root, DedupTable, DotRoot};
use crate::error::Result;
use crate::fastpattern::{final_pattern, select_fast_pattern, FastPatternConfig};
use crate::mpse::{Mpse, MpseAgent, MpseType, PatternDescriptor};
use crate::rule::{PatternMatchData, PmType, Pmx, Rule, PM_TYPE_MAX};

/// One `(pm_type, mpse_type)` slot: the live MPSE plus the agent it folds
/// matches into, and the finalized tree once `compile` has run.
pub struct MpseSlot {
    pub mpse: Box<dyn Mpse>,
    pub agent: Rc<MpseAgent>,
    pub tree: Option<DotRoot>,
}

/// A rules-without-fast-pattern fallback: every such rule's residual option
/// sequence is inserted directly, evaluated unconditionally on every packet
/// that reaches this group.
#[derive(Default)]
pub struct NoFastPatternTree {
    pub root: Option<DotRoot>,
}

/// A port or "any-any" group for one `(proto, direction)` pair. Mirrors the
/// source's `PORT_GROUP`: one `mpsegrp` slot per `PmType`, plus the no-fast-
/// pattern fallback tree.
pub struct PortGroup {
    pub mpsegrp: [Option<MpseSlot>; PM_TYPE_MAX],
    pub offload_mpsegrp: [Option<MpseSlot>; PM_TYPE_MAX],
    pub nfp_tree: NoFastPatternTree,
    pub rule_count: usize,
}

impl Default for PortGroup {
    fn default() -> Self {
        PortGroup {
            mpsegrp: Default::default(),
            offload_mpsegrp: Default::default(),
            nfp_tree: NoFastPatternTree::default(),
            rule_count: 0,
        }
    }
}

/// Everything the per-rule adder needs to create an MPSE on first use of a
/// `(pm_type, mpse_type)` slot, without the group needing to know about API
/// objects itself.
///
/// Both methods are fallible — spec.md §7's "MPSE creation failure" error —
/// `create_offload` additionally uses `Ok(None)` for "no offload MPSE is
/// configured", which is not a failure.
pub trait SlotFactory {
    fn create_normal(&self, pm_type: PmType) -> Result<Box<dyn Mpse>>;
    fn create_offload(&self, pm_type: PmType) -> Result<Option<Box<dyn Mpse>>>;
}

fn slot_or_init<'a>(
    slots: &'a mut [Option<MpseSlot>; PM_TYPE_MAX],
    pm_type: PmType,
    mpse_type: MpseType,
    factory: &dyn SlotFactory,
) -> Result<Option<&'a mut MpseSlot>> {
    let idx = pm_type as usize;
    if slots[idx].is_none() {
        let mpse = match mpse_type {
            MpseType::Normal => Some(factory.create_normal(pm_type)?),
            MpseType::Offload => factory.create_offload(pm_type)?,
        };
        let Some(mpse) = mpse else { return Ok(None) };
        slots[idx] = Some(MpseSlot { mpse, agent: Rc::new(MpseAgent::new(mpse_type)), tree: None });
    }
    Ok(slots[idx].as_mut())
}

/// Insert one pattern into whichever of `group`'s normal/offload slots are
/// configured for `pmd.pm_type`. `is_chosen` marks the winning fast pattern
/// (the one recorded on `CompileMeta` so the DOT builder excludes it from
/// residual evaluation); alternates are inserted the same way but are not
/// recorded, since hitting one only gives the MPSE an extra entry point into
/// the rule — it does not stand in for evaluating that option's own content
/// check.
fn insert_pattern(
    group: &mut PortGroup,
    rule: &Rc<Rule>,
    pmd: &Rc<PatternMatchData>,
    bytes: &[u8],
    is_chosen: bool,
    factory: &dyn SlotFactory,
) -> Result<()> {
    let pm_type = pmd.pm_type;
    let descriptor =
        PatternDescriptor { no_case: pmd.is_no_case, negated: pmd.is_negated, flags: pmd.mpse_flags };
    let pmx = Pmx { rule: rule.clone(), pmd: pmd.clone() };

    if let Some(slot) = slot_or_init(&mut group.mpsegrp, pm_type, MpseType::Normal, factory)? {
        slot.mpse.add_pattern(bytes, descriptor, pmx.clone());
        if is_chosen && !pmd.is_negated {
            record_fp_only(rule, &pmx, MpseType::Normal);
        }
    }
    if let Some(slot) = slot_or_init(&mut group.offload_mpsegrp, pm_type, MpseType::Offload, factory)? {
        slot.mpse.add_pattern(bytes, descriptor, pmx.clone());
        if is_chosen && !pmd.is_negated {
            record_fp_only(rule, &pmx, MpseType::Offload);
        }
    }
    Ok(())
}

/// Add one rule to `group` — spec.md §4.6. Picks the fast pattern for each
/// applicable `pm_type` via `select_fast_pattern`, records its transformed
/// bytes into the matching MPSE slot, remembers the winning option id on the
/// rule's `CompileMeta` so the DOT builder can exclude it later, and falls
/// back to `nfp_tree` when no content option in this rule qualifies at all.
///
/// Every non-chosen element `select_fast_pattern` returned (the alternates,
/// spec.md §4.1/§4.6 step 5) is also inserted into the same MPSE slot(s) as
/// additional entry points to this rule, verbatim — unlike the chosen
/// pattern, an alternate is not run through `final_pattern`, since it is not
/// being truncated or offset-sliced for fast-pattern purposes, just indexed.
///
/// A negated fast pattern (spec.md §8 scenario 3) is the exception: an MPSE
/// hit on a negated content's bytes does not establish the rule matched (the
/// rule matches when those bytes are *absent*), so the pattern is inserted
/// into the MPSE as an index hint only, never marked fast-pattern-only, and
/// the rule is unconditionally added to `nfp_tree` as well.
pub fn add_rule_to_port_group(
    group: &mut PortGroup,
    rule: &Rc<Rule>,
    is_service_group: bool,
    only_literal: bool,
    factory: &dyn SlotFactory,
    fp_cfg: &mut FastPatternConfig,
) -> Result<()> {
    group.rule_count += 1;

    let selection = select_fast_pattern(rule, is_service_group, only_literal);
    if selection.exclude {
        warn!(rule = ?rule.id, "rule has no usable fast pattern, added to no-fast-pattern list");
        crate::dot::insert_rule(&mut group.nfp_tree.root, rule, MpseType::Normal);
        return Ok(());
    }

    let Some((chosen, alternates)) = selection.patterns.split_last() else {
        warn!(rule = ?rule.id, "rule has no usable fast pattern, added to no-fast-pattern list");
        crate::dot::insert_rule(&mut group.nfp_tree.root, rule, MpseType::Normal);
        return Ok(());
    };

    {
        let mut meta = rule.meta.borrow_mut();
        meta.longest_pattern_len = meta.longest_pattern_len.max(chosen.pattern_size);
    }

    let bytes = final_pattern(chosen, fp_cfg);
    debug!(
        rule = ?rule.id,
        pm_type = ?chosen.pm_type,
        pattern_len = bytes.len(),
        alternates = alternates.len(),
        "FP selected fast pattern for rule"
    );
    insert_pattern(group, rule, chosen, &bytes, true, factory)?;

    for alt in alternates {
        insert_pattern(group, rule, alt, &alt.pattern_buf, false, factory)?;
    }

    if chosen.is_negated {
        crate::dot::insert_rule(&mut group.nfp_tree.root, rule, MpseType::Normal);
    }
    Ok(())
}

fn record_fp_only(rule: &Rc<Rule>, pmx: &Pmx, mpse_type: MpseType) {
    let opt_id = rule
        .options
        .iter()
        .find(|o| o.pmd.as_ref().map(Rc::as_ptr) == Some(Rc::as_ptr(&pmx.pmd)))
        .map(|o| o.id);
    let Some(opt_id) = opt_id else { return };
    let mut meta = rule.meta.borrow_mut();
    match mpse_type {
        MpseType::Normal => meta.normal_fp_only = Some(opt_id),
        MpseType::Offload => meta.offload_fp_only = Some(opt_id),
    }
}

/// Number of live MPSE slots (normal + offload) this group carries —
/// spec.md §5's `mpse_count + offload_mpse_count` the compile-count check
/// is measured against.
pub fn mpse_count(group: &PortGroup) -> usize {
    group.mpsegrp.iter().chain(group.offload_mpsegrp.iter()).filter(|s| s.is_some()).count()
}

/// Runs every populated slot's `compile`, draining its agent's accumulated
/// tree and hash-consing it against `table` — spec.md §4.4 applied per
/// group, §4.6's "offline compile" step. Returns the number of slots
/// actually compiled, for the caller's compile-count-mismatch check.
pub fn compile_port_group(group: &mut PortGroup, table: &mut DedupTable) -> Result<usize> {
    let mut compiled = 0;
    for slot in group.mpsegrp.iter_mut().chain(group.offload_mpsegrp.iter_mut()).flatten() {
        slot.mpse.compile(&slot.agent)?;
        compiled += 1;
        if let Some(mut tree) = slot.agent.take_tree() {
            finalize_root(&mut tree, table);
            slot.tree = Some(tree);
        }
    }
    if let Some(root) = group.nfp_tree.root.as_mut() {
        finalize_root(root, table);
    }
    Ok(compiled)
}
