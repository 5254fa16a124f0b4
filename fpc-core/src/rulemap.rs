//! Port-object iteration, per-protocol rule-map assembly, and the service
//! rule-map's protocol-ordinal index — spec.md §4.5 (any-port handling),
//! §4.7 (protocol-ordinal vector), §4.8.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::dot::DedupTable;
use crate::error::Result;
use crate::fastpattern::FastPatternConfig;
use crate::portgroup::{add_rule_to_port_group, compile_port_group, PortGroup, SlotFactory};
use crate::rule::{ProtoId, Rule, PROTO_COUNT};
use crate::servicegroup::{add_rule_to_service_group, compile_service_group_map, ServiceGroupMap};

/// A canonicalized set of ports shared by several rules, plus the rules
/// bound to it. Stands in for the source's `PortObject` — parsing and
/// canonicalization of port sets are out of scope; this crate consumes
/// already-built objects.
pub struct PortObject {
    pub ports: Vec<u16>,
    pub is_any: bool,
    pub rules: Vec<Rc<Rule>>,
}

/// One direction's collection of port objects for one protocol.
#[derive(Default)]
pub struct PortTable {
    pub objects: Vec<PortObject>,
}

const PORT_SPACE: usize = 65536;

/// Dense port → group arrays for one protocol, spec.md §3/§4.8.
pub struct PortRuleMap {
    pub prm_src: Vec<Option<Rc<RefCell<PortGroup>>>>,
    pub prm_dst: Vec<Option<Rc<RefCell<PortGroup>>>>,
    pub prm_generic: Option<Rc<RefCell<PortGroup>>>,
}

impl Default for PortRuleMap {
    fn default() -> Self {
        PortRuleMap {
            prm_src: (0..PORT_SPACE).map(|_| None).collect(),
            prm_dst: (0..PORT_SPACE).map(|_| None).collect(),
            prm_generic: None,
        }
    }
}

/// Build one `PortGroup` from a port object's rule list — spec.md §4.5
/// steps 2-5 (step 3's "delete empty mpsegrp entries" is satisfied for free
/// since slots are only created on first pattern insertion). Returns `None`
/// if the group ends up with zero rules.
fn build_group(
    rules: &[Rc<Rule>],
    is_service_group: bool,
    only_literal: bool,
    factory: &dyn SlotFactory,
    fp_cfg: &mut FastPatternConfig,
    table: &mut DedupTable,
) -> Result<Option<PortGroup>> {
    let mut group = PortGroup::default();
    for rule in rules.iter().filter(|r| !r.builtin && r.enabled) {
        add_rule_to_port_group(&mut group, rule, is_service_group, only_literal, factory, fp_cfg)?;
    }
    if group.rule_count == 0 {
        return Ok(None);
    }
    let expected = crate::portgroup::mpse_count(&group);
    let actual = compile_port_group(&mut group, table)?;
    if actual != expected {
        return Err(crate::error::CompileError::CompileCountMismatch { expected, actual });
    }
    Ok(Some(group))
}

/// Assemble one protocol's `PortRuleMap` from its directional port tables.
/// Any-port objects populate `prm_generic`; when `split_any_any` is false
/// they are additionally cloned into every directional slot (spec.md §4.5
/// "any-port rules").
#[allow(clippy::too_many_arguments)]
pub fn build_port_rule_map(
    src_table: &PortTable,
    dst_table: &PortTable,
    any_rules: &[Rc<Rule>],
    split_any_any: bool,
    only_literal: bool,
    factory: &dyn SlotFactory,
    fp_cfg: &mut FastPatternConfig,
    table: &mut DedupTable,
) -> Result<PortRuleMap> {
    let mut map = PortRuleMap::default();

    for object in &src_table.objects {
        if let Some(group) = build_group(&object.rules, false, only_literal, factory, fp_cfg, table)? {
            let shared = Rc::new(RefCell::new(group));
            for &port in &object.ports {
                map.prm_src[port as usize] = Some(shared.clone());
            }
        }
    }

    for object in &dst_table.objects {
        if let Some(group) = build_group(&object.rules, false, only_literal, factory, fp_cfg, table)? {
            let shared = Rc::new(RefCell::new(group));
            for &port in &object.ports {
                map.prm_dst[port as usize] = Some(shared.clone());
            }
        }
    }

    if let Some(group) = build_group(any_rules, false, only_literal, factory, fp_cfg, table)? {
        let shared = Rc::new(RefCell::new(group));
        map.prm_generic = Some(shared.clone());
        if !split_any_any {
            for slot in map.prm_src.iter_mut().chain(map.prm_dst.iter_mut()) {
                if slot.is_none() {
                    *slot = Some(shared.clone());
                }
            }
        }
    }

    Ok(map)
}

/// Per-protocol `PortRuleMap` table, spec.md §4.8's top-level loop.
#[derive(Default)]
pub struct ProtocolRuleMaps {
    pub by_proto: [Option<PortRuleMap>; PROTO_COUNT],
}

impl ProtocolRuleMaps {
    pub fn get(&self, proto: ProtoId) -> Option<&PortRuleMap> {
        self.by_proto[proto.index()].as_ref()
    }
}

/// Service rule map plus the protocol-ordinal-indexed index spec.md §4.7
/// calls for: which service names carry rules for a given protocol, so a
/// packet's `(proto, service)` pair resolves its service group in O(1)
/// without scanning every entry in `groups`.
pub struct ServicePortGroupMap {
    pub groups: ServiceGroupMap,
    pub services_by_proto_ordinal: HashMap<usize, Vec<String>>,
}

impl ServicePortGroupMap {
    pub fn build(
        rules: &[Rc<Rule>],
        only_literal: bool,
        factory: &dyn SlotFactory,
        fp_cfg: &mut FastPatternConfig,
        table: &mut DedupTable,
    ) -> Result<Self> {
        let mut groups = ServiceGroupMap::default();
        let mut services_by_proto_ordinal: HashMap<usize, Vec<String>> = HashMap::new();

        for rule in rules.iter().filter(|r| !r.builtin && r.enabled && r.service.is_some()) {
            add_rule_to_service_group(&mut groups, rule, only_literal, factory, fp_cfg)?;
            let service = rule.service.as_ref().expect("filtered above");
            let bucket = services_by_proto_ordinal.entry(rule.proto.index()).or_default();
            if !bucket.iter().any(|s| s == service) {
                bucket.push(service.clone());
            }
        }
        compile_service_group_map(&mut groups, table)?;

        Ok(ServicePortGroupMap { groups, services_by_proto_ordinal })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpse::testing::MockApi;
    use crate::mpse::{Mpse, MpseAgent, MpseApi, MpseType};
    use crate::rule::{DetectionOption, Direction, PatternMatchData, PmType, RuleId};

    struct TestFactory {
        normal: MockApi,
    }

    impl SlotFactory for TestFactory {
        fn create_normal(&self, pm_type: PmType) -> Result<Box<dyn Mpse>> {
            self.normal
                .create(Rc::new(MpseAgent::new(MpseType::Normal)))
                .map_err(|reason| crate::error::CompileError::MpseCreate { pm_type, reason })
        }
        fn create_offload(&self, _pm_type: PmType) -> Result<Option<Box<dyn Mpse>>> {
            Ok(None)
        }
    }

    fn content_rule(sid: u32) -> Rc<Rule> {
        let opt = DetectionOption::content(PatternMatchData::new(b"hi".to_vec(), PmType::Pkt), false);
        Rc::new(Rule::new(RuleId { gid: 1, sid, rev: 1 }, ProtoId::Tcp, Direction::ToServer, vec![opt]))
    }

    #[test]
    fn port_object_populates_every_contained_port() {
        let factory = TestFactory { normal: MockApi { regex_capable: false, parallel: false } };
        let mut fp_cfg = FastPatternConfig::default();
        let mut table = DedupTable::default();

        let dst_table = PortTable {
            objects: vec![PortObject { ports: vec![80, 8080], is_any: false, rules: vec![content_rule(1)] }],
        };
        let src_table = PortTable::default();

        let map = build_port_rule_map(
            &src_table, &dst_table, &[], true, false, &factory, &mut fp_cfg, &mut table,
        )
        .unwrap();

        assert!(map.prm_dst[80].is_some());
        assert!(map.prm_dst[8080].is_some());
        assert!(Rc::ptr_eq(map.prm_dst[80].as_ref().unwrap(), map.prm_dst[8080].as_ref().unwrap()));
        assert!(map.prm_dst[81].is_none());
    }

    #[test]
    fn any_port_group_fills_unclaimed_slots_unless_split() {
        let factory = TestFactory { normal: MockApi { regex_capable: false, parallel: false } };
        let mut fp_cfg = FastPatternConfig::default();
        let mut table = DedupTable::default();

        let src_table = PortTable::default();
        let dst_table = PortTable::default();
        let any_rules = vec![content_rule(9)];

        let map = build_port_rule_map(
            &src_table, &dst_table, &any_rules, false, false, &factory, &mut fp_cfg, &mut table,
        )
        .unwrap();

        assert!(map.prm_generic.is_some());
        assert!(map.prm_dst[1234].is_some());
        assert!(map.prm_src[1234].is_some());
    }
}
