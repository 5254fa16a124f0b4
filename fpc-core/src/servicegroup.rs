//! Service-group construction — spec.md §4.7. Structurally identical to a
//! `PortGroup` but keyed by service name rather than port number, and
//! eligible for the normalized `pm_type`s (`Body`/`Uri`/`Header`/`Key`)
//! `select_fast_pattern` reserves for service groups.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::dot::DedupTable;
use crate::error::Result;
use crate::fastpattern::FastPatternConfig;
use crate::portgroup::{add_rule_to_port_group, compile_port_group, PortGroup, SlotFactory};
use crate::rule::{Direction, Rule};

/// One `(service, direction)` bucket, mirroring the source's `to_srv`/
/// `to_cli` service group maps.
#[derive(Default)]
pub struct ServiceGroupMap {
    pub to_server: HashMap<String, PortGroup>,
    pub to_client: HashMap<String, PortGroup>,
}

impl ServiceGroupMap {
    pub fn group_for(&mut self, service: &str, direction: Direction) -> &mut PortGroup {
        let map = match direction {
            Direction::ToServer => &mut self.to_server,
            Direction::ToClient => &mut self.to_client,
        };
        map.entry(service.to_string()).or_default()
    }
}

/// Add `rule` to the service group named by `rule.service`, per spec.md
/// §4.7. Rules without a bound service never reach a `ServiceGroupMap`; the
/// caller is expected to have already routed them to a `PortGroup` instead.
pub fn add_rule_to_service_group(
    map: &mut ServiceGroupMap,
    rule: &Rc<Rule>,
    only_literal: bool,
    factory: &dyn SlotFactory,
    fp_cfg: &mut FastPatternConfig,
) -> Result<()> {
    let service = rule
        .service
        .clone()
        .ok_or_else(|| crate::error::CompileError::MissingServiceOrdinal { service: String::new() })?;

    debug!(rule = ?rule.id, service = %service, direction = ?rule.direction, "routing rule to service group");
    let group = map.group_for(&service, rule.direction);
    add_rule_to_port_group(group, rule, true, only_literal, factory, fp_cfg)?;
    Ok(())
}

/// Compile every group in the map — the service-group analogue of
/// `compile_port_group` run across the whole map.
pub fn compile_service_group_map(map: &mut ServiceGroupMap, table: &mut DedupTable) -> Result<()> {
    for group in map.to_server.values_mut().chain(map.to_client.values_mut()) {
        compile_port_group(group, table)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpse::testing::MockApi;
    use crate::mpse::{Mpse, MpseApi, MpseAgent, MpseType};
    use crate::rule::{DetectionOption, PatternMatchData, PmType, ProtoId, RuleId};

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

    #[test]
    fn rule_routes_to_group_named_by_its_service() {
        let factory = TestFactory { normal: MockApi { regex_capable: false, parallel: false } };
        let mut map = ServiceGroupMap::default();
        let mut fp_cfg = FastPatternConfig::default();

        let opt = DetectionOption::content(PatternMatchData::new(b"GET".to_vec(), PmType::Uri), false);
        let rule = Rc::new(
            Rule::new(RuleId { gid: 1, sid: 1, rev: 1 }, ProtoId::Tcp, Direction::ToServer, vec![opt])
                .with_service("http"),
        );

        add_rule_to_service_group(&mut map, &rule, false, &factory, &mut fp_cfg).unwrap();

        assert!(map.to_server.contains_key("http"));
        assert_eq!(map.to_server["http"].rule_count, 1);
    }

    #[test]
    fn rule_without_service_is_rejected() {
        let factory = TestFactory { normal: MockApi { regex_capable: false, parallel: false } };
        let mut map = ServiceGroupMap::default();
        let mut fp_cfg = FastPatternConfig::default();
        let rule = Rc::new(Rule::new(
            RuleId { gid: 1, sid: 1, rev: 1 },
            ProtoId::Tcp,
            Direction::ToServer,
            vec![],
        ));

        let err = add_rule_to_service_group(&mut map, &rule, false, &factory, &mut fp_cfg);
        assert!(err.is_err());
    }
}
