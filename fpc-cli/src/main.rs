#![forbid(unsafe_code)]

mod corpus;

use std::path::PathBuf;

use clap::Parser;
use fpc_core::build::{build, ProtoInput, RuleCorpus};
use fpc_core::config::load_from_path as load_builder_config;
use fpc_core::mpse::testing::MockApi;
use fpc_core::mpse::{Mpse, MpseAgent, MpseApi, MpseType};
use fpc_core::portgroup::SlotFactory;
use fpc_core::rule::{PmType, ProtoId, PROTO_COUNT};
use std::rc::Rc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fast-pattern detection compiler (demo CLI)")]
struct Cli {
    /// Path to the builder configuration TOML file.
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,
    /// Path to the JSON rule-corpus fixture.
    #[arg(short, long, value_name = "FILE")]
    rules: PathBuf,
}

/// Wires the demo CLI to the in-tree mock MPSE — the only `Mpse`
/// implementation this crate carries, since real search backends are out of
/// scope (spec.md §1).
struct MockFactory;

impl SlotFactory for MockFactory {
    fn create_normal(&self, pm_type: PmType) -> fpc_core::Result<Box<dyn Mpse>> {
        MockApi { regex_capable: false, parallel: false }
            .create(Rc::new(MpseAgent::new(MpseType::Normal)))
            .map_err(|reason| fpc_core::CompileError::MpseCreate { pm_type, reason })
    }
    fn create_offload(&self, _pm_type: PmType) -> fpc_core::Result<Option<Box<dyn Mpse>>> {
        Ok(None)
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();

    let config = match load_builder_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(%err, "failed to load builder configuration");
            std::process::exit(1);
        }
    };

    let loaded = match corpus::load_from_path(&cli.rules) {
        Ok(rules) => rules,
        Err(err) => {
            error!(%err, "failed to load rule corpus");
            std::process::exit(1);
        }
    };
    info!(rules = loaded.len(), "rule corpus loaded");

    let mut by_proto: Vec<ProtoInput> =
        (0..PROTO_COUNT).map(|i| ProtoInput::empty(proto_from_index(i))).collect();
    let mut service_rules = Vec::new();

    for loaded_rule in loaded {
        // A service-bound rule is routed to the service group map *and* to
        // its port group, if it also carries a port binding — spec.md §8
        // scenario 6 ("service vs port group").
        if loaded_rule.rule.service.is_some() {
            service_rules.push(loaded_rule.rule.clone());
        }
        let slot = &mut by_proto[loaded_rule.rule.proto.index()];
        if loaded_rule.ports.any || (loaded_rule.ports.dst.is_empty() && loaded_rule.ports.src.is_empty()) {
            slot.any_rules.push(loaded_rule.rule.clone());
        } else {
            if !loaded_rule.ports.dst.is_empty() {
                slot.to_dst.objects.push(fpc_core::rulemap::PortObject {
                    ports: loaded_rule.ports.dst.clone(),
                    is_any: false,
                    rules: vec![loaded_rule.rule.clone()],
                });
            }
            if !loaded_rule.ports.src.is_empty() {
                slot.to_src.objects.push(fpc_core::rulemap::PortObject {
                    ports: loaded_rule.ports.src.clone(),
                    is_any: false,
                    rules: vec![loaded_rule.rule.clone()],
                });
            }
        }
    }

    let corpus = RuleCorpus { by_proto, service_rules };
    let factory = MockFactory;

    match build(&config, &corpus, &factory) {
        Ok(compiled) => {
            let report = &compiled.report;
            info!(
                truncated_patterns = report.truncated_patterns,
                port_groups = report.fast_pattern_port_groups,
                service_groups = report.fast_pattern_service_groups,
                service_rules_to_server = report.service_rule_count_to_server,
                service_rules_to_client = report.service_rule_count_to_client,
                "build summary"
            );
            for (idx, count) in report.rule_count_by_proto.iter().enumerate() {
                if *count > 0 {
                    info!(proto = ?proto_from_index(idx), rules = count, "per-protocol rule count");
                }
            }
        }
        Err(err) => {
            error!(%err, "compilation failed");
            std::process::exit(1);
        }
    }
}

fn proto_from_index(i: usize) -> ProtoId {
    match i {
        0 => ProtoId::Ip,
        1 => ProtoId::Icmp,
        2 => ProtoId::Tcp,
        _ => ProtoId::Udp,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();
}
