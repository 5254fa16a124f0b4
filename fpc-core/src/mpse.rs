//! The MPSE abstract interface — spec.md §4/§6. The algorithms themselves
//! (Aho-Corasick, Hyperscan, ...) are out of scope; this module only
//! defines the small capability contract the compiler drives, plus a
//! reference mock used by this crate's own tests.

use std::cell::RefCell;
use std::rc::Rc;

use crate::dot::{insert_rule, DotRoot};
use crate::rule::Pmx;

/// Whether a pattern is destined for the primary or the offload search
/// engine of a `PortGroup`'s `mpsegrp[pm_type]` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MpseType {
    Normal,
    Offload,
}

/// Flags accompanying a pattern insertion (nocase, negated, ...). Opaque to
/// the compiler — passed straight through to the MPSE.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternDescriptor {
    pub no_case: bool,
    pub negated: bool,
    pub flags: u32,
}

/// The capability set an MPSE implementation advertises before the builder
/// decides how to use it.
///
/// `create` is fallible (spec.md §7 lists "MPSE creation failure" as a real,
/// reportable error) — a real search-engine backend can fail to allocate or
/// to compile its own state at creation time. The mock backend below never
/// exercises that path; `CompileError::MpseCreate` is wired up and exercised
/// by a test factory that always fails, in `portgroup.rs`.
pub trait MpseApi {
    fn is_regex_capable(&self) -> bool;
    fn parallel_compiles(&self) -> bool;
    fn create(&self, agent: Rc<MpseAgent>) -> std::result::Result<Box<dyn Mpse>, String>;
}

/// One compiled multi-pattern search engine.
pub trait Mpse {
    fn add_pattern(&mut self, bytes: &[u8], descriptor: PatternDescriptor, pmx: Pmx);
    fn pattern_count(&self) -> usize;
    fn set_opt(&mut self, opt: i32);
    fn print_info(&self);
    /// Offline compile: the MPSE groups its own patterns by PMX cookie and
    /// invokes `agent.create_tree` once per distinct cookie, then once more
    /// with `None` to finalize the accumulated tree.
    fn compile(&mut self, agent: &MpseAgent) -> crate::error::Result<()>;
}

/// The capability the builder hands each MPSE so it can fold matched
/// patterns into a detection option tree during its own compile pass.
/// Replaces the source's `MpseAgent` function table (§9 design note): the
/// only behaviorally meaningful callback left once memory management is
/// ownership-based is `create_tree`.
pub struct MpseAgent {
    pub mpse_type: MpseType,
    tree: RefCell<Option<DotRoot>>,
}

impl MpseAgent {
    pub fn new(mpse_type: MpseType) -> Self {
        MpseAgent { mpse_type, tree: RefCell::new(None) }
    }

    /// `Some(pmx)` merges that rule into the tree; `None` finalizes nothing
    /// by itself (finalize is a separate pass, §4.4) but signals end of
    /// compile to callers checking whether every cookie was seen.
    pub fn create_tree(&self, pmx: Option<&Pmx>) {
        if let Some(pmx) = pmx {
            insert_rule(&mut self.tree.borrow_mut(), &pmx.rule, self.mpse_type);
        }
    }

    pub fn take_tree(&self) -> Option<DotRoot> {
        self.tree.borrow_mut().take()
    }
}

/// A minimal in-memory MPSE used by this crate's own tests and the demo
/// CLI. Not a real multi-pattern matcher (substring scan only) — the real
/// algorithms are explicitly out of scope per spec.md §1.
pub mod testing {
    use super::*;
    use std::collections::HashMap;

    pub struct MockMpse {
        patterns: Vec<(Vec<u8>, PatternDescriptor, Pmx)>,
        agent: Rc<MpseAgent>,
    }

    impl MockMpse {
        pub fn new(agent: Rc<MpseAgent>) -> Self {
            MockMpse { patterns: Vec::new(), agent }
        }
    }

    impl Mpse for MockMpse {
        fn add_pattern(&mut self, bytes: &[u8], descriptor: PatternDescriptor, pmx: Pmx) {
            self.patterns.push((bytes.to_vec(), descriptor, pmx));
        }

        fn pattern_count(&self) -> usize {
            self.patterns.len()
        }

        fn set_opt(&mut self, _opt: i32) {}

        fn print_info(&self) {}

        fn compile(&mut self, _agent: &MpseAgent) -> crate::error::Result<()> {
            // Group by rule identity (the PMX cookie's owner), emulating the
            // source MPSE's "once per distinct PMX cookie" contract.
            let mut seen: HashMap<crate::rule::RuleId, ()> = HashMap::new();
            for (_, _, pmx) in &self.patterns {
                if seen.insert(pmx.rule.id, ()).is_none() {
                    self.agent.create_tree(Some(pmx));
                }
            }
            self.agent.create_tree(None);
            Ok(())
        }
    }

    pub struct MockApi {
        pub regex_capable: bool,
        pub parallel: bool,
    }

    impl MpseApi for MockApi {
        fn is_regex_capable(&self) -> bool {
            self.regex_capable
        }

        fn parallel_compiles(&self) -> bool {
            self.parallel
        }

        fn create(&self, agent: Rc<MpseAgent>) -> std::result::Result<Box<dyn Mpse>, String> {
            Ok(Box::new(MockMpse::new(agent)))
        }
    }
}
