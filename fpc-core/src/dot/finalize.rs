//! Hash-consing and `otn` fixup — spec.md §4.4.

use std::rc::Rc;

use ahash::AHashMap;

use super::{DotNode, DotRoot, NodeRef, OptionIdentity};
use crate::rule::{Rule, RuleOptionKind};

/// Structural key for hash-consing: two nodes are the same subtree iff they
/// agree on kind, identity, relative flag, and the (already-canonicalized)
/// pointer identity of every child in order.
#[derive(PartialEq, Eq, Hash, Clone)]
struct StructKey {
    kind: RuleOptionKind,
    identity: OptionIdentity,
    is_relative: bool,
    children: Vec<usize>,
}

fn struct_key(node: &DotNode) -> StructKey {
    StructKey {
        kind: node.kind.clone(),
        identity: node.identity.clone(),
        is_relative: node.is_relative,
        children: node.children.iter().map(|c| Rc::as_ptr(c) as usize).collect(),
    }
}

/// Hash-cons table scoped to one configuration snapshot (spec.md §9 design
/// note: this is per-build, never process-global).
pub type DedupTable = AHashMap<StructKey, NodeRef>;

/// Finalize one DOT root: hash-cons every subtree against `table`, then fix
/// up single-child chains so each one's tail leaf is cached on every
/// ancestor along the unbranched run once a content option has been seen.
pub fn finalize_root(root: &mut DotRoot, table: &mut DedupTable) {
    let canonical: Vec<NodeRef> = root.children.drain(..).map(|c| canonicalize(c, table)).collect();
    root.children = canonical;
    for child in &root.children {
        fixup(child);
    }
}

fn canonicalize(node: NodeRef, table: &mut DedupTable) -> NodeRef {
    let kids: Vec<NodeRef> = node.borrow().children.clone();
    let canonical_kids: Vec<NodeRef> =
        kids.into_iter().map(|k| canonicalize(k, table)).collect();
    node.borrow_mut().children = canonical_kids;

    let key = struct_key(&node.borrow());
    if let Some(existing) = table.get(&key) {
        return existing.clone();
    }
    table.insert(key, node.clone());
    node
}

/// Returns `(tail_leaf, content_seen)` when `node` is the head of an
/// unbranched single-child run reaching down to exactly one leaf; `None`
/// once the run hits a node with zero or more-than-one children without
/// ever reaching a leaf through a single path.
fn fixup(node: &NodeRef) -> Option<(Rc<Rule>, bool)> {
    let (kind, children) = {
        let b = node.borrow();
        (b.kind.clone(), b.children.clone())
    };

    if kind == RuleOptionKind::LeafNode {
        return node.borrow().leaf_rule.clone().map(|r| (r, false));
    }

    // Recurse into every child regardless of branching so every subtree
    // gets its own otn computed, not just the ones on the winning chain.
    let mut outcomes: Vec<Option<(Rc<Rule>, bool)>> = children.iter().map(fixup).collect();

    if children.len() != 1 {
        return None;
    }

    let (tail, had_content) = outcomes.pop().flatten()?;
    let content_seen = had_content || kind == RuleOptionKind::Content;
    if content_seen {
        node.borrow_mut().otn = Some(tail.clone());
    }
    Some((tail, content_seen))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dot::insert_rule;
    use crate::mpse::MpseType;
    use crate::rule::{DetectionOption, Direction, PatternMatchData, PmType, ProtoId, RuleId};

    fn content_opt(bytes: &[u8]) -> DetectionOption {
        DetectionOption::content(PatternMatchData::new(bytes.to_vec(), PmType::Pkt), false)
    }

    fn test_rule(sid: u32, opts: Vec<DetectionOption>) -> Rc<Rule> {
        Rc::new(Rule::new(RuleId { gid: 1, sid, rev: 1 }, ProtoId::Tcp, Direction::ToServer, opts))
    }

    #[test]
    fn equal_subtrees_collapse_to_the_same_object() {
        let shared_tail = content_opt(b"y");
        let a = test_rule(1, vec![content_opt(b"x"), shared_tail.clone()]);
        let b = test_rule(2, vec![content_opt(b"w"), shared_tail]);

        let mut root_a: Option<DotRoot> = None;
        insert_rule(&mut root_a, &a, MpseType::Normal);
        let mut root_a = root_a.unwrap();
        let mut root_b: Option<DotRoot> = None;
        insert_rule(&mut root_b, &b, MpseType::Normal);
        let mut root_b = root_b.unwrap();

        let mut table = DedupTable::default();
        finalize_root(&mut root_a, &mut table);
        finalize_root(&mut root_b, &mut table);

        // both "y" subtrees (each just a leaf under "y") should hash-cons
        // to the very same leaf object once inserted into the same table.
        let y_a = &root_a.children[0].borrow().children[0];
        let y_b = &root_b.children[0].borrow().children[0];
        assert!(Rc::ptr_eq(y_a, y_b));
    }

    #[test]
    fn otn_is_set_on_unbranched_content_chain() {
        let r = test_rule(1, vec![content_opt(b"x"), content_opt(b"y")]);
        let mut root: Option<DotRoot> = None;
        insert_rule(&mut root, &r, MpseType::Normal);
        let mut root = root.unwrap();
        let mut table = DedupTable::default();
        finalize_root(&mut root, &mut table);

        let x_node = root.children[0].borrow();
        assert!(x_node.otn.is_some());
        assert_eq!(x_node.otn.as_ref().unwrap().id, r.id);
    }
}
