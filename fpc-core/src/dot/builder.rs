//! Prefix-sharing insertion — spec.md §4.3.

use std::cell::RefCell;
use std::rc::Rc;

use super::{DotNode, DotRoot, NodeRef, OptionIdentity};
use crate::mpse::MpseType;
use crate::rule::{DetectionOption, Rule, RuleOptionKind};

fn is_fast_pattern_only_for(rule: &Rule, opt: &DetectionOption, mpse_type: MpseType) -> bool {
    let meta = rule.meta.borrow();
    let fp_only = match mpse_type {
        MpseType::Normal => meta.normal_fp_only,
        MpseType::Offload => meta.offload_fp_only,
    };
    fp_only == Some(opt.id)
}

/// Merge `rule`'s residual option sequence (fast-pattern-only contents and
/// leaf markers excluded) into `existing`, creating the root if absent.
pub fn insert_rule(existing: &mut Option<DotRoot>, rule: &Rc<Rule>, mpse_type: MpseType) {
    if existing.is_none() {
        *existing =
            Some(DotRoot { primary_rule: rule.clone(), children: Vec::new(), relative_children: 0 });
    }
    let root = existing.as_mut().expect("just initialized");

    let residual: Vec<&DetectionOption> = rule
        .options
        .iter()
        .filter(|o| o.kind != RuleOptionKind::LeafNode)
        .filter(|o| !is_fast_pattern_only_for(rule, o, mpse_type))
        .collect();

    insert_step(&mut root.children, &mut root.relative_children, &residual, 0, rule);
}

fn insert_step(
    children: &mut Vec<NodeRef>,
    relative_children: &mut usize,
    residual: &[&DetectionOption],
    idx: usize,
    rule: &Rc<Rule>,
) {
    if idx == residual.len() {
        let rule_id = rule.id;
        let already_present = children.iter().any(|c| {
            let b = c.borrow();
            b.kind == RuleOptionKind::LeafNode && b.identity == OptionIdentity::Rule(rule_id)
        });
        if !already_present {
            children.push(Rc::new(RefCell::new(DotNode::leaf(rule.clone()))));
        }
        return;
    }

    let opt = residual[idx];
    let identity = OptionIdentity::Option(opt.id);

    // First match wins when more than one sibling could match (it never
    // should, since option ids are unique, but the tie-break is explicit in
    // spec.md step 5).
    let found = children.iter().position(|c| {
        let b = c.borrow();
        b.identity == identity && b.kind == opt.kind
    });

    let child = match found {
        Some(pos) => children[pos].clone(),
        None => {
            let node =
                Rc::new(RefCell::new(DotNode::inner(opt.id, opt.kind.clone(), opt.is_relative)));
            children.push(node.clone());
            if opt.is_relative {
                *relative_children += 1;
            }
            node
        }
    };

    let mut b = child.borrow_mut();
    let DotNode { ref mut children, ref mut relative_children, .. } = *b;
    insert_step(children, relative_children, residual, idx + 1, rule);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Direction, PatternMatchData, PmType, ProtoId, RuleId};

    fn content_opt(bytes: &[u8]) -> DetectionOption {
        DetectionOption::content(PatternMatchData::new(bytes.to_vec(), PmType::Pkt), false)
    }

    fn test_rule(id: u32, opts: Vec<DetectionOption>) -> Rc<Rule> {
        Rc::new(Rule::new(
            RuleId { gid: 1, sid: id, rev: 1 },
            ProtoId::Tcp,
            Direction::ToServer,
            opts,
        ))
    }

    #[test]
    fn shared_prefix_branches_into_siblings() {
        // Scenario 1 from spec.md §8: A = content:"x"; content:"y";
        // B = content:"x"; content:"z"; both sharing an "x" prefix.
        let shared = content_opt(b"x");
        let a = test_rule(1, vec![shared.clone(), content_opt(b"y")]);
        let b = test_rule(2, vec![shared, content_opt(b"z")]);

        let mut root: Option<DotRoot> = None;
        insert_rule(&mut root, &a, MpseType::Normal);
        insert_rule(&mut root, &b, MpseType::Normal);
        let root = root.unwrap();

        assert_eq!(root.children.len(), 1, "x should be shared, not duplicated");
        let x_node = root.children[0].borrow();
        assert_eq!(x_node.relative_children, 0);
        assert_eq!(x_node.children.len(), 2, "y and z hang off the shared x");
    }

    #[test]
    fn inserting_same_rule_twice_does_not_duplicate_leaf() {
        let r = test_rule(1, vec![content_opt(b"x")]);
        let mut root: Option<DotRoot> = None;
        insert_rule(&mut root, &r, MpseType::Normal);
        insert_rule(&mut root, &r, MpseType::Normal);
        let root = root.unwrap();
        let x_node = root.children[0].borrow();
        assert_eq!(x_node.children.len(), 1, "same rule inserted twice is one leaf");
    }

    #[test]
    fn relative_children_counts_relative_first_options() {
        let mut rel = content_opt(b"y");
        rel.is_relative = true;
        let a = test_rule(1, vec![content_opt(b"x")]);
        let b = test_rule(2, vec![rel]);

        let mut root: Option<DotRoot> = None;
        insert_rule(&mut root, &a, MpseType::Normal);
        insert_rule(&mut root, &b, MpseType::Normal);
        let root = root.unwrap();
        assert_eq!(root.relative_children, 1);
    }
}
