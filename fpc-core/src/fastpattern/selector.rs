//! Fast-pattern selector — spec.md §4.1.

use std::rc::Rc;

use crate::rule::{PatternMatchData, PmType, Rule};

/// Result of selecting a fast pattern for one rule. The last element of
/// `patterns` is the chosen fast pattern; earlier elements are alternates
/// added to the same MPSE as additional entry points to the same rule, in
/// the rule's original option order.
#[derive(Debug, Clone)]
pub struct FastPatternSelection {
    pub patterns: Vec<Rc<PatternMatchData>>,
    /// Set when the rule must not contribute to fast-pattern matching at
    /// all; the caller falls back to the no-fast-pattern list.
    pub exclude: bool,
}

/// A `pm_type` is only a candidate for a given group kind: `Pkt` (raw packet
/// payload) content is port-group material, everything normalized
/// (`Body`/`Uri`/`Header`/`Key`) requires a service binding.
fn pm_type_compatible(pm_type: PmType, is_service_group: bool) -> bool {
    match pm_type {
        PmType::Pkt => !is_service_group,
        PmType::Body | PmType::Uri | PmType::Header | PmType::Key => is_service_group,
    }
}

/// Select at most one content option as `rule`'s fast pattern.
///
/// `is_service_group` picks which `pm_type`s are eligible; `only_literal` is
/// true when the target MPSE cannot search regex, so non-literal patterns
/// are skipped during rule 2.
pub fn select_fast_pattern(
    rule: &Rule,
    is_service_group: bool,
    only_literal: bool,
) -> FastPatternSelection {
    let candidates: Vec<Rc<PatternMatchData>> = rule
        .content_options()
        .map(|(_, pmd)| pmd.clone())
        .filter(|pmd| pm_type_compatible(pmd.pm_type, is_service_group))
        .collect();

    if candidates.is_empty() {
        return FastPatternSelection { patterns: Vec::new(), exclude: true };
    }

    // Rule 1: an explicitly marked fast pattern wins, first-listed on ties.
    if let Some(pos) = candidates.iter().position(|p| p.is_fast_pattern) {
        return FastPatternSelection { patterns: promote(&candidates, pos), exclude: false };
    }

    // Rule 2: longest literal content compatible with `only_literal`.
    let mut best: Option<usize> = None;
    for (i, p) in candidates.iter().enumerate() {
        if only_literal && !p.is_literal {
            continue;
        }
        best = match best {
            None => Some(i),
            Some(b) if p.pattern_size > candidates[b].pattern_size => Some(i),
            Some(b) => Some(b),
        };
    }

    match best {
        Some(pos) => FastPatternSelection { patterns: promote(&candidates, pos), exclude: false },
        // Rule 3: only regex-capable patterns remain under a literal-only MPSE.
        None => FastPatternSelection { patterns: Vec::new(), exclude: true },
    }
}

/// Move `candidates[pos]` to the end, keeping every other entry in order.
fn promote(candidates: &[Rc<PatternMatchData>], pos: usize) -> Vec<Rc<PatternMatchData>> {
    let mut patterns: Vec<_> = candidates
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != pos)
        .map(|(_, p)| p.clone())
        .collect();
    patterns.push(candidates[pos].clone());
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{DetectionOption, Direction, ProtoId, Rule, RuleId};

    fn content(bytes: &[u8], fast_pattern: bool) -> DetectionOption {
        let mut pmd = PatternMatchData::new(bytes.to_vec(), PmType::Pkt);
        pmd.is_fast_pattern = fast_pattern;
        DetectionOption::content(pmd, false)
    }

    fn rule(options: Vec<DetectionOption>) -> Rule {
        Rule::new(
            RuleId { gid: 1, sid: 1, rev: 1 },
            ProtoId::Tcp,
            Direction::ToServer,
            options,
        )
    }

    #[test]
    fn explicit_fast_pattern_wins_over_longer_content() {
        let r = rule(vec![content(b"ab", false), content(b"abcdef", true)]);
        let sel = select_fast_pattern(&r, false, false);
        assert!(!sel.exclude);
        assert_eq!(sel.patterns.last().unwrap().pattern_buf, b"abcdef");
        assert_eq!(sel.patterns[0].pattern_buf, b"ab");
    }

    #[test]
    fn longest_literal_wins_without_explicit_marker() {
        let r = rule(vec![content(b"ab", false), content(b"abcdef", false)]);
        let sel = select_fast_pattern(&r, false, false);
        assert_eq!(sel.patterns.last().unwrap().pattern_buf, b"abcdef");
    }

    #[test]
    fn tie_breaks_to_first_listed() {
        let r = rule(vec![content(b"abc", false), content(b"xyz", false)]);
        let sel = select_fast_pattern(&r, false, false);
        assert_eq!(sel.patterns.last().unwrap().pattern_buf, b"abc");
    }

    #[test]
    fn non_literal_only_candidate_excludes_under_literal_only_mpse() {
        let mut pmd = PatternMatchData::new(b"a.*b".to_vec(), PmType::Pkt);
        pmd.is_literal = false;
        let r = rule(vec![DetectionOption::content(pmd, false)]);
        let sel = select_fast_pattern(&r, false, true);
        assert!(sel.exclude);
    }

    #[test]
    fn incompatible_pm_type_is_excluded() {
        let mut pmd = PatternMatchData::new(b"GET".to_vec(), PmType::Uri);
        pmd.is_fast_pattern = true;
        let r = rule(vec![DetectionOption::content(pmd, false)]);
        // port group (is_service_group = false) cannot use a Uri pm_type
        let sel = select_fast_pattern(&r, false, false);
        assert!(sel.exclude);
    }
}
