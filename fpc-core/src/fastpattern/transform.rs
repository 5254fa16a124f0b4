//! Pattern-final transform — spec.md §4.2.

use super::FastPatternConfig;
use crate::rule::PatternMatchData;

/// Compute the `(bytes, length)` actually inserted into an MPSE for a chosen
/// PMD.
///
/// Resolves spec.md §9 open question 1: the zero-length fallback is
/// `pattern_size - fp_offset`, not the source's `pattern_size - fp_length`
/// (which degenerates to `pattern_size` whenever `fp_length == 0` and
/// silently ignores `fp_offset`). See DESIGN.md.
///
/// Resolves open question 2: `fp_offset + fp_length` overrunning the buffer
/// is clamped to the buffer end rather than asserted — a malformed upstream
/// object should not make `build()` panic.
pub fn final_pattern(pmd: &PatternMatchData, cfg: &mut FastPatternConfig) -> Vec<u8> {
    let mut bytes = if pmd.is_negated || !pmd.is_literal {
        pmd.pattern_buf.clone()
    } else if pmd.fp_offset > 0 || pmd.fp_length > 0 {
        let effective_length = if pmd.fp_length > 0 {
            pmd.fp_length
        } else {
            pmd.pattern_size.saturating_sub(pmd.fp_offset)
        };
        let start = pmd.fp_offset.min(pmd.pattern_buf.len());
        let end = start.saturating_add(effective_length).min(pmd.pattern_buf.len());
        pmd.pattern_buf[start..end].to_vec()
    } else {
        pmd.pattern_buf.clone()
    };

    cfg.set_max(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::PmType;

    #[test]
    fn negated_pattern_is_verbatim_no_truncation_by_slicing() {
        let mut pmd = PatternMatchData::new(b"XYZ".to_vec(), PmType::Pkt);
        pmd.is_negated = true;
        pmd.fp_offset = 1;
        pmd.fp_length = 1;
        let mut cfg = FastPatternConfig::default();
        let out = final_pattern(&pmd, &mut cfg);
        assert_eq!(out, b"XYZ");
    }

    #[test]
    fn zero_fp_length_falls_back_to_size_minus_offset() {
        let mut pmd = PatternMatchData::new(b"abcdef".to_vec(), PmType::Pkt);
        pmd.fp_offset = 2;
        pmd.fp_length = 0;
        let mut cfg = FastPatternConfig::default();
        let out = final_pattern(&pmd, &mut cfg);
        // size(6) - offset(2) = 4 bytes starting at offset 2: "cdef"
        assert_eq!(out, b"cdef");
    }

    #[test]
    fn explicit_fp_length_takes_the_requested_slice() {
        let mut pmd = PatternMatchData::new(b"abcdef".to_vec(), PmType::Pkt);
        pmd.fp_offset = 1;
        pmd.fp_length = 2;
        let mut cfg = FastPatternConfig::default();
        let out = final_pattern(&pmd, &mut cfg);
        assert_eq!(out, b"bc");
    }

    #[test]
    fn overrun_is_clamped_not_panicking() {
        let mut pmd = PatternMatchData::new(b"abc".to_vec(), PmType::Pkt);
        pmd.fp_offset = 2;
        pmd.fp_length = 10;
        let mut cfg = FastPatternConfig::default();
        let out = final_pattern(&pmd, &mut cfg);
        assert_eq!(out, b"c");
    }

    #[test]
    fn max_pattern_len_truncates_and_counts() {
        let pmd = PatternMatchData::new(b"abcdefgh".to_vec(), PmType::Pkt);
        let mut cfg = FastPatternConfig { max_pattern_len: 4, num_patterns_truncated: 0 };
        let out = final_pattern(&pmd, &mut cfg);
        assert_eq!(out, b"abcd");
        assert_eq!(cfg.num_patterns_truncated, 1);
    }
}
