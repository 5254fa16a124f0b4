//! Fast-pattern selection and the pattern-final transform — spec.md §4.1/§4.2.

mod selector;
mod transform;

pub use selector::{select_fast_pattern, FastPatternSelection};
pub use transform::final_pattern;

/// Mirrors `SnortConfig`/`FastPatternConfig` from spec.md §6: the knobs the
/// selector and transform consult. Owned by the build context for the
/// duration of one `build()` call.
#[derive(Debug, Clone)]
pub struct FastPatternConfig {
    /// 0 means unlimited.
    pub max_pattern_len: usize,
    pub num_patterns_truncated: usize,
}

impl Default for FastPatternConfig {
    fn default() -> Self {
        FastPatternConfig { max_pattern_len: 0, num_patterns_truncated: 0 }
    }
}

impl FastPatternConfig {
    /// Cap `bytes` at `max_pattern_len`, bumping the truncation counter when
    /// the cap actually bites.
    pub fn set_max(&mut self, bytes: &mut Vec<u8>) {
        if self.max_pattern_len > 0 && bytes.len() > self.max_pattern_len {
            bytes.truncate(self.max_pattern_len);
            self.num_patterns_truncated += 1;
        }
    }
}
