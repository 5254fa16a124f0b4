//! Builder configuration — spec.md §6 `SnortConfig`/`FastPatternConfig`
//! flags, loaded the way the config modules in this codebase's lineage load
//! their TOML.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{CompileError, Result};

/// Search-API selector for the normal MPSE slot. Real search backends are
/// out of scope (spec.md §1); this only records which capability profile
/// the demo/mock backend should present.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchApi {
    Literal,
    RegexCapable,
}

impl Default for SearchApi {
    fn default() -> Self {
        SearchApi::Literal
    }
}

/// Mirrors the flag set spec.md §6 lists on `SnortConfig`/`FastPatternConfig`.
#[derive(Debug, Deserialize, Clone)]
pub struct BuilderConfig {
    /// When false, an any-port rule's group is also cloned into every
    /// directional port slot left unclaimed by a specific port object.
    #[serde(default)]
    pub split_any_any: bool,
    /// 0 means unlimited; caps the bytes handed to an MPSE per pattern.
    #[serde(default)]
    pub max_pattern_len: usize,
    /// Selects the normal MPSE's capability profile.
    #[serde(default)]
    pub search_opt: SearchApi,
    /// Selects the offload MPSE's capability profile, if any offload MPSE
    /// is configured at all.
    #[serde(default)]
    pub offload_search_opt: Option<SearchApi>,
    /// Runs the build without an offload MPSE even if one is configured,
    /// surfacing extra diagnostics (count mismatches become warnings the
    /// caller can choose to treat as fatal).
    #[serde(default)]
    pub test_mode: bool,
    /// Emits the per-rule `FP ...` / no-fast-pattern lines at debug level.
    #[serde(default)]
    pub debug_mode: bool,
    /// Builds may run hot-reload (no parallel compiles permitted) or
    /// first-load (parallel compiles permitted when every MPSE advertises
    /// support) — spec.md §5.
    #[serde(default)]
    pub hot_reload: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig {
            split_any_any: false,
            max_pattern_len: 0,
            search_opt: SearchApi::Literal,
            offload_search_opt: None,
            test_mode: false,
            debug_mode: false,
            hot_reload: false,
        }
    }
}

/// Returns true only when the normal MPSE cannot search regex, i.e. the
/// fast-pattern selector must restrict rule 2 (§4.1) to literal content.
impl BuilderConfig {
    pub fn only_literal(&self) -> bool {
        self.search_opt == SearchApi::Literal
    }
}

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<BuilderConfig> {
    let txt = fs::read_to_string(p).map_err(CompileError::Io)?;
    let cfg: BuilderConfig =
        toml::from_str(&txt).map_err(|e| CompileError::Config(format!("failed to parse config: {e}")))?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &BuilderConfig) -> Result<()> {
    if cfg.test_mode && cfg.hot_reload {
        return Err(CompileError::Config(
            "test_mode and hot_reload are mutually exclusive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_literal_search_no_truncation() {
        let cfg = BuilderConfig::default();
        assert!(cfg.only_literal());
        assert_eq!(cfg.max_pattern_len, 0);
    }

    #[test]
    fn loads_toml_and_validates() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "max_pattern_len = 64\nsearch_opt = \"regex_capable\"").unwrap();
        let cfg = load_from_path(f.path()).unwrap();
        assert_eq!(cfg.max_pattern_len, 64);
        assert!(!cfg.only_literal());
    }

    #[test]
    fn rejects_test_mode_with_hot_reload() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "test_mode = true\nhot_reload = true").unwrap();
        assert!(load_from_path(f.path()).is_err());
    }
}
