use std::io::Write;

use fpc_core::config::load_from_path;

#[test]
fn loads_minimal_config() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut f = tempfile::NamedTempFile::new()?;
    writeln!(f, r#"max_pattern_len = 128"#)?;

    let cfg = load_from_path(f.path())?;
    assert_eq!(cfg.max_pattern_len, 128);
    assert!(cfg.only_literal());
    assert!(!cfg.split_any_any);
    Ok(())
}

#[test]
fn loads_every_flag() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut f = tempfile::NamedTempFile::new()?;
    writeln!(
        f,
        r#"
split_any_any = true
max_pattern_len = 32
search_opt = "regex_capable"
offload_search_opt = "literal"
debug_mode = true
"#
    )?;

    let cfg = load_from_path(f.path())?;
    assert!(cfg.split_any_any);
    assert_eq!(cfg.max_pattern_len, 32);
    assert!(!cfg.only_literal());
    assert!(cfg.debug_mode);
    assert!(!cfg.hot_reload);
    Ok(())
}

#[test]
fn rejects_test_mode_combined_with_hot_reload() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut f = tempfile::NamedTempFile::new()?;
    writeln!(f, "test_mode = true\nhot_reload = true")?;

    assert!(load_from_path(f.path()).is_err());
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_from_path("/nonexistent/path/to/config.toml").unwrap_err();
    assert!(matches!(err, fpc_core::CompileError::Io(_)));
}
