use std::path::{Path, PathBuf};

use super::types::{AppConfig, BackendKind, Device};
use crate::error::CliError;

/// Default quill data directory: ~/.quill
pub fn get_quill_data_dir() -> Result<PathBuf, CliError> {
    dirs::home_dir()
        .map(|home| home.join(".quill"))
        .ok_or_else(|| CliError::Config("cannot determine home directory".into()))
}

/// Load config with the usual precedence and apply `QUILL_*` overrides from
/// the process environment.
pub fn load_default() -> Result<AppConfig, CliError> {
    // Priority 1: ~/.quill/config.toml
    let data_dir = get_quill_data_dir()?;
    let home_config = data_dir.join("config.toml");

    // Priority 2: ./quill.toml
    let local_config = Path::new("quill.toml");

    let mut cfg = if home_config.exists() {
        read_config_file(&home_config)?
    } else if local_config.exists() {
        read_config_file(local_config)?
    } else {
        AppConfig::default()
    };

    fill_log_directory(&mut cfg, &data_dir);
    apply_env_overrides(&mut cfg, |k| std::env::var(k).ok())?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Load an explicit config file (the `--config` flag). Environment overrides
/// still apply on top.
pub fn load_from_path(path: &Path) -> Result<AppConfig, CliError> {
    let mut cfg = read_config_file(path)?;
    if let Ok(data_dir) = get_quill_data_dir() {
        fill_log_directory(&mut cfg, &data_dir);
    }
    apply_env_overrides(&mut cfg, |k| std::env::var(k).ok())?;
    validate(&cfg)?;
    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<AppConfig, CliError> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| CliError::Config(format!("cannot read {}: {e}", path.display())))?;
    toml::from_str::<AppConfig>(&s)
        .map_err(|e| CliError::Config(format!("invalid config {}: {e}", path.display())))
}

fn fill_log_directory(cfg: &mut AppConfig, data_dir: &Path) {
    let unset = cfg
        .logging
        .directory
        .as_ref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true);
    if unset {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    }
}

/// Apply `QUILL_*` overrides. `lookup` returns the raw value of a variable;
/// blank values are ignored.
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F) -> Result<(), CliError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("QUILL_BACKEND") {
        cfg.backend.kind = BackendKind::parse(&v)
            .ok_or_else(|| CliError::Config(format!("QUILL_BACKEND: unknown backend '{v}'")))?;
    }
    if let Some(v) = get("QUILL_URL") {
        cfg.backend.url = v.trim().to_string();
    }
    if let Some(v) = get("QUILL_MODEL") {
        cfg.backend.model = v.trim().to_string();
    }
    if let Some(v) = get("QUILL_DEVICE") {
        cfg.generation.device = Device::parse(&v)
            .ok_or_else(|| CliError::Config(format!("QUILL_DEVICE: unknown device '{v}'")))?;
    }
    if let Some(v) = get("QUILL_CONTEXT") {
        cfg.generation.context_size = parse_number("QUILL_CONTEXT", &v)?;
    }
    if let Some(v) = get("QUILL_BUFFER") {
        cfg.stream.lookahead_depth = parse_number("QUILL_BUFFER", &v)?;
    }
    if let Some(v) = get("QUILL_PREDICT") {
        cfg.generation.n_predict = parse_number("QUILL_PREDICT", &v)?;
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, CliError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| CliError::Config(format!("{key}: expected a number, got '{raw}'")))
}

pub fn validate(cfg: &AppConfig) -> Result<(), CliError> {
    if cfg.stream.lookahead_depth == 0 {
        return Err(CliError::Config("stream.lookahead_depth must be >= 1".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn env_overrides_apply() {
        let vars = env(&[
            ("QUILL_BACKEND", "llamacpp"),
            ("QUILL_DEVICE", "cpu"),
            ("QUILL_CONTEXT", "4096"),
            ("QUILL_BUFFER", "3"),
            ("QUILL_PREDICT", "77"),
            ("QUILL_MODEL", " mistral "),
        ]);
        let mut cfg = AppConfig::default();
        apply_env_overrides(&mut cfg, |k| vars.get(k).cloned()).unwrap();

        assert_eq!(cfg.backend.kind, BackendKind::Llamacpp);
        assert_eq!(cfg.backend.model, "mistral");
        assert_eq!(cfg.generation.device, Device::Cpu);
        assert_eq!(cfg.generation.context_size, 4096);
        assert_eq!(cfg.stream.lookahead_depth, 3);
        assert_eq!(cfg.generation.n_predict, 77);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let vars = env(&[("QUILL_BUFFER", "  "), ("QUILL_URL", "")]);
        let mut cfg = AppConfig::default();
        apply_env_overrides(&mut cfg, |k| vars.get(k).cloned()).unwrap();
        assert_eq!(cfg.stream.lookahead_depth, 8);
        assert!(cfg.backend.url.is_empty());
    }

    #[test]
    fn invalid_number_is_config_error() {
        let vars = env(&[("QUILL_BUFFER", "lots")]);
        let mut cfg = AppConfig::default();
        let err = apply_env_overrides(&mut cfg, |k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, CliError::Config(ref m) if m.contains("QUILL_BUFFER")));
    }

    #[test]
    fn zero_depth_fails_validation() {
        let mut cfg = AppConfig::default();
        cfg.stream.lookahead_depth = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn load_from_path_reads_file_and_fills_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quill.toml");
        std::fs::write(&path, "[stream]\ntail_interval_ms = 50\n").unwrap();

        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.stream.tail_interval_ms, 50);
        assert!(cfg.logging.directory.is_some());
    }

    #[test]
    fn load_from_path_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[stream\nlookahead_depth = ").unwrap();
        assert!(matches!(load_from_path(&path), Err(CliError::Config(_))));
    }
}
