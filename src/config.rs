//! Config loader and the typed `RunConfig` it produces.
//!
//! A small `key = value` text format (one assignment per line, blank
//! lines and `#`-comments skipped), read into a `HashMap<String, String>`
//! and then converted into a strongly-typed `RunConfig`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{IvfadcError, Result};

/// Raw `key = value` parameter map, parsed from a config file before
/// typed defaults are applied.
#[derive(Debug, Default, Clone)]
pub struct ParamFile {
    params: HashMap<String, String>,
}

impl ParamFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| IvfadcError::io(path, e))?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let mut params = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                params.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        ParamFile { params }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|s| s.as_str())
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>> {
        match self.params.get(key) {
            None => Ok(None),
            Some(v) => v
                .parse::<i64>()
                .map(Some)
                .map_err(|_| IvfadcError::Config(format!("'{key}' is not an integer: '{v}'"))),
        }
    }

    pub fn get_float(&self, key: &str) -> Result<Option<f64>> {
        match self.params.get(key) {
            None => Ok(None),
            Some(v) => v
                .parse::<f64>()
                .map(Some)
                .map_err(|_| IvfadcError::Config(format!("'{key}' is not a float: '{v}'"))),
        }
    }
}

fn required_usize(pf: &ParamFile, key: &str) -> Result<usize> {
    let v = pf
        .get_int(key)?
        .ok_or_else(|| IvfadcError::Config(format!("missing required key '{key}'")))?;
    if v < 0 {
        return Err(IvfadcError::Config(format!("'{key}' must be >= 0, got {v}")));
    }
    Ok(v as usize)
}

fn optional_usize(pf: &ParamFile, key: &str, default: usize) -> Result<usize> {
    match pf.get_int(key)? {
        None => Ok(default),
        Some(v) if v >= 0 => Ok(v as usize),
        Some(v) => Err(IvfadcError::Config(format!(
            "'{key}' must be >= 0, got {v}"
        ))),
    }
}

/// Strongly-typed run configuration, one field per recognized config key.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub data_id: String,
    pub nt: usize,
    pub train_desc: String,
    pub index_desc: String,
    pub query_desc: String,
    pub dim: usize,
    pub coarsek: usize,
    pub nsq: usize,
    pub nsqbits: u32,
    pub iter: usize,
    pub attempts: usize,
    pub num_ret: usize,
    /// Cells probed per query (multi-probe width), read from the `ma` key.
    pub w: usize,
}

impl RunConfig {
    pub fn from_param_file(pf: &ParamFile) -> Result<Self> {
        Ok(RunConfig {
            data_id: pf.get_str("dataId").unwrap_or("tmp_id").to_string(),
            nt: optional_usize(pf, "nt", 1)?,
            train_desc: pf.get_str("train_desc").unwrap_or("").to_string(),
            index_desc: pf.get_str("index_desc").unwrap_or("").to_string(),
            query_desc: pf.get_str("query_desc").unwrap_or("").to_string(),
            dim: optional_usize(pf, "dim", 128)?,
            coarsek: required_usize(pf, "coarsek")?,
            nsq: optional_usize(pf, "nsq", 8)?,
            nsqbits: optional_usize(pf, "nsqbits", 8)? as u32,
            iter: optional_usize(pf, "iter", 20)?,
            attempts: optional_usize(pf, "attempts", 3)?,
            num_ret: optional_usize(pf, "num_ret", 10)?,
            w: optional_usize(pf, "ma", 4)?,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let pf = ParamFile::load(path)?;
        Self::from_param_file(&pf)
    }

    /// `dataId.out/` under the current directory.
    pub fn working_dir(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(format!("{}.out", self.data_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_lines_skipping_comments_and_blanks() {
        let text = "\n# a comment\ndataId = demo\ncoarsek = 64\nnt=4\n";
        let pf = ParamFile::parse(text);
        assert_eq!(pf.get_str("dataId"), Some("demo"));
        assert_eq!(pf.get_int("coarsek").unwrap(), Some(64));
        assert_eq!(pf.get_int("nt").unwrap(), Some(4));
    }

    #[test]
    fn missing_required_key_is_a_config_error() {
        let pf = ParamFile::parse("dim = 128\n");
        let err = RunConfig::from_param_file(&pf).unwrap_err();
        assert!(matches!(err, IvfadcError::Config(_)));
    }

    #[test]
    fn unset_keys_fall_back_to_their_documented_defaults() {
        let pf = ParamFile::parse("coarsek = 256\n");
        let cfg = RunConfig::from_param_file(&pf).unwrap();
        assert_eq!(cfg.nt, 1);
        assert_eq!(cfg.nsq, 8);
        assert_eq!(cfg.nsqbits, 8);
        assert_eq!(cfg.iter, 20);
        assert_eq!(cfg.attempts, 3);
        assert_eq!(cfg.num_ret, 10);
        assert_eq!(cfg.w, 4);
        assert_eq!(cfg.dim, 128);
    }

    #[test]
    fn rejects_non_integer_value_for_integer_key() {
        let pf = ParamFile::parse("coarsek = notanumber\n");
        let err = RunConfig::from_param_file(&pf).unwrap_err();
        assert!(matches!(err, IvfadcError::Config(_)));
    }
}
