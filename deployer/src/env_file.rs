//! `.env` loading and the immutable environment snapshot.
//!
//! The process environment is read once and overlaid with the optional env
//! file. Nothing here writes back to the process environment.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while reading the env file
#[derive(Error, Debug)]
pub enum EnvFileError {
    /// The file exists but could not be read
    #[error("Failed to read env file '{}': {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type EnvFileResult<T> = Result<T, EnvFileError>;

/// Value part of a line. A quoted value ends at its closing quote and
/// anything after it is dropped; an unquoted value ends before the first
/// `#` that follows whitespace.
fn parse_value(raw: &str) -> &str {
    let value = raw.trim();

    if let Some(quote) = value.chars().next().filter(|c| *c == '"' || *c == '\'') {
        return match value[1..].find(quote) {
            Some(end) => &value[1..end + 1],
            None => value,
        };
    }

    let end = raw
        .char_indices()
        .find(|&(i, c)| c == '#' && raw[..i].ends_with(char::is_whitespace))
        .map_or(raw.len(), |(i, _)| i);
    raw[..end].trim()
}

fn strip_export(line: &str) -> &str {
    match line.strip_prefix("export") {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => line,
    }
}

/// Parse `KEY=VALUE` lines.
///
/// Blank lines and `#` comments are skipped, a leading `export` keyword is
/// dropped, and one pair of surrounding quotes is removed from the value.
/// Unquoted values lose a trailing ` # comment`; inside quotes `#` is kept.
/// Malformed lines are skipped with a warning.
pub fn parse_env_file(content: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = strip_export(line);

        let Some((key, value)) = line.split_once('=') else {
            warn!(line = index + 1, "skipping env file line without '='");
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            warn!(line = index + 1, "skipping env file line with empty key");
            continue;
        }

        entries.push((key.to_string(), parse_value(value).to_string()));
    }

    entries
}

/// Read and parse the env file. `Ok(None)` when it does not exist.
pub fn load_env_file(path: &Path) -> EnvFileResult<Option<Vec<(String, String)>>> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let entries = parse_env_file(&content);
            info!(path = %path.display(), count = entries.len(), "loaded env file");
            Ok(Some(entries))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no env file, skipping");
            Ok(None)
        }
        Err(source) => Err(EnvFileError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Read-only view of the variables a deployment may forward
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment. Variables whose name or
    /// value is not valid UTF-8 are left out.
    pub fn from_process() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Layer entries on top; later entries win
    pub fn overlay<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.vars.extend(entries);
        self
    }

    /// Process environment overlaid with `env_file`, when it exists
    pub fn load(env_file: &Path) -> EnvFileResult<Self> {
        let env = Self::from_process();
        Ok(match load_env_file(env_file)? {
            Some(entries) => env.overlay(entries),
            None => env,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Value of `key`, or the empty string when unset
    pub fn get_or_empty(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_basic_lines() {
        let entries = parse_env_file("A=1\nB=two words\n\nC=\n");
        assert_eq!(
            entries,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two words".to_string()),
                ("C".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_parse_comments_export_and_quotes() {
        let content = r#"
# database
export DATABASE_URL="postgres://u:p@db/app"
  OAUTH_SCOPES = 'openid email'
VECTOR_DB="pgvector
"#;
        let entries = parse_env_file(content);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, "DATABASE_URL");
        assert_eq!(entries[0].1, "postgres://u:p@db/app");
        assert_eq!(entries[1].0, "OAUTH_SCOPES");
        assert_eq!(entries[1].1, "openid email");
        // Unbalanced quote is kept verbatim
        assert_eq!(entries[2].1, "\"pgvector");
    }

    #[test]
    fn test_parse_value_with_equals_sign() {
        let entries = parse_env_file("PGVECTOR_DB_URL=postgres://h/db?sslmode=require");
        assert_eq!(entries[0].1, "postgres://h/db?sslmode=require");
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let entries = parse_env_file("NOT_A_PAIR\n=orphan\nOK=yes");
        assert_eq!(entries, vec![("OK".to_string(), "yes".to_string())]);
    }

    #[test]
    fn test_quoted_value_edge_cases() {
        assert_eq!(parse_value("\"\""), "");
        assert_eq!(parse_value("'"), "'");
        assert_eq!(parse_value("'mixed\""), "'mixed\"");
    }

    #[test]
    fn test_parse_inline_comments() {
        let content = "OAUTH_SCOPES=openid email # requested scopes\n\
                       OPENAI_API_KEY=\"sk-#123 # not a comment\" # trailing\n\
                       ANCHOR=page#top\n\
                       EMPTY= # nothing here\n\
                       HASH=#literal\n";
        let entries = parse_env_file(content);
        assert_eq!(
            entries,
            vec![
                ("OAUTH_SCOPES".to_string(), "openid email".to_string()),
                ("OPENAI_API_KEY".to_string(), "sk-#123 # not a comment".to_string()),
                ("ANCHOR".to_string(), "page#top".to_string()),
                ("EMPTY".to_string(), String::new()),
                ("HASH".to_string(), "#literal".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_export_with_any_whitespace() {
        let content = "export\tVECTOR_DB=pgvector\nexport  MCP_ENABLE=true\nexported=1";
        let entries = parse_env_file(content);
        assert_eq!(
            entries,
            vec![
                ("VECTOR_DB".to_string(), "pgvector".to_string()),
                ("MCP_ENABLE".to_string(), "true".to_string()),
                ("exported".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_env_file(&dir.path().join(".env")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_load_existing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "OPENAI_API_KEY=from-file").unwrap();

        let entries = load_env_file(file.path()).unwrap().unwrap();
        assert_eq!(
            entries,
            vec![("OPENAI_API_KEY".to_string(), "from-file".to_string())]
        );
    }

    #[test]
    fn test_load_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_env_file(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to read env file"));
    }

    #[test]
    fn test_overlay_later_wins() {
        let env = Environment::from_vars([("A", "ambient"), ("B", "kept")])
            .overlay(vec![("A".into(), "file".into())]);
        assert_eq!(env.get("A"), Some("file"));
        assert_eq!(env.get("B"), Some("kept"));
        assert_eq!(env.get_or_empty("MISSING"), "");
        assert_eq!(env.len(), 2);
        assert!(Environment::new().is_empty());
    }
}
