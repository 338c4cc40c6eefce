//! Server configuration loading.
//!
//! The server file is a YAML document with a top-level `servers` list:
//!
//! ```yaml
//! servers:
//!   - name: local
//!     class: chatapp.providers.OllamaChat
//!     model: llama3
//!   - name: gpt
//!     class: chatapp.providers.OpenAiChat
//!     model: gpt-4o-mini
//!     api_key: ${OPENAI_API_KEY}
//! ```
//!
//! `name` and `class` are metadata. Every other key of a record is a
//! constructor parameter for the backend named by `class`.

use serde_yaml::Value as YamlValue;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Constructor parameters for a backend.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Keys of a server record that are never passed to a constructor.
pub const RESERVED_KEYS: &[&str] = &["name", "class"];

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_FILE_NAME: &str = "llms.yaml";

/// One `servers` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Profile name the user selects on the command line.
    pub name: String,
    /// Implementation identifier, looked up in the
    /// [`ImplementationRegistry`](crate::provider::registry::ImplementationRegistry).
    pub class: String,
    pub parameters: Parameters,
}

/// All servers declared in one configuration file, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    servers: Vec<ProviderConfig>,
}

impl ProviderRegistry {
    /// Load and parse a server file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigNotFound {
            path: path.to_path_buf(),
            source,
        })?;

        let registry = Self::from_yaml_str(&content).map_err(|e| match e {
            Error::ConfigMalformed { reason } => {
                Error::malformed(format!("{}: {}", path.display(), reason))
            }
            other => other,
        })?;

        debug!(path = %path.display(), servers = registry.len(), "Loaded server config");
        Ok(registry)
    }

    /// Parse a server document, expanding `${VAR}` values from the process environment.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Self::from_yaml_str_with_env(text, |var| std::env::var(var).ok())
    }

    /// Parse a server document with a custom environment lookup.
    pub fn from_yaml_str_with_env<F>(text: &str, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let doc: YamlValue = serde_yaml::from_str(text)
            .map_err(|e| Error::malformed(format!("invalid YAML: {e}")))?;

        let servers = match doc.get("servers") {
            Some(YamlValue::Sequence(seq)) => seq,
            Some(_) => return Err(Error::malformed("`servers` must be a list")),
            None => return Err(Error::malformed("missing top-level `servers` key")),
        };

        // Build into a local vec so a bad record never leaves a partial registry.
        let mut parsed = Vec::with_capacity(servers.len());
        for (index, record) in servers.iter().enumerate() {
            parsed.push(parse_record(index, record, &env)?);
        }

        let mut seen = HashSet::new();
        for server in &parsed {
            if !seen.insert(server.name.as_str()) {
                warn!(server = %server.name, "Duplicate server name, first entry wins");
            }
        }

        Ok(Self { servers: parsed })
    }

    /// First server whose name matches exactly.
    pub fn find(&self, name: &str) -> Option<&ProviderConfig> {
        self.servers.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.servers.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.servers.iter()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl FromIterator<ProviderConfig> for ProviderRegistry {
    fn from_iter<I: IntoIterator<Item = ProviderConfig>>(iter: I) -> Self {
        Self {
            servers: iter.into_iter().collect(),
        }
    }
}

/// Pick the server file: an explicit path, else `local` if it exists,
/// else `<home>/.chatapp/llms.yaml`. Without a home directory `local` is
/// returned as-is.
pub fn resolve_config_path(explicit: Option<&Path>, local: &Path, home: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if local.exists() {
        return local.to_path_buf();
    }

    home.map(|h| h.join(".chatapp").join(DEFAULT_FILE_NAME))
        .unwrap_or_else(|| local.to_path_buf())
}

fn parse_record<F>(index: usize, record: &YamlValue, env: &F) -> Result<ProviderConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let map = record
        .as_mapping()
        .ok_or_else(|| Error::malformed(format!("servers[{index}] is not a mapping")))?;

    let name = required_str(index, map, "name")?;
    let class = required_str(index, map, "class")?;

    let mut parameters = Parameters::new();
    for (key, value) in map {
        let key = key
            .as_str()
            .ok_or_else(|| Error::malformed(format!("server '{name}' has a non-string key")))?;
        if RESERVED_KEYS.contains(&key) {
            continue;
        }

        let mut json = serde_json::to_value(value).map_err(|e| {
            Error::malformed(format!("server '{name}' parameter '{key}' is not plain data: {e}"))
        })?;
        expand_env(&mut json, env).map_err(|var| {
            Error::malformed(format!(
                "server '{name}' parameter '{key}' references unset variable '{var}'"
            ))
        })?;
        parameters.insert(key.to_string(), json);
    }

    Ok(ProviderConfig {
        name,
        class,
        parameters,
    })
}

fn required_str(index: usize, map: &serde_yaml::Mapping, key: &str) -> Result<String> {
    match map.get(key) {
        Some(YamlValue::String(s)) => Ok(s.clone()),
        Some(_) => Err(Error::malformed(format!("servers[{index}].{key} must be a string"))),
        None => Err(Error::malformed(format!("servers[{index}] is missing `{key}`"))),
    }
}

/// Replace `${VAR}` strings in place. Returns the name of the first unset variable.
fn expand_env<F>(value: &mut serde_json::Value, env: &F) -> std::result::Result<(), String>
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        serde_json::Value::String(s) => {
            let var = s
                .strip_prefix("${")
                .and_then(|rest| rest.strip_suffix('}'))
                .map(str::to_string);
            if let Some(var) = var {
                *s = env(&var).ok_or(var)?;
            }
            Ok(())
        }
        serde_json::Value::Array(items) => items.iter_mut().try_for_each(|v| expand_env(v, env)),
        serde_json::Value::Object(map) => map.values_mut().try_for_each(|v| expand_env(v, env)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_servers_in_order() {
        let yaml = r#"
servers:
  - name: local
    class: pkg.FakeEcho
    temperature: 0.2
  - name: remote
    class: chatapp.providers.OpenAiChat
    model: gpt-4o-mini
    model_kwargs:
      top_p: 0.9
"#;
        let registry = ProviderRegistry::from_yaml_str_with_env(yaml, no_env).unwrap();
        assert_eq!(registry.names(), vec!["local", "remote"]);

        let local = registry.find("local").unwrap();
        assert_eq!(local.class, "pkg.FakeEcho");
        assert_eq!(local.parameters.len(), 1);
        assert_eq!(local.parameters["temperature"], serde_json::json!(0.2));

        let remote = registry.find("remote").unwrap();
        assert!(!remote.parameters.contains_key("name"));
        assert!(!remote.parameters.contains_key("class"));
        assert_eq!(remote.parameters["model_kwargs"]["top_p"], serde_json::json!(0.9));
    }

    #[test]
    fn test_missing_servers_key() {
        let err = ProviderRegistry::from_yaml_str_with_env("llms: []", no_env).unwrap_err();
        assert!(matches!(err, Error::ConfigMalformed { .. }));
        assert!(err.to_string().contains("servers"));
    }

    #[test]
    fn test_servers_not_a_list() {
        let err = ProviderRegistry::from_yaml_str_with_env("servers: {name: x}", no_env).unwrap_err();
        assert!(matches!(err, Error::ConfigMalformed { .. }));
    }

    #[test]
    fn test_record_missing_name_or_class() {
        let missing_class = "servers:\n  - name: ok\n    class: a.B\n  - name: broken\n";
        let err = ProviderRegistry::from_yaml_str_with_env(missing_class, no_env).unwrap_err();
        assert!(err.to_string().contains("servers[1] is missing `class`"));

        let missing_name = "servers:\n  - class: a.B\n";
        let err = ProviderRegistry::from_yaml_str_with_env(missing_name, no_env).unwrap_err();
        assert!(err.to_string().contains("missing `name`"));
    }

    #[test]
    fn test_non_string_name_rejected() {
        let err = ProviderRegistry::from_yaml_str_with_env("servers:\n  - name: 42\n    class: a.B\n", no_env)
            .unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = ProviderRegistry::from_yaml_str_with_env("servers: [", no_env).unwrap_err();
        assert!(matches!(err, Error::ConfigMalformed { .. }));
    }

    #[test]
    fn test_env_expansion() {
        let yaml = "servers:\n  - name: gpt\n    class: a.B\n    api_key: ${TEST_KEY}\n    headers: [\"${TEST_KEY}\", plain]\n";
        let env = |var: &str| (var == "TEST_KEY").then(|| "sk-test".to_string());
        let registry = ProviderRegistry::from_yaml_str_with_env(yaml, env).unwrap();
        let params = &registry.find("gpt").unwrap().parameters;
        assert_eq!(params["api_key"], "sk-test");
        assert_eq!(params["headers"], serde_json::json!(["sk-test", "plain"]));
    }

    #[test]
    fn test_unset_env_variable() {
        let yaml = "servers:\n  - name: gpt\n    class: a.B\n    api_key: ${NOT_SET_ANYWHERE}\n";
        let err = ProviderRegistry::from_yaml_str_with_env(yaml, no_env).unwrap_err();
        assert!(err.to_string().contains("NOT_SET_ANYWHERE"));
    }

    #[test]
    fn test_duplicate_names_first_wins() {
        let yaml = "servers:\n  - name: a\n    class: first.One\n  - name: a\n    class: second.Two\n";
        let registry = ProviderRegistry::from_yaml_str_with_env(yaml, no_env).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find("a").unwrap().class, "first.One");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "servers:\n  - name: local\n    class: pkg.FakeEcho").unwrap();

        let registry = ProviderRegistry::load(file.path()).unwrap();
        assert_eq!(registry.names(), vec!["local"]);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProviderRegistry::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn test_load_malformed_file_names_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "servers:\n  - just-a-string").unwrap();

        let err = ProviderRegistry::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigMalformed { .. }));
        assert!(err.to_string().contains("not a mapping"));
    }

    #[test]
    fn test_resolve_config_path_explicit_wins() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join(DEFAULT_FILE_NAME);
        std::fs::write(&local, "servers: []\n").unwrap();

        let explicit = Path::new("/tmp/custom.yaml");
        assert_eq!(
            resolve_config_path(Some(explicit), &local, Some(Path::new("/home/u"))),
            PathBuf::from("/tmp/custom.yaml")
        );
    }

    #[test]
    fn test_resolve_config_path_prefers_existing_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join(DEFAULT_FILE_NAME);
        std::fs::write(&local, "servers: []\n").unwrap();

        assert_eq!(resolve_config_path(None, &local, Some(Path::new("/home/u"))), local);
    }

    #[test]
    fn test_resolve_config_path_falls_back_to_home() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join(DEFAULT_FILE_NAME);

        assert_eq!(
            resolve_config_path(None, &local, Some(Path::new("/home/u"))),
            PathBuf::from("/home/u/.chatapp/llms.yaml")
        );
    }

    #[test]
    fn test_resolve_config_path_without_home() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join(DEFAULT_FILE_NAME);

        assert_eq!(resolve_config_path(None, &local, None), local);
        assert_eq!(
            resolve_config_path(None, Path::new(DEFAULT_FILE_NAME), None),
            PathBuf::from("llms.yaml")
        );
    }
}
