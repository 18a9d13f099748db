use std::env;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct ConfigFile {
    #[serde(alias = "wordlist")]
    pub wordlists: Option<Vec<String>>,
    #[serde(alias = "assetnote_wordlists")]
    pub hosted_wordlists: Option<Vec<String>>,
    pub hosted_api_wordlists: Option<Vec<String>>,
    #[serde(alias = "kitebuilder_lists")]
    pub specs: Option<Vec<String>>,
    pub extensions: Option<String>,
    pub dirsearch_compat: Option<bool>,
    pub wordlist_dir: Option<String>,
    pub force_method: Option<String>,
    pub filter_apis: Option<String>,
    pub timeout: Option<usize>,
    pub insecure: Option<bool>,
    pub proxies: Option<Vec<String>>,
    pub proxy_file: Option<String>,
    pub replay_proxy: Option<String>,
    pub output: Option<String>,
    pub output_format: Option<String>,
    pub no_color: Option<bool>,
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
        .or_else(|| {
            let drive = env::var_os("HOMEDRIVE")?;
            let path = env::var_os("HOMEPATH")?;
            Some(PathBuf::from(drive).join(path))
        })
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(home_dir()?.join(".routebuster").join("config.yml"))
}

/// Where hosted wordlists live when `wordlist_dir` is not set.
pub fn default_wordlist_dir() -> Option<PathBuf> {
    Some(home_dir()?.join(".routebuster").join("wordlists"))
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn expand_tilde_string(path: &str) -> String {
    expand_tilde(path).to_string_lossy().to_string()
}

pub fn load_config(path: &PathBuf, allow_missing: bool) -> Result<ConfigFile, String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_yaml::from_str::<ConfigFile>(&contents)
            .map_err(|e| format!("failed to parse config '{}': {e}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => {
            Ok(ConfigFile::default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("config file not found '{}'", path.display()))
        }
        Err(e) => Err(format!("failed to read config '{}': {e}", path.display())),
    }
}

fn default_config_yaml() -> String {
    r#"# Routebuster config
#
# Location (default):
#   ~/.routebuster/config.yml

# Plain text wordlists
# wordlists:
#   - ./wordlists/api-endpoints.txt

# Hosted wordlists resolved from wordlist_dir (NAME or NAME;MAXLEN)
# hosted_wordlists:
#   - apiroutes-210228;20000
# hosted_api_wordlists:
#   - routes-large;500
wordlist_dir: ~/.routebuster/wordlists

# OpenAPI/Swagger documents (file or URL) and precompiled route files
# specs:
#   - https://petstore.swagger.io/v2/swagger.json
#   - ./routes.kite

# extensions: php,aspx
# dirsearch_compat: false

# Route selection
# force_method: POST
# filter_apis: petstore,users

# Network
timeout: 10
# insecure: false
# proxies:
#   - 127.0.0.1:8080
# proxy_file: ./proxies.txt
# replay_proxy: http://127.0.0.1:8080

# Output (optional)
# output: ./routes.txt
# output_format: text

no_color: false
"#
    .to_string()
}

pub fn ensure_default_config_file(path: &PathBuf) -> Result<(), String> {
    if path.exists() {
        return Ok(());
    }
    let parent = path
        .parent()
        .ok_or_else(|| format!("invalid config path '{}'", path.display()))?;
    std::fs::create_dir_all(parent).map_err(|e| {
        format!(
            "failed to create config directory '{}': {e}",
            parent.display()
        )
    })?;
    std::fs::write(path, default_config_yaml())
        .map_err(|e| format!("failed to write config file '{}': {e}", path.display()))?;
    Ok(())
}
