use serde::Deserialize;

/// Raw YAML document. The free-form `headers`, `params` and `requests`
/// sections stay as YAML values here and are shaped into the typed catalog
/// by `gun::Magazine::from_config`.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub concurrency: Option<u32>,
    pub loopcount: Option<u32>,
    /// Default per-request timeout, seconds.
    pub timeout: Option<u64>,
    pub ratepersecond: Option<u32>,
    pub randomdelayms: Option<u64>,
    pub debug: Option<bool>,
    pub output: Option<String>,
    pub headers: Option<serde_yaml::Mapping>,
    pub params: Option<serde_yaml::Mapping>,
    pub requests: Option<Vec<serde_yaml::Value>>,
}
