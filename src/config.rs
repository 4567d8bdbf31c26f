//! Minimal flat key-value config file, read and written with `serde` +
//! `quick-xml` -- the pack's closest fetchable analog to the original's
//! libxml2-based flat `<option>` list.
//!
//! Only the two options the bridge actually exposes are modeled;
//! unknown elements in an existing file are ignored on read rather than
//! rejected, so a file written by a newer version doesn't break an
//! older one.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename = "a2j_options")]
pub struct ConfigFile {
    #[serde(default)]
    pub jack_server_name: Option<String>,
    #[serde(default)]
    pub export_hw_ports: bool,
}

impl Default for ConfigFile {
    fn default() -> Self {
        ConfigFile { jack_server_name: None, export_hw_ports: false }
    }
}

impl ConfigFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let xml = std::fs::read_to_string(path)?;
        let config = quick_xml::de::from_str(&xml)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let xml = quick_xml::se::to_string(self)?;
        std::fs::write(path, xml)?;
        Ok(())
    }

    /// Load from `path` if it exists, falling back to defaults
    /// otherwise. A malformed file is logged and treated as absent
    /// rather than aborting startup.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("failed to read config file {}: {err}", path.display());
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_xml() {
        let config = ConfigFile { jack_server_name: Some("rt".into()), export_hw_ports: true };
        let dir = std::env::temp_dir().join(format!("a2j-config-test-{}", std::process::id()));
        std::fs::write(&dir, quick_xml::se::to_string(&config).unwrap()).unwrap();
        let loaded = ConfigFile::load(&dir).unwrap();
        std::fs::remove_file(&dir).ok();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_yields_default() {
        let path = Path::new("/nonexistent/a2j-config-does-not-exist.xml");
        let config = ConfigFile::load_or_default(path);
        assert_eq!(config, ConfigFile::default());
    }
}
