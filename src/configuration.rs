use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::lifecycle::APPLICATION_BUNDLE;

/// Environment variable that overrides the configured application name.
pub const APP_NAME_VAR: &str = "APP_NAME";

#[derive(Debug, Deserialize)]
pub struct RunConfig {
    /// Kubeconfig context to connect through; the ambient one when unset.
    pub context: Option<String>,
    /// Supporting bundles deployed before the application, in file order.
    #[serde(default)]
    pub bundles: Vec<BundleConfig>,
    #[serde(default)]
    pub application: ApplicationConfig,
}

#[derive(Debug, Deserialize)]
pub struct BundleConfig {
    /// Tracking name the bundle deploys under.
    pub name: String,
    pub bundle: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationConfig {
    /// Pinned application name; normally derived from the bundle.
    pub name: Option<String>,
    #[serde(default = "default_application_bundle")]
    pub bundle: PathBuf,
}

impl Default for ApplicationConfig {
    fn default() -> ApplicationConfig {
        ApplicationConfig {
            name: None,
            bundle: default_application_bundle(),
        }
    }
}

fn default_application_bundle() -> PathBuf {
    PathBuf::from(APPLICATION_BUNDLE)
}

/// The application name pin, environment winning over the file.
pub fn application_override(config: &RunConfig) -> Option<String> {
    std::env::var(APP_NAME_VAR)
        .ok()
        .filter(|name| !name.is_empty())
        .or_else(|| config.application.name.clone())
}

pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> anyhow::Result<RunConfig> {
    let conf_file = std::fs::File::open(path)?;
    Ok(serde_yaml::from_reader(conf_file)?)
}
