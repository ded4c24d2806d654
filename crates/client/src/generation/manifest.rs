//! Asset manifest: the URLs written into a new generation at install time.

use serde::Serialize;
use shellcache_core::{Error, ManifestConfig};
use url::Url;

use crate::fetch::resolve;

/// Which half of the manifest an asset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    /// Part of the offline shell.
    Shell,
    /// Best-effort data file.
    Data,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub url: Url,
    pub class: AssetClass,
}

/// Ordered, immutable asset list. Shell assets come first.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    assets: Vec<Asset>,
}

impl Manifest {
    pub fn new(shell: Vec<Url>, data: Vec<Url>) -> Self {
        let shell = shell.into_iter().map(|url| Asset { url, class: AssetClass::Shell });
        let data = data.into_iter().map(|url| Asset { url, class: AssetClass::Data });
        Self { assets: shell.chain(data).collect() }
    }

    /// Resolve the configured entries against the application origin.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` naming the first entry that doesn't resolve.
    pub fn from_config(config: &ManifestConfig, origin: &Url) -> Result<Self, Error> {
        let resolve_all = |entries: &[String]| -> Result<Vec<Url>, Error> {
            entries
                .iter()
                .map(|entry| resolve(origin, entry).map_err(|e| Error::InvalidUrl(format!("manifest entry {entry:?}: {e}"))))
                .collect()
        };

        Ok(Self::new(resolve_all(&config.shell)?, resolve_all(&config.data)?))
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_config() {
        let origin = Url::parse("http://localhost:8080/").unwrap();
        let manifest = Manifest::from_config(&ManifestConfig::default(), &origin).unwrap();

        assert_eq!(manifest.assets().len(), 9);
        assert_eq!(manifest.assets()[0].url.as_str(), "http://localhost:8080/");
        assert_eq!(manifest.assets()[1].url.as_str(), "http://localhost:8080/index.html");
        assert!(manifest.assets().iter().all(|a| a.class == AssetClass::Shell));
    }

    #[test]
    fn test_shell_before_data() {
        let origin = Url::parse("http://localhost:8080/").unwrap();
        let config = ManifestConfig { shell: vec!["./index.html".into()], data: vec!["./data/sets.csv".into()] };
        let manifest = Manifest::from_config(&config, &origin).unwrap();

        let classes: Vec<_> = manifest.assets().iter().map(|a| a.class).collect();
        assert_eq!(classes, vec![AssetClass::Shell, AssetClass::Data]);
    }

    #[test]
    fn test_bad_entry() {
        let origin = Url::parse("http://localhost:8080/").unwrap();
        let config = ManifestConfig { shell: vec!["ftp://example.com/a".into()], data: Vec::new() };
        assert!(matches!(Manifest::from_config(&config, &origin), Err(Error::InvalidUrl(_))));
    }
}
