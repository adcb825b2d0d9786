//! Release catalog: which prebuilt images each firmware version ships.

use std::collections::BTreeMap;

use log::debug;
use serde::Deserialize;

use crate::error::Result;

/// GitHub releases endpoint of the controller firmware.
pub const RELEASES_API_URL: &str = "https://api.github.com/repos/wingnut-tech/LEDController/releases";

/// Extension of prebuilt firmware images.
pub const IMAGE_EXTENSION: &str = ".hex";

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    name: String,
    browser_download_url: String,
}

/// Version name → image file name → download URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionCatalog {
    versions: BTreeMap<String, BTreeMap<String, String>>,
}

impl VersionCatalog {
    /// Build a catalog from the GitHub releases JSON array.
    ///
    /// Only `.hex` assets are kept. A release without images still shows up
    /// so it can be built as a custom layout. Releases without a name are
    /// skipped.
    pub fn from_releases_json(json: &str) -> Result<Self> {
        let releases: Vec<Release> = serde_json::from_str(json)?;
        let mut catalog = Self::default();

        for release in releases {
            let Some(name) = release
                .name
                .filter(|name| !name.is_empty())
            else {
                debug!("Skipping unnamed release with {} asset(s)", release.assets.len());
                continue;
            };
            let images = catalog
                .versions
                .entry(name)
                .or_default();
            for asset in release.assets {
                if asset
                    .name
                    .ends_with(IMAGE_EXTENSION)
                {
                    images.insert(asset.name, asset.browser_download_url);
                }
            }
        }
        Ok(catalog)
    }

    /// Add one image.
    pub fn insert(&mut self, version: impl Into<String>, image: impl Into<String>, url: impl Into<String>) {
        self.versions
            .entry(version.into())
            .or_default()
            .insert(image.into(), url.into());
    }

    /// Version names, newest first.
    pub fn versions(&self) -> Vec<&str> {
        self.versions
            .keys()
            .rev()
            .map(String::as_str)
            .collect()
    }

    /// Newest version name.
    pub fn latest(&self) -> Option<&str> {
        self.versions
            .keys()
            .next_back()
            .map(String::as_str)
    }

    /// Whether the catalog knows `version`.
    pub fn contains(&self, version: &str) -> bool {
        self.versions.contains_key(version)
    }

    /// Image names of `version` in descending order, empty for unknown versions.
    pub fn images(&self, version: &str) -> Vec<&str> {
        self.versions
            .get(version)
            .map(|images| {
                images
                    .keys()
                    .rev()
                    .map(String::as_str)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Download URL of one image.
    pub fn url(&self, version: &str, image: &str) -> Option<&str> {
        self.versions
            .get(version)?
            .get(image)
            .map(String::as_str)
    }

    /// True when no release was found.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
