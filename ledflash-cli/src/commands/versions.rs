//! Release catalog listing.

use anyhow::{Context, Result};
use console::style;
use ledflash::{HttpFetcher, VersionCatalog};

/// Versions command implementation.
pub(crate) fn cmd_versions(json: bool) -> Result<()> {
    let catalog = HttpFetcher::new()
        .fetch_version_catalog()
        .context("Failed to fetch the release list")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&catalog_json(&catalog))?
        );
        return Ok(());
    }

    if catalog.is_empty() {
        eprintln!("  {}", style("No releases found").dim());
        return Ok(());
    }

    let latest = catalog.latest();
    for version in catalog.versions() {
        let marker = if Some(version) == latest {
            format!(" {}", style("(latest)").green())
        } else {
            String::new()
        };
        eprintln!("{}{marker}", style(version).bold());

        let images = catalog.images(version);
        if images.is_empty() {
            eprintln!("  {}", style("no prebuilt images, custom build only").dim());
        }
        for image in images {
            eprintln!("  {} {image}", style("•").dim());
        }
    }
    Ok(())
}

fn catalog_json(catalog: &VersionCatalog) -> serde_json::Value {
    let versions: Vec<serde_json::Value> = catalog
        .versions()
        .into_iter()
        .map(|version| {
            let images: Vec<serde_json::Value> = catalog
                .images(version)
                .into_iter()
                .map(|image| {
                    serde_json::json!({
                        "name": image,
                        "url": catalog.url(version, image),
                    })
                })
                .collect();
            serde_json::json!({
                "name": version,
                "images": images,
            })
        })
        .collect();

    serde_json::json!({
        "ok": true,
        "data": {
            "latest": catalog.latest(),
            "versions": versions,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_json_newest_first() {
        let mut catalog = VersionCatalog::default();
        catalog.insert("v1.9.0", "radian.hex", "https://example.com/a");
        catalog.insert("v2.1.0", "radian.hex", "https://example.com/b");
        catalog.insert("v2.1.0", "kraken.hex", "https://example.com/c");

        let value = catalog_json(&catalog);
        assert_eq!(value["data"]["latest"], "v2.1.0");
        assert_eq!(value["data"]["versions"][0]["name"], "v2.1.0");
        assert_eq!(value["data"]["versions"][0]["images"][0]["name"], "radian.hex");
        assert_eq!(value["data"]["versions"][0]["images"][1]["url"], "https://example.com/c");
        assert_eq!(value["data"]["versions"][1]["name"], "v1.9.0");
    }

    #[test]
    fn test_catalog_json_empty() {
        let value = catalog_json(&VersionCatalog::default());
        assert!(value["data"]["latest"].is_null());
        assert_eq!(value["data"]["versions"], serde_json::json!([]));
    }
}
