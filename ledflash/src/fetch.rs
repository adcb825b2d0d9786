//! Downloading release artifacts and unpacking source archives.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use log::{debug, info};

use crate::catalog::{RELEASES_API_URL, VersionCatalog};
use crate::error::{Error, Result};

/// Tagged source archives of the controller firmware.
pub const SOURCE_ARCHIVE_URL_PREFIX: &str = "https://github.com/wingnut-tech/LEDController/archive/refs/tags/";

/// Network and archive primitives used by the flash pipeline.
pub trait Fetcher {
    /// Download `url` into `dest`.
    ///
    /// `dest` must only appear once the whole body has been received.
    fn download(&self, url: &str, dest: &Path) -> Result<()>;

    /// Unpack the zip at `archive` below `dest_dir`, returning the written
    /// paths in archive order.
    fn extract_archive(&self, archive: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
        extract_archive(archive, dest_dir)
    }
}

/// [`Fetcher`] over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    /// Connect timeout for every request.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Create a fetcher with a fresh connection pool.
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Self::CONNECT_TIMEOUT)
            .user_agent(concat!("ledflash/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }

    /// Fetch the release list and build the catalog.
    pub fn fetch_version_catalog(&self) -> Result<VersionCatalog> {
        info!("Fetching release list");
        let body = self
            .agent
            .get(RELEASES_API_URL)
            .set("Accept", "application/vnd.github+json")
            .call()?
            .into_string()?;
        VersionCatalog::from_releases_json(&body)
    }
}

impl Fetcher for HttpFetcher {
    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        info!("Downloading {url}");
        let response = self
            .agent
            .get(url)
            .call()?;

        let partial = partial_path(dest);
        let written = {
            let mut out = File::create(&partial)?;
            io::copy(&mut response.into_reader(), &mut out)
        };
        match written {
            Ok(bytes) => {
                fs::rename(&partial, dest)?;
                debug!("Wrote {bytes} bytes to {}", dest.display());
                Ok(())
            },
            Err(e) => {
                let _ = fs::remove_file(&partial);
                Err(Error::Io(e))
            },
        }
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Join an archive entry name onto `dest_dir`, refusing anything that could
/// resolve outside of it.
pub fn safe_join(dest_dir: &Path, entry_name: &str) -> Result<PathBuf> {
    // Archives written on Windows may use either separator.
    if entry_name
        .split(['/', '\\'])
        .any(|part| part == "..")
    {
        return Err(Error::UnsafeArchivePath(entry_name.to_string()));
    }

    let mut joined = dest_dir.to_path_buf();
    let mut depth = 0usize;

    for component in Path::new(entry_name).components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                depth += 1;
            },
            Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::UnsafeArchivePath(entry_name.to_string()));
            },
        }
    }

    if depth == 0 {
        return Err(Error::UnsafeArchivePath(entry_name.to_string()));
    }
    Ok(joined)
}

/// Unpack a zip archive below `dest_dir`.
///
/// Every entry is checked before anything is written, so a hostile archive
/// leaves the destination untouched.
pub fn extract_archive(archive: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    info!("Unzipping {}", archive.display());
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;

    let mut targets = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let entry = zip.by_index(index)?;
        targets.push(safe_join(dest_dir, entry.name())?);
    }

    for (index, target) in targets
        .iter()
        .enumerate()
    {
        let mut entry = zip.by_index(index)?;
        if entry.is_dir() {
            fs::create_dir_all(target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(target)?;
        io::copy(&mut entry, &mut out)?;
    }

    debug!("Extracted {} entries into {}", targets.len(), dest_dir.display());
    Ok(targets)
}
