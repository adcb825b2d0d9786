//! The flash pipeline: acquire an image, detect the bootloader, upload.
//!
//! A prebuilt image is downloaded once into
//! `<work>/hex/<version>/<image>` and reused. A custom layout is compiled
//! from the release's source tree, which is fetched once into
//! `<work>/src/<version>`.
//!
//! Every attempt holds the readiness gate's flash slot for its whole
//! duration, so the slot is free again however the attempt ends.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info};

use crate::bootloader::{BootloaderDetector, BootloaderVariant};
use crate::catalog::VersionCatalog;
use crate::error::{Error, Result};
use crate::fetch::{Fetcher, SOURCE_ARCHIVE_URL_PREFIX, safe_join};
use crate::layout::{CustomLayout, LAYOUT_HEADER};
use crate::port::PortOpener;
use crate::session::Session;
use crate::toolchain::{Toolchain, compiled_image_path};

/// Sketch file name inside the upstream source archive.
pub const UPSTREAM_SKETCH: &str = "LEDController.ino";

/// Cache directory of prebuilt images, below the work dir.
pub const HEX_DIR: &str = "hex";

/// Cache directory of extracted source trees, below the work dir.
pub const SRC_DIR: &str = "src";

/// Compiler output directory inside a source tree.
pub const BUILD_DIR: &str = "build";

/// What to put on the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashSelection {
    /// A published image of a release.
    Prebuilt {
        /// Release version.
        version: String,
        /// Image file name.
        image: String,
    },
    /// The release's source compiled with a user layout.
    Custom {
        /// Release version.
        version: String,
        /// LED layout to compile in.
        layout: CustomLayout,
    },
}

impl FlashSelection {
    /// Release version of the selection.
    pub fn version(&self) -> &str {
        match self {
            Self::Prebuilt { version, .. } | Self::Custom { version, .. } => version,
        }
    }
}

/// Runs flash attempts against one session.
pub struct Flasher<T, F, O> {
    session: Arc<Session>,
    catalog: Arc<VersionCatalog>,
    toolchain: T,
    fetcher: F,
    detector: BootloaderDetector<O>,
}

impl<T, F, O> Flasher<T, F, O>
where
    T: Toolchain,
    F: Fetcher,
    O: PortOpener,
{
    /// Assemble a pipeline from its services.
    pub fn new(
        session: Arc<Session>,
        catalog: Arc<VersionCatalog>,
        toolchain: T,
        fetcher: F,
        detector: BootloaderDetector<O>,
    ) -> Self {
        Self {
            session,
            catalog,
            toolchain,
            fetcher,
            detector,
        }
    }

    /// Session the pipeline reports to.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Run one attempt for `selection` on `port`.
    ///
    /// Fails with [`Error::NotReady`] without side effects when a
    /// precondition is unmet, including when another attempt is running.
    /// On failure the error text is also the final status line.
    pub fn flash(&self, selection: &FlashSelection, port: &str) -> Result<()> {
        let _slot = match self
            .session
            .ready()
            .try_begin_flash()
        {
            Ok(slot) => slot,
            Err(unmet) => {
                self.session.report(unmet.message());
                return Err(Error::NotReady(unmet));
            },
        };

        match self.run(selection, port) {
            Ok(()) => {
                info!("Flash of {} on {port} complete", selection.version());
                self.session.report("Done!");
                Ok(())
            },
            Err(e) => {
                error!("Flash failed: {e}");
                self.session.report(&e.to_string());
                Err(e)
            },
        }
    }

    fn run(&self, selection: &FlashSelection, port: &str) -> Result<()> {
        let image = match selection {
            FlashSelection::Prebuilt { version, image } => self.acquire_prebuilt(version, image)?,
            FlashSelection::Custom { version, layout } => self.build_custom(version, layout)?,
        };

        let variant = self.detector.resolve_variant(port)?;
        debug!("Uploading with {variant} ({})", variant.board_id());
        self.toolchain
            .upload(variant.board_id(), port, &image)
    }

    fn acquire_prebuilt(&self, version: &str, image: &str) -> Result<PathBuf> {
        let url = self
            .catalog
            .url(version, image)
            .ok_or_else(|| {
                if self.catalog.contains(version) {
                    Error::UnknownImage {
                        version: version.to_string(),
                        image: image.to_string(),
                    }
                } else {
                    Error::UnknownVersion(version.to_string())
                }
            })?;

        let cache_dir = safe_join(&self.session.work_dir().join(HEX_DIR), version)?;
        let path = safe_join(&cache_dir, image)?;

        if path.is_file() {
            debug!("Using cached image {}", path.display());
        } else {
            fs::create_dir_all(&cache_dir)?;
            self.session
                .report(&format!("Downloading {image}"));
            self.fetcher.download(url, &path)?;
        }

        self.session
            .report(&format!("Flashing {image}..."));
        Ok(path)
    }

    fn build_custom(&self, version: &str, layout: &CustomLayout) -> Result<PathBuf> {
        let header = layout.generate()?;
        if !self.catalog.contains(version) {
            return Err(Error::UnknownVersion(version.to_string()));
        }

        let src_root = self.session.work_dir().join(SRC_DIR);
        let sketch_dir = safe_join(&src_root, version)?;
        if sketch_dir.is_dir() {
            debug!("Using cached source tree {}", sketch_dir.display());
        } else {
            self.fetch_source(version, &src_root, &sketch_dir)?;
        }

        fs::write(sketch_dir.join(LAYOUT_HEADER), header)?;

        self.session
            .report(&format!("Compiling custom {version} layout..."));
        let export_dir = sketch_dir.join(BUILD_DIR);
        self.toolchain.compile(
            BootloaderVariant::Current.board_id(),
            &sketch_dir,
            &export_dir,
        )?;

        self.session
            .report(&format!("Flashing custom {version} layout..."));
        Ok(compiled_image_path(&export_dir, version))
    }

    /// Download and unpack the tagged source archive, then rename its top
    /// level directory and sketch after `version` so the compiler accepts it.
    fn fetch_source(&self, version: &str, src_root: &Path, sketch_dir: &Path) -> Result<()> {
        fs::create_dir_all(src_root)?;
        self.session
            .report(&format!("Downloading {version}"));

        let archive = src_root.join(format!("{version}.zip"));
        let url = format!("{SOURCE_ARCHIVE_URL_PREFIX}{version}.zip");
        self.fetcher.download(&url, &archive)?;

        let entries = self
            .fetcher
            .extract_archive(&archive, src_root)?;
        let top = entries
            .first()
            .and_then(|entry| entry.strip_prefix(src_root).ok())
            .and_then(|relative| relative.components().next())
            .map(|component| src_root.join(component))
            .ok_or_else(|| Error::Archive(format!("{} is empty", archive.display())))?;

        fs::rename(&top, sketch_dir)?;
        if let Err(e) = fs::remove_file(&archive) {
            debug!("Keeping {}: {e}", archive.display());
        }

        let upstream = sketch_dir.join(UPSTREAM_SKETCH);
        if !upstream.is_file() {
            // A tree without the sketch would be taken as cached next time.
            if let Err(e) = fs::remove_dir_all(sketch_dir) {
                debug!("Removing {} failed: {e}", sketch_dir.display());
            }
            return Err(Error::Archive(format!(
                "{UPSTREAM_SKETCH} missing from {version} source archive"
            )));
        }
        fs::rename(&upstream, sketch_dir.join(format!("{version}.ino")))?;
        Ok(())
    }
}
