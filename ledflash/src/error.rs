//! Error types for ledflash.

use std::io;
use thiserror::Error;

use crate::readiness::Unmet;

/// Result type for ledflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for ledflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Http {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Network transport failure (DNS, TLS, connection reset...).
    #[error("Download failed: {0}")]
    Transport(String),

    /// Corrupt or unreadable archive.
    #[error("Archive error: {0}")]
    Archive(String),

    /// Archive entry that would land outside the destination directory.
    #[error("{0}: illegal file path in archive")]
    UnsafeArchivePath(String),

    /// Malformed release metadata.
    #[error("Invalid release metadata: {0}")]
    Json(#[from] serde_json::Error),

    /// Version not present in the catalog.
    #[error("Unknown version: {0}")]
    UnknownVersion(String),

    /// Image not published for the given version.
    #[error("Version {version} has no image named {image}")]
    UnknownImage {
        /// Release version.
        version: String,
        /// Requested image file name.
        image: String,
    },

    /// Custom layout violates its invariants.
    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    /// Toolchain missing or failed to install its core/libraries.
    #[error("Toolchain error: {0}")]
    Toolchain(String),

    /// Sketch compilation failed; carries the compiler output.
    #[error("Compile failed: {0}")]
    Compile(String),

    /// Upload tool failed; carries the tool output.
    #[error("Upload failed: {0}")]
    Upload(String),

    /// A flash precondition is not met.
    #[error("{0}")]
    NotReady(Unmet),

    /// Nothing is attached at the given port address.
    #[error("No serial device at {0}")]
    DeviceNotFound(String),
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => Self::Http {
                url: response
                    .get_url()
                    .to_string(),
                status,
            },
            ureq::Error::Transport(transport) => Self::Transport(transport.to_string()),
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Self::Io(e),
            other => Self::Archive(other.to_string()),
        }
    }
}
