//! End-to-end tests of the flash pipeline against scripted services.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ledflash::bootloader::IN_SYNC_RESPONSE;
use ledflash::{
    BootloaderDetector, BootloaderVariant, CustomLayout, DetectTiming, Error, FlashSelection,
    Fetcher, Flasher, Port, PortOpener, Result, SerialConfig, Session, Toolchain, Unmet,
    VersionCatalog,
};

const PORT: &str = "/dev/ttyUSB0";

// ---------------------------------------------------------------------------
// Scripted services
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FetchLog {
    downloads: Vec<String>,
    extracts: usize,
}

#[derive(Clone, Default)]
struct FakeFetcher {
    log: Arc<Mutex<FetchLog>>,
    fail_download: bool,
    fail_extract: bool,
    omit_sketch: bool,
}

impl Fetcher for FakeFetcher {
    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .downloads
            .push(url.to_string());
        if self.fail_download {
            return Err(Error::Http {
                url: url.to_string(),
                status: 404,
            });
        }
        fs::write(dest, b":00000001FF\n")?;
        Ok(())
    }

    fn extract_archive(&self, _archive: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
        self.log.lock().unwrap().extracts += 1;
        if self.fail_extract {
            return Err(Error::UnsafeArchivePath("../evil".into()));
        }
        let top = dest_dir.join("LEDController-1.2.0");
        fs::create_dir_all(&top)?;
        if self.omit_sketch {
            let readme = top.join("README.md");
            fs::write(&readme, b"# LEDController\n")?;
            return Ok(vec![top, readme]);
        }
        let sketch = top.join("LEDController.ino");
        fs::write(&sketch, b"void setup() {}\nvoid loop() {}\n")?;
        Ok(vec![top, sketch])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Upload {
    board: String,
    port: String,
    image: PathBuf,
}

#[derive(Default)]
struct ToolLog {
    compiles: Vec<(String, PathBuf)>,
    uploads: Vec<Upload>,
}

#[derive(Clone, Default)]
struct FakeToolchain {
    log: Arc<Mutex<ToolLog>>,
    fail_compile: bool,
    fail_upload: bool,
}

impl Toolchain for FakeToolchain {
    fn install_core(&self) -> Result<()> {
        Ok(())
    }

    fn install_libraries(&self) -> Result<()> {
        Ok(())
    }

    fn compile(&self, board: &str, sketch: &Path, export_dir: &Path) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .compiles
            .push((board.to_string(), sketch.to_path_buf()));
        if self.fail_compile {
            return Err(Error::Compile("layout.h:5: error: expected ';'".into()));
        }
        let name = sketch
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        fs::create_dir_all(export_dir)?;
        fs::write(export_dir.join(format!("{name}.ino.hex")), b":00000001FF\n")?;
        Ok(())
    }

    fn upload(&self, board: &str, port: &str, image: &Path) -> Result<()> {
        self.log.lock().unwrap().uploads.push(Upload {
            board: board.to_string(),
            port: port.to_string(),
            image: image.to_path_buf(),
        });
        if self.fail_upload {
            return Err(Error::Upload("avrdude: stk500_recv(): programmer is not responding".into()));
        }
        Ok(())
    }
}

/// A board whose bootloader answers the sync command at one baud rate.
struct BoardPort {
    answers: bool,
    pending: VecDeque<u8>,
}

impl Read for BoardPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "timeout"));
        }
        let n = buf.len().min(self.pending.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.pending.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for BoardPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.answers {
            self.pending.extend(IN_SYNC_RESPONSE);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for BoardPort {
    fn clear_input(&mut self) -> Result<()> {
        self.pending.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        PORT
    }

    fn set_dtr(&mut self, _level: bool) -> Result<()> {
        Ok(())
    }

    fn set_rts(&mut self, _level: bool) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct Board {
    variant: BootloaderVariant,
    unplugged: bool,
}

impl PortOpener for Board {
    type Port = BoardPort;

    fn open(&self, config: &SerialConfig) -> Result<BoardPort> {
        if self.unplugged {
            return Err(Error::DeviceNotFound(config.port_name.clone()));
        }
        Ok(BoardPort {
            answers: config.baud_rate == self.variant.baud_rate(),
            pending: VecDeque::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    _dir: tempfile::TempDir,
    session: Arc<Session>,
    statuses: Arc<Mutex<Vec<String>>>,
    fetches: Arc<Mutex<FetchLog>>,
    tools: Arc<Mutex<ToolLog>>,
    flasher: Flasher<FakeToolchain, FakeFetcher, Board>,
}

impl Harness {
    fn new(toolchain: FakeToolchain, fetcher: FakeFetcher, variant: BootloaderVariant) -> Self {
        Self::with_board(
            toolchain,
            fetcher,
            Board {
                variant,
                unplugged: false,
            },
        )
    }

    fn with_board(toolchain: FakeToolchain, fetcher: FakeFetcher, board: Board) -> Self {
        let _ = env_logger::builder()
            .is_test(true)
            .try_init();

        let dir = tempfile::tempdir().unwrap();
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&statuses);
        let session = Arc::new(
            Session::new(
                dir.path().join("work"),
                Arc::new(move |text: &str| sink.lock().unwrap().push(text.to_string())),
            )
            .unwrap(),
        );
        session.ready().set_port_selected(true);
        session.prepare(&toolchain).unwrap();
        statuses.lock().unwrap().clear();

        let mut catalog = VersionCatalog::default();
        catalog.insert("v1.2.0", "radian.hex", "http://x/radian.hex");

        let fetches = Arc::clone(&fetcher.log);
        let tools = Arc::clone(&toolchain.log);
        let detector = BootloaderDetector::new(board).with_timing(DetectTiming::immediate());
        let flasher = Flasher::new(
            Arc::clone(&session),
            Arc::new(catalog),
            toolchain,
            fetcher,
            detector,
        );

        Self {
            _dir: dir,
            session,
            statuses,
            fetches,
            tools,
            flasher,
        }
    }

    fn ok() -> Self {
        Self::new(
            FakeToolchain::default(),
            FakeFetcher::default(),
            BootloaderVariant::Current,
        )
    }

    fn last_status(&self) -> Option<String> {
        self.statuses.lock().unwrap().last().cloned()
    }

    fn not_flashing(&self) -> bool {
        self.session.ready().snapshot().not_flashing
    }
}

fn prebuilt(version: &str, image: &str) -> FlashSelection {
    FlashSelection::Prebuilt {
        version: version.into(),
        image: image.into(),
    }
}

fn custom(layout: CustomLayout) -> FlashSelection {
    FlashSelection::Custom {
        version: "v1.2.0".into(),
        layout,
    }
}

// ---------------------------------------------------------------------------
// Prebuilt images
// ---------------------------------------------------------------------------

#[test]
fn test_prebuilt_flash_end_to_end() {
    let h = Harness::ok();

    h.flasher
        .flash(&prebuilt("v1.2.0", "radian.hex"), PORT)
        .unwrap();

    let cached = h
        .session
        .work_dir()
        .join("hex/v1.2.0/radian.hex");
    assert!(cached.is_file());
    assert_eq!(
        h.fetches.lock().unwrap().downloads,
        vec!["http://x/radian.hex".to_string()]
    );
    assert_eq!(
        h.tools.lock().unwrap().uploads,
        vec![Upload {
            board: BootloaderVariant::Current.board_id().into(),
            port: PORT.into(),
            image: cached,
        }]
    );
    assert_eq!(
        h.statuses.lock().unwrap().as_slice(),
        ["Downloading radian.hex", "Flashing radian.hex...", "Done!"]
    );
    assert!(h.not_flashing());
}

#[test]
fn test_second_flash_reuses_cached_image() {
    let h = Harness::ok();
    let selection = prebuilt("v1.2.0", "radian.hex");

    h.flasher.flash(&selection, PORT).unwrap();
    h.flasher.flash(&selection, PORT).unwrap();

    assert_eq!(h.fetches.lock().unwrap().downloads.len(), 1);
    assert_eq!(h.tools.lock().unwrap().uploads.len(), 2);
    assert_eq!(h.last_status().as_deref(), Some("Done!"));
}

#[test]
fn test_legacy_bootloader_uploads_with_legacy_board() {
    let h = Harness::new(
        FakeToolchain::default(),
        FakeFetcher::default(),
        BootloaderVariant::Legacy,
    );

    h.flasher
        .flash(&prebuilt("v1.2.0", "radian.hex"), PORT)
        .unwrap();

    let tools = h.tools.lock().unwrap();
    assert_eq!(tools.uploads[0].board, BootloaderVariant::Legacy.board_id());
}

#[test]
fn test_unknown_version_and_image() {
    let h = Harness::ok();

    let err = h
        .flasher
        .flash(&prebuilt("v9.9.9", "radian.hex"), PORT)
        .unwrap_err();
    assert!(matches!(err, Error::UnknownVersion(v) if v == "v9.9.9"));

    let err = h
        .flasher
        .flash(&prebuilt("v1.2.0", "other.hex"), PORT)
        .unwrap_err();
    assert!(matches!(err, Error::UnknownImage { .. }));

    assert!(h.fetches.lock().unwrap().downloads.is_empty());
    assert!(h.tools.lock().unwrap().uploads.is_empty());
    assert!(h.not_flashing());
}

// ---------------------------------------------------------------------------
// Readiness
// ---------------------------------------------------------------------------

#[test]
fn test_flash_refused_without_port() {
    let h = Harness::ok();
    h.session.ready().set_port_selected(false);

    let err = h
        .flasher
        .flash(&prebuilt("v1.2.0", "radian.hex"), PORT)
        .unwrap_err();

    assert!(matches!(err, Error::NotReady(Unmet::PortSelected)));
    assert_eq!(h.last_status().as_deref(), Some("No port selected"));
    assert!(h.fetches.lock().unwrap().downloads.is_empty());
    assert!(h.not_flashing());
}

#[test]
fn test_flash_refused_while_another_runs() {
    let h = Harness::ok();
    let slot = h.session.ready().try_begin_flash().unwrap();

    let err = h
        .flasher
        .flash(&prebuilt("v1.2.0", "radian.hex"), PORT)
        .unwrap_err();
    assert!(matches!(err, Error::NotReady(Unmet::NotFlashing)));
    assert_eq!(h.last_status().as_deref(), Some("Flash already in progress"));

    drop(slot);
    assert!(
        h.flasher
            .flash(&prebuilt("v1.2.0", "radian.hex"), PORT)
            .is_ok()
    );
}

// ---------------------------------------------------------------------------
// Failures release the flash slot
// ---------------------------------------------------------------------------

#[test]
fn test_download_failure_releases_slot() {
    let h = Harness::new(
        FakeToolchain::default(),
        FakeFetcher {
            fail_download: true,
            ..FakeFetcher::default()
        },
        BootloaderVariant::Current,
    );

    let err = h
        .flasher
        .flash(&prebuilt("v1.2.0", "radian.hex"), PORT)
        .unwrap_err();

    assert!(matches!(err, Error::Http { status: 404, .. }));
    assert_eq!(h.last_status(), Some(err.to_string()));
    assert!(h.tools.lock().unwrap().uploads.is_empty());
    assert!(h.not_flashing());
}

#[test]
fn test_extraction_failure_releases_slot() {
    let h = Harness::new(
        FakeToolchain::default(),
        FakeFetcher {
            fail_extract: true,
            ..FakeFetcher::default()
        },
        BootloaderVariant::Current,
    );

    let err = h
        .flasher
        .flash(&custom(CustomLayout::default()), PORT)
        .unwrap_err();

    assert!(matches!(err, Error::UnsafeArchivePath(_)));
    assert!(h.tools.lock().unwrap().compiles.is_empty());
    assert!(h.not_flashing());
}

#[test]
fn test_compile_failure_releases_slot() {
    let h = Harness::new(
        FakeToolchain {
            fail_compile: true,
            ..FakeToolchain::default()
        },
        FakeFetcher::default(),
        BootloaderVariant::Current,
    );

    let err = h
        .flasher
        .flash(&custom(CustomLayout::default()), PORT)
        .unwrap_err();

    assert!(matches!(err, Error::Compile(_)));
    assert_eq!(
        h.last_status().as_deref(),
        Some("Compile failed: layout.h:5: error: expected ';'")
    );
    assert!(h.tools.lock().unwrap().uploads.is_empty());
    assert!(h.not_flashing());
}

#[test]
fn test_upload_failure_releases_slot() {
    let h = Harness::new(
        FakeToolchain {
            fail_upload: true,
            ..FakeToolchain::default()
        },
        FakeFetcher::default(),
        BootloaderVariant::Current,
    );

    let err = h
        .flasher
        .flash(&prebuilt("v1.2.0", "radian.hex"), PORT)
        .unwrap_err();

    assert!(matches!(err, Error::Upload(_)));
    assert_ne!(h.last_status().as_deref(), Some("Done!"));
    assert!(h.not_flashing());
}

#[test]
fn test_board_unplugged_before_detection_releases_slot() {
    let h = Harness::with_board(
        FakeToolchain::default(),
        FakeFetcher::default(),
        Board {
            variant: BootloaderVariant::Current,
            unplugged: true,
        },
    );

    let err = h
        .flasher
        .flash(&prebuilt("v1.2.0", "radian.hex"), PORT)
        .unwrap_err();

    assert!(matches!(&err, Error::DeviceNotFound(port) if port == PORT));
    assert_eq!(h.last_status(), Some(err.to_string()));
    assert!(h.tools.lock().unwrap().uploads.is_empty());
    assert!(h.not_flashing());

    // The downloaded image stays cached for the next attempt.
    assert!(
        h.session
            .work_dir()
            .join("hex/v1.2.0/radian.hex")
            .is_file()
    );
}

#[test]
fn test_source_archive_without_sketch_is_rejected() {
    let h = Harness::new(
        FakeToolchain::default(),
        FakeFetcher {
            omit_sketch: true,
            ..FakeFetcher::default()
        },
        BootloaderVariant::Current,
    );

    let err = h
        .flasher
        .flash(&custom(CustomLayout::default()), PORT)
        .unwrap_err();

    assert!(matches!(&err, Error::Archive(msg) if msg.contains("LEDController.ino")));
    assert!(!h.session.work_dir().join("src/v1.2.0").exists());
    assert!(!h.session.work_dir().join("src/v1.2.0.zip").exists());
    assert!(h.tools.lock().unwrap().compiles.is_empty());
    assert!(h.not_flashing());

    // Nothing was cached, so the next attempt downloads again.
    let _ = h.flasher.flash(&custom(CustomLayout::default()), PORT);
    assert_eq!(h.fetches.lock().unwrap().downloads.len(), 2);
}

// ---------------------------------------------------------------------------
// Custom layouts
// ---------------------------------------------------------------------------

#[test]
fn test_custom_flash_end_to_end() {
    let h = Harness::ok();

    h.flasher
        .flash(&custom(CustomLayout::default()), PORT)
        .unwrap();

    let sketch_dir = h.session.work_dir().join("src/v1.2.0");
    assert!(sketch_dir.join("v1.2.0.ino").is_file());
    assert!(!sketch_dir.join("LEDController.ino").exists());

    let header = fs::read_to_string(sketch_dir.join("layout.h")).unwrap();
    assert_eq!(header, CustomLayout::default().render());

    {
        let fetches = h.fetches.lock().unwrap();
        assert_eq!(
            fetches.downloads,
            vec!["https://github.com/wingnut-tech/LEDController/archive/refs/tags/v1.2.0.zip".to_string()]
        );
        assert_eq!(fetches.extracts, 1);
    }

    let tools = h.tools.lock().unwrap();
    assert_eq!(
        tools.compiles,
        vec![(
            BootloaderVariant::Current.board_id().to_string(),
            sketch_dir.clone()
        )]
    );
    assert_eq!(tools.uploads[0].image, sketch_dir.join("build/v1.2.0.ino.hex"));
    assert_eq!(
        h.statuses.lock().unwrap().as_slice(),
        [
            "Downloading v1.2.0",
            "Compiling custom v1.2.0 layout...",
            "Flashing custom v1.2.0 layout...",
            "Done!",
        ]
    );
}

#[test]
fn test_custom_flash_reuses_source_tree() {
    let h = Harness::ok();

    h.flasher
        .flash(&custom(CustomLayout::default()), PORT)
        .unwrap();
    let second = CustomLayout {
        wing_leds: 40,
        ..CustomLayout::default()
    };
    h.flasher.flash(&custom(second), PORT).unwrap();

    assert_eq!(h.fetches.lock().unwrap().downloads.len(), 1);
    let header = fs::read_to_string(h.session.work_dir().join("src/v1.2.0/layout.h")).unwrap();
    assert!(header.contains("#define WING_LEDS 40 "));
}

#[test]
fn test_invalid_layout_rejected_before_any_work() {
    let h = Harness::ok();
    let layout = CustomLayout {
        wing_leds: 19,
        wing_nav_leds: 25,
        ..CustomLayout::default()
    };

    let err = h
        .flasher
        .flash(&custom(layout), PORT)
        .unwrap_err();

    assert!(matches!(err, Error::InvalidLayout(_)));
    assert!(h.fetches.lock().unwrap().downloads.is_empty());
    assert!(h.tools.lock().unwrap().compiles.is_empty());
    assert!(h.not_flashing());
}
