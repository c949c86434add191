//! # pdfium-auto
//!
//! Locate, download and cache [PDFium](https://pdfium.googlesource.com/pdfium/)
//! binaries for `pdfium-render`, driven entirely by explicit configuration.
//!
//! Nothing here reads or writes environment variables: the caller says where
//! to look and where to cache, and gets back the path that was bound.
//!
//! ## How it works
//!
//! [`PdfiumLocator::locate`] checks, in order:
//!
//! 1. The explicit search path, either the library file itself or a
//!    directory containing the platform library.
//! 2. The per-version cache directory.
//!
//! [`PdfiumLocator::ensure`] additionally downloads the matching `.tgz` from
//! [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries)
//! into the cache directory when the library is nowhere to be found and
//! downloads are allowed.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pdfium_auto::PdfiumLocator;
//!
//! let locator = PdfiumLocator::new()
//!     .search_path("./vendor/pdfium")
//!     .allow_download(true);
//! let path = locator
//!     .ensure(Some(&|downloaded, total| {
//!         if let Some(t) = total {
//!             eprint!("\rDownloading PDFium: {}/{} bytes", downloaded, t);
//!         }
//!     }))
//!     .expect("pdfium unavailable");
//! let pdfium = pdfium_auto::bind_pdfium_from_path(&path).expect("bind failed");
//! ```
//!
//! ## Platform support
//!
//! | OS      | Arch    | Library               |
//! |---------|---------|-----------------------|
//! | macOS   | arm64   | `libpdfium.dylib`     |
//! | macOS   | x86_64  | `libpdfium.dylib`     |
//! | Linux   | x86_64  | `libpdfium.so`        |
//! | Linux   | aarch64 | `libpdfium.so`        |
//! | Windows | x86_64  | `pdfium.dll`          |
//! | Windows | aarch64 | `pdfium.dll`          |
//! | Windows | x86     | `pdfium.dll`          |

use std::io::Read;
use std::path::{Path, PathBuf};

use pdfium_render::prelude::Pdfium;
use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// The pdfium-binaries release tag used for downloads.
///
/// Maps to [`bblanchon/pdfium-binaries chromium/7690`](https://github.com/bblanchon/pdfium-binaries/releases/tag/chromium%2F7690).
pub const PDFIUM_VERSION: &str = "7690";

/// GitHub release base URL.
const BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

/// Byte-progress callback: `(downloaded, total_if_known)`.
pub type DownloadProgress<'a> = &'a dyn Fn(u64, Option<u64>);

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by pdfium-auto operations.
#[derive(Error, Debug)]
pub enum PdfiumAutoError {
    /// The current OS/architecture combination is not supported.
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    /// The library is not in the search path or the cache, and downloading
    /// is disabled.
    #[error("PDFium library not found (searched: {})", join_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },

    /// Could not create or navigate the local cache directory.
    #[error("Cache directory error: {0}")]
    CacheDir(#[source] std::io::Error),

    /// Network download failed.
    #[error("Download failed: {0}")]
    Download(String),

    /// gzip/tar extraction failed.
    #[error("Archive extraction failed: {0}")]
    Extract(String),

    /// `libloading` / `pdfium-render` could not load the library.
    #[error("Failed to bind PDFium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Internal: platform metadata ──────────────────────────────────────────────

struct PlatformInfo {
    /// Asset filename in the GitHub release, e.g. `pdfium-mac-arm64.tgz`.
    archive_name: &'static str,
    /// Relative path inside the archive, e.g. `lib/libpdfium.dylib`.
    lib_path_in_archive: &'static str,
    /// Filename to write on disk, e.g. `libpdfium.dylib`.
    lib_name: &'static str,
}

fn detect_platform() -> Result<PlatformInfo, PdfiumAutoError> {
    platform_for(std::env::consts::OS, std::env::consts::ARCH)
}

fn platform_for(os: &str, arch: &str) -> Result<PlatformInfo, PdfiumAutoError> {
    let (archive_name, lib_path_in_archive, lib_name) = match (os, arch) {
        ("macos", "aarch64") => ("pdfium-mac-arm64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
        ("macos", "x86_64") => ("pdfium-mac-x64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
        ("linux", "x86_64") => ("pdfium-linux-x64.tgz", "lib/libpdfium.so", "libpdfium.so"),
        ("linux", "aarch64") => ("pdfium-linux-arm64.tgz", "lib/libpdfium.so", "libpdfium.so"),
        ("windows", "x86_64") => ("pdfium-win-x64.tgz", "bin/pdfium.dll", "pdfium.dll"),
        ("windows", "aarch64") => ("pdfium-win-arm64.tgz", "bin/pdfium.dll", "pdfium.dll"),
        ("windows", "x86") => ("pdfium-win-x86.tgz", "bin/pdfium.dll", "pdfium.dll"),
        (os, arch) => {
            return Err(PdfiumAutoError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            })
        }
    };
    Ok(PlatformInfo {
        archive_name,
        lib_path_in_archive,
        lib_name,
    })
}

/// File name of the pdfium library on this platform, e.g. `libpdfium.so`.
pub fn platform_library_name() -> Result<&'static str, PdfiumAutoError> {
    detect_platform().map(|info| info.lib_name)
}

// ── Cache directory resolution ───────────────────────────────────────────────

/// Returns the default per-version cache directory for `app`.
///
/// Default locations:
/// - **macOS**: `~/Library/Caches/{app}/pdfium-{VERSION}/`
/// - **Linux**: `~/.cache/{app}/pdfium-{VERSION}/`
/// - **Windows**: `%LOCALAPPDATA%\{app}\pdfium-{VERSION}\`
pub fn default_cache_dir(app: &str) -> PathBuf {
    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    base.join(app).join(format!("pdfium-{PDFIUM_VERSION}"))
}

// ── Locator ──────────────────────────────────────────────────────────────────

/// Where to look for PDFium, and whether fetching it is allowed.
#[derive(Debug, Clone)]
pub struct PdfiumLocator {
    search_path: Option<PathBuf>,
    cache_dir: PathBuf,
    allow_download: bool,
}

impl Default for PdfiumLocator {
    fn default() -> Self {
        Self {
            search_path: None,
            cache_dir: default_cache_dir("pcad2docx"),
            allow_download: false,
        }
    }
}

impl PdfiumLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library file, or a directory holding the platform library.
    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn allow_download(mut self, allow: bool) -> Self {
        self.allow_download = allow;
        self
    }

    /// Path of the library in the cache directory (may not exist yet).
    pub fn cached_library_path(&self) -> Result<PathBuf, PdfiumAutoError> {
        Ok(self.cache_dir.join(detect_platform()?.lib_name))
    }

    /// Find an existing library without touching the network.
    pub fn locate(&self) -> Result<PathBuf, PdfiumAutoError> {
        let info = detect_platform()?;
        let candidates = self.candidates(info.lib_name);
        candidates
            .iter()
            .find(|p| p.is_file())
            .cloned()
            .ok_or(PdfiumAutoError::NotFound {
                searched: candidates,
            })
    }

    /// Whether [`locate`](Self::locate) would succeed.
    pub fn is_available(&self) -> bool {
        self.locate().is_ok()
    }

    /// Find the library, downloading it into the cache directory when it is
    /// missing and downloads are allowed.
    ///
    /// `on_progress` receives `(bytes_downloaded, total_size_option)` during
    /// the download.
    pub fn ensure(&self, on_progress: Option<DownloadProgress<'_>>) -> Result<PathBuf, PdfiumAutoError> {
        match self.locate() {
            Ok(path) => Ok(path),
            Err(PdfiumAutoError::NotFound { .. }) if self.allow_download => {
                self.download(on_progress)
            }
            Err(e) => Err(e),
        }
    }

    /// [`ensure`](Self::ensure), then bind.
    pub fn bind(&self, on_progress: Option<DownloadProgress<'_>>) -> Result<Pdfium, PdfiumAutoError> {
        let lib_path = self.ensure(on_progress)?;
        bind_pdfium_from_path(&lib_path)
    }

    fn candidates(&self, lib_name: &str) -> Vec<PathBuf> {
        let mut out = Vec::new();
        if let Some(ref p) = self.search_path {
            if p.is_dir() {
                out.push(p.join(lib_name));
            } else {
                out.push(p.clone());
            }
        }
        out.push(self.cache_dir.join(lib_name));
        out
    }

    fn download(&self, on_progress: Option<DownloadProgress<'_>>) -> Result<PathBuf, PdfiumAutoError> {
        let info = detect_platform()?;
        let lib_path = self.cache_dir.join(info.lib_name);
        let url = format!(
            "{}/chromium%2F{}/{}",
            BASE_URL, PDFIUM_VERSION, info.archive_name
        );

        std::fs::create_dir_all(&self.cache_dir).map_err(PdfiumAutoError::CacheDir)?;

        let archive_bytes = download_bytes(&url, on_progress)?;
        extract_library(&archive_bytes, info.lib_path_in_archive, &lib_path)?;

        Ok(lib_path)
    }
}

/// Binds to a PDFium library at an explicit `path`.
///
/// Does not interact with the download / cache layer.
pub fn bind_pdfium_from_path(path: &Path) -> Result<Pdfium, PdfiumAutoError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| PdfiumAutoError::Bind {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

// ── Internal helpers ─────────────────────────────────────────────────────────

/// Streams a URL into a `Vec<u8>`, calling `on_progress` every 64 KiB.
fn download_bytes(
    url: &str,
    on_progress: Option<DownloadProgress<'_>>,
) -> Result<Vec<u8>, PdfiumAutoError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("pdfium-auto/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| PdfiumAutoError::Download(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| PdfiumAutoError::Download(format!("GET {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(PdfiumAutoError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let total = response.content_length();
    let capacity = total.unwrap_or(35 * 1024 * 1024) as usize;
    let mut buf = Vec::with_capacity(capacity);

    let mut stream = response;
    let mut chunk = vec![0u8; 64 * 1024]; // 64 KiB
    let mut downloaded: u64 = 0;

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                downloaded += n as u64;
                if let Some(cb) = on_progress {
                    cb(downloaded, total);
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(PdfiumAutoError::Download(format!("Read error: {e}")));
            }
        }
    }

    Ok(buf)
}

/// Extracts a single file from a gzipped tar archive into `dest_path`.
///
/// The file is unpacked next to `dest_path` first and renamed into place,
/// so an interrupted extraction never leaves a truncated library behind.
fn extract_library(
    archive_bytes: &[u8],
    lib_path_in_archive: &str,
    dest_path: &Path,
) -> Result<(), PdfiumAutoError> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let gz = GzDecoder::new(archive_bytes);
    let mut archive = Archive::new(gz);

    for entry in archive
        .entries()
        .map_err(|e| PdfiumAutoError::Extract(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| PdfiumAutoError::Extract(e.to_string()))?;
        let entry_path = entry
            .path()
            .map_err(|e| PdfiumAutoError::Extract(e.to_string()))?;

        if entry_path.to_string_lossy() == lib_path_in_archive {
            let partial = dest_path.with_extension("partial");
            entry
                .unpack(&partial)
                .map_err(|e| PdfiumAutoError::Extract(format!("Unpack failed: {e}")))?;
            std::fs::rename(&partial, dest_path).map_err(PdfiumAutoError::CacheDir)?;
            return Ok(());
        }
    }

    Err(PdfiumAutoError::Extract(format!(
        "Library '{}' not found in archive",
        lib_path_in_archive
    )))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_table_covers_release_assets() {
        let info = platform_for("linux", "x86_64").unwrap();
        assert_eq!(info.archive_name, "pdfium-linux-x64.tgz");
        assert_eq!(info.lib_name, "libpdfium.so");
        let info = platform_for("windows", "x86").unwrap();
        assert_eq!(info.lib_path_in_archive, "bin/pdfium.dll");
        assert!(matches!(
            platform_for("plan9", "mips"),
            Err(PdfiumAutoError::UnsupportedPlatform { .. })
        ));
    }

    #[test]
    fn cache_dir_is_versioned_per_app() {
        let d = default_cache_dir("pcad2docx");
        assert_eq!(d, default_cache_dir("pcad2docx"));
        assert!(d.to_string_lossy().contains("pcad2docx"));
        assert!(d.ends_with(format!("pdfium-{PDFIUM_VERSION}")));
    }

    #[test]
    fn locate_prefers_search_dir_over_cache() {
        let Ok(name) = platform_library_name() else {
            return;
        };
        let search = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        std::fs::write(search.path().join(name), b"lib").unwrap();
        std::fs::write(cache.path().join(name), b"lib").unwrap();

        let locator = PdfiumLocator::new()
            .search_path(search.path())
            .cache_dir(cache.path());
        assert_eq!(locator.locate().unwrap(), search.path().join(name));

        let cache_only = PdfiumLocator::new().cache_dir(cache.path());
        assert_eq!(cache_only.locate().unwrap(), cache.path().join(name));
    }

    #[test]
    fn missing_library_without_download_is_not_found() {
        if platform_library_name().is_err() {
            return;
        }
        let empty = tempfile::tempdir().unwrap();
        let locator = PdfiumLocator::new()
            .search_path(empty.path().join("nope.so"))
            .cache_dir(empty.path());
        match locator.ensure(None) {
            Err(PdfiumAutoError::NotFound { searched }) => assert_eq!(searched.len(), 2),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn extract_picks_the_library_entry() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
        for (name, data) in [("include/fpdfview.h", &b"header"[..]), ("lib/libpdfium.so", &b"ELF"[..])] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, data).unwrap();
        }
        let archive = builder.into_inner().unwrap().finish().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("libpdfium.so");
        extract_library(&archive, "lib/libpdfium.so", &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"ELF");

        let err = extract_library(&archive, "bin/pdfium.dll", &dest).unwrap_err();
        assert!(matches!(err, PdfiumAutoError::Extract(_)));
    }
}
