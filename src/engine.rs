//! Binding to the pdfium dynamic library.
//!
//! pdfium is loaded at runtime. Locations are tried in order:
//!
//! 1. `PDFIUM_LIB_PATH`, when it names an existing file
//! 2. the platform library name next to the running executable
//! 3. the platform library name in the working directory
//! 4. the system library search path
//!
//! Bind once per process and share the [`Pdfium`] handle; the layout reader
//! and the window renderer both borrow it.

use crate::error::EnvelopeError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit pdfium library file.
pub const LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Bind to the first pdfium library found.
pub fn bind_pdfium() -> Result<Pdfium, EnvelopeError> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf));
    let env_path = std::env::var_os(LIB_PATH_ENV).map(PathBuf::from);

    for path in candidate_paths(env_path, exe_dir) {
        if !path.is_file() {
            debug!("No pdfium library at {}", path.display());
            continue;
        }
        match bind_pdfium_from_path(&path) {
            Ok(pdfium) => {
                info!("Bound pdfium from {}", path.display());
                return Ok(pdfium);
            }
            Err(e) => warn!("{}", e),
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map(|pdfium| {
            info!("Bound system pdfium library");
            pdfium
        })
        .map_err(|e| EnvelopeError::PdfiumBindingFailed(format!("system library: {}", e)))
}

/// Bind to the pdfium library at an explicit `path`.
pub fn bind_pdfium_from_path(path: &Path) -> Result<Pdfium, EnvelopeError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| EnvelopeError::PdfiumBindingFailed(format!("{}: {}", path.display(), e)))
}

/// Library files to try before the system search path, in order.
pub fn candidate_paths(env_path: Option<PathBuf>, exe_dir: Option<PathBuf>) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(3);
    if let Some(p) = env_path.filter(|p| !p.as_os_str().is_empty()) {
        paths.push(p);
    }
    if let Some(dir) = exe_dir {
        paths.push(Pdfium::pdfium_platform_library_name_at_path(&dir));
    }
    let cwd = Pdfium::pdfium_platform_library_name_at_path("./");
    if !paths.contains(&cwd) {
        paths.push(cwd);
    }
    paths
}
