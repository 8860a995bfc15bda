//! PDF → one PNG per page, via poppler's `pdftoppm`.
//!
//! This is a standalone utility for getting flowchart images out of PDF
//! exports; the conversion pipeline never calls it. Failures are not
//! returned: they are logged with installation guidance and the caller gets
//! an empty list.
//!
//! Pages are rendered into a temporary directory inside the output
//! directory, then renamed to `page_001.png`, `page_002.png`, … in page
//! order. Rendering into a scratch directory keeps `pdftoppm`'s own naming
//! (which pads differently depending on the page count) out of the output.

use crate::error::{excerpt, FlowError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Matches the page number in `pdftoppm` output names (`page-7.png`, `page-007.png`).
static RE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"-(\d+)\.png$").unwrap());

/// Prefix handed to `pdftoppm` for the files it writes.
const RENDER_PREFIX: &str = "page";

#[cfg(windows)]
const RASTERIZER_BIN: &str = "pdftoppm.exe";
#[cfg(not(windows))]
const RASTERIZER_BIN: &str = "pdftoppm";

/// Options for [`extract_images_from_pdf`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfExtractOptions {
    /// Destination directory; created if absent. Default: `extracted_images`.
    pub output_dir: PathBuf,
    /// Render resolution. Default: 300, enough for small diagram labels.
    pub dpi: u32,
    /// Directory holding the poppler binaries. If None, the conventional
    /// install locations are probed, then `PATH` is used.
    pub rasterizer_dir: Option<PathBuf>,
}

impl Default for PdfExtractOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("extracted_images"),
            dpi: 300,
            rasterizer_dir: None,
        }
    }
}

/// Conventional poppler install locations for this platform.
pub fn default_rasterizer_candidates() -> Vec<PathBuf> {
    if cfg!(windows) {
        let mut dirs = vec![
            PathBuf::from(r"C:\Program Files\poppler\bin"),
            PathBuf::from(r"C:\Program Files (x86)\poppler\bin"),
            PathBuf::from(r"C:\poppler\bin"),
        ];
        if let Some(home) = std::env::var_os("USERPROFILE") {
            dirs.push(PathBuf::from(home).join(r"AppData\Local\poppler\bin"));
        }
        dirs
    } else {
        ["/usr/bin", "/usr/local/bin", "/opt/homebrew/bin", "/opt/local/bin"]
            .iter()
            .map(PathBuf::from)
            .collect()
    }
}

/// First candidate directory that actually holds the `pdftoppm` binary.
pub fn find_rasterizer_dir(candidates: &[PathBuf]) -> Option<PathBuf> {
    let found = candidates
        .iter()
        .find(|dir| dir.join(RASTERIZER_BIN).is_file())
        .cloned();
    match found {
        Some(ref dir) => info!("Found poppler at: {}", dir.display()),
        None => debug!("Poppler not found in common locations, using PATH"),
    }
    found
}

/// The `pdftoppm` to run: the explicit directory, else the first candidate
/// holding the binary, else the bare name for a `PATH` lookup.
fn rasterizer_program(options: &PdfExtractOptions, candidates: &[PathBuf]) -> PathBuf {
    let bin_dir = match options.rasterizer_dir {
        Some(ref dir) if dir.is_dir() => Some(dir.clone()),
        Some(ref dir) => {
            warn!(
                "Poppler directory '{}' does not exist, falling back to PATH",
                dir.display()
            );
            None
        }
        None => find_rasterizer_dir(candidates),
    };
    match bin_dir {
        Some(dir) => dir.join(RASTERIZER_BIN),
        None => PathBuf::from(RASTERIZER_BIN),
    }
}

/// Rasterise every page of `pdf_path`.
///
/// Returns the written image paths in page order, or an empty vector if
/// anything went wrong (the cause is logged).
pub async fn extract_images_from_pdf(pdf_path: &Path, options: &PdfExtractOptions) -> Vec<PathBuf> {
    info!("Converting PDF to images: {}", pdf_path.display());
    match try_extract(pdf_path, options, &default_rasterizer_candidates()).await {
        Ok(files) => {
            info!("Total images extracted: {}", files.len());
            files
        }
        Err(e) => {
            error!("Error extracting images from PDF: {}", e);
            Vec::new()
        }
    }
}

async fn try_extract(
    pdf_path: &Path,
    options: &PdfExtractOptions,
    candidates: &[PathBuf],
) -> Result<Vec<PathBuf>, FlowError> {
    if !tokio::fs::try_exists(pdf_path).await.unwrap_or(false) {
        return Err(FlowError::input_not_found(pdf_path, "PDF file"));
    }

    let out_dir = &options.output_dir;
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|source| FlowError::OutputWriteFailed {
            path: out_dir.clone(),
            source,
        })?;

    let program = rasterizer_program(options, candidates);

    let scratch = tempfile::Builder::new()
        .prefix(".pages-")
        .tempdir_in(out_dir)
        .map_err(|source| FlowError::OutputWriteFailed {
            path: out_dir.clone(),
            source,
        })?;

    debug!("Running {} at {} dpi", program.display(), options.dpi);
    let output = Command::new(&program)
        .arg("-png")
        .arg("-r")
        .arg(options.dpi.to_string())
        .arg(pdf_path)
        .arg(scratch.path().join(RENDER_PREFIX))
        .output()
        .await
        .map_err(|e| FlowError::RasterizerUnavailable {
            detail: format!("failed to run '{}': {}", program.display(), e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FlowError::RasterizerUnavailable {
            detail: format!(
                "'{}' exited with {}: {}",
                program.display(),
                output.status,
                excerpt(stderr.trim(), 500)
            ),
        });
    }

    collect_pages(scratch.path(), out_dir).await
}

/// Move rendered pages from `scratch` to `out_dir` as `page_NNN.png`, in page order.
async fn collect_pages(scratch: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, FlowError> {
    let read_err = |source: std::io::Error| FlowError::OutputWriteFailed {
        path: scratch.to_path_buf(),
        source,
    };

    let mut rendered: Vec<(u32, PathBuf)> = Vec::new();
    let mut entries = tokio::fs::read_dir(scratch).await.map_err(read_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let name = entry.file_name();
        let number = RE_PAGE_NUMBER
            .captures(&name.to_string_lossy())
            .and_then(|caps| caps[1].parse::<u32>().ok());
        if let Some(n) = number {
            rendered.push((n, entry.path()));
        }
    }
    rendered.sort_by_key(|(n, _)| *n);

    let mut files = Vec::with_capacity(rendered.len());
    for (i, (_, src)) in rendered.into_iter().enumerate() {
        let dest = out_dir.join(format!("page_{:03}.png", i + 1));
        tokio::fs::rename(&src, &dest)
            .await
            .map_err(|source| FlowError::OutputWriteFailed {
                path: dest.clone(),
                source,
            })?;
        info!("Extracted: {}", dest.display());
        files.push(dest);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = PdfExtractOptions::default();
        assert_eq!(opts.dpi, 300);
        assert_eq!(opts.output_dir, PathBuf::from("extracted_images"));
        assert!(opts.rasterizer_dir.is_none());
        assert!(!default_rasterizer_candidates().is_empty());
    }

    fn bin_dir_with_rasterizer() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(RASTERIZER_BIN), b"").unwrap();
        dir
    }

    #[test]
    fn first_candidate_holding_the_binary_wins() {
        let bare = tempfile::tempdir().unwrap();
        let a = bin_dir_with_rasterizer();
        let b = bin_dir_with_rasterizer();
        let candidates = vec![
            PathBuf::from("/no/such/poppler/bin"),
            bare.path().to_path_buf(),
            a.path().to_path_buf(),
            b.path().to_path_buf(),
        ];
        assert_eq!(find_rasterizer_dir(&candidates), Some(a.path().to_path_buf()));
        assert_eq!(find_rasterizer_dir(&candidates[..2]), None);
    }

    #[test]
    fn existing_dirs_without_binary_fall_back_to_path() {
        let bare = tempfile::tempdir().unwrap();
        let program = rasterizer_program(
            &PdfExtractOptions::default(),
            &[bare.path().to_path_buf()],
        );
        assert_eq!(program, PathBuf::from(RASTERIZER_BIN));
    }

    #[tokio::test]
    async fn missing_pdf_yields_empty_list() {
        let out = tempfile::tempdir().unwrap();
        let opts = PdfExtractOptions {
            output_dir: out.path().to_path_buf(),
            ..Default::default()
        };
        assert!(extract_images_from_pdf(Path::new("/no/such/file.pdf"), &opts)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn unavailable_rasterizer_yields_empty_list() {
        let work = tempfile::tempdir().unwrap();
        let pdf = work.path().join("chart.pdf");
        std::fs::write(&pdf, b"%PDF-1.4\n%%EOF\n").unwrap();
        let empty_bin = tempfile::tempdir().unwrap();
        let opts = PdfExtractOptions {
            output_dir: work.path().join("images"),
            dpi: 300,
            rasterizer_dir: Some(empty_bin.path().to_path_buf()),
        };
        assert!(extract_images_from_pdf(&pdf, &opts).await.is_empty());
        // the scratch directory is cleaned up
        let leftovers: Vec<_> = std::fs::read_dir(work.path().join("images"))
            .unwrap()
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn pages_are_renamed_in_numeric_order() {
        let scratch = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        for name in ["page-10.png", "page-2.png", "page-1.png", "notes.txt"] {
            std::fs::write(scratch.path().join(name), name).unwrap();
        }

        let files = collect_pages(scratch.path(), out.path()).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page_001.png", "page_002.png", "page_003.png"]);
        assert_eq!(std::fs::read_to_string(&files[0]).unwrap(), "page-1.png");
        assert_eq!(std::fs::read_to_string(&files[2]).unwrap(), "page-10.png");
    }

    #[tokio::test]
    async fn no_rendered_pages_is_empty() {
        let scratch = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        assert!(collect_pages(scratch.path(), out.path()).await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probed_rasterizer_renders_and_renames_pages() {
        use std::os::unix::fs::PermissionsExt;

        let work = tempfile::tempdir().unwrap();
        let pdf = work.path().join("deck.pdf");
        std::fs::write(&pdf, b"%PDF-1.4\n%%EOF\n").unwrap();

        // stand-in for pdftoppm: `-png -r <dpi> <pdf> <prefix>`
        let bare = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let stub = bin.path().join(RASTERIZER_BIN);
        std::fs::write(&stub, "#!/bin/sh\ntouch \"$5-2.png\" \"$5-1.png\"\n").unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let out = work.path().join("images");
        let opts = PdfExtractOptions {
            output_dir: out.clone(),
            ..Default::default()
        };
        let candidates = vec![bare.path().to_path_buf(), bin.path().to_path_buf()];
        let files = try_extract(&pdf, &opts, &candidates).await.unwrap();

        assert_eq!(files, vec![out.join("page_001.png"), out.join("page_002.png")]);
        let mut names: Vec<_> = std::fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["page_001.png", "page_002.png"]);
    }
}
