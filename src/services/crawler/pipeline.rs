//! C4 — the ingestion pipeline sitting between a `Crawler` (C3) and the
//! index manager (C5). Applies the ordered exclusion-filter chain to each
//! discovered file, decodes its bytes, and writes accepted files to the
//! index in retried, size-bounded batches.

use crate::config::CrawlConfig;
use crate::error::CrawlError;
use crate::models::Repository;
use crate::services::crawler::ids::deterministic_file_id;
use crate::services::progress::ProgressTracker;
use crate::services::search::FileDocument;
use crate::services::search::IndexManager;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// A file as handed off by a `Crawler` variant, before any filtering.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub relative_path: String,
    pub project: String,
    pub version: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub directories_to_exclude: Vec<String>,
    pub files_to_exclude: Vec<String>,
    pub extensions_to_exclude: Vec<String>,
    pub max_file_size: u64,
    pub mime_types_to_exclude: Vec<String>,
    pub batch_size: usize,
    pub batch_bytes: u64,
    pub write_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            directories_to_exclude: [
                ".git", ".svn", ".hg", "node_modules", "target", "dist", "build", "vendor",
                "__pycache__", ".venv", ".idea", ".vscode",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            files_to_exclude: [
                "*.lock", "*.min.js", "*.min.css", "*.map", "package-lock.json", "Cargo.lock",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            extensions_to_exclude: [
                "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp", "woff", "woff2", "ttf",
                "eot", "exe", "dll", "so", "dylib", "o", "a", "class", "jar", "zip", "tar", "gz",
                "7z", "rar", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "bin", "dat",
                "db", "sqlite", "wasm",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            max_file_size: 10 * 1024 * 1024,
            mime_types_to_exclude: [
                "application/octet-stream",
                "application/zip",
                "application/pdf",
                "application/x-executable",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            batch_size: 25,
            batch_bytes: 16 * 1024 * 1024,
            write_retries: 3,
        }
    }
}

impl PipelineConfig {
    pub fn from_crawl_config(cfg: &CrawlConfig) -> Self {
        Self {
            max_file_size: cfg.max_file_size,
            batch_size: cfg.batch_size,
            batch_bytes: cfg.batch_bytes,
            write_retries: cfg.write_retries,
            ..Default::default()
        }
    }
}

/// Step 1-3: directory / glob / extension exclusion. Pure and order-sensitive
/// — a directory match short-circuits before the more expensive glob check.
pub fn is_path_excluded(relative_path: &str, cfg: &PipelineConfig) -> bool {
    let segments: Vec<&str> = relative_path.split('/').collect();
    if segments.iter().any(|seg| cfg.directories_to_exclude.iter().any(|d| d == seg)) {
        return true;
    }

    let file_name = segments.last().copied().unwrap_or(relative_path);
    if cfg.files_to_exclude.iter().any(|pattern| glob_match(pattern, file_name)) {
        return true;
    }

    if let Some(ext) = file_name.rsplit('.').next() {
        if ext != file_name && cfg.extensions_to_exclude.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            return true;
        }
    }

    false
}

/// Minimal `*`-only glob matcher — the only wildcard the filter patterns use.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == candidate;
    }
    let mut pos = 0usize;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !candidate[pos..].starts_with(part) {
                return false;
            }
            pos += part.len();
        } else if i == parts.len() - 1 {
            return candidate[pos..].ends_with(part);
        } else {
            match candidate[pos..].find(part) {
                Some(idx) => pos += idx + part.len(),
                None => return false,
            }
        }
    }
    true
}

/// Step 4: size ceiling.
pub fn is_too_large(byte_len: u64, cfg: &PipelineConfig) -> bool {
    byte_len > cfg.max_file_size
}

/// BOM markers recognized ahead of the binary sniff and the decode step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bom {
    Utf8,
    Utf16Le,
    Utf16Be,
}

fn detect_bom(bytes: &[u8]) -> Option<Bom> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        Some(Bom::Utf8)
    } else if bytes.starts_with(&[0xFF, 0xFE]) {
        Some(Bom::Utf16Le)
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        Some(Bom::Utf16Be)
    } else {
        None
    }
}

/// Step 5: binary sniff — a NUL byte in the first few KB is the same
/// heuristic the teacher uses post-hoc on decoded content, applied here
/// directly to bytes so it works before any UTF-8 decision is made. Checked
/// after the BOM: genuine UTF-16 text has a NUL byte roughly every other
/// position, which this heuristic alone would always misclassify as binary.
pub fn looks_binary(bytes: &[u8]) -> bool {
    if matches!(detect_bom(bytes), Some(Bom::Utf16Le) | Some(Bom::Utf16Be)) {
        return false;
    }
    let sample_len = bytes.len().min(8192);
    bytes[..sample_len].contains(&0)
}

/// Step 6: MIME-type exclusion via content/extension sniffing.
pub fn is_excluded_mime(relative_path: &str, cfg: &PipelineConfig) -> bool {
    let guess = mime_guess::from_path(relative_path);
    guess
        .first()
        .map(|m| cfg.mime_types_to_exclude.iter().any(|excluded| excluded == m.essence_str()))
        .unwrap_or(false)
}

/// Strips a recognized BOM and decodes accordingly — UTF-8 content is
/// decoded lossily as-is; UTF-16 content is reassembled into `u16` code
/// units per the BOM's endianness before lossy UTF-16 decoding. Never
/// rejects — binary content should already have been caught by
/// `looks_binary` upstream.
pub fn decode_lossy(bytes: &[u8]) -> String {
    match detect_bom(bytes) {
        Some(Bom::Utf8) => String::from_utf8_lossy(&bytes[3..]).into_owned(),
        Some(Bom::Utf16Le) => decode_utf16(&bytes[2..], u16::from_le_bytes),
        Some(Bom::Utf16Be) => decode_utf16(&bytes[2..], u16::from_be_bytes),
        None => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn decode_utf16(bytes: &[u8], from_bytes: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| from_bytes([c[0], c[1]])).collect();
    String::from_utf16_lossy(&units)
}

/// Runs the full ordered filter chain against one discovered file. `None`
/// means "drop it"; `Some(content)` means "ingest it".
pub fn apply_filters(file: &RawFile, cfg: &PipelineConfig) -> Option<String> {
    if is_path_excluded(&file.relative_path, cfg) {
        return None;
    }
    if is_too_large(file.content.len() as u64, cfg) {
        return None;
    }
    if looks_binary(&file.content) {
        return None;
    }
    if is_excluded_mime(&file.relative_path, cfg) {
        return None;
    }
    Some(decode_lossy(&file.content))
}

pub struct IngestStats {
    pub accepted: usize,
    pub dropped: usize,
    pub errors: Vec<String>,
}

/// Filters, decodes and batches files pulled from `rx`, writing accepted
/// batches to the index manager with bounded retry. `rx` is the consumer
/// side of C3's bounded channel: `recv().await` blocks whenever a crawler
/// variant is producing faster than this loop can filter/flush, which is
/// the back-pressure the channel exists to provide. Checks `cancel` between
/// files so a crawl can be stopped mid-ingest; dropping `rx` on return
/// signals the producer to stop sending.
#[allow(clippy::too_many_arguments)]
pub async fn ingest(
    repository: &Repository,
    mut rx: Receiver<RawFile>,
    cfg: &PipelineConfig,
    index: &IndexManager,
    cancel: &CancellationToken,
    progress: &ProgressTracker,
    repository_id: Uuid,
    discovered_total: &AtomicUsize,
) -> Result<IngestStats, CrawlError> {
    let mut stats = IngestStats { accepted: 0, dropped: 0, errors: Vec::new() };
    let mut batch: Vec<FileDocument> = Vec::new();
    let mut batch_bytes: u64 = 0;
    let mut processed = 0usize;

    while let Some(file) = rx.recv().await {
        if cancel.is_cancelled() {
            break;
        }
        processed += 1;

        let Some(content) = apply_filters(&file, cfg) else {
            stats.dropped += 1;
            continue;
        };

        let file_id = deterministic_file_id(repository, &file.project, &file.relative_path, &file.version);
        let extension =
            file.relative_path.rsplit('.').next().filter(|e| *e != file.relative_path).unwrap_or("").to_string();
        let file_name = file.relative_path.rsplit('/').next().unwrap_or(&file.relative_path).to_string();

        let doc = FileDocument {
            file_id,
            file_name,
            file_path: file.relative_path.clone(),
            content,
            repository: repository.name.clone(),
            project: file.project.clone(),
            version: file.version.clone(),
            extension,
        };

        batch_bytes += doc.content.len() as u64;
        batch.push(doc);

        if batch.len() >= cfg.batch_size || batch_bytes >= cfg.batch_bytes {
            flush_batch(index, repository, std::mem::take(&mut batch), cfg.write_retries, &mut stats).await?;
            batch_bytes = 0;
            progress.update_progress(repository_id, processed, discovered_hint(discovered_total), stats.accepted).await;
        }
    }

    if !batch.is_empty() {
        flush_batch(index, repository, batch, cfg.write_retries, &mut stats).await?;
    }
    progress.update_progress(repository_id, processed, discovered_hint(discovered_total), stats.accepted).await;

    Ok(stats)
}

/// `discovered_total` is only known once the producing `Crawler::discover`
/// call resolves, which races with this loop rather than preceding it — `0`
/// means "not yet known" rather than "repository is empty".
fn discovered_hint(discovered_total: &AtomicUsize) -> Option<usize> {
    match discovered_total.load(Ordering::Relaxed) {
        0 => None,
        n => Some(n),
    }
}

async fn flush_batch(
    index: &IndexManager,
    repository: &Repository,
    batch: Vec<FileDocument>,
    write_retries: u32,
    stats: &mut IngestStats,
) -> Result<(), CrawlError> {
    let count = batch.len();
    let mut attempt = 0u32;
    let mut delay = Duration::from_millis(200);

    loop {
        match tokio::time::timeout(Duration::from_secs(60), index.upsert_batch(repository.id, batch.clone())).await {
            Ok(Ok(())) => {
                stats.accepted += count;
                return Ok(());
            }
            Ok(Err(e)) => {
                attempt += 1;
                warn!("batch write failed (attempt {}/{}): {}", attempt, write_retries, e);
                if attempt >= write_retries {
                    return Err(CrawlError::IndexWrite(e.to_string()));
                }
            }
            Err(_) => {
                attempt += 1;
                warn!("batch write timed out (attempt {}/{})", attempt, write_retries);
                if attempt >= write_retries {
                    return Err(CrawlError::IndexWrite("batch write timed out after retries".into()));
                }
            }
        }
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(Duration::from_secs(5));
        debug!("retrying batch write");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_by_directory() {
        let cfg = PipelineConfig::default();
        assert!(is_path_excluded("node_modules/lodash/index.js", &cfg));
        assert!(is_path_excluded("src/.git/HEAD", &cfg));
        assert!(!is_path_excluded("src/main.rs", &cfg));
    }

    #[test]
    fn excludes_by_glob() {
        let cfg = PipelineConfig::default();
        assert!(is_path_excluded("app.min.js", &cfg));
        assert!(is_path_excluded("Cargo.lock", &cfg));
        assert!(!is_path_excluded("app.js", &cfg));
    }

    #[test]
    fn excludes_by_extension() {
        let cfg = PipelineConfig::default();
        assert!(is_path_excluded("logo.png", &cfg));
        assert!(!is_path_excluded("logo.svg.rs", &cfg));
    }

    #[test]
    fn detects_binary_via_nul_byte() {
        assert!(looks_binary(b"\x00\x01\x02binary"));
        assert!(!looks_binary(b"fn main() {}"));
    }

    #[test]
    fn strips_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"hello");
        assert_eq!(decode_lossy(&bytes), "hello");
    }

    #[test]
    fn utf16_content_is_not_mistaken_for_binary() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "hello".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert!(!looks_binary(&bytes));
    }

    #[test]
    fn decodes_utf16_le() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "hello".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_lossy(&bytes), "hello");
    }

    #[test]
    fn decodes_utf16_be() {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in "hello".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_lossy(&bytes), "hello");
    }

    #[test]
    fn glob_star_prefix_suffix() {
        assert!(glob_match("*.min.js", "app.min.js"));
        assert!(!glob_match("*.min.js", "app.js"));
        assert!(glob_match("package-lock.json", "package-lock.json"));
    }
}
