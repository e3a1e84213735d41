use crate::adapter::language_for_path;
use crate::language::Language;
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub size: u64,
    pub language: Language,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub no_ignore: bool,
    /// Files larger than this are skipped; 0 disables the limit.
    pub max_file_bytes: u64,
    /// Restrict the scan to these languages; `None` keeps all.
    pub languages: Option<Vec<Language>>,
}

impl ScanOptions {
    pub fn new(no_ignore: bool) -> Self {
        Self {
            no_ignore,
            ..Self::default()
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            no_ignore: false,
            max_file_bytes: crate::config::get().max_file_bytes,
            languages: None,
        }
    }
}

pub fn scan_repo(repo_root: &Path) -> Result<Vec<ScannedFile>> {
    scan_repo_with_options(repo_root, &ScanOptions::default())
}

pub fn scan_repo_with_options(repo_root: &Path, options: &ScanOptions) -> Result<Vec<ScannedFile>> {
    let mut files = walk(repo_root, repo_root, options)?;
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

/// Scan only `paths` (files or directories under `repo_root`). An empty list
/// scans the whole repository.
pub fn scan_paths(
    repo_root: &Path,
    paths: &[PathBuf],
    options: &ScanOptions,
) -> Result<Vec<ScannedFile>> {
    if paths.is_empty() {
        return scan_repo_with_options(repo_root, options);
    }
    let mut files = Vec::new();
    for path in paths {
        let path = if path.is_absolute() {
            path.clone()
        } else {
            repo_root.join(path)
        };
        if path.is_dir() {
            files.extend(walk(repo_root, &path, options)?);
        } else if let Some(file) = scan_path(repo_root, &path, options)? {
            files.push(file);
        } else if !path.exists() {
            warn!(path = %path.display(), "path does not exist");
        }
    }
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    files.dedup_by(|a, b| a.rel_path == b.rel_path);
    Ok(files)
}

fn walk(repo_root: &Path, start: &Path, options: &ScanOptions) -> Result<Vec<ScannedFile>> {
    let mut files = Vec::new();
    let mut builder = WalkBuilder::new(start);
    if options.no_ignore {
        builder
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false);
    } else {
        builder
            .ignore(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .parents(true)
            .require_git(false);
    }
    let walker = builder.hidden(false).build();

    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                warn!("walk error: {err}");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        if let Some(file) = scan_path(repo_root, entry.path(), options)? {
            files.push(file);
        }
    }
    Ok(files)
}

pub fn scan_path(repo_root: &Path, path: &Path, options: &ScanOptions) -> Result<Option<ScannedFile>> {
    if !path.is_file() {
        return Ok(None);
    }
    let rel_path = match crate::util::normalize_rel_path(repo_root, path) {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };
    let Some(language) = language_for_path(&rel_path) else {
        return Ok(None);
    };
    if let Some(languages) = &options.languages
        && !languages.contains(&language)
    {
        return Ok(None);
    }
    let metadata = fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
    let size = metadata.len();
    if options.max_file_bytes > 0 && size > options.max_file_bytes {
        debug!(path = %rel_path, size, "skipping oversized file");
        return Ok(None);
    }
    Ok(Some(ScannedFile {
        rel_path,
        abs_path: path.to_path_buf(),
        size,
        language,
    }))
}
