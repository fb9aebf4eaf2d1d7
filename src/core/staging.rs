use crate::config::manifest::DependencyManifest;
use crate::utils::error::{DaemonError, Result};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub pattern: String,
    /// 來源為符號連結時的連結目標；目的地會重建同樣的連結
    pub link_target: Option<PathBuf>,
}

/// 兩個來源對應到同一個目的地時，保留先複製的 `kept`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCollision {
    pub destination: PathBuf,
    pub kept: PathBuf,
    pub ignored: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct StageReport {
    pub files: Vec<StagedFile>,
    /// 每條規則 (pattern) 複製的檔案數
    pub per_rule: BTreeMap<String, usize>,
    pub skipped_sources: Vec<PathBuf>,
    pub collisions: Vec<StageCollision>,
    pub dry_run: bool,
}

impl StageReport {
    pub fn count_in(&self, dst_root: &Path) -> usize {
        self.files
            .iter()
            .filter(|f| f.destination.starts_with(dst_root))
            .count()
    }

    pub fn links(&self) -> impl Iterator<Item = &StagedFile> {
        self.files.iter().filter(|f| f.link_target.is_some())
    }
}

/// 依清單的匯入規則，將各依賴安裝目錄中的檔案複製到 `dest_root`
pub fn stage<P: AsRef<Path>>(
    manifest: &DependencyManifest,
    prefixes: &[P],
    dest_root: &Path,
    dry_run: bool,
) -> Result<StageReport> {
    let mut report = StageReport {
        dry_run,
        ..StageReport::default()
    };
    let mut copied: HashMap<PathBuf, PathBuf> = HashMap::new();

    for rule in &manifest.imports {
        let matcher = rule.matcher()?;
        report.per_rule.entry(rule.pattern.clone()).or_insert(0);

        for prefix in prefixes {
            let src_dir = prefix.as_ref().join(&rule.src);
            if !src_dir.is_dir() {
                tracing::debug!("Skipping missing source directory {}", src_dir.display());
                report.skipped_sources.push(src_dir);
                continue;
            }

            let mut candidates = Vec::new();
            collect_files(&src_dir, &mut candidates)?;
            candidates.sort();

            for (source, link_target) in candidates {
                let matched = source
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|name| matcher.is_match(name))
                    .unwrap_or(false);
                if !matched {
                    continue;
                }

                let relative = source.strip_prefix(&src_dir).map_err(|e| {
                    DaemonError::StagingError {
                        message: format!("{}: {}", source.display(), e),
                    }
                })?;
                let destination = dest_root.join(&rule.dst).join(relative);

                // 同一目的地只複製一次
                if let Some(kept) = copied.get(&destination) {
                    if kept != &source {
                        tracing::warn!(
                            "⚠️ {} already staged from {}; ignoring {}",
                            destination.display(),
                            kept.display(),
                            source.display()
                        );
                        report.collisions.push(StageCollision {
                            destination,
                            kept: kept.clone(),
                            ignored: source,
                        });
                    }
                    continue;
                }
                copied.insert(destination.clone(), source.clone());

                if !dry_run {
                    place(&source, &destination, link_target.as_deref())?;
                }
                match &link_target {
                    Some(target) => tracing::debug!(
                        "{} -> {} (link to {})",
                        source.display(),
                        destination.display(),
                        target.display()
                    ),
                    None => tracing::debug!("{} -> {}", source.display(), destination.display()),
                }

                *report.per_rule.entry(rule.pattern.clone()).or_insert(0) += 1;
                report.files.push(StagedFile {
                    source,
                    destination,
                    pattern: rule.pattern.clone(),
                    link_target,
                });
            }
        }
    }

    tracing::info!(
        "📦 Staged {} files into {}{}",
        report.files.len(),
        dest_root.display(),
        if dry_run { " (dry run)" } else { "" }
    );
    if !report.collisions.is_empty() {
        tracing::warn!("⚠️ {} destination collision(s) ignored", report.collisions.len());
    }
    Ok(report)
}

fn staging_error(source: &Path, destination: &Path, e: std::io::Error) -> DaemonError {
    DaemonError::StagingError {
        message: format!(
            "Failed to copy {} to {}: {}",
            source.display(),
            destination.display(),
            e
        ),
    }
}

fn place(source: &Path, destination: &Path, link_target: Option<&Path>) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    // 舊的連結要先移除，否則 copy 會寫進連結指向的檔案
    if fs::symlink_metadata(destination).is_ok() {
        fs::remove_file(destination).map_err(|e| staging_error(source, destination, e))?;
    }

    match link_target {
        Some(target) => link(source, target, destination),
        None => fs::copy(source, destination)
            .map(|_| ())
            .map_err(|e| staging_error(source, destination, e)),
    }
}

#[cfg(unix)]
fn link(source: &Path, target: &Path, destination: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, destination).map_err(|e| staging_error(source, destination, e))
}

#[cfg(not(unix))]
fn link(source: &Path, _target: &Path, destination: &Path) -> Result<()> {
    fs::copy(source, destination)
        .map(|_| ())
        .map_err(|e| staging_error(source, destination, e))
}

/// 收集檔案以及指向檔案的符號連結；指向目錄的連結不追蹤
fn collect_files(dir: &Path, out: &mut Vec<(PathBuf, Option<PathBuf>)>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            collect_files(&path, out)?;
        } else if file_type.is_file() {
            out.push((path, None));
        } else if file_type.is_symlink() {
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => {
                    let target = fs::read_link(&path)?;
                    out.push((path, Some(target)));
                }
                Ok(_) => tracing::debug!("Not following directory link {}", path.display()),
                Err(e) => tracing::warn!("⚠️ Skipping dangling link {}: {}", path.display(), e),
            }
        }
    }
    Ok(())
}
