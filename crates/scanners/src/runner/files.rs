use crate::catalog::Language;
use crate::error::{Result, ScanError};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// A file selected for scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Root-relative path with `/` separators, used in findings.
    pub display: String,
    pub language: Language,
}

pub struct FileDiscovery {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl FileDiscovery {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = if include.is_empty() {
            None
        } else {
            Some(build_set(include)?)
        };
        Ok(Self {
            include,
            exclude: build_set(exclude)?,
        })
    }

    /// Files under `root` in a supported language, sorted by display path.
    /// A file root yields just that file.
    pub fn discover(&self, root: &Path) -> Result<Vec<DiscoveredFile>> {
        if root.is_file() {
            let display = root.display().to_string().replace('\\', "/");
            return Ok(Language::from_path(root)
                .map(|language| DiscoveredFile {
                    path: root.to_path_buf(),
                    display,
                    language,
                })
                .into_iter()
                .collect());
        }
        if !root.is_dir() {
            return Err(ScanError::InvalidInput(format!(
                "input path does not exist: {}",
                root.display()
            )));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !self.exclude.is_match(relative(root, entry.path()))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!("skipping unreadable entry: {}", err);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = relative(root, entry.path());
            if let Some(include) = &self.include {
                if !include.is_match(&rel) {
                    continue;
                }
            }
            let Some(language) = Language::from_path(entry.path()) else {
                continue;
            };
            files.push(DiscoveredFile {
                path: entry.path().to_path_buf(),
                display: rel.to_string_lossy().replace('\\', "/"),
                language,
            });
        }

        files.sort_by(|a, b| a.display.cmp(&b.display));
        debug!(count = files.len(), root = %root.display(), "discovered files");
        Ok(files)
    }
}

fn build_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn relative(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}
