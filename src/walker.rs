//! Lazy breadth-first enumeration of regular files.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::{HashSet, VecDeque};
use std::fs::{self, FileType};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::FileError;

#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub follow_symlinks: bool,
    pub hidden: bool,
    pub include: GlobSet,
    pub exclude: GlobSet,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            hidden: false,
            include: GlobSet::empty(),
            exclude: GlobSet::empty(),
        }
    }
}

impl WalkOptions {
    pub fn new(
        follow_symlinks: bool,
        hidden: bool,
        include: &[String],
        exclude: &[String],
    ) -> Result<Self> {
        Ok(Self {
            follow_symlinks,
            hidden,
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    fn file_included(&self, name: &str) -> bool {
        if !self.include.is_empty() && !self.include.is_match(name) {
            return false;
        }
        !self.exclude.is_match(name)
    }

    fn is_hidden(name: &str) -> bool {
        name.starts_with('.')
    }
}

/// Yields absolute paths of regular files under a root, one directory level
/// at a time. A directory is only listed once the files of the previous
/// listing have been handed out.
///
/// Symlinks and special files are skipped unless `follow_symlinks` is set,
/// in which case links are resolved and each directory is visited once.
#[derive(Debug)]
pub struct Walker {
    opts: WalkOptions,
    cancel: CancelToken,
    dirs: VecDeque<PathBuf>,
    files: VecDeque<PathBuf>,
    visited: HashSet<PathBuf>,
    errors: u64,
}

impl Walker {
    /// Fails if the root does not exist or is neither a directory nor a
    /// regular file.
    pub fn new(root: &Path, opts: WalkOptions, cancel: CancelToken) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("cannot access root {}", root.display()))?;
        let meta =
            fs::metadata(&root).with_context(|| format!("cannot stat root {}", root.display()))?;

        let mut walker = Self {
            opts,
            cancel,
            dirs: VecDeque::new(),
            files: VecDeque::new(),
            visited: HashSet::new(),
            errors: 0,
        };
        if meta.is_dir() {
            fs::read_dir(&root).with_context(|| format!("cannot list root {}", root.display()))?;
            walker.visited.insert(root.clone());
            walker.dirs.push_back(root);
        } else if meta.is_file() {
            walker.files.push_back(root);
        } else {
            bail!("root {} is not a directory or regular file", root.display());
        }
        Ok(walker)
    }

    /// Directories that could not be listed so far.
    pub fn errors(&self) -> u64 {
        self.errors
    }

    fn list(&mut self, dir: &Path) {
        if let Err(source) = self.try_list(dir) {
            self.errors += 1;
            let err = FileError::Enumeration {
                path: dir.to_path_buf(),
                source,
            };
            warn!(stage = err.stage(), "{err}");
        }
    }

    fn try_list(&mut self, dir: &Path) -> std::io::Result<()> {
        let mut files = Vec::new();
        let mut subdirs = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.opts.hidden && WalkOptions::is_hidden(&name) {
                continue;
            }

            let path = entry.path();
            let Some(ft) = self.file_type(&entry) else {
                debug!(path = %path.display(), "skipping unresolvable entry");
                continue;
            };

            if ft.is_dir() {
                subdirs.push(path);
            } else if ft.is_file() {
                if self.opts.file_included(&name) {
                    files.push(path);
                }
            } else {
                debug!(path = %path.display(), "skipping special file");
            }
        }

        // Queue only after the whole listing succeeded, so a failed listing
        // contributes nothing.
        self.files.extend(files);
        for subdir in subdirs {
            if self.opts.follow_symlinks {
                // A link may lead back into a directory already walked.
                match subdir.canonicalize() {
                    Ok(canonical) if self.visited.insert(canonical.clone()) => {
                        self.dirs.push_back(subdir)
                    }
                    Ok(_) => debug!(path = %subdir.display(), "directory already visited"),
                    Err(e) => debug!(path = %subdir.display(), "cannot resolve directory: {e}"),
                }
            } else {
                self.dirs.push_back(subdir);
            }
        }
        Ok(())
    }

    fn file_type(&self, entry: &fs::DirEntry) -> Option<FileType> {
        let ft = if self.opts.follow_symlinks {
            entry.metadata().map(|m| m.file_type())
        } else {
            entry.file_type()
        };
        ft.ok()
    }
}

impl Iterator for Walker {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            if let Some(file) = self.files.pop_front() {
                return Some(file);
            }
            let dir = self.dirs.pop_front()?;
            self.list(&dir);
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        builder.add(Glob::new(p).with_context(|| format!("invalid glob {p:?}"))?);
    }
    Ok(builder.build()?)
}
