//! Source-tree discovery.
//!
//! Maps a filesystem tree onto packages and modules: a directory holding an
//! `__init__.py` is a package, a `.py` file is a module. Directories
//! without the marker file terminate descent, hidden files and non-Python
//! files are skipped. Traversal is sorted so discovery order (and with it
//! declaration order of the resulting entities) is deterministic.
//!
//! Discovery only queues modules; their contents are built later by the
//! producer, possibly on demand.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use docgraph_core::report::Severity;

use crate::model::{EntityId, EntityInit, EntityKind};
use crate::system::System;

/// Errors from [`System::add_source`].
#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("source path does not exist: {path}")]
    Missing { path: PathBuf },

    #[error("source path is neither file nor directory: {path}")]
    Unsupported { path: PathBuf },
}

impl System {
    /// Add a package directory or a module file as a root of the system.
    pub fn add_source(&mut self, path: &Path) -> Result<(), DiscoverError> {
        if path.is_dir() {
            self.add_package(path, None);
            Ok(())
        } else if path.is_file() {
            self.add_module_file(path, None);
            Ok(())
        } else if path.exists() {
            Err(DiscoverError::Unsupported {
                path: path.to_path_buf(),
            })
        } else {
            Err(DiscoverError::Missing {
                path: path.to_path_buf(),
            })
        }
    }

    /// Walk a package directory and queue every package and module found.
    ///
    /// Returns the root package, or `None` when the directory is not a
    /// package or its module slot was discarded by duplicate arbitration.
    /// I/O problems during the walk are reported, never fatal.
    pub fn add_package(
        &mut self,
        package_path: &Path,
        parent: Option<EntityId>,
    ) -> Option<EntityId> {
        if !package_path.join("__init__.py").is_file() {
            self.reporter_mut().report(
                "addPackage",
                format!(
                    "not a package (no __init__.py): {}",
                    package_path.display()
                ),
                Severity::Violation,
            );
            return None;
        }

        let mut packages: HashMap<PathBuf, EntityId> = HashMap::new();
        let mut root_package = None;
        let walker = WalkDir::new(package_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !entry.file_type().is_dir()
                    || entry.depth() == 0
                    || entry.path().join("__init__.py").is_file()
            });
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    self.reporter_mut().report(
                        "addPackage",
                        format!("cannot walk source tree: {err}"),
                        Severity::Warning,
                    );
                    continue;
                }
            };
            let path = entry.path();
            let Some(file_name) = entry.file_name().to_str() else {
                self.reporter_mut().report(
                    "addPackage",
                    format!("skipping non-unicode path: {}", path.display()),
                    Severity::Warning,
                );
                continue;
            };

            if entry.file_type().is_dir() {
                let owner = if entry.depth() == 0 {
                    parent
                } else {
                    match path.parent().and_then(|p| packages.get(p)) {
                        Some(&owner) => Some(owner),
                        None => continue,
                    }
                };
                let init = EntityInit::new(file_name, EntityKind::Package, owner)
                    .with_source_path(path.join("__init__.py"));
                if let Some(package) = self.add_unprocessed_module(init, None) {
                    packages.insert(path.to_path_buf(), package);
                    if entry.depth() == 0 {
                        root_package = Some(package);
                    }
                }
            } else if entry.file_type().is_file() {
                if file_name == "__init__.py"
                    || file_name.starts_with('.')
                    || !file_name.ends_with(".py")
                {
                    continue;
                }
                let Some(&owner) = path.parent().and_then(|p| packages.get(p)) else {
                    continue;
                };
                let Some(module_name) = file_name.strip_suffix(".py") else {
                    continue;
                };
                let init = EntityInit::new(module_name, EntityKind::Module, Some(owner))
                    .with_source_path(path);
                self.add_unprocessed_module(init, None);
            }
        }
        root_package
    }

    /// Queue a single module file.
    pub fn add_module_file(&mut self, path: &Path, parent: Option<EntityId>) -> Option<EntityId> {
        let file_name = path.file_name().and_then(|n| n.to_str())?;
        let module_name = match file_name.strip_suffix(".py") {
            Some(name) if !file_name.starts_with('.') => name,
            _ => {
                self.reporter_mut().report(
                    "addModule",
                    format!("not a python module: {}", path.display()),
                    Severity::Warning,
                );
                return None;
            }
        };
        let init =
            EntityInit::new(module_name, EntityKind::Module, parent).with_source_path(path);
        self.add_unprocessed_module(init, None)
    }
}
