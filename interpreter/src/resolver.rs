use std::collections::HashMap;
use std::path::{Path, PathBuf};

use razor::{DEFAULT_FILE_PATH, ErrorKind, RazorError};

/// Extension appended to view names that have none.
pub const DEFAULT_EXTENSION: &str = "raz";

/// A continuation invoked exactly once with the outcome of an operation.
pub type Completion<'a, T> = Box<dyn FnOnce(Result<T, RazorError>) + 'a>;

/// Source of a resolved partial or layout view.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTemplate {
    pub data: String,
    pub file_path: String,
}

/// Finds partial and layout views by name.
pub trait TemplateResolver {
    /// Resolve `name` as requested from the template at `from_path`.
    fn find_partial_sync(&self, name: &str, from_path: &str)
    -> Result<ResolvedTemplate, RazorError>;

    /// Continuation form of [`TemplateResolver::find_partial_sync`], used for
    /// layouts by [`crate::compile`]. The default completes synchronously.
    fn find_partial<'a>(
        &'a self,
        name: &str,
        from_path: &str,
        done: Completion<'a, ResolvedTemplate>,
    ) {
        done(self.find_partial_sync(name, from_path));
    }
}

/// A resolver that knows no views.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoViews;

impl TemplateResolver for NoViews {
    fn find_partial_sync(
        &self,
        name: &str,
        from_path: &str,
    ) -> Result<ResolvedTemplate, RazorError> {
        Err(RazorError::new(
            ErrorKind::PartialNotFound {
                name: name.to_string(),
                searched: Vec::new(),
            },
            from_path,
        )
        .with_note("no view resolver is configured"))
    }
}

/// Views held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    views: HashMap<String, String>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.views.insert(name.into(), source.into());
    }

    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }
}

impl TemplateResolver for MemoryResolver {
    fn find_partial_sync(
        &self,
        name: &str,
        from_path: &str,
    ) -> Result<ResolvedTemplate, RazorError> {
        match self.views.get(name) {
            Some(source) => Ok(ResolvedTemplate {
                data: source.clone(),
                file_path: name.to_string(),
            }),
            None => Err(RazorError::new(
                ErrorKind::PartialNotFound {
                    name: name.to_string(),
                    searched: vec![name.to_string()],
                },
                from_path,
            )),
        }
    }
}

/// Views on disk. A name is looked up next to the requesting template first,
/// then in each views directory in order.
#[derive(Debug, Clone)]
pub struct FileResolver {
    views: Vec<PathBuf>,
    extension: String,
}

impl FileResolver {
    pub fn new() -> Self {
        FileResolver {
            views: Vec::new(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_views(mut self, dir: impl Into<PathBuf>) -> Self {
        self.views.push(dir.into());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    fn candidates(&self, name: &str, from_path: &str) -> Vec<PathBuf> {
        let file_name = if Path::new(name).extension().is_some() || self.extension.is_empty() {
            PathBuf::from(name)
        } else {
            PathBuf::from(format!("{}.{}", name, self.extension))
        };

        let mut dirs = Vec::new();
        if from_path != DEFAULT_FILE_PATH {
            if let Some(parent) = Path::new(from_path).parent() {
                dirs.push(parent.to_path_buf());
            }
        }
        dirs.extend(self.views.iter().cloned());

        let mut candidates: Vec<PathBuf> = Vec::new();
        for dir in dirs {
            let candidate = dir.join(&file_name);
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        candidates
    }
}

impl Default for FileResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateResolver for FileResolver {
    fn find_partial_sync(
        &self,
        name: &str,
        from_path: &str,
    ) -> Result<ResolvedTemplate, RazorError> {
        let candidates = self.candidates(name, from_path);
        let Some(path) = candidates.iter().find(|path| path.is_file()) else {
            return Err(RazorError::new(
                ErrorKind::PartialNotFound {
                    name: name.to_string(),
                    searched: candidates.iter().map(|p| p.display().to_string()).collect(),
                },
                from_path,
            ));
        };

        log::debug!("resolved view '{}' to {}", name, path.display());
        let file_path = path.display().to_string();
        let data = std::fs::read_to_string(path).map_err(|e| {
            RazorError::new(
                ErrorKind::Io {
                    path: file_path.clone(),
                    message: e.to_string(),
                },
                from_path,
            )
        })?;
        Ok(ResolvedTemplate { data, file_path })
    }
}
