use std::cell::RefCell;
use std::path::{Path, PathBuf};

use futures_util::future::{FutureExt, LocalBoxFuture};
use indexmap::IndexMap;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Where template sources come from
pub trait SourceProvider {
    /// Fetch the source of `name`, failing with [`Error::NotFound`] when it does not exist
    fn get_source<'a>(&'a self, name: &'a str) -> LocalBoxFuture<'a, Result<String>>;
}

/// Templates registered in memory
#[derive(Debug, Default)]
pub struct MemorySource {
    templates: RefCell<IndexMap<String, String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.borrow_mut().insert(name.into(), source.into());
    }

    /// Builder-style [`MemorySource::insert`]
    pub fn with(self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.templates.borrow().keys().cloned().collect()
    }
}

impl SourceProvider for MemorySource {
    fn get_source<'a>(&'a self, name: &'a str) -> LocalBoxFuture<'a, Result<String>> {
        let found = self.templates.borrow().get(name).cloned();
        async move { found.ok_or_else(|| Error::NotFound(name.to_string())) }.boxed_local()
    }
}

/// Templates read from view directories, `<dir>/<name>.<extension>`
#[derive(Debug, Clone)]
pub struct DirectorySource {
    directories: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl DirectorySource {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directories: vec![directory.into()],
            extensions: vec!["hwk".to_string(), "ejs".to_string()],
        }
    }

    pub fn with_extensions(mut self, extensions: &[String]) -> Self {
        if !extensions.is_empty() {
            self.extensions = extensions.to_vec();
        }
        self
    }

    /// Directories added later are searched after earlier ones
    pub fn add_directory(&mut self, directory: impl Into<PathBuf>) {
        self.directories.push(directory.into());
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    fn candidates(&self, name: &str) -> impl Iterator<Item = PathBuf> + '_ {
        let name = name.trim_start_matches('/').to_string();
        self.directories.iter().flat_map(move |directory| {
            let name = name.clone();
            self.extensions
                .iter()
                .map(move |extension| directory.join(format!("{}.{}", name, extension)))
        })
    }

    /// Names of every template found below the directories, sorted
    pub fn templates(&self) -> Vec<String> {
        let mut names = Vec::new();
        for directory in &self.directories {
            for entry in WalkDir::new(directory)
                .follow_links(true)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
            {
                if let Some(name) = self.template_name(directory, entry.path()) {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        names.sort();
        names
    }

    fn template_name(&self, directory: &Path, path: &Path) -> Option<String> {
        let extension = path.extension()?.to_str()?;
        if !self.extensions.iter().any(|known| known == extension) {
            return None;
        }
        let relative = path.strip_prefix(directory).ok()?.with_extension("");
        let parts: Vec<String> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

impl SourceProvider for DirectorySource {
    fn get_source<'a>(&'a self, name: &'a str) -> LocalBoxFuture<'a, Result<String>> {
        async move {
            for path in self.candidates(name) {
                match std::fs::read_to_string(&path) {
                    Ok(source) => {
                        tracing::trace!(template = name, path = %path.display(), "read template source");
                        return Ok(source);
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => return Err(Error::Io(format!("{}: {}", path.display(), err))),
                }
            }
            Err(Error::NotFound(name.to_string()))
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;

    #[test]
    fn test_memory_source() {
        let source = MemorySource::new().with("page", "<p>hi</p>");
        let found = source.get_source("page").now_or_never().unwrap().unwrap();
        assert_eq!(found, "<p>hi</p>");
        let missing = source.get_source("nope").now_or_never().unwrap();
        assert!(matches!(missing, Err(Error::NotFound(name)) if name == "nope"));
    }

    #[test]
    fn test_directory_source() {
        let root = std::env::temp_dir().join(format!("hawk-source-{}", std::process::id()));
        std::fs::create_dir_all(root.join("partials")).unwrap();
        std::fs::write(root.join("page.hwk"), "page").unwrap();
        std::fs::write(root.join("partials/item.ejs"), "item").unwrap();
        std::fs::write(root.join("notes.txt"), "ignored").unwrap();

        let source = DirectorySource::new(&root);
        assert_eq!(source.templates(), vec!["page".to_string(), "partials/item".to_string()]);
        let item = source.get_source("partials/item").now_or_never().unwrap().unwrap();
        assert_eq!(item, "item");
        assert!(matches!(
            source.get_source("notes").now_or_never().unwrap(),
            Err(Error::NotFound(_))
        ));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
