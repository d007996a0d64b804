//! Named resource lookup.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Group used when locating bitmaps.
pub const TEXTURE_GROUP: &str = "Texture";

/// Group used when locating fonts.
pub const FONT_GROUP: &str = "Font";

/// Resolves resource names and reads their bytes.
///
/// `read` is called from decode worker threads, hence the `Send + Sync`
/// bound.
pub trait ResourceLocator: Send + Sync {
    /// Resolve `name` within `group` to a location, or `None` when it does
    /// not exist.
    fn locate(&self, group: &str, name: &str) -> Option<String>;

    /// Read the whole resource at `location`.
    ///
    /// # Errors
    ///
    /// Any I/O failure while opening or reading.
    fn read(&self, location: &str) -> io::Result<Vec<u8>>;
}

/// File system locator searching a list of root directories.
///
/// A name is tried as `root/name`, then `root/group/name`, for each root in
/// order.
#[derive(Clone, Debug, Default)]
pub struct DirectoryLocator {
    roots: Vec<PathBuf>,
}

impl DirectoryLocator {
    /// Search `roots` in order.
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }
}

impl ResourceLocator for DirectoryLocator {
    fn locate(&self, group: &str, name: &str) -> Option<String> {
        let direct = Path::new(name);
        if direct.is_absolute() {
            return direct.is_file().then(|| name.to_owned());
        }

        self.roots
            .iter()
            .flat_map(|root| [root.join(name), root.join(group).join(name)])
            .find(|candidate| candidate.is_file())
            .map(|found| found.to_string_lossy().into_owned())
    }

    fn read(&self, location: &str) -> io::Result<Vec<u8>> {
        std::fs::read(location)
    }
}

/// In-memory locator; names are their own locations.
#[derive(Clone, Debug, Default)]
pub struct MemoryLocator {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryLocator {
    /// An empty locator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` under `name`.
    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> &mut Self {
        self.files.insert(name.into(), bytes);
        self
    }
}

impl ResourceLocator for MemoryLocator {
    fn locate(&self, _group: &str, name: &str) -> Option<String> {
        self.files.contains_key(name).then(|| name.to_owned())
    }

    fn read(&self, location: &str) -> io::Result<Vec<u8>> {
        self.files
            .get(location)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, location.to_owned()))
    }
}
