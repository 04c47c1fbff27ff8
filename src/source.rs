//! Where markup is read from

use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor};
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// A readable origin of markup text
pub trait MarkupSource {
    /// Human readable description, used in logs and errors
    fn descriptor(&self) -> String;

    /// Stable identifier recorded in the Dom's metadata
    fn id(&self) -> String;

    fn open(&self) -> io::Result<Box<dyn BufRead + '_>>;
}

/// In-memory markup
#[derive(Debug, Clone)]
pub struct StringSource {
    id: String,
    text: String,
}

impl StringSource {
    /// Anonymous source; gets a random id
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
        }
    }

    pub fn named(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

impl MarkupSource for StringSource {
    fn descriptor(&self) -> String {
        format!("string '{}'", self.id)
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn open(&self) -> io::Result<Box<dyn BufRead + '_>> {
        Ok(Box::new(Cursor::new(self.text.as_bytes())))
    }
}

/// Markup in a UTF-8 file
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MarkupSource for FileSource {
    fn descriptor(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn id(&self) -> String {
        self.path.display().to_string()
    }

    fn open(&self) -> io::Result<Box<dyn BufRead + '_>> {
        Ok(Box::new(BufReader::new(File::open(&self.path)?)))
    }
}
