//! Where schema sources come from.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use crate::error::SourceError;
use crate::names::SchemaIdentifier;

/// An opened schema source. The stream is closed when this is dropped.
pub struct OpenedSchema {
    /// Used as the `uri` of every lexical position in the source.
    pub uri: String,
    pub reader: Box<dyn Read>,
}

/// Provides the source of a schema given its identifier. Opening is a blocking call.
pub trait SchemaSource {
    fn open(&self, id: &SchemaIdentifier) -> Result<OpenedSchema, SourceError>;
}

/// The file name under which the schema `id` is looked up: `NAME-MAJOR.MINOR.xml`.
pub fn file_name(id: &SchemaIdentifier) -> String {
    format!("{}-{}.xml", id.name, id.version)
}

/// Schemas stored as files of one directory, named by [`file_name`].
#[derive(Clone, Debug)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, id: &SchemaIdentifier) -> PathBuf {
        self.root.join(file_name(id))
    }
}

impl SchemaSource for DirectorySource {
    fn open(&self, id: &SchemaIdentifier) -> Result<OpenedSchema, SourceError> {
        let path = self.path_of(id);
        tracing::debug!(schema = %id, path = %path.display(), "opening schema file");
        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SourceError::NotFound,
            _ => SourceError::Io(e),
        })?;
        Ok(OpenedSchema {
            uri: path.display().to_string(),
            reader: Box::new(file),
        })
    }
}

/// Schemas held in memory, mostly useful for tests and embedding.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    documents: HashMap<SchemaIdentifier, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: SchemaIdentifier, document: impl Into<Vec<u8>>) {
        self.documents.insert(id, document.into());
    }

    pub fn with(mut self, id: SchemaIdentifier, document: impl Into<Vec<u8>>) -> Self {
        self.insert(id, document);
        self
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl SchemaSource for MemorySource {
    fn open(&self, id: &SchemaIdentifier) -> Result<OpenedSchema, SourceError> {
        let document = self.documents.get(id).ok_or(SourceError::NotFound)?;
        Ok(OpenedSchema {
            uri: format!("memory:{}", file_name(id)),
            reader: Box::new(Cursor::new(document.clone())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> SchemaIdentifier {
        s.parse().unwrap()
    }

    fn read(mut opened: OpenedSchema) -> String {
        let mut text = String::new();
        opened.reader.read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn file_names() {
        assert_eq!(file_name(&id("org.example.Core:1.10")), "org.example.Core-1.10.xml");
    }

    #[test]
    fn directory_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Core-1.0.xml"), "<Schema/>").unwrap();
        let source = DirectorySource::new(dir.path());

        let opened = source.open(&id("Core:1.0")).unwrap();
        assert!(opened.uri.ends_with("Core-1.0.xml"));
        assert_eq!(read(opened), "<Schema/>");

        assert!(matches!(
            source.open(&id("Core:1.1")),
            Err(SourceError::NotFound)
        ));
    }

    #[test]
    fn memory_source() {
        let source = MemorySource::new().with(id("Core:1.0"), "<Schema/>");
        assert_eq!(source.len(), 1);
        assert_eq!(read(source.open(&id("Core:1.0")).unwrap()), "<Schema/>");
        assert!(matches!(
            source.open(&id("Core:2.0")),
            Err(SourceError::NotFound)
        ));
    }
}
