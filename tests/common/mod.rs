#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tabular_import::field::{FieldDefinition, FieldDefinitionCollection, FieldType};
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Field definitions shared by the people fixtures.
pub fn people_fields() -> FieldDefinitionCollection {
    FieldDefinitionCollection::load(&fixture_path("people_fields.yaml"))
        .expect("load people field definitions")
}

/// Name, age and city only, all mapped onto the Spanish headers.
pub fn minimal_fields() -> FieldDefinitionCollection {
    FieldDefinitionCollection::from_fields([
        FieldDefinition::new("Nombre", FieldType::String),
        FieldDefinition::new("Edad", FieldType::Integer),
        FieldDefinition::new("Ciudad", FieldType::String),
    ])
    .expect("minimal field definitions")
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}
