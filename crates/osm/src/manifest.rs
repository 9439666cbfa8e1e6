//! The AOI manifest: bounding box and description, read from
//! `manifest.json` at the AOI root.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// `manifest.json` contents. The bbox is `[west, south, east, north]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub bbox: [f64; 4],
    #[serde(default)]
    pub description: String,
}

impl Manifest {
    /// Read and parse the manifest file.
    ///
    /// # Errors
    ///
    /// I/O or JSON errors.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    #[must_use]
    pub const fn west(&self) -> f64 {
        self.bbox[0]
    }

    #[must_use]
    pub const fn south(&self) -> f64 {
        self.bbox[1]
    }

    #[must_use]
    pub const fn east(&self) -> f64 {
        self.bbox[2]
    }

    #[must_use]
    pub const fn north(&self) -> f64 {
        self.bbox[3]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bbox_and_description() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            r#"{"bbox": [19.0, 9.0, 21.0, 11.0], "description": "Field AOI"}"#,
        )
        .unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.west(), 19.0);
        assert_eq!(manifest.south(), 9.0);
        assert_eq!(manifest.east(), 21.0);
        assert_eq!(manifest.north(), 11.0);
        assert_eq!(manifest.description, "Field AOI");
    }

    #[test]
    fn description_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, r#"{"bbox": [0.0, 0.0, 1.0, 1.0]}"#).unwrap();
        let manifest = Manifest::load(&path).unwrap();
        assert!(manifest.description.is_empty());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Manifest::load(Path::new("/nonexistent/manifest.json")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
