use core::fmt;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tachyon_core::config::Config;

/// A JSON-backed file and its parsed contents.
pub struct File<T: Serialize + for<'de> Deserialize<'de>> {
    pub path: Option<PathBuf>,
    pub contents: T,
}

#[derive(Debug)]
pub enum FileError {
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::Io(err) => write!(f, "I/O error: {err}"),
            FileError::Json(err) => write!(f, "JSON serialization error: {err}"),
        }
    }
}

impl std::error::Error for FileError {}

impl<T: Default + Serialize + for<'de> Deserialize<'de>> File<T> {
    pub fn read(path: &Path, default_on_not_found: bool) -> Result<Self, FileError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if default_on_not_found && err.kind() == io::ErrorKind::NotFound => {
                return Ok(File {
                    path: Some(path.to_path_buf()),
                    contents: T::default(),
                });
            }
            Err(err) => return Err(FileError::Io(err)),
        };
        let contents = serde_json::from_str(&content).map_err(FileError::Json)?;
        Ok(File {
            path: Some(path.to_path_buf()),
            contents,
        })
    }

    pub fn write(&self) -> Result<(), FileError> {
        match &self.path {
            Some(path) => Self::write_value(&self.contents, path),
            None => Ok(()),
        }
    }

    pub fn write_value(contents: &T, path: &Path) -> Result<(), FileError> {
        fs::write(
            path,
            serde_json::to_vec_pretty(contents).map_err(FileError::Json)?,
        )
        .map_err(FileError::Io)
    }
}

/// Reads a renderer configuration, falling back to the defaults when the file doesn't exist.
pub fn read_config(path: &Path) -> Result<Config, FileError> {
    File::<Config>::read(path, true).map(|file| file.contents)
}

pub fn write_config(config: &Config, path: &Path) -> Result<(), FileError> {
    File::write_value(config, path)
}
