// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{info, span, Level};

use crate::export::EncodedFile;

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("Unable to create output directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Unable to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("Refusing to save a file without a name")]
    EmptyFilename,
}

/// Somewhere encoded files can be saved to.
pub trait Saver: Send + Sync {
    /// Saves the file and returns where it ended up.
    fn save(&self, file: &EncodedFile) -> Result<PathBuf, SaveError>;
}

/// Saves files into a directory.
#[derive(Debug, Clone)]
pub struct DirectorySaver {
    directory: PathBuf,
}

impl DirectorySaver {
    pub fn new(directory: &Path) -> DirectorySaver {
        DirectorySaver {
            directory: directory.to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// Replaces path separators so a suggested name can't escape the directory.
fn sanitize(filename: &str) -> String {
    filename.replace(['/', '\\'], "_")
}

impl Saver for DirectorySaver {
    fn save(&self, file: &EncodedFile) -> Result<PathBuf, SaveError> {
        let span = span!(Level::INFO, "save", directory = ?self.directory);
        let _enter = span.enter();

        let filename = sanitize(file.filename());
        if filename.is_empty() {
            return Err(SaveError::EmptyFilename);
        }

        fs::create_dir_all(&self.directory).map_err(|source| SaveError::CreateDir {
            path: self.directory.clone(),
            source,
        })?;

        let path = self.directory.join(&filename);
        let write_err = |source| SaveError::Write {
            path: path.clone(),
            source,
        };

        // The temp file is removed on drop if anything below fails.
        let mut temp = tempfile::NamedTempFile::new_in(&self.directory).map_err(write_err)?;
        temp.write_all(file.bytes()).map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;
        temp.persist(&path).map_err(|e| write_err(e.error))?;

        info!(path = ?path, bytes = file.bytes().len(), "Saved export.");
        Ok(path)
    }
}
