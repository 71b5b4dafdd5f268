//! Writes the generated translation units to the output directory.
//!
//! Each file is buffered completely before it is written; writing replaces
//! any existing file of the same name. Handles are released after each
//! write.

use crate::codegen::GeneratedFile;
use failure::Fail;
use log::debug;
use std::{fs, io, path::PathBuf};

#[derive(Debug, Fail)]
pub enum EmitterError {
    #[fail(display = "failed to create output directory {}: {}", path, cause)]
    CreateDirectory {
        path: String,
        #[cause]
        cause: io::Error,
    },
    #[fail(display = "failed to write {}: {}", path, cause)]
    WriteFile {
        path: String,
        #[cause]
        cause: io::Error,
    },
}

pub struct Emitter {
    output_dir: PathBuf,
}

impl Emitter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Emitter {
            output_dir: output_dir.into(),
        }
    }

    pub fn write(&self, files: &[GeneratedFile]) -> Result<(), EmitterError> {
        fs::create_dir_all(&self.output_dir).map_err(|cause| EmitterError::CreateDirectory {
            path: self.output_dir.display().to_string(),
            cause,
        })?;

        for (name, contents) in files {
            let path = self.output_dir.join(name);
            debug!("writing {}", path.display());
            fs::write(&path, contents).map_err(|cause| EmitterError::WriteFile {
                path: path.display().to_string(),
                cause,
            })?;
        }
        Ok(())
    }
}
