use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to copy {} to {}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Walking the asset tree failed")]
    Walk(#[from] walkdir::Error),
    #[error("Serialising stats report failed")]
    Stats(#[from] serde_json::Error),
}

impl BuildError {
    pub fn read(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Read { path, source }
    }

    pub fn write(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Write { path, source }
    }
}

pub type Result<T, E = BuildError> = std::result::Result<T, E>;
