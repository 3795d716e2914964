//! Flat file store addressed by bare filename
//!
//! Used by the server for its served directory and by the client for its
//! local working directory. Names are validated here so nothing outside the
//! root can be read or written, whatever the caller passes in.

use crate::error::{FtpError, Result};
use crate::fs_enum::{self, UPLOAD_PREFIX};
use crate::protocol_core::validate_filename;
use std::fs::File;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_filename(name)?))
    }

    /// Open a regular file for reading. `Ok(None)` when there is no such file.
    pub fn open_file(&self, name: &str) -> Result<Option<(File, u64)>> {
        let path = self.path_of(name)?;
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(FtpError::local(path, e)),
        };
        let md = file.metadata().map_err(|e| FtpError::local(&path, e))?;
        if !md.is_file() {
            return Ok(None);
        }
        Ok(Some((file, md.len())))
    }

    /// Start writing `name`. Content becomes visible only on [`Upload::commit`].
    pub fn create(&self, name: &str) -> Result<Upload> {
        let dest = self.path_of(name)?;
        let tmp = tempfile::Builder::new()
            .prefix(UPLOAD_PREFIX)
            .tempfile_in(&self.root)
            .map_err(|e| FtpError::local(&dest, e))?;
        Ok(Upload { tmp, dest })
    }

    pub fn list(&self) -> io::Result<Vec<String>> {
        fs_enum::list_names(&self.root)
    }
}

/// A file being received. Dropping it without committing discards the data.
pub struct Upload {
    tmp: NamedTempFile,
    dest: PathBuf,
}

impl Upload {
    pub fn file(&mut self) -> &mut File {
        self.tmp.as_file_mut()
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn commit(self) -> Result<()> {
        let dest = self.dest;
        self.tmp
            .persist(&dest)
            .map_err(|e| FtpError::local(&dest, e.error))?;
        Ok(())
    }
}
