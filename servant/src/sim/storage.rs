//! Storage backends for running the device off target.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::hal::{FileRead, Storage};

impl FileRead for File {
    type Error = io::Error;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }
}

/// One file per name in a directory.
#[derive(Debug)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Storage for FsStorage {
    type Error = io::Error;
    type Reader<'a> = File;

    fn exists(&mut self, name: &str) -> bool {
        self.root.join(name).is_file()
    }

    fn open_read(&mut self, name: &str) -> io::Result<File> {
        File::open(self.root.join(name))
    }

    fn append(&mut self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(name))?;
        file.write_all(bytes)
    }

    fn overwrite(&mut self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.root.join(name))?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(bytes)
    }

    fn remove(&mut self, name: &str) -> io::Result<()> {
        fs::remove_file(self.root.join(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemError {
    NotFound,
    WriteRefused,
    Unreadable,
}

/// Files kept in memory, with switches to make operations fail.
#[derive(Debug, Default)]
pub struct MemStorage {
    files: BTreeMap<String, Vec<u8>>,
    fail_writes: bool,
    broken: Option<String>,
}

impl MemStorage {
    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Refuse every append and overwrite from now on.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// `name` still exists but can no longer be opened.
    pub fn break_file(&mut self, name: &str) {
        self.broken = Some(name.to_string());
    }

    fn writable(&mut self, name: &str) -> Result<&mut Vec<u8>, MemError> {
        if self.fail_writes {
            return Err(MemError::WriteRefused);
        }
        Ok(self.files.entry(name.to_string()).or_default())
    }
}

pub struct MemReader<'a> {
    data: &'a [u8],
}

impl FileRead for MemReader<'_> {
    type Error = MemError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, MemError> {
        let n = buf.len().min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

impl Storage for MemStorage {
    type Error = MemError;
    type Reader<'a> = MemReader<'a>;

    fn exists(&mut self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    fn open_read(&mut self, name: &str) -> Result<MemReader<'_>, MemError> {
        if self.broken.as_deref() == Some(name) {
            return Err(MemError::Unreadable);
        }
        let data = self.files.get(name).ok_or(MemError::NotFound)?;
        Ok(MemReader { data })
    }

    fn append(&mut self, name: &str, bytes: &[u8]) -> Result<(), MemError> {
        self.writable(name)?.extend_from_slice(bytes);
        Ok(())
    }

    fn overwrite(&mut self, name: &str, bytes: &[u8]) -> Result<(), MemError> {
        let file = self.writable(name)?;
        if file.len() < bytes.len() {
            file.resize(bytes.len(), 0);
        }
        file[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), MemError> {
        self.files.remove(name).map(|_| ()).ok_or(MemError::NotFound)
    }
}
