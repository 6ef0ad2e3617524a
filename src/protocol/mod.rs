use std::{fs, path::Path};

use chrono::{DateTime, Utc};

pub mod zmodem;
pub use zmodem::*;

use crate::{util::Rng, TransferResult};

#[derive(Clone, Debug, PartialEq)]
pub struct FileDescriptor {
    pub path_name: String,
    pub file_name: String,
    pub size: usize,
    /// Modification time, seconds since the unix epoch.
    pub date: u64,
    pub data: Vec<u8>,
}

impl FileDescriptor {
    pub fn create(path: &Path) -> TransferResult<Self> {
        let metadata = fs::metadata(path)?;
        let modified: DateTime<Utc> = metadata.modified()?.into();
        let data = fs::read(path)?;
        let file_name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => return Err(anyhow::anyhow!("{} has no file name", path.display())),
        };

        Ok(Self {
            path_name: path.to_string_lossy().to_string(),
            file_name,
            size: data.len(),
            date: modified.timestamp().max(0) as u64,
            data,
        })
    }

    /// Describes an in-memory buffer, named like a fresh temp file and dated now.
    pub fn from_data(data: Vec<u8>) -> Self {
        Self {
            path_name: String::new(),
            file_name: Rng::default().temp_file_name(),
            size: data.len(),
            date: Utc::now().timestamp().max(0) as u64,
            data,
        }
    }

    pub fn from_parts(file_name: &str, date: u64, data: Vec<u8>) -> Self {
        Self {
            path_name: String::new(),
            file_name: file_name.to_string(),
            size: data.len(),
            date,
            data,
        }
    }

    /// The ZFILE subpacket payload: `name NUL length SP mtime`, length in decimal, mtime in octal.
    pub fn get_file_info(&self) -> Vec<u8> {
        let mut info = self.file_name.as_bytes().to_vec();
        info.push(0);
        info.extend_from_slice(format!("{} {:o}", self.size, self.date).as_bytes());
        info
    }
}
