// Append-only file handle, grounded on the teacher's `FileWriter`
// (`BufWriter<File>`, create-new, flush-then-sync on close).

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub struct AppendWriter {
    file: BufWriter<File>,
    path: PathBuf,
}

impl AppendWriter {
    pub fn create_new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_owned();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(AppendWriter {
            file: BufWriter::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.file.write_all(buf)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }

    /// Flush and fsync. Called at `DRAIN`'s final flush (spec §4.3).
    pub fn sync(&mut self) -> std::io::Result<()> {
        self.flush()?;
        self.file.get_ref().sync_all()
    }
}
