// Copyright 2025 Google LLC
// SPDX-License-Identifier: MIT

use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};

/// Log file that rolls over to `path.1` .. `path.N` when it grows past
/// `max_bytes`.
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: fs::File,
    written: u64,
}

fn open_append(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new().create(true).append(true).open(path)
}

impl RotatingFile {
    pub fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let file = open_append(path)?;
        let written = file.metadata()?.len();

        Ok(RotatingFile {
            path: path.to_path_buf(),
            max_bytes,
            backups,
            file,
            written,
        })
    }

    fn backup(&self, n: usize) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.sync_all()?;

        if self.backups == 0 {
            self.file = fs::File::create(&self.path)?;
        } else {
            for n in (1..self.backups).rev() {
                let from = self.backup(n);
                if from.exists() {
                    fs::rename(&from, self.backup(n + 1))?;
                }
            }
            fs::rename(&self.path, self.backup(1))?;
            self.file = open_append(&self.path)?;
        }

        self.written = 0;
        Ok(())
    }
}

impl io::Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }

        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn line(n: usize) -> String {
        format!("record {n:02} {}\n", "x".repeat(28))
    }

    #[test]
    fn rolls_over_and_keeps_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.log");

        let mut file = RotatingFile::open(&path, 100, 2).unwrap();
        for n in 0..7 {
            file.write_all(line(n).as_bytes()).unwrap();
        }
        file.flush().unwrap();

        let read = |name: &str| fs::read_to_string(dir.path().join(name)).unwrap();
        // two records per file
        assert_eq!(read("monitor.log"), line(6));
        assert_eq!(read("monitor.log.1"), line(4) + &line(5));
        assert_eq!(read("monitor.log.2"), line(2) + &line(3));
        assert!(!dir.path().join("monitor.log.3").exists());
    }

    #[test]
    fn reopening_counts_existing_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.log");
        fs::write(&path, "x".repeat(90)).unwrap();

        let mut file = RotatingFile::open(&path, 100, 1).unwrap();
        file.write_all(line(0).as_bytes()).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), line(0));
        assert_eq!(fs::read_to_string(dir.path().join("monitor.log.1")).unwrap().len(), 90);
    }

    #[test]
    fn zero_backups_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.log");

        let mut file = RotatingFile::open(&path, 50, 0).unwrap();
        file.write_all(line(0).as_bytes()).unwrap();
        file.write_all(line(1).as_bytes()).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), line(1));
        assert!(!dir.path().join("monitor.log.1").exists());
    }
}
