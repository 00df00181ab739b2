use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use may::sync::Mutex;

use crate::factor::FactorError;

/// Append-only record of every factorization the server performed.
///
/// The file is opened on the first append and kept open afterwards. Each
/// request is written as one line with a single write under the lock, so
/// lines from concurrent requests never mix. Write failures are reported
/// locally and never reach the caller.
#[derive(Debug)]
pub struct FactorLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FactorLog {
    /// Create a log writing to `path`; nothing is opened until the first record.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        FactorLog {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the line describing the outcome of factoring `target`.
    pub fn record(&self, target: i32, outcome: &Result<Vec<i32>, FactorError>) {
        let line = match outcome {
            Ok(factors) => format_line(target, factors),
            Err(FactorError::InvalidInput(_)) => format!("Factor {target}: invalid argument\n"),
        };
        self.append(&line);
    }

    /// Append one whole line.
    ///
    /// On failure the handle is dropped so the next append reopens the file.
    fn append(&self, line: &str) {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = write_line(&mut file, &self.path, line) {
            error!("factor log {:?} write failed: {e}", self.path);
            println!("Unable to write to factor log");
            *file = None;
        }
    }

    /// Flush and release the file; a later append opens it again.
    pub fn close(&self) -> io::Result<()> {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut f) = file.take() {
            f.flush()?;
            f.sync_all()?;
            info!("factor log {:?} closed", self.path);
        }
        Ok(())
    }
}

impl Drop for FactorLog {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("factor log {:?} close failed: {e}", self.path);
        }
    }
}

fn write_line(file: &mut Option<File>, path: &Path, line: &str) -> io::Result<()> {
    if let Some(f) = file.as_mut() {
        return f.write_all(line.as_bytes());
    }
    let f = OpenOptions::new().create(true).append(true).open(path)?;
    info!("factor log {path:?} opened");
    file.insert(f).write_all(line.as_bytes())
}

/// `Factor <target>: <f1> <f2> ...` terminated by a newline.
fn format_line(target: i32, factors: &[i32]) -> String {
    let mut line = format!("Factor {target}:");
    for f in factors {
        let _ = write!(line, " {f}");
    }
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn temp_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "simple_factors_{}_{}.log",
            std::process::id(),
            name
        ));
        std::fs::remove_file(&path).ok();
        path
    }

    #[test]
    fn file_is_opened_lazily() {
        let path = temp_path("lazy");
        let log = FactorLog::new(&path);
        assert!(!path.exists());

        log.record(12, &Ok(vec![2, 2, 3]));
        assert!(path.exists());
        drop(log);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Factor 12: 2 2 3\n");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn records_are_appended() {
        let path = temp_path("append");
        std::fs::write(&path, "Factor 4: 2 2\n").unwrap();

        let log = FactorLog::new(&path);
        log.record(1, &Ok(vec![]));
        log.record(-7, &Err(FactorError::InvalidInput(-7)));
        log.close().unwrap();
        log.record(97, &Ok(vec![97]));
        drop(log);

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Factor 4: 2 2\nFactor 1:\nFactor -7: invalid argument\nFactor 97: 97\n"
        );
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn write_failure_is_swallowed() {
        // a directory cannot be opened for appending
        let log = FactorLog::new(std::env::temp_dir());
        log.record(6, &Ok(vec![2, 3]));
        log.record(6, &Ok(vec![2, 3]));
        assert!(log.close().is_ok());
    }

    #[test]
    fn concurrent_records_keep_lines_whole() {
        let path = temp_path("concurrent");
        let log = Arc::new(FactorLog::new(&path));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let factors = vec![t + 2; 1 + (i % 5) as usize];
                        log.record(i, &Ok(factors));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        drop(log);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 8 * 200);
        for line in lines {
            let (head, factors) = line.split_once(':').unwrap();
            let i: usize = head.strip_prefix("Factor ").unwrap().parse().unwrap();
            let factors: Vec<i32> = factors
                .split_whitespace()
                .map(|f| f.parse().unwrap())
                .collect();
            assert_eq!(factors.len(), 1 + i % 5, "{line}");
            assert!(factors.iter().all(|&f| f == factors[0]), "{line}");
        }
        std::fs::remove_file(&path).ok();
    }
}
