// STPM3x DAQ - Multiplexed metering acquisition layer
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Bounded, persisted per-channel sample history.
//!
//! Each channel keeps one [`SampleLog`]: a capacity-bounded queue of
//! tick records, where a record is the list of samples one tick
//! produced in sensor declaration order. On disk the log is JSON
//! lines, one record per line as an array of `[timestamp_ms, value]`
//! pairs. Appends go straight to disk; evicted records accumulate in
//! the file until a periodic rewrite reclaims the space.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::warn;

use crate::channel::Sample;
use crate::error::{DaqError, Result};

#[derive(Debug)]
pub struct SampleLog {
    path: PathBuf,
    capacity: usize,
    entries: VecDeque<Vec<Sample>>,
    file: File,
    file_lines: usize,
    // A failed append may have left a partial line at the end of the
    // file; the next push rewrites the file before appending.
    tail_suspect: bool,
}

impl SampleLog {
    /// Open or create a log, reloading any persisted records.
    ///
    /// Records beyond `capacity` are dropped oldest-first. A torn final
    /// line (an interrupted append) is dropped with a warning; damage
    /// anywhere earlier is reported as [`DaqError::CorruptLog`].
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let path = path.into();
        let capacity = capacity.max(1);

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let lines: Vec<(usize, &str)> = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .collect();

        let mut entries: VecDeque<Vec<Sample>> = VecDeque::new();
        let mut disk_lines = 0usize;
        let last = lines.len().saturating_sub(1);
        for (i, (line_no, line)) in lines.iter().enumerate() {
            match serde_json::from_str::<Vec<(u64, f64)>>(line) {
                Ok(pairs) => {
                    entries.push_back(
                        pairs
                            .into_iter()
                            .map(|(timestamp_ms, value)| Sample {
                                timestamp_ms,
                                value,
                            })
                            .collect(),
                    );
                    disk_lines += 1;
                }
                Err(_) if i == last => {
                    warn!(
                        "dropping torn record at {} line {}",
                        path.display(),
                        line_no + 1
                    );
                    disk_lines += 1;
                }
                Err(source) => {
                    return Err(DaqError::CorruptLog {
                        path,
                        line: line_no + 1,
                        source,
                    });
                }
            }
        }

        while entries.len() > capacity {
            entries.pop_front();
        }

        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        let mut log = Self {
            path,
            capacity,
            entries,
            file,
            file_lines: disk_lines,
            tail_suspect: false,
        };
        if log.file_lines != log.entries.len() {
            log.compact()?;
        }
        Ok(log)
    }

    /// Append one tick record, evicting the oldest once at capacity.
    ///
    /// The disk append happens first; the retained entries only change
    /// once the record is durably on its own line. A failed append
    /// leaves the in-memory log untouched and the file tail marked
    /// suspect, and the next push rewrites the file before appending,
    /// so a transient disk fault never corrupts the history.
    pub fn push(&mut self, samples: Vec<Sample>) -> Result<()> {
        if self.tail_suspect {
            self.compact()?;
        }

        let mut frame = encode_record(&samples)?.into_bytes();
        frame.push(b'\n');
        if let Err(e) = self.file.write_all(&frame) {
            self.tail_suspect = true;
            return Err(e.into());
        }
        self.file_lines += 1;

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(samples);

        if self.file_lines >= self.capacity.saturating_mul(2) {
            self.compact()?;
        }
        Ok(())
    }

    /// Oldest retained record.
    pub fn peek(&self) -> Option<&[Sample]> {
        self.entries.front().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the file to exactly the retained records.
    fn compact(&mut self) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        let mut out = File::create(&tmp)?;
        for samples in &self.entries {
            let line = encode_record(samples)?;
            out.write_all(line.as_bytes())?;
            out.write_all(b"\n")?;
        }
        out.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        self.file = OpenOptions::new().append(true).create(true).open(&self.path)?;
        self.file_lines = self.entries.len();
        self.tail_suspect = false;
        Ok(())
    }
}

fn encode_record(samples: &[Sample]) -> Result<String> {
    let pairs: Vec<(u64, f64)> = samples.iter().map(|s| (s.timestamp_ms, s.value)).collect();
    Ok(serde_json::to_string(&pairs).map_err(io::Error::from)?)
}
