//! Run Iterator
//!
//! Sequential iteration over all records of a run's data segment, in key
//! order. Each iterator owns its own file handle, so several can be open on
//! the same run (compaction) while point lookups continue.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Take};
use std::path::Path;

use crate::error::Result;
use crate::record::{read_frame, Record};

/// Iterator over run records in ascending key order
pub struct RunIterator {
    reader: Take<BufReader<File>>,
    /// Stops iteration after the first error
    failed: bool,
}

impl RunIterator {
    /// Iterate the `size` bytes of the data segment starting at `offset`
    pub(super) fn new(path: &Path, offset: u64, size: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            reader: BufReader::new(file).take(size),
            failed: false,
        })
    }
}

impl Iterator for RunIterator {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match read_frame(&mut self.reader) {
            Ok(Some((record, _))) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
