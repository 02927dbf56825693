//! Chunked source reading for raw order records
//!
//! Produces a lazy, finite sequence of record batches from an abstract
//! source, preserving source order within and across batches. Every record
//! is stamped with a monotonically increasing sequence number at read time;
//! resumption from a row offset re-seeds that counter so retried runs see
//! identical sequence numbers.
//!
//! Malformed rows (wrong arity, broken quoting) are carried through as
//! records with `framing_error` set and rejected by the cleaning stage;
//! only unreadable source media is a fatal reader error.

use crate::app::models::RawRecord;
use crate::app::services::partition::PartitionStore;
use crate::constants::{FIELD_COUNT, ORDER_COLUMNS};
use crate::{Error, Result};
use async_trait::async_trait;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Abstract batch source: open → next_batch → drop
///
/// Implementations must preserve source order and return `None` exactly once
/// at end of input.
#[async_trait]
pub trait RecordSource: Send {
    /// Read the next batch of up to `batch_size` records
    async fn next_batch(&mut self) -> Result<Option<Vec<RawRecord>>>;

    /// Number of data rows consumed so far, including any skipped offset.
    /// This is the value to pass as `resume_offset` after a partial failure.
    fn position(&self) -> u64;
}

// =============================================================================
// CSV File Source
// =============================================================================

/// Chunked CSV source with header-or-positional column mapping
pub struct CsvSource {
    path: PathBuf,
    reader: csv::Reader<File>,
    /// Maps canonical column position -> source column index.
    /// `None` means the file has no header row and columns are positional.
    header_map: Option<[Option<usize>; FIELD_COUNT]>,
    /// First row buffered during header detection when it turned out to be
    /// data (headerless source); consumed before the reader is touched again
    pending: Option<csv::StringRecord>,
    batch_size: usize,
    /// Next sequence number to assign (equals rows consumed + offset)
    seq: u64,
    done: bool,
}

impl CsvSource {
    /// Open a CSV source reading from the first data row
    pub fn open(path: impl AsRef<Path>, batch_size: usize) -> Result<Self> {
        Self::open_with_offset(path, batch_size, 0)
    }

    /// Open a CSV source, skipping the first `offset` data rows
    ///
    /// The skip is streaming (no full-file buffering) and the sequence
    /// counter starts at `offset`, so resumed reads assign the same
    /// sequence numbers the original run would have.
    pub fn open_with_offset(
        path: impl AsRef<Path>,
        batch_size: usize,
        offset: u64,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| Error::io(format!("Failed to open source '{}'", path.display()), e))?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let (header_map, pending) = Self::detect_header(&mut reader, &path)?;

        let mut source = Self {
            path,
            reader,
            header_map,
            pending,
            batch_size,
            seq: 0,
            done: false,
        };

        // Streaming skip for resumption; byte records avoid UTF-8 work
        let mut skipped = 0u64;
        if offset > 0 && source.pending.take().is_some() {
            skipped += 1;
        }
        let mut row = csv::ByteRecord::new();
        while skipped < offset {
            match source.reader.read_byte_record(&mut row) {
                Ok(true) => skipped += 1,
                Ok(false) => break,
                // A malformed row still occupies one source position
                Err(_) => skipped += 1,
            }
        }
        source.seq = offset;

        info!(
            "Opened CSV source '{}' (batch size {}, offset {})",
            source.path.display(),
            batch_size,
            offset
        );
        Ok(source)
    }

    /// Inspect the first row; if it names any of the known columns it is a
    /// header and yields a name-based mapping, otherwise the source is
    /// positional and the row is returned for consumption as data.
    #[allow(clippy::type_complexity)]
    fn detect_header(
        reader: &mut csv::Reader<File>,
        path: &Path,
    ) -> Result<(
        Option<[Option<usize>; FIELD_COUNT]>,
        Option<csv::StringRecord>,
    )> {
        let mut first = csv::StringRecord::new();
        let has_first = reader.read_record(&mut first).map_err(|e| {
            Error::csv_parsing(path.display().to_string(), "unreadable first row", Some(e))
        })?;

        if !has_first {
            // Empty file: no header, nothing to read
            return Ok((None, None));
        }

        let names: Vec<String> = first
            .iter()
            .map(|f| f.trim().to_ascii_lowercase())
            .collect();
        let is_header = ORDER_COLUMNS.iter().any(|c| names.iter().any(|n| n == c));

        if !is_header {
            // Positional source: the first row is data
            debug!("No header row in '{}', using positional columns", path.display());
            return Ok((None, Some(first)));
        }

        let mut map = [None; FIELD_COUNT];
        for (canonical_idx, canonical) in ORDER_COLUMNS.iter().enumerate() {
            map[canonical_idx] = names.iter().position(|n| n == canonical);
        }

        debug!("Header mapping for '{}': {:?}", path.display(), map);
        Ok((Some(map), None))
    }

    /// Convert one framed row into a raw record using the column mapping
    fn record_from_row(&self, seq: u64, row: &csv::StringRecord) -> RawRecord {
        let field = |source_idx: Option<usize>| -> Option<String> {
            source_idx
                .and_then(|i| row.get(i))
                .map(|s| s.to_string())
        };

        match &self.header_map {
            Some(map) => {
                let fields: Vec<Option<String>> = map.iter().map(|idx| field(*idx)).collect();
                // Arity is guaranteed by construction of `map`
                RawRecord::from_fields(seq, fields)
                    .unwrap_or_else(|_| RawRecord::malformed(seq, "internal mapping error"))
            }
            None => {
                if row.len() != FIELD_COUNT {
                    return RawRecord::malformed(
                        seq,
                        format!("row has {} fields, expected {}", row.len(), FIELD_COUNT),
                    );
                }
                let fields: Vec<Option<String>> =
                    (0..FIELD_COUNT).map(|i| field(Some(i))).collect();
                RawRecord::from_fields(seq, fields)
                    .unwrap_or_else(|_| RawRecord::malformed(seq, "internal mapping error"))
            }
        }
    }
}

#[async_trait]
impl RecordSource for CsvSource {
    async fn next_batch(&mut self) -> Result<Option<Vec<RawRecord>>> {
        if self.done {
            return Ok(None);
        }

        let mut batch = Vec::with_capacity(self.batch_size);
        let mut row = csv::StringRecord::new();

        if let Some(first) = self.pending.take() {
            let record = self.record_from_row(self.seq, &first);
            self.seq += 1;
            batch.push(record);
        }

        while batch.len() < self.batch_size {
            match self.reader.read_record(&mut row) {
                Ok(true) => {
                    let record = self.record_from_row(self.seq, &row);
                    self.seq += 1;
                    batch.push(record);
                }
                Ok(false) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    // Per-row framing failure: reject the row, keep reading.
                    // The csv reader recovers at the next record boundary.
                    debug!(
                        "Framing error at row {} of '{}': {}",
                        self.seq,
                        self.path.display(),
                        e
                    );
                    batch.push(RawRecord::malformed(self.seq, e.to_string()));
                    self.seq += 1;
                }
            }
        }

        if batch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }

    fn position(&self) -> u64 {
        self.seq
    }
}

// =============================================================================
// Staged Store Source
// =============================================================================

/// Chunked source over the raw staging collection of a partition store
///
/// Used by the cleaning stage to re-read staged records with the same
/// batch-sequence semantics as the file source.
pub struct StoreSource {
    store: Arc<dyn PartitionStore>,
    batch_size: usize,
    offset: u64,
    done: bool,
}

impl StoreSource {
    pub fn new(store: Arc<dyn PartitionStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size,
            offset: 0,
            done: false,
        }
    }
}

#[async_trait]
impl RecordSource for StoreSource {
    async fn next_batch(&mut self) -> Result<Option<Vec<RawRecord>>> {
        if self.done {
            return Ok(None);
        }

        let batch = self.store.read_raw_batch(self.offset, self.batch_size).await?;
        if batch.is_empty() {
            self.done = true;
            return Ok(None);
        }

        self.offset += batch.len() as u64;
        Ok(Some(batch))
    }

    fn position(&self) -> u64 {
        self.offset
    }
}
