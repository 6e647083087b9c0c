//! Range scanner.
//!
//! Walks the frame headers of one data file and records where each record
//! lives, without reading the bodies.

use crate::error::{CoreError, CoreResult};
use crate::frame::{decode_header, HEADER_SIZE};
use crate::types::RecordRange;
use tcpmon_storage::ReadableFile;

/// How the scanner treats a record cut short by end of file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailPolicy {
    /// A partial trailing record ends the scan. Used for raw files, whose
    /// writer may be mid-append.
    Tolerant,
    /// A partial trailing record is a [`CoreError::Format`]. Used for
    /// sealed files.
    Strict,
}

/// Scans `source` and returns the ranges of every complete record.
///
/// The file size is sampled once; bytes appended during the scan are not
/// visited.
///
/// # Errors
///
/// Returns [`CoreError::Format`] on a version mismatch, or on a truncated
/// record under [`TailPolicy::Strict`]. I/O errors are propagated.
pub fn scan(source: &dyn ReadableFile, tail: TailPolicy) -> CoreResult<Vec<RecordRange>> {
    let size = source.size()?;
    let mut ranges = Vec::new();
    let mut offset = 0u64;

    while offset < size {
        if size - offset < HEADER_SIZE as u64 {
            return truncated(tail, ranges, offset, "header");
        }

        let header = source.read_at(offset, HEADER_SIZE)?;
        let body_len = decode_header(&header).map_err(|e| at_offset(e, offset))?;
        let body_offset = offset + HEADER_SIZE as u64;
        let end = body_offset + u64::from(body_len);
        if end > size {
            return truncated(tail, ranges, offset, "body");
        }

        ranges.push(RecordRange {
            header_offset: offset,
            header_len: HEADER_SIZE as u32,
            body_offset,
            body_len,
        });
        offset = end;
    }

    Ok(ranges)
}

/// Returns the offset one past the last complete record.
#[must_use]
pub fn complete_len(ranges: &[RecordRange]) -> u64 {
    ranges.last().map_or(0, RecordRange::end)
}

/// Reads the body of one record.
///
/// # Errors
///
/// Returns an error if the range lies outside the file.
pub fn read_body(source: &dyn ReadableFile, range: &RecordRange) -> CoreResult<Vec<u8>> {
    Ok(source.read_at(range.body_offset, range.body_len as usize)?)
}

fn truncated(
    tail: TailPolicy,
    ranges: Vec<RecordRange>,
    offset: u64,
    part: &str,
) -> CoreResult<Vec<RecordRange>> {
    match tail {
        TailPolicy::Tolerant => Ok(ranges),
        TailPolicy::Strict => Err(CoreError::format(format!(
            "truncated record {part} at offset {offset}"
        ))),
    }
}

fn at_offset(err: CoreError, offset: u64) -> CoreError {
    match err {
        CoreError::Format { message } => CoreError::format(format!("offset {offset}: {message}")),
        other => other,
    }
}
