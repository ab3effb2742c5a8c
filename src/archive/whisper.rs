//! A concrete, read-only reader for the fixed-schema archive file format
//! described in §3.H: a 16-byte header, a per-archive info table, then
//! each archive's ring-buffer data.
//!
//! This is the one real implementor of [`super::ArchiveFile`] this crate
//! ships; the on-disk format itself was explicitly out of scope for the
//! distilled spec ("assumed to implement the `ArchiveFile` contract"),
//! but a runnable binary needs something real to drive the fetch engine.

use super::ArchiveFile;
use crate::error::ArchiveError;
use crate::types::{ArchiveMetadata, PointSeries, Retention};
use byteorder::{BigEndian, ReadBytesExt};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Seek, SeekFrom};
use std::path::Path;

const HEADER_SIZE: u64 = 16;
const ARCHIVE_INFO_SIZE: u64 = 12;
const POINT_SIZE: u64 = 12;

#[derive(Debug, Clone, Copy)]
struct ArchiveInfo {
    offset: u32,
    seconds_per_point: u32,
    points: u32,
}

/// An open archive file. Holds the parsed header/archive-info table plus
/// a buffered file handle for on-demand ring-buffer reads.
pub struct WhisperFile {
    file: BufReader<File>,
    metadata: ArchiveMetadata,
    archive_infos: Vec<ArchiveInfo>,
}

impl WhisperFile {
    /// Opens `path`, validates the header, and returns a handle ready for
    /// `fetch`. Never follows a write path -- this crate has none.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path).map_err(|e| io_to_err(path, &e))?;
        let mut reader = BufReader::new(file);

        let aggregation_method = reader.read_u32::<BigEndian>().map_err(|e| io_to_err(path, &e))?;
        let max_retention = reader.read_u32::<BigEndian>().map_err(|e| io_to_err(path, &e))?;
        let x_files_factor = reader.read_f32::<BigEndian>().map_err(|e| io_to_err(path, &e))?;
        let archive_count = reader.read_u32::<BigEndian>().map_err(|e| io_to_err(path, &e))?;

        if archive_count == 0 {
            return Err(ArchiveError::CorruptMetadata("archive_count is zero".into()));
        }

        let mut archive_infos = Vec::with_capacity(archive_count as usize);
        let mut retentions = Vec::with_capacity(archive_count as usize);
        let mut prev_max_retention = 0u32;

        for _ in 0..archive_count {
            let offset = reader.read_u32::<BigEndian>().map_err(|e| io_to_err(path, &e))?;
            let seconds_per_point = reader.read_u32::<BigEndian>().map_err(|e| io_to_err(path, &e))?;
            let points = reader.read_u32::<BigEndian>().map_err(|e| io_to_err(path, &e))?;
            let this_max_retention = seconds_per_point.saturating_mul(points);

            if this_max_retention < prev_max_retention {
                return Err(ArchiveError::CorruptMetadata(
                    "archive max_retention is not non-decreasing".into(),
                ));
            }
            prev_max_retention = this_max_retention;

            archive_infos.push(ArchiveInfo {
                offset,
                seconds_per_point,
                points,
            });
            retentions.push(Retention::new(seconds_per_point, this_max_retention, points));
        }

        Ok(Self {
            file: reader,
            metadata: ArchiveMetadata {
                retentions,
                aggregation_method,
                max_retention,
                x_files_factor,
            },
            archive_infos,
        })
    }

    /// Reads every `(interval, value)` slot of one archive tier in
    /// on-disk order (not yet reordered into chronological order).
    fn read_raw_points(&mut self, info: ArchiveInfo) -> Result<Vec<(u32, f64)>, ArchiveError> {
        self.file
            .seek(SeekFrom::Start(u64::from(info.offset)))
            .map_err(|e| ArchiveError::Io {
                path: String::new(),
                message: e.to_string(),
            })?;

        let mut out = Vec::with_capacity(info.points as usize);
        for _ in 0..info.points {
            let interval = self.file.read_u32::<BigEndian>().map_err(io_err)?;
            let value = self.file.read_f64::<BigEndian>().map_err(io_err)?;
            out.push((interval, value));
        }
        Ok(out)
    }
}

impl ArchiveFile for WhisperFile {
    fn metadata(&self) -> &ArchiveMetadata {
        &self.metadata
    }

    fn fetch(&mut self, archive_index: usize, from: i64, until: i64) -> Result<PointSeries, ArchiveError> {
        let info = *self
            .archive_infos
            .get(archive_index)
            .ok_or_else(|| ArchiveError::CorruptMetadata(format!("no archive at index {archive_index}")))?;
        let step = i64::from(info.seconds_per_point);

        let from_aligned = align_down(from, step);
        let until_aligned = align_down(until, step) + step;
        let point_count = ((until_aligned - from_aligned) / step).max(0) as usize;

        let raw = self.read_raw_points(info)?;

        // The most-recently-written slot has the maximum interval; the
        // ring is overwritten oldest-first, so the slot right after it is
        // the oldest retained point.
        let newest_idx = raw
            .iter()
            .enumerate()
            .filter(|(_, (interval, _))| *interval != 0)
            .max_by_key(|(_, (interval, _))| *interval)
            .map(|(idx, _)| idx);

        let mut by_interval: HashMap<i64, f64> = HashMap::with_capacity(raw.len());
        if let Some(newest_idx) = newest_idx {
            let n = raw.len();
            for offset in 0..n {
                let idx = (newest_idx + 1 + offset) % n;
                let (interval, value) = raw[idx];
                if interval != 0 {
                    by_interval.insert(i64::from(interval), value);
                }
            }
        }

        let mut values = Vec::with_capacity(point_count);
        for i in 0..point_count {
            let ts = from_aligned + (i as i64) * step;
            values.push(by_interval.get(&ts).copied().unwrap_or(f64::NAN));
        }

        Ok(PointSeries {
            from_time: from_aligned,
            until_time: until_aligned,
            step: info.seconds_per_point,
            values,
        })
    }
}

fn align_down(ts: i64, step: i64) -> i64 {
    ts - ts.rem_euclid(step)
}

fn io_to_err(path: &Path, e: &io::Error) -> ArchiveError {
    if e.kind() == io::ErrorKind::NotFound {
        ArchiveError::NotFound(path.display().to_string())
    } else {
        ArchiveError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    }
}

fn io_err(e: io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: String::new(),
        message: e.to_string(),
    }
}

/// Writes a minimal, spec-conformant whisper file for tests: the header,
/// the archive-info table, and zeroed-out archive data (all slots
/// `interval=0`, meaning "never written").
#[cfg(test)]
pub fn write_test_file(
    path: &Path,
    aggregation_method: u32,
    x_files_factor: f32,
    archives: &[(u32, u32)],
) -> io::Result<()> {
    use byteorder::WriteBytesExt;
    use std::io::Write;

    let mut buf = Vec::new();
    let max_retention = archives.iter().map(|(spp, pts)| spp * pts).max().unwrap_or(0);
    buf.write_u32::<BigEndian>(aggregation_method)?;
    buf.write_u32::<BigEndian>(max_retention)?;
    buf.write_f32::<BigEndian>(x_files_factor)?;
    buf.write_u32::<BigEndian>(archives.len() as u32)?;

    let header_and_table_size = HEADER_SIZE + (archives.len() as u64) * ARCHIVE_INFO_SIZE;
    let mut offset = header_and_table_size;
    let mut offsets = Vec::with_capacity(archives.len());
    for (spp, points) in archives {
        offsets.push(offset as u32);
        buf.write_u32::<BigEndian>(offset as u32)?;
        buf.write_u32::<BigEndian>(*spp)?;
        buf.write_u32::<BigEndian>(*points)?;
        offset += u64::from(*points) * POINT_SIZE;
    }

    for (_, points) in archives {
        for _ in 0..*points {
            buf.write_u32::<BigEndian>(0)?;
            buf.write_f64::<BigEndian>(0.0)?;
        }
    }

    let mut file = File::create(path)?;
    file.write_all(&buf)?;
    Ok(())
}

#[cfg(test)]
pub fn write_point(
    path: &Path,
    archive_index: usize,
    archives: &[(u32, u32)],
    slot: usize,
    interval: u32,
    value: f64,
) -> io::Result<()> {
    use byteorder::WriteBytesExt;
    use std::io::Write;

    let header_and_table_size = HEADER_SIZE + (archives.len() as u64) * ARCHIVE_INFO_SIZE;
    let mut archive_offset = header_and_table_size;
    for (_, points) in &archives[..archive_index] {
        archive_offset += u64::from(*points) * POINT_SIZE;
    }
    let slot_offset = archive_offset + (slot as u64) * POINT_SIZE;

    let mut file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(slot_offset))?;
    file.write_u32::<BigEndian>(interval)?;
    file.write_f64::<BigEndian>(value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_parses_header_and_retentions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.wsp");
        write_test_file(&path, 1, 0.5, &[(10, 360), (60, 1440)]).unwrap();

        let file = WhisperFile::open(&path).unwrap();
        assert_eq!(file.aggregation_method(), 1);
        assert_eq!(file.x_files_factor(), 0.5);
        let retentions = file.retentions();
        assert_eq!(retentions.len(), 2);
        assert_eq!(retentions[0].seconds_per_point, 10);
        assert_eq!(retentions[0].max_retention, 3600);
        assert_eq!(retentions[1].seconds_per_point, 60);
        assert_eq!(retentions[1].max_retention, 86400);
    }

    #[test]
    fn open_rejects_non_monotonic_max_retention() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.wsp");
        // Second archive's max_retention (60*10=600) is less than the
        // first's (10*360=3600): invalid.
        write_test_file(&path, 1, 0.5, &[(10, 360), (60, 10)]).unwrap();
        assert!(matches!(
            WhisperFile::open(&path),
            Err(ArchiveError::CorruptMetadata(_))
        ));
    }

    #[test]
    fn open_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.wsp");
        assert!(matches!(WhisperFile::open(&path), Err(ArchiveError::NotFound(_))));
    }

    #[test]
    fn fetch_with_no_written_points_is_all_nan() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.wsp");
        write_test_file(&path, 1, 0.5, &[(10, 360)]).unwrap();
        let mut file = WhisperFile::open(&path).unwrap();
        let series = file.fetch(0, 1_000_000, 1_000_100).unwrap();
        assert!(series.values.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn fetch_recovers_written_points_in_chronological_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("written.wsp");
        let archives = [(10u32, 5u32)];
        write_test_file(&path, 1, 0.5, &archives).unwrap();
        // Write a tiny ring: slot 0 holds the newest point.
        write_point(&path, 0, &archives, 0, 1_000_040, 4.0).unwrap();
        write_point(&path, 0, &archives, 1, 1_000_010, 1.0).unwrap();
        write_point(&path, 0, &archives, 2, 1_000_020, 2.0).unwrap();
        write_point(&path, 0, &archives, 3, 1_000_030, 3.0).unwrap();
        // slot 4 left as never-written (interval=0).

        let mut file = WhisperFile::open(&path).unwrap();
        let series = file.fetch(0, 1_000_010, 1_000_050).unwrap();
        assert_eq!(series.step, 10);
        assert_eq!(
            series.values,
            vec![1.0, 2.0, 3.0, 4.0],
            "expected chronological reconstruction of the ring"
        );
    }
}
