//! Segment files: `<dir>/NNNNNN.log`, scanned and appended to in id order.

use crate::frame::{encode_frame, parse_header, verify_crc, FRAME_HEADER_LEN};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const SEGMENT_DIGITS: usize = 6;

pub fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{:0width$}.log", id, width = SEGMENT_DIGITS))
}

/// Lists existing segment ids in `dir`, sorted ascending.
pub fn list_segment_ids(dir: &Path) -> std::io::Result<Vec<u64>> {
    let mut ids = Vec::new();
    if !dir.exists() {
        return Ok(ids);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(stem) = name.strip_suffix(".log") {
            if let Ok(id) = stem.parse::<u64>() {
                ids.push(id);
            }
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// A record recovered while scanning a segment: its offset, data, and byte
/// length on disk (header + payload), for callers that need to know where
/// the valid prefix of the file ends.
pub struct ScannedRecord {
    pub offset: u64,
    pub data: Vec<u8>,
}

/// Scans `path` frame by frame, stopping cleanly (no error) at the first
/// partial header, partial payload, or checksum mismatch — each is treated
/// as a torn trailing write, not a fatal condition (§4.4). Returns the
/// recovered records and the byte length of the valid prefix, so a caller
/// reopening the file for append can truncate away any torn tail.
pub fn scan_segment(path: &Path) -> std::io::Result<(Vec<ScannedRecord>, u64)> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(err) => return Err(err),
    };
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;

    let mut records = Vec::new();
    let mut cursor = 0usize;
    loop {
        // A corrupt header is indistinguishable from a torn trailing write
        // here: both stop the scan cleanly rather than erroring (§4.4).
        let Ok(Some((offset, len, crc))) = parse_header(&buf[cursor..]) else {
            break;
        };
        let data_start = cursor + FRAME_HEADER_LEN;
        let data_end = data_start + len as usize;
        if data_end > buf.len() {
            break;
        }
        let data = &buf[data_start..data_end];
        if !verify_crc(data, crc) {
            break;
        }
        records.push(ScannedRecord {
            offset,
            data: data.to_vec(),
        });
        cursor = data_end;
    }
    Ok((records, cursor as u64))
}

/// A segment open for appending, buffering writes in user space until
/// explicitly flushed.
pub struct ActiveSegment {
    pub id: u64,
    path: PathBuf,
    writer: BufWriter<File>,
    pub size: u64,
    pub unflushed_bytes: usize,
}

impl ActiveSegment {
    pub fn create(dir: &Path, id: u64) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = segment_path(dir, id);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            id,
            path,
            writer: BufWriter::new(file),
            size,
            unflushed_bytes: 0,
        })
    }

    pub fn append(&mut self, offset: u64, data: &[u8]) -> std::io::Result<u64> {
        let frame = encode_frame(offset, data);
        self.writer.write_all(&frame)?;
        self.size += frame.len() as u64;
        self.unflushed_bytes += frame.len();
        Ok(frame.len() as u64)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()?;
        self.unflushed_bytes = 0;
        Ok(())
    }

    pub fn sync(&mut self) -> std::io::Result<()> {
        self.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reopens an existing segment file for further appends, truncating
    /// away any torn trailing bytes beyond `valid_len` first.
    pub fn reopen_for_append(dir: &Path, id: u64, valid_len: u64) -> std::io::Result<Self> {
        let path = segment_path(dir, id);
        {
            let file = OpenOptions::new().write(true).open(&path)?;
            file.set_len(valid_len)?;
        }
        let file = OpenOptions::new().append(true).open(&path)?;
        Ok(Self {
            id,
            path,
            writer: BufWriter::new(file),
            size: valid_len,
            unflushed_bytes: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_scan_recovers_records() {
        let dir = tempdir().unwrap();
        {
            let mut seg = ActiveSegment::create(dir.path(), 0).unwrap();
            seg.append(0, b"one").unwrap();
            seg.append(1, b"two").unwrap();
            seg.sync().unwrap();
        }
        let (records, _valid_len) = scan_segment(&segment_path(dir.path(), 0)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, 0);
        assert_eq!(records[0].data, b"one");
        assert_eq!(records[1].offset, 1);
        assert_eq!(records[1].data, b"two");
    }

    #[test]
    fn truncated_trailing_frame_is_treated_as_absent() {
        let dir = tempdir().unwrap();
        let path = segment_path(dir.path(), 0);
        {
            let mut seg = ActiveSegment::create(dir.path(), 0).unwrap();
            seg.append(0, b"whole").unwrap();
            seg.sync().unwrap();
        }
        // Append a truncated second frame directly.
        {
            use std::io::Write as _;
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&1u64.to_le_bytes()).unwrap();
            file.write_all(&100u32.to_le_bytes()).unwrap();
            // no crc, no data
        }
        let (records, valid_len) = scan_segment(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data, b"whole");
        assert!(valid_len < std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn reopen_for_append_truncates_torn_tail() {
        let dir = tempdir().unwrap();
        let path = segment_path(dir.path(), 0);
        {
            let mut seg = ActiveSegment::create(dir.path(), 0).unwrap();
            seg.append(0, b"whole").unwrap();
            seg.sync().unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[0xAB; 10]).unwrap();
        }
        let (_records, valid_len) = scan_segment(&path).unwrap();
        let mut seg = ActiveSegment::reopen_for_append(dir.path(), 0, valid_len).unwrap();
        seg.append(1, b"next").unwrap();
        seg.sync().unwrap();

        let (records, _) = scan_segment(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].data, b"next");
    }

    #[test]
    fn list_segment_ids_sorts_ascending() {
        let dir = tempdir().unwrap();
        ActiveSegment::create(dir.path(), 2).unwrap();
        ActiveSegment::create(dir.path(), 0).unwrap();
        ActiveSegment::create(dir.path(), 1).unwrap();
        assert_eq!(list_segment_ids(dir.path()).unwrap(), vec![0, 1, 2]);
    }
}
