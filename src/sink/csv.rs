use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Result;
use crate::records::TableRecord;

/// Append-only CSV destination. The first write to an empty file emits a
/// UTF-8 BOM and the header row; every later append writes data rows
/// only. A write lock serializes appends so concurrent workers cannot
/// interleave rows.
pub struct CsvSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append<R: TableRecord>(&self, rows: &[R]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let fresh = file.metadata()?.len() == 0;
        if fresh {
            file.write_all("\u{feff}".as_bytes())?;
        }

        let mut writer = ::csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if fresh {
            writer.write_record(R::FIELDS)?;
        }
        for row in rows {
            writer.write_record(row.values())?;
        }
        writer.flush()?;
        Ok(())
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::ChannelVideoRow;

    fn row(bvid: &str) -> ChannelVideoRow {
        ChannelVideoRow {
            bvid: bvid.into(),
            url: format!("https://example.com/v/{bvid}"),
            tags: "a,b".into(),
            crawl_time: "2022-09-05 10:00:00".into(),
        }
    }

    #[test]
    fn header_written_exactly_once_across_appends() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("out.csv"));

        sink.append(&[row("BV1"), row("BV2")]).unwrap();
        sink.append(&[row("BV3")]).unwrap();

        let text = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("bvid,url,tags,channel_crawl_time"));
        assert_eq!(
            text.matches("channel_crawl_time").count(),
            1,
            "second append must not duplicate the header"
        );
    }

    #[test]
    fn fresh_file_starts_with_bom() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("out.csv"));
        sink.append(&[row("BV1")]).unwrap();

        let bytes = std::fs::read(sink.path()).unwrap();
        assert_eq!(&bytes[..3], b"\xef\xbb\xbf");
        // Appending again must not repeat the BOM.
        sink.append(&[row("BV2")]).unwrap();
        let bytes = std::fs::read(sink.path()).unwrap();
        assert_eq!(bytes.windows(3).filter(|w| *w == b"\xef\xbb\xbf").count(), 1);
    }

    #[test]
    fn empty_batch_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("out.csv"));
        sink.append::<ChannelVideoRow>(&[]).unwrap();
        assert!(!sink.path().exists());
    }

    #[test]
    fn embedded_separators_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("out.csv"));
        let mut r = row("BV1");
        r.tags = "news, weather".into();
        sink.append(&[r]).unwrap();
        let text = std::fs::read_to_string(sink.path()).unwrap();
        assert!(text.contains("\"news, weather\""));
    }
}
