use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, Month, NaiveDateTime, Timelike};

use super::StagedRecord;
use crate::error::DrainError;
use crate::record::AnalyticsRecord;

const SINK: &str = "csv";

pub const HEADER: [&str; 11] = [
    "METHOD",
    "PATH",
    "SIZE",
    "UA",
    "DAY",
    "MONTH",
    "YEAR",
    "HOUR",
    "RESPONSE",
    "APINAME",
    "APIVERSION",
];

/// Writes each drained batch to a fresh CSV file in `output_dir`.
///
/// The file is assembled under a `.partial` name and renamed into place
/// only once it is complete, so a failed cycle leaves nothing behind and
/// its retry produces exactly one file.
#[derive(Debug, Clone)]
pub struct FlatFileSink {
    output_dir: PathBuf,
}

impl FlatFileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn write_batch(&mut self, batch: &[StagedRecord]) -> Result<usize, DrainError> {
        self.write_batch_at(batch, Local::now().naive_local()).await
    }

    /// Like `write_batch`, naming the file after `now` instead of the clock.
    pub async fn write_batch_at(
        &self,
        batch: &[StagedRecord],
        now: NaiveDateTime,
    ) -> Result<usize, DrainError> {
        let dir = self.output_dir.clone();
        let records: Vec<AnalyticsRecord> = batch.iter().map(|s| s.record.clone()).collect();

        let (path, rows) = tokio::task::spawn_blocking(move || write_file(&dir, &records, now))
            .await
            .map_err(|e| DrainError::sink_write(SINK, e))??;

        tracing::info!(file = %path.display(), rows, "Wrote analytics batch");
        Ok(rows)
    }
}

/// `<year>-<MonthName>-<day>-<hour>-<minute>.csv`, unpadded.
pub fn file_name(now: NaiveDateTime, attempt: u32) -> String {
    let stem = format!(
        "{}-{}-{}-{}-{}",
        now.year(),
        month_name(now.month()),
        now.day(),
        now.hour(),
        now.minute()
    );
    if attempt == 0 {
        format!("{stem}.csv")
    } else {
        format!("{stem}-{attempt}.csv")
    }
}

fn month_name(month: u32) -> &'static str {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map_or("Unknown", |m| m.name())
}

pub fn to_row(r: &AnalyticsRecord) -> [String; 11] {
    [
        r.method.clone(),
        r.path.clone(),
        r.content_length.to_string(),
        r.user_agent.clone(),
        r.day.to_string(),
        month_name(r.month).to_string(),
        r.year.to_string(),
        r.hour.to_string(),
        r.response_code.to_string(),
        r.api_name.clone(),
        r.api_version.clone(),
    ]
}

/// First free name for this minute; a second cycle inside the same minute
/// gets a numeric suffix rather than overwriting the first file.
fn free_path(dir: &Path, now: NaiveDateTime) -> (PathBuf, PathBuf) {
    let mut attempt = 0;
    loop {
        let path = dir.join(file_name(now, attempt));
        let partial = path.with_extension("csv.partial");
        if !path.exists() && !partial.exists() {
            return (path, partial);
        }
        attempt += 1;
    }
}

fn write_file(
    dir: &Path,
    records: &[AnalyticsRecord],
    now: NaiveDateTime,
) -> Result<(PathBuf, usize), DrainError> {
    fs::create_dir_all(dir).map_err(|e| {
        DrainError::sink_write(SINK, format!("creating {}: {e}", dir.display()))
    })?;

    let (path, partial) = free_path(dir, now);
    match write_rows(&partial, records) {
        Ok(rows) => {
            fs::rename(&partial, &path).map_err(|e| {
                let _ = fs::remove_file(&partial);
                DrainError::sink_write(SINK, format!("renaming into {}: {e}", path.display()))
            })?;
            Ok((path, rows))
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            Err(e)
        }
    }
}

fn write_rows(partial: &Path, records: &[AnalyticsRecord]) -> Result<usize, DrainError> {
    let file = File::create(partial).map_err(|e| {
        DrainError::sink_write(SINK, format!("creating {}: {e}", partial.display()))
    })?;
    let mut writer = ::csv::Writer::from_writer(file);

    writer
        .write_record(HEADER)
        .map_err(|e| DrainError::sink_write(SINK, format!("failed to write file headers: {e}")))?;

    let mut rows = 0;
    for record in records {
        // A bad row costs that row only, not the batch
        match writer.write_record(to_row(record)) {
            Ok(()) => rows += 1,
            Err(e) => tracing::error!(error = %e, path = %record.path, "File write failed"),
        }
    }

    writer
        .flush()
        .map_err(|e| DrainError::sink_write(SINK, format!("flush: {e}")))?;
    let file = writer
        .into_inner()
        .map_err(|e| DrainError::sink_write(SINK, e.error()))?;
    file.sync_all()
        .map_err(|e| DrainError::sink_write(SINK, format!("sync: {e}")))?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 5)
            .unwrap()
            .and_hms_opt(h, m, 30)
            .unwrap()
    }

    fn staged(path: &str, code: u16) -> StagedRecord {
        let ts = Utc.with_ymd_and_hms(2024, 2, 5, 14, 3, 0).unwrap();
        let mut record = AnalyticsRecord::new("GET", path, code, ts);
        record.content_length = 12;
        record.user_agent = "agent/1.0".into();
        record.api_name = "Widgets".into();
        record.api_version = "v1".into();
        StagedRecord {
            key: format!("k-{path}"),
            record,
        }
    }

    #[test]
    fn test_file_name_format() {
        assert_eq!(file_name(at(9, 7), 0), "2024-February-5-9-7.csv");
        assert_eq!(file_name(at(9, 7), 2), "2024-February-5-9-7-2.csv");
    }

    #[test]
    fn test_row_columns_in_header_order() {
        let row = to_row(&staged("/a", 404).record);
        assert_eq!(
            row,
            ["GET", "/a", "12", "agent/1.0", "5", "February", "2024", "14", "404", "Widgets", "v1"]
                .map(String::from)
        );
    }

    #[tokio::test]
    async fn test_write_batch_creates_directory_and_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("out");
        let sink = FlatFileSink::new(&dir);

        let rows = sink
            .write_batch_at(&[staged("/a", 200), staged("/b", 500)], at(14, 3))
            .await
            .unwrap();
        assert_eq!(rows, 2);

        let contents = fs::read_to_string(dir.join("2024-February-5-14-3.csv")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "METHOD,PATH,SIZE,UA,DAY,MONTH,YEAR,HOUR,RESPONSE,APINAME,APIVERSION");
        assert_eq!(lines[1], "GET,/a,12,agent/1.0,5,February,2024,14,200,Widgets,v1");
        assert_eq!(lines.len(), 3);
    }

    #[tokio::test]
    async fn test_same_minute_does_not_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = FlatFileSink::new(tmp.path());

        sink.write_batch_at(&[staged("/first", 200)], at(8, 0)).await.unwrap();
        sink.write_batch_at(&[staged("/second", 200)], at(8, 0)).await.unwrap();

        let first = fs::read_to_string(tmp.path().join("2024-February-5-8-0.csv")).unwrap();
        let second = fs::read_to_string(tmp.path().join("2024-February-5-8-0-1.csv")).unwrap();
        assert!(first.contains("/first"));
        assert!(second.contains("/second"));
    }

    #[tokio::test]
    async fn test_unusable_directory_fails_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        fs::write(&blocker, b"occupied").unwrap();

        let mut sink = FlatFileSink::new(&blocker);
        let err = sink.write_batch(&[staged("/a", 200)]).await.unwrap_err();
        assert!(matches!(err, DrainError::SinkWriteFailed { sink: "csv", .. }));
    }

    #[tokio::test]
    async fn test_quoting_survives_commas() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = FlatFileSink::new(tmp.path());
        let mut s = staged("/search?q=a,b", 200);
        s.record.user_agent = "Mozilla/5.0 (X11, Linux)".into();

        sink.write_batch_at(&[s], at(1, 1)).await.unwrap();

        let mut reader =
            ::csv::Reader::from_path(tmp.path().join("2024-February-5-1-1.csv")).unwrap();
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[1], "/search?q=a,b");
        assert_eq!(&row[3], "Mozilla/5.0 (X11, Linux)");
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
