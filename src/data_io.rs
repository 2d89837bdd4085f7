//! Review corpus output sinks. Format follows the file extension; unknown
//! extensions fall back to JSON.

use std::fs::File;
use std::io::{self, Write};

use crate::error::Result;
use crate::harvest::ReviewEntry;

const CSV_HEADERS: [&str; 8] = [
    "key",
    "date",
    "username",
    "review",
    "rating",
    "platform",
    "developerResponse",
    "language",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Csv,
    Json,
}

pub fn detect_data_format(path: &str, fallback: DataFormat) -> DataFormat {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".json") {
        DataFormat::Json
    } else if lower.ends_with(".csv") {
        DataFormat::Csv
    } else {
        fallback
    }
}

pub struct CsvSink {
    writer: csv::Writer<File>,
}

impl CsvSink {
    fn new(output_path: &str) -> io::Result<Self> {
        let file = File::create(output_path)?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(CSV_HEADERS)?;
        Ok(Self { writer })
    }

    fn write_row(&mut self, entry: &ReviewEntry) -> io::Result<()> {
        self.writer.write_record([
            entry.key.as_str(),
            entry.date.as_str(),
            entry.username.as_str(),
            entry.review.as_str(),
            &entry.rating.to_string(),
            entry.platform.as_str(),
            entry.developer_response.as_str(),
            entry.language.as_str(),
        ])?;
        Ok(())
    }

    fn finalize(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

pub struct JsonSink {
    file: File,
    first: bool,
    closed: bool,
}

impl JsonSink {
    fn new(output_path: &str) -> io::Result<Self> {
        let mut file = File::create(output_path)?;
        file.write_all(b"[\n")?;
        Ok(Self {
            file,
            first: true,
            closed: false,
        })
    }

    fn write_row(&mut self, entry: &ReviewEntry) -> io::Result<()> {
        if !self.first {
            self.file.write_all(b",\n")?;
        }
        self.first = false;
        serde_json::to_writer(&mut self.file, entry).map_err(io::Error::other)?;
        Ok(())
    }

    fn finalize(&mut self) -> io::Result<()> {
        if !self.closed {
            if self.first {
                self.file.write_all(b"]\n")?;
            } else {
                self.file.write_all(b"\n]\n")?;
            }
            self.closed = true;
        }
        self.file.flush()
    }
}

impl Drop for JsonSink {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}

pub enum OutputSink {
    Csv(CsvSink),
    Json(JsonSink),
}

impl OutputSink {
    pub fn new(output_path: &str, format: DataFormat) -> io::Result<Self> {
        match format {
            DataFormat::Csv => Ok(OutputSink::Csv(CsvSink::new(output_path)?)),
            DataFormat::Json => Ok(OutputSink::Json(JsonSink::new(output_path)?)),
        }
    }

    pub fn write_row(&mut self, entry: &ReviewEntry) -> io::Result<()> {
        match self {
            OutputSink::Csv(sink) => sink.write_row(entry),
            OutputSink::Json(sink) => sink.write_row(entry),
        }
    }

    pub fn finalize(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Csv(sink) => sink.finalize(),
            OutputSink::Json(sink) => sink.finalize(),
        }
    }
}

/// Write the whole corpus to a path, format chosen from the extension.
pub fn write_corpus(path: &str, entries: &[ReviewEntry]) -> Result<()> {
    let format = detect_data_format(path, DataFormat::Json);
    let mut sink = OutputSink::new(path, format)?;
    for entry in entries {
        sink.write_row(entry)?;
    }
    sink.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Platform;

    fn entry(date: &str, user: &str) -> ReviewEntry {
        ReviewEntry {
            key: format!("{date}_{user}"),
            date: date.to_string(),
            username: user.to_string(),
            review: "不錯用".to_string(),
            rating: 4.0,
            platform: Platform::Android,
            developer_response: String::new(),
            language: "zh".to_string(),
        }
    }

    #[test]
    fn format_detection_follows_extension() {
        assert_eq!(detect_data_format("out.csv", DataFormat::Json), DataFormat::Csv);
        assert_eq!(detect_data_format("OUT.JSON", DataFormat::Csv), DataFormat::Json);
        assert_eq!(detect_data_format("out.txt", DataFormat::Json), DataFormat::Json);
    }

    #[test]
    fn csv_corpus_has_header_and_rows() {
        let path = std::env::temp_dir().join("review-corpus-test.csv");
        let path = path.to_string_lossy().to_string();
        write_corpus(&path, &[entry("2023-05-01", "小明")]).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("key,date,username,review,rating,platform,developerResponse,language"));
        assert!(written.contains("2023-05-01_小明"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn json_corpus_is_a_valid_array() {
        let path = std::env::temp_dir().join("review-corpus-test.json");
        let path = path.to_string_lossy().to_string();
        write_corpus(&path, &[entry("2023-05-01", "a"), entry("2023-05-02", "b")]).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[0]["developerResponse"], "");
        let _ = std::fs::remove_file(&path);
    }
}
