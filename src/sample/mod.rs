use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use log::info;

use crate::errors::{Error, Result};
use crate::instances::{ExternalConfig, ExternalSample, Instance};

/// Boundary for external initial-sample producers. The algorithms themselves
/// live outside this crate; implementations register with the front-end by
/// name.
pub trait InitialSampler {
    fn name(&self) -> &str;

    /// Produce a feasible sample covering all feasible pairs of the
    /// instance, within the time limit.
    fn sample(&self, instance: &Instance, timelimit: f64) -> Result<ExternalSample>;
}

/// Read a sample from a `.csv` or `.json` file, decided by extension.
pub fn read_sample(path: impl AsRef<Path>) -> Result<ExternalSample> {
    let path = path.as_ref();
    let sample = match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => read_csv(path)?,
        Some("json") => read_json(path)?,
        _ => {
            return Err(Error::MalformedInput(format!(
                "unsupported sample file {}; expected .csv or .json",
                path.display()
            )))
        }
    };
    info!(
        "read sample with {} configurations from {}",
        sample.len(),
        path.display()
    );
    Ok(sample)
}

/// Write a sample to a `.csv` or `.json` file, decided by extension.
pub fn write_sample(
    path: impl AsRef<Path>,
    sample: &ExternalSample,
    instance: &Instance,
) -> Result<()> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => write_csv(path, sample, &instance.features),
        Some("json") => write_json(path, sample),
        _ => Err(Error::MalformedInput(format!(
            "unsupported sample file {}; expected .csv or .json",
            path.display()
        ))),
    }
}

/// CSV interchange format: `;`-separated, first column `Configuration` as a
/// row label, one column per feature, `+` for selected and `-` for
/// deselected.
fn read_csv(path: &Path) -> Result<ExternalSample> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .map_err(|e| Error::MalformedInput(format!("invalid csv sample: {e}")))?;
    let headers = reader
        .headers()
        .map_err(|e| Error::MalformedInput(format!("invalid csv header: {e}")))?
        .clone();
    let features: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
    let mut sample = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| Error::MalformedInput(format!("invalid csv record: {e}")))?;
        let mut config = ExternalConfig::with_capacity(features.len());
        for (feature, cell) in features.iter().zip(record.iter().skip(1)) {
            let value = match cell.trim() {
                "+" => true,
                "-" => false,
                other => {
                    return Err(Error::MalformedInput(format!(
                        "unexpected cell '{other}' for feature {feature}"
                    )))
                }
            };
            config.insert(feature.clone(), value);
        }
        sample.push(config);
    }
    Ok(sample)
}

fn write_csv(path: &Path, sample: &ExternalSample, features: &[String]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
    let mut header = vec!["Configuration".to_string()];
    header.extend(features.iter().cloned());
    writer
        .write_record(&header)
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
    for (index, config) in sample.iter().enumerate() {
        let mut record = vec![index.to_string()];
        for feature in features {
            let value = config.get(feature).ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "exported configuration {index} misses feature {feature}"
                ))
            })?;
            record.push(if *value { "+" } else { "-" }.to_string());
        }
        writer
            .write_record(&record)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
    }
    writer
        .flush()
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
    Ok(())
}

/// JSON interchange format: an array of objects mapping feature name to a
/// boolean.
fn read_json(path: &Path) -> Result<ExternalSample> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::MalformedInput(format!("invalid json sample: {e}")))
}

fn write_json(path: &Path, sample: &ExternalSample) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, sample)
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Serialize a sample as a JSON string, for writing to stdout.
pub fn to_json_string(sample: &ExternalSample) -> Result<String> {
    serde_json::to_string_pretty(sample).map_err(|e| Error::Io(std::io::Error::other(e)))
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> ExternalSample {
        vec![
            [("a".to_string(), true), ("b".to_string(), false)].into(),
            [("a".to_string(), false), ("b".to_string(), true)].into(),
        ]
    }

    fn instance() -> Instance {
        Instance::new("io", vec!["a".to_string(), "b".to_string()], None, vec![])
    }

    #[test]
    fn csv_round_trip() {
        let dir = std::env::temp_dir().join("pairlns-csv-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sample.csv");
        write_sample(&path, &sample(), &instance()).unwrap();
        let read = read_sample(&path).unwrap();
        assert_eq!(read, sample());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn json_round_trip() {
        let dir = std::env::temp_dir().join("pairlns-json-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sample.json");
        write_sample(&path, &sample(), &instance()).unwrap();
        let read = read_sample(&path).unwrap();
        assert_eq!(read, sample());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn malformed_cell_is_rejected() {
        let dir = std::env::temp_dir().join("pairlns-badcsv-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.csv");
        std::fs::write(&path, "Configuration;a;b\n0;+;x\n").unwrap();
        assert!(matches!(
            read_sample(&path),
            Err(Error::MalformedInput(_))
        ));
        std::fs::remove_file(&path).unwrap();
    }
}
