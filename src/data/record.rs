use std::path::Path;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::DataError;
use crate::error::{Result, TunerError};

/// One row of the tabular dataset. Immutable input to the pipeline.
///
/// `procedures` is the training target and is intentionally blank at
/// inference time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub age: u32,
    pub gender: String,
    pub symptoms: String,
    pub diagnoses: String,
    #[serde(default)]
    pub procedures: String,
}

/// Load every record from a CSV file with columns
/// `age, gender, symptoms, diagnoses, procedures`.
///
/// Malformed rows surface here as data errors; the prompt formatter never
/// sees them.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<PatientRecord>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).map_err(|e| TunerError::DataError {
        message: format!("Failed to open {}: {}", path.display(), e),
        source: Some(Box::new(e)),
    })?;

    let mut records = Vec::new();
    for (row, result) in reader.deserialize::<PatientRecord>().enumerate() {
        let record = result.map_err(|e| TunerError::DataError {
            message: format!("Malformed record at row {}: {}", row + 1, e),
            source: Some(Box::new(DataError::MalformedRecord {
                row: row + 1,
                message: e.to_string(),
            })),
        })?;
        records.push(record);
    }

    debug!(count = records.len(), path = %path.display(), "Loaded dataset");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_records() {
        let file = write_csv(
            "age,gender,symptoms,diagnoses,procedures\n\
             55,Female,\"chest pain, shortness of breath\",\"hypertension, coronary artery disease\",coronary angiography\n\
             61,Male,fatigue,anemia,iron infusion\n",
        );

        let records = load_records(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].age, 55);
        assert_eq!(records[0].symptoms, "chest pain, shortness of breath");
        assert_eq!(records[1].procedures, "iron infusion");
    }

    #[test]
    fn test_empty_procedures_column_is_allowed() {
        let file = write_csv(
            "age,gender,symptoms,diagnoses,procedures\n\
             55,Female,chest pain,hypertension,\n",
        );

        let records = load_records(file.path()).unwrap();
        assert_eq!(records[0].procedures, "");
    }

    #[test]
    fn test_malformed_row_is_reported_with_position() {
        let file = write_csv(
            "age,gender,symptoms,diagnoses,procedures\n\
             not-a-number,Female,chest pain,hypertension,angiography\n",
        );

        let error = load_records(file.path()).unwrap_err();
        assert!(error.to_string().contains("row 1"));
    }

    #[test]
    fn test_missing_file_is_a_data_error() {
        let error = load_records("no/such/file.csv").unwrap_err();
        assert!(matches!(error, TunerError::DataError { .. }));
    }
}
