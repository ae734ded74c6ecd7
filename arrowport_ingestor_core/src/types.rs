use serde::{Deserialize, Serialize};

/// Outcome of an ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    Success,
    Failure,
}

/// The result of ingesting one or more batches into a stream's destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionResult {
    pub status: IngestionStatus,
    pub rows_processed: u64,
    #[serde(skip)]
    pub bytes_processed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl IngestionResult {
    pub fn success(rows_processed: u64, bytes_processed: u64) -> Self {
        Self {
            status: IngestionStatus::Success,
            rows_processed,
            bytes_processed,
            message: Some("Data processed successfully".to_string()),
        }
    }

    pub fn failure(rows_processed: u64, message: impl Into<String>) -> Self {
        Self {
            status: IngestionStatus::Failure,
            rows_processed,
            bytes_processed: 0,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == IngestionStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_json() {
        let result = IngestionResult::success(8, 1024);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "success",
                "rows_processed": 8,
                "message": "Data processed successfully",
            })
        );

        let parsed: IngestionResult =
            serde_json::from_str(r#"{"status": "failure", "rows_processed": 0}"#).unwrap();
        assert_eq!(parsed.status, IngestionStatus::Failure);
        assert_eq!(parsed.message, None);
    }
}
