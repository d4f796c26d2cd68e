use serde::{Deserialize, Serialize};

/// Lifecycle code stored on every directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
    #[serde(rename = "A")]
    Active,
    #[serde(rename = "D")]
    Deleted,
    #[serde(rename = "S")]
    Disabled,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "A",
            RecordStatus::Deleted => "D",
            RecordStatus::Disabled => "S",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(RecordStatus::Active),
            "D" => Some(RecordStatus::Deleted),
            "S" => Some(RecordStatus::Disabled),
            _ => None,
        }
    }
}
