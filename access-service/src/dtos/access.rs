use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct RowsAffectedResponse {
    pub rows_affected: u64,
}
