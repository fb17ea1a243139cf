//! Opaque cursor pagination: clients treat the string as opaque. Internally
//! it is base64 over a bincode-serialized `(last_id, direction)` pair — the
//! same compact-binary-then-encode pattern the teacher uses for on-wire
//! values, just with a text-safe outer layer for a query-string cursor.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorDirection {
    Next,
    Previous,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cursor {
    pub last_id: Uuid,
    pub direction: CursorDirection,
}

impl Cursor {
    pub fn encode(&self) -> Result<String, LedgerError> {
        let bytes = bincode::serialize(self).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        Ok(base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes))
    }

    pub fn decode(s: &str) -> Result<Self, LedgerError> {
        let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s)
            .map_err(|e| LedgerError::ValidationError(format!("invalid cursor: {e}")))?;
        bincode::deserialize(&bytes).map_err(|e| LedgerError::ValidationError(format!("invalid cursor: {e}")))
    }
}
