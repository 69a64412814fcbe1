use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error body returned by the backend: `{"detail": ...}`.
///
/// `detail` is a plain string for handled errors and a list of validation
/// records for malformed requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub detail: Value,
}

impl ApiErrorBody {
    /// The human-readable detail, when the backend sent one.
    pub fn message(&self) -> Option<&str> {
        self.detail
            .as_str()
            .map(str::trim)
            .filter(|detail| !detail.is_empty())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}
