//! Customer segment classification.

use serde::{Deserialize, Serialize};

/// Customer segment affecting pricing and allowed payment methods.
///
/// The segment is resolved per request by the storefront (cookie, session,
/// or path) and arrives here as an explicit value inside each payload; the
/// core never infers it from ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    #[default]
    Consumer,
    Business,
}

impl Segment {
    /// Database/wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Segment::Consumer => "consumer",
            Segment::Business => "business",
        }
    }

    /// Parse the database representation; unknown values fall back to
    /// consumer pricing, never to business.
    pub fn from_db(value: &str) -> Self {
        match value {
            "business" => Segment::Business,
            _ => Segment::Consumer,
        }
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
