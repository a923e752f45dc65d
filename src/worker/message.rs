//! Control messages posted to the worker by its pages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
  /// Activate the waiting worker without waiting for old pages to close
  SkipWaiting,
  GetVersion,
  /// Drop the current cache store
  ClearCache,
}

impl ControlMessage {
  /// Messages without a recognised `type` are ignored, not rejected.
  pub fn parse(data: &Value) -> Option<Self> {
    serde_json::from_value(data.clone()).ok()
  }
}

/// Reply posted back on the message port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ControlReply {
  Version { version: String },
  Cleared { success: bool },
}
