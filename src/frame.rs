//! Frame — the universal message type for tradepost.
//!
//! ARCHITECTURE
//! ============
//! Every communication on the trade socket is a Frame. Clients send request
//! frames over WebSocket, the server dispatches by event name, and acks flow
//! back as done/error frames. Server-initiated notifications (invite and
//! trade fan-out) are request frames with no parent.
//!
//! DESIGN
//! ======
//! - Flat data: payload is always `Map<String, Value>`, never nested.
//! - Acks correlate to requests via `parent_id`.
//! - Error acks carry `{errorName, errorMessage}` in `data`; the socket
//!   layer never inspects anything else.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::UserError;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Frame data key for the classified error name.
pub const FRAME_ERROR_NAME: &str = "errorName";

/// Frame data key for the human-readable error message.
pub const FRAME_ERROR_MESSAGE: &str = "errorMessage";

// =============================================================================
// TYPES
// =============================================================================

/// Flat key-value payload. Alias to reduce noise in signatures.
pub type Data = HashMap<String, serde_json::Value>;

/// Lifecycle position of a frame in a request/ack exchange.
///
/// Exchanges are `request → done` or `request → error`. Notification frames
/// stay at `request` and are never acked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Initial request frame, or a server-initiated notification.
    Request,
    /// Successful terminal ack.
    Done,
    /// Error terminal ack.
    Error,
}

/// The universal message type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Unique identifier for this frame.
    pub id: Uuid,
    /// ID of the request frame this is acking, if any.
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    /// Milliseconds since Unix epoch. Set automatically at construction.
    #[serde(default)]
    pub ts: i64,
    /// Sender identifier (user id string or server label).
    #[serde(default)]
    pub from: Option<String>,
    /// Event name, e.g. `"sendInvite"` or `"inviteReceived"`.
    pub event: String,
    /// Lifecycle position of this frame in its exchange.
    #[serde(default = "default_status")]
    pub status: Status,
    /// Flat key-value payload specific to the event.
    #[serde(default)]
    pub data: Data,
}

fn default_status() -> Status {
    Status::Request
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Frame {
    /// Create a request frame. Entry point for every client action and
    /// server notification.
    pub fn request(event: impl Into<String>, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            ts: now_ms(),
            from: None,
            event: event.into(),
            status: Status::Request,
            data,
        }
    }

    /// Create an uncorrelated `error` event frame. Used when the inbound
    /// bytes never parsed into a frame, so there is no id to ack.
    #[must_use]
    pub fn error_event(err: &UserError) -> Self {
        Self::request("error", error_data(err))
    }

    /// Create an empty done ack. Terminal.
    #[must_use]
    pub fn done(&self) -> Self {
        self.reply(Status::Done, Data::new())
    }

    /// Create a done ack carrying payload data. Terminal.
    #[must_use]
    pub fn done_with(&self, data: Data) -> Self {
        self.reply(Status::Done, data)
    }

    /// Create an error ack from a classified error. Terminal.
    #[must_use]
    pub fn error_from(&self, err: &UserError) -> Self {
        self.reply(Status::Error, error_data(err))
    }

    /// Build an ack frame. Inherits `from` and `event`.
    fn reply(&self, status: Status, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: Some(self.id),
            ts: now_ms(),
            from: self.from.clone(),
            event: self.event.clone(),
            status,
            data,
        }
    }
}

fn error_data(err: &UserError) -> Data {
    let mut data = Data::new();
    data.insert(FRAME_ERROR_NAME.into(), serde_json::Value::String(err.error_name().to_string()));
    data.insert(FRAME_ERROR_MESSAGE.into(), serde_json::Value::String(err.wire_message()));
    data
}

// =============================================================================
// BUILDERS
// =============================================================================

impl Frame {
    /// Set the `from` sender identifier field.
    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Insert an arbitrary key-value pair into the frame payload.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
