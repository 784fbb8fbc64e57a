use serde::{ Serialize, Deserialize };

use super::reading::Reading;

/// Frames pushed to broadcast subscribers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "new_reading")] NewReading {
        date: String,
        reading: Reading,
        timestamp: i64,
    },
}
