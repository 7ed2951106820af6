use std::fmt::Display;

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use serde_aux::prelude::*;
use serde_json::{Map, Value};

/// Format used for both the recording file stem and the metadata file stem.
pub const START_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

// Response of https://apiv3.fansly.com/api/v1/streaming/channel/<account_id>
//
// Unknown fields are kept in `extra` so the metadata file carries the whole
// record, not just the fields we read.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamData {
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub success: bool,
    pub response: Option<Channel>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Channel {
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub id: String,
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub account_id: String,
    pub playback_url: Option<String>,
    pub chat_room_id: Option<String>,
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub status: i64,
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub version: i64,
    #[serde(deserialize_with = "deserialize_option_number_from_string")]
    pub created_at: Option<i64>,
    #[serde(deserialize_with = "deserialize_option_number_from_string")]
    pub updated_at: Option<i64>,
    pub stream: Option<Stream>,
    pub arn: Option<String>,
    pub ingest_endpoint: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stream {
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub id: String,
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub history_id: String,
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub channel_id: String,
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub account_id: String,
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub title: String,
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub status: i64,
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub viewer_count: i64,
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub version: i64,
    #[serde(deserialize_with = "deserialize_option_number_from_string")]
    pub created_at: Option<i64>,
    #[serde(deserialize_with = "deserialize_option_number_from_string")]
    pub updated_at: Option<i64>,
    #[serde(deserialize_with = "deserialize_option_number_from_string")]
    pub last_fetched_at: Option<i64>,
    /// Unix timestamp in milliseconds
    #[serde(deserialize_with = "deserialize_option_number_from_string")]
    pub started_at: Option<i64>,
    pub permissions: Option<Permissions>,
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub whitelisted: bool,
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub account_permission_flags: i64,
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub access: bool,
    pub playback_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Permissions {
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub permission_flags: Vec<Value>,
    pub account_permission_flags: Option<AccountPermissionFlags>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountPermissionFlags {
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub flags: i64,
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub metadata: String,
}

impl StreamData {
    fn stream(&self) -> Option<&Stream> {
        self.response.as_ref()?.stream.as_ref()
    }

    pub fn is_accessible(&self) -> bool {
        self.stream().map(|s| s.access).unwrap_or(false)
    }

    /// Empty when the creator is not live.
    pub fn playback_url(&self) -> &str {
        self.stream()
            .and_then(|s| s.playback_url.as_deref())
            .unwrap_or_default()
    }

    /// The playback URL, only if the stream is accessible and actually has one.
    pub fn live_playback_url(&self) -> Option<&str> {
        let url = self.playback_url();
        (self.is_accessible() && !url.is_empty()).then_some(url)
    }

    pub fn started_at_millis(&self) -> i64 {
        self.stream().and_then(|s| s.started_at).unwrap_or_default()
    }

    /// Start time in milliseconds, `None` when it is missing or not positive.
    pub fn started_at(&self) -> Option<i64> {
        self.stream()
            .and_then(|s| s.started_at)
            .filter(|millis| *millis > 0)
    }

    /// Stream start in the local timezone, e.g. `2023-11-14_22:13:20`.
    pub fn formatted_start(&self) -> String {
        format_start_in(self.started_at_millis(), &Local)
    }
}

pub fn format_start_in<Tz>(millis: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    match tz.timestamp_opt(millis / 1000, 0).earliest() {
        Some(start) => start.format(START_FORMAT).to_string(),
        None => millis.to_string(),
    }
}
