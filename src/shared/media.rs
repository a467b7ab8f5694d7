//! Media attachments
//!
//! A photo, video or signature attached to a record is either already on the
//! server (it has a server id and URL) or only on this device (it has a local
//! file path). The payload builder keys off that split: remote entries are
//! echoed back as plain form fields, local entries become multipart parts.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::PathBuf;

const FILE_SCHEME: &str = "file://";

/// A media entry on a record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Media {
    /// Already uploaded; carries a server id
    Remote(RemoteMedia),
    /// Captured on this device and not uploaded yet
    Local(LocalMedia),
}

/// Media the server already stores
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMedia {
    /// Server id as text; the backend sends it as a number or a string
    #[serde(deserialize_with = "remote_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// Media that only exists on the device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalMedia {
    /// Device path or `file://` URI
    pub temp_file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<MediaKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb_temp_file_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl Media {
    /// Local media from a device path or `file://` URI
    pub fn local(path: impl Into<String>) -> Self {
        Media::Local(LocalMedia {
            temp_file_path: path.into(),
            file_type: None,
            size: None,
            thumb_temp_file_path: None,
        })
    }

    /// Remote media with only an id and URL
    pub fn remote(id: impl ToString, url: impl Into<String>) -> Self {
        Media::Remote(RemoteMedia {
            id: id.to_string(),
            name: None,
            path: None,
            url: Some(url.into()),
            screenshot_path: None,
            media_type: None,
        })
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Media::Local(_))
    }
}

impl LocalMedia {
    /// Filesystem path with any `file://` scheme stripped
    pub fn fs_path(&self) -> PathBuf {
        PathBuf::from(
            self.temp_file_path
                .strip_prefix(FILE_SCHEME)
                .unwrap_or(&self.temp_file_path),
        )
    }
}

impl RemoteMedia {
    /// Indexed sub-fields in wire order, skipping absent values
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("id", self.id.clone())];
        let optional = [
            ("name", &self.name),
            ("path", &self.path),
            ("url", &self.url),
            ("screenshotPath", &self.screenshot_path),
            ("type", &self.media_type),
        ];
        for (key, value) in optional {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                fields.push((key, value.to_string()));
            }
        }
        fields
    }
}

/// Accept a number or a string id; zero and empty ids mean "not uploaded"
fn remote_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    use serde::de::Error;

    let id = match Value::deserialize(deserializer)? {
        Value::Number(n) if n.as_f64() != Some(0.0) => n.to_string(),
        Value::String(s) if !s.is_empty() => s,
        other => return Err(D::Error::custom(format!("not a media id: {}", other))),
    };
    Ok(id)
}
