//! Gemini v1beta wire types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque reference to PDF content that Gemini can read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteHandle {
    /// File uploaded through the File API
    File {
        /// Resource name, `files/{id}`
        name: String,
        uri: String,
        mime_type: String,
        expires_at: Option<DateTime<Utc>>,
    },
    /// PDF bytes sent inline with each request
    Inline { mime_type: String, data_base64: String },
}

impl RemoteHandle {
    /// Remote resource name, for File API handles
    pub fn name(&self) -> Option<&str> {
        match self {
            RemoteHandle::File { name, .. } => Some(name),
            RemoteHandle::Inline { .. } => None,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            RemoteHandle::File { expires_at, .. } => *expires_at,
            RemoteHandle::Inline { .. } => None,
        }
    }

    /// Bytes this handle keeps in memory
    pub fn weight(&self) -> usize {
        match self {
            RemoteHandle::File { .. } => 0,
            RemoteHandle::Inline { data_base64, .. } => data_base64.len(),
        }
    }

    pub(crate) fn to_part(&self) -> Part {
        match self {
            RemoteHandle::File { uri, mime_type, .. } => Part::FileData {
                file_data: FileData {
                    mime_type: mime_type.clone(),
                    file_uri: uri.clone(),
                },
            },
            RemoteHandle::Inline {
                mime_type,
                data_base64,
            } => Part::InlineData {
                inline_data: InlineData {
                    mime_type: mime_type.clone(),
                    data: data_base64.clone(),
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Content {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum Part {
    Text {
        text: String,
    },
    InlineData {
        inline_data: InlineData,
    },
    FileData {
        file_data: FileData,
    },
    /// Anything else the model may return (function calls, thoughts...)
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate
    pub fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let text: String = candidate
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

/// File state as returned by the File API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum FileState {
    StateUnspecified,
    Processing,
    Active,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileResource {
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub state: Option<FileState>,
    #[serde(default)]
    pub expiration_time: Option<DateTime<Utc>>,
}

/// Upload responses wrap the resource in `{"file": ...}`; `files.get` does not.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum FileEnvelope {
    Wrapped { file: FileResource },
    Bare(FileResource),
}

impl FileEnvelope {
    pub fn into_inner(self) -> FileResource {
        match self {
            FileEnvelope::Wrapped { file } => file,
            FileEnvelope::Bare(file) => file,
        }
    }
}
