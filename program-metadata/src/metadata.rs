//! The program metadata document stored in `metadata` records.

use serde::{Deserialize, Serialize};

use crate::context::ClientContext;
use crate::error::{Error, Result};
use crate::header::{ContentKind, DataSource, Format, Tags};
use crate::upload::{upload, Outcome, Upload};

/// Security and project information about a program.
///
/// Serialised as JSON.  Only `name` is required.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferred_languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auditors: Option<Auditors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledgements: Option<String>,
    /// Date after which the information should be considered stale, in
    /// `YYYY-MM-DD` format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
}

/// Auditors may be given as a single string or as a list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Auditors {
    One(String),
    Many(Vec<String>),
}

impl ProgramMetadata {
    /// Parses and validates a JSON document.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let metadata: Self = serde_json::from_slice(data).map_err(|err| {
            Error::validation(format!("invalid program metadata: {err}"))
        })?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Validates and serialises the document.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        self.validate()?;
        serde_json::to_vec(self).map_err(|err| Error::validation(err.to_string()))
    }

    /// Checks that `name` is set and `expiry`, if present, is a date.
    pub fn validate(&self) -> Result {
        if self.name.trim().is_empty() {
            return Err(Error::validation("program metadata must have a name"));
        }
        match self.expiry.as_deref() {
            Some(expiry) if !is_date(expiry) => Err(Error::validation(format!(
                "expiry {expiry:?} must be in YYYY-MM-DD format"
            ))),
            _ => Ok(()),
        }
    }
}

/// Uploads program metadata document as the `metadata` record.
///
/// The document is validated first.  The kind and format of `req` are
/// overridden to `metadata` and `json` respectively.
pub fn upload_metadata(
    ctx: &ClientContext,
    req: &Upload,
    metadata: &ProgramMetadata,
) -> Result<Outcome> {
    let content = metadata.to_json()?;
    let tags = Tags { format: Format::Json, source: DataSource::Direct, ..req.tags };
    let req = Upload { kind: ContentKind::Metadata, tags, ..req.clone() };
    upload(ctx, &req, &content)
}

/// Checks `YYYY-MM-DD` with month in 1–12 and day in 1–31.
fn is_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    let shaped = bytes.len() == 10 &&
        bytes.iter().enumerate().all(|(idx, byte)| match idx {
            4 | 7 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        });
    let field = |range: core::ops::Range<usize>| value[range].parse::<u8>().ok();
    shaped &&
        matches!(field(5..7), Some(1..=12)) &&
        matches!(field(8..10), Some(1..=31))
}
