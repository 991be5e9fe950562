//! Core routing domain types shared across the workspace.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

/// One routing target a file may be forwarded to.
///
/// Field names on the wire follow the lookup store's column names so the
/// persisted snapshot stays readable by operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    /// Identity of the external folder or bucket receiving the file.
    #[serde(rename = "box_folder_id", deserialize_with = "string_or_number")]
    destination_id: String,
    /// Experiment the destination belongs to.
    #[serde(deserialize_with = "string_or_number")]
    experiment_id: String,
    /// Section label used as a sub-folder inside the destination.
    #[serde(rename = "section_name", deserialize_with = "string_or_number")]
    section_label: String,
}

impl Destination {
    /// Construct a destination from its three identifying parts.
    #[must_use]
    pub fn new(
        destination_id: impl Into<String>,
        experiment_id: impl Into<String>,
        section_label: impl Into<String>,
    ) -> Self {
        Self {
            destination_id: destination_id.into(),
            experiment_id: experiment_id.into(),
            section_label: section_label.into(),
        }
    }

    /// External folder or bucket identity.
    #[must_use]
    pub fn destination_id(&self) -> &str {
        &self.destination_id
    }

    /// Experiment identifier.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Section label.
    #[must_use]
    pub fn section_label(&self) -> &str {
        &self.section_label
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} (experiment {})",
            self.destination_id, self.section_label, self.experiment_id
        )
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Signed(i64),
        Unsigned(u64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(value) => value,
        Raw::Signed(value) => value.to_string(),
        Raw::Unsigned(value) => value.to_string(),
        Raw::Float(value) => value.to_string(),
    })
}

/// Ordered set of currently active destinations.
///
/// Replaced wholesale on every successful resolution; never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReferenceState {
    destinations: Arc<[Destination]>,
}

impl ReferenceState {
    /// Build a state from destinations in lookup order, dropping repeats.
    #[must_use]
    pub fn new(destinations: Vec<Destination>) -> Self {
        let mut ordered: Vec<Destination> = Vec::with_capacity(destinations.len());
        for destination in destinations {
            if !ordered.contains(&destination) {
                ordered.push(destination);
            }
        }
        Self {
            destinations: ordered.into(),
        }
    }

    /// State with no active destinations.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Active destinations in order.
    #[must_use]
    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    /// Iterate over the active destinations.
    pub fn iter(&self) -> impl Iterator<Item = &Destination> {
        self.destinations.iter()
    }

    /// Number of active destinations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    /// Whether no destination is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

/// Terminal classification of a processed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Routed successfully and archived under the done root.
    Done,
    /// Failed somewhere in the pipeline and archived under the error root.
    Error,
}

impl Disposition {
    /// Render the disposition as its lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a watched file ended up after a batch pass touched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationOutcome {
    /// Path of the file when the pass discovered it.
    pub original_path: PathBuf,
    /// Path the file was relocated to.
    pub final_path: PathBuf,
    /// Done or error.
    pub disposition: Disposition,
}

/// Byte-level progress reported while forwarding a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadProgress {
    /// Bytes transferred so far.
    pub bytes_sent: u64,
    /// Total size of the file.
    pub bytes_total: u64,
}

impl UploadProgress {
    /// Percentage of the file transferred, `100.0` for empty files.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn percent_complete(&self) -> f64 {
        if self.bytes_total == 0 {
            100.0
        } else {
            (self.bytes_sent as f64 / self.bytes_total as f64) * 100.0
        }
    }
}

/// Receipt returned by an upload backend after a successful transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Backend-specific location of the stored copy.
    pub location: String,
    /// Number of bytes transferred.
    pub bytes: u64,
}
