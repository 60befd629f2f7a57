//! Artifact kinds served by the loader nodes.

use std::fmt;
use std::str::FromStr;

/// Category of model artifact.
///
/// Each kind maps to the model type the registry must declare and to the
/// cache subdirectory its files live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Checkpoint,
    Lora,
    ControlNet,
}

impl ArtifactKind {
    /// All kinds, in cache-listing order.
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Checkpoint,
        ArtifactKind::Lora,
        ArtifactKind::ControlNet,
    ];

    /// Model type string the registry reports for this kind.
    pub fn registry_type(&self) -> &'static str {
        match self {
            ArtifactKind::Checkpoint => "Checkpoint",
            ArtifactKind::Lora => "LORA",
            ArtifactKind::ControlNet => "Controlnet",
        }
    }

    /// Directory under the cache root holding this kind's versions.
    pub fn cache_subdir(&self) -> &'static str {
        match self {
            ArtifactKind::Checkpoint => "checkpoints",
            ArtifactKind::Lora => "loras",
            ArtifactKind::ControlNet => "controlnets",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Checkpoint => "checkpoint",
            ArtifactKind::Lora => "lora",
            ArtifactKind::ControlNet => "controlnet",
        };
        f.write_str(name)
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "checkpoint" | "checkpoints" => Ok(ArtifactKind::Checkpoint),
            "lora" | "loras" => Ok(ArtifactKind::Lora),
            "controlnet" | "controlnets" => Ok(ArtifactKind::ControlNet),
            _ => Err(format!(
                "unknown artifact kind '{}', expected checkpoint, lora or controlnet",
                s
            )),
        }
    }
}
