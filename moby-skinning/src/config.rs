//! Skinning settings for one mesh class (TOML)
//!
//! Missing keys fall back to their defaults, so an empty file is a valid
//! configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Settings shared by the encoder and decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinningConfig {
    /// Whether the mesh has animation. Without it joint 0 decodes to the
    /// bind pose (default: true)
    #[serde(default = "default_true")]
    pub animated: bool,
    /// Mesh scale; positions are stored in 1/1024ths of it (default: 1.0)
    #[serde(default = "default_scale")]
    pub scale: f32,
    /// Fail instead of blending inline when no blend slot can be freed
    /// (default: false)
    #[serde(default)]
    pub strict_blend_allocation: bool,
}

fn default_true() -> bool {
    true
}

fn default_scale() -> f32 {
    1.0
}

impl Default for SkinningConfig {
    fn default() -> Self {
        Self {
            animated: default_true(),
            scale: default_scale(),
            strict_blend_allocation: false,
        }
    }
}

impl SkinningConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse skinning config")
    }

    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read skinning config: {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("In {}", path.display()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize skinning config")
    }
}
