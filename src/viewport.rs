use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Fixed viewport dimensions for a render session.
///
/// The device scale factor is always 1, so a `1920x1080` viewport produces a
/// 1920x1080 image regardless of the host display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Error)]
pub enum ViewportParseError {
    #[error("Invalid viewport format: expected WIDTHxHEIGHT (e.g., 1920x1080)")]
    InvalidFormat,
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Viewport dimensions must be positive")]
    ZeroDimension,
}

impl FromStr for Viewport {
    type Err = ViewportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('x').collect();
        if parts.len() != 2 {
            return Err(ViewportParseError::InvalidFormat);
        }

        let width: u32 = parts[0]
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidDimension(parts[0].to_string()))?;

        let height: u32 = parts[1]
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidDimension(parts[1].to_string()))?;

        if width == 0 || height == 0 {
            return Err(ViewportParseError::ZeroDimension);
        }

        Ok(Viewport { width, height })
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
