use std::path::Path;

use crate::models::ApplicationDescriptor;

use super::ImportError;

/// Serialization formats an application descriptor can be submitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Hcl,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Hcl => "hcl",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "hcl" => Some(Self::Hcl),
            _ => None,
        }
    }

    /// Guesses the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_str)
    }
}

/// Parses the format name sent by a client.
pub fn parse_format(name: &str) -> Result<Format, ImportError> {
    Format::from_str(name)
        .ok_or_else(|| ImportError::WrongRequest(format!("unsupported format '{}'", name)))
}

/// Decodes a raw descriptor body.
pub fn decode(body: &[u8], format: Format) -> Result<ApplicationDescriptor, ImportError> {
    let parsed: Result<ApplicationDescriptor, String> = match format {
        Format::Json => serde_json::from_slice(body).map_err(|e| e.to_string()),
        Format::Yaml => serde_yaml::from_slice(body).map_err(|e| e.to_string()),
        Format::Hcl => std::str::from_utf8(body)
            .map_err(|e| e.to_string())
            .and_then(|text| hcl::from_str(text).map_err(|e| e.to_string())),
    };

    let descriptor = parsed.map_err(|e| {
        tracing::warn!("Cannot parse {} descriptor: {}", format.as_str(), e);
        ImportError::WrongRequest(format!("cannot parse {} descriptor: {}", format.as_str(), e))
    })?;

    if descriptor.name.trim().is_empty() {
        return Err(ImportError::WrongRequest(
            "application name is required".to_string(),
        ));
    }

    Ok(descriptor)
}
