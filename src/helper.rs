use std::{fs, io::Read, path::Path};

use log::{debug, error};

use crate::{CardsError, Result};

// Helper method for parsing comma-separated ids
pub fn parse_ids(ids: Option<String>) -> Vec<String> {
    ids.map(|t| {
        t.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// Rejects blank titles and names before they are dispatched
pub fn require_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CardsError::InvalidInput {
            message: format!("{} must not be empty", field),
        });
    }
    Ok(trimmed.to_string())
}

/// Accepts `#RRGGBB` colors only. Hex digits are normalized to upper case.
pub fn validate_color(color: &str) -> Result<String> {
    let color = color.trim();
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());

    if !valid {
        return Err(CardsError::InvalidInput {
            message: format!("Color must look like #RRGGBB, got '{}'", color),
        });
    }
    Ok(color.to_ascii_uppercase())
}

/// Reads import text from a file, or from stdin when the path is `-`
pub fn read_import_source(source: &Path) -> Result<String> {
    if source == Path::new("-") {
        debug!("Reading import data from stdin");
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }

    if !source.exists() {
        error!("Import file {} does not exist", source.display());
        return Err(CardsError::FileNotFound {
            file_path: source.display().to_string(),
        });
    }

    debug!("Reading import data from {}", source.display());
    Ok(fs::read_to_string(source)?)
}
