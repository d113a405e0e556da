//! Domain name validation.
//!
//! Names are checked here before anything is sent over the network.

use crate::error::LookupError;

pub const MAX_NAME_LEN: usize = 253;
pub const MAX_LABEL_LEN: usize = 63;

/// Validate `domain` and return its normalised form.
///
/// Surrounding whitespace and a single trailing root dot are ignored. The
/// result is lowercase.
pub fn validate(domain: &str) -> Result<String, LookupError> {
    let trimmed = domain.trim();
    let name = trimmed.strip_suffix('.').unwrap_or(trimmed);

    if name.is_empty() {
        return Err(malformed("domain name is empty".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(malformed(format!(
            "name is {} characters long, limit is {MAX_NAME_LEN}",
            name.len()
        )));
    }

    for label in name.split('.') {
        if label.is_empty() {
            return Err(malformed(format!("'{name}' contains an empty label")));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(malformed(format!(
                "label '{label}' is {} characters long, limit is {MAX_LABEL_LEN}",
                label.len()
            )));
        }
        if let Some(c) = label
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(malformed(format!(
                "label '{label}' contains invalid character {c:?}"
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(malformed(format!(
                "label '{label}' starts or ends with a hyphen"
            )));
        }
    }

    Ok(name.to_ascii_lowercase())
}

fn malformed(reason: String) -> LookupError {
    LookupError::MalformedName(reason)
}
