use std::path::{Component, Path};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::errors::WikiError;

/// Reject relative paths that escape the content root
pub fn ensure_safe_path(req_path: &str) -> Result<(), WikiError> {
    if req_path.trim().is_empty() {
        return Err(WikiError::InvalidPath);
    }
    let path = Path::new(req_path);
    for comp in path.components() {
        match comp {
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(WikiError::InvalidPath);
            }
            Component::Normal(seg) if seg.is_empty() => return Err(WikiError::InvalidPath),
            _ => {}
        }
    }
    Ok(())
}

/// Normalize request path
pub fn normalize_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Lowercase, hyphen-separated form of a title.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.trim().chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_dash = true;
        }
    }
    slug
}

/// "getting-started" -> "Getting Started"
pub fn title_from_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Current time as an RFC3339 timestamp
pub fn now_rfc3339() -> String {
    format_rfc3339(OffsetDateTime::now_utc())
}

pub fn format_rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_default()
}

pub fn parse_rfc3339(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()
}
