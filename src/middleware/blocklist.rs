use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde_json::json;
use time::OffsetDateTime;

use crate::errors::WikiError;
use crate::utils::{format_rfc3339, parse_rfc3339};

/// One parsed block list line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    pub ip: String,
    pub blocked_at: Option<OffsetDateTime>,
}

/// Flat block list in the `<ip> 1; # <timestamp>` format that web server
/// `geo`/`map` includes understand.
#[derive(Debug, Clone)]
pub struct BlockList {
    path: PathBuf,
}

fn parse_line(line: &str) -> Option<BlockEntry> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let (rule, comment) = match trimmed.split_once('#') {
        Some((rule, comment)) => (rule, Some(comment)),
        None => (trimmed, None),
    };
    let ip = rule.split_whitespace().next()?.trim_end_matches(';');
    if ip.is_empty() {
        return None;
    }
    let blocked_at = comment.and_then(|c| {
        let c = c.trim();
        parse_rfc3339(c.strip_prefix("Blocked at").unwrap_or(c))
    });
    Some(BlockEntry {
        ip: ip.to_string(),
        blocked_at,
    })
}

fn is_expired(entry: &BlockEntry, block_duration: Duration, now: OffsetDateTime) -> bool {
    match entry.blocked_at {
        Some(at) => now - at >= block_duration,
        None => false,
    }
}

impl BlockList {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_lines(&self) -> Result<Vec<String>, WikiError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(raw.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(WikiError::Io(e)),
        }
    }

    /// Entries still inside their block window
    pub fn load_active(
        &self,
        block_duration: Duration,
        now: OffsetDateTime,
    ) -> Result<Vec<BlockEntry>, WikiError> {
        let active: Vec<BlockEntry> = self
            .read_lines()?
            .iter()
            .filter_map(|line| parse_line(line))
            .filter(|entry| !is_expired(entry, block_duration, now))
            .collect();
        debug!("Loaded {} active blocks from {:?}", active.len(), self.path);
        Ok(active)
    }

    pub fn append(&self, ip: &str, at: OffsetDateTime) -> Result<(), WikiError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{} 1; # {}", ip, format_rfc3339(at))?;
        Ok(())
    }

    /// Drop expired entries, keeping comments and untimestamped rules
    pub fn prune(&self, block_duration: Duration, now: OffsetDateTime) -> Result<usize, WikiError> {
        let lines = self.read_lines()?;
        let before = lines.len();
        let kept: Vec<String> = lines
            .into_iter()
            .filter(|line| match parse_line(line) {
                Some(entry) => !is_expired(&entry, block_duration, now),
                None => true,
            })
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            let mut body = kept.join("\n");
            if !body.is_empty() {
                body.push('\n');
            }
            fs::write(&self.path, body)?;
            info!("Pruned {} expired entries from {:?}", removed, self.path);
        }
        Ok(removed)
    }
}

/// Fire-and-forget announcement of new blocks to an HTTP endpoint
#[derive(Clone)]
pub struct BlockNotifier {
    client: reqwest::Client,
    url: String,
}

impl BlockNotifier {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    pub fn notify(&self, ip: &str) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, not announcing block of {}", ip);
            return;
        };
        let client = self.client.clone();
        let url = self.url.clone();
        let ip = ip.to_string();
        handle.spawn(async move {
            match client.post(&url).json(&json!({ "ip": ip })).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!("Announced block of {} to {}", ip, url);
                }
                Ok(resp) => error!("Failed to persist IP block of {}: HTTP {}", ip, resp.status()),
                Err(e) => error!("Error persisting IP block of {}: {}", ip, e),
            }
        });
    }
}
