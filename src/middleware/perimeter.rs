use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use time::OffsetDateTime;

use crate::config::Config;
use crate::middleware::blocklist::{BlockList, BlockNotifier};

/// Thresholds for the per-client state machine
#[derive(Debug, Clone, Copy)]
pub struct PerimeterPolicy {
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    pub max_failed_logins: u32,
    pub block_duration: Duration,
}

impl From<&Config> for PerimeterPolicy {
    fn from(config: &Config) -> Self {
        Self {
            rate_limit_max: config.rate_limit_max,
            rate_limit_window: config.rate_limit_window(),
            max_failed_logins: config.max_failed_logins,
            block_duration: config.block_duration(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Clean,
    Suspicious,
    Blocked,
}

/// What to do with one incoming request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed {
        limit: u32,
        remaining: u32,
        reset_in: Duration,
    },
    /// Already blocked
    Blocked,
    /// This request crossed the rate limit and the client is now blocked
    RateLimited,
}

#[derive(Debug, Clone)]
struct ClientRecord {
    window_start: Instant,
    window_count: u32,
    failed_logins: u32,
    last_failure: Option<Instant>,
    blocked_until: Option<Instant>,
    last_seen: Instant,
}

impl ClientRecord {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            window_count: 0,
            failed_logins: 0,
            last_failure: None,
            blocked_until: None,
            last_seen: now,
        }
    }

    fn is_blocked(&self, now: Instant) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }
}

/// Per-IP request accounting: clean, then suspicious, then blocked.
///
/// Blocks are mirrored to an optional [`BlockList`] file and announced
/// through an optional [`BlockNotifier`]. Neither is consulted on the
/// request path; the in-memory table is authoritative.
pub struct PerimeterGuard {
    policy: PerimeterPolicy,
    clients: Mutex<HashMap<String, ClientRecord>>,
    blocklist: Option<BlockList>,
    notifier: Option<BlockNotifier>,
}

impl PerimeterGuard {
    pub fn new(policy: PerimeterPolicy) -> Self {
        Self {
            policy,
            clients: Mutex::new(HashMap::new()),
            blocklist: None,
            notifier: None,
        }
    }

    /// Guard with the block list and notifier named in `config`
    pub fn from_config(config: &Config) -> Self {
        let mut guard = Self::new(PerimeterPolicy::from(config))
            .with_blocklist(BlockList::new(config.blocked_ips_file.clone()));
        if let Some(url) = config.block_notify_url.as_ref().filter(|u| !u.is_empty()) {
            guard = guard.with_notifier(BlockNotifier::new(url.clone()));
        }
        guard
    }

    /// Attach a block list and re-arm the blocks it still holds
    pub fn with_blocklist(mut self, blocklist: BlockList) -> Self {
        let now_wall = OffsetDateTime::now_utc();
        let now = Instant::now();
        match blocklist.load_active(self.policy.block_duration, now_wall) {
            Ok(entries) => {
                let clients = self.clients.get_mut().unwrap_or_else(|p| p.into_inner());
                for entry in &entries {
                    let elapsed = entry
                        .blocked_at
                        .map(|at| Duration::try_from(now_wall - at).unwrap_or_default())
                        .unwrap_or_default();
                    let remaining = self.policy.block_duration.saturating_sub(elapsed);
                    let record = clients
                        .entry(entry.ip.clone())
                        .or_insert_with(|| ClientRecord::new(now));
                    record.blocked_until = Some(now + remaining);
                }
                if !entries.is_empty() {
                    info!("Restored {} blocked IPs", entries.len());
                }
            }
            Err(e) => error!("Failed to load blocked IPs: {}", e),
        }
        self.blocklist = Some(blocklist);
        self
    }

    pub fn with_notifier(mut self, notifier: BlockNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ClientRecord>> {
        self.clients.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn check_request(&self, ip: &str) -> Verdict {
        self.check_request_at(ip, Instant::now())
    }

    /// Count one request from `ip` against its window
    pub fn check_request_at(&self, ip: &str, now: Instant) -> Verdict {
        let mut clients = self.lock();
        let record = clients
            .entry(ip.to_string())
            .or_insert_with(|| ClientRecord::new(now));
        record.last_seen = now;

        if record.is_blocked(now) {
            return Verdict::Blocked;
        }

        if now.saturating_duration_since(record.window_start) >= self.policy.rate_limit_window {
            record.window_start = now;
            record.window_count = 0;
        }
        record.window_count += 1;

        if record.window_count > self.policy.rate_limit_max {
            record.blocked_until = Some(now + self.policy.block_duration);
            drop(clients);
            warn!("Rate limit exceeded by {}, blocking", ip);
            self.persist_block(ip);
            return Verdict::RateLimited;
        }

        let elapsed = now.saturating_duration_since(record.window_start);
        Verdict::Allowed {
            limit: self.policy.rate_limit_max,
            remaining: self.policy.rate_limit_max - record.window_count,
            reset_in: self.policy.rate_limit_window.saturating_sub(elapsed),
        }
    }

    /// Returns true when this failure blocked the client
    pub fn record_failed_login(&self, ip: &str) -> bool {
        self.record_failed_login_at(ip, Instant::now())
    }

    pub fn record_failed_login_at(&self, ip: &str, now: Instant) -> bool {
        let mut clients = self.lock();
        let record = clients
            .entry(ip.to_string())
            .or_insert_with(|| ClientRecord::new(now));
        record.last_seen = now;
        if record.is_blocked(now) {
            return false;
        }

        // Failures older than one block period no longer count
        if record
            .last_failure
            .is_some_and(|last| now.saturating_duration_since(last) >= self.policy.block_duration)
        {
            record.failed_logins = 0;
        }
        record.failed_logins += 1;
        record.last_failure = Some(now);
        warn!(
            "Failed login from {} ({}/{})",
            ip, record.failed_logins, self.policy.max_failed_logins
        );

        if record.failed_logins >= self.policy.max_failed_logins {
            record.blocked_until = Some(now + self.policy.block_duration);
            record.failed_logins = 0;
            drop(clients);
            warn!("Too many failed logins from {}, blocking", ip);
            self.persist_block(ip);
            return true;
        }
        false
    }

    pub fn state(&self, ip: &str) -> ClientState {
        self.state_at(ip, Instant::now())
    }

    pub fn state_at(&self, ip: &str, now: Instant) -> ClientState {
        let clients = self.lock();
        let Some(record) = clients.get(ip) else {
            return ClientState::Clean;
        };
        if record.is_blocked(now) {
            ClientState::Blocked
        } else if record.failed_logins > 0
            || (now.saturating_duration_since(record.window_start) < self.policy.rate_limit_window
                && record.window_count > self.policy.rate_limit_max / 2)
        {
            ClientState::Suspicious
        } else {
            ClientState::Clean
        }
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Forget idle clients and lapsed blocks, then prune the block list file
    pub fn sweep_at(&self, now: Instant) -> usize {
        let policy = self.policy;
        let removed = {
            let mut clients = self.lock();
            let before = clients.len();
            clients.retain(|_, record| {
                if record.is_blocked(now) {
                    return true;
                }
                let failures_live = record.failed_logins > 0
                    && record
                        .last_failure
                        .is_some_and(|last| now.saturating_duration_since(last) < policy.block_duration);
                let window_live =
                    now.saturating_duration_since(record.last_seen) < policy.rate_limit_window;
                failures_live || window_live
            });
            before - clients.len()
        };
        if removed > 0 {
            info!("Swept {} idle client records", removed);
        }
        if let Some(blocklist) = &self.blocklist {
            if let Err(e) = blocklist.prune(policy.block_duration, OffsetDateTime::now_utc()) {
                error!("Failed to prune blocked IPs: {}", e);
            }
        }
        removed
    }

    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    fn persist_block(&self, ip: &str) {
        if let Some(blocklist) = &self.blocklist {
            if let Err(e) = blocklist.append(ip, OffsetDateTime::now_utc()) {
                error!("Failed to record block of {}: {}", ip, e);
            }
        }
        if let Some(notifier) = &self.notifier {
            notifier.notify(ip);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PerimeterPolicy {
        PerimeterPolicy {
            rate_limit_max: 3,
            rate_limit_window: Duration::from_secs(60),
            max_failed_logins: 2,
            block_duration: Duration::from_secs(3600),
        }
    }

    #[test]
    fn rate_limit_blocks_after_max() {
        let guard = PerimeterGuard::new(policy());
        let now = Instant::now();
        for expected_remaining in [2, 1, 0] {
            match guard.check_request_at("1.1.1.1", now) {
                Verdict::Allowed { remaining, limit, .. } => {
                    assert_eq!(limit, 3);
                    assert_eq!(remaining, expected_remaining);
                }
                other => panic!("unexpected verdict {:?}", other),
            }
        }
        assert_eq!(guard.check_request_at("1.1.1.1", now), Verdict::RateLimited);
        assert_eq!(guard.check_request_at("1.1.1.1", now), Verdict::Blocked);
        assert_eq!(guard.state_at("1.1.1.1", now), ClientState::Blocked);

        // Other clients are unaffected
        assert!(matches!(
            guard.check_request_at("2.2.2.2", now),
            Verdict::Allowed { .. }
        ));
    }

    #[test]
    fn window_resets() {
        let guard = PerimeterGuard::new(policy());
        let now = Instant::now();
        for _ in 0..3 {
            guard.check_request_at("1.1.1.1", now);
        }
        let later = now + Duration::from_secs(61);
        assert!(matches!(
            guard.check_request_at("1.1.1.1", later),
            Verdict::Allowed { remaining: 2, .. }
        ));
    }

    #[test]
    fn block_expires() {
        let guard = PerimeterGuard::new(policy());
        let now = Instant::now();
        for _ in 0..4 {
            guard.check_request_at("1.1.1.1", now);
        }
        let after = now + Duration::from_secs(3601);
        assert!(matches!(
            guard.check_request_at("1.1.1.1", after),
            Verdict::Allowed { .. }
        ));
    }

    #[test]
    fn failed_logins_escalate() {
        let guard = PerimeterGuard::new(policy());
        let now = Instant::now();
        assert_eq!(guard.state_at("3.3.3.3", now), ClientState::Clean);
        assert!(!guard.record_failed_login_at("3.3.3.3", now));
        assert_eq!(guard.state_at("3.3.3.3", now), ClientState::Suspicious);
        assert!(guard.record_failed_login_at("3.3.3.3", now));
        assert_eq!(guard.check_request_at("3.3.3.3", now), Verdict::Blocked);
    }

    #[test]
    fn sweep_drops_idle_clients() {
        let guard = PerimeterGuard::new(policy());
        let now = Instant::now();
        guard.check_request_at("idle", now);
        for _ in 0..4 {
            guard.check_request_at("blocked", now);
        }
        guard.record_failed_login_at("failing", now);

        let later = now + Duration::from_secs(120);
        assert_eq!(guard.sweep_at(later), 1);
        assert_eq!(guard.tracked_clients(), 2);

        let much_later = now + Duration::from_secs(7200);
        assert_eq!(guard.sweep_at(much_later), 2);
        assert_eq!(guard.tracked_clients(), 0);
    }

    #[test]
    fn blocks_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("blocked_ips.conf");

        let guard = PerimeterGuard::new(policy()).with_blocklist(BlockList::new(file.clone()));
        let now = Instant::now();
        for _ in 0..4 {
            guard.check_request_at("4.4.4.4", now);
        }
        assert!(std::fs::read_to_string(&file).unwrap().contains("4.4.4.4 1; #"));

        let restarted = PerimeterGuard::new(policy()).with_blocklist(BlockList::new(file));
        assert_eq!(restarted.check_request("4.4.4.4"), Verdict::Blocked);
    }
}
