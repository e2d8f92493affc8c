use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use url::Url;

/// Allow `count` requests per `interval` for a throttle key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Throttle {
    pub count: u32,
    pub interval: Duration,
}

impl Throttle {
    pub fn new(count: u32, interval: Duration) -> Self {
        Self { count, interval }
    }

    pub fn per_second(count: u32) -> Self {
        Self::new(count, Duration::from_secs(1))
    }
}

/// Which parts of a URL make up its throttle key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThrottleKeyPolicy {
    /// Include the query string (host+path otherwise).
    pub include_query: bool,
    /// Query parameters left out of the key even when the query is included.
    pub ignored_query_keys: BTreeSet<String>,
}

impl ThrottleKeyPolicy {
    pub fn host_and_path() -> Self {
        Self::default()
    }

    pub fn with_query() -> Self {
        Self {
            include_query: true,
            ignored_query_keys: BTreeSet::new(),
        }
    }

    pub fn ignoring<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_query_keys
            .extend(keys.into_iter().map(Into::into));
        self
    }
}

/// Normalized throttle key: host, path and (optionally) the remaining query
/// pairs sorted by name so parameter order does not matter.
pub fn throttle_key(url: &Url, policy: &ThrottleKeyPolicy) -> String {
    let mut key = String::new();
    if let Some(host) = url.host_str() {
        key.push_str(host);
    }
    if let Some(port) = url.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }
    key.push_str(url.path());

    if policy.include_query {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !policy.ignored_query_keys.contains(k.as_ref()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if !pairs.is_empty() {
            pairs.sort();
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            key.push('?');
            key.push_str(&query);
        }
    }
    key
}

#[derive(Debug, Clone)]
pub struct ThrottleSnapshot {
    pub count: u32,
    pub interval_ms: u64,
    /// Hits recorded in the current window.
    pub hits: u32,
    /// Time left in the current window (ms).
    pub window_remaining_ms: u64,
}

#[derive(Debug)]
struct Window {
    throttle: Throttle,
    started: Instant,
    hits: u32,
}

/// Sliding-window throttle state shared by every endpoint of a session.
///
/// - A key seen for the first time, or seen with a different throttle
///   configuration, opens a fresh window and is allowed.
/// - Inside a window each call counts a hit; calls are rejected once hits
///   exceed `count`.
/// - Once a window is at least `interval` old it restarts with one hit, and
///   windows of other keys older than their own interval are dropped.
pub struct ThrottleTable {
    windows: Mutex<HashMap<String, Window>>,
}

impl ThrottleTable {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true when the request must be rejected.
    pub fn should_throttle(&self, key: &str, throttle: Throttle) -> bool {
        self.should_throttle_at(key, throttle, Instant::now())
    }

    pub fn should_throttle_at(&self, key: &str, throttle: Throttle, now: Instant) -> bool {
        let mut windows = self.lock();

        let known = matches!(windows.get(key), Some(w) if w.throttle == throttle);
        if !known {
            windows.insert(
                key.to_string(),
                Window {
                    throttle,
                    started: now,
                    hits: 0,
                },
            );
            return false;
        }
        let Some(window) = windows.get_mut(key) else {
            return false;
        };

        if now.saturating_duration_since(window.started) >= throttle.interval {
            window.started = now;
            window.hits = 1;
            windows.retain(|k, w| {
                k == key || now.saturating_duration_since(w.started) <= w.throttle.interval
            });
            return false;
        }

        window.hits = window.hits.saturating_add(1);
        window.hits > throttle.count
    }

    pub fn snapshot(&self, key: &str) -> Option<ThrottleSnapshot> {
        let windows = self.lock();
        let w = windows.get(key)?;
        let elapsed = w.started.elapsed();
        Some(ThrottleSnapshot {
            count: w.throttle.count,
            interval_ms: saturating_millis(w.throttle.interval),
            hits: w.hits,
            window_remaining_ms: saturating_millis(w.throttle.interval.saturating_sub(elapsed)),
        })
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Whole milliseconds in `d`, clamped to `u64::MAX`.
pub(crate) fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Default for ThrottleTable {
    fn default() -> Self {
        Self::new()
    }
}
