use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::timeframe::Timeframe;
use crate::Bucket;

/// Default page size for [`TimeSeriesBuffer::items_after`].
pub const DEFAULT_BATCH_SIZE: usize = 300;

/// Two adjacent retained buckets that are further apart than expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuityGap {
    pub previous: Bucket,
    pub next: Bucket,
    pub expected_step: TimeDelta,
}

impl ContinuityGap {
    /// Distance between the two buckets.
    pub fn actual_step(&self) -> TimeDelta {
        self.next - self.previous
    }
}

/// Consistent read of a range plus the counters it was taken at.
#[derive(Debug, Clone)]
pub struct RangeRead<V> {
    pub version: u64,
    pub epoch: u64,
    pub entries: BTreeMap<Bucket, V>,
}

#[derive(Debug)]
struct Window<V> {
    entries: BTreeMap<Bucket, V>,
    first: Option<(Bucket, V)>,
    last: Option<(Bucket, V)>,
}

impl<V: Clone> Window<V> {
    fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
            first: None,
            last: None,
        }
    }

    fn evict_to(&mut self, capacity: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > capacity {
            if self.entries.pop_first().is_none() {
                break;
            }
            evicted += 1;
        }
        evicted
    }

    fn refresh_edges(&mut self) {
        self.first = self.entries.first_key_value().map(|(k, v)| (*k, v.clone()));
        self.last = self.entries.last_key_value().map(|(k, v)| (*k, v.clone()));
    }
}

/// Bounded, bucket-ordered buffer with a monotonic version counter.
///
/// One writer mutates the buffer; any number of readers may query it
/// concurrently. Every mutation happens under a single write-lock section, so
/// readers only ever observe complete states, and every read that returns
/// entries hands out an owned copy.
///
/// `version` is bumped exactly once per mutating call. `epoch` is bumped only
/// when the whole window is replaced ([`clear`](Self::clear),
/// [`restore_all`](Self::restore_all), [`replace_all`](Self::replace_all)), which
/// lets consumers tell "something was appended" apart from "everything changed".
pub struct TimeSeriesBuffer<V> {
    name: String,
    capacity: usize,
    window: RwLock<Window<V>>,
    version: AtomicU64,
    epoch: AtomicU64,
}

impl<V: Clone> TimeSeriesBuffer<V> {
    /// Creates an empty buffer. A zero capacity is treated as one.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            window: RwLock::new(Window::empty()),
            version: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.window.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.read().entries.is_empty()
    }

    /// Number of mutating calls applied so far.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Number of wholesale window replacements applied so far.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Inserts or replaces the value at `bucket`, evicting the oldest buckets
    /// while the buffer is over capacity. Returns the replaced value.
    pub fn put(&self, bucket: Bucket, value: V) -> Option<V> {
        let mut window = self.window.write();
        let previous = window.entries.insert(bucket, value);
        let evicted = window.evict_to(self.capacity);
        window.refresh_edges();
        self.version.fetch_add(1, Ordering::AcqRel);

        if evicted > 0 {
            debug!(buffer = %self.name, %bucket, evicted, "evicted oldest buckets");
        }
        previous
    }

    /// Bulk insert on top of the current contents, as one logical mutation.
    pub fn restore_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (Bucket, V)>,
    {
        let mut window = self.window.write();
        window.entries.extend(entries);
        window.evict_to(self.capacity);
        window.refresh_edges();
        self.version.fetch_add(1, Ordering::AcqRel);
        self.epoch.fetch_add(1, Ordering::AcqRel);

        debug!(buffer = %self.name, size = window.entries.len(), "restored entries");
    }

    /// Clears the buffer and loads `entries` in the same write section, so
    /// readers never observe the intermediate empty window.
    pub fn replace_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (Bucket, V)>,
    {
        let mut window = self.window.write();
        window.entries.clear();
        window.entries.extend(entries);
        window.evict_to(self.capacity);
        window.refresh_edges();
        self.version.fetch_add(1, Ordering::AcqRel);
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    pub fn clear(&self) {
        let mut window = self.window.write();
        window.entries.clear();
        window.refresh_edges();
        self.version.fetch_add(1, Ordering::AcqRel);
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Entries strictly between `after` and `before`; `None` leaves that side open.
    pub fn range(&self, after: Option<Bucket>, before: Option<Bucket>) -> BTreeMap<Bucket, V> {
        Self::collect_range(&self.window.read().entries, after, before)
    }

    /// Like [`range`](Self::range) but also reports the version and epoch the
    /// copy corresponds to.
    pub fn read_range(&self, after: Option<Bucket>, before: Option<Bucket>) -> RangeRead<V> {
        let window = self.window.read();
        RangeRead {
            version: self.version(),
            epoch: self.epoch(),
            entries: Self::collect_range(&window.entries, after, before),
        }
    }

    fn collect_range(
        entries: &BTreeMap<Bucket, V>,
        after: Option<Bucket>,
        before: Option<Bucket>,
    ) -> BTreeMap<Bucket, V> {
        if let (Some(a), Some(b)) = (after, before) {
            // BTreeMap::range panics on an inverted or empty exclusive range.
            if a >= b {
                return BTreeMap::new();
            }
        }
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        let upper = before.map_or(Bound::Unbounded, Bound::Excluded);
        entries
            .range((lower, upper))
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    /// Up to `limit` entries after `after` (or from the start), ascending.
    pub fn items_after(&self, after: Option<Bucket>, limit: usize) -> Vec<(Bucket, V)> {
        let window = self.window.read();
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        window
            .entries
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    /// The most recent `n` entries, ascending.
    pub fn last_n(&self, n: usize) -> Vec<(Bucket, V)> {
        let window = self.window.read();
        let mut tail: Vec<_> = window
            .entries
            .iter()
            .rev()
            .take(n)
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        tail.reverse();
        tail
    }

    /// Immutable copy of the whole retained window.
    pub fn snapshot(&self) -> BTreeMap<Bucket, V> {
        self.window.read().entries.clone()
    }

    pub fn get(&self, bucket: &Bucket) -> Option<V> {
        self.window.read().entries.get(bucket).cloned()
    }

    pub fn contains(&self, bucket: &Bucket) -> bool {
        self.window.read().entries.contains_key(bucket)
    }

    pub fn first_bucket(&self) -> Option<Bucket> {
        self.window.read().first.as_ref().map(|(k, _)| *k)
    }

    pub fn last_bucket(&self) -> Option<Bucket> {
        self.window.read().last.as_ref().map(|(k, _)| *k)
    }

    pub fn first_item(&self) -> Option<V> {
        self.window.read().first.as_ref().map(|(_, v)| v.clone())
    }

    pub fn last_item(&self) -> Option<V> {
        self.window.read().last.as_ref().map(|(_, v)| v.clone())
    }

    /// Checks that each adjacent pair among the last `last_n` buckets is exactly
    /// `step` apart. Violations are logged and returned; nothing is modified.
    pub fn check_continuity(&self, last_n: usize, step: TimeDelta) -> Vec<ContinuityGap> {
        let window = self.window.read();
        let mut buckets: Vec<Bucket> = window.entries.keys().rev().take(last_n).copied().collect();
        drop(window);
        buckets.reverse();

        let gaps: Vec<ContinuityGap> = buckets
            .windows(2)
            .filter(|pair| pair[1] - pair[0] != step)
            .map(|pair| ContinuityGap {
                previous: pair[0],
                next: pair[1],
                expected_step: step,
            })
            .collect();

        for gap in &gaps {
            warn!(
                buffer = %self.name,
                previous = %gap.previous,
                next = %gap.next,
                step_secs = gap.actual_step().num_seconds(),
                expected_secs = step.num_seconds(),
                "continuity gap"
            );
        }
        gaps
    }

    /// Whether the buffer is fresh enough to build on: non-empty, holding at
    /// least `min_len` entries when given, with a last bucket no older than
    /// two bucket widths plus `margin`, and no adjacent gap wider than two
    /// bucket widths.
    pub fn is_actual(
        &self,
        timeframe: Timeframe,
        now: DateTime<Utc>,
        min_len: Option<usize>,
        margin: TimeDelta,
    ) -> bool {
        let window = self.window.read();
        if let Some(min) = min_len {
            if window.entries.len() < min {
                debug!(buffer = %self.name, size = window.entries.len(), min, "not actual: too few entries");
                return false;
            }
        }

        let Some((last, _)) = window.last.as_ref() else {
            debug!(buffer = %self.name, "not actual: empty");
            return false;
        };

        let duration = timeframe.duration();
        let allowed = duration * 2 + margin;
        if now - *last > allowed {
            debug!(buffer = %self.name, last = %last, "not actual: last bucket too old");
            return false;
        }

        let max_gap = duration * 2;
        let mut keys = window.entries.keys();
        let mut previous = keys.next();
        for bucket in keys {
            if let Some(prev) = previous {
                if *bucket - *prev > max_gap {
                    debug!(buffer = %self.name, previous = %prev, next = %bucket, "not actual: gap");
                    return false;
                }
            }
            previous = Some(bucket);
        }
        true
    }
}

impl<V> fmt::Debug for TimeSeriesBuffer<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeSeriesBuffer")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("version", &self.version.load(Ordering::Relaxed))
            .field("epoch", &self.epoch.load(Ordering::Relaxed))
            .finish()
    }
}

impl<V: Clone> fmt::Display for TimeSeriesBuffer<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let window = self.window.read();
        write!(
            f,
            "{}[{}/{} v{} e{}",
            self.name,
            window.entries.len(),
            self.capacity,
            self.version(),
            self.epoch()
        )?;
        if let (Some((first, _)), Some((last, _))) = (&window.first, &window.last) {
            write!(f, " {}..={}", first, last)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t(minute: u32) -> Bucket {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, minute, 0).unwrap()
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let buffer = TimeSeriesBuffer::new("candles", 2);
        buffer.put(t(1), "a");
        buffer.put(t(2), "b");
        buffer.put(t(3), "c");

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.snapshot().keys().copied().collect::<Vec<_>>(), vec![t(2), t(3)]);
        assert_eq!(buffer.first_bucket(), Some(t(2)));
        assert_eq!(buffer.last_bucket(), Some(t(3)));
        assert_eq!(buffer.first_item(), Some("b"));
        assert_eq!(buffer.version(), 3);
    }

    #[test]
    fn eviction_is_by_bucket_not_insertion_order() {
        let buffer = TimeSeriesBuffer::new("candles", 2);
        buffer.put(t(5), 5);
        buffer.put(t(9), 9);
        buffer.put(t(1), 1);

        // The late insert of an older bucket is itself the eviction victim.
        assert_eq!(buffer.snapshot().keys().copied().collect::<Vec<_>>(), vec![t(5), t(9)]);
        assert_eq!(buffer.version(), 3);
    }

    #[test]
    fn replacing_a_bucket_returns_previous_and_keeps_size() {
        let buffer = TimeSeriesBuffer::new("candles", 2);
        buffer.put(t(1), 1);
        buffer.put(t(2), 2);
        assert_eq!(buffer.put(t(2), 20), Some(2));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.first_bucket(), Some(t(1)));
        assert_eq!(buffer.last_item(), Some(20));
        assert_eq!(buffer.version(), 3);
    }

    #[test]
    fn reads_do_not_bump_version() {
        let buffer = TimeSeriesBuffer::new("candles", 4);
        buffer.put(t(1), 1);
        let before = buffer.version();
        let _ = buffer.range(None, None);
        let _ = buffer.snapshot();
        let _ = buffer.last_bucket();
        let _ = buffer.items_after(None, DEFAULT_BATCH_SIZE);
        let _ = buffer.check_continuity(10, TimeDelta::minutes(1));
        assert_eq!(buffer.version(), before);
    }

    #[test]
    fn range_bounds_are_exclusive() {
        let buffer = TimeSeriesBuffer::new("candles", 10);
        for m in 1..=5 {
            buffer.put(t(m), m);
        }
        let mid = buffer.range(Some(t(1)), Some(t(5)));
        assert_eq!(mid.keys().copied().collect::<Vec<_>>(), vec![t(2), t(3), t(4)]);
        assert_eq!(buffer.range(Some(t(4)), None).len(), 1);
        assert_eq!(buffer.range(None, Some(t(2))).len(), 1);
        assert!(buffer.range(Some(t(3)), Some(t(3))).is_empty());
        assert!(buffer.range(Some(t(4)), Some(t(2))).is_empty());
    }

    #[test]
    fn restore_all_trims_and_bumps_epoch() {
        let buffer = TimeSeriesBuffer::new("history", 3);
        buffer.put(t(1), 1);
        buffer.restore_all((2..=6).map(|m| (t(m), m)));

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.first_bucket(), Some(t(4)));
        assert_eq!(buffer.version(), 2);
        assert_eq!(buffer.epoch(), 1);

        buffer.restore_all(std::iter::empty());
        assert_eq!(buffer.version(), 3);
        assert_eq!(buffer.epoch(), 2);
    }

    #[test]
    fn clear_resets_edges() {
        let buffer = TimeSeriesBuffer::new("candles", 3);
        buffer.put(t(1), 1);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.first_bucket(), None);
        assert_eq!(buffer.last_item(), None);
        assert_eq!(buffer.version(), 2);
        assert_eq!(buffer.epoch(), 1);
    }

    #[test]
    fn replace_all_swaps_window_in_one_step() {
        let buffer = TimeSeriesBuffer::new("points", 5);
        buffer.put(t(1), 1);
        buffer.put(t(2), 2);
        buffer.replace_all(vec![(t(7), 7), (t(8), 8)]);
        assert_eq!(buffer.snapshot().keys().copied().collect::<Vec<_>>(), vec![t(7), t(8)]);
        assert_eq!(buffer.version(), 3);
        assert_eq!(buffer.epoch(), 1);
    }

    #[test]
    fn items_after_pages_through_window() {
        let buffer = TimeSeriesBuffer::new("candles", 10);
        for m in 1..=6 {
            buffer.put(t(m), m);
        }
        let page = buffer.items_after(Some(t(2)), 2);
        assert_eq!(page, vec![(t(3), 3), (t(4), 4)]);
        assert_eq!(buffer.items_after(None, 1), vec![(t(1), 1)]);
        assert_eq!(buffer.last_n(2), vec![(t(5), 5), (t(6), 6)]);
    }

    #[test]
    fn continuity_reports_gaps_in_tail_only() {
        let buffer = TimeSeriesBuffer::new("candles", 10);
        for m in [1, 3, 4, 5, 7] {
            buffer.put(t(m), m);
        }
        let step = TimeDelta::minutes(1);
        let gaps = buffer.check_continuity(3, step);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].previous, t(5));
        assert_eq!(gaps[0].next, t(7));
        assert_eq!(gaps[0].actual_step(), TimeDelta::minutes(2));

        assert_eq!(buffer.check_continuity(10, step).len(), 2);
    }

    #[test]
    fn actuality_checks_age_and_gaps() {
        let buffer = TimeSeriesBuffer::new("candles", 10);
        let tf = Timeframe::M1;
        let margin = TimeDelta::seconds(10);
        assert!(!buffer.is_actual(tf, t(5), None, margin));

        buffer.put(t(1), 1);
        buffer.put(t(2), 2);
        buffer.put(t(4), 4);
        assert!(buffer.is_actual(tf, t(6), None, margin));
        assert!(!buffer.is_actual(tf, t(7), None, margin));
        assert!(!buffer.is_actual(tf, t(5), Some(4), margin));

        buffer.put(t(8), 8);
        assert!(!buffer.is_actual(tf, t(8), None, margin));
    }

    #[test]
    fn readers_see_bounded_consistent_windows() {
        let buffer = Arc::new(TimeSeriesBuffer::new("shared", 16));
        let writer = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for i in 0..2_000i64 {
                    buffer.put(Utc.timestamp_opt(i * 60, 0).unwrap(), i);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let read = buffer.read_range(None, None);
                        assert!(read.entries.len() <= 16);
                        let values: Vec<i64> = read.entries.values().copied().collect();
                        assert!(values.windows(2).all(|w| w[1] == w[0] + 1));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(buffer.version(), 2_000);
        assert_eq!(buffer.len(), 16);
    }

    #[test]
    fn display_summarises_window() {
        let buffer = TimeSeriesBuffer::new("rsi", 4);
        assert_eq!(buffer.to_string(), "rsi[0/4 v0 e0]");
        buffer.put(t(1), 1);
        assert!(buffer.to_string().starts_with("rsi[1/4 v1 e0 "));
    }
}
