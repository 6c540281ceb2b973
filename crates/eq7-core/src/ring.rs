/// Bounded FIFO ring with inline storage. Never allocates.
///
/// `N` is the storage bound; the effective capacity is chosen at
/// construction and may be smaller. Once full, each `push` overwrites the
/// oldest entry. Index 0 is always the oldest entry.
///
/// # Example
/// ```
/// use eq7_core::ring::RingLog;
/// let mut log: RingLog<u32, 4> = RingLog::with_capacity(3);
/// for t in [10, 20, 30, 40] {
///     log.push(t);
/// }
/// assert_eq!(log.len(), 3);
/// assert_eq!(log.get(0), Some(20));
/// assert_eq!(log.latest(), Some(40));
/// ```
#[derive(Clone, Debug)]
pub struct RingLog<T, const N: usize> {
    buf: [T; N],
    capacity: usize,
    /// Slot of the oldest entry.
    head: usize,
    len: usize,
}

impl<T: Copy + Default, const N: usize> RingLog<T, N> {
    /// Ring using the full storage bound as capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(N)
    }

    /// Ring with an effective capacity clamped to `1..=N`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: [T::default(); N],
            capacity: capacity.clamp(1, N.max(1)),
            head: 0,
            len: 0,
        }
    }

    /// Append a value, evicting the oldest one when full. O(1).
    #[inline]
    pub fn push(&mut self, value: T) {
        if self.len < self.capacity {
            let slot = (self.head + self.len) % self.capacity;
            self.buf[slot] = value;
            self.len += 1;
        } else {
            self.buf[self.head] = value;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Entry at `index`, counted from the oldest.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        if index >= self.len {
            return None;
        }
        Some(self.buf[(self.head + index) % self.capacity])
    }

    /// Most recently pushed entry.
    #[inline]
    #[must_use]
    pub fn latest(&self) -> Option<T> {
        self.len.checked_sub(1).and_then(|i| self.get(i))
    }

    /// Number of stored entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Effective capacity chosen at construction.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry. Capacity is kept.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = T> + ExactSizeIterator + '_ {
        (0..self.len).map(move |i| self.buf[(self.head + i) % self.capacity])
    }
}

impl<T: Copy + Default, const N: usize> Default for RingLog<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_the_most_recent_in_fifo_order() {
        let mut log: RingLog<u32, 64> = RingLog::with_capacity(20);
        for t in 1..=25u32 {
            log.push(t * 100);
        }
        assert_eq!(log.len(), 20);
        assert!(log.is_full());
        let kept: Vec<u32> = log.iter().collect();
        let expected: Vec<u32> = (6..=25u32).map(|t| t * 100).collect();
        assert_eq!(kept, expected);
        assert_eq!(log.get(0), Some(600));
        assert_eq!(log.get(19), Some(2500));
        assert_eq!(log.get(20), None);
    }

    #[test]
    fn partial_fill_reads_in_push_order() {
        let mut log: RingLog<u32, 8> = RingLog::new();
        log.push(3);
        log.push(1);
        log.push(2);
        assert_eq!(log.iter().collect::<Vec<_>>(), vec![3, 1, 2]);
        assert_eq!(log.latest(), Some(2));
        assert_eq!(log.iter().rev().next(), Some(2));
    }

    #[test]
    fn capacity_is_clamped_to_storage() {
        let log: RingLog<u8, 4> = RingLog::with_capacity(100);
        assert_eq!(log.capacity(), 4);
        let log: RingLog<u8, 4> = RingLog::with_capacity(0);
        assert_eq!(log.capacity(), 1);
    }

    #[test]
    fn clear_resets_but_keeps_capacity() {
        let mut log: RingLog<u16, 4> = RingLog::with_capacity(2);
        log.push(1);
        log.push(2);
        log.push(3);
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.latest(), None);
        log.push(9);
        assert_eq!(log.get(0), Some(9));
        assert_eq!(log.capacity(), 2);
    }
}
