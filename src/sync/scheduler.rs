//! Time-driven helpers for the cooperative update loop.

/// Turns variable frame deltas into a whole number of fixed-rate ticks.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    interval_s: f64,
    accumulated_s: f64,
}

impl TickScheduler {
    pub fn new(rate_hz: f64) -> Self {
        let interval_s = if rate_hz > 0.0 { 1.0 / rate_hz } else { 0.0 };
        Self {
            interval_s,
            accumulated_s: 0.0,
        }
    }

    #[inline]
    pub fn interval(&self) -> f64 {
        self.interval_s
    }

    /// Advance by `dt`; returns how many ticks elapsed.
    pub fn advance(&mut self, dt: f64) -> u32 {
        if self.interval_s <= 0.0 {
            return 1;
        }
        self.accumulated_s += dt.max(0.0);
        let mut ticks = 0;
        // Small slack so dt == interval always yields a tick.
        while self.accumulated_s + 1e-9 >= self.interval_s {
            self.accumulated_s -= self.interval_s;
            ticks += 1;
        }
        ticks
    }
}

/// Actions waiting for a deadline in session time.
#[derive(Debug, Clone)]
pub struct DeferredQueue<T> {
    entries: Vec<(f64, u64, T)>,
    next_seq: u64,
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
        }
    }
}

impl<T> DeferredQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: f64, action: T) {
        self.entries.push((deadline, self.next_seq, action));
        self.next_seq += 1;
    }

    /// Remove and return every action due at `now`, earliest first.
    pub fn pop_due(&mut self, now: f64) -> Vec<T> {
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.entries.drain(..).partition(|(at, _, _)| *at <= now);
        self.entries = pending;
        due.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        due.into_iter().map(|(_, _, action)| action).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
