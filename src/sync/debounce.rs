// src/sync/debounce.rs
//
// Debounce with a max-wait ceiling, driven by explicit timestamps instead of
// timers. The owner calls `poll(now)` from its event loop.

/// Rate limiter for outbound writes.
///
/// A burst of calls produces a single write with the latest arguments,
/// `delay_ms` after the last call, or `max_wait_ms` after the first call of
/// the burst if calls keep coming.
pub struct DebouncedWriter<A, R: Clone> {
    write: Box<dyn FnMut(A) -> R + Send>,
    delay_ms: u64,
    max_wait_ms: Option<u64>,

    last_args: Option<A>,
    last_result: Option<R>,

    /// Time of the first call in the current burst.
    burst_start: Option<u64>,
    trailing_deadline: Option<u64>,
    max_deadline: Option<u64>,
}

impl<A, R: Clone> DebouncedWriter<A, R> {
    pub fn new<F>(write: F, delay_ms: u64, max_wait_ms: Option<u64>) -> Self
    where
        F: FnMut(A) -> R + Send + 'static,
    {
        Self {
            write: Box::new(write),
            delay_ms,
            max_wait_ms,
            last_args: None,
            last_result: None,
            burst_start: None,
            trailing_deadline: None,
            max_deadline: None,
        }
    }

    /// Record `args` for a later write and return the last write's result.
    ///
    /// Any write that was already due by `now` fires first, and its result is
    /// what comes back. Owners that need to tell that write apart from older
    /// ones call `poll(now)` before `call`.
    pub fn call(&mut self, args: A, now: u64) -> Option<&R> {
        self.poll(now);

        self.last_args = Some(args);

        // A burst older than max-wait has already fired above.
        if self.burst_start.is_none() {
            self.burst_start = Some(now);
            self.max_deadline = self.max_wait_ms.map(|w| now + w);
        }
        self.trailing_deadline = Some(now + self.delay_ms);

        self.last_result.as_ref()
    }

    /// Fire the pending write if either deadline has passed.
    pub fn poll(&mut self, now: u64) -> Option<R> {
        self.last_args.as_ref()?;
        let due = |deadline: Option<u64>| deadline.is_some_and(|d| now >= d);
        if due(self.trailing_deadline) || due(self.max_deadline) {
            self.invoke()
        } else {
            None
        }
    }

    /// Fire the pending write now, if there is one.
    pub fn flush(&mut self) -> Option<R> {
        self.invoke()
    }

    /// Drop the pending write.
    pub fn cancel(&mut self) {
        self.last_args = None;
        self.clear_burst();
    }

    pub fn is_pending(&self) -> bool {
        self.last_args.is_some()
    }

    /// Earliest time at which `poll` would fire.
    pub fn next_deadline(&self) -> Option<u64> {
        if !self.is_pending() {
            return None;
        }
        match (self.trailing_deadline, self.max_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn last_result(&self) -> Option<&R> {
        self.last_result.as_ref()
    }

    fn invoke(&mut self) -> Option<R> {
        let args = self.last_args.take()?;
        self.clear_burst();
        let result = (self.write)(args);
        self.last_result = Some(result.clone());
        Some(result)
    }

    fn clear_burst(&mut self) {
        self.trailing_deadline = None;
        self.max_deadline = None;
        self.burst_start = None;
    }
}

impl<A, R: Clone> std::fmt::Debug for DebouncedWriter<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedWriter")
            .field("delay_ms", &self.delay_ms)
            .field("max_wait_ms", &self.max_wait_ms)
            .field("pending", &self.is_pending())
            .field("burst_start", &self.burst_start)
            .finish()
    }
}
