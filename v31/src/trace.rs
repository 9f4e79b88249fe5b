use std::collections::VecDeque;

pub const MAX_TRACE_ENTRIES: usize = 100;

/// In-client trace log kept between `start_trace` and `stop_trace`.
///
/// Every record is also forwarded to `log::trace!`, whether or not the
/// buffer is active.
#[derive(Debug, Default)]
pub struct TraceBuffer {
    entries: Option<VecDeque<String>>,
}

impl TraceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.entries.is_some()
    }

    pub fn start(&mut self) {
        if self.entries.is_none() {
            self.entries = Some(VecDeque::with_capacity(MAX_TRACE_ENTRIES));
        }
    }

    pub fn stop(&mut self) {
        self.entries = None;
    }

    pub fn record(&mut self, location: &str, detail: std::fmt::Arguments<'_>) {
        log::trace!("{location} {detail}");
        if let Some(entries) = &mut self.entries {
            if entries.len() == MAX_TRACE_ENTRIES {
                entries.pop_front();
            }
            entries.push_back(format!("{location} {detail}").trim_end().to_owned());
        }
    }

    pub fn snapshot(&self) -> Option<Vec<String>> {
        self.entries
            .as_ref()
            .map(|entries| entries.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_buffer_keeps_nothing() {
        let mut trace = TraceBuffer::new();
        trace.record("Client.send", format_args!("x"));
        assert!(trace.snapshot().is_none());
    }

    #[test]
    fn bounded_to_max_entries() {
        let mut trace = TraceBuffer::new();
        trace.start();
        for i in 0..150 {
            trace.record("step", format_args!("{i}"));
        }
        let entries = trace.snapshot().unwrap();
        assert_eq!(entries.len(), MAX_TRACE_ENTRIES);
        assert_eq!(entries[0], "step 50");
        assert_eq!(entries[99], "step 149");
    }

    #[test]
    fn stop_discards_and_restart_is_empty() {
        let mut trace = TraceBuffer::new();
        trace.start();
        trace.record("a", format_args!(""));
        trace.start();
        assert_eq!(trace.snapshot().unwrap(), vec!["a"]);
        trace.stop();
        assert!(!trace.is_active());
        trace.start();
        assert!(trace.snapshot().unwrap().is_empty());
    }
}
