use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::Mutex;

pub(crate) mod macros;
pub mod traceable;
pub use traceable::Traceable;

/// Process-wide ring of trace lines. Only written when the `tracing`
/// feature is enabled.
pub static TRACER: Lazy<Mutex<Tracer>> = Lazy::new(|| Mutex::new(Tracer::new(1_000_000)));

pub struct Tracer {
    history: VecDeque<String>,
    capacity: usize,
}

impl Tracer {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn write(&mut self, msg: String) {
        if self.capacity == 0 {
            return;
        }
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(msg);
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Sends the buffered history to the `log` facade at debug level.
    pub fn dump(&self) {
        for (i, line) in self.history.iter().enumerate() {
            log::debug!("{:06}: {}", i, line);
        }
    }

    pub fn log<T: Traceable + ?Sized>(&mut self, thing: &T) {
        if let Some(trace) = thing.trace() {
            self.write(trace);
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_drops_oldest() {
        let mut tracer = Tracer::new(2);
        tracer.write("a".into());
        tracer.write("b".into());
        tracer.write("c".into());
        assert_eq!(tracer.lines().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    struct Probe(Option<&'static str>);

    impl Traceable for Probe {
        fn trace_name(&self) -> &'static str {
            "PROBE"
        }

        fn trace_state(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    #[test]
    fn test_log_skips_silent_components() {
        let mut tracer = Tracer::new(8);
        tracer.log(&Probe(None));
        tracer.log(&Probe(Some("x=1")));
        assert_eq!(tracer.lines().collect::<Vec<_>>(), vec!["PROBE x=1"]);
    }
}
