#[cfg(test)]
pub mod test_helpers {
    use crate::address::ServerAddress;
    use crate::readiness::{Probe, Sleeper};
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::NamedTempFile;

    /// Probe that fails a fixed number of times before succeeding.
    pub struct ReadyAfter {
        failures: Option<u32>,
        calls: AtomicU32,
    }

    impl ReadyAfter {
        pub fn new(failures: u32) -> Self {
            Self {
                failures: Some(failures),
                calls: AtomicU32::new(0),
            }
        }

        pub fn never() -> Self {
            Self {
                failures: None,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl Probe for ReadyAfter {
        async fn probe(&self, _addr: &ServerAddress) -> bool {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.failures {
                Some(failures) => call >= failures,
                None => false,
            }
        }
    }

    /// Probe that takes `delay` on the tokio clock and never succeeds.
    pub struct SlowProbe {
        delay: Duration,
    }

    impl SlowProbe {
        pub fn new(delay: Duration) -> Self {
            Self { delay }
        }
    }

    impl Probe for SlowProbe {
        async fn probe(&self, _addr: &ServerAddress) -> bool {
            tokio::time::sleep(self.delay).await;
            false
        }
    }

    /// Sleeper that records requested delays and returns immediately.
    #[derive(Clone, Default)]
    pub struct RecordingSleeper {
        delays: Arc<Mutex<Vec<Duration>>>,
    }

    impl RecordingSleeper {
        pub fn recorded(&self) -> Vec<Duration> {
            self.delays.lock().unwrap().clone()
        }
    }

    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    pub fn schema_file(sql: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(sql.as_bytes()).unwrap();
        file
    }
}
