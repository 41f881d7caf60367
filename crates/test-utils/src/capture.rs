
use std::io::{self, Write};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing_subscriber::{EnvFilter, fmt};

static CAPTURE: OnceLock<LogCapture> = OnceLock::new();

/// Formatted log lines written by the process-wide subscriber that
/// [`init_log_capture`] installs.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn lines(&self) -> Vec<String> {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer)
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Lines containing every one of `needles`.
    pub fn matching(&self, needles: &[&str]) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| needles.iter().all(|needle| line.contains(needle)))
            .collect()
    }
}

struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl Write for CaptureWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Install a global subscriber that records `taskchain` logs at debug level
/// into memory, and return a handle to them.
///
/// Replaces [`crate::init_tracing`]: a test binary uses one or the other.
pub fn init_log_capture() -> LogCapture {
    CAPTURE
        .get_or_init(|| {
            let capture = LogCapture::default();
            let buffer = Arc::clone(&capture.buffer);
            fmt()
                .with_env_filter(EnvFilter::new("taskchain=debug"))
                .with_writer(move || CaptureWriter(Arc::clone(&buffer)))
                .with_ansi(false)
                .with_target(true)
                .init();
            capture
        })
        .clone()
}
