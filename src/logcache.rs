//! A leveled logger that can keep its recent output in memory.
//!
//! [`LogCache`] is an ordinary value: build one per parser run, or install
//! one as the process logger through its [`log::Log`] implementation.
use std::sync::Mutex;
use thiserror::Error;

/// Settings of a [`LogCache`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogConfig {
    /// Messages at or below this verbosity are echoed to stderr
    pub verbosity: usize,

    /// Shown before every message if set
    pub name: Option<String>,

    /// Prefix cached entries with the time they were written
    pub prepend_time: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            name: None,
            prepend_time: true,
        }
    }
}

/// An error enabling the cache
#[derive(Debug, PartialEq, Eq, Error)]
pub enum CacheError {
    /// `enable_caching` was called a second time
    #[error("log caching is already enabled")]
    AlreadyEnabled,

    /// A zero line count or byte budget
    #[error("invalid cache limits: {max_lines} lines, {max_mem} bytes")]
    InvalidLimits {
        /// The requested number of entries
        max_lines: usize,
        /// The requested byte budget
        max_mem: usize,
    },
}

/// Ring buffer of recent messages, bounded in entries and in bytes
#[derive(Debug)]
struct Cache {
    entries: Vec<Option<String>>,
    pos: usize,
    mem: usize,
    max_mem: usize,
}

impl Cache {
    fn push(&mut self, entry: String) {
        if let Some(old) = self.entries[self.pos].take() {
            self.mem -= old.len();
        }
        self.mem += entry.len();
        self.entries[self.pos] = Some(entry);
        self.pos = (self.pos + 1) % self.entries.len();

        // Evict from the oldest end, but keep the entry just written.
        let len = self.entries.len();
        for i in 0..len - 1 {
            if self.mem <= self.max_mem {
                break;
            }
            if let Some(old) = self.entries[(self.pos + i) % len].take() {
                self.mem -= old.len();
            }
        }
    }

    fn output(&self) -> String {
        let len = self.entries.len();
        let mut out = String::with_capacity(self.mem + len);
        for entry in (0..len).filter_map(|i| self.entries[(self.pos + i) % len].as_ref()) {
            out.push_str(entry);
            out.push('\n');
        }
        out
    }
}

/// A leveled logger with optional in-memory caching
#[derive(Debug, Default)]
pub struct LogCache {
    config: LogConfig,
    cache: Mutex<Option<Cache>>,
}

impl LogCache {
    /// Create a logger; caching starts disabled
    pub fn new(config: LogConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(None),
        }
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, Option<Cache>> {
        // A panic elsewhere while holding the lock leaves the cache usable.
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether messages at `verbosity` are echoed
    pub fn enabled(&self, verbosity: usize) -> bool {
        verbosity <= self.config.verbosity
    }

    /// Start keeping up to `max_lines` recent messages, totalling no more
    /// than `max_mem` bytes
    pub fn enable_caching(&self, max_lines: usize, max_mem: usize) -> Result<(), CacheError> {
        if max_lines == 0 || max_mem == 0 {
            return Err(CacheError::InvalidLimits { max_lines, max_mem });
        }
        let mut cache = self.cache();
        if cache.is_some() {
            return Err(CacheError::AlreadyEnabled);
        }
        *cache = Some(Cache {
            entries: vec![None; max_lines],
            pos: 0,
            mem: 0,
            max_mem,
        });
        Ok(())
    }

    /// The cached messages, oldest first, one per line
    pub fn cached_output(&self) -> String {
        self.cache().as_ref().map(Cache::output).unwrap_or_default()
    }

    /// Log a message at the given verbosity
    pub fn write(&self, verbosity: usize, message: &str) {
        self.write_message(verbosity, None, message);
    }

    /// Log an error; errors are always at verbosity 0
    pub fn error(&self, message: &str) {
        self.write_message(0, Some("ERROR"), message);
    }

    fn write_message(&self, verbosity: usize, severity: Option<&str>, message: &str) {
        let mut text = String::new();
        if let Some(severity) = severity {
            text.push_str(&format!("[{}] ", severity));
        }
        if let Some(name) = &self.config.name {
            text.push_str(&format!("{}: ", name));
        }
        text.push_str(message);

        if verbosity <= 1 {
            if let Some(cache) = self.cache().as_mut() {
                let entry = if self.config.prepend_time {
                    format!("{}{}", chrono::Local::now().format("%Y/%m/%d %H:%M:%S "), text)
                } else {
                    text.clone()
                };
                cache.push(entry);
            }
        }

        if self.enabled(verbosity) {
            eprintln!("{}", text);
        }
    }

    /// A writer whose output is logged at `verbosity`
    pub fn writer(&self, verbosity: usize) -> VerboseWriter<'_> {
        VerboseWriter {
            log: self,
            verbosity,
        }
    }
}

fn level_verbosity(level: log::Level) -> usize {
    match level {
        log::Level::Error | log::Level::Warn | log::Level::Info => 0,
        log::Level::Debug => 1,
        log::Level::Trace => 2,
    }
}

impl log::Log for LogCache {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        // Messages below the echo level may still be cached.
        true
    }

    fn log(&self, record: &log::Record) {
        let message = record.args().to_string();
        match record.level() {
            log::Level::Error => self.error(&message),
            level => self.write(level_verbosity(level), &message),
        }
    }

    fn flush(&self) {}
}

/// Logs everything written to it; see [`LogCache::writer`]
pub struct VerboseWriter<'a> {
    log: &'a LogCache,
    verbosity: usize,
}

impl std::io::Write for VerboseWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.log.write(self.verbosity, &String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
