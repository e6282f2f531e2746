use crate::error::{Error, Result};

/// Environment variable overriding the default worker count.
const NUM_THREADS_ENV: &str = "STRAND_NUM_THREADS";

/// Configuration for a [`ThreadPool`](crate::ThreadPool).
#[derive(Debug, Clone)]
pub struct Config {
    /// Desired worker count; `None` means [`default_capacity`].
    pub num_threads: Option<usize>,
    /// Prefix for worker thread names (`"{prefix}-{id}"`).
    pub thread_name_prefix: String,
    /// Stack size for worker threads, if overridden.
    pub stack_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_threads: None,
            thread_name_prefix: "strand-worker".to_string(),
            stack_size: Some(2 * 1024 * 1024),
        }
    }
}

impl Config {
    /// Start building a config.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Check the config for nonsense values.
    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.num_threads {
            if n == 0 {
                return Err(Error::invalid("num_threads must be > 0"));
            }
            if n > 1024 {
                return Err(Error::invalid("num_threads too large (max 1024)"));
            }
        }

        Ok(())
    }

    /// Resolved worker count: the configured value, else [`default_capacity`].
    pub fn worker_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(default_capacity)
    }
}

/// Heuristic for the default capacity of a pool for CPU-bound tasks.
///
/// Honors a `STRAND_NUM_THREADS` override, else the reported hardware
/// parallelism; never less than 1.
pub fn default_capacity() -> usize {
    if let Ok(val) = std::env::var(NUM_THREADS_ENV) {
        if let Ok(n) = val.trim().parse::<usize>() {
            if n > 0 {
                return n;
            }
        }
    }
    num_cpus::get().max(1)
}

/// Builder for [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from the default config.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the desired worker count.
    pub fn num_threads(mut self, n: usize) -> Self {
        self.config.num_threads = Some(n);
        self
    }

    /// Set the worker thread name prefix.
    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker stack size in bytes.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Validate and produce the config.
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
