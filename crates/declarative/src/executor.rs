//! Execution driver - bounded fan-out batches with per-item failure isolation

use crate::error::{Error, Result};
use rayon::prelude::*;
use std::fs::{File, TryLockError};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// An item that failed, with its error.
#[derive(Debug)]
pub struct ItemError<T> {
    pub item: T,
    pub error: Error,
}

/// Outcome of a batch: successful outputs and failed items.
///
/// Every input item appears exactly once, either in `data` or in `errors`.
#[derive(Debug)]
pub struct ExecutionResult<T, R> {
    pub data: Vec<R>,
    pub errors: Vec<ItemError<T>>,
}

impl<T, R> ExecutionResult<T, R> {
    /// Check if every item succeeded
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Total number of items attempted
    pub fn total(&self) -> usize {
        self.data.len() + self.errors.len()
    }
}

impl<T, R> Default for ExecutionResult<T, R> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Batch runner and named-lock provider
#[derive(Debug, Clone)]
pub struct Executor {
    jobs: usize,
    lock_dir: PathBuf,
    poll_interval: Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self {
            jobs: 4,
            lock_dir: std::env::temp_dir().join("terrace-locks"),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl Executor {
    /// Create an executor with `jobs` workers (at least one)
    pub fn new(jobs: usize) -> Self {
        Self::default().with_jobs(jobs)
    }

    /// Set the worker count
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Set the directory holding lock files
    #[must_use]
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = dir.into();
        self
    }

    /// Set how often a contended lock is retried
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Configured worker count
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Directory holding lock files
    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    /// Apply `f` to every item with the configured worker count.
    pub fn run<T, R, F>(&self, items: Vec<T>, f: F) -> Result<ExecutionResult<T, R>>
    where
        T: Send,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync,
    {
        self.run_with(self.jobs, items, f)
    }

    /// Apply `f` to every item using at most `jobs` workers.
    ///
    /// A failing (or panicking) item never stops its siblings. Outputs keep
    /// input order.
    pub fn run_with<T, R, F>(&self, jobs: usize, items: Vec<T>, f: F) -> Result<ExecutionResult<T, R>>
    where
        T: Send,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync,
    {
        let outcomes: Vec<(T, Result<R>)> = if jobs <= 1 || items.len() <= 1 {
            // Sequential execution
            items
                .into_iter()
                .map(|item| {
                    let result = call(&f, &item);
                    (item, result)
                })
                .collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()
                .map_err(|e| Error::ThreadPool(e.to_string()))?;

            pool.install(|| {
                items
                    .into_par_iter()
                    .map(|item| {
                        let result = call(&f, &item);
                        (item, result)
                    })
                    .collect()
            })
        };

        let mut batch = ExecutionResult::default();
        for (item, result) in outcomes {
            match result {
                Ok(data) => batch.data.push(data),
                Err(error) => batch.errors.push(ItemError { item, error }),
            }
        }
        Ok(batch)
    }

    /// Run `f` while holding the named cross-process lock.
    ///
    /// Fails with [`Error::LockTimeout`] when the lock is still held by
    /// someone else after `timeout`.
    pub fn run_exclusive<R>(
        &self,
        name: &str,
        timeout: Duration,
        f: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        let file = self.acquire(name, timeout)?;
        log::debug!("Acquired lock '{}'", name);

        let result = f();

        if let Err(e) = file.unlock() {
            log::warn!("Failed to release lock '{}': {}", name, e);
        } else {
            log::debug!("Released lock '{}'", name);
        }
        result
    }

    fn acquire(&self, name: &str, timeout: Duration) -> Result<File> {
        let lock_error = |source| Error::Lock {
            name: name.to_string(),
            source,
        };

        std::fs::create_dir_all(&self.lock_dir).map_err(lock_error)?;
        let path = self.lock_dir.join(format!("{}.lock", lock_file_stem(name)));
        let file = File::options()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(lock_error)?;

        let started = Instant::now();
        loop {
            match file.try_lock() {
                Ok(()) => return Ok(file),
                Err(TryLockError::WouldBlock) => {
                    if started.elapsed() >= timeout {
                        return Err(Error::LockTimeout {
                            name: name.to_string(),
                            timeout,
                        });
                    }
                    log::trace!("Lock '{}' is busy, retrying", name);
                    std::thread::sleep(self.poll_interval);
                }
                Err(TryLockError::Error(e)) => return Err(lock_error(e)),
            }
        }
    }
}

/// Run a closure, turning a panic into an item error
fn call<T, R, F>(f: &F, item: &T) -> Result<R>
where
    F: Fn(&T) -> Result<R>,
{
    match catch_unwind(AssertUnwindSafe(|| f(item))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(Error::Panicked(message))
        }
    }
}

/// Readable file stem for a lock name, suffixed with a digest of the exact name
fn lock_file_stem(name: &str) -> String {
    let readable: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let digest = blake3::hash(name.as_bytes()).to_hex();
    format!("{readable}-{}", &digest[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use tempfile::TempDir;

    fn fail_on_three(item: &u32) -> Result<u32> {
        if *item == 3 {
            Err(Error::Panicked("item 3 failed".into()))
        } else {
            Ok(item * 10)
        }
    }

    #[test]
    fn test_partial_failure_isolation_sequential() {
        let attempted = AtomicUsize::new(0);
        let result = Executor::new(1)
            .run(vec![1, 2, 3, 4, 5], |item| {
                attempted.fetch_add(1, Ordering::SeqCst);
                fail_on_three(item)
            })
            .unwrap();

        assert_eq!(attempted.load(Ordering::SeqCst), 5);
        assert_eq!(result.data, vec![10, 20, 40, 50]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].item, 3);
        assert!(!result.is_success());
        assert_eq!(result.total(), 5);
    }

    #[test]
    fn test_partial_failure_isolation_parallel() {
        let result = Executor::new(4)
            .run(vec![1, 2, 3, 4, 5], fail_on_three)
            .unwrap();

        assert_eq!(result.data.len(), 4);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].item, 3);
    }

    #[test]
    fn test_panic_is_isolated() {
        let result = Executor::new(2)
            .run(vec![1, 2, 3], |item: &u32| {
                if *item == 2 {
                    panic!("boom");
                }
                Ok(*item)
            })
            .unwrap();

        assert_eq!(result.data, vec![1, 3]);
        assert!(matches!(&result.errors[0].error, Error::Panicked(m) if m == "boom"));
    }

    #[test]
    fn test_empty_batch() {
        let result: ExecutionResult<u32, u32> = Executor::new(4).run(Vec::new(), |i| Ok(*i)).unwrap();
        assert_eq!(result.total(), 0);
    }

    #[test]
    fn test_run_exclusive_returns_value() {
        let dir = TempDir::new().unwrap();
        let executor = Executor::new(1).with_lock_dir(dir.path());

        let value = executor
            .run_exclusive("bootstrap", Duration::from_secs(1), || Ok(42))
            .unwrap();
        assert_eq!(value, 42);
        assert!(dir.path().join("bootstrap.lock").exists());

        // Released: a second acquisition succeeds immediately
        executor
            .run_exclusive("bootstrap", Duration::from_millis(10), || Ok(()))
            .unwrap();
    }

    #[test]
    fn test_run_exclusive_times_out_when_held() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(
            Executor::new(1)
                .with_lock_dir(dir.path())
                .with_poll_interval(Duration::from_millis(5)),
        );
        let held = Arc::new(Barrier::new(2));
        let done = Arc::new(Barrier::new(2));

        let holder = {
            let executor = Arc::clone(&executor);
            let held = Arc::clone(&held);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                executor
                    .run_exclusive("module init", Duration::from_secs(5), || {
                        held.wait();
                        done.wait();
                        Ok(())
                    })
                    .unwrap();
            })
        };

        held.wait();
        let err = executor
            .run_exclusive("module init", Duration::from_millis(30), || Ok(()))
            .unwrap_err();
        done.wait();
        holder.join().unwrap();

        assert!(matches!(err, Error::LockTimeout { ref name, .. } if name == "module init"));
    }

    #[test]
    fn test_lock_file_stem() {
        assert!(lock_file_stem("profile-web/base").starts_with("profile-web_base-"));
        assert_eq!(lock_file_stem("a b"), lock_file_stem("a b"));

        let stems: HashSet<String> = ["a b", "a/b", "a_b"].iter().map(|n| lock_file_stem(n)).collect();
        assert_eq!(stems.len(), 3);
    }
}
