use once_cell::sync::Lazy;
use std::env;
use std::ffi::{OsStr, OsString};
use std::sync::{Mutex, MutexGuard};

/// Serializes tests that mutate process-wide environment variables (e.g. PATH).
static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub struct EnvLockGuard(#[allow(dead_code)] MutexGuard<'static, ()>);

pub fn lock() -> EnvLockGuard {
    EnvLockGuard(ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner()))
}

/// Sets an environment variable for the lifetime of the guard. Hold [`lock`] while using it.
pub struct EnvVarGuard {
    key: &'static str,
    original: Option<OsString>,
}

impl EnvVarGuard {
    pub fn set(key: &'static str, value: impl AsRef<OsStr>) -> Self {
        let original = env::var_os(key);
        env::set_var(key, value);
        Self { key, original }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        match self.original.take() {
            Some(original) => env::set_var(self.key, original),
            None => env::remove_var(self.key),
        }
    }
}
