//! Replacing a file without leaving it half-removed on Ctrl-C.
//!
//! [`replace_file`] removes the original and renames the new file into its
//! place inside an [`InterruptGuard`]. While the guard is alive SIGINT and
//! SIGTERM are recorded instead of delivered; when it drops, the previous
//! handlers come back and the last recorded signal is raised again.

use std::fs;
use std::io;
use std::path::Path;

use log::debug;
use plan7_core::{Plan7Error, Result};

fn with_path(e: io::Error, path: &Path) -> Plan7Error {
    Plan7Error::Io(io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
}

/// Remove `target`, then rename `replacement` to `target`, with interrupts
/// deferred until both steps are done.
///
/// # Errors
///
/// `Io` if the signal handlers cannot be installed or either filesystem
/// step fails. If the removal fails nothing has changed.
pub fn replace_file(replacement: &Path, target: &Path) -> Result<()> {
    let guard = InterruptGuard::new()?;
    fs::remove_file(target).map_err(|e| with_path(e, target))?;
    fs::rename(replacement, target).map_err(|e| with_path(e, replacement))?;
    if let Some(sig) = guard.pending() {
        debug!("signal {} held until {} was replaced", sig, target.display());
    }
    Ok(())
}

pub use imp::InterruptGuard;

#[cfg(unix)]
mod imp {
    use std::io;
    use std::ptr;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::{Mutex, MutexGuard};

    use plan7_core::{Plan7Error, Result};

    const DEFERRED: [libc::c_int; 2] = [libc::SIGINT, libc::SIGTERM];

    /// Last signal caught while a guard was alive, or 0.
    static PENDING: AtomicI32 = AtomicI32::new(0);

    /// Handler state is process-wide; one guard at a time.
    static ACTIVE: Mutex<()> = Mutex::new(());

    extern "C" fn record(sig: libc::c_int) {
        PENDING.store(sig, Ordering::SeqCst);
    }

    /// Defers SIGINT and SIGTERM for as long as it lives.
    ///
    /// Guards serialize on a process-wide lock, so creating a second guard
    /// on the same thread while one is alive deadlocks.
    pub struct InterruptGuard {
        previous: Vec<(libc::c_int, libc::sigaction)>,
        _active: MutexGuard<'static, ()>,
    }

    impl InterruptGuard {
        /// # Errors
        ///
        /// `Io` if a handler cannot be installed; any already installed are
        /// restored first.
        pub fn new() -> Result<Self> {
            let active = ACTIVE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            PENDING.store(0, Ordering::SeqCst);
            let mut guard = Self {
                previous: Vec::with_capacity(DEFERRED.len()),
                _active: active,
            };
            for sig in DEFERRED {
                // SAFETY: both sigaction structs are fully initialized before
                // use, and `record` only touches an atomic.
                unsafe {
                    let mut action: libc::sigaction = std::mem::zeroed();
                    action.sa_sigaction = record as extern "C" fn(libc::c_int) as libc::sighandler_t;
                    libc::sigemptyset(&mut action.sa_mask);
                    let mut old: libc::sigaction = std::mem::zeroed();
                    if libc::sigaction(sig, &action, &mut old) != 0 {
                        // Dropping `guard` restores what was installed so far.
                        return Err(Plan7Error::Io(io::Error::last_os_error()));
                    }
                    guard.previous.push((sig, old));
                }
            }
            Ok(guard)
        }

        /// The signal caught so far, if any.
        pub fn pending(&self) -> Option<i32> {
            match PENDING.load(Ordering::SeqCst) {
                0 => None,
                sig => Some(sig),
            }
        }
    }

    impl Drop for InterruptGuard {
        fn drop(&mut self) {
            for (sig, old) in self.previous.drain(..).rev() {
                // SAFETY: `old` was filled in by a successful sigaction call.
                unsafe {
                    libc::sigaction(sig, &old, ptr::null_mut());
                }
            }
            let sig = PENDING.swap(0, Ordering::SeqCst);
            if sig != 0 {
                // SAFETY: raising a signal has no memory-safety preconditions.
                unsafe {
                    libc::raise(sig);
                }
            }
        }
    }

}

#[cfg(not(unix))]
mod imp {
    use plan7_core::Result;

    /// No-op on platforms without POSIX signals.
    pub struct InterruptGuard;

    impl InterruptGuard {
        pub fn new() -> Result<Self> {
            Ok(Self)
        }

        pub fn pending(&self) -> Option<i32> {
            None
        }
    }
}
