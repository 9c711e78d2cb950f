//! Fatal internal-invariant checks.
//!
//! A failed check means the engine itself reached an impossible state (for
//! example a shadow buffer smaller than the redzone it must describe). The
//! process is terminated; there is no recovery path.

use std::fmt;
use std::io::Write;

/// The condition text and source location of a failed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckFailure {
    pub condition: &'static str,
    pub file: &'static str,
    pub line: u32,
}

impl CheckFailure {
    /// Report this failure and abort.
    pub fn raise(self) -> ! {
        check_failed(self.condition, self.file, self.line)
    }
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shadowsan CHECK failed: {}:{} \"{}\"",
            self.file, self.line, self.condition
        )
    }
}

/// Write the failed condition to stderr and abort the process.
#[cold]
#[inline(never)]
pub fn check_failed(condition: &str, file: &str, line: u32) -> ! {
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(
        stderr,
        "shadowsan CHECK failed: {file}:{line} \"{condition}\""
    );
    let _ = stderr.flush();
    std::process::abort()
}

/// Abort through [`check_failed`] unless `cond` holds.
#[macro_export]
macro_rules! shadow_check {
    ($cond:expr $(,)?) => {
        if !($cond) {
            $crate::check::check_failed(stringify!($cond), file!(), line!());
        }
    };
}

/// Evaluate `cond` into a `Result<(), CheckFailure>` without aborting.
#[macro_export]
macro_rules! shadow_ensure {
    ($cond:expr $(,)?) => {
        if $cond {
            Ok(())
        } else {
            Err($crate::check::CheckFailure {
                condition: stringify!($cond),
                file: file!(),
                line: line!(),
            })
        }
    };
}
