//! Raise-or-warn-and-continue error policy.
//!
//! Every reader and writer that works item by item takes an [`ErrorPolicy`].
//! The default is strict: the first failure ends the call. With
//! `ignore_error` the failing item (line, row, record) is skipped and the call
//! carries on; whole-call failures (bad configuration, empty input, unreadable
//! header) end the call without returning an error. `silent` controls whether
//! a suppressed failure is logged.

use crate::error::IoliteError;
use anyhow::Result;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ErrorPolicy {
    /// Suppress failures and continue past the failing item.
    pub ignore_error: bool,
    /// Do not log suppressed failures.
    pub silent: bool,
}

impl ErrorPolicy {
    /// Every failure is returned to the caller.
    pub const STRICT: Self = Self {
        ignore_error: false,
        silent: false,
    };

    /// Failures are logged with `tracing::warn!` and skipped.
    pub const LENIENT: Self = Self {
        ignore_error: true,
        silent: false,
    };

    /// Failures are skipped without a trace.
    pub const QUIET: Self = Self {
        ignore_error: true,
        silent: true,
    };

    /// Apply the policy to `err`.
    ///
    /// Returns `Err` when the failure must propagate, `Ok(())` when the caller
    /// should skip the item (or stop, for whole-call failures) and continue.
    pub fn handle(&self, err: IoliteError) -> Result<()> {
        if !self.ignore_error {
            return Err(err.into());
        }
        if !self.silent {
            tracing::warn!(kind = ?err.kind, "{}", err.message);
        }
        Ok(())
    }
}
