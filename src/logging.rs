//! Logging facade.
//!
//! Every log line in the crate goes through the macros below so the backend
//! can be swapped at build time. The `log` and `tracing` features select the
//! backend and are **mutually exclusive**.
//!
//! | Feature    | Backend         | Default |
//! |------------|-----------------|---------|
//! | `log`      | `log` crate     | yes     |
//! | `tracing`  | `tracing` crate | no      |
//!
//! Conventions used throughout the crate:
//!
//! - `info_log!`: widget mounted/unmounted, credentials captured.
//! - `debug_log!`: evaluate decisions, stale results discarded.
//! - `trace_log!`: polling ticks, cache hits.
//! - `warn_log!`: retries scheduled, orphaned DOM replaced.
//! - `error_log!`: a user action failed.
//!
//! ```ignore
//! use convo_widgets::{debug_log, warn_log};
//!
//! debug_log!("evaluate: {} -> {:?}", kind, outcome);
//! warn_log!("anchor `{}` not found, retry {} of {}", selector, attempt, max);
//! ```

/// Emit a **trace**-level log message.
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::trace!($($arg)*);
        #[cfg(feature = "log")]
        ::log::trace!($($arg)*);
    };
}

/// Emit a **debug**-level log message.
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::debug!($($arg)*);
        #[cfg(feature = "log")]
        ::log::debug!($($arg)*);
    };
}

/// Emit an **info**-level log message.
#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::info!($($arg)*);
        #[cfg(feature = "log")]
        ::log::info!($($arg)*);
    };
}

/// Emit a **warn**-level log message.
#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::warn!($($arg)*);
        #[cfg(feature = "log")]
        ::log::warn!($($arg)*);
    };
}

/// Emit an **error**-level log message.
#[macro_export]
macro_rules! error_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::error!($($arg)*);
        #[cfg(feature = "log")]
        ::log::error!($($arg)*);
    };
}
