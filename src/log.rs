//! Internal logging shims.
//!
//! With the `tracing` feature enabled these forward to the matching
//! `tracing` macros; without it they compile to nothing (arguments are still
//! type-checked so call sites do not rot).

#[cfg(feature = "tracing")]
macro_rules! flow_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! flow_debug {
    ($($arg:tt)*) => {
        if false {
            let _ = format_args!($($arg)*);
        }
    };
}

#[cfg(feature = "tracing")]
macro_rules! flow_trace {
    ($($arg:tt)*) => { tracing::trace!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! flow_trace {
    ($($arg:tt)*) => {
        if false {
            let _ = format_args!($($arg)*);
        }
    };
}

#[cfg(feature = "tracing")]
macro_rules! flow_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! flow_warn {
    ($($arg:tt)*) => {
        if false {
            let _ = format_args!($($arg)*);
        }
    };
}

pub(crate) use {flow_debug, flow_trace, flow_warn};
