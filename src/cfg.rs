// Emits a trace event with the current thread attached as a field. Compiled out
// unless the `tracing` feature is enabled.
macro_rules! trace {
    ($($tt:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            tracing::trace!(thread = ?std::thread::current().id(), $($tt)*)
        }
    };
}

pub(crate) use trace;
