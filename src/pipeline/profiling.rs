//! Timing hooks
//!
//! The frame driver brackets each pass with [`ProfilingContext::begin`] and
//! [`ProfilingContext::end`]. What is measured, and how, belongs to the
//! implementation.

/// Receiver of pass timing brackets
pub trait ProfilingContext {
    fn begin(&mut self, label: &'static str);

    fn end(&mut self, label: &'static str);
}

/// [`ProfilingContext`] that ignores every bracket
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProfiling;

impl ProfilingContext for NoopProfiling {
    fn begin(&mut self, _label: &'static str) {}

    fn end(&mut self, _label: &'static str) {}
}

