//! Error filters: reclassify error-stream text as ordinary output.

/// Decides which error-stream text is actually benign.
///
/// Fragments for which [`ErrorFilter::filter`] returns `true` are delivered
/// as data values as soon as they arrive and never reach the error buffer.
/// The remaining fragments are concatenated once both channels have closed;
/// if [`ErrorFilter::final_filter`] accepts that text it is delivered as the
/// last data value and the run completes successfully.
pub trait ErrorFilter: Send + Sync {
    /// `true` if this single error fragment is benign output.
    fn filter(&self, fragment: &str) -> bool;

    /// `true` if the fully assembled error text is benign output.
    fn final_filter(&self, assembled: &str) -> bool;
}

/// An [`ErrorFilter`] built from two closures.
pub struct FnErrorFilter<F, G> {
    filter: F,
    final_filter: G,
}

impl<F, G> FnErrorFilter<F, G>
where
    F: Fn(&str) -> bool + Send + Sync,
    G: Fn(&str) -> bool + Send + Sync,
{
    /// Creates a filter from a per-fragment and a final predicate.
    pub const fn new(filter: F, final_filter: G) -> Self {
        Self {
            filter,
            final_filter,
        }
    }
}

impl<F, G> ErrorFilter for FnErrorFilter<F, G>
where
    F: Fn(&str) -> bool + Send + Sync,
    G: Fn(&str) -> bool + Send + Sync,
{
    fn filter(&self, fragment: &str) -> bool {
        (self.filter)(fragment)
    }

    fn final_filter(&self, assembled: &str) -> bool {
        (self.final_filter)(assembled)
    }
}

impl<F, G> std::fmt::Debug for FnErrorFilter<F, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnErrorFilter").finish_non_exhaustive()
    }
}
