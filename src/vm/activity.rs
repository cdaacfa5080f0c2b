/// The interpreter activity on whose behalf a memory operation runs.
///
/// Several activities may share one memory, but only the activity holding kernel access runs
/// interpreter code. When an activity must wait for one of the memory's locks it gives up
/// kernel access for the duration of the wait, so the holder of the lock can make progress.
pub trait Activity {
    /// Called before blocking on a lock.
    fn release_kernel(&self) {}
    /// Called once the lock has been acquired after blocking.
    fn request_kernel(&self) {}
}

/// An activity with no scheduler to cooperate with. Suitable for single-threaded use.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullActivity;

impl Activity for NullActivity {}
