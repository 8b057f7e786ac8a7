use core::time::Duration;

/// A trait that abstracts over how the allocator waits between attempts.
///
/// This allows the allocator to be generic over real sleeping, cooperative
/// yielding, or a recording fake in tests.
pub trait SleepProvider {
    fn sleep_for(&self, dur: Duration);
}

/// An implementation of [`SleepProvider`] that parks the calling thread.
///
/// This is the default provider.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleep;

impl SleepProvider for ThreadSleep {
    fn sleep_for(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}

/// An implementation of [`SleepProvider`] that yields instead of sleeping.
///
/// This ignores the requested delay and hands the time slice back to the OS
/// scheduler, which keeps retries tight when every contender lives in the
/// same process. Against a remote service, prefer [`ThreadSleep`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadYield;

impl SleepProvider for ThreadYield {
    fn sleep_for(&self, _dur: Duration) {
        std::thread::yield_now();
    }
}

impl<S: SleepProvider + ?Sized> SleepProvider for &S {
    fn sleep_for(&self, dur: Duration) {
        (**self).sleep_for(dur);
    }
}
