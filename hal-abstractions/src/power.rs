//! Uptime and sleep control

/// Monotonic time since this boot (each deep-sleep wake is a boot)
pub trait Uptime {
    fn now_ms(&self) -> u64;
}

/// Terminal power-down action for a wake
///
/// Arms the wakeup timer and powers down. Everything outside the
/// sleep-retained region is lost; execution restarts from reset.
pub trait DeepSleep {
    fn sleep_for(self, seconds: u32) -> !;
}
