//! Sleep-retained store wrapper
//!
//! Deep sleep restarts the firmware from reset; only a battery-backed RAM
//! region keeps its contents. That region is not initialised by the
//! runtime, so the cycle store is wrapped with a magic word identifying
//! both "written by this firmware" and the store layout. A store is handed
//! out as-is only when the platform reports a wake from deep sleep *and*
//! the magic matches; anything else is a cold boot and starts from the
//! compiled defaults.
//!
//! The board owns the single static instance and must make sure the cell
//! holds a valid value before calling [`RetainedCell::claim`] (writing
//! [`RetainedCell::new`] over it when the magic does not match).

use crate::store::CycleStore;

/// Magic word: `BA7C` + store layout version
pub const RETENTION_MAGIC: u32 = 0xBA7C_0001;

/// What the platform reports about this boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeKind {
    /// Power-on, brown-out, pin or watchdog reset
    PowerOn,
    /// Timer wakeup out of deep sleep
    FromSleep,
}

/// Whether the retained state survived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootKind {
    /// Store reinitialised to compiled defaults
    Cold,
    /// Store carried over from before the last sleep
    Warm,
}

#[repr(C)]
pub struct RetainedCell {
    magic: u32,
    store: CycleStore,
}

impl RetainedCell {
    /// An unclaimed cell; the first claim always reports a cold boot
    pub const fn new() -> Self {
        Self {
            magic: 0,
            store: CycleStore::new(),
        }
    }

    /// Whether `magic` marks a cell written by this firmware layout
    pub fn is_intact(magic: u32) -> bool {
        magic == RETENTION_MAGIC
    }

    /// Take the store for this wake
    pub fn claim(&mut self, wake: WakeKind) -> (&mut CycleStore, BootKind) {
        let boot = if wake == WakeKind::FromSleep && Self::is_intact(self.magic) {
            BootKind::Warm
        } else {
            self.store = CycleStore::new();
            self.magic = RETENTION_MAGIC;
            BootKind::Cold
        };
        (&mut self.store, boot)
    }
}

impl Default for RetainedCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperatingConfig;
    use crate::sample::SampleSource;

    #[test]
    fn test_first_claim_is_cold() {
        let mut cell = RetainedCell::new();
        let (store, boot) = cell.claim(WakeKind::FromSleep);
        assert_eq!(boot, BootKind::Cold);
        assert_eq!(store.cycle_count(), 0);
    }

    #[test]
    fn test_warm_wake_keeps_state() {
        let mut cell = RetainedCell::new();
        {
            let (store, _) = cell.claim(WakeKind::PowerOn);
            store.apply(OperatingConfig::validate(5, 30).unwrap());
            store.append(SampleSource::Battery, 3.7).unwrap();
            store.complete_cycle();
        }

        let (store, boot) = cell.claim(WakeKind::FromSleep);
        assert_eq!(boot, BootKind::Warm);
        assert_eq!(store.cycle_count(), 1);
        assert_eq!(store.sample_count(), 1);
        assert_eq!(store.config().batch_size(), 5);
    }

    #[test]
    fn test_power_on_resets_state() {
        let mut cell = RetainedCell::new();
        {
            let (store, _) = cell.claim(WakeKind::PowerOn);
            store.append(SampleSource::Battery, 3.7).unwrap();
            store.complete_cycle();
        }

        let (store, boot) = cell.claim(WakeKind::PowerOn);
        assert_eq!(boot, BootKind::Cold);
        assert_eq!(store.cycle_count(), 0);
        assert_eq!(store.sample_count(), 0);
        assert!(store.config().is_default());
    }

    #[test]
    fn test_magic_check() {
        assert!(RetainedCell::is_intact(RETENTION_MAGIC));
        assert!(!RetainedCell::is_intact(0));
        assert!(!RetainedCell::is_intact(0xFFFF_FFFF));
    }
}
