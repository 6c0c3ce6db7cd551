//! Backup SRAM placement of the retained cycle store
//!
//! This module is the **ONLY** place in the codebase where backup SRAM
//! (`.bkpsram`) section attributes are used.
//!
//! # Backup SRAM (STM32F405RG)
//!
//! - **Size**: 4 KB (0x4002_4000 - 0x4002_4FFF)
//! - **Retention**: kept through standby while VBAT (or VDD) is present,
//!   provided the backup regulator is on
//! - **Access**: only after the backup domain write protection is lifted
//!
//! The `.bkpsram` output section is `NOLOAD` (see `memory.x`): the runtime
//! neither zeroes nor initialises it, so after a power-on it holds garbage.
//! The cell is checked through its magic word before any reference to it
//! is formed.
//!
//! ```text
//! Backup SRAM (4KB):
//! └─ RetainedCell: magic (4 B) + CycleStore (~1 KB)
//! ```

#![allow(unsafe_code)] // Linker placement and raw access to uninitialised memory

use core::mem::MaybeUninit;
use core::ptr::addr_of_mut;

use batch_node_core::{BootKind, CycleStore, RetainedCell, WakeKind};
use defmt::{info, warn};
use embassy_stm32::pac;

const BKPSRAM_SIZE: usize = 4 * 1024;

const _: () = assert!(core::mem::size_of::<RetainedCell>() <= BKPSRAM_SIZE);

#[link_section = ".bkpsram"]
static mut RETAINED: MaybeUninit<RetainedCell> = MaybeUninit::uninit();

/// Power the backup SRAM and lift the backup domain write protection
pub fn enable_backup_sram() {
    pac::RCC.ahb1enr().modify(|w| w.set_bkpsramen(true));
    pac::PWR.cr1().modify(|w| w.set_dbp(true));
    pac::PWR.csr1().modify(|w| w.set_bre(true));
    while !pac::PWR.csr1().read().brr() {}
}

/// Claim the retained store for this wake
///
/// # Safety
///
/// - Call at most once per boot; the returned reference is exclusive
/// - [`enable_backup_sram`] must have run
pub unsafe fn claim(wake: WakeKind) -> &'static mut CycleStore {
    let slot = &mut *addr_of_mut!(RETAINED);

    // RetainedCell is repr(C) with the magic word first
    let magic = core::ptr::read_volatile(slot.as_ptr().cast::<u32>());
    if !RetainedCell::is_intact(magic) {
        slot.write(RetainedCell::new());
    }
    let cell = slot.assume_init_mut();

    let (store, boot) = cell.claim(wake);
    match boot {
        BootKind::Warm => info!(
            "Retained store: cycle {}, {} samples, batch {}",
            store.cycle_count(),
            store.sample_count(),
            store.config().batch_size()
        ),
        BootKind::Cold => warn!("Retained store reset to defaults ({:?})", wake),
    }
    store
}
