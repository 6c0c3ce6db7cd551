//! Static buffers for the MQTT/TLS session
//!
//! One session is open at a time, and it may be reopened several times
//! within a wake while the connect deadline runs. Every buffer it needs
//! lives here in main SRAM so the session can be held in the transport
//! with a `'static` lifetime.
//!
//! # Buffer Sizing
//!
//! **TLS read (18 KB)**: a full TLS 1.3 record (16384 bytes) plus the record
//! header, the AES-128-GCM tag and padding slack. The broker decides how
//! large its records are, so this cannot shrink.
//!
//! **TLS write (16 KB)**: one TLS 1.3 record. The largest outgoing record is
//! the batch publish (`PAYLOAD_CAPACITY` plus MQTT framing).
//!
//! **TCP (4 KB each way)**, **MQTT (4 KB)**: the MQTT buffer receives
//! incoming packets, the largest being a shadow `get/accepted` document.
//!
//! # Safety
//!
//! Each accessor hands out a fresh `&'static mut` to the same memory. The
//! previous session must be dropped before the buffers are taken again.

#![allow(unsafe_code)] // static mut session buffers

use core::mem::MaybeUninit;
use core::ptr::addr_of_mut;

use rust_mqtt::buffer::BumpBuffer;

const TLS_READ_BUF_SIZE: usize = 18 * 1024;
const TLS_WRITE_BUF_SIZE: usize = 16 * 1024;
const TCP_BUF_SIZE: usize = 4 * 1024;
const MQTT_BUF_SIZE: usize = 4 * 1024;

static mut TLS_READ_BUF: [u8; TLS_READ_BUF_SIZE] = [0; TLS_READ_BUF_SIZE];
static mut TLS_WRITE_BUF: [u8; TLS_WRITE_BUF_SIZE] = [0; TLS_WRITE_BUF_SIZE];
static mut TCP_RX_BUF: [u8; TCP_BUF_SIZE] = [0; TCP_BUF_SIZE];
static mut TCP_TX_BUF: [u8; TCP_BUF_SIZE] = [0; TCP_BUF_SIZE];
static mut MQTT_BUF: [u8; MQTT_BUF_SIZE] = [0; MQTT_BUF_SIZE];
static mut MQTT_BUMP: MaybeUninit<BumpBuffer<'static>> = MaybeUninit::uninit();

/// Buffers for one session attempt
pub struct SessionBuffers {
    pub tls_read: &'static mut [u8],
    pub tls_write: &'static mut [u8],
    pub tcp_rx: &'static mut [u8],
    pub tcp_tx: &'static mut [u8],
    /// Bump allocator over the MQTT buffer, reset for this session
    pub mqtt: &'static mut BumpBuffer<'static>,
}

/// Take the session buffers
///
/// # Safety
///
/// - No session built from an earlier call may still be alive
/// - Must not be called from more than one context
pub unsafe fn take() -> SessionBuffers {
    let bump = &mut *addr_of_mut!(MQTT_BUMP);
    let mqtt = bump.write(BumpBuffer::new(&mut *addr_of_mut!(MQTT_BUF)));
    SessionBuffers {
        tls_read: &mut *addr_of_mut!(TLS_READ_BUF),
        tls_write: &mut *addr_of_mut!(TLS_WRITE_BUF),
        tcp_rx: &mut *addr_of_mut!(TCP_RX_BUF),
        tcp_tx: &mut *addr_of_mut!(TCP_TX_BUF),
        mqtt,
    }
}
