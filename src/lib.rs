//! Game Boy-style emulator core
//!
//! This crate provides a platform-agnostic emulator core with a stable C ABI.
//! No OS APIs are used - all I/O is done through byte buffers.
//!
//! # Architecture
//!
//! The emulator is organized into several modules:
//! - `memory`: Work RAM and High RAM
//! - `cartridge`: MBC1 cartridge controller (ROM/RAM banking)
//! - `ppu`: Pixel pipeline (background/window/sprite rendering, STAT/LYC)
//! - `peripherals`: Timer and joypad
//! - `bus`: Address decoding and memory access routing
//! - `cpu`: Sharp SM83 CPU implementation
//! - `emu`: Main emulator orchestrator (the frame driver)
//!
//! # Memory Map
//!
//! | Address Range     | Region                           |
//! |--------------------|-----------------------------------|
//! | 0x0000 - 0x3FFF    | Cartridge ROM, fixed bank         |
//! | 0x4000 - 0x7FFF    | Cartridge ROM, switchable bank     |
//! | 0x8000 - 0x9FFF    | VRAM                              |
//! | 0xA000 - 0xBFFF    | Cartridge RAM                      |
//! | 0xC000 - 0xDFFF    | Work RAM (echoed at 0xE000-0xFDFF) |
//! | 0xFE00 - 0xFE9F    | OAM                                |
//! | 0xFF00 - 0xFF7F    | I/O registers                      |
//! | 0xFF80 - 0xFFFE    | High RAM                           |

pub mod bus;
pub mod cartridge;
pub mod cpu;
mod emu;
pub mod memory;
pub mod peripherals;
pub mod ppu;

#[cfg(feature = "wasm")]
mod wasm;
#[cfg(feature = "wasm")]
pub use wasm::WasmEmu;

use std::ptr;
use std::slice;

pub use emu::{CoreError, Emu, StopReason};

/// Create a new emulator instance.
/// Returns null on allocation failure.
#[no_mangle]
pub extern "C" fn gb_create() -> *mut Emu {
    let emu = Box::new(Emu::new());
    Box::into_raw(emu)
}

/// Destroy an emulator instance.
/// Safe to call with null pointer.
#[no_mangle]
pub extern "C" fn gb_destroy(emu: *mut Emu) {
    if !emu.is_null() {
        unsafe {
            drop(Box::from_raw(emu));
        }
    }
}

/// Load ROM data into the emulator. `ram_banks` is the number of 8 KiB
/// battery RAM banks the cartridge header declares.
/// Returns 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn gb_load_rom(emu: *mut Emu, data: *const u8, len: usize, ram_banks: i32) -> i32 {
    if emu.is_null() || data.is_null() {
        return -1;
    }

    let emu = unsafe { &mut *emu };
    let rom_data = unsafe { slice::from_raw_parts(data, len) };

    match emu.load_rom(rom_data, ram_banks) {
        Ok(()) => 0,
        Err(code) => code,
    }
}

/// Supplies an optional boot ROM image, shadowing the cartridge at
/// 0x0000-0x00FF until the game disables it. Safe to call with a null
/// emulator pointer (no-op).
#[no_mangle]
pub extern "C" fn gb_load_boot_rom(emu: *mut Emu, data: *const u8, len: usize) {
    if emu.is_null() || data.is_null() {
        return;
    }

    let emu = unsafe { &mut *emu };
    let boot_data = unsafe { slice::from_raw_parts(data, len) };
    emu.load_boot_rom(boot_data);
}

/// Reset the emulator to initial state.
#[no_mangle]
pub extern "C" fn gb_reset(emu: *mut Emu) {
    if emu.is_null() {
        return;
    }

    let emu = unsafe { &mut *emu };
    emu.reset();
}

/// Run the emulator for the specified number of cycles.
/// Returns the number of cycles actually executed.
#[no_mangle]
pub extern "C" fn gb_run_cycles(emu: *mut Emu, cycles: i32) -> i32 {
    if emu.is_null() || cycles <= 0 {
        return 0;
    }

    let emu = unsafe { &mut *emu };
    emu.run_cycles(cycles as u32) as i32
}

/// Runs exactly one 70224-clock frame. Returns the clocks actually
/// executed, which may be less than a full frame if execution stopped early.
#[no_mangle]
pub extern "C" fn gb_run_frame(emu: *mut Emu) -> i32 {
    if emu.is_null() {
        return 0;
    }

    let emu = unsafe { &mut *emu };
    emu.run_frame() as i32
}

/// Get a pointer to the framebuffer.
/// The framebuffer is ARGB8888 format, owned by the emulator.
/// Writes width and height to the provided pointers if non-null.
/// Returns null if emulator pointer is null.
#[no_mangle]
pub extern "C" fn gb_framebuffer(emu: *const Emu, w: *mut i32, h: *mut i32) -> *const u32 {
    if emu.is_null() {
        return ptr::null();
    }

    let emu = unsafe { &*emu };
    let (width, height) = emu.framebuffer_size();

    if !w.is_null() {
        unsafe { *w = width as i32 };
    }
    if !h.is_null() {
        unsafe { *h = height as i32 };
    }

    emu.framebuffer_ptr()
}

/// Set the full 8-bit key-state bitmask (see `peripherals::joypad::keys`).
#[no_mangle]
pub extern "C" fn gb_set_keys(emu: *mut Emu, new_state: u8) {
    if emu.is_null() {
        return;
    }

    let emu = unsafe { &mut *emu };
    emu.set_keys(new_state);
}

/// Last stop reason as an opaque code: 0 = completed the cycle budget,
/// 1 = halted, 2 = hit an undefined opcode (see `gb_last_fault_opcode`).
#[no_mangle]
pub extern "C" fn gb_last_stop_reason(emu: *const Emu) -> i32 {
    if emu.is_null() {
        return 0;
    }

    let emu = unsafe { &*emu };
    match emu.last_stop_reason() {
        StopReason::CyclesComplete => 0,
        StopReason::Halted => 1,
        StopReason::UnimplementedOpcode(_) => 2,
    }
}

/// The undefined opcode that last faulted execution, or -1 if the last stop
/// was not a fault.
#[no_mangle]
pub extern "C" fn gb_last_fault_opcode(emu: *const Emu) -> i32 {
    if emu.is_null() {
        return -1;
    }

    let emu = unsafe { &*emu };
    match emu.last_stop_reason() {
        StopReason::UnimplementedOpcode(op) => op as i32,
        _ => -1,
    }
}

/// Get the size needed for a save state buffer.
#[no_mangle]
pub extern "C" fn gb_save_state_size(emu: *const Emu) -> usize {
    if emu.is_null() {
        return 0;
    }

    let emu = unsafe { &*emu };
    emu.save_state_size()
}

/// Save emulator state to a buffer.
/// Returns bytes written on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn gb_save_state(emu: *const Emu, out: *mut u8, cap: usize) -> i32 {
    if emu.is_null() || out.is_null() {
        return -1;
    }

    let emu = unsafe { &*emu };
    let buffer = unsafe { slice::from_raw_parts_mut(out, cap) };

    match emu.save_state(buffer) {
        Ok(size) => size as i32,
        Err(code) => code,
    }
}

/// Load emulator state from a buffer.
/// Returns 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn gb_load_state(emu: *mut Emu, data: *const u8, len: usize) -> i32 {
    if emu.is_null() || data.is_null() {
        return -1;
    }

    let emu = unsafe { &mut *emu };
    let buffer = unsafe { slice::from_raw_parts(data, len) };

    match emu.load_state(buffer) {
        Ok(()) => 0,
        Err(code) => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_destroy() {
        let emu = gb_create();
        assert!(!emu.is_null());
        gb_destroy(emu);
    }

    #[test]
    fn test_framebuffer() {
        let emu = gb_create();
        let mut w: i32 = 0;
        let mut h: i32 = 0;
        let fb = gb_framebuffer(emu, &mut w, &mut h);

        assert!(!fb.is_null());
        assert_eq!(w, 160);
        assert_eq!(h, 144);

        gb_destroy(emu);
    }

    #[test]
    fn test_run_cycles_without_rom_executes_nothing() {
        let emu = gb_create();
        let executed = gb_run_cycles(emu, 1000);
        assert_eq!(executed, 0);
        gb_destroy(emu);
    }

    #[test]
    fn test_load_rom_and_run() {
        let emu = gb_create();
        let rom = vec![0u8; 0x8000]; // all NOPs
        let rc = gb_load_rom(emu, rom.as_ptr(), rom.len(), 0);
        assert_eq!(rc, 0);
        let executed = gb_run_cycles(emu, 1000);
        assert!(executed > 0);
        gb_destroy(emu);
    }

    #[test]
    fn test_set_keys_with_null_is_noop() {
        gb_set_keys(ptr::null_mut(), 0xFF);
    }
}
