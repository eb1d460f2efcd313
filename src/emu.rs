//! Emulator orchestrator: the frame driver.
//!
//! Coordinates the CPU and bus, stepping the CPU and bus clock-in-lockstep
//! and bounding each step by the timer's next scheduled event so a
//! disabled timer never forces sub-instruction granularity.

use crate::bus::Bus;
use crate::cartridge::Cartridge;
use crate::cpu::Cpu;
use std::error::Error;
use std::fmt;

pub const SCREEN_WIDTH: usize = crate::ppu::SCREEN_WIDTH;
pub const SCREEN_HEIGHT: usize = crate::ppu::SCREEN_HEIGHT;

/// Fatal core error: execution cannot continue past an undefined opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    UndefinedOpcode(u8),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::UndefinedOpcode(op) => write!(f, "undefined opcode {:#04X}", op),
        }
    }
}

impl Error for CoreError {}

/// Number of entries in the PC/opcode history ring buffer.
const HISTORY_SIZE: usize = 64;

#[derive(Clone, Copy, Default)]
struct HistoryEntry {
    pc: u16,
    opcode: u8,
}

/// Execution history ring buffer for crash diagnostics.
struct ExecutionHistory {
    entries: [HistoryEntry; HISTORY_SIZE],
    write_idx: usize,
    count: usize,
}

impl ExecutionHistory {
    fn new() -> Self {
        Self {
            entries: [HistoryEntry::default(); HISTORY_SIZE],
            write_idx: 0,
            count: 0,
        }
    }

    fn record(&mut self, pc: u16, opcode: u8) {
        self.entries[self.write_idx] = HistoryEntry { pc, opcode };
        self.write_idx = (self.write_idx + 1) % HISTORY_SIZE;
        if self.count < HISTORY_SIZE {
            self.count += 1;
        }
    }

    fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        let start = if self.count < HISTORY_SIZE {
            0
        } else {
            self.write_idx
        };
        (0..self.count).map(move |i| &self.entries[(start + i) % HISTORY_SIZE])
    }

    fn clear(&mut self) {
        self.write_idx = 0;
        self.count = 0;
    }
}

/// Reason the last `run_cycles` call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Completed the requested cycle budget.
    CyclesComplete,
    /// CPU entered the Halted state.
    Halted,
    /// Hit one of the eleven undefined opcodes; execution cannot continue.
    UnimplementedOpcode(u8),
}

/// Main emulator state.
pub struct Emu {
    cpu: Cpu,
    bus: Bus,
    rom_loaded: bool,
    history: ExecutionHistory,
    last_stop: StopReason,
    total_cycles: u64,
}

impl Emu {
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            bus: Bus::new(),
            rom_loaded: false,
            history: ExecutionHistory::new(),
            last_stop: StopReason::CyclesComplete,
            total_cycles: 0,
        }
    }

    /// Loads a cartridge image. `ram_banks` is the number of 8 KiB battery
    /// RAM banks the header declares; negative or a non-16KiB-multiple ROM
    /// size is a construction-time error.
    pub fn load_rom(&mut self, data: &[u8], ram_banks: i32) -> Result<(), i32> {
        let cartridge = Cartridge::new(data.to_vec(), ram_banks).map_err(|_| -3)?;
        self.bus.load_cartridge(cartridge);
        self.rom_loaded = true;
        self.reset();
        Ok(())
    }

    /// Supplies an optional boot ROM image, shadowing the cartridge at
    /// 0x0000-0x00FF until the game writes a nonzero byte to 0xFF50.
    pub fn load_boot_rom(&mut self, data: &[u8]) {
        self.bus.load_boot_rom(data.to_vec());
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
        self.history.clear();
        self.last_stop = StopReason::CyclesComplete;
        self.total_cycles = 0;
    }

    /// Runs for up to `cycles` system clocks, stopping early on Halt or an
    /// undefined opcode. Returns the number of clocks actually executed.
    pub fn run_cycles(&mut self, cycles: u32) -> u32 {
        if !self.rom_loaded {
            return 0;
        }

        let mut remaining = cycles as i64;
        let start = self.total_cycles;

        while remaining > 0 {
            let pc = self.cpu.pc;
            let opcode = self.bus.read(pc);

            let used = self.cpu.step(&mut self.bus);
            self.history.record(pc, opcode);

            let fired = self.bus.tick(used);
            self.cpu.if_reg |= fired;

            remaining -= used as i64;
            self.total_cycles += used as u64;

            if let Some(bad) = self.cpu.fault {
                self.last_stop = StopReason::UnimplementedOpcode(bad);
                return (self.total_cycles - start) as u32;
            }

            if self.cpu.state == crate::cpu::CpuState::Halted {
                self.last_stop = StopReason::Halted;
                return (self.total_cycles - start) as u32;
            }
        }

        self.last_stop = StopReason::CyclesComplete;
        (self.total_cycles - start) as u32
    }

    /// Runs exactly one 70224-clock frame, returning the clocks used (may
    /// be less if execution stopped early).
    pub fn run_frame(&mut self) -> u32 {
        const CLOCKS_PER_FRAME: u32 = 70224;
        self.run_cycles(CLOCKS_PER_FRAME)
    }

    pub fn framebuffer_size(&self) -> (usize, usize) {
        (SCREEN_WIDTH, SCREEN_HEIGHT)
    }

    pub fn framebuffer_ptr(&self) -> *const u32 {
        self.bus.ppu.framebuffer.as_ptr()
    }

    /// Updates the full 8-bit key-state bitmask (see
    /// `peripherals::joypad::keys`).
    pub fn set_keys(&mut self, new_state: u8) {
        let fired = self.bus.set_keys(new_state);
        self.cpu.if_reg |= fired;
    }

    pub fn last_stop_reason(&self) -> StopReason {
        self.last_stop
    }

    /// `Some` when the last run stopped on the fatal undefined-opcode
    /// condition; `None` for every other stop reason.
    pub fn last_core_error(&self) -> Option<CoreError> {
        match self.last_stop {
            StopReason::UnimplementedOpcode(op) => Some(CoreError::UndefinedOpcode(op)),
            _ => None,
        }
    }

    pub fn pc(&self) -> u16 {
        self.cpu.pc
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn peek_byte(&self, addr: u16) -> u8 {
        self.bus.read(addr)
    }

    /// Dumps the last executed instructions for crash diagnostics.
    pub fn dump_history(&self) -> String {
        let mut out = String::new();
        out.push_str("Execution history (oldest to newest):\n");
        for entry in self.history.iter() {
            out.push_str(&format!(
                "  PC={:04X}  {:02X}  {}\n",
                entry.pc,
                entry.opcode,
                Self::mnemonic(entry.opcode)
            ));
        }
        out.push_str(&format!("\nCurrent PC: {:04X}\n", self.cpu.pc));
        out.push_str(&format!("Total cycles: {}\n", self.total_cycles));
        out.push_str(&format!("Stop reason: {:?}\n", self.last_stop));
        out
    }

    fn mnemonic(opcode: u8) -> &'static str {
        match opcode {
            0x00 => "NOP",
            0x01 => "LD BC,nn",
            0x02 => "LD (BC),A",
            0x03 => "INC BC",
            0x04 => "INC B",
            0x05 => "DEC B",
            0x06 => "LD B,n",
            0x07 => "RLCA",
            0x08 => "LD (nn),SP",
            0x09 => "ADD HL,BC",
            0x0A => "LD A,(BC)",
            0x0E => "LD C,n",
            0x10 => "STOP",
            0x18 => "JR d",
            0x20 => "JR NZ,d",
            0x21 => "LD HL,nn",
            0x27 => "DAA",
            0x31 => "LD SP,nn",
            0x32 => "LD (HL-),A",
            0x76 => "HALT",
            0xC0 => "RET NZ",
            0xC1 => "POP BC",
            0xC2 => "JP NZ,nn",
            0xC3 => "JP nn",
            0xC4 => "CALL NZ,nn",
            0xC5 => "PUSH BC",
            0xC9 => "RET",
            0xCA => "JP Z,nn",
            0xCB => "CB prefix",
            0xCD => "CALL nn",
            0xD9 => "RETI",
            0xE0 => "LDH (a8),A",
            0xE9 => "JP (HL)",
            0xEA => "LD (nn),A",
            0xF0 => "LDH A,(a8)",
            0xF3 => "DI",
            0xFA => "LD A,(nn)",
            0xFB => "EI",
            0xFE => "CP n",
            0xFF => "RST 38H",
            _ => "...",
        }
    }

    /// Register dump for debugging.
    pub fn dump_registers(&self) -> String {
        format!(
            "AF={:02X}{:02X} BC={:02X}{:02X} DE={:02X}{:02X} HL={:02X}{:02X}\n\
             SP={:04X} PC={:04X} IME={} IE={:02X} IF={:02X}",
            self.cpu.a,
            self.cpu.f,
            self.cpu.b,
            self.cpu.c,
            self.cpu.d,
            self.cpu.e,
            self.cpu.h,
            self.cpu.l,
            self.cpu.sp,
            self.cpu.pc,
            self.cpu.ime,
            self.cpu.ie_reg,
            self.cpu.if_reg,
        )
    }

    // ========== Save state ==========
    //
    // Fixed-size snapshot, following the CPU's own to_bytes/from_bytes
    // convention: CPU, fault flag, PPU registers + VRAM + OAM, timer,
    // joypad, WRAM, HRAM, boot-ROM-disable latch, total cycle count, then a
    // variable-length cartridge bank-register block and RAM tail.

    const FIXED_SIZE: usize = Cpu::SNAPSHOT_SIZE // CPU
        + 1 // fault flag
        + 12 // PPU registers
        + 0x2000 // VRAM
        + 0xA0 // OAM
        + crate::peripherals::timer::Timer::SNAPSHOT_SIZE
        + crate::peripherals::joypad::Joypad::SNAPSHOT_SIZE
        + 0x2000 // WRAM
        + 0x7F // HRAM
        + 1 // boot ROM enabled latch
        + 8 // total_cycles
        + Cartridge::BANK_STATE_SIZE;

    pub fn save_state_size(&self) -> usize {
        Self::FIXED_SIZE + self.bus.cartridge.as_ref().map_or(0, |c| c.ram_data().len())
    }

    pub fn save_state(&self, buffer: &mut [u8]) -> Result<usize, i32> {
        let needed = self.save_state_size();
        if buffer.len() < needed {
            return Err(-105);
        }

        let mut pos = 0;
        macro_rules! put {
            ($bytes:expr) => {{
                let bytes = $bytes;
                buffer[pos..pos + bytes.len()].copy_from_slice(&bytes);
                pos += bytes.len();
            }};
        }

        put!(self.cpu.to_bytes());
        buffer[pos] = self.cpu.fault.is_some() as u8;
        pos += 1;

        buffer[pos..pos + 11].copy_from_slice(&[
            self.bus.ppu.lcdc,
            self.bus.ppu.stat,
            self.bus.ppu.scy,
            self.bus.ppu.scx,
            self.bus.ppu.ly,
            self.bus.ppu.lyc,
            self.bus.ppu.bgp,
            self.bus.ppu.obp0,
            self.bus.ppu.obp1,
            self.bus.ppu.wy,
            self.bus.ppu.wx,
        ]);
        pos += 11;
        buffer[pos] = 0; // reserved, keeps the registers block at a round 12 bytes
        pos += 1;

        put!(self.bus.ppu.vram_data().to_vec());
        put!(self.bus.ppu.oam_data().to_vec());
        put!(self.bus.peripherals.timer.to_bytes());
        put!(self.bus.peripherals.joypad.to_bytes());
        put!(self.bus.wram_data().to_vec());
        put!(self.bus.hram_data().to_vec());

        buffer[pos] = self.bus.boot_rom_enabled() as u8;
        pos += 1;

        put!(self.total_cycles.to_le_bytes());

        if let Some(cart) = self.bus.cartridge.as_ref() {
            put!(cart.bank_state());
            put!(cart.ram_data().to_vec());
        }

        Ok(pos)
    }

    pub fn load_state(&mut self, buffer: &[u8]) -> Result<(), i32> {
        if buffer.len() < Self::FIXED_SIZE {
            return Err(-105);
        }

        let mut pos = 0;
        self.cpu.from_bytes(&buffer[pos..pos + Cpu::SNAPSHOT_SIZE])?;
        pos += Cpu::SNAPSHOT_SIZE;

        self.cpu.fault = if buffer[pos] != 0 { Some(0) } else { None };
        pos += 1;

        self.bus.ppu.lcdc = buffer[pos];
        self.bus.ppu.stat = buffer[pos + 1];
        self.bus.ppu.scy = buffer[pos + 2];
        self.bus.ppu.scx = buffer[pos + 3];
        self.bus.ppu.ly = buffer[pos + 4];
        self.bus.ppu.lyc = buffer[pos + 5];
        self.bus.ppu.bgp = buffer[pos + 6];
        self.bus.ppu.obp0 = buffer[pos + 7];
        self.bus.ppu.obp1 = buffer[pos + 8];
        self.bus.ppu.wy = buffer[pos + 9];
        self.bus.ppu.wx = buffer[pos + 10];
        pos += 12;

        self.bus.ppu.load_vram_data(&buffer[pos..pos + 0x2000]);
        pos += 0x2000;
        self.bus.ppu.load_oam_data(&buffer[pos..pos + 0xA0]);
        pos += 0xA0;

        self.bus
            .peripherals
            .timer
            .from_bytes(&buffer[pos..pos + crate::peripherals::timer::Timer::SNAPSHOT_SIZE]);
        pos += crate::peripherals::timer::Timer::SNAPSHOT_SIZE;

        self.bus
            .peripherals
            .joypad
            .from_bytes(&buffer[pos..pos + crate::peripherals::joypad::Joypad::SNAPSHOT_SIZE]);
        pos += crate::peripherals::joypad::Joypad::SNAPSHOT_SIZE;

        self.bus.load_wram_data(&buffer[pos..pos + 0x2000]);
        pos += 0x2000;
        self.bus.load_hram_data(&buffer[pos..pos + 0x7F]);
        pos += 0x7F;

        self.bus.set_boot_rom_enabled(buffer[pos] != 0);
        pos += 1;

        self.total_cycles = u64::from_le_bytes(buffer[pos..pos + 8].try_into().unwrap());
        pos += 8;

        if let Some(cart) = self.bus.cartridge.as_mut() {
            if buffer.len() >= pos + Cartridge::BANK_STATE_SIZE {
                cart.load_bank_state(&buffer[pos..pos + Cartridge::BANK_STATE_SIZE]);
                pos += Cartridge::BANK_STATE_SIZE;
                let ram_len = cart.ram_data().len();
                if buffer.len() >= pos + ram_len {
                    cart.load_ram_data(&buffer[pos..pos + ram_len]);
                }
            }
        }

        Ok(())
    }
}

impl Default for Emu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with(bytes: &[(u16, u8)]) -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        for &(addr, val) in bytes {
            rom[addr as usize] = val;
        }
        rom
    }

    #[test]
    fn test_new_emu_has_blank_white_framebuffer() {
        let emu = Emu::new();
        assert_eq!(emu.framebuffer_size(), (160, 144));
    }

    #[test]
    fn test_load_rom_resets_and_marks_loaded() {
        let mut emu = Emu::new();
        let rom = rom_with(&[(0, 0x00), (1, 0x76)]); // NOP, HALT
        assert!(emu.load_rom(&rom, 0).is_ok());
        assert_eq!(emu.pc(), 0);
    }

    #[test]
    fn test_run_without_rom_executes_nothing() {
        let mut emu = Emu::new();
        assert_eq!(emu.run_cycles(1000), 0);
    }

    #[test]
    fn test_run_until_halt() {
        let mut emu = Emu::new();
        let rom = rom_with(&[(0, 0x00), (1, 0x00), (2, 0x76)]); // NOP, NOP, HALT
        emu.load_rom(&rom, 0).unwrap();
        let used = emu.run_cycles(1000);
        assert!(used > 0);
        assert_eq!(emu.last_stop_reason(), StopReason::Halted);
    }

    #[test]
    fn test_run_stops_on_undefined_opcode() {
        let mut emu = Emu::new();
        let rom = rom_with(&[(0, 0xD3)]);
        emu.load_rom(&rom, 0).unwrap();
        emu.run_cycles(100);
        assert_eq!(emu.last_stop_reason(), StopReason::UnimplementedOpcode(0xD3));
    }

    #[test]
    fn test_history_records_mnemonics() {
        let mut emu = Emu::new();
        let rom = rom_with(&[(0, 0x00), (1, 0x00), (2, 0x76)]);
        emu.load_rom(&rom, 0).unwrap();
        emu.run_cycles(100);
        let history = emu.dump_history();
        assert!(history.contains("NOP"));
        assert!(history.contains("HALT"));
    }

    #[test]
    fn test_save_load_state_round_trip() {
        let mut emu = Emu::new();
        let rom = rom_with(&[(0, 0x3E), (1, 0x42), (2, 0x76)]); // LD A,0x42; HALT
        emu.load_rom(&rom, 0).unwrap();
        emu.run_cycles(100);
        emu.bus.write(0xC000, 0x99);
        emu.bus.write(0xFF80, 0x77);
        emu.bus.write(0xFF06, 0x55); // TMA
        emu.set_keys(crate::peripherals::joypad::keys::START);

        let size = emu.save_state_size();
        let mut buf = vec![0u8; size];
        emu.save_state(&mut buf).unwrap();

        let mut restored = Emu::new();
        restored.load_rom(&rom, 0).unwrap();
        restored.load_state(&buf).unwrap();
        assert_eq!(restored.pc(), emu.pc());
        assert_eq!(restored.total_cycles(), emu.total_cycles());
        assert_eq!(restored.peek_byte(0xC000), 0x99);
        assert_eq!(restored.peek_byte(0xFF80), 0x77);
        assert_eq!(restored.peek_byte(0xFF06), 0x55);
    }

    #[test]
    fn test_set_keys_can_raise_joypad_interrupt() {
        let mut emu = Emu::new();
        let rom = rom_with(&[(0, 0x00)]);
        emu.load_rom(&rom, 0).unwrap();
        emu.set_keys(crate::peripherals::joypad::keys::A);
    }
}
