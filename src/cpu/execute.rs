//! Opcode dispatch: the primary 256-entry table and the CB-prefixed
//! secondary table.

use super::flags;
use super::Cpu;
use crate::bus::Bus;

impl Cpu {
    /// Top-level dispatch, called once per non-interrupt, non-halted step
    /// with the opcode byte already fetched.
    pub fn dispatch(&mut self, bus: &mut Bus, opcode: u8) -> u32 {
        let x = opcode >> 6;
        let y = (opcode >> 3) & 7;
        let z = opcode & 7;
        let p = y >> 1;
        let q = y & 1;

        match x {
            0 => self.execute_x0(bus, y, z),
            1 => self.execute_x1(bus, y, z),
            2 => self.execute_x2(bus, y, z),
            3 => self.execute_x3(bus, opcode, y, z, p, q),
            _ => unreachable!(),
        }
    }

    /// x=0: 0x00-0x3F.
    fn execute_x0(&mut self, bus: &mut Bus, y: u8, z: u8) -> u32 {
        let p = y >> 1;
        let q = y & 1;
        match z {
            0 => match y {
                0 => 4, // NOP
                1 => {
                    // LD (a16),SP
                    let addr = self.fetch_word(bus);
                    self.mem_write(bus, addr, self.sp as u8);
                    self.mem_write(bus, addr.wrapping_add(1), (self.sp >> 8) as u8);
                    20
                }
                2 => {
                    // STOP
                    let _ = self.fetch_byte(bus); // mandatory padding byte
                    self.enter_stop();
                    4
                }
                3 => {
                    // JR d
                    let d = self.fetch_byte(bus) as i8;
                    self.pc = (self.pc as i16).wrapping_add(d as i16) as u16;
                    12
                }
                4..=7 => {
                    // JR cc,d
                    let d = self.fetch_byte(bus) as i8;
                    if self.check_cc(y - 4) {
                        self.pc = (self.pc as i16).wrapping_add(d as i16) as u16;
                        12
                    } else {
                        8
                    }
                }
                _ => unreachable!(),
            },
            1 => {
                if q == 0 {
                    // LD rp,d16
                    let nn = self.fetch_word(bus);
                    self.set_rp(p, nn);
                    12
                } else {
                    // ADD HL,rp
                    let val = self.get_rp(p);
                    let result = self.alu_add16(val);
                    self.set_hl(result);
                    8
                }
            }
            2 => match (p, q) {
                (0, 0) => {
                    self.mem_write(bus, self.bc(), self.a);
                    8
                }
                (1, 0) => {
                    self.mem_write(bus, self.de(), self.a);
                    8
                }
                (2, 0) => {
                    // LD (HL+),A
                    let addr = self.hl();
                    self.mem_write(bus, addr, self.a);
                    self.set_hl(addr.wrapping_add(1));
                    8
                }
                (3, 0) => {
                    // LD (HL-),A
                    let addr = self.hl();
                    self.mem_write(bus, addr, self.a);
                    self.set_hl(addr.wrapping_sub(1));
                    8
                }
                (0, 1) => {
                    self.a = self.mem_read(bus, self.bc());
                    8
                }
                (1, 1) => {
                    self.a = self.mem_read(bus, self.de());
                    8
                }
                (2, 1) => {
                    // LD A,(HL+)
                    let addr = self.hl();
                    self.a = self.mem_read(bus, addr);
                    self.set_hl(addr.wrapping_add(1));
                    8
                }
                (3, 1) => {
                    // LD A,(HL-)
                    let addr = self.hl();
                    self.a = self.mem_read(bus, addr);
                    self.set_hl(addr.wrapping_sub(1));
                    8
                }
                _ => unreachable!(),
            },
            3 => {
                if q == 0 {
                    let v = self.get_rp(p).wrapping_add(1);
                    self.set_rp(p, v);
                } else {
                    let v = self.get_rp(p).wrapping_sub(1);
                    self.set_rp(p, v);
                }
                8
            }
            4 => {
                let val = self.get_reg8(y, bus);
                let result = self.alu_inc(val);
                self.set_reg8(y, result, bus);
                if y == 6 {
                    12
                } else {
                    4
                }
            }
            5 => {
                let val = self.get_reg8(y, bus);
                let result = self.alu_dec(val);
                self.set_reg8(y, result, bus);
                if y == 6 {
                    12
                } else {
                    4
                }
            }
            6 => {
                let n = self.fetch_byte(bus);
                self.set_reg8(y, n, bus);
                if y == 6 {
                    12
                } else {
                    8
                }
            }
            7 => match y {
                0 => {
                    // RLCA
                    self.a = self.rot_rlc(self.a);
                    self.f &= flags::C;
                    4
                }
                1 => {
                    // RRCA
                    self.a = self.rot_rrc(self.a);
                    self.f &= flags::C;
                    4
                }
                2 => {
                    // RLA
                    self.a = self.rot_rl(self.a);
                    self.f &= flags::C;
                    4
                }
                3 => {
                    // RRA
                    self.a = self.rot_rr(self.a);
                    self.f &= flags::C;
                    4
                }
                4 => {
                    self.daa();
                    4
                }
                5 => {
                    // CPL
                    self.a = !self.a;
                    self.set_flag(flags::N, true);
                    self.set_flag(flags::H, true);
                    4
                }
                6 => {
                    // SCF
                    self.set_flag(flags::N, false);
                    self.set_flag(flags::H, false);
                    self.set_flag(flags::C, true);
                    4
                }
                7 => {
                    // CCF
                    let c = self.flag(flags::C);
                    self.set_flag(flags::N, false);
                    self.set_flag(flags::H, false);
                    self.set_flag(flags::C, !c);
                    4
                }
                _ => unreachable!(),
            },
            _ => unreachable!(),
        }
    }

    /// x=1: 0x40-0x7F, LD r8,r8 with 0x76 = HALT.
    fn execute_x1(&mut self, bus: &mut Bus, y: u8, z: u8) -> u32 {
        if y == 6 && z == 6 {
            self.enter_halt();
            return 4;
        }
        let val = self.get_reg8(z, bus);
        self.set_reg8(y, val, bus);
        if y == 6 || z == 6 {
            8
        } else {
            4
        }
    }

    /// x=2: 0x80-0xBF, ALU A,r8.
    fn execute_x2(&mut self, bus: &mut Bus, y: u8, z: u8) -> u32 {
        let val = self.get_reg8(z, bus);
        self.execute_alu(y, val);
        if z == 6 {
            8
        } else {
            4
        }
    }

    pub fn execute_alu(&mut self, y: u8, val: u8) {
        match y {
            0 => self.a = self.alu_add(val, false),
            1 => self.a = self.alu_add(val, true),
            2 => {
                self.alu_sub(val, false, true);
            }
            3 => {
                self.alu_sub(val, true, true);
            }
            4 => self.alu_and(val),
            5 => self.alu_xor(val),
            6 => self.alu_or(val),
            7 => {
                self.alu_sub(val, false, false); // CP
            }
            _ => unreachable!(),
        }
    }

    /// x=3: 0xC0-0xFF. GB repurposes several Z80 I/O/exchange slots for its
    /// own zero-page and 16-bit-offset instructions, so this is dispatched
    /// on the concrete opcode byte rather than further (y,z) decomposition.
    fn execute_x3(&mut self, bus: &mut Bus, opcode: u8, y: u8, z: u8, p: u8, q: u8) -> u32 {
        match opcode {
            0xCB => self.execute_cb(bus),
            0xE0 => {
                // LDH (a8),A
                let n = self.fetch_byte(bus);
                self.mem_write(bus, 0xFF00 | n as u16, self.a);
                12
            }
            0xF0 => {
                // LDH A,(a8)
                let n = self.fetch_byte(bus);
                self.a = self.mem_read(bus, 0xFF00 | n as u16);
                12
            }
            0xE2 => {
                // LD (C),A
                self.mem_write(bus, 0xFF00 | self.c as u16, self.a);
                8
            }
            0xF2 => {
                // LD A,(C)
                self.a = self.mem_read(bus, 0xFF00 | self.c as u16);
                8
            }
            0xE8 => {
                // ADD SP,r8
                let d = self.fetch_byte(bus) as i8;
                self.sp = self.alu_sp_offset(d);
                16
            }
            0xF8 => {
                // LD HL,SP+r8
                let d = self.fetch_byte(bus) as i8;
                let result = self.alu_sp_offset(d);
                self.set_hl(result);
                12
            }
            0xF9 => {
                // LD SP,HL
                self.sp = self.hl();
                8
            }
            0xEA => {
                // LD (a16),A
                let addr = self.fetch_word(bus);
                self.mem_write(bus, addr, self.a);
                16
            }
            0xFA => {
                // LD A,(a16)
                let addr = self.fetch_word(bus);
                self.a = self.mem_read(bus, addr);
                16
            }
            0xE9 => {
                // JP (HL)
                self.pc = self.hl();
                4
            }
            0xF3 => {
                self.ime = false;
                4
            }
            0xFB => {
                // EI. Real hardware delays enablement by one instruction;
                // this simplifies to immediate enablement (spec-sanctioned).
                self.ime = true;
                4
            }
            0xD9 => {
                // RETI
                self.pc = self.pop_word(bus);
                self.ime = true;
                16
            }
            0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => {
                // Undefined opcode: fatal. Rewind PC so the faulting byte is
                // still at PC for diagnostics, and latch it for the caller.
                self.pc = self.pc.wrapping_sub(1);
                self.fault = Some(opcode);
                4
            }
            _ => match z {
                0 => {
                    // RET cc
                    if self.check_cc(y) {
                        self.pc = self.pop_word(bus);
                        20
                    } else {
                        8
                    }
                }
                1 if q == 0 => {
                    // POP rp2
                    let val = self.pop_word(bus);
                    self.set_rp2(p, val);
                    12
                }
                1 if p == 0 => {
                    // RET
                    self.pc = self.pop_word(bus);
                    16
                }
                2 => {
                    // JP cc,a16
                    let nn = self.fetch_word(bus);
                    if self.check_cc(y) {
                        self.pc = nn;
                        16
                    } else {
                        12
                    }
                }
                3 if y == 0 => {
                    // JP a16
                    self.pc = self.fetch_word(bus);
                    16
                }
                4 => {
                    // CALL cc,a16
                    let nn = self.fetch_word(bus);
                    if self.check_cc(y) {
                        self.push_word(bus, self.pc);
                        self.pc = nn;
                        24
                    } else {
                        12
                    }
                }
                5 if q == 0 => {
                    // PUSH rp2
                    let val = self.get_rp2(p);
                    self.push_word(bus, val);
                    16
                }
                5 if p == 0 => {
                    // CALL a16
                    let nn = self.fetch_word(bus);
                    self.push_word(bus, self.pc);
                    self.pc = nn;
                    24
                }
                6 => {
                    // ALU A,n
                    let n = self.fetch_byte(bus);
                    self.execute_alu(y, n);
                    8
                }
                7 => {
                    // RST y*8
                    self.push_word(bus, self.pc);
                    self.pc = (y as u16) * 8;
                    16
                }
                _ => 4,
            },
        }
    }

    /// DAA: the canonical add/subtract-phase correction. Carry out is a
    /// logical OR with whatever carry was already set; DAA never clears it.
    fn daa(&mut self) {
        let mut correction: u8 = 0;
        let mut set_carry = false;

        if self.flag(flags::N) {
            if self.flag(flags::H) {
                correction |= 0x06;
            }
            if self.flag(flags::C) {
                correction |= 0x60;
            }
            self.a = self.a.wrapping_sub(correction);
        } else {
            if self.flag(flags::H) || (self.a & 0x0F) > 0x09 {
                correction |= 0x06;
            }
            if self.flag(flags::C) || self.a > 0x99 {
                correction |= 0x60;
                set_carry = true;
            }
            self.a = self.a.wrapping_add(correction);
        }

        self.set_flag(flags::Z, self.a == 0);
        self.set_flag(flags::H, false);
        if set_carry {
            self.set_flag(flags::C, true);
        }
    }

    // ========== CB-prefixed table ==========

    pub fn execute_cb(&mut self, bus: &mut Bus) -> u32 {
        let opcode = self.fetch_byte(bus);
        let x = opcode >> 6;
        let y = (opcode >> 3) & 7;
        let z = opcode & 7;

        let val = self.get_reg8(z, bus);
        let cycles = if z == 6 { 16 } else { 8 };

        match x {
            0 => {
                let result = match y {
                    0 => self.rot_rlc(val),
                    1 => self.rot_rrc(val),
                    2 => self.rot_rl(val),
                    3 => self.rot_rr(val),
                    4 => self.rot_sla(val),
                    5 => self.rot_sra(val),
                    6 => self.rot_swap(val),
                    7 => self.rot_srl(val),
                    _ => unreachable!(),
                };
                self.set_flag(flags::Z, result == 0);
                self.set_flag(flags::N, false);
                self.set_flag(flags::H, false);
                self.set_reg8(z, result, bus);
                cycles
            }
            1 => {
                // BIT y,r
                let mask = 1 << y;
                self.set_flag(flags::Z, val & mask == 0);
                self.set_flag(flags::N, false);
                self.set_flag(flags::H, true);
                if z == 6 {
                    12
                } else {
                    8
                }
            }
            2 => {
                let result = val & !(1 << y);
                self.set_reg8(z, result, bus);
                cycles
            }
            3 => {
                let result = val | (1 << y);
                self.set_reg8(z, result, bus);
                cycles
            }
            _ => unreachable!(),
        }
    }
}
