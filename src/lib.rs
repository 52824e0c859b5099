//! MOS 6502 CPU emulator.
//!
//! A cycle-counted interpreter for the NMOS 6502. The caller provides the
//! 64 KiB address space as a [`Bus`] implementation; the CPU owns the bus
//! and executes one instruction per [`step`](Mos6502::step) call, returning
//! the number of bus cycles the real part would have spent. Pacing against
//! a clock is the caller's business: accumulate the returned cycle counts
//! and sleep as needed.
//!
//! Supported behavior:
//!
//! - The full documented instruction set, including decimal-mode ADC/SBC
//! - Cycle costs per the original data sheets, including the page-cross
//!   penalty on indexed reads and the taken-branch penalties
//! - The JMP-indirect page-wrap hardware bug
//! - The documented NOP aliases and the HLT opcodes that jam the part until
//!   it is reset
//! - Reset, NMI, and IRQ sequences with their fixed vectors
//!
//! Errors from [`step`](Mos6502::step) are sticky only for [`Error::Halted`];
//! an invalid opcode or a bus fault leaves the CPU running so the caller can
//! decide whether to reset or step past.

use std::fmt;

mod addressing;
mod bus;
pub mod flags;

pub use bus::{Bus, BusFault};
pub use flags::Status;

use flags::{C, D, I, N, V, Z};

/// Failure modes of a single [`step`](Mos6502::step).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A HLT opcode latched the CPU. Sticky until [`Mos6502::reset`].
    Halted,
    /// The fetched opcode has no handler. `pc` is the address the opcode
    /// was fetched from; PC itself has advanced past the opcode byte.
    InvalidOpcode { pc: u16, opcode: u8 },
    /// The bus aborted an access. Architectural state keeps whatever the
    /// instruction updated before the fault.
    Bus(BusFault),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Halted => write!(f, "CPU halted"),
            Self::InvalidOpcode { pc, opcode } => {
                write!(f, "invalid op code: {pc:04X}: {opcode:02X}")
            }
            Self::Bus(fault) => fault.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bus(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<BusFault> for Error {
    fn from(fault: BusFault) -> Self {
        Self::Bus(fault)
    }
}

/// The MOS 6502 CPU.
///
/// Owns the bus it was created with. Between steps it holds the complete
/// architectural state; there is no hidden pipeline.
pub struct Mos6502<B: Bus> {
    bus: B,

    /// Accumulator.
    a: u8,
    /// X index register.
    x: u8,
    /// Y index register.
    y: u8,
    /// Stack pointer (indexes page $01).
    sp: u8,
    /// Program counter.
    pc: u16,
    /// Processor status.
    p: Status,

    /// Set by a HLT opcode, cleared only by reset.
    halted: bool,
}

impl<B: Bus> Mos6502<B> {
    /// Create a CPU attached to `bus` and reset it.
    ///
    /// Fails when the bus cannot service the reset-vector reads at
    /// `$FFFC`/`$FFFD`.
    pub fn new(bus: B) -> Result<Self, BusFault> {
        let mut cpu = Self {
            bus,
            a: 0,
            x: 0,
            y: 0,
            sp: 0,
            pc: 0,
            p: Status::new(),
            halted: false,
        };
        cpu.reset()?;
        Ok(cpu)
    }

    /// Reset to the initial state: S=$FF, A=X=Y=0, flags cleared, PC loaded
    /// from the reset vector at `$FFFC`/`$FFFD`. Releases the halt latch.
    pub fn reset(&mut self) -> Result<(), BusFault> {
        self.sp = 0xFF;
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.p = Status::new();
        self.halted = false;
        self.pc = self.read_vector(0xFC)?;
        Ok(())
    }

    /// Non-maskable interrupt: push PC and status (U set, B clear), set I,
    /// and continue at the vector from `$FFFA`/`$FFFB`.
    pub fn nmi(&mut self) -> Result<(), BusFault> {
        self.interrupt(0xFA)
    }

    /// Interrupt request. Ignored while the I flag is set; otherwise like
    /// [`nmi`](Self::nmi) with the vector at `$FFFE`/`$FFFF`.
    pub fn irq(&mut self) -> Result<(), BusFault> {
        if self.p.is_set(I) {
            return Ok(());
        }
        self.interrupt(0xFE)
    }

    fn interrupt(&mut self, vector_lo: u8) -> Result<(), BusFault> {
        self.push_word(self.pc)?;
        self.push(self.p.to_stack_irq())?;
        self.p.set_if(I, true);
        self.pc = self.read_vector(vector_lo)?;
        Ok(())
    }

    /// Execute exactly one instruction.
    ///
    /// Returns the cycle cost the original processor would have needed for
    /// it, including any page-cross or taken-branch penalty. While the CPU
    /// is halted (including on the step that executed the HLT) this
    /// returns [`Error::Halted`] and performs no work until a reset.
    pub fn step(&mut self) -> Result<u32, Error> {
        if self.halted {
            return Err(Error::Halted);
        }
        let pc = self.pc;
        let opcode = self.fetch()?;
        let cycles = self.execute(pc, opcode)?;
        if self.halted {
            return Err(Error::Halted);
        }
        Ok(cycles)
    }

    // =========================================================================
    // Register accessors
    // =========================================================================

    /// Program counter, both halves combined.
    #[must_use]
    pub fn pc(&self) -> u16 {
        self.pc
    }

    /// Low byte of the program counter.
    #[must_use]
    pub fn pcl(&self) -> u8 {
        self.pc as u8
    }

    /// High byte of the program counter.
    #[must_use]
    pub fn pch(&self) -> u8 {
        (self.pc >> 8) as u8
    }

    /// Overwrite the program counter with `(lo, hi)`.
    pub fn set_pc(&mut self, lo: u8, hi: u8) {
        self.pc = u16::from_le_bytes([lo, hi]);
    }

    #[must_use]
    pub fn a(&self) -> u8 {
        self.a
    }

    #[must_use]
    pub fn x(&self) -> u8 {
        self.x
    }

    #[must_use]
    pub fn y(&self) -> u8 {
        self.y
    }

    #[must_use]
    pub fn sp(&self) -> u8 {
        self.sp
    }

    /// The live status byte. U and B are never set here; they exist only in
    /// status bytes pushed to the stack.
    #[must_use]
    pub fn status(&self) -> u8 {
        self.p.bits()
    }

    pub fn set_a(&mut self, value: u8) {
        self.a = value;
    }

    pub fn set_x(&mut self, value: u8) {
        self.x = value;
    }

    pub fn set_y(&mut self, value: u8) {
        self.y = value;
    }

    pub fn set_sp(&mut self, value: u8) {
        self.sp = value;
    }

    /// Overwrite the status register. U and B are masked off.
    pub fn set_status(&mut self, value: u8) {
        self.p.load(value);
    }

    /// True while the HLT latch is set.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// The bus this CPU drives.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Mutable access to the bus, e.g. to load a program.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    // =========================================================================
    // ALU
    // =========================================================================

    /// Update N and Z from `value` and pass it through, so flag updates
    /// compose with register assignments.
    fn set_nz(&mut self, value: u8) -> u8 {
        self.p.update_nz(value);
        value
    }

    /// ADC - add with carry, binary or BCD depending on the D flag.
    fn adc(&mut self, value: u8) {
        let result = if self.p.is_set(D) {
            self.adc_decimal(value)
        } else {
            self.adc_binary(value)
        };
        self.a = self.set_nz(result);
    }

    fn adc_binary(&mut self, value: u8) -> u8 {
        let carry = u16::from(self.p.is_set(C));
        let sum = u16::from(self.a) + u16::from(value) + carry;
        let result = sum as u8;
        self.p.set_if(C, sum > 0xFF);
        self.p
            .set_if(V, (self.a ^ result) & (value ^ result) & 0x80 != 0);
        result
    }

    /// BCD add. Each nibble is adjusted by 6 when it exceeds 9; C comes
    /// from the adjusted high nibble. N and Z are taken from the decimal
    /// result by the caller and V is left alone.
    fn adc_decimal(&mut self, value: u8) -> u8 {
        let carry = u8::from(self.p.is_set(C));
        let mut lo = (self.a & 0x0F) + (value & 0x0F) + carry;
        if lo > 9 {
            lo += 6;
        }
        let mut hi = (self.a >> 4) + (value >> 4) + u8::from(lo > 0x0F);
        if hi > 9 {
            hi += 6;
        }
        self.p.set_if(C, hi > 0x0F);
        (lo & 0x0F) | (hi << 4)
    }

    /// SBC - subtract with borrow. Binary mode is ADC of the complement.
    fn sbc(&mut self, value: u8) {
        let result = if self.p.is_set(D) {
            self.sbc_decimal(value)
        } else {
            self.adc_binary(!value)
        };
        self.a = self.set_nz(result);
    }

    /// BCD subtract. A nibble with its borrow bit (bit 4) set is adjusted
    /// by 6; the borrow into the high nibble is taken after the adjustment.
    /// C signals "no borrow". N and Z come from the decimal result, V is
    /// left alone.
    fn sbc_decimal(&mut self, value: u8) -> u8 {
        let borrow = u8::from(!self.p.is_set(C));
        let mut lo = (self.a & 0x0F)
            .wrapping_sub(value & 0x0F)
            .wrapping_sub(borrow);
        if lo & 0x10 != 0 {
            lo = lo.wrapping_sub(6);
        }
        let mut hi = (self.a >> 4)
            .wrapping_sub(value >> 4)
            .wrapping_sub(u8::from(lo & 0x10 != 0));
        if hi & 0x10 != 0 {
            hi = hi.wrapping_sub(6);
        }
        self.p.set_if(C, hi < 0x0F);
        (lo & 0x0F) | (hi << 4)
    }

    /// CMP/CPX/CPY - compare a register against memory. C means `reg >= mem`.
    fn compare(&mut self, reg: u8, value: u8) {
        self.set_nz(reg.wrapping_sub(value));
        self.p.set_if(C, reg >= value);
    }

    /// BIT - N and V from bits 7 and 6 of memory, Z from the AND with A.
    fn bit(&mut self, value: u8) {
        self.p.set_if(N, value & 0x80 != 0);
        self.p.set_if(Z, value & self.a == 0);
        self.p.set_if(V, value & 0x40 != 0);
    }

    /// ASL - arithmetic shift left, bit 7 into C.
    fn asl(&mut self, value: u8) -> u8 {
        self.p.set_if(C, value & 0x80 != 0);
        self.set_nz(value << 1)
    }

    /// LSR - logical shift right, bit 0 into C.
    fn lsr(&mut self, value: u8) -> u8 {
        self.p.set_if(C, value & 0x01 != 0);
        self.set_nz(value >> 1)
    }

    /// ROL - rotate left through C.
    fn rol(&mut self, value: u8) -> u8 {
        let carry_in = u8::from(self.p.is_set(C));
        self.p.set_if(C, value & 0x80 != 0);
        self.set_nz(value << 1 | carry_in)
    }

    /// ROR - rotate right through C.
    fn ror(&mut self, value: u8) -> u8 {
        let carry_in = u8::from(self.p.is_set(C));
        self.p.set_if(C, value & 0x01 != 0);
        self.set_nz(value >> 1 | carry_in << 7)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Execute the instruction for `opcode`, fetched from `pc`. Returns its
    /// full documented cycle cost, opcode fetch included.
    fn execute(&mut self, pc: u16, opcode: u8) -> Result<u32, Error> {
        match opcode {
            // =================================================================
            // Load operations
            // =================================================================

            // LDA
            0xA9 => {
                let value = self.fetch()?;
                self.a = self.set_nz(value);
                Ok(2)
            }
            0xA5 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(value);
                Ok(3)
            }
            0xB5 => {
                let addr = self.addr_zero_page_x()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(value);
                Ok(4)
            }
            0xAD => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(value);
                Ok(4)
            }
            0xBD => {
                let (addr, crossed) = self.addr_absolute_x()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(value);
                Ok(4 + u32::from(crossed))
            }
            0xB9 => {
                let (addr, crossed) = self.addr_absolute_y()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(value);
                Ok(4 + u32::from(crossed))
            }
            0xA1 => {
                let addr = self.addr_indexed_indirect()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(value);
                Ok(6)
            }
            0xB1 => {
                let (addr, crossed) = self.addr_indirect_indexed()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(value);
                Ok(5 + u32::from(crossed))
            }

            // LDX
            0xA2 => {
                let value = self.fetch()?;
                self.x = self.set_nz(value);
                Ok(2)
            }
            0xA6 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?;
                self.x = self.set_nz(value);
                Ok(3)
            }
            0xB6 => {
                let addr = self.addr_zero_page_y()?;
                let value = self.read(addr)?;
                self.x = self.set_nz(value);
                Ok(4)
            }
            0xAE => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?;
                self.x = self.set_nz(value);
                Ok(4)
            }
            0xBE => {
                let (addr, crossed) = self.addr_absolute_y()?;
                let value = self.read(addr)?;
                self.x = self.set_nz(value);
                Ok(4 + u32::from(crossed))
            }

            // LDY
            0xA0 => {
                let value = self.fetch()?;
                self.y = self.set_nz(value);
                Ok(2)
            }
            0xA4 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?;
                self.y = self.set_nz(value);
                Ok(3)
            }
            0xB4 => {
                let addr = self.addr_zero_page_x()?;
                let value = self.read(addr)?;
                self.y = self.set_nz(value);
                Ok(4)
            }
            0xAC => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?;
                self.y = self.set_nz(value);
                Ok(4)
            }
            0xBC => {
                let (addr, crossed) = self.addr_absolute_x()?;
                let value = self.read(addr)?;
                self.y = self.set_nz(value);
                Ok(4 + u32::from(crossed))
            }

            // =================================================================
            // Store operations
            // =================================================================

            // STA
            0x85 => {
                let addr = self.addr_zero_page()?;
                self.write(addr, self.a)?;
                Ok(3)
            }
            0x95 => {
                let addr = self.addr_zero_page_x()?;
                self.write(addr, self.a)?;
                Ok(4)
            }
            0x8D => {
                let addr = self.addr_absolute()?;
                self.write(addr, self.a)?;
                Ok(4)
            }
            0x9D => {
                // Stores pay the index penalty unconditionally.
                let (addr, _) = self.addr_absolute_x()?;
                self.write(addr, self.a)?;
                Ok(5)
            }
            0x99 => {
                let (addr, _) = self.addr_absolute_y()?;
                self.write(addr, self.a)?;
                Ok(5)
            }
            0x81 => {
                let addr = self.addr_indexed_indirect()?;
                self.write(addr, self.a)?;
                Ok(6)
            }
            0x91 => {
                let (addr, _) = self.addr_indirect_indexed()?;
                self.write(addr, self.a)?;
                Ok(6)
            }

            // STX
            0x86 => {
                let addr = self.addr_zero_page()?;
                self.write(addr, self.x)?;
                Ok(3)
            }
            0x96 => {
                let addr = self.addr_zero_page_y()?;
                self.write(addr, self.x)?;
                Ok(4)
            }
            0x8E => {
                let addr = self.addr_absolute()?;
                self.write(addr, self.x)?;
                Ok(4)
            }

            // STY
            0x84 => {
                let addr = self.addr_zero_page()?;
                self.write(addr, self.y)?;
                Ok(3)
            }
            0x94 => {
                let addr = self.addr_zero_page_x()?;
                self.write(addr, self.y)?;
                Ok(4)
            }
            0x8C => {
                let addr = self.addr_absolute()?;
                self.write(addr, self.y)?;
                Ok(4)
            }

            // =================================================================
            // Register transfers
            // =================================================================
            0xAA => {
                // TAX
                self.x = self.set_nz(self.a);
                Ok(2)
            }
            0xA8 => {
                // TAY
                self.y = self.set_nz(self.a);
                Ok(2)
            }
            0x8A => {
                // TXA
                self.a = self.set_nz(self.x);
                Ok(2)
            }
            0x98 => {
                // TYA
                self.a = self.set_nz(self.y);
                Ok(2)
            }
            0xBA => {
                // TSX
                self.x = self.set_nz(self.sp);
                Ok(2)
            }
            0x9A => {
                // TXS - no flags
                self.sp = self.x;
                Ok(2)
            }

            // =================================================================
            // Stack operations
            // =================================================================
            0x48 => {
                // PHA
                self.push(self.a)?;
                Ok(3)
            }
            0x08 => {
                // PHP - pushed status always carries U and B
                self.push(self.p.to_stack_brk())?;
                Ok(3)
            }
            0x68 => {
                // PLA
                let value = self.pull()?;
                self.a = self.set_nz(value);
                Ok(4)
            }
            0x28 => {
                // PLP
                let value = self.pull()?;
                self.p.load_from_stack(value);
                Ok(4)
            }

            // =================================================================
            // Arithmetic
            // =================================================================

            // ADC
            0x69 => {
                let value = self.fetch()?;
                self.adc(value);
                Ok(2)
            }
            0x65 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?;
                self.adc(value);
                Ok(3)
            }
            0x75 => {
                let addr = self.addr_zero_page_x()?;
                let value = self.read(addr)?;
                self.adc(value);
                Ok(4)
            }
            0x6D => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?;
                self.adc(value);
                Ok(4)
            }
            0x7D => {
                let (addr, crossed) = self.addr_absolute_x()?;
                let value = self.read(addr)?;
                self.adc(value);
                Ok(4 + u32::from(crossed))
            }
            0x79 => {
                let (addr, crossed) = self.addr_absolute_y()?;
                let value = self.read(addr)?;
                self.adc(value);
                Ok(4 + u32::from(crossed))
            }
            0x61 => {
                let addr = self.addr_indexed_indirect()?;
                let value = self.read(addr)?;
                self.adc(value);
                Ok(6)
            }
            0x71 => {
                let (addr, crossed) = self.addr_indirect_indexed()?;
                let value = self.read(addr)?;
                self.adc(value);
                Ok(5 + u32::from(crossed))
            }

            // SBC
            0xE9 => {
                let value = self.fetch()?;
                self.sbc(value);
                Ok(2)
            }
            0xE5 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?;
                self.sbc(value);
                Ok(3)
            }
            0xF5 => {
                let addr = self.addr_zero_page_x()?;
                let value = self.read(addr)?;
                self.sbc(value);
                Ok(4)
            }
            0xED => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?;
                self.sbc(value);
                Ok(4)
            }
            0xFD => {
                let (addr, crossed) = self.addr_absolute_x()?;
                let value = self.read(addr)?;
                self.sbc(value);
                Ok(4 + u32::from(crossed))
            }
            0xF9 => {
                let (addr, crossed) = self.addr_absolute_y()?;
                let value = self.read(addr)?;
                self.sbc(value);
                Ok(4 + u32::from(crossed))
            }
            0xE1 => {
                let addr = self.addr_indexed_indirect()?;
                let value = self.read(addr)?;
                self.sbc(value);
                Ok(6)
            }
            0xF1 => {
                let (addr, crossed) = self.addr_indirect_indexed()?;
                let value = self.read(addr)?;
                self.sbc(value);
                Ok(5 + u32::from(crossed))
            }

            // =================================================================
            // Compare
            // =================================================================

            // CMP
            0xC9 => {
                let value = self.fetch()?;
                self.compare(self.a, value);
                Ok(2)
            }
            0xC5 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?;
                self.compare(self.a, value);
                Ok(3)
            }
            0xD5 => {
                let addr = self.addr_zero_page_x()?;
                let value = self.read(addr)?;
                self.compare(self.a, value);
                Ok(4)
            }
            0xCD => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?;
                self.compare(self.a, value);
                Ok(4)
            }
            0xDD => {
                let (addr, crossed) = self.addr_absolute_x()?;
                let value = self.read(addr)?;
                self.compare(self.a, value);
                Ok(4 + u32::from(crossed))
            }
            0xD9 => {
                let (addr, crossed) = self.addr_absolute_y()?;
                let value = self.read(addr)?;
                self.compare(self.a, value);
                Ok(4 + u32::from(crossed))
            }
            0xC1 => {
                let addr = self.addr_indexed_indirect()?;
                let value = self.read(addr)?;
                self.compare(self.a, value);
                Ok(6)
            }
            0xD1 => {
                let (addr, crossed) = self.addr_indirect_indexed()?;
                let value = self.read(addr)?;
                self.compare(self.a, value);
                Ok(5 + u32::from(crossed))
            }

            // CPX
            0xE0 => {
                let value = self.fetch()?;
                self.compare(self.x, value);
                Ok(2)
            }
            0xE4 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?;
                self.compare(self.x, value);
                Ok(3)
            }
            0xEC => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?;
                self.compare(self.x, value);
                Ok(4)
            }

            // CPY
            0xC0 => {
                let value = self.fetch()?;
                self.compare(self.y, value);
                Ok(2)
            }
            0xC4 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?;
                self.compare(self.y, value);
                Ok(3)
            }
            0xCC => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?;
                self.compare(self.y, value);
                Ok(4)
            }

            // =================================================================
            // Increment / decrement
            // =================================================================

            // INC
            0xE6 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?.wrapping_add(1);
                let result = self.set_nz(value);
                self.write(addr, result)?;
                Ok(5)
            }
            0xF6 => {
                let addr = self.addr_zero_page_x()?;
                let value = self.read(addr)?.wrapping_add(1);
                let result = self.set_nz(value);
                self.write(addr, result)?;
                Ok(6)
            }
            0xEE => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?.wrapping_add(1);
                let result = self.set_nz(value);
                self.write(addr, result)?;
                Ok(6)
            }
            0xFE => {
                let (addr, _) = self.addr_absolute_x()?;
                let value = self.read(addr)?.wrapping_add(1);
                let result = self.set_nz(value);
                self.write(addr, result)?;
                Ok(7)
            }

            // DEC
            0xC6 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?.wrapping_sub(1);
                let result = self.set_nz(value);
                self.write(addr, result)?;
                Ok(5)
            }
            0xD6 => {
                let addr = self.addr_zero_page_x()?;
                let value = self.read(addr)?.wrapping_sub(1);
                let result = self.set_nz(value);
                self.write(addr, result)?;
                Ok(6)
            }
            0xCE => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?.wrapping_sub(1);
                let result = self.set_nz(value);
                self.write(addr, result)?;
                Ok(6)
            }
            0xDE => {
                let (addr, _) = self.addr_absolute_x()?;
                let value = self.read(addr)?.wrapping_sub(1);
                let result = self.set_nz(value);
                self.write(addr, result)?;
                Ok(7)
            }

            // INX / INY / DEX / DEY
            0xE8 => {
                let value = self.x.wrapping_add(1);
                self.x = self.set_nz(value);
                Ok(2)
            }
            0xC8 => {
                let value = self.y.wrapping_add(1);
                self.y = self.set_nz(value);
                Ok(2)
            }
            0xCA => {
                let value = self.x.wrapping_sub(1);
                self.x = self.set_nz(value);
                Ok(2)
            }
            0x88 => {
                let value = self.y.wrapping_sub(1);
                self.y = self.set_nz(value);
                Ok(2)
            }

            // =================================================================
            // Logical operations
            // =================================================================

            // AND
            0x29 => {
                let value = self.fetch()?;
                self.a = self.set_nz(self.a & value);
                Ok(2)
            }
            0x25 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a & value);
                Ok(3)
            }
            0x35 => {
                let addr = self.addr_zero_page_x()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a & value);
                Ok(4)
            }
            0x2D => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a & value);
                Ok(4)
            }
            0x3D => {
                let (addr, crossed) = self.addr_absolute_x()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a & value);
                Ok(4 + u32::from(crossed))
            }
            0x39 => {
                let (addr, crossed) = self.addr_absolute_y()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a & value);
                Ok(4 + u32::from(crossed))
            }
            0x21 => {
                let addr = self.addr_indexed_indirect()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a & value);
                Ok(6)
            }
            0x31 => {
                let (addr, crossed) = self.addr_indirect_indexed()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a & value);
                Ok(5 + u32::from(crossed))
            }

            // EOR
            0x49 => {
                let value = self.fetch()?;
                self.a = self.set_nz(self.a ^ value);
                Ok(2)
            }
            0x45 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a ^ value);
                Ok(3)
            }
            0x55 => {
                let addr = self.addr_zero_page_x()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a ^ value);
                Ok(4)
            }
            0x4D => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a ^ value);
                Ok(4)
            }
            0x5D => {
                let (addr, crossed) = self.addr_absolute_x()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a ^ value);
                Ok(4 + u32::from(crossed))
            }
            0x59 => {
                let (addr, crossed) = self.addr_absolute_y()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a ^ value);
                Ok(4 + u32::from(crossed))
            }
            0x41 => {
                let addr = self.addr_indexed_indirect()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a ^ value);
                Ok(6)
            }
            0x51 => {
                let (addr, crossed) = self.addr_indirect_indexed()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a ^ value);
                Ok(5 + u32::from(crossed))
            }

            // ORA
            0x09 => {
                let value = self.fetch()?;
                self.a = self.set_nz(self.a | value);
                Ok(2)
            }
            0x05 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a | value);
                Ok(3)
            }
            0x15 => {
                let addr = self.addr_zero_page_x()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a | value);
                Ok(4)
            }
            0x0D => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a | value);
                Ok(4)
            }
            0x1D => {
                let (addr, crossed) = self.addr_absolute_x()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a | value);
                Ok(4 + u32::from(crossed))
            }
            0x19 => {
                let (addr, crossed) = self.addr_absolute_y()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a | value);
                Ok(4 + u32::from(crossed))
            }
            0x01 => {
                let addr = self.addr_indexed_indirect()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a | value);
                Ok(6)
            }
            0x11 => {
                let (addr, crossed) = self.addr_indirect_indexed()?;
                let value = self.read(addr)?;
                self.a = self.set_nz(self.a | value);
                Ok(5 + u32::from(crossed))
            }

            // BIT
            0x24 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?;
                self.bit(value);
                Ok(3)
            }
            0x2C => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?;
                self.bit(value);
                Ok(4)
            }

            // =================================================================
            // Shifts and rotates
            // =================================================================

            // ASL
            0x0A => {
                let result = self.asl(self.a);
                self.a = result;
                Ok(2)
            }
            0x06 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?;
                let result = self.asl(value);
                self.write(addr, result)?;
                Ok(5)
            }
            0x16 => {
                let addr = self.addr_zero_page_x()?;
                let value = self.read(addr)?;
                let result = self.asl(value);
                self.write(addr, result)?;
                Ok(6)
            }
            0x0E => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?;
                let result = self.asl(value);
                self.write(addr, result)?;
                Ok(6)
            }
            0x1E => {
                let (addr, _) = self.addr_absolute_x()?;
                let value = self.read(addr)?;
                let result = self.asl(value);
                self.write(addr, result)?;
                Ok(7)
            }

            // LSR
            0x4A => {
                let result = self.lsr(self.a);
                self.a = result;
                Ok(2)
            }
            0x46 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?;
                let result = self.lsr(value);
                self.write(addr, result)?;
                Ok(5)
            }
            0x56 => {
                let addr = self.addr_zero_page_x()?;
                let value = self.read(addr)?;
                let result = self.lsr(value);
                self.write(addr, result)?;
                Ok(6)
            }
            0x4E => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?;
                let result = self.lsr(value);
                self.write(addr, result)?;
                Ok(6)
            }
            0x5E => {
                let (addr, _) = self.addr_absolute_x()?;
                let value = self.read(addr)?;
                let result = self.lsr(value);
                self.write(addr, result)?;
                Ok(7)
            }

            // ROL
            0x2A => {
                let result = self.rol(self.a);
                self.a = result;
                Ok(2)
            }
            0x26 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?;
                let result = self.rol(value);
                self.write(addr, result)?;
                Ok(5)
            }
            0x36 => {
                let addr = self.addr_zero_page_x()?;
                let value = self.read(addr)?;
                let result = self.rol(value);
                self.write(addr, result)?;
                Ok(6)
            }
            0x2E => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?;
                let result = self.rol(value);
                self.write(addr, result)?;
                Ok(6)
            }
            0x3E => {
                let (addr, _) = self.addr_absolute_x()?;
                let value = self.read(addr)?;
                let result = self.rol(value);
                self.write(addr, result)?;
                Ok(7)
            }

            // ROR
            0x6A => {
                let result = self.ror(self.a);
                self.a = result;
                Ok(2)
            }
            0x66 => {
                let addr = self.addr_zero_page()?;
                let value = self.read(addr)?;
                let result = self.ror(value);
                self.write(addr, result)?;
                Ok(5)
            }
            0x76 => {
                let addr = self.addr_zero_page_x()?;
                let value = self.read(addr)?;
                let result = self.ror(value);
                self.write(addr, result)?;
                Ok(6)
            }
            0x6E => {
                let addr = self.addr_absolute()?;
                let value = self.read(addr)?;
                let result = self.ror(value);
                self.write(addr, result)?;
                Ok(6)
            }
            0x7E => {
                let (addr, _) = self.addr_absolute_x()?;
                let value = self.read(addr)?;
                let result = self.ror(value);
                self.write(addr, result)?;
                Ok(7)
            }

            // =================================================================
            // Jumps and subroutines
            // =================================================================
            0x4C => {
                // JMP absolute
                self.pc = self.fetch_word()?;
                Ok(3)
            }
            0x6C => {
                // JMP indirect, with the page-wrap bug
                let ptr = self.fetch_word()?;
                self.pc = self.read_indirect_target(ptr)?;
                Ok(5)
            }
            0x20 => {
                // JSR - the pushed address points at the last operand byte
                let lo = self.fetch()?;
                self.push_word(self.pc)?;
                let hi = self.fetch()?;
                self.pc = u16::from_le_bytes([lo, hi]);
                Ok(6)
            }
            0x60 => {
                // RTS
                let addr = self.pull_word()?;
                self.pc = addr.wrapping_add(1);
                Ok(6)
            }
            0x40 => {
                // RTI - unlike RTS, the popped PC is used as-is
                let status = self.pull()?;
                self.p.load_from_stack(status);
                self.pc = self.pull_word()?;
                Ok(7)
            }

            // =================================================================
            // Branches
            // =================================================================
            0x10 => {
                // BPL
                let extra = self.branch_if(!self.p.is_set(N))?;
                Ok(2 + extra)
            }
            0x30 => {
                // BMI
                let extra = self.branch_if(self.p.is_set(N))?;
                Ok(2 + extra)
            }
            0x50 => {
                // BVC
                let extra = self.branch_if(!self.p.is_set(V))?;
                Ok(2 + extra)
            }
            0x70 => {
                // BVS
                let extra = self.branch_if(self.p.is_set(V))?;
                Ok(2 + extra)
            }
            0x90 => {
                // BCC
                let extra = self.branch_if(!self.p.is_set(C))?;
                Ok(2 + extra)
            }
            0xB0 => {
                // BCS
                let extra = self.branch_if(self.p.is_set(C))?;
                Ok(2 + extra)
            }
            0xD0 => {
                // BNE
                let extra = self.branch_if(!self.p.is_set(Z))?;
                Ok(2 + extra)
            }
            0xF0 => {
                // BEQ
                let extra = self.branch_if(self.p.is_set(Z))?;
                Ok(2 + extra)
            }

            // =================================================================
            // Status flag operations
            // =================================================================
            0x18 => {
                // CLC
                self.p.set_if(C, false);
                Ok(2)
            }
            0x38 => {
                // SEC
                self.p.set_if(C, true);
                Ok(2)
            }
            0x58 => {
                // CLI
                self.p.set_if(I, false);
                Ok(2)
            }
            0x78 => {
                // SEI
                self.p.set_if(I, true);
                Ok(2)
            }
            0xB8 => {
                // CLV
                self.p.set_if(V, false);
                Ok(2)
            }
            0xD8 => {
                // CLD
                self.p.set_if(D, false);
                Ok(2)
            }
            0xF8 => {
                // SED
                self.p.set_if(D, true);
                Ok(2)
            }

            // =================================================================
            // System
            // =================================================================
            0x00 => {
                // BRK - the byte after the opcode is fetched and discarded
                self.fetch()?;
                self.push_word(self.pc)?;
                self.push(self.p.to_stack_brk())?;
                self.pc = self.read_vector(0xFE)?;
                self.p.set_if(I, true);
                Ok(7)
            }

            // NOP and its documented aliases. None of them touch the
            // operand bytes: PC moves past the opcode only, and the
            // absolute,X forms never charge a page-cross penalty.
            0xEA | 0x1A | 0x3A | 0x5A | 0x7A | 0xDA | 0xFA | 0x80 | 0x82 | 0x89 | 0xC2 | 0xE2 => {
                Ok(2)
            }
            0x04 | 0x44 | 0x64 => Ok(3),
            0x0C | 0x14 | 0x34 | 0x54 | 0x74 | 0xD4 | 0xF4 | 0x1C | 0x3C | 0x5C | 0x7C | 0xDC
            | 0xFC => Ok(4),

            // HLT - jam the CPU until reset. The halting step reports no
            // cycles.
            0x02 | 0x12 | 0x22 | 0x32 | 0x42 | 0x52 | 0x62 | 0x72 | 0x92 | 0xB2 | 0xD2 | 0xF2 => {
                self.halted = true;
                Ok(0)
            }

            _ => Err(Error::InvalidOpcode { pc, opcode }),
        }
    }
}

impl<B: Bus> fmt::Debug for Mos6502<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mos6502")
            .field("pc", &self.pc)
            .field("a", &self.a)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("sp", &self.sp)
            .field("p", &self.p)
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

impl<B: Bus> fmt::Display for Mos6502<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mos6502: PC={:02X}{:02X} A={:02X} X={:02X} Y={:02X} [{}] S={:02X}",
            self.pch(),
            self.pcl(),
            self.a,
            self.x,
            self.y,
            self.p,
            self.sp,
        )
    }
}
