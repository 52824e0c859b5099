//! Reset, interrupt, halt, and error-path tests.

use mos_6502::{flags, Bus, BusFault, Error, Mos6502};

struct TestBus {
    memory: Box<[u8; 0x10000]>,
}

impl TestBus {
    fn new() -> Self {
        Self {
            memory: Box::new([0; 0x10000]),
        }
    }

    fn load(&mut self, addr: u16, data: &[u8]) {
        for (i, &b) in data.iter().enumerate() {
            self.memory[usize::from(addr) + i] = b;
        }
    }

    fn peek(&self, addr: u16) -> u8 {
        self.memory[usize::from(addr)]
    }
}

impl Bus for TestBus {
    fn read(&mut self, lo: u8, hi: u8) -> Result<u8, BusFault> {
        Ok(self.memory[usize::from(u16::from_le_bytes([lo, hi]))])
    }

    fn write(&mut self, lo: u8, hi: u8, value: u8) -> Result<(), BusFault> {
        self.memory[usize::from(u16::from_le_bytes([lo, hi]))] = value;
        Ok(())
    }
}

/// RAM everywhere except one page that aborts every access.
struct HoleBus {
    memory: Box<[u8; 0x10000]>,
    hole: u8,
}

impl HoleBus {
    fn new(hole: u8) -> Self {
        Self {
            memory: Box::new([0; 0x10000]),
            hole,
        }
    }
}

impl Bus for HoleBus {
    fn read(&mut self, lo: u8, hi: u8) -> Result<u8, BusFault> {
        if hi == self.hole {
            return Err(BusFault::new(format!("unmapped read at {hi:02X}{lo:02X}")));
        }
        Ok(self.memory[usize::from(u16::from_le_bytes([lo, hi]))])
    }

    fn write(&mut self, lo: u8, hi: u8, value: u8) -> Result<(), BusFault> {
        if hi == self.hole {
            return Err(BusFault::new(format!(
                "unmapped write at {hi:02X}{lo:02X}"
            )));
        }
        self.memory[usize::from(u16::from_le_bytes([lo, hi]))] = value;
        Ok(())
    }
}

/// A bus with nothing attached at all.
struct DeadBus;

impl Bus for DeadBus {
    fn read(&mut self, _lo: u8, _hi: u8) -> Result<u8, BusFault> {
        Err(BusFault::new("open bus"))
    }

    fn write(&mut self, _lo: u8, _hi: u8, _value: u8) -> Result<(), BusFault> {
        Err(BusFault::new("open bus"))
    }
}

fn cpu_with_program(program: &[u8]) -> Mos6502<TestBus> {
    let mut bus = TestBus::new();
    bus.load(0xFFFC, &[0x00, 0x04]);
    bus.load(0x0400, program);
    Mos6502::new(bus).expect("test bus does not fault")
}

// =============================================================================
// Creation and reset
// =============================================================================

#[test]
fn create_loads_pc_from_reset_vector() {
    let mut bus = TestBus::new();
    bus.load(0xFFFC, &[0x34, 0x12]);
    let cpu = Mos6502::new(bus).expect("vector is readable");
    assert_eq!(cpu.pc(), 0x1234);
    assert_eq!(cpu.pcl(), 0x34);
    assert_eq!(cpu.pch(), 0x12);
    assert_eq!(cpu.sp(), 0xFF);
    assert_eq!((cpu.a(), cpu.x(), cpu.y()), (0, 0, 0));
    assert_eq!(cpu.status(), 0x00, "all flags start clear");
}

#[test]
fn create_fails_when_reset_vector_is_unreadable() {
    let err = Mos6502::new(DeadBus).expect_err("vector read must fail");
    assert_eq!(err.message(), "open bus");
}

#[test]
fn reset_is_idempotent() {
    let mut cpu = cpu_with_program(&[0xA9, 0x80, 0x38, 0xF8]);
    for _ in 0..3 {
        cpu.step().unwrap();
    }
    cpu.reset().unwrap();
    cpu.reset().unwrap();
    assert_eq!(cpu.pc(), 0x0400);
    assert_eq!(cpu.a(), 0);
    assert_eq!(cpu.status(), 0, "reset clears D, C and the rest");
    assert_eq!(cpu.sp(), 0xFF);
}

#[test]
fn set_pc_overwrites_both_halves() {
    let mut cpu = cpu_with_program(&[]);
    cpu.set_pc(0xCD, 0xAB);
    assert_eq!(cpu.pc(), 0xABCD);
}

#[test]
fn set_status_masks_stack_only_bits() {
    let mut cpu = cpu_with_program(&[]);
    cpu.set_status(0xFF);
    assert_eq!(cpu.status(), 0xCF, "U and B are not live flags");
}

// =============================================================================
// Halt latch
// =============================================================================

#[test]
fn hlt_latches_until_reset() {
    let mut cpu = cpu_with_program(&[0x02]);
    assert_eq!(cpu.step(), Err(Error::Halted), "the halting step reports it");
    assert_eq!(cpu.pc(), 0x0401, "the opcode fetch still happened");
    assert!(cpu.is_halted());

    assert_eq!(cpu.step(), Err(Error::Halted), "sticky on every later step");
    assert_eq!(cpu.pc(), 0x0401, "a halted CPU does not move");

    // Replace the jam with a NOP, reset, and the CPU runs again.
    cpu.bus_mut().load(0x0400, &[0xEA]);
    cpu.reset().unwrap();
    assert!(!cpu.is_halted());
    assert_eq!(cpu.step(), Ok(2));
}

#[test]
fn every_hlt_alias_jams() {
    for opcode in [
        0x02, 0x12, 0x22, 0x32, 0x42, 0x52, 0x62, 0x72, 0x92, 0xB2, 0xD2, 0xF2,
    ] {
        let mut cpu = cpu_with_program(&[opcode]);
        assert_eq!(
            cpu.step(),
            Err(Error::Halted),
            "opcode {opcode:02X} should jam the CPU"
        );
    }
}

// =============================================================================
// Invalid opcodes
// =============================================================================

#[test]
fn invalid_opcode_reports_address_and_byte() {
    let mut cpu = cpu_with_program(&[0x9E]);
    let err = cpu.step().expect_err("no handler for 9E");
    assert_eq!(
        err,
        Error::InvalidOpcode {
            pc: 0x0400,
            opcode: 0x9E
        }
    );
    assert_eq!(format!("{err}"), "invalid op code: 0400: 9E");
}

#[test]
fn invalid_opcode_leaves_the_cpu_running() {
    let mut cpu = cpu_with_program(&[0x9C, 0xEA]);
    assert!(cpu.step().is_err());
    assert!(!cpu.is_halted());
    assert_eq!(cpu.pc(), 0x0401, "PC advanced past the bad opcode");
    assert_eq!(cpu.step(), Ok(2), "stepping past is allowed");
}

#[test]
fn unassigned_column_opcodes_are_invalid() {
    for opcode in [0x03, 0x07, 0x0B, 0x0F, 0x93, 0x9B, 0x9F, 0xEB, 0xFF] {
        let mut cpu = cpu_with_program(&[opcode]);
        assert!(
            matches!(cpu.step(), Err(Error::InvalidOpcode { opcode: o, .. }) if o == opcode),
            "opcode {opcode:02X} has no handler"
        );
    }
}

// =============================================================================
// Bus faults
// =============================================================================

#[test]
fn bus_fault_on_read_surfaces_the_message() {
    let mut bus = HoleBus::new(0x20);
    bus.memory[0xFFFC] = 0x00;
    bus.memory[0xFFFD] = 0x04;
    // LDA $2000 hits the hole.
    bus.memory[0x0400] = 0xAD;
    bus.memory[0x0401] = 0x00;
    bus.memory[0x0402] = 0x20;
    bus.memory[0x0403] = 0xEA;
    let mut cpu = Mos6502::new(bus).unwrap();

    let err = cpu.step().expect_err("read aborts");
    assert_eq!(err, Error::Bus(BusFault::new("unmapped read at 2000")));
    assert_eq!(format!("{err}"), "unmapped read at 2000");

    // Not sticky: the CPU keeps running from wherever the fault left PC.
    assert!(!cpu.is_halted());
    assert_eq!(cpu.pc(), 0x0403, "operand fetches had already happened");
    assert_eq!(cpu.step(), Ok(2));
}

#[test]
fn bus_fault_on_write_keeps_partial_state() {
    let mut bus = HoleBus::new(0x20);
    bus.memory[0xFFFC] = 0x00;
    bus.memory[0xFFFD] = 0x04;
    // LDA #$55; STA $2000
    bus.memory[0x0400] = 0xA9;
    bus.memory[0x0401] = 0x55;
    bus.memory[0x0402] = 0x8D;
    bus.memory[0x0403] = 0x00;
    bus.memory[0x0404] = 0x20;
    let mut cpu = Mos6502::new(bus).unwrap();

    cpu.step().unwrap();
    let err = cpu.step().expect_err("write aborts");
    assert_eq!(format!("{err}"), "unmapped write at 2000");
    assert_eq!(cpu.a(), 0x55, "earlier work survives the fault");
}

// =============================================================================
// Interrupts
// =============================================================================

#[test]
fn nmi_pushes_state_and_takes_its_vector() {
    let mut cpu = cpu_with_program(&[]);
    cpu.bus_mut().load(0xFFFA, &[0x12, 0x34]);
    cpu.nmi().unwrap();
    assert_eq!(cpu.pc(), 0x3412);
    assert_eq!(cpu.sp(), 0xFC);
    assert_eq!(cpu.bus().peek(0x01FF), 0x04, "pushed PCH");
    assert_eq!(cpu.bus().peek(0x01FE), 0x00, "pushed PCL");
    assert_eq!(
        cpu.bus().peek(0x01FD),
        0x20,
        "pushed status has U set, B clear"
    );
    assert!(cpu.status() & flags::I != 0, "NMI masks IRQs");
}

#[test]
fn nmi_ignores_the_interrupt_mask() {
    let mut cpu = cpu_with_program(&[]);
    cpu.bus_mut().load(0xFFFA, &[0x12, 0x34]);
    cpu.set_status(flags::I);
    cpu.nmi().unwrap();
    assert_eq!(cpu.pc(), 0x3412);
}

#[test]
fn irq_respects_the_interrupt_mask() {
    let mut cpu = cpu_with_program(&[]);
    cpu.bus_mut().load(0xFFFE, &[0x12, 0x34]);

    cpu.set_status(flags::I);
    cpu.irq().unwrap();
    assert_eq!(cpu.pc(), 0x0400, "masked IRQ is ignored");
    assert_eq!(cpu.sp(), 0xFF, "nothing was pushed");

    cpu.set_status(0);
    cpu.irq().unwrap();
    assert_eq!(cpu.pc(), 0x3412);
    assert_eq!(cpu.sp(), 0xFC);
    assert!(cpu.status() & flags::I != 0);
}

#[test]
fn irq_return_round_trip() {
    // IRQ into a handler that ends with RTI resumes exactly where it left.
    let mut cpu = cpu_with_program(&[0xA9, 0x05, 0xEA]);
    cpu.bus_mut().load(0xFFFE, &[0x00, 0x80]);
    cpu.bus_mut().load(0x8000, &[0x40]);
    cpu.step().unwrap();

    cpu.irq().unwrap();
    assert_eq!(cpu.pc(), 0x8000);
    cpu.step().unwrap();
    assert_eq!(cpu.pc(), 0x0402, "back at the interrupted instruction");
    assert_eq!(cpu.a(), 0x05);
    assert!(
        cpu.status() & flags::I == 0,
        "RTI restored the pre-interrupt mask"
    );
    assert_eq!(cpu.step(), Ok(2), "execution continues");
}

// =============================================================================
// Observable string form
// =============================================================================

#[test]
fn display_shows_registers_and_flags() {
    let mut cpu = cpu_with_program(&[0xA9, 0x80, 0x38]);
    assert_eq!(
        format!("{cpu}"),
        "mos6502: PC=0400 A=00 X=00 Y=00 [------] S=FF"
    );
    cpu.step().unwrap();
    cpu.step().unwrap();
    assert_eq!(
        format!("{cpu}"),
        "mos6502: PC=0403 A=80 X=00 Y=00 [N----C] S=FF"
    );
}
