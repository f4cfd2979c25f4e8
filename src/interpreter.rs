//! # interpreter
//!
//! fetch, decode, execute. the program counter moves past an instruction
//! *before* it is applied, so jumps and calls set it outright and skips just
//! add another 2.
//!
//! the interpreter is in one of three states:
//!  Running      -- steps as normal
//!  AwaitingKey  -- parked on an `LD Vx, K` until a key turns up; the
//!                  program counter stays on that instruction meanwhile
//!  Halted       -- the program jumped to itself too many times in a row;
//!                  nothing runs any more
//!
//! the host owns the clock: it calls `run` once per frame, ticks the timers
//! and decides what to do with errors.
use crate::display::{FrameBuffer, Renderer};
use crate::error::VmError;
use crate::input::InputSource;
use crate::instruction::{decode, Instruction};
use crate::memory::{Chip8Memory, CHIP8_FONT_ADDR, CHIP8_FONT_GLYPH_BYTES};
use crate::registers::{CallStack, RegisterFile, REG_COUNT, STACK_SIZE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::time::Duration;

/// how much to do per call of `run`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunParams {
    pub instructions_per_call: usize,
    /// wall-clock length of a frame; only the host paces itself by this
    pub frame_duration: Duration,
}

impl Default for RunParams {
    fn default() -> Self {
        RunParams {
            instructions_per_call: 10,
            frame_duration: Duration::from_micros(16_667),
        }
    }
}

impl RunParams {
    /// one instruction at a time, for single-stepping
    pub fn single_step() -> Self {
        RunParams {
            instructions_per_call: 1,
            ..Self::default()
        }
    }
}

/// when to give up on a program that is spinning on the spot
///
/// plenty of programs end with `JP` to themselves; after `self_jump_limit`
/// of those in a row the interpreter halts. `None` spins forever.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HaltPolicy {
    pub self_jump_limit: Option<u32>,
}

impl Default for HaltPolicy {
    fn default() -> Self {
        HaltPolicy {
            self_jump_limit: Some(10),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecState {
    Running,
    AwaitingKey { register: u8 },
    Halted,
}

/// why `run` came back
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// ran the requested number of instructions
    Completed,
    /// parked on `LD Vx, K`
    AwaitingKey,
    Halted,
}

// what the renderer needs to hear about after an instruction
enum Notify {
    Clear,
    Draw,
}

/// everything that is thrown away when a new program is loaded
struct Machine {
    memory: Chip8Memory,
    registers: RegisterFile,
    stack: CallStack,
    framebuffer: FrameBuffer,
    state: ExecState,
    self_jumps: u32,
}

impl Machine {
    fn new(memory: Chip8Memory) -> Self {
        Machine {
            memory,
            registers: RegisterFile::new(),
            stack: CallStack::new(),
            framebuffer: FrameBuffer::new(),
            state: ExecState::Running,
            self_jumps: 0,
        }
    }
}

pub struct Chip8Interpreter<D: Renderer, I: InputSource> {
    machine: Machine,
    display: D,
    input: I,
    policy: HaltPolicy,
    rng: StdRng,
}

impl<D: Renderer, I: InputSource> Chip8Interpreter<D, I> {
    pub fn new(rom: &[u8], display: D, input: I) -> Result<Self, VmError> {
        let machine = Machine::new(Chip8Memory::new(rom)?);
        tracing::info!("Program loaded ({} bytes)", rom.len());
        Ok(Chip8Interpreter {
            machine,
            display,
            input,
            policy: HaltPolicy::default(),
            rng: StdRng::from_entropy(),
        })
    }

    pub fn with_policy(mut self, policy: HaltPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// make `RND` repeatable
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// throw the current machine away and start over with a new program; a
    /// pending key wait goes with it. on error the old machine is kept
    pub fn load_program(&mut self, rom: &[u8]) -> Result<(), VmError> {
        self.install(Chip8Memory::new(rom)?)?;
        tracing::info!("Program loaded ({} bytes)", rom.len());
        Ok(())
    }

    /// load a program from anywhere that can be read
    pub fn load_program_from(&mut self, reader: &mut impl std::io::Read) -> Result<(), VmError> {
        self.install(Chip8Memory::from_reader(reader)?)?;
        tracing::info!("Program loaded");
        Ok(())
    }

    fn install(&mut self, memory: Chip8Memory) -> Result<(), VmError> {
        self.machine = Machine::new(memory);
        self.display.clear()?;
        Ok(())
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }

    pub fn framebuffer(&self) -> &FrameBuffer {
        &self.machine.framebuffer
    }

    pub fn state(&self) -> ExecState {
        self.machine.state
    }

    pub fn is_halted(&self) -> bool {
        self.machine.state == ExecState::Halted
    }

    /// count the timers down; the host calls this at 60Hz
    pub fn tick_timers(&mut self) {
        self.machine.registers.tick_timers();
    }

    /// should the buzzer be on
    pub fn sound_active(&self) -> bool {
        self.machine.registers.sound_timer > 0
    }

    /// run up to `params.instructions_per_call` instructions, stopping early
    /// on a halt or a key wait. errors come back to the caller with the
    /// failing instruction left unexecuted
    pub fn run(&mut self, params: &RunParams) -> Result<RunOutcome, VmError> {
        if let ExecState::AwaitingKey { .. } = self.machine.state {
            if let Some(key) = self.input.request_key()? {
                self.deliver_key(key);
            }
        }
        for _ in 0..params.instructions_per_call {
            if self.machine.state != ExecState::Running {
                break;
            }
            self.step()?;
        }
        Ok(self.outcome())
    }

    /// what a `run` would report right now
    pub fn outcome(&self) -> RunOutcome {
        match self.machine.state {
            ExecState::Running => RunOutcome::Completed,
            ExecState::AwaitingKey { .. } => RunOutcome::AwaitingKey,
            ExecState::Halted => RunOutcome::Halted,
        }
    }

    /// answer a pending `LD Vx, K` and carry on past it; ignored otherwise
    pub fn deliver_key(&mut self, key: u8) {
        if let ExecState::AwaitingKey { register } = self.machine.state {
            let m = &mut self.machine;
            m.registers.v[register as usize] = key & 0xf;
            m.registers.advance();
            m.state = ExecState::Running;
            tracing::debug!("key 0x{:x} delivered to V{:X}", key & 0xf, register);
        }
    }

    /// step over the instruction at the program counter without running it,
    /// for hosts that choose to carry on past a bad instruction
    pub fn skip_instruction(&mut self) {
        if self.machine.state == ExecState::Running {
            self.machine.registers.advance();
        }
    }

    /// execute exactly one instruction, if running
    pub fn step(&mut self) -> Result<(), VmError> {
        if self.machine.state != ExecState::Running {
            return Ok(());
        }
        let pc = self.machine.registers.program_counter;
        let (b1, b2) = self.machine.memory.get_word(pc)?;
        let inst = decode(b1, b2)?;
        tracing::trace!("{:03x}: {:02x}{:02x}  {}", pc, b1, b2, inst);

        self.machine.registers.advance();
        let notify = match self.execute(pc, inst) {
            Ok(notify) => notify,
            Err(e) => {
                // nothing else has been touched yet
                self.machine.registers.program_counter = pc;
                return Err(e);
            }
        };
        match notify {
            Some(Notify::Clear) => self.display.clear()?,
            Some(Notify::Draw) => self.display.draw(self.machine.framebuffer.as_bytes())?,
            None => (),
        }
        Ok(())
    }

    /// apply one instruction; the program counter has already moved past it.
    /// anything that can fail is checked before state is changed
    fn execute(&mut self, pc: u16, inst: Instruction) -> Result<Option<Notify>, VmError> {
        use Instruction::*;

        let m = &mut self.machine;
        let r = &mut m.registers;
        match inst {
            Cls => {
                m.framebuffer.clear();
                return Ok(Some(Notify::Clear));
            }
            Ret => {
                let call_site = m.stack.pop()?;
                r.program_counter = call_site.wrapping_add(2);
            }
            Jp { addr } => {
                if addr == pc {
                    if let Some(limit) = self.policy.self_jump_limit {
                        if m.self_jumps >= limit {
                            tracing::info!("0x{:03x} jumps to itself, halting", pc);
                            m.state = ExecState::Halted;
                        }
                    }
                    m.self_jumps = m.self_jumps.saturating_add(1);
                } else {
                    m.self_jumps = 0;
                }
                r.program_counter = addr;
            }
            Call { addr } => {
                m.stack.push(pc)?;
                r.program_counter = addr;
            }
            SeImm { x, kk } => r.skip_if(r.v[x as usize] == kk),
            SneImm { x, kk } => r.skip_if(r.v[x as usize] != kk),
            SeReg { x, y } => r.skip_if(r.v[x as usize] == r.v[y as usize]),
            SneReg { x, y } => r.skip_if(r.v[x as usize] != r.v[y as usize]),
            LdImm { x, kk } => r.v[x as usize] = kk,
            AddImm { x, kk } => r.v[x as usize] = r.v[x as usize].wrapping_add(kk),
            LdReg { x, y } => r.v[x as usize] = r.v[y as usize],
            Or { x, y } => r.v[x as usize] |= r.v[y as usize],
            And { x, y } => r.v[x as usize] &= r.v[y as usize],
            Xor { x, y } => r.v[x as usize] ^= r.v[y as usize],
            // the flag is written last, so it wins when x is VF
            AddReg { x, y } => {
                let (sum, carry) = r.v[x as usize].overflowing_add(r.v[y as usize]);
                r.v[x as usize] = sum;
                r.set_flag(carry);
            }
            Sub { x, y } => {
                let (vx, vy) = (r.v[x as usize], r.v[y as usize]);
                r.v[x as usize] = vx.wrapping_sub(vy);
                r.set_flag(vx > vy);
            }
            Subn { x, y } => {
                let (vx, vy) = (r.v[x as usize], r.v[y as usize]);
                r.v[x as usize] = vy.wrapping_sub(vx);
                r.set_flag(vy > vx);
            }
            Shr { x } => {
                let vx = r.v[x as usize];
                r.v[x as usize] = vx >> 1;
                r.set_flag(vx & 0x01 != 0);
            }
            Shl { x } => {
                let vx = r.v[x as usize];
                r.v[x as usize] = vx << 1;
                r.set_flag(vx & 0x80 != 0);
            }
            LdI { addr } => r.i = addr,
            JpV0 { addr } => r.program_counter = addr.wrapping_add(r.v[0] as u16),
            Rnd { x, kk } => r.v[x as usize] = self.rng.gen::<u8>() & kk,
            Drw { x, y, n } => {
                let sprite = m.memory.get_ro_slice(r.i, n as usize)?;
                let collision = m.framebuffer.blit_sprite(
                    r.v[x as usize] as usize,
                    r.v[y as usize] as usize,
                    sprite,
                );
                r.set_flag(collision);
                return Ok(Some(Notify::Draw));
            }
            Skp { x } => {
                let keys = self.input.poll_keys()?;
                r.skip_if(keys[(r.v[x as usize] & 0xf) as usize]);
            }
            Sknp { x } => {
                let keys = self.input.poll_keys()?;
                r.skip_if(!keys[(r.v[x as usize] & 0xf) as usize]);
            }
            LdVxDt { x } => r.v[x as usize] = r.delay_timer,
            LdVxK { x } => match self.input.request_key()? {
                Some(key) => r.v[x as usize] = key & 0xf,
                None => {
                    // park on this instruction until a key arrives
                    r.program_counter = pc;
                    m.state = ExecState::AwaitingKey { register: x };
                    tracing::debug!("waiting for a key for V{:X}", x);
                }
            },
            LdDtVx { x } => r.delay_timer = r.v[x as usize],
            LdStVx { x } => r.sound_timer = r.v[x as usize],
            AddIVx { x } => r.i = r.i.wrapping_add(r.v[x as usize] as u16),
            LdFVx { x } => {
                r.i = CHIP8_FONT_ADDR + r.v[x as usize] as u16 * CHIP8_FONT_GLYPH_BYTES
            }
            LdBVx { x } => {
                let vx = r.v[x as usize];
                let digits = m.memory.get_rw_slice(r.i, 3)?;
                digits.copy_from_slice(&[vx / 100, vx / 10 % 10, vx % 10]);
            }
            StoreRegs { x } => {
                let len = x as usize + 1;
                let cells = m.memory.get_rw_slice(r.i, len)?;
                cells.copy_from_slice(&r.v[..len]);
            }
            LoadRegs { x } => {
                let len = x as usize + 1;
                let cells = m.memory.get_ro_slice(r.i, len)?;
                r.v[..len].copy_from_slice(cells);
            }
        }
        Ok(None)
    }

    /// read-only view of the machine for debuggers and tracing
    pub fn snapshot(&self) -> VmSnapshot {
        let m = &self.machine;
        let r = &m.registers;
        let next = match m.memory.get_word(r.program_counter) {
            Ok((b1, b2)) => match decode(b1, b2) {
                Ok(inst) => inst.to_string(),
                Err(e) => e.to_string(),
            },
            Err(e) => e.to_string(),
        };
        VmSnapshot {
            program_counter: r.program_counter,
            stack_pointer: m.stack.pointer(),
            i: r.i,
            delay_timer: r.delay_timer,
            sound_timer: r.sound_timer,
            registers: r.v,
            stack: *m.stack.slots(),
            halted: m.state == ExecState::Halted,
            awaiting_key: match m.state {
                ExecState::AwaitingKey { register } => Some(register),
                _ => None,
            },
            next,
        }
    }
}

/// a copy of the machine state at one moment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmSnapshot {
    pub program_counter: u16,
    pub stack_pointer: u8,
    pub i: u16,
    pub delay_timer: u8,
    pub sound_timer: u8,
    pub registers: [u8; REG_COUNT],
    pub stack: [u16; STACK_SIZE],
    pub halted: bool,
    /// the register a pending key wait will load
    pub awaiting_key: Option<u8>,
    /// disassembly of the instruction at the program counter
    pub next: String,
}

impl fmt::Display for VmSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "PC {:03x}  SP {:x}  I {:03x}  DT {:02x}  ST {:02x}{}{}",
            self.program_counter,
            self.stack_pointer,
            self.i,
            self.delay_timer,
            self.sound_timer,
            if self.halted { "  HALTED" } else { "" },
            match self.awaiting_key {
                Some(x) => format!("  WAIT V{:X}", x),
                None => String::new(),
            }
        )?;
        for (n, v) in self.registers.iter().enumerate() {
            write!(f, "V{:X}={:02x}", n, v)?;
            f.write_str(if n % 8 == 7 { "\n" } else { " " })?;
        }
        write!(f, "{:03x}: {}", self.program_counter, self.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{DummyDisplay, SCREEN_BUFFER_SIZE};
    use crate::input::DummyInput;

    type TestVm = Chip8Interpreter<DummyDisplay, DummyInput>;

    fn vm_with(rom: &[u8]) -> TestVm {
        Chip8Interpreter::new(rom, DummyDisplay::new(), DummyInput::new(&[])).unwrap()
    }

    fn regs(vm: &mut TestVm) -> &mut RegisterFile {
        &mut vm.machine.registers
    }

    fn pc(vm: &TestVm) -> u16 {
        vm.machine.registers.program_counter
    }

    #[test]
    fn test_program_load_ok() -> Result<(), VmError> {
        let mut prog: &[u8] = &[0x00, 0xe0]; // clear screen
        let mut vm = vm_with(&[]);
        vm.load_program_from(&mut prog)?;
        assert_eq!(vm.machine.memory.get_word(0x200)?, (0x00, 0xe0));
        assert_eq!(vm.display().clears, 1);
        Ok(())
    }

    #[test]
    fn test_rom_too_large() {
        let rom = vec![0; 0xe00];
        let vm = Chip8Interpreter::new(&rom, DummyDisplay::new(), DummyInput::new(&[]));
        assert!(matches!(vm, Err(VmError::RomTooLarge { .. })));
    }

    #[test]
    fn test_failed_load_keeps_old_machine() {
        let mut vm = vm_with(&[0x6a, 0xff]);
        assert!(vm.load_program(&vec![0; 0xe00]).is_err());
        let mut too_big: &[u8] = &[0; 0xe00];
        assert!(vm.load_program_from(&mut too_big).is_err());
        vm.step().unwrap();
        assert_eq!(vm.machine.registers.v[0xa], 0xff);
    }

    // OPCODES

    #[test]
    fn op_0nnn_is_invalid() {
        let mut vm = vm_with(&[0x01, 0x23]);
        assert_eq!(
            vm.step(),
            Err(VmError::InvalidOpcode { group: 0, sub: 0x23 })
        );
        assert_eq!(pc(&vm), 0x200);
    }

    #[test]
    fn op_00e0() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x00, 0xe0]);
        vm.machine.framebuffer.blit_sprite(0, 0, &[0xff]);
        vm.step()?;
        assert_eq!(vm.framebuffer().as_bytes(), &[0; SCREEN_BUFFER_SIZE]);
        assert_eq!(vm.display().clears, 1);
        assert_eq!(pc(&vm), 0x202);
        Ok(())
    }

    #[test]
    fn op_00ee() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x00, 0xee]);
        let mut slots = [0; STACK_SIZE];
        slots[1] = 0xabc;
        vm.machine.stack.set(1, slots);
        vm.step()?;
        assert_eq!(pc(&vm), 0xabc + 2);
        assert_eq!(vm.machine.stack.pointer(), 0);
        Ok(())
    }

    #[test]
    fn op_00ee_empty_stack() {
        let mut vm = vm_with(&[0x00, 0xee]);
        assert_eq!(vm.step(), Err(VmError::StackUnderflow));
        assert_eq!(pc(&vm), 0x200);
    }

    #[test]
    fn op_1nnn() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x1a, 0xbc]);
        vm.step()?;
        assert_eq!(pc(&vm), 0xabc);
        Ok(())
    }

    #[test]
    fn op_2nnn() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x22, 0x04, 0x00, 0x00, 0x00, 0xee]);
        vm.step()?;
        assert_eq!(pc(&vm), 0x204);
        assert_eq!(vm.machine.stack.pointer(), 1);
        assert_eq!(vm.machine.stack.slots()[1], 0x200);
        vm.step()?;
        assert_eq!(pc(&vm), 0x202);
        assert_eq!(vm.machine.stack.pointer(), 0);
        Ok(())
    }

    #[test]
    fn op_2nnn_overflow() {
        // calls itself forever
        let mut vm = vm_with(&[0x22, 0x00]);
        for _ in 0..15 {
            vm.step().unwrap();
        }
        assert_eq!(vm.step(), Err(VmError::StackOverflow));
        assert_eq!(pc(&vm), 0x200);
        assert_eq!(vm.machine.stack.pointer(), 15);
    }

    #[test]
    fn op_3xkk_4xkk() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x31, 0xff, 0, 0, 0x32, 0xab, 0x41, 0xab, 0, 0, 0x42, 0xff]);
        regs(&mut vm).v[1] = 0xff;
        regs(&mut vm).v[2] = 0xcd;
        vm.step()?;
        assert_eq!(pc(&vm), 0x204);
        vm.step()?;
        assert_eq!(pc(&vm), 0x206);
        vm.step()?;
        assert_eq!(pc(&vm), 0x20a);
        vm.step()?;
        assert_eq!(pc(&vm), 0x20e);
        Ok(())
    }

    #[test]
    fn op_5xy0() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x51, 0x20, 0, 0, 0x5a, 0xb0, 0x5c, 0xc1]);
        regs(&mut vm).v[1] = 0xaa;
        regs(&mut vm).v[2] = 0xaa;
        regs(&mut vm).v[0xa] = 0x12;
        regs(&mut vm).v[0xb] = 0x34;
        vm.step()?;
        assert_eq!(pc(&vm), 0x204);
        vm.step()?;
        assert_eq!(pc(&vm), 0x206);
        assert_eq!(vm.step(), Err(VmError::InvalidOpcode { group: 5, sub: 1 }));
        assert_eq!(pc(&vm), 0x206);
        Ok(())
    }

    #[test]
    fn op_6xkk() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x6a, 0xff]);
        vm.step()?;
        assert_eq!(vm.machine.registers.v[0xa], 0xff);
        assert_eq!(pc(&vm), 0x202);
        Ok(())
    }

    #[test]
    fn op_7xkk() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x7a, 0x02]);
        regs(&mut vm).v[0xa] = 3;
        regs(&mut vm).v[0xf] = 0xa;
        vm.step()?;
        assert_eq!(vm.machine.registers.v[0xa], 5);
        // VF not affected
        assert_eq!(vm.machine.registers.v[0xf], 0xa);
        Ok(())
    }

    #[test]
    fn op_7xkk_overflow() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x78, 0x11]);
        regs(&mut vm).v[8] = 0xf0;
        vm.step()?;
        assert_eq!(vm.machine.registers.v[8], 0x01);
        assert_eq!(vm.machine.registers.v[0xf], 0);
        Ok(())
    }

    /// run `81 2z` once with V1 = a, V2 = b; returns (V1, VF)
    fn alu(z: u8, a: u8, b: u8) -> (u8, u8) {
        let mut vm = vm_with(&[0x81, 0x20 | z]);
        regs(&mut vm).v[1] = a;
        regs(&mut vm).v[2] = b;
        vm.step().unwrap();
        let r = &vm.machine.registers;
        (r.v[1], r.v[0xf])
    }

    #[test]
    fn op_8xyz_logic() {
        assert_eq!(alu(0x0, 0, 128).0, 128);
        assert_eq!(alu(0x1, 0b0101, 0b0010).0, 0b0111);
        assert_eq!(alu(0x2, 0b1101, 0b1010).0, 0b1000);
        assert_eq!(alu(0x3, 0b1101, 0b1010).0, 0b0111);
    }

    #[test]
    fn op_8xy4() {
        assert_eq!(alu(0x4, 1, 7), (8, 0));
        assert_eq!(alu(0x4, 255, 255), (0b1111_1110, 1));
        assert_eq!(alu(0x4, 255, 1), (0, 1));
    }

    #[test]
    fn op_8xy5() {
        assert_eq!(alu(0x5, 5, 7), (0b1111_1110, 0));
        assert_eq!(alu(0x5, 7, 5), (0b10, 1));
        // equal operands borrow nothing but still clear the flag
        assert_eq!(alu(0x5, 9, 9), (0, 0));
    }

    #[test]
    fn op_8xy6() {
        assert_eq!(alu(0x6, 0b1110, 0xff), (0b0111, 0));
        assert_eq!(alu(0x6, 0b1111, 0), (0b0111, 1));
    }

    #[test]
    fn op_8xy7() {
        assert_eq!(alu(0x7, 7, 5), (0b1111_1110, 0));
        assert_eq!(alu(0x7, 5, 7), (0b10, 1));
    }

    #[test]
    fn op_8xye() {
        assert_eq!(alu(0xe, 0b0111, 0), (0b1110, 0));
        assert_eq!(alu(0xe, 0b1111_1111, 0), (0b1111_1110, 1));
    }

    #[test]
    fn op_8xy4_into_vf() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x8f, 0x14]);
        regs(&mut vm).v[0xf] = 200;
        regs(&mut vm).v[1] = 100;
        vm.step()?;
        assert_eq!(vm.machine.registers.v[0xf], 1);
        Ok(())
    }

    #[test]
    fn op_8fy5_flag_wins() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x8f, 0x15]);
        regs(&mut vm).v[0xf] = 200;
        regs(&mut vm).v[1] = 100;
        vm.step()?;
        // 200 - 100 would be 100
        assert_eq!(vm.machine.registers.v[0xf], 1);
        Ok(())
    }

    #[test]
    fn op_8fy7_flag_wins() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x8f, 0x17]);
        regs(&mut vm).v[0xf] = 200;
        regs(&mut vm).v[1] = 100;
        vm.step()?;
        // 100 - 200 would be 156, with a borrow
        assert_eq!(vm.machine.registers.v[0xf], 0);
        Ok(())
    }

    #[test]
    fn op_8f06_flag_wins() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x8f, 0x06, 0x8f, 0x06]);
        regs(&mut vm).v[0xf] = 0x03;
        vm.step()?;
        assert_eq!(vm.machine.registers.v[0xf], 1);
        regs(&mut vm).v[0xf] = 0x80;
        vm.step()?;
        // 0x80 >> 1 would be 0x40
        assert_eq!(vm.machine.registers.v[0xf], 0);
        Ok(())
    }

    #[test]
    fn op_8f0e_flag_wins() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x8f, 0x0e, 0x8f, 0x0e]);
        regs(&mut vm).v[0xf] = 0x81;
        vm.step()?;
        assert_eq!(vm.machine.registers.v[0xf], 1);
        regs(&mut vm).v[0xf] = 0x01;
        vm.step()?;
        // 0x01 << 1 would be 0x02
        assert_eq!(vm.machine.registers.v[0xf], 0);
        Ok(())
    }

    #[test]
    fn op_9xy0() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x91, 0x20, 0, 0, 0x9a, 0xb0]);
        regs(&mut vm).v[1] = 0x12;
        regs(&mut vm).v[2] = 0x34;
        regs(&mut vm).v[0xa] = 0xaa;
        regs(&mut vm).v[0xb] = 0xaa;
        vm.step()?;
        assert_eq!(pc(&vm), 0x204);
        vm.step()?;
        assert_eq!(pc(&vm), 0x206);
        Ok(())
    }

    #[test]
    fn op_annn_bnnn() -> Result<(), VmError> {
        let mut vm = vm_with(&[0xa2, 0xc5, 0xba, 0xbc]);
        vm.step()?;
        assert_eq!(vm.machine.registers.i, 0x2c5);
        regs(&mut vm).v[0] = 0xff;
        vm.step()?;
        assert_eq!(pc(&vm), 0xabc + 0xff);
        Ok(())
    }

    #[test]
    fn op_cxkk() -> Result<(), VmError> {
        let mut vm = vm_with(&[0xc1, 0x0f, 0xc2, 0x00]).with_seed(8);
        regs(&mut vm).v[2] = 0x55;
        vm.step()?;
        vm.step()?;
        assert!(vm.machine.registers.v[1] <= 0x0f);
        assert_eq!(vm.machine.registers.v[2], 0);
        Ok(())
    }

    #[test]
    fn op_dxyn_font_glyph() -> Result<(), VmError> {
        // draw the "0" glyph at (12, 8), then draw it again
        let mut vm = vm_with(&[0x60, 0x0c, 0x61, 0x08, 0xd0, 0x15, 0xd0, 0x15]);
        regs(&mut vm).v[0xf] = 1;
        for _ in 0..3 {
            vm.step()?;
        }
        assert_eq!(vm.machine.registers.v[0xf], 0);
        assert!(vm.framebuffer().get(12, 8));
        assert!(vm.framebuffer().get(15, 9));
        assert!(!vm.framebuffer().get(13, 9));
        assert_eq!(vm.display().draws, 1);
        assert_eq!(vm.display().last_frame, vm.framebuffer().as_bytes().to_vec());

        vm.step()?;
        assert_eq!(vm.machine.registers.v[0xf], 1);
        assert_eq!(vm.framebuffer().lit_pixels().count(), 0);
        assert_eq!(vm.display().draws, 2);
        Ok(())
    }

    #[test]
    fn op_dxyn_out_of_range() {
        let mut vm = vm_with(&[0xaf, 0xfc, 0xd0, 0x1f]);
        vm.step().unwrap();
        assert!(matches!(vm.step(), Err(VmError::AddressOutOfRange(_))));
        assert_eq!(pc(&vm), 0x202);
        assert_eq!(vm.display().draws, 0);
    }

    #[test]
    fn op_ex9e_exa1() -> Result<(), VmError> {
        let rom = [0xe1, 0x9e, 0, 0, 0xe2, 0xa1, 0, 0, 0xe1, 0xa1];
        let mut vm = Chip8Interpreter::new(&rom, DummyDisplay::new(), DummyInput::new(&[0xb]))?;
        regs(&mut vm).v[1] = 0xb;
        regs(&mut vm).v[2] = 0x3;
        vm.step()?;
        assert_eq!(pc(&vm), 0x204);
        vm.step()?;
        assert_eq!(pc(&vm), 0x208);
        vm.step()?;
        assert_eq!(pc(&vm), 0x20a);
        // asked every time, never cached
        assert_eq!(vm.input().polls, 3);
        Ok(())
    }

    #[test]
    fn op_fx0a_with_key_ready() -> Result<(), VmError> {
        let input = DummyInput::new(&[]).with_queued(&[12]);
        let mut vm = Chip8Interpreter::new(&[0xf1, 0x0a], DummyDisplay::new(), input)?;
        vm.step()?;
        assert_eq!(vm.machine.registers.v[1], 12);
        assert_eq!(pc(&vm), 0x202);
        assert_eq!(vm.state(), ExecState::Running);
        Ok(())
    }

    #[test]
    fn op_fx0a_suspends_until_key() -> Result<(), VmError> {
        let mut vm = vm_with(&[0xf1, 0x0a, 0x62, 0x07]);
        let params = RunParams::default();
        assert_eq!(vm.run(&params)?, RunOutcome::AwaitingKey);
        assert_eq!(pc(&vm), 0x200);
        assert_eq!(vm.snapshot().awaiting_key, Some(1));
        assert_eq!(vm.snapshot().next, "LD   V1  K");

        // still nothing pressed
        assert_eq!(vm.run(&params)?, RunOutcome::AwaitingKey);
        assert_eq!(vm.input().requests, 2);

        vm.input_mut().queued.push_back(0x7);
        assert_eq!(vm.run(&RunParams::single_step())?, RunOutcome::Completed);
        assert_eq!(vm.machine.registers.v[1], 0x7);
        assert_eq!(vm.machine.registers.v[2], 0x7);
        Ok(())
    }

    #[test]
    fn op_fx0a_deliver_key() -> Result<(), VmError> {
        let mut vm = vm_with(&[0xf5, 0x0a]);
        vm.step()?;
        assert_eq!(vm.state(), ExecState::AwaitingKey { register: 5 });
        // steps do nothing while parked
        vm.step()?;
        assert_eq!(pc(&vm), 0x200);
        vm.deliver_key(0x1e);
        assert_eq!(vm.machine.registers.v[5], 0xe);
        assert_eq!(pc(&vm), 0x202);
        assert_eq!(vm.state(), ExecState::Running);
        Ok(())
    }

    #[test]
    fn op_fx0a_cancelled_by_load() -> Result<(), VmError> {
        let mut vm = vm_with(&[0xf5, 0x0a]);
        vm.step()?;
        vm.load_program(&[0x6a, 0x01])?;
        assert_eq!(vm.state(), ExecState::Running);
        vm.step()?;
        assert_eq!(vm.machine.registers.v[0xa], 1);
        Ok(())
    }

    #[test]
    fn op_fx_timers() -> Result<(), VmError> {
        let mut vm = vm_with(&[0xf1, 0x15, 0xf2, 0x18, 0xf3, 0x07]);
        regs(&mut vm).v[1] = 0xaa;
        regs(&mut vm).v[2] = 0x02;
        vm.step()?;
        vm.step()?;
        assert!(vm.sound_active());
        vm.tick_timers();
        vm.step()?;
        assert_eq!(vm.machine.registers.v[3], 0xa9);
        vm.tick_timers();
        assert!(!vm.sound_active());
        Ok(())
    }

    #[test]
    fn op_fx1e_fx29() -> Result<(), VmError> {
        let mut vm = vm_with(&[0xf1, 0x1e, 0xf2, 0x29]);
        regs(&mut vm).i = 0x100;
        regs(&mut vm).v[1] = 0x22;
        regs(&mut vm).v[2] = 0xa;
        vm.step()?;
        assert_eq!(vm.machine.registers.i, 0x122);
        vm.step()?;
        assert_eq!(vm.machine.registers.i, 50);
        Ok(())
    }

    #[test]
    fn op_fx33() -> Result<(), VmError> {
        let mut vm = vm_with(&[0xf1, 0x33]);
        regs(&mut vm).i = 0x300;
        regs(&mut vm).v[1] = 254;
        vm.step()?;
        assert_eq!(vm.machine.memory.get_ro_slice(0x300, 3)?, &[2, 5, 4]);
        Ok(())
    }

    #[test]
    fn op_fx55_fx65() -> Result<(), VmError> {
        let mut vm = vm_with(&[0xf3, 0x55, 0xa3, 0x10, 0xf2, 0x65]);
        regs(&mut vm).i = 0x300;
        regs(&mut vm).v[..5].copy_from_slice(&[1, 2, 3, 4, 5]);
        vm.step()?;
        // inclusive of V3, and I is left alone
        assert_eq!(vm.machine.memory.get_ro_slice(0x300, 5)?, &[1, 2, 3, 4, 0]);
        assert_eq!(vm.machine.registers.i, 0x300);

        vm.machine.memory.write_byte(0x310, 0xaa)?;
        vm.machine.memory.write_byte(0x311, 0xbb)?;
        vm.machine.memory.write_byte(0x312, 0xcc)?;
        vm.step()?;
        vm.step()?;
        assert_eq!(vm.machine.registers.v[..4], [0xaa, 0xbb, 0xcc, 4]);
        Ok(())
    }

    #[test]
    fn op_fx55_out_of_range_writes_nothing() {
        let mut vm = vm_with(&[0xff, 0x55]);
        regs(&mut vm).i = 0xffa;
        regs(&mut vm).v = [0x11; REG_COUNT];
        assert!(vm.step().is_err());
        assert_eq!(vm.machine.memory.read_byte(0xffa).unwrap(), 0);
    }

    // ENGINE

    #[test]
    fn test_self_jump_halts_on_eleventh() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x12, 0x00]);
        for _ in 0..10 {
            vm.step()?;
            assert!(!vm.is_halted());
        }
        vm.step()?;
        assert!(vm.is_halted());
        assert!(vm.snapshot().halted);
        assert_eq!(vm.run(&RunParams::default())?, RunOutcome::Halted);
        Ok(())
    }

    #[test]
    fn test_self_jump_count_resets() -> Result<(), VmError> {
        // 202 and 204 jump to each other, neither to itself
        let mut vm = vm_with(&[0x12, 0x02, 0x12, 0x04, 0x12, 0x02]);
        let outcome = vm.run(&RunParams {
            instructions_per_call: 500,
            ..RunParams::default()
        })?;
        assert_eq!(outcome, RunOutcome::Completed);
        Ok(())
    }

    #[test]
    fn test_halt_policy_off() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x12, 0x00]).with_policy(HaltPolicy {
            self_jump_limit: None,
        });
        let params = RunParams {
            instructions_per_call: 100,
            ..RunParams::default()
        };
        assert_eq!(vm.run(&params)?, RunOutcome::Completed);
        Ok(())
    }

    #[test]
    fn test_run_counts_instructions() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x70, 0x01, 0x12, 0x00]).with_policy(HaltPolicy {
            self_jump_limit: None,
        });
        vm.run(&RunParams {
            instructions_per_call: 1,
            ..RunParams::default()
        })?;
        assert_eq!(vm.machine.registers.v[0], 1);
        assert_eq!(pc(&vm), 0x202);
        vm.run(&RunParams::single_step())?;
        assert_eq!(pc(&vm), 0x200);
        Ok(())
    }

    #[test]
    fn test_run_surfaces_errors() {
        let mut vm = vm_with(&[0x60, 0x05, 0x81, 0x2f]);
        let result = vm.run(&RunParams::default());
        assert_eq!(result, Err(VmError::InvalidOpcode { group: 8, sub: 0xf }));
        // the good instruction stuck, the bad one did nothing
        assert_eq!(vm.machine.registers.v[0], 5);
        assert_eq!(pc(&vm), 0x202);
        assert_eq!(vm.state(), ExecState::Running);
    }

    #[test]
    fn test_skip_bad_instruction() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x81, 0x2f, 0x6a, 0x01]);
        assert!(vm.step().is_err());
        vm.skip_instruction();
        vm.step()?;
        assert_eq!(vm.machine.registers.v[0xa], 1);
        Ok(())
    }

    #[test]
    fn test_fetch_past_end_of_ram() {
        let mut vm = vm_with(&[0x1f, 0xfe]);
        vm.step().unwrap();
        assert_eq!(vm.step(), Err(VmError::AddressOutOfRange(0xfff)));
    }

    #[test]
    fn test_snapshot() -> Result<(), VmError> {
        let mut vm = vm_with(&[0x6a, 0x42, 0x22, 0x10]);
        vm.step()?;
        let s = vm.snapshot();
        assert_eq!(s.program_counter, 0x202);
        assert_eq!(s.registers[0xa], 0x42);
        assert_eq!(s.next, "CALL 210");
        vm.step()?;
        let s = vm.snapshot();
        assert_eq!(s.stack_pointer, 1);
        assert_eq!(s.stack[1], 0x202);
        // memory at 0x210 is empty, which is not an instruction
        assert!(s.next.contains("invalid"));
        let text = s.to_string();
        assert!(text.starts_with("PC 210  SP 1"));
        assert!(text.contains("VA=42"));
        Ok(())
    }
}
