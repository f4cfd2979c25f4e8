use crate::error::VmError;
use crate::memory::CHIP8_PROGRAM_ADDR;

pub const REG_COUNT: usize = 16;
pub const STACK_SIZE: usize = 16;

/// index of VF, which doubles as the carry/borrow/collision flag
pub const FLAG: usize = 0xf;

/// CHIP-8 visible machine state, less RAM and the display
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterFile {
    pub v: [u8; REG_COUNT],
    pub i: u16,
    pub delay_timer: u8,
    pub sound_timer: u8,
    pub program_counter: u16,
}

impl RegisterFile {
    pub fn new() -> Self {
        RegisterFile {
            v: [0; REG_COUNT],
            i: 0,
            delay_timer: 0,
            sound_timer: 0,
            program_counter: CHIP8_PROGRAM_ADDR,
        }
    }

    /// VF only ever holds 0 or 1
    pub fn set_flag(&mut self, cond: bool) {
        self.v[FLAG] = cond as u8;
    }

    /// move on by one instruction
    pub fn advance(&mut self) {
        self.program_counter = self.program_counter.wrapping_add(2);
    }

    pub fn skip_if(&mut self, cond: bool) {
        if cond {
            self.advance();
        }
    }

    /// count both timers down by one, as the host does at 60Hz
    pub fn tick_timers(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

/// return addresses for subroutines
///
/// the pointer is bumped before a push and dropped after a pop, so slot 0 is
/// never written and the usable depth is 15
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallStack {
    slots: [u16; STACK_SIZE],
    pointer: u8,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pointer(&self) -> u8 {
        self.pointer
    }

    pub fn slots(&self) -> &[u16; STACK_SIZE] {
        &self.slots
    }

    pub fn push(&mut self, addr: u16) -> Result<(), VmError> {
        if self.pointer as usize + 1 >= STACK_SIZE {
            return Err(VmError::StackOverflow);
        }
        self.pointer += 1;
        self.slots[self.pointer as usize] = addr;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<u16, VmError> {
        if self.pointer == 0 {
            return Err(VmError::StackUnderflow);
        }
        let addr = self.slots[self.pointer as usize];
        self.pointer -= 1;
        Ok(addr)
    }

    /// put the stack into an arbitrary state; for tests and debuggers
    pub fn set(&mut self, pointer: u8, slots: [u16; STACK_SIZE]) {
        self.pointer = pointer.min(STACK_SIZE as u8 - 1);
        self.slots = slots;
    }
}
