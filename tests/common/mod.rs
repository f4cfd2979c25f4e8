#![allow(dead_code)]

use chip8::display::DummyDisplay;
use chip8::input::DummyInput;
use chip8::interpreter::Chip8Interpreter;

pub type TestVm = Chip8Interpreter<DummyDisplay, DummyInput>;

pub fn vm_with(rom: &[u8]) -> TestVm {
    Chip8Interpreter::new(rom, DummyDisplay::new(), DummyInput::new(&[])).unwrap()
}

/// run `n` instructions, one at a time
pub fn steps(vm: &mut TestVm, n: usize) {
    for _ in 0..n {
        vm.step().unwrap();
    }
}

/// a ROM long enough to reach `addr`, with `code` placed there
pub fn rom_with_code_at(mut rom: Vec<u8>, addr: u16, code: &[u8]) -> Vec<u8> {
    let at = addr as usize - 0x200;
    if rom.len() < at + code.len() {
        rom.resize(at + code.len(), 0);
    }
    rom[at..at + code.len()].copy_from_slice(code);
    rom
}
