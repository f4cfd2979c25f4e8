use crate::error::VmError;
use std::io;

// NB. addresses are u16 as per the chip-8; lengths are usize to stop endless casting

/// how much RAM we have; the top byte at 0xfff is not addressable
pub const CHIP8_RAM_SIZE_BYTES: usize = 0xfff;

/// where the program is loaded
pub const CHIP8_PROGRAM_ADDR: u16 = 0x0200;

/// where the hex digit glyphs live, and how many bytes each takes
pub const CHIP8_FONT_ADDR: u16 = 0x000;
pub const CHIP8_FONT_GLYPH_BYTES: u16 = 5;

/// Flat RAM for a CHIP-8 machine
///   0x0000-0x004f  hex font
///   0x0050-0x01ff  unused (interpreter area on real hardware)
///   0x0200-0x0ffe  program and data
///
/// every access is bounds-checked; nothing in here panics on a bad address
pub struct Chip8Memory {
    bytes: Box<[u8]>,
}

impl Chip8Memory {
    /// initialises RAM with the font, then copies the program in at 0x200
    pub fn new(rom: &[u8]) -> Result<Self, VmError> {
        let start = CHIP8_PROGRAM_ADDR as usize;
        if start + rom.len() > CHIP8_RAM_SIZE_BYTES {
            return Err(VmError::RomTooLarge {
                size: rom.len(),
                capacity: CHIP8_RAM_SIZE_BYTES,
            });
        }
        let mut bytes = vec![0u8; CHIP8_RAM_SIZE_BYTES].into_boxed_slice();
        let font = CHIP8_FONT_ADDR as usize;
        bytes[font..font + CHIP8_FONT.len()].copy_from_slice(&CHIP8_FONT);
        bytes[start..start + rom.len()].copy_from_slice(rom);
        Ok(Chip8Memory { bytes })
    }

    /// read a whole program from anywhere, then build RAM around it
    pub fn from_reader(reader: &mut impl io::Read) -> Result<Self, VmError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Self::new(&buf)
    }

    /// get one byte
    pub fn read_byte(&self, addr: u16) -> Result<u8, VmError> {
        self.bytes
            .get(addr as usize)
            .copied()
            .ok_or(VmError::AddressOutOfRange(addr))
    }

    /// set one byte
    pub fn write_byte(&mut self, addr: u16, value: u8) -> Result<(), VmError> {
        let cell = self
            .bytes
            .get_mut(addr as usize)
            .ok_or(VmError::AddressOutOfRange(addr))?;
        *cell = value;
        Ok(())
    }

    /// get a two-byte big-endian instruction word
    pub fn get_word(&self, addr: u16) -> Result<(u8, u8), VmError> {
        let word = self.get_ro_slice(addr, 2)?;
        Ok((word[0], word[1]))
    }

    /// get a r/o slice of the underlying memory
    pub fn get_ro_slice(&self, addr: u16, len: usize) -> Result<&[u8], VmError> {
        let a = addr as usize;
        let first_missing = self.first_missing(addr);
        self.bytes
            .get(a..a + len)
            .ok_or(VmError::AddressOutOfRange(first_missing))
    }

    /// get a r/w slice of the underlying memory
    pub fn get_rw_slice(&mut self, addr: u16, len: usize) -> Result<&mut [u8], VmError> {
        let a = addr as usize;
        let first_missing = self.first_missing(addr);
        self.bytes
            .get_mut(a..a + len)
            .ok_or(VmError::AddressOutOfRange(first_missing))
    }

    // the first address of a range that falls off the end of RAM
    fn first_missing(&self, addr: u16) -> u16 {
        addr.max(self.bytes.len() as u16)
    }
}

pub const CHIP8_FONT: [u8; 80] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];
