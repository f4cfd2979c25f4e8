use std::io;
use thiserror::Error;

/// everything that can go wrong while loading or running a CHIP-8 program
#[derive(Debug, Error)]
pub enum VmError {
    #[error("ROM of {size} bytes does not fit in {capacity} bytes of RAM at 0x200")]
    RomTooLarge { size: usize, capacity: usize },

    #[error("invalid instruction in group 0x{group:x}: sub-value 0x{sub:02x}")]
    InvalidOpcode { group: u8, sub: u8 },

    /// a word outside every group; with 4-bit groups `decode` never builds it
    #[error("invalid instruction 0x{0:04x}")]
    InvalidInstruction(u16),

    #[error("address 0x{0:04x} is outside of RAM")]
    AddressOutOfRange(u16),

    #[error("call stack overflow")]
    StackOverflow,

    #[error("return with an empty call stack")]
    StackUnderflow,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VmError {
    /// the instruction word itself was bad; nothing ran
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            VmError::InvalidOpcode { .. } | VmError::InvalidInstruction(_)
        )
    }
}

impl PartialEq for VmError {
    fn eq(&self, other: &Self) -> bool {
        use VmError::*;
        match (self, other) {
            (
                RomTooLarge { size: a, capacity: b },
                RomTooLarge { size: c, capacity: d },
            ) => a == c && b == d,
            (InvalidOpcode { group: a, sub: b }, InvalidOpcode { group: c, sub: d }) => {
                a == c && b == d
            }
            (InvalidInstruction(a), InvalidInstruction(b)) => a == b,
            (AddressOutOfRange(a), AddressOutOfRange(b)) => a == b,
            (StackOverflow, StackOverflow) | (StackUnderflow, StackUnderflow) => true,
            // io::Error has no equality of its own
            (Io(a), Io(b)) => a.kind() == b.kind(),
            _ => false,
        }
    }
}
