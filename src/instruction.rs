//! # instruction set
//!
//! decoding turns a two-byte instruction word into one [`Instruction`]
//! variant carrying its operands; the interpreter then consumes it with a
//! single match. decoding never touches machine state.
//!
//! operand fields, for a word `b1 b2`:
//!  x    = low nibble of b1 (register)
//!  y    = high nibble of b2 (register)
//!  kk   = b2 (immediate byte)
//!  addr = low nibble of b1 and all of b2 (12 bits)
//!  n    = low nibble of b2 (sprite height)
use crate::error::VmError;
use std::fmt;

/// one decoded CHIP-8 instruction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// 00E0
    Cls,
    /// 00EE
    Ret,
    /// 1nnn
    Jp { addr: u16 },
    /// 2nnn
    Call { addr: u16 },
    /// 3xkk
    SeImm { x: u8, kk: u8 },
    /// 4xkk
    SneImm { x: u8, kk: u8 },
    /// 5xy0
    SeReg { x: u8, y: u8 },
    /// 6xkk
    LdImm { x: u8, kk: u8 },
    /// 7xkk
    AddImm { x: u8, kk: u8 },
    /// 8xy0
    LdReg { x: u8, y: u8 },
    /// 8xy1
    Or { x: u8, y: u8 },
    /// 8xy2
    And { x: u8, y: u8 },
    /// 8xy3
    Xor { x: u8, y: u8 },
    /// 8xy4
    AddReg { x: u8, y: u8 },
    /// 8xy5
    Sub { x: u8, y: u8 },
    /// 8xy6
    Shr { x: u8 },
    /// 8xy7
    Subn { x: u8, y: u8 },
    /// 8xyE
    Shl { x: u8 },
    /// 9xy0
    SneReg { x: u8, y: u8 },
    /// Annn
    LdI { addr: u16 },
    /// Bnnn
    JpV0 { addr: u16 },
    /// Cxkk
    Rnd { x: u8, kk: u8 },
    /// Dxyn
    Drw { x: u8, y: u8, n: u8 },
    /// Ex9E
    Skp { x: u8 },
    /// ExA1
    Sknp { x: u8 },
    /// Fx07
    LdVxDt { x: u8 },
    /// Fx0A
    LdVxK { x: u8 },
    /// Fx15
    LdDtVx { x: u8 },
    /// Fx18
    LdStVx { x: u8 },
    /// Fx1E
    AddIVx { x: u8 },
    /// Fx29
    LdFVx { x: u8 },
    /// Fx33
    LdBVx { x: u8 },
    /// Fx55
    StoreRegs { x: u8 },
    /// Fx65
    LoadRegs { x: u8 },
}

/// map an instruction word onto an [`Instruction`]
pub fn decode(b1: u8, b2: u8) -> Result<Instruction, VmError> {
    use Instruction::*;

    let group = b1 >> 4;
    let x = b1 & 0x0f;
    let y = b2 >> 4;
    let n = b2 & 0x0f;
    let kk = b2;
    let addr = ((x as u16) << 8) | b2 as u16;
    let invalid = |sub| Err(VmError::InvalidOpcode { group, sub });

    let inst = match group {
        0x0 => match (x, b2) {
            (0, 0xe0) => Cls,
            (0, 0xee) => Ret,
            _ => return invalid(b2),
        },
        0x1 => Jp { addr },
        0x2 => Call { addr },
        0x3 => SeImm { x, kk },
        0x4 => SneImm { x, kk },
        0x5 => match n {
            0x0 => SeReg { x, y },
            _ => return invalid(n),
        },
        0x6 => LdImm { x, kk },
        0x7 => AddImm { x, kk },
        0x8 => match n {
            0x0 => LdReg { x, y },
            0x1 => Or { x, y },
            0x2 => And { x, y },
            0x3 => Xor { x, y },
            0x4 => AddReg { x, y },
            0x5 => Sub { x, y },
            0x6 => Shr { x },
            0x7 => Subn { x, y },
            0xe => Shl { x },
            _ => return invalid(n),
        },
        0x9 => match n {
            0x0 => SneReg { x, y },
            _ => return invalid(n),
        },
        0xa => LdI { addr },
        0xb => JpV0 { addr },
        0xc => Rnd { x, kk },
        0xd => Drw { x, y, n },
        0xe => match b2 {
            0x9e => Skp { x },
            0xa1 => Sknp { x },
            _ => return invalid(b2),
        },
        0xf => match b2 {
            0x07 => LdVxDt { x },
            0x0a => LdVxK { x },
            0x15 => LdDtVx { x },
            0x18 => LdStVx { x },
            0x1e => AddIVx { x },
            0x29 => LdFVx { x },
            0x33 => LdBVx { x },
            0x55 => StoreRegs { x },
            0x65 => LoadRegs { x },
            _ => return invalid(b2),
        },
        // a nibble only has 16 values
        _ => return Err(VmError::InvalidInstruction(u16::from_be_bytes([b1, b2]))),
    };
    Ok(inst)
}

// disassembly, laid out as fixed-width columns so a trace lines up
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        fn v(r: &u8) -> String {
            format!("V{:X}", r)
        }

        match self {
            Cls => write!(f, "CLS"),
            Ret => write!(f, "RET"),
            Jp { addr } => write!(f, "{:<4} {:03x}", "JP", addr),
            Call { addr } => write!(f, "{:<4} {:03x}", "CALL", addr),
            SeImm { x, kk } => write!(f, "{:<4} {:<3} {:02x}", "SE", v(x), kk),
            SneImm { x, kk } => write!(f, "{:<4} {:<3} {:02x}", "SNE", v(x), kk),
            SeReg { x, y } => write!(f, "{:<4} {:<3} {}", "SE", v(x), v(y)),
            LdImm { x, kk } => write!(f, "{:<4} {:<3} {:02x}", "LD", v(x), kk),
            AddImm { x, kk } => write!(f, "{:<4} {:<3} {:02x}", "ADD", v(x), kk),
            LdReg { x, y } => write!(f, "{:<4} {:<3} {}", "LD", v(x), v(y)),
            Or { x, y } => write!(f, "{:<4} {:<3} {}", "OR", v(x), v(y)),
            And { x, y } => write!(f, "{:<4} {:<3} {}", "AND", v(x), v(y)),
            Xor { x, y } => write!(f, "{:<4} {:<3} {}", "XOR", v(x), v(y)),
            AddReg { x, y } => write!(f, "{:<4} {:<3} {}", "ADD", v(x), v(y)),
            Sub { x, y } => write!(f, "{:<4} {:<3} {}", "SUB", v(x), v(y)),
            Shr { x } => write!(f, "{:<4} {}", "SHR", v(x)),
            Subn { x, y } => write!(f, "{:<4} {:<3} {}", "SUBN", v(x), v(y)),
            Shl { x } => write!(f, "{:<4} {}", "SHL", v(x)),
            SneReg { x, y } => write!(f, "{:<4} {:<3} {}", "SNE", v(x), v(y)),
            LdI { addr } => write!(f, "{:<4} {:<3} {:03x}", "LD", "I", addr),
            JpV0 { addr } => write!(f, "{:<4} {:<3} {:03x}", "JP", "V0", addr),
            Rnd { x, kk } => write!(f, "{:<4} {:<3} {:02x}", "RND", v(x), kk),
            Drw { x, y, n } => write!(f, "{:<4} {:<3} {:<3} {:x}", "DRW", v(x), v(y), n),
            Skp { x } => write!(f, "{:<4} {}", "SKP", v(x)),
            Sknp { x } => write!(f, "{:<4} {}", "SKNP", v(x)),
            LdVxDt { x } => write!(f, "{:<4} {:<3} DT", "LD", v(x)),
            LdVxK { x } => write!(f, "{:<4} {:<3} K", "LD", v(x)),
            LdDtVx { x } => write!(f, "{:<4} {:<3} {}", "LD", "DT", v(x)),
            LdStVx { x } => write!(f, "{:<4} {:<3} {}", "LD", "ST", v(x)),
            AddIVx { x } => write!(f, "{:<4} {:<3} {}", "ADD", "I", v(x)),
            LdFVx { x } => write!(f, "{:<4} {:<3} {}", "LD", "F", v(x)),
            LdBVx { x } => write!(f, "{:<4} {:<3} {}", "LD", "B", v(x)),
            StoreRegs { x } => write!(f, "{:<4} {:<3} {}", "LD", "[I]", v(x)),
            LoadRegs { x } => write!(f, "{:<4} {:<3} [I]", "LD", v(x)),
        }
    }
}
