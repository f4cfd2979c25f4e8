//! # chip8
//!
//! a CHIP-8 interpreter: 4K of RAM with the hex font at the bottom and the
//! program at 0x200, sixteen 8-bit registers, a 16-deep call stack, two
//! 60Hz timers and a 64x32 monochrome screen.
//!
//! the core knows nothing about terminals or clocks. it talks to the outside
//! through three traits:
//!
//! * [`display::Renderer`] is told whenever the framebuffer changes
//! * [`input::InputSource`] reports which keys are down, and answers a
//!   blocking `LD Vx, K`
//! * [`sound::Sound`] follows the sound timer
//!
//! Model
//!
//! Host (main.rs)
//!  |-- config: Cli -> RunParams, HaltPolicy
//!  |-- display, input, sound
//!  `-- host::Session
//!       |-- RunState (loaded / debug / waiting for key / halted)
//!       `-- interpreter::Chip8Interpreter(display, input)
//!            |-- memory, registers, call stack, framebuffer
//!            `-- instruction: decode + disassembly
//!
//! once a frame the host asks the session to run a batch of instructions,
//! ticks the timers, and sleeps off whatever is left of the frame.
pub mod config;
pub mod display;
pub mod error;
pub mod host;
pub mod input;
pub mod instruction;
pub mod interpreter;
pub mod memory;
pub mod registers;
pub mod sound;

pub use error::VmError;
pub use interpreter::{Chip8Interpreter, HaltPolicy, RunOutcome, RunParams};
