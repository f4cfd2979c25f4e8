use crate::interpreter::{HaltPolicy, RunParams};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

/// command line for the terminal front-end
#[derive(Parser, Debug)]
#[command(name = "chip8")]
#[command(about = "CHIP-8 interpreter for the terminal", long_about = None)]
pub struct Cli {
    /// program to run, loaded at 0x200
    pub rom: PathBuf,

    /// instructions to run per frame
    #[arg(long, default_value_t = 10)]
    pub ipf: usize,

    /// frame length in milliseconds; timers tick once a frame
    #[arg(long, default_value_t = 16)]
    pub frame_ms: u64,

    /// start paused, single-stepping with `n`
    #[arg(long, action = ArgAction::SetTrue)]
    pub debug: bool,

    /// never halt a program that keeps jumping to itself
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_halt: bool,

    /// how many self-jumps in a row count as finished
    #[arg(long, default_value_t = 10)]
    pub halt_after: u32,

    /// no beeper
    #[arg(long, action = ArgAction::SetTrue)]
    pub mute: bool,

    /// log and step over bad instructions instead of stopping
    #[arg(long, action = ArgAction::SetTrue)]
    pub skip_invalid: bool,

    /// stop after this many frames
    #[arg(long)]
    pub frames: Option<u64>,

    /// how long a terminal key press counts as held down, in milliseconds
    #[arg(long, default_value_t = 150)]
    pub key_hold_ms: u64,
}

impl Cli {
    pub fn run_params(&self) -> RunParams {
        RunParams {
            instructions_per_call: self.ipf,
            frame_duration: Duration::from_millis(self.frame_ms),
        }
    }

    pub fn halt_policy(&self) -> HaltPolicy {
        HaltPolicy {
            self_jump_limit: if self.no_halt {
                None
            } else {
                Some(self.halt_after)
            },
        }
    }

    pub fn key_hold(&self) -> Duration {
        Duration::from_millis(self.key_hold_ms)
    }
}
