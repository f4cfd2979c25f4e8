//! # host
//!
//! front-end bookkeeping around an interpreter: is a program loaded, are we
//! single-stepping, is the program parked on a key. [`RunState::transition`]
//! is pure; [`Session`] applies it and drives the interpreter a frame at a
//! time, handing back [`Notification`]s for whoever is presenting things.
use crate::display::Renderer;
use crate::error::VmError;
use crate::input::InputSource;
use crate::interpreter::{Chip8Interpreter, RunOutcome, RunParams, VmSnapshot};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunState {
    pub rom_loaded: bool,
    pub in_debug: bool,
    pub waiting_for_key: bool,
    pub halted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    LoadRom,
    ToggleDebug,
    Step,
    KeyWaitStarted,
    KeyDelivered,
    Halted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    RunStateChanged(RunState),
    /// one more instruction may run while single-stepping
    StepGranted,
    ProgramFinished,
    /// machine state after a single step
    Trace(Box<VmSnapshot>),
}

impl RunState {
    pub fn transition(self, cmd: Command) -> (RunState, Vec<Notification>) {
        let mut next = self;
        let mut notes = Vec::new();
        match cmd {
            Command::LoadRom => {
                next = RunState {
                    rom_loaded: true,
                    ..RunState::default()
                };
            }
            Command::ToggleDebug => {
                next.in_debug = !self.in_debug;
                // leaving debug mode releases a loop that is waiting on a step
                if !next.in_debug && next.can_step() {
                    notes.push(Notification::StepGranted);
                }
            }
            Command::Step => {
                if self.in_debug && self.can_step() {
                    notes.push(Notification::StepGranted);
                }
            }
            Command::KeyWaitStarted => next.waiting_for_key = true,
            Command::KeyDelivered => next.waiting_for_key = false,
            Command::Halted => {
                if !self.halted {
                    notes.push(Notification::ProgramFinished);
                }
                next.halted = true;
            }
        }
        if next != self {
            notes.insert(0, Notification::RunStateChanged(next));
        }
        (next, notes)
    }

    fn can_step(&self) -> bool {
        self.rom_loaded && !self.waiting_for_key && !self.halted
    }
}

/// an interpreter plus the run state of the front-end driving it
pub struct Session<D: Renderer, I: InputSource> {
    interpreter: Chip8Interpreter<D, I>,
    state: RunState,
    steps_granted: usize,
    skip_invalid: bool,
}

impl<D: Renderer, I: InputSource> Session<D, I> {
    pub fn new(interpreter: Chip8Interpreter<D, I>, debug: bool) -> Self {
        let mut session = Session {
            interpreter,
            state: RunState::default(),
            steps_granted: 0,
            skip_invalid: false,
        };
        session.command(Command::LoadRom);
        if debug {
            session.command(Command::ToggleDebug);
        }
        session
    }

    /// log and step over undecodable words instead of failing the frame
    pub fn with_skip_invalid(mut self, skip_invalid: bool) -> Self {
        self.skip_invalid = skip_invalid;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn interpreter(&self) -> &Chip8Interpreter<D, I> {
        &self.interpreter
    }

    pub fn interpreter_mut(&mut self) -> &mut Chip8Interpreter<D, I> {
        &mut self.interpreter
    }

    pub fn command(&mut self, cmd: Command) -> Vec<Notification> {
        let (next, notes) = self.state.transition(cmd);
        self.state = next;
        if !next.in_debug {
            self.steps_granted = 0;
        }
        if next.in_debug && notes.contains(&Notification::StepGranted) {
            self.steps_granted += 1;
        }
        notes
    }

    /// swap in a new program; the run state starts over with it
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<Vec<Notification>, VmError> {
        self.interpreter.load_program(rom)?;
        let debug = self.state.in_debug;
        let mut notes = self.command(Command::LoadRom);
        if debug {
            notes.extend(self.command(Command::ToggleDebug));
        }
        Ok(notes)
    }

    /// one host frame: run the interpreter as the run state allows, and tick
    /// the timers if the program is running freely
    pub fn frame(&mut self, params: &RunParams) -> Result<Vec<Notification>, VmError> {
        let mut notes = Vec::new();
        if !self.state.rom_loaded || self.state.halted {
            return Ok(notes);
        }

        let stepping = self.state.in_debug && !self.state.waiting_for_key;
        let run_params = if !self.state.in_debug {
            *params
        } else if self.state.waiting_for_key {
            // only listen for the key; the next instruction waits for a step
            RunParams {
                instructions_per_call: 0,
                ..*params
            }
        } else if self.steps_granted > 0 {
            self.steps_granted -= 1;
            RunParams::single_step()
        } else {
            return Ok(notes);
        };

        let outcome = match self.interpreter.run(&run_params) {
            Ok(outcome) => outcome,
            Err(e) if self.skip_invalid && e.is_decode_error() => {
                tracing::warn!("skipping: {}", e);
                self.interpreter.skip_instruction();
                self.interpreter.outcome()
            }
            Err(e) => return Err(e),
        };
        match outcome {
            RunOutcome::AwaitingKey if !self.state.waiting_for_key => {
                notes.extend(self.command(Command::KeyWaitStarted))
            }
            RunOutcome::Completed if self.state.waiting_for_key => {
                notes.extend(self.command(Command::KeyDelivered))
            }
            RunOutcome::Halted => notes.extend(self.command(Command::Halted)),
            _ => (),
        }
        if stepping {
            notes.push(Notification::Trace(Box::new(self.interpreter.snapshot())));
        } else if !self.state.in_debug {
            self.interpreter.tick_timers();
        }
        Ok(notes)
    }
}
