use beep::beep;
use std::error::Error;

/// the buzzer, sounding whenever the sound timer is non-zero
pub trait Sound {
    fn beep(&mut self) -> Result<(), Box<dyn Error>>;
    fn stop(&mut self) -> Result<(), Box<dyn Error>>;
    fn is_beeping(&self) -> bool;

    /// follow the sound timer, only touching the device on a change
    fn update(&mut self, active: bool) -> Result<(), Box<dyn Error>> {
        match (active, self.is_beeping()) {
            (true, false) => self.beep(),
            (false, true) => self.stop(),
            _ => Ok(()),
        }
    }
}

const SIMPLEBEEP_PITCH: u16 = 2093; // C

/// PC speaker beeps, via the beep crate
pub struct SimpleBeep {
    is_beeping: bool,
}

impl SimpleBeep {
    pub fn new() -> Self {
        SimpleBeep { is_beeping: false }
    }
}

impl Default for SimpleBeep {
    fn default() -> Self {
        Self::new()
    }
}

impl Sound for SimpleBeep {
    fn beep(&mut self) -> Result<(), Box<dyn Error>> {
        beep(SIMPLEBEEP_PITCH)?;
        self.is_beeping = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Box<dyn Error>> {
        beep(0)?;
        self.is_beeping = false;
        Ok(())
    }

    fn is_beeping(&self) -> bool {
        self.is_beeping
    }
}

/// silence, but still tracks whether it would be beeping
#[derive(Default)]
pub struct Mute {
    is_beeping: bool,
    pub transitions: usize,
}

impl Mute {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sound for Mute {
    fn beep(&mut self) -> Result<(), Box<dyn Error>> {
        self.is_beeping = true;
        self.transitions += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Box<dyn Error>> {
        self.is_beeping = false;
        self.transitions += 1;
        Ok(())
    }

    fn is_beeping(&self) -> bool {
        self.is_beeping
    }
}
