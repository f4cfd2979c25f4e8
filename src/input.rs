use crossterm::event::{poll, read, Event, KeyCode, KeyModifiers};
use crossterm::terminal;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::time::{Duration, Instant};

pub const KEY_COUNT: usize = 16;

/// left-hand side of a qwerty keyboard, laid out like the COSMAC hex pad
///   1 2 3 4        1 2 3 C
///   q w e r   =>   4 5 6 D
///   a s d f        7 8 9 E
///   z x c v        A 0 B F
const CHIP8_CONVENTIONAL_KEYMAP: [(char, u8); 16] = [
    ('x', 0x00),
    ('1', 0x01),
    ('2', 0x02),
    ('3', 0x03),
    ('q', 0x04),
    ('w', 0x05),
    ('e', 0x06),
    ('a', 0x07),
    ('s', 0x08),
    ('d', 0x09),
    ('z', 0x0a),
    ('c', 0x0b),
    ('4', 0x0c),
    ('r', 0x0d),
    ('f', 0x0e),
    ('v', 0x0f),
];

/// where key state comes from. implementations are passive: they report
/// state, they never touch the machine
pub trait InputSource {
    /// which of the 16 keys are down right now
    fn poll_keys(&mut self) -> Result<[bool; KEY_COUNT], io::Error>;

    /// a key for a blocked `LD Vx, K`, if one has been pressed since the
    /// last request; `None` means keep waiting
    fn request_key(&mut self) -> Result<Option<u8>, io::Error>;
}

/// keys that drive the front-end rather than the program
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostKey {
    Quit,
    ToggleDebug,
    Step,
}

/// key state built from press events alone
///
/// terminals only report presses, so a key counts as down for `hold` after
/// its last press (auto-repeat keeps it alive while held). at most one press
/// is kept back for a key request, and it goes stale after `hold` too
struct KeyLatch {
    last_seen: [Option<Instant>; KEY_COUNT],
    hold: Duration,
    pending: Option<(u8, Instant)>,
}

impl KeyLatch {
    fn new(hold: Duration) -> Self {
        KeyLatch {
            last_seen: [None; KEY_COUNT],
            hold,
            pending: None,
        }
    }

    fn press(&mut self, key: u8, at: Instant) {
        self.last_seen[key as usize] = Some(at);
        self.pending = Some((key, at));
    }

    fn held(&self, now: Instant) -> [bool; KEY_COUNT] {
        let mut keys = [false; KEY_COUNT];
        for (key, seen) in keys.iter_mut().zip(self.last_seen.iter()) {
            *key = matches!(seen, Some(t) if now.saturating_duration_since(*t) <= self.hold);
        }
        keys
    }

    /// a press that has been seen by a poll belongs to the program already
    fn forget_pending(&mut self) {
        self.pending = None;
    }

    fn take_pending(&mut self, now: Instant) -> Option<u8> {
        match self.pending.take() {
            Some((key, at)) if now.saturating_duration_since(at) <= self.hold => Some(key),
            _ => None,
        }
    }
}

/// keyboard input from a raw-mode terminal, using crossterm
pub struct TermInput {
    keymap: HashMap<char, u8>,
    latch: KeyLatch,
    host_keys: VecDeque<HostKey>,
}

impl TermInput {
    pub fn new(hold: Duration) -> Result<Self, io::Error> {
        terminal::enable_raw_mode()?;
        Ok(TermInput {
            keymap: HashMap::from(CHIP8_CONVENTIONAL_KEYMAP),
            latch: KeyLatch::new(hold),
            host_keys: VecDeque::new(),
        })
    }

    /// drain everything the terminal has queued up, without blocking
    pub fn read_terminal(&mut self) -> Result<(), io::Error> {
        while poll(Duration::from_millis(0))? {
            if let Event::Key(evt) = read()? {
                match evt.code {
                    KeyCode::Esc => self.host_keys.push_back(HostKey::Quit),
                    KeyCode::Char('c') if evt.modifiers.contains(KeyModifiers::CONTROL) => {
                        self.host_keys.push_back(HostKey::Quit)
                    }
                    KeyCode::Char(' ') => self.host_keys.push_back(HostKey::ToggleDebug),
                    KeyCode::Char('n') => self.host_keys.push_back(HostKey::Step),
                    KeyCode::Char(key) => match self.keymap.get(&key.to_ascii_lowercase()) {
                        Some(mapped_key) => self.latch.press(*mapped_key, Instant::now()),
                        None => tracing::warn!("can't map {:?} to a COSMAC key", key),
                    },
                    other => tracing::debug!("ignoring key {:?}", other),
                }
            }
        }
        Ok(())
    }

    /// front-end keys seen since the last call
    pub fn take_host_keys(&mut self) -> Vec<HostKey> {
        self.host_keys.drain(..).collect()
    }
}

impl Drop for TermInput {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

impl InputSource for TermInput {
    fn poll_keys(&mut self) -> Result<[bool; KEY_COUNT], io::Error> {
        self.read_terminal()?;
        let keys = self.latch.held(Instant::now());
        self.latch.forget_pending();
        Ok(keys)
    }

    fn request_key(&mut self) -> Result<Option<u8>, io::Error> {
        self.read_terminal()?;
        Ok(self.latch.take_pending(Instant::now()))
    }
}

/// dummy InputSource implementation for testing
#[derive(Default)]
pub struct DummyInput {
    pub pressed: [bool; KEY_COUNT],
    pub queued: VecDeque<u8>,
    pub polls: usize,
    pub requests: usize,
}

impl DummyInput {
    /// hold down `keys` for the lifetime of the dummy
    pub fn new(keys: &[u8]) -> Self {
        let mut input = DummyInput::default();
        for k in keys {
            input.pressed[(*k & 0xf) as usize] = true;
        }
        input
    }

    /// queue up presses to answer key requests, oldest first
    pub fn with_queued(mut self, keys: &[u8]) -> Self {
        self.queued.extend(keys.iter().copied());
        self
    }
}

impl InputSource for DummyInput {
    fn poll_keys(&mut self) -> Result<[bool; KEY_COUNT], io::Error> {
        self.polls += 1;
        Ok(self.pressed)
    }

    fn request_key(&mut self) -> Result<Option<u8>, io::Error> {
        self.requests += 1;
        Ok(self.queued.pop_front())
    }
}
