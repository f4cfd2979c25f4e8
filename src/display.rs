use std::io;
use tui::backend::CrosstermBackend;
use tui::layout::Rect;
use tui::style::{Color, Style};
use tui::symbols::Marker;
use tui::widgets::canvas::{Canvas, Points};
use tui::widgets::{Block, Borders, Paragraph};
use tui::Terminal;

pub const SCREEN_WIDTH: usize = 64;
pub const SCREEN_HEIGHT: usize = 32;
pub const SCREEN_BUFFER_SIZE: usize = SCREEN_WIDTH * SCREEN_HEIGHT / 8;

/// Renderer is told about every change to the framebuffer. It should
/// abstract the implementation details, so a variety of kinds of screen would
/// work. It must not reach back into the interpreter.
pub trait Renderer {
    /// blank the screen
    fn clear(&mut self) -> Result<(), io::Error>;

    /// draw packed 1bpp data, MSB is the leftmost pixel, rows top to bottom
    fn draw(&mut self, data: &[u8]) -> Result<(), io::Error>;

    /// how big the display data should be
    fn get_display_size_bytes(&self) -> usize {
        SCREEN_BUFFER_SIZE
    }
}

/// 64x32 monochrome pixels, packed eight to a byte
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    buffer: [u8; SCREEN_BUFFER_SIZE],
}

impl FrameBuffer {
    pub fn new() -> Self {
        FrameBuffer {
            buffer: [0; SCREEN_BUFFER_SIZE],
        }
    }

    pub fn clear(&mut self) {
        self.buffer = [0; SCREEN_BUFFER_SIZE];
    }

    pub fn as_bytes(&self) -> &[u8; SCREEN_BUFFER_SIZE] {
        &self.buffer
    }

    /// is the pixel at (x, y) on; coordinates wrap
    pub fn get(&self, x: usize, y: usize) -> bool {
        let (i, mask) = Self::locate(x, y);
        self.buffer[i] & mask != 0
    }

    /// XOR one pixel; returns true if that turned a lit pixel off
    fn flip(&mut self, x: usize, y: usize) -> bool {
        let (i, mask) = Self::locate(x, y);
        let was_on = self.buffer[i] & mask != 0;
        self.buffer[i] ^= mask;
        was_on
    }

    fn locate(x: usize, y: usize) -> (usize, u8) {
        let px = (x % SCREEN_WIDTH) + (y % SCREEN_HEIGHT) * SCREEN_WIDTH;
        (px / 8, 0x80 >> (px % 8))
    }

    /// XOR a sprite in, one byte per row, wrapping on both axes
    ///
    /// returns the collision flag for the whole sprite: once any pixel has
    /// been switched off it stays set
    pub fn blit_sprite(&mut self, x: usize, y: usize, sprite: &[u8]) -> bool {
        let mut collision = false;
        for (row, data) in sprite.iter().enumerate() {
            for col in 0..8 {
                if data & (0x80 >> col) != 0 {
                    collision |= self.flip(x + col, y + row);
                }
            }
        }
        collision
    }

    /// coordinates of every lit pixel, row by row
    pub fn lit_pixels(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..SCREEN_WIDTH * SCREEN_HEIGHT)
            .map(|px| (px % SCREEN_WIDTH, px / SCREEN_WIDTH))
            .filter(move |(x, y)| self.get(*x, *y))
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// store useful metadata about the terminal
struct Resolution(usize, usize);

impl Resolution {
    fn pixel_count(&self) -> usize {
        self.0 * self.1
    }

    fn byte_count(&self) -> usize {
        self.pixel_count() / 8
    }

    fn x_bounds(&self) -> [f64; 2] {
        [0.0, (self.0 - 1) as f64]
    }

    fn y_bounds(&self) -> [f64; 2] {
        [-1.0 * (self.1 - 1) as f64, 0.0]
    }

    fn bitplane_from_data<'a>(
        &self,
        data: &'a [u8],
        bitplane: u8,
    ) -> impl std::iter::Iterator<Item = (f64, f64)> + 'a {
        let mut count = self.pixel_count();
        let w = self.0;
        std::iter::from_fn(move || {
            while count > 0 {
                count -= 1;
                let bit = 1 & (data[count / 8] >> (7 - count % 8));
                if bit == bitplane {
                    return Some((
                        (count % w) as f64,        // x
                        -1.0 * (count / w) as f64, // y
                    ));
                }
            }
            None
        })
    }
}

/// monochrome display in a terminal, rendered using TUI and crossterm, with
/// an optional debugger panel to the right of it
pub struct MonoTermDisplay {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    resolution: Resolution,
    last_frame: Vec<u8>,
    trace: Option<String>,
}

impl MonoTermDisplay {
    pub fn new(x: usize, y: usize) -> Result<MonoTermDisplay, io::Error> {
        let backend = CrosstermBackend::new(io::stdout());
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;
        let resolution = Resolution(x, y);
        Ok(MonoTermDisplay {
            terminal,
            last_frame: vec![0; resolution.byte_count()],
            resolution,
            trace: None,
        })
    }

    /// show (or hide) debugger text beside the screen
    pub fn set_trace(&mut self, trace: Option<String>) -> Result<(), io::Error> {
        self.trace = trace;
        let frame = self.last_frame.clone();
        self.paint(&frame)
    }

    fn paint(&mut self, data: &[u8]) -> Result<(), io::Error> {
        if data.len() != self.resolution.byte_count() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "MonoTermDisplay needs {} bytes to draw, got {}",
                    self.resolution.byte_count(),
                    data.len()
                ),
            ));
        }

        // for now this assumes a 1:1 ratio between terminal, chip8 and the
        // internal TUI canvas
        let resolution = &self.resolution;
        let trace = self.trace.as_deref();
        self.terminal.draw(|f| {
            let size = Rect::new(0, 0, 2 + resolution.0 as u16, 2 + resolution.1 as u16);
            let lit = resolution.bitplane_from_data(data, 1).collect::<Vec<_>>();
            let canvas = Canvas::default()
                .block(
                    Block::default()
                        .title("CHIP-8")
                        .borders(Borders::ALL)
                        .style(Style::default().bg(Color::Black)),
                )
                .x_bounds(resolution.x_bounds())
                .y_bounds(resolution.y_bounds())
                .marker(Marker::Block)
                .paint(|ctx| {
                    ctx.draw(&Points {
                        coords: &lit,
                        color: Color::White,
                    });
                });
            f.render_widget(canvas, size);
            let room = f.size().width.saturating_sub(size.width + 1);
            if let (Some(text), true) = (trace, room > 2) {
                let panel = Rect::new(size.width + 1, 0, room.min(40), size.height);
                let paragraph = Paragraph::new(text)
                    .block(Block::default().title("debug").borders(Borders::ALL));
                f.render_widget(paragraph, panel);
            }
        })?;
        self.last_frame = data.to_vec();
        Ok(())
    }
}

impl Renderer for MonoTermDisplay {
    fn clear(&mut self) -> Result<(), io::Error> {
        let blank = vec![0; self.resolution.byte_count()];
        self.paint(&blank)
    }

    fn draw(&mut self, data: &[u8]) -> Result<(), io::Error> {
        self.paint(data)
    }

    fn get_display_size_bytes(&self) -> usize {
        self.resolution.byte_count()
    }
}

/// useful for testing non-display routines; remembers what it was sent
#[derive(Default)]
pub struct DummyDisplay {
    pub clears: usize,
    pub draws: usize,
    pub last_frame: Vec<u8>,
}

impl DummyDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Renderer for DummyDisplay {
    fn clear(&mut self) -> Result<(), io::Error> {
        self.clears += 1;
        self.last_frame = vec![0; SCREEN_BUFFER_SIZE];
        Ok(())
    }

    fn draw(&mut self, data: &[u8]) -> Result<(), io::Error> {
        self.draws += 1;
        self.last_frame = data.to_vec();
        Ok(())
    }
}
