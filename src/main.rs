use clap::Parser;
use std::error::Error;
use std::fs;
use std::time::Instant;
use tracing::subscriber::set_global_default;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

use chip8::config::Cli;
use chip8::display::{MonoTermDisplay, SCREEN_HEIGHT, SCREEN_WIDTH};
use chip8::host::{Command, Notification, Session};
use chip8::input::{HostKey, TermInput};
use chip8::interpreter::Chip8Interpreter;
use chip8::sound::{Mute, SimpleBeep, Sound};

// logs go to stderr; stdout belongs to the screen
fn setup_tracing() -> Result<(), Box<dyn Error>> {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let sub = Registry::default()
        .with(EnvFilter::from_default_env())
        .with(fmt_layer);
    set_global_default(sub)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    setup_tracing()?;
    let cli = Cli::parse();
    let rom = fs::read(&cli.rom)?;
    let params = cli.run_params();

    // initialise
    let display = MonoTermDisplay::new(SCREEN_WIDTH, SCREEN_HEIGHT)?;
    let input = TermInput::new(cli.key_hold())?;
    let mut sound: Box<dyn Sound> = if cli.mute {
        Box::new(Mute::new())
    } else {
        Box::new(SimpleBeep::new())
    };
    let interpreter =
        Chip8Interpreter::new(&rom, display, input)?.with_policy(cli.halt_policy());
    let mut session =
        Session::new(interpreter, cli.debug).with_skip_invalid(cli.skip_invalid);
    tracing::info!("running {}", cli.rom.display());

    let mut frames = 0u64;
    'main: loop {
        let started = Instant::now();

        let mut notes = Vec::new();
        // the program may not look at the keyboard this frame, the host still does
        let input = session.interpreter_mut().input_mut();
        input.read_terminal()?;
        let host_keys = input.take_host_keys();
        for key in host_keys {
            match key {
                HostKey::Quit => break 'main,
                HostKey::ToggleDebug => notes.extend(session.command(Command::ToggleDebug)),
                HostKey::Step => notes.extend(session.command(Command::Step)),
            }
        }

        notes.extend(session.frame(&params)?);

        for note in notes {
            match note {
                Notification::Trace(snapshot) => session
                    .interpreter_mut()
                    .display_mut()
                    .set_trace(Some(snapshot.to_string()))?,
                Notification::RunStateChanged(state) if !state.in_debug => {
                    session.interpreter_mut().display_mut().set_trace(None)?
                }
                Notification::ProgramFinished => tracing::info!("program finished"),
                _ => (),
            }
        }

        sound.update(session.interpreter().sound_active())?;

        frames += 1;
        if cli.frames.map_or(false, |cap| frames >= cap) {
            break;
        }
        if let Some(rest) = params.frame_duration.checked_sub(started.elapsed()) {
            spin_sleep::sleep(rest);
        }
    }
    sound.stop()?;

    // shove some junk on stdout to stop the cli messing up the last frame
    for _ in 0..SCREEN_HEIGHT / 2 {
        println!();
    }
    Ok(())
}
