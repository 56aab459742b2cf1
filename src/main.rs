mod app;
mod audio;
mod beat;
mod config;
mod control;
mod dispatch;
mod metronome;
mod mute;
mod tones;
mod trace;
mod ui;
mod visual;

use anyhow::{Context, Result};
use app::{App, AppMode};
use audio::CpalOutput;
use clap::Parser;
use config::Cli;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use metronome::Metronome;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{io, time::Duration};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_devices {
        for name in audio::list_output_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    trace::setup(&cli.log_file)?;
    let control = cli.control_state();
    tracing::info!(?control, "starting");

    enable_raw_mode().context("Cannot enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let output = CpalOutput::new(cli.device.clone(), cli.buffer_size);
    let mut app = App::new(Metronome::new(Box::new(output), control.clone()), control);
    let result = run(&mut terminal, &mut app);
    app.shutdown();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    if let Err(e) = result {
        tracing::error!("{e:#}");
        eprintln!("Error: {:?}", e);
    }
    Ok(())
}

fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        app.poll_beats();
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(16))? {
            match event::read()? {
                Event::Key(key) if key.kind != KeyEventKind::Release => {
                    let repeat = key.kind == KeyEventKind::Repeat;
                    match key.code {
                        // Global quit
                        KeyCode::Esc | KeyCode::Char('q') => break,
                        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,

                        // Held keys only repeat value changes
                        KeyCode::PageUp   => app.bpm_step(5),
                        KeyCode::PageDown => app.bpm_step(-5),
                        KeyCode::Up       => app.up(),
                        KeyCode::Down     => app.down(),
                        KeyCode::Left     => app.left(),
                        KeyCode::Right    => app.right(),
                        _ if repeat => {}

                        // Global toggles
                        KeyCode::Char(' ') => app.toggle_play(),
                        KeyCode::Tab       => app.toggle_mode(),
                        KeyCode::Char('r') => app.toggle_random(),
                        KeyCode::Char('f') => app.toggle_force_play(),
                        KeyCode::Char('t') => app.cycle_tone(),
                        KeyCode::Char('m') => app.toggle_master_mute(),
                        KeyCode::Char('c') => app.clear_log(),

                        // ── Mixer focus ───────────────────────────────────
                        KeyCode::Enter if app.mode == AppMode::Mixer => app.toggle_audible_in_mute(),

                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}
