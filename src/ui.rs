use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, AppMode, MixerChannel, TrainingField};
use crate::mute::{fixed_cycle_muted, Phase};
use crate::visual::{pendulum_angle, PENDULUM_SPREAD_DEG};

// ── Top-level routing ─────────────────────────────────────────────────────────

/// Draw every panel; `app.mode` only decides which one has the highlighted
/// border and receives the arrow keys.
pub fn draw(f: &mut Frame, app: &App) {
    let area = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // title bar
            Constraint::Length(7),  // pendulum + beat LEDs
            Constraint::Length(10), // tempo / training / mixer
            Constraint::Length(3),  // status
            Constraint::Min(4),     // timing log
            Constraint::Length(4),  // help
        ])
        .split(area);

    let panels = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(25),
            Constraint::Percentage(35),
            Constraint::Percentage(40),
        ])
        .split(chunks[2]);

    draw_title(f, chunks[0], app);
    draw_visualizer(f, chunks[1], app);
    draw_tempo(f, panels[0], app);
    draw_training(f, panels[1], app);
    draw_mixer(f, panels[2], app);
    draw_status(f, chunks[3], app);
    draw_log(f, chunks[4], app);
    draw_help(f, chunks[5], app);
}

fn panel_block(title: String, focused: bool) -> Block<'static> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(if focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        })
}

/// Is the bar currently sounding muted? Stopped: none.
fn current_muted(app: &App) -> bool {
    app.current.map(|ev| ev.is_mute).unwrap_or(false)
}

// ── Title bar ─────────────────────────────────────────────────────────────────

fn draw_title(f: &mut Frame, area: Rect, app: &App) {
    let focus_label = match app.mode {
        AppMode::Tempo    => "Tempo",
        AppMode::Training => "Training",
        AppMode::Mixer    => "Mixer",
    };
    let transport = if app.is_playing() { "▶ PLAY" } else { "■ STOP" };
    let audio = if app.is_playing() && !app.audio_ready() { "  ─  no audio" } else { "" };

    let text = format!(
        "  RustTuiPulse  ─  {}  ─  Focus: {}  ─  Tone: {}{}",
        transport, focus_label, app.control.tone_mode.name(), audio
    );
    let color = if app.is_playing() { Color::Cyan } else { Color::Yellow };
    f.render_widget(
        Paragraph::new(text)
            .style(Style::default().fg(color).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL)),
        area,
    );
}

// ── Pendulum + LEDs ───────────────────────────────────────────────────────────

fn draw_visualizer(f: &mut Frame, area: Rect, app: &App) {
    let muted = current_muted(app);
    let bob_color = if muted { Color::Red } else { Color::Green };
    let block = Block::default()
        .title(if muted { " Pendulum ─ MUTE " } else { " Pendulum " })
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if muted { Color::Red } else { Color::DarkGray }));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let width = inner.width.max(3) as usize;
    let mut lines: Vec<Line> = Vec::new();

    // Swing track: a bob between the two extremes, centre marked
    let phase = app.phase();
    let bob = phase.map(|p| {
        let x = (pendulum_angle(p) / PENDULUM_SPREAD_DEG + 1.0) / 2.0;
        ((x * (width - 1) as f64).round() as usize).min(width - 1)
    });
    let track: Vec<Span> = (0..width)
        .map(|i| {
            if Some(i) == bob {
                Span::styled("●", Style::default().fg(bob_color).add_modifier(Modifier::BOLD))
            } else if i == 0 || i == width - 1 {
                Span::styled("┃", Style::default().fg(Color::DarkGray))
            } else if i == width / 2 {
                Span::styled("┊", Style::default().fg(Color::DarkGray))
            } else {
                Span::styled("─", Style::default().fg(Color::DarkGray))
            }
        })
        .collect();
    lines.push(Line::from(""));
    lines.push(Line::from(track));
    lines.push(Line::from(""));

    // Beat LEDs, one per beat of the bar
    let bpb = app.control.beats_per_bar.max(1) as u64;
    let lit = app.current.map(|ev| ev.beat);
    let mut leds: Vec<Span> = vec![Span::raw(" ")];
    for beat in 1..=bpb {
        let on = lit == Some(beat);
        let sty = match (on, beat == 1, muted) {
            (true, _, true)      => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            (true, true, false)  => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            (true, false, false) => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            (false, _, _)        => Style::default().fg(Color::DarkGray),
        };
        leds.push(Span::styled(if on { "● " } else { "○ " }, sty));
    }
    let position = match app.current {
        Some(ev) => format!("   Bar {}  Beat {}", ev.bar, ev.beat),
        None     => "   Bar ─  Beat ─".to_string(),
    };
    leds.push(Span::styled(position, Style::default().fg(Color::White)));
    if let Some(p) = phase {
        leds.push(Span::styled(format!("   φ {:.2}", p), Style::default().fg(Color::DarkGray)));
    }
    lines.push(Line::from(leds));

    f.render_widget(Paragraph::new(lines), inner);
}

// ── Tempo panel ───────────────────────────────────────────────────────────────

fn draw_tempo(f: &mut Frame, area: Rect, app: &App) {
    let focused = app.mode == AppMode::Tempo;
    let title = if focused { " ► Tempo ─ [↑↓] BPM [←→] Beats ".to_string() } else { " Tempo ".to_string() };
    let label = Style::default().fg(Color::DarkGray);
    let value = Style::default().fg(Color::Green).add_modifier(Modifier::BOLD);

    let c = &app.control;
    let lines = vec![
        Line::from(vec![Span::styled("BPM    ", label), Span::styled(format!("{:>4}", c.bpm), value)]),
        Line::from(vec![Span::styled("Beats  ", label), Span::styled(format!("{:>4}", c.beats_per_bar), value)]),
        Line::from(""),
        Line::from(vec![
            Span::styled("Beat   ", label),
            Span::raw(format!("{:>4.0} ms", c.beat_interval().as_secs_f64() * 1000.0)),
        ]),
    ];
    f.render_widget(Paragraph::new(lines).block(panel_block(title, focused)), area);
}

// ── Training panel ────────────────────────────────────────────────────────────

fn draw_training(f: &mut Frame, area: Rect, app: &App) {
    let focused = app.mode == AppMode::Training;
    let c = &app.control;
    let mode = if c.random_training { "random" } else { "fixed" };
    let title = if focused {
        format!(" ► Training ({mode}) ─ [↑↓] Field [←→] Adjust ")
    } else {
        format!(" Training ({mode}) ")
    };

    let mut lines: Vec<Line> = Vec::new();
    for (i, field) in TrainingField::ALL.into_iter().enumerate() {
        let selected = focused && i == app.training_field;
        let live = field.is_random() == c.random_training;
        let sty = if selected {
            Style::default().fg(Color::Black).bg(Color::Yellow)
        } else if live {
            Style::default().fg(Color::White)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        lines.push(Line::from(Span::styled(
            format!(" {:<13}{:>3} ", field.label(), field.value(c)),
            sty,
        )));
    }

    // Preview of the fixed cycle, one cell per bar
    if !c.random_training {
        let mut preview: Vec<Span> = vec![Span::styled(" ", Style::default())];
        for bar in 1..=16u64 {
            let muted = fixed_cycle_muted(bar, c.play_bars, c.mute_bars);
            preview.push(if muted {
                Span::styled("▁", Style::default().fg(Color::Red))
            } else {
                Span::styled("█", Style::default().fg(Color::Green))
            });
        }
        lines.push(Line::from(preview));
    } else if app.is_playing() {
        let (phase, left) = app.training_phase();
        let (name, color) = match phase {
            Phase::Play => ("playing", Color::Green),
            Phase::Mute => ("muted", Color::Red),
        };
        lines.push(Line::from(vec![
            Span::styled(format!(" {name}"), Style::default().fg(color)),
            Span::styled(format!(", {left} bar(s) left in run"), Style::default().fg(Color::DarkGray)),
        ]));
    }

    let force = if c.force_play {
        Span::styled(" FORCE PLAY ", Style::default().fg(Color::Black).bg(Color::Magenta))
    } else {
        Span::styled(" force play off ", Style::default().fg(Color::DarkGray))
    };
    lines.push(Line::from(force));

    f.render_widget(Paragraph::new(lines).block(panel_block(title, focused)), area);
}

// ── Mixer panel ───────────────────────────────────────────────────────────────

fn draw_mixer(f: &mut Frame, area: Rect, app: &App) {
    let focused = app.mode == AppMode::Mixer;
    let title = if focused {
        " ► Mixer ─ [↑↓] Channel [←→] Level [Enter] Audible in mute ".to_string()
    } else {
        " Mixer ".to_string()
    };

    const BAR_WIDTH: usize = 20;
    let c = &app.control;
    let mut lines: Vec<Line> = Vec::new();
    for (i, ch) in MixerChannel::ALL.into_iter().enumerate() {
        let selected = focused && i == app.mixer_channel;
        let level = ch.level(c);
        let filled = ((level * BAR_WIDTH as f32).round() as usize).min(BAR_WIDTH);

        let name_sty = if selected {
            Style::default().fg(Color::Black).bg(Color::Yellow)
        } else {
            Style::default().fg(Color::White)
        };
        let bar_color = match ch {
            MixerChannel::Master  => Color::Magenta,
            MixerChannel::MuteDim => Color::Red,
            MixerChannel::Voice(_) => Color::Cyan,
        };
        let flag = match ch {
            MixerChannel::Voice(v) if c.audible_during_mute(v) => Span::styled(" M", Style::default().fg(Color::Red)),
            MixerChannel::Voice(_) => Span::styled(" ·", Style::default().fg(Color::DarkGray)),
            _ => Span::raw("  "),
        };

        lines.push(Line::from(vec![
            Span::styled(format!(" {:<9}", ch.label()), name_sty),
            Span::styled("█".repeat(filled), Style::default().fg(bar_color)),
            Span::styled("░".repeat(BAR_WIDTH - filled), Style::default().fg(Color::DarkGray)),
            Span::styled(format!("{:>4}%", (level * 100.0).round() as u32), Style::default().fg(Color::White)),
            flag,
        ]));
    }

    f.render_widget(Paragraph::new(lines).block(panel_block(title, focused)), area);
}

// ── Status bar ────────────────────────────────────────────────────────────────

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let c = &app.control;
    let master = if c.mix.master > 0.0 {
        Span::styled(format!("{:.0}%", c.mix.master * 100.0), Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD))
    } else {
        Span::styled("MUTED", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD))
    };
    let extra = if app.status_msg.is_empty() { String::new() } else { format!("  │  {}", app.status_msg) };

    let text = Line::from(vec![
        Span::styled("BPM: ",    Style::default().fg(Color::DarkGray)),
        Span::styled(c.bpm.to_string(), Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
        Span::raw("  │  "),
        Span::styled("Master: ", Style::default().fg(Color::DarkGray)),
        master,
        Span::styled(extra,      Style::default().fg(Color::Yellow)),
    ]);

    f.render_widget(
        Paragraph::new(text)
            .block(Block::default().title(" Status ").borders(Borders::ALL))
            .wrap(Wrap { trim: false }),
        area,
    );
}

// ── Timing log ────────────────────────────────────────────────────────────────

fn draw_log(f: &mut Frame, area: Rect, app: &App) {
    let rows = area.height.saturating_sub(2) as usize;
    let skip = app.log.len().saturating_sub(rows);
    let lines: Vec<Line> = app
        .log
        .lines()
        .skip(skip)
        .map(|l| {
            let color = if l.starts_with("[MUTE]") {
                Color::Red
            } else if l.starts_with("[PLAY]") {
                Color::Gray
            } else {
                Color::Yellow
            };
            Line::from(Span::styled(l.to_string(), Style::default().fg(color)))
        })
        .collect();

    f.render_widget(
        Paragraph::new(lines)
            .block(Block::default().title(format!(" Timing log ({}) ", app.log.len())).borders(Borders::ALL)),
        area,
    );
}

// ── Help panel ────────────────────────────────────────────────────────────────

fn draw_help(f: &mut Frame, area: Rect, app: &App) {
    let w = Style::default().fg(Color::White);
    let d = Style::default().fg(Color::DarkGray);

    let global = Line::from(vec![
        Span::styled("[Space] ",   w), Span::raw("Start/stop  │  "),
        Span::styled("[Tab] ",     w), Span::raw("Focus  │  "),
        Span::styled("[PgUp/Dn] ", w), Span::raw("BPM ±5  │  "),
        Span::styled("[r] ",       w), Span::raw("Random  │  "),
        Span::styled("[f] ",       w), Span::raw("Force play  │  "),
        Span::styled("[t] ",       w), Span::raw("Tone  │  "),
        Span::styled("[m] ",       w), Span::raw("Master mute  │  "),
        Span::styled("[c] ",       w), Span::raw("Clear log  │  "),
        Span::styled("[Esc/q] ",   w), Span::raw("Quit"),
    ]);

    let focus_line = match app.mode {
        AppMode::Tempo => Line::from(vec![
            Span::styled("Tempo: ", d),
            Span::styled("[↑↓] ", w), Span::raw("BPM ±1  │  "),
            Span::styled("[←→] ", w), Span::raw("Beats per bar"),
        ]),
        AppMode::Training => Line::from(vec![
            Span::styled("Training: ", d),
            Span::styled("[↑↓] ", w), Span::raw("Select field  │  "),
            Span::styled("[←→] ", w), Span::raw("Adjust (fixed fields apply unless random is on)"),
        ]),
        AppMode::Mixer => Line::from(vec![
            Span::styled("Mixer: ", d),
            Span::styled("[↑↓] ",    w), Span::raw("Channel  │  "),
            Span::styled("[←→] ",    w), Span::raw("Level ±5%  │  "),
            Span::styled("[Enter] ", w), Span::raw("Voice keeps sounding in mute bars (M)"),
        ]),
    };

    f.render_widget(
        Paragraph::new(vec![global, focus_line])
            .block(Block::default().title(" Help ").borders(Borders::ALL))
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: false }),
        area,
    );
}
