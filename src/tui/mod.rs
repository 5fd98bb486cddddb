mod export;
mod help;
mod state;

use crate::cli::{build_context, build_convert_request, build_download_request, Cli};
use crate::model::{AppEvent, JobKind, JobOutcome, JobRecord};
use crate::orchestrator::{self, ProcessedJob, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent,
        KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{push_wrapped_status_kv, shorten_path, ConvertField, DownloadField, JobView, Tab, UiState};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli) -> Result<()> {
    // Unbounded channels avoid backpressure between workers and the render loop.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // Tool lookup happens once, before the UI takes over the terminal.
    let ctx = Arc::new(build_context(&args));
    for tool in [("yt-dlp", &ctx.tools.ytdlp), ("ffmpeg", &ctx.tools.ffmpeg)] {
        if tool.1.is_none() {
            let _ = event_tx.send(AppEvent::Info(format!(
                "{} not found; install it or pass --{}-path",
                tool.0,
                tool.0.replace('-', "")
            )));
        }
    }

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_args = args.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(ui_args, event_rx, cmd_tx));

    let res = orchestrator::run_controller(ctx, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Seed the forms from command-line flags.
fn initial_state(args: &Cli) -> UiState {
    let mut state = UiState {
        auto_save: args.auto_save,
        history_load: args.history_load.max(1),
        ..Default::default()
    };
    if let Some(url) = args.url.as_ref() {
        state.download.url = url.trim().to_string();
    }
    if let Some(dir) = args.save_dir.as_ref() {
        state.download.save_dir = dir.display().to_string();
    }
    state.download.output = args.output;
    state.download.convert = args.convert;
    state.download.resolution = args.resolution;
    state.download.add_uploader = args.add_uploader;
    state.download.add_timestamp = args.add_timestamp;
    if let Some(file) = args.file.as_ref() {
        state.convert.file = file.display().to_string();
        if args.url.is_none() {
            state.tab = Tab::Convert;
        }
    }
    state.convert.target = args.convert_to;
    state.convert.resolution = args.convert_resolution;
    state
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(
    args: Cli,
    mut event_rx: UnboundedReceiver<AppEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = initial_state(&args);
    state.history = crate::storage::load_recent(state.history_load).unwrap_or_default();
    state.push_log("Ready.");

    if args.start_on_launch {
        match build_download_request(&args) {
            Some(req) => {
                state.download_job.reset_running();
                let _ = cmd_tx.send(UiCommand::StartDownload(req));
            }
            None => {
                if let Some(req) = build_convert_request(&args) {
                    state.convert_job.reset_running();
                    let _ = cmd_tx.send(UiCommand::StartConvert(req));
                }
            }
        }
    }

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            apply_event(&mut state, &ev);
            if let Some(processed) =
                orchestrator::process_job_completion(&ev, state.auto_save, state.history_load)
            {
                apply_processed(&mut state, processed);
            }
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            match event::read() {
                Ok(Event::Key(k)) => {
                    if k.kind != KeyEventKind::Press {
                        continue;
                    }
                    if let Some(cmd) = handle_key(&mut state, k) {
                        let quit = matches!(cmd, UiCommand::Quit);
                        let _ = cmd_tx.send(cmd);
                        if quit {
                            break Ok(());
                        }
                    }
                }
                Ok(Event::Paste(text)) => paste(&mut state, &text),
                _ => {}
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, DisableBracketedPaste, LeaveAlternateScreen).ok();
    res
}

fn warn(state: &mut UiState, msg: &str) {
    state.info = msg.to_string();
    state.push_log(format!("Warning: {msg}"));
}

fn focused_text(state: &mut UiState) -> Option<&mut String> {
    match state.tab {
        Tab::Download => state.download.text_mut(),
        Tab::Convert => state.convert.text_mut(),
        Tab::History | Tab::Help => None,
    }
}

/// Pasted text goes into the focused text field, newlines dropped.
fn paste(state: &mut UiState, text: &str) {
    if let Some(field) = focused_text(state) {
        field.extend(text.chars().filter(|c| *c != '\n' && *c != '\r'));
    }
}

/// Map a key press onto state changes and, possibly, a controller command.
fn handle_key(state: &mut UiState, k: KeyEvent) -> Option<UiCommand> {
    let ctrl = k.modifiers.contains(KeyModifiers::CONTROL);

    match (ctrl, k.code) {
        (_, KeyCode::Esc) | (true, KeyCode::Char('c')) => return Some(UiCommand::Quit),
        (_, KeyCode::Tab) => {
            state.tab = state.tab.next();
            return None;
        }
        (_, KeyCode::BackTab) => {
            state.tab = state.tab.prev();
            return None;
        }
        (_, KeyCode::F(1)) => {
            state.tab = Tab::Help;
            return None;
        }
        (true, KeyCode::Char('a')) => {
            state.auto_save = !state.auto_save;
            state.info = if state.auto_save {
                "Auto-save enabled".into()
            } else {
                "Auto-save disabled".into()
            };
            return None;
        }
        (true, KeyCode::Char('y')) => {
            copy_output_path(state);
            return None;
        }
        (true, KeyCode::Char('x')) => {
            if let Some(kind) = state.tab.job() {
                if state.job(kind).running {
                    return Some(UiCommand::Cancel(kind));
                }
                state.info = format!("No {kind} is running.");
            }
            return None;
        }
        _ => {}
    }

    match state.tab {
        Tab::Download => handle_download_key(state, k, ctrl),
        Tab::Convert => handle_convert_key(state, k, ctrl),
        Tab::History => {
            handle_history_key(state, k);
            None
        }
        Tab::Help => None,
    }
}

/// Keys shared by both forms: text editing. Returns true when consumed.
fn edit_text(field: &mut String, k: KeyEvent, ctrl: bool) -> bool {
    match (ctrl, k.code) {
        (true, KeyCode::Char('u')) => field.clear(),
        (false, KeyCode::Char(c)) => field.push(c),
        (_, KeyCode::Backspace) => {
            field.pop();
        }
        _ => return false,
    }
    true
}

fn handle_download_key(state: &mut UiState, k: KeyEvent, ctrl: bool) -> Option<UiCommand> {
    match (ctrl, k.code) {
        (_, KeyCode::Enter) => {
            if state.download_job.running {
                state.info = "A download is already running (Ctrl-X to cancel).".into();
                return None;
            }
            match state.download.to_request() {
                Ok(req) => {
                    state.download_job.reset_running();
                    state.info.clear();
                    return Some(UiCommand::StartDownload(req));
                }
                Err(w) => warn(state, w),
            }
        }
        (true, KeyCode::Char('f')) => {
            let url = state.download.url.trim().to_string();
            if url.is_empty() {
                warn(state, "Please paste a URL first.");
            } else {
                state.push_log("Fetching metadata...");
                return Some(UiCommand::FetchMetadata(url));
            }
        }
        (_, KeyCode::Up) => state.download.focus_next(false),
        (_, KeyCode::Down) => state.download.focus_next(true),
        (_, KeyCode::Left) if state.download.text_mut().is_none() => state.download.cycle(false),
        (_, KeyCode::Right) if state.download.text_mut().is_none() => state.download.cycle(true),
        (false, KeyCode::Char(' ')) if state.download.text_mut().is_none() => {
            state.download.cycle(true)
        }
        _ => {
            if let Some(field) = state.download.text_mut() {
                edit_text(field, k, ctrl);
            }
        }
    }
    None
}

fn handle_convert_key(state: &mut UiState, k: KeyEvent, ctrl: bool) -> Option<UiCommand> {
    match (ctrl, k.code) {
        (_, KeyCode::Enter) => {
            if state.convert_job.running {
                state.info = "A conversion is already running (Ctrl-X to cancel).".into();
                return None;
            }
            match state.convert.to_request() {
                Ok(req) => {
                    state.convert_job.reset_running();
                    state.info.clear();
                    return Some(UiCommand::StartConvert(req));
                }
                Err(w) => warn(state, w),
            }
        }
        (_, KeyCode::Up) => state.convert.focus_next(false),
        (_, KeyCode::Down) => state.convert.focus_next(true),
        (_, KeyCode::Left) if state.convert.text_mut().is_none() => state.convert.cycle(false),
        (_, KeyCode::Right) if state.convert.text_mut().is_none() => state.convert.cycle(true),
        (false, KeyCode::Char(' ')) if state.convert.text_mut().is_none() => {
            state.convert.cycle(true)
        }
        _ => {
            if let Some(field) = state.convert.text_mut() {
                edit_text(field, k, ctrl);
            }
        }
    }
    None
}

fn handle_history_key(state: &mut UiState, k: KeyEvent) {
    match k.code {
        KeyCode::Up | KeyCode::Char('k') => {
            if state.history_selected > 0 {
                state.history_selected -= 1;
                if state.history_selected < state.history_scroll_offset {
                    state.history_scroll_offset = state.history_selected;
                }
            }
        }
        KeyCode::Down | KeyCode::Char('j') => {
            if state.history_selected + 1 < state.history.len() {
                state.history_selected += 1;
            }
        }
        KeyCode::Char('r') => match crate::storage::load_recent(state.history_load) {
            Ok(history) => {
                state.history = history;
                state.clamp_history_selection();
                state.info = "Refreshed".into();
            }
            Err(e) => state.info = format!("Refresh failed: {e:#}"),
        },
        KeyCode::Char('e') => export::export_selected(state),
        KeyCode::Char('d') => {
            let Some(to_delete) = state.selected_record().cloned() else {
                return;
            };
            if let Err(e) = crate::storage::delete_record(&to_delete) {
                state.info = format!("Delete failed: {e:#}");
            } else {
                state.history.remove(state.history_selected);
                state.clamp_history_selection();
                state.info = "Deleted".into();
            }
        }
        _ => {}
    }
}

fn copy_output_path(state: &mut UiState) {
    let Some(path) = export::clipboard_candidate(state) else {
        state.info = "No output path to copy yet.".into();
        return;
    };
    match export::copy_to_clipboard(&path) {
        Ok(_) => {
            state.info = format!(
                "✓ Copied to clipboard: {}",
                shorten_path(std::path::Path::new(&path), 60)
            )
        }
        Err(e) => state.info = format!("Clipboard copy failed: {e:#}"),
    }
}

fn apply_event(state: &mut UiState, ev: &AppEvent) {
    match ev {
        AppEvent::JobStarted { job } => {
            state.job_mut(*job).reset_running();
            if *job == JobKind::Download {
                state.metadata = None;
            }
        }
        AppEvent::Status { job, message } => {
            state.job_mut(*job).status = message.clone();
            state.push_log(message.clone());
        }
        AppEvent::Progress {
            job,
            percent,
            speed,
            eta,
        } => {
            let view = state.job_mut(*job);
            view.percent = Some(*percent);
            view.speed = speed.clone();
            view.eta = eta.clone();
        }
        AppEvent::Metadata { info } => {
            state.push_log(format!("Title: {}", info.display_title()));
            if let Some(uploader) = info.uploader_name() {
                state.push_log(format!("Uploader: {uploader}"));
            }
            state.metadata = Some((**info).clone());
        }
        AppEvent::JobFinished { job, outcome, .. } => {
            let msg = outcome.to_message();
            let view = state.job_mut(*job);
            view.running = false;
            view.status = msg.clone();
            if outcome.is_success() {
                view.percent = Some(100.0);
            }
            state.push_log(msg);
            if let JobOutcome::SkippedUpscale { file: Some(p), .. }
            | JobOutcome::SkippedSameResolution { file: Some(p), .. } = outcome
            {
                state.push_log(format!("Kept original: {}", p.display()));
            }
            if let Some(p) = outcome.output() {
                state.last_output = Some(p.clone());
            }
        }
        AppEvent::JobFailed { job, error, .. } => {
            let view = state.job_mut(*job);
            view.running = false;
            view.status = error.clone();
            state.info = error.clone();
            state.push_log(error.clone());
        }
        AppEvent::Info(msg) => {
            state.info = msg.clone();
            state.push_log(msg.clone());
        }
    }
}

fn apply_processed(state: &mut UiState, processed: ProcessedJob) {
    if let Some(path) = processed.saved_path.as_ref() {
        tracing::debug!(path = %path.display(), id = %processed.record.id, "job record saved");
    }
    if let Some(e) = processed.save_error {
        state.info = e;
    }
    state.history = processed.history;
    state.clamp_history_selection();
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Min(10),
                Constraint::Length(9),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(area);

    let tabs = Tabs::new(Tab::ALL.iter().map(|t| Line::from(t.title())).collect::<Vec<_>>())
        .select(state.tab.index())
        .block(Block::default().borders(Borders::ALL).title("socialclip"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        Tab::Download => draw_download(chunks[1], f, state),
        Tab::Convert => draw_convert(chunks[1], f, state),
        Tab::History => draw_history(chunks[1], f, state),
        Tab::Help => help::draw_help(chunks[1], f),
    }

    draw_log(chunks[2], f, state);
    draw_footer(chunks[3], f, state);
}

/// One form row: `> Label: value`, highlighted when focused and dimmed when disabled.
fn field_line(label: &str, value: String, focused: bool, enabled: bool) -> Line<'static> {
    let value_style = if !enabled {
        Style::default().fg(Color::DarkGray)
    } else if focused {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::styled(
            if focused { "> " } else { "  " },
            Style::default().fg(Color::Yellow),
        ),
        Span::styled(format!("{label:<16}"), Style::default().fg(Color::Gray)),
        Span::styled(value, value_style),
    ])
}

fn text_value(text: &str, focused: bool) -> String {
    if focused {
        format!("{text}█")
    } else if text.is_empty() {
        "-".into()
    } else {
        text.to_string()
    }
}

fn check(on: bool) -> String {
    if on { "[x]" } else { "[ ]" }.to_string()
}

fn choice(label: &str) -> String {
    format!("< {label} >")
}

fn draw_download(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)].as_ref())
        .split(area);

    let form = &state.download;
    let is = |field: DownloadField| form.focus == field;
    let mut lines = vec![
        field_line("URL", text_value(&form.url, is(DownloadField::Url)), is(DownloadField::Url), true),
        field_line(
            "Save folder",
            text_value(&form.save_dir, is(DownloadField::SaveDir)),
            is(DownloadField::SaveDir),
            true,
        ),
        field_line(
            "Output",
            choice(form.output.label()),
            is(DownloadField::Output),
            true,
        ),
        field_line(
            "Convert",
            check(form.convert),
            is(DownloadField::Convert),
            form.output == crate::model::DownloadOutput::Mp4,
        ),
        field_line(
            "Resolution",
            choice(&form.resolution.to_string()),
            is(DownloadField::Resolution),
            form.resolution_enabled(),
        ),
        field_line(
            "Add uploader",
            check(form.add_uploader),
            is(DownloadField::AddUploader),
            true,
        ),
        field_line(
            "Add timestamp",
            check(form.add_timestamp),
            is(DownloadField::AddTimestamp),
            true,
        ),
        Line::from(""),
    ];
    lines.push(action_hint(&state.download_job, "download"));

    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Download"));
    f.render_widget(p, cols[0]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(4), Constraint::Length(7)].as_ref())
        .split(cols[1]);

    let mut preview: Vec<Line<'static>> = Vec::new();
    match state.metadata.as_ref() {
        Some(info) => {
            push_wrapped_status_kv(&mut preview, "Title", info.display_title(), right[0].width);
            push_wrapped_status_kv(
                &mut preview,
                "Uploader",
                info.uploader_name().unwrap_or("-"),
                right[0].width,
            );
            if let Some(h) = info.known_height() {
                push_wrapped_status_kv(&mut preview, "Height", &format!("{h}p"), right[0].width);
            }
            if let Some(d) = info.duration.filter(|d| *d > 0.0) {
                let d = humantime::format_duration(Duration::from_secs(d.round() as u64));
                push_wrapped_status_kv(&mut preview, "Duration", &d.to_string(), right[0].width);
            }
        }
        None => preview.push(Line::from(Span::styled(
            "Ctrl-F to fetch title and uploader",
            Style::default().fg(Color::DarkGray),
        ))),
    }
    let p = Paragraph::new(preview).block(Block::default().borders(Borders::ALL).title("Preview"));
    f.render_widget(p, right[0]);

    draw_job(right[1], f, &state.download_job, "Download job");
}

fn draw_convert(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)].as_ref())
        .split(area);

    let form = &state.convert;
    let is = |field: ConvertField| form.focus == field;
    let lines = vec![
        field_line("File", text_value(&form.file, is(ConvertField::File)), is(ConvertField::File), true),
        field_line(
            "Convert to",
            choice(form.target.label()),
            is(ConvertField::Target),
            true,
        ),
        field_line(
            "Resolution",
            choice(&form.resolution.to_string()),
            is(ConvertField::Resolution),
            !form.target.is_audio(),
        ),
        Line::from(""),
        action_hint(&state.convert_job, "conversion"),
    ];
    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Convert"));
    f.render_widget(p, cols[0]);

    draw_job(cols[1], f, &state.convert_job, "Convert job");
}

fn action_hint(job: &JobView, noun: &str) -> Line<'static> {
    if job.running {
        Line::from(vec![
            Span::styled("Running", Style::default().fg(Color::Green)),
            Span::raw(format!(" - start disabled while the {noun} runs, ")),
            Span::styled("Ctrl-X", Style::default().fg(Color::Magenta)),
            Span::raw(" to cancel"),
        ])
    } else {
        Line::from(vec![
            Span::styled("Enter", Style::default().fg(Color::Magenta)),
            Span::raw(format!(" to start the {noun}")),
        ])
    }
}

fn draw_job(area: Rect, f: &mut ratatui::Frame, job: &JobView, title: &str) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let percent = job.percent.unwrap_or(0.0).clamp(0.0, 100.0);
    let mut label = format!("{percent:.1}%");
    if job.running {
        if let Some(speed) = job.speed.as_deref() {
            label.push_str(&format!(" at {speed}"));
        }
        if let Some(eta) = job.eta.as_deref() {
            label.push_str(&format!(" ETA {eta}"));
        }
    }
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .gauge_style(Style::default().fg(if job.running { Color::Green } else { Color::Gray }))
        .ratio(percent / 100.0)
        .label(label);
    f.render_widget(gauge, rows[0]);

    let status = if job.status.is_empty() {
        "Idle".to_string()
    } else {
        job.status.clone()
    };
    let p = Paragraph::new(status)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(p, rows[1]);
}

fn draw_log(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let visible = (area.height as usize).saturating_sub(2);
    let skip = state.log.len().saturating_sub(visible);
    let lines: Vec<Line> = state
        .log
        .iter()
        .skip(skip)
        .map(|l| {
            Line::from(vec![
                Span::styled(format!("[{}] ", l.stamp), Style::default().fg(Color::Gray)),
                Span::raw(l.message.as_str()),
            ])
        })
        .collect();
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Console"));
    f.render_widget(p, area);
}

fn draw_footer(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let auto = if state.auto_save {
        Span::styled("auto-save on", Style::default().fg(Color::Green))
    } else {
        Span::styled("auto-save off", Style::default().fg(Color::DarkGray))
    };
    let line = Line::from(vec![
        auto,
        Span::raw(" | "),
        Span::raw(state.info.clone()),
    ]);
    let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(p, area);
}

/// RFC3339 UTC stamp rendered in local time, falling back to the raw value.
fn local_time_label(ts: &str) -> String {
    use time::format_description::well_known::Rfc3339;
    use time::macros::format_description;

    let Ok(utc) = time::OffsetDateTime::parse(ts, &Rfc3339) else {
        return ts.to_string();
    };
    match time::UtcOffset::current_local_offset() {
        Ok(offset) => utc
            .to_offset(offset)
            .format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]"
            ))
            .unwrap_or_else(|_| ts.to_string()),
        Err(_) => utc
            .format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second] UTC"
            ))
            .unwrap_or_else(|_| ts.to_string()),
    }
}

fn history_line(r: &JobRecord, idx: usize, selected: bool) -> Line<'static> {
    let style = if selected {
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    };
    let status = if r.ok {
        Span::styled(" OK ", if selected { style } else { Style::default().fg(Color::Green) })
    } else {
        Span::styled("FAIL", if selected { style } else { Style::default().fg(Color::Red) })
    };
    let detail = match r.output.as_ref() {
        Some(p) => shorten_path(p, 70),
        None => r.message.clone(),
    };
    Line::from(vec![
        Span::styled(
            format!("{:>2}. ", idx + 1),
            if selected { style } else { Style::default().fg(Color::Gray) },
        ),
        Span::styled(if selected { "> " } else { "  " }, style),
        Span::styled(local_time_label(&r.timestamp_utc), style),
        Span::styled("  ", style),
        Span::styled(format!("{:<8}", r.kind.to_string()), style),
        status,
        Span::styled(
            format!(
                " {:>6}  ",
                humantime::format_duration(Duration::from_secs(r.elapsed.as_secs())).to_string()
            ),
            style,
        ),
        Span::styled(detail, style),
    ])
}

fn draw_history(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut lines: Vec<Line> = Vec::new();
    // Borders, header, selected-entry detail and spacer.
    let max_items = (area.height as usize).saturating_sub(6).max(1);

    let total_count = state.history.len();
    let current_pos = if total_count > 0 {
        state.history_selected + 1
    } else {
        0
    };
    lines.push(Line::from(vec![
        Span::raw(format!("History ({current_pos}/{total_count}) - ")),
        Span::styled("↑/↓/j/k", Style::default().fg(Color::Magenta)),
        Span::raw(": navigate, "),
        Span::styled("r", Style::default().fg(Color::Magenta)),
        Span::raw(": refresh, "),
        Span::styled("d", Style::default().fg(Color::Magenta)),
        Span::raw(": delete, "),
        Span::styled("e", Style::default().fg(Color::Magenta)),
        Span::raw(": export JSON, "),
        Span::styled("Ctrl-Y", Style::default().fg(Color::Magenta)),
        Span::raw(": copy path"),
    ]));

    let mut detail: Vec<Line<'static>> = Vec::new();
    if let Some(r) = state.selected_record() {
        push_wrapped_status_kv(&mut detail, "Source", &r.source, area.width);
        push_wrapped_status_kv(&mut detail, "Result", &r.message, area.width);
    }
    lines.extend(detail.into_iter().take(2));
    lines.push(Line::from(""));

    // Keep the selected item visible.
    let scroll_offset = {
        let mut offset = state
            .history_scroll_offset
            .min(total_count.saturating_sub(1));
        if state.history_selected < offset {
            offset = state.history_selected;
        } else if state.history_selected >= offset + max_items {
            offset = state.history_selected + 1 - max_items;
        }
        offset
    };

    if state.history.is_empty() {
        lines.push(Line::from(Span::styled(
            "No finished jobs yet.",
            Style::default().fg(Color::DarkGray),
        )));
    }
    for (display_idx, r) in state
        .history
        .iter()
        .skip(scroll_offset)
        .take(max_items)
        .enumerate()
    {
        let idx = scroll_offset + display_idx;
        lines.push(history_line(r, idx, idx == state.history_selected));
    }

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("History"));
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DownloadOutput, MediaInfo, Resolution};
    use clap::Parser;
    use std::path::PathBuf;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_str(state: &mut UiState, s: &str) {
        for c in s.chars() {
            handle_key(state, key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn enter_without_url_warns_and_sends_nothing() {
        let mut state = UiState::default();
        assert!(handle_key(&mut state, key(KeyCode::Enter)).is_none());
        assert_eq!(state.info, "Please paste a URL first.");
        assert!(state
            .log
            .back()
            .unwrap()
            .message
            .ends_with("Please paste a URL first."));
    }

    #[test]
    fn typed_url_starts_download_once() {
        let mut state = UiState::default();
        type_str(&mut state, "https://example.com/v");
        match handle_key(&mut state, key(KeyCode::Enter)) {
            Some(UiCommand::StartDownload(req)) => assert_eq!(req.url, "https://example.com/v"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(state.download_job.running);
        assert!(handle_key(&mut state, key(KeyCode::Enter)).is_none());
        assert!(matches!(
            handle_key(&mut state, ctrl('x')),
            Some(UiCommand::Cancel(JobKind::Download))
        ));
    }

    #[test]
    fn space_toggles_checkbox_but_types_in_text_fields() {
        let mut state = UiState::default();
        type_str(&mut state, "a b");
        assert_eq!(state.download.url, "a b");
        for _ in 0..3 {
            handle_key(&mut state, key(KeyCode::Down));
        }
        assert_eq!(state.download.focus, DownloadField::Convert);
        handle_key(&mut state, key(KeyCode::Char(' ')));
        assert!(state.download.convert);
    }

    #[test]
    fn ctrl_f_fetches_metadata_for_url() {
        let mut state = UiState::default();
        state.download.url = " https://example.com/v ".into();
        match handle_key(&mut state, ctrl('f')) {
            Some(UiCommand::FetchMetadata(url)) => assert_eq!(url, "https://example.com/v"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn convert_tab_validates_file() {
        let mut state = UiState {
            tab: Tab::Convert,
            ..Default::default()
        };
        handle_key(&mut state, key(KeyCode::Enter));
        assert_eq!(state.info, "Please select a file to convert.");
        type_str(&mut state, "/no/such/file.mp4");
        handle_key(&mut state, key(KeyCode::Enter));
        assert_eq!(state.info, "Selected file path does not exist.");
    }

    #[test]
    fn tabs_and_quit_keys() {
        let mut state = UiState::default();
        handle_key(&mut state, key(KeyCode::BackTab));
        assert_eq!(state.tab, Tab::Help);
        handle_key(&mut state, key(KeyCode::Tab));
        assert_eq!(state.tab, Tab::Download);
        assert!(matches!(
            handle_key(&mut state, key(KeyCode::Esc)),
            Some(UiCommand::Quit)
        ));
        assert!(matches!(handle_key(&mut state, ctrl('c')), Some(UiCommand::Quit)));
    }

    #[test]
    fn finished_job_updates_view_and_last_output() {
        let mut state = UiState::default();
        apply_event(&mut state, &AppEvent::JobStarted { job: JobKind::Download });
        assert!(state.download_job.running);
        apply_event(
            &mut state,
            &AppEvent::Metadata {
                info: Box::new(MediaInfo {
                    title: Some("Clip".into()),
                    ..Default::default()
                }),
            },
        );
        apply_event(
            &mut state,
            &AppEvent::JobFinished {
                job: JobKind::Download,
                source: "u".into(),
                elapsed_ms: 5,
                outcome: JobOutcome::SkippedUpscale {
                    file: Some(PathBuf::from("/tmp/clip.mp4")),
                    source: 720,
                    target: 1080,
                },
            },
        );
        assert!(!state.download_job.running);
        assert_eq!(state.last_output, Some(PathBuf::from("/tmp/clip.mp4")));
        assert_eq!(
            state.log.back().unwrap().message,
            "Kept original: /tmp/clip.mp4"
        );
        assert_eq!(state.metadata.unwrap().display_title(), "Clip");
    }

    #[test]
    fn failure_is_surfaced_in_info() {
        let mut state = UiState::default();
        apply_event(
            &mut state,
            &AppEvent::JobFailed {
                job: JobKind::Convert,
                source: "f".into(),
                elapsed_ms: 1,
                error: "Error during conversion: boom".into(),
            },
        );
        assert_eq!(state.info, "Error during conversion: boom");
        assert_eq!(state.convert_job.status, "Error during conversion: boom");
    }

    #[test]
    fn paste_fills_focused_field_only() {
        let mut state = UiState::default();
        paste(&mut state, "https://example.com/v\n");
        assert_eq!(state.download.url, "https://example.com/v");
        state.tab = Tab::Help;
        paste(&mut state, "ignored");
        assert_eq!(state.download.url, "https://example.com/v");
    }

    #[test]
    fn flags_prefill_forms() {
        let args = Cli::try_parse_from([
            "socialclip",
            "--file",
            "in.mov",
            "--output",
            "mp3",
            "--resolution",
            "720",
        ])
        .unwrap();
        let state = initial_state(&args);
        assert_eq!(state.tab, Tab::Convert);
        assert_eq!(state.convert.file, "in.mov");
        assert_eq!(state.download.output, DownloadOutput::Mp3);
        assert_eq!(state.download.resolution, Resolution::P720);
    }

    #[test]
    fn local_time_label_passes_through_garbage() {
        assert_eq!(local_time_label("not a time"), "not a time");
        assert!(local_time_label("2024-05-01T10:20:30Z").starts_with("2024-05-0"));
    }
}
