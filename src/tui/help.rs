use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

/// One keybind row; keys are padded so descriptions line up.
fn key_line(keys: &[&'static str], desc: &'static str) -> Line<'static> {
    let mut spans = vec![Span::raw("  ")];
    let mut width = 0;
    for (i, k) in keys.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" / "));
            width += 3;
        }
        spans.push(Span::styled(*k, Style::default().fg(Color::Magenta)));
        width += k.chars().count();
    }
    spans.push(Span::raw(" ".repeat(20usize.saturating_sub(width).max(1))));
    spans.push(Span::raw(desc));
    Line::from(spans)
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        key_line(&["Esc", "Ctrl-C"], "Quit (running jobs are cancelled)"),
        key_line(&["Tab", "Shift-Tab"], "Switch tabs"),
        key_line(&["F1"], "Show this help"),
        key_line(&["Ctrl-A"], "Toggle auto-save of job history"),
        key_line(&["Ctrl-Y"], "Copy last output path to clipboard"),
        Line::from(""),
        Line::from("Download / Convert tabs:"),
        key_line(&["↑/↓"], "Move between fields"),
        key_line(&["←/→", "Space"], "Change the selected option"),
        key_line(&["Enter"], "Start download / conversion"),
        key_line(&["Ctrl-F"], "Fetch title and uploader for the URL"),
        key_line(&["Ctrl-X"], "Cancel the running job"),
        key_line(&["Ctrl-U"], "Clear the text field"),
        Line::from(""),
        Line::from("History tab:"),
        key_line(&["↑/↓", "j/k"], "Navigate"),
        key_line(&["e"], "Export selected as JSON"),
        key_line(&["d"], "Delete selected"),
        key_line(&["r"], "Refresh history"),
        Line::from(""),
        Line::from("Notes:"),
        Line::from("  Conversion never upscales: a lower-resolution source is kept as is."),
        Line::from("  Existing files are never overwritten; a numeric suffix is added."),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
