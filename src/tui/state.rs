use crate::model::{
    ConvertRequest, ConvertTarget, DownloadOutput, DownloadRequest, JobKind, JobRecord, MediaInfo,
    Resolution,
};
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use time::macros::format_description;

const LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Download,
    Convert,
    History,
    Help,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::Download, Tab::Convert, Tab::History, Tab::Help];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Download => "Download",
            Tab::Convert => "Convert",
            Tab::History => "History",
            Tab::Help => "Help",
        }
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    /// Job kind driven from this tab, if any.
    pub fn job(self) -> Option<JobKind> {
        match self {
            Tab::Download => Some(JobKind::Download),
            Tab::Convert => Some(JobKind::Convert),
            Tab::History | Tab::Help => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadField {
    Url,
    SaveDir,
    Output,
    Convert,
    Resolution,
    AddUploader,
    AddTimestamp,
}

impl DownloadField {
    pub const ALL: [DownloadField; 7] = [
        DownloadField::Url,
        DownloadField::SaveDir,
        DownloadField::Output,
        DownloadField::Convert,
        DownloadField::Resolution,
        DownloadField::AddUploader,
        DownloadField::AddTimestamp,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertField {
    File,
    Target,
    Resolution,
}

impl ConvertField {
    pub const ALL: [ConvertField; 3] = [
        ConvertField::File,
        ConvertField::Target,
        ConvertField::Resolution,
    ];
}

fn step<T: Copy + PartialEq>(all: &[T], cur: T, forward: bool) -> T {
    let idx = all.iter().position(|f| *f == cur).unwrap_or(0);
    let n = all.len();
    if forward {
        all[(idx + 1) % n]
    } else {
        all[(idx + n - 1) % n]
    }
}

#[derive(Debug, Clone)]
pub struct DownloadForm {
    pub url: String,
    pub save_dir: String,
    pub output: DownloadOutput,
    pub convert: bool,
    pub resolution: Resolution,
    pub add_uploader: bool,
    pub add_timestamp: bool,
    pub focus: DownloadField,
}

impl Default for DownloadForm {
    fn default() -> Self {
        Self {
            url: String::new(),
            save_dir: crate::naming::default_download_folder()
                .display()
                .to_string(),
            output: DownloadOutput::Mp4,
            convert: false,
            resolution: Resolution::default(),
            add_uploader: false,
            add_timestamp: false,
            focus: DownloadField::Url,
        }
    }
}

impl DownloadForm {
    pub fn focus_next(&mut self, forward: bool) {
        self.focus = step(&DownloadField::ALL, self.focus, forward);
    }

    /// The editable text under the cursor, if the focused field is a text box.
    pub fn text_mut(&mut self) -> Option<&mut String> {
        match self.focus {
            DownloadField::Url => Some(&mut self.url),
            DownloadField::SaveDir => Some(&mut self.save_dir),
            _ => None,
        }
    }

    /// Change the focused option. Resolution only moves while conversion applies.
    pub fn cycle(&mut self, forward: bool) {
        match self.focus {
            DownloadField::Output => self.output = self.output.cycle(),
            DownloadField::Convert => self.convert = !self.convert,
            DownloadField::Resolution if self.resolution_enabled() => {
                self.resolution = if forward {
                    self.resolution.next()
                } else {
                    self.resolution.prev()
                };
            }
            DownloadField::AddUploader => self.add_uploader = !self.add_uploader,
            DownloadField::AddTimestamp => self.add_timestamp = !self.add_timestamp,
            _ => {}
        }
    }

    /// The resolution picker is greyed out unless a video download will be converted.
    pub fn resolution_enabled(&self) -> bool {
        self.convert && self.output == DownloadOutput::Mp4
    }

    pub fn to_request(&self) -> Result<DownloadRequest, &'static str> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err("Please paste a URL first.");
        }
        let save_dir = match self.save_dir.trim() {
            "" => crate::naming::default_download_folder(),
            dir => PathBuf::from(dir),
        };
        Ok(DownloadRequest {
            url: url.to_string(),
            save_dir,
            output: self.output,
            convert: self.convert,
            resolution: self.resolution,
            add_uploader: self.add_uploader,
            add_timestamp: self.add_timestamp,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ConvertForm {
    pub file: String,
    pub target: ConvertTarget,
    pub resolution: Resolution,
    pub focus: ConvertField,
}

impl Default for ConvertForm {
    fn default() -> Self {
        Self {
            file: String::new(),
            target: ConvertTarget::Mp4,
            resolution: Resolution::default(),
            focus: ConvertField::File,
        }
    }
}

impl ConvertForm {
    pub fn focus_next(&mut self, forward: bool) {
        self.focus = step(&ConvertField::ALL, self.focus, forward);
    }

    pub fn text_mut(&mut self) -> Option<&mut String> {
        match self.focus {
            ConvertField::File => Some(&mut self.file),
            _ => None,
        }
    }

    pub fn cycle(&mut self, forward: bool) {
        match self.focus {
            ConvertField::Target => self.target = self.target.cycle(),
            ConvertField::Resolution if !self.target.is_audio() => {
                self.resolution = if forward {
                    self.resolution.next()
                } else {
                    self.resolution.prev()
                };
            }
            _ => {}
        }
    }

    pub fn to_request(&self) -> Result<ConvertRequest, &'static str> {
        let file = self.file.trim();
        if file.is_empty() {
            return Err("Please select a file to convert.");
        }
        let input = PathBuf::from(file);
        if !input.exists() {
            return Err("Selected file path does not exist.");
        }
        Ok(ConvertRequest {
            input,
            target: self.target,
            resolution: self.resolution,
        })
    }
}

/// Live view of one worker.
#[derive(Debug, Clone, Default)]
pub struct JobView {
    pub running: bool,
    pub percent: Option<f64>,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub status: String,
}

impl JobView {
    pub fn reset_running(&mut self) {
        *self = JobView {
            running: true,
            ..Default::default()
        };
    }
}

#[derive(Debug, Clone)]
pub struct LogLine {
    pub stamp: String,
    pub message: String,
}

pub struct UiState {
    pub tab: Tab,
    pub info: String,
    pub download: DownloadForm,
    pub convert: ConvertForm,
    pub download_job: JobView,
    pub convert_job: JobView,
    pub metadata: Option<MediaInfo>,
    pub log: VecDeque<LogLine>,

    pub history: Vec<JobRecord>,
    pub history_selected: usize, // Index of selected history item (0 = most recent)
    pub history_scroll_offset: usize,
    pub history_load: usize,
    pub auto_save: bool,
    pub last_output: Option<PathBuf>,
    pub last_exported_path: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: Tab::Download,
            info: String::new(),
            download: DownloadForm::default(),
            convert: ConvertForm::default(),
            download_job: JobView::default(),
            convert_job: JobView::default(),
            metadata: None,
            log: VecDeque::new(),
            history: Vec::new(),
            history_selected: 0,
            history_scroll_offset: 0,
            history_load: 50,
            auto_save: true,
            last_output: None,
            last_exported_path: None,
        }
    }
}

impl UiState {
    pub fn job(&self, kind: JobKind) -> &JobView {
        match kind {
            JobKind::Download => &self.download_job,
            JobKind::Convert => &self.convert_job,
        }
    }

    pub fn job_mut(&mut self, kind: JobKind) -> &mut JobView {
        match kind {
            JobKind::Download => &mut self.download_job,
            JobKind::Convert => &mut self.convert_job,
        }
    }

    /// Append to the console log as `[HH:MM:SS] message`.
    pub fn push_log(&mut self, message: impl Into<String>) {
        let stamp = crate::naming::local_now()
            .format(format_description!("[hour]:[minute]:[second]"))
            .unwrap_or_default();
        self.log.push_back(LogLine {
            stamp,
            message: message.into(),
        });
        while self.log.len() > LOG_CAPACITY {
            self.log.pop_front();
        }
    }

    /// Keep the history selection inside the list after it shrinks or reloads.
    pub fn clamp_history_selection(&mut self) {
        if self.history.is_empty() {
            self.history_selected = 0;
            self.history_scroll_offset = 0;
            return;
        }
        if self.history_selected >= self.history.len() {
            self.history_selected = self.history.len() - 1;
        }
        if self.history_scroll_offset > self.history_selected {
            self.history_scroll_offset = self.history_selected;
        }
    }

    pub fn selected_record(&self) -> Option<&JobRecord> {
        self.history.get(self.history_selected)
    }
}

/// Show a long path with its head elided.
pub fn shorten_path(path: &Path, max: usize) -> String {
    let s = path.display().to_string();
    let n = s.chars().count();
    if n <= max || max < 4 {
        return s;
    }
    let tail: String = s.chars().skip(n - (max - 3)).collect();
    format!("...{tail}")
}

pub fn push_wrapped_status_kv(
    out: &mut Vec<Line<'static>>,
    label: &str,
    value: &str,
    status_area_width: u16,
) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    // Account for borders (2 chars on each side)
    let usable_width = status_area_width.saturating_sub(4).max(1);
    let label_text = format!("{label}:");
    let label_width = label_text.chars().count() as u16;

    let value_chars: Vec<char> = value.chars().collect();
    let mut remaining = value_chars.as_slice();
    let mut first = true;

    while !remaining.is_empty() {
        let line_width = if first {
            usable_width.saturating_sub(label_width + 1).max(1)
        } else {
            usable_width.saturating_sub(2).max(1)
        };

        let chars_to_take = (remaining.len() as u16).min(line_width) as usize;
        let (line_chars, rest) = remaining.split_at(chars_to_take);
        let line_text: String = line_chars.iter().collect();

        if first {
            out.push(Line::from(vec![
                Span::styled(label_text.clone(), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::raw(line_text),
            ]));
            first = false;
        } else {
            out.push(Line::from(vec![Span::raw("  "), Span::raw(line_text)]));
        }

        remaining = rest;
    }
}
