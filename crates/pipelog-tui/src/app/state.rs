use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use pipelog_logs::{ArcLogEntry, LevelFlags, LogSink, SinkEvent, TextFilter};
use tracing::{debug, warn};

use super::Action;

/// Lines moved by PageUp/PageDown
const PAGE_SIZE: usize = 20;

/// Cache for filtered log results to avoid re-filtering on every render
#[derive(Default)]
pub struct FilterCache {
    /// Text filter pattern when the cache was built (None = no text filter)
    cached_pattern: Option<String>,
    cached_case_insensitive: bool,
    /// Level mask when the cache was built
    cached_mask: LevelFlags,
    /// Sink entry count when the cache was built
    cached_log_count: usize,
    /// The cached filtered entries
    pub cached_entries: Vec<ArcLogEntry>,
    /// Whether cache is valid
    pub is_valid: bool,
}

impl FilterCache {
    /// Check if cache needs to be rebuilt for the current view
    pub fn needs_refresh(
        &self,
        filter: Option<&TextFilter>,
        case_insensitive: bool,
        mask: LevelFlags,
        current_log_count: usize,
    ) -> bool {
        !self.is_valid
            || self.cached_log_count != current_log_count
            || self.cached_mask != mask
            || self.cached_case_insensitive != case_insensitive
            || self.cached_pattern.as_deref() != filter.map(|f| f.pattern())
    }

    pub fn update(
        &mut self,
        filter: Option<&TextFilter>,
        case_insensitive: bool,
        mask: LevelFlags,
        log_count: usize,
        entries: Vec<ArcLogEntry>,
    ) {
        self.cached_pattern = filter.map(|f| f.pattern().to_string());
        self.cached_case_insensitive = case_insensitive;
        self.cached_mask = mask;
        self.cached_log_count = log_count;
        self.cached_entries = entries;
        self.is_valid = true;
    }

    pub fn invalidate(&mut self) {
        self.is_valid = false;
    }
}

/// UI-specific transient state
pub struct UiState {
    /// Is search/filter bar active?
    pub search_active: bool,

    /// Current search input text
    pub search_input: String,

    /// Is help overlay visible?
    pub help_visible: bool,

    /// Scroll position in the log list
    pub log_scroll: usize,

    /// Follow mode: stick to the newest entry
    pub auto_scroll: bool,

    pub show_timestamps: bool,

    /// Show the "file: function (line)" column?
    pub show_source: bool,

    /// Show the per-level counts bar?
    pub stats_visible: bool,

    /// Currently active text filter (None = show everything the mask allows)
    pub active_filter: Option<TextFilter>,

    /// Filter input error message (e.g., invalid regex)
    pub filter_error: Option<String>,

    pub filter_case_insensitive: bool,

    /// Cache for filtered log results
    pub filter_cache: FilterCache,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            search_active: false,
            search_input: String::new(),
            help_visible: false,
            log_scroll: 0,
            auto_scroll: true,
            show_timestamps: true,
            show_source: true,
            stats_visible: false,
            active_filter: None,
            filter_error: None,
            filter_case_insensitive: true,
            filter_cache: FilterCache::default(),
        }
    }
}

/// Global viewer state
pub struct AppState {
    /// Endpoint the collector listens on, shown in the header
    pub endpoint: String,

    /// Directory exports are written to
    pub export_dir: PathBuf,

    pub ui_state: UiState,

    /// One-line notice shown in the status bar (export result, errors)
    pub message: Option<String>,

    /// Whether app should quit
    pub should_quit: bool,

    /// Only render when true
    pub render_dirty: bool,
}

impl AppState {
    pub fn new(endpoint: impl Into<String>, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: endpoint.into(),
            export_dir: export_dir.into(),
            ui_state: UiState::default(),
            message: None,
            should_quit: false,
            render_dirty: true,
        }
    }

    /// Apply an action; mask and clear changes go straight to the sink
    pub fn apply(&mut self, action: Action, sink: &LogSink) {
        self.render_dirty = true;

        match action {
            Action::Quit => self.should_quit = true,

            Action::ScrollUp(n) => {
                self.ui_state.auto_scroll = false;
                self.ui_state.log_scroll = self.ui_state.log_scroll.saturating_sub(n);
            }
            Action::ScrollDown(n) => {
                self.ui_state.auto_scroll = false;
                // Clamped against the filtered count at render time
                self.ui_state.log_scroll = self.ui_state.log_scroll.saturating_add(n);
            }
            Action::PageUp => self.apply(Action::ScrollUp(PAGE_SIZE), sink),
            Action::PageDown => self.apply(Action::ScrollDown(PAGE_SIZE), sink),
            Action::ScrollToTop => {
                self.ui_state.auto_scroll = false;
                self.ui_state.log_scroll = 0;
            }
            Action::ScrollToBottom => {
                self.ui_state.auto_scroll = true;
                self.ui_state.log_scroll = usize::MAX;
            }
            Action::ToggleFollow => {
                self.ui_state.auto_scroll = !self.ui_state.auto_scroll;
            }

            Action::ToggleLevel(level) => {
                let mut mask = sink.filter();
                mask.toggle(level.flag());
                sink.set_filter(mask);
                debug!(%mask, "Level mask changed");
            }
            Action::ShowAllLevels => sink.set_filter(LevelFlags::ALL),

            Action::ClearLogs => {
                sink.clear();
                self.ui_state.log_scroll = 0;
                self.ui_state.auto_scroll = true;
            }
            Action::ExportLogs => {
                let entries = self.filtered_entries(sink);
                let path = self.export_path();
                self.message = Some(match export_to_file(&path, &entries) {
                    Ok(count) => format!("Exported {} logs to {}", count, path.display()),
                    Err(e) => {
                        warn!(error = %e, path = %path.display(), "Export failed");
                        format!("Export failed: {}", e)
                    }
                });
            }

            Action::OpenSearch => self.start_search(),
            Action::CloseSearch => self.cancel_search(),
            Action::SearchInput(c) => self.ui_state.search_input.push(c),
            Action::SearchBackspace => {
                self.ui_state.search_input.pop();
            }
            Action::SearchClear => self.ui_state.search_input.clear(),
            Action::ApplyFilter => {
                self.apply_filter();
                self.ui_state.log_scroll = 0;
            }
            Action::ClearFilter => self.clear_filter(),
            Action::ToggleCaseSensitive => {
                self.ui_state.filter_case_insensitive = !self.ui_state.filter_case_insensitive;
                if let Some(filter) = &self.ui_state.active_filter {
                    self.ui_state.search_input = filter.pattern().to_string();
                    self.apply_filter();
                }
            }

            Action::ToggleTimestamps => {
                self.ui_state.show_timestamps = !self.ui_state.show_timestamps;
            }
            Action::ToggleSource => self.ui_state.show_source = !self.ui_state.show_source,
            Action::ToggleStats => self.ui_state.stats_visible = !self.ui_state.stats_visible,
            Action::ToggleHelp => self.ui_state.help_visible = !self.ui_state.help_visible,
            Action::DismissMessage => self.message = None,
        }
    }

    /// React to a sink change notification
    pub fn on_sink_event(&mut self, event: &SinkEvent) {
        if matches!(event, SinkEvent::Cleared | SinkEvent::FilterChanged(_)) {
            self.ui_state.filter_cache.invalidate();
        }
        self.render_dirty = true;
    }

    /// Entries passing both the sink's mask and the text filter
    pub fn filtered_entries(&self, sink: &LogSink) -> Vec<ArcLogEntry> {
        match &self.ui_state.active_filter {
            Some(filter) => sink.visible_where(|e| filter.matches(e)),
            None => sink.visible(),
        }
    }

    /// Rebuild the filter cache if the sink or the filters changed
    pub fn refresh_cache(&mut self, sink: &LogSink) {
        let mask = sink.filter();
        let count = sink.len();
        let cache = &self.ui_state.filter_cache;
        if !cache.needs_refresh(
            self.ui_state.active_filter.as_ref(),
            self.ui_state.filter_case_insensitive,
            mask,
            count,
        ) {
            return;
        }

        let entries = self.filtered_entries(sink);
        self.ui_state.filter_cache.update(
            self.ui_state.active_filter.as_ref(),
            self.ui_state.filter_case_insensitive,
            mask,
            count,
            entries,
        );
    }

    fn export_path(&self) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.export_dir.join(format!("pipelog_{}.jsonl", timestamp))
    }

    fn start_search(&mut self) {
        self.ui_state.search_active = true;
        self.ui_state.search_input.clear();
        self.ui_state.filter_error = None;
    }

    fn cancel_search(&mut self) {
        self.ui_state.search_active = false;
        self.ui_state.search_input.clear();
        self.ui_state.filter_error = None;
    }

    fn apply_filter(&mut self) {
        self.ui_state.search_active = false;
        self.ui_state.filter_error = None;

        if self.ui_state.search_input.is_empty() {
            self.ui_state.active_filter = None;
            return;
        }

        let result = if self.ui_state.filter_case_insensitive {
            TextFilter::new_case_insensitive(&self.ui_state.search_input)
        } else {
            TextFilter::new(&self.ui_state.search_input)
        };

        match result {
            Ok(filter) => self.ui_state.active_filter = Some(filter),
            Err(e) => {
                self.ui_state.filter_error = Some(format!("Invalid regex: {}", e));
                // Keep input open to fix
                self.ui_state.search_active = true;
            }
        }
    }

    fn clear_filter(&mut self) {
        self.ui_state.active_filter = None;
        self.ui_state.search_input.clear();
        self.ui_state.filter_error = None;
    }
}

fn export_to_file(path: &Path, entries: &[ArcLogEntry]) -> std::io::Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    LogSink::export_json_lines(entries, BufWriter::new(file))
}
