use ratatui::{
    Frame,
    layout::{Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
};

use pipelog_logs::{ArcLogEntry, LevelFlags, LogLevel, LogSink};

use crate::app::AppState;
use crate::ui::components::StatusBar;
use crate::ui::{Layout, Theme};

/// Live view over the sink's visible entries
pub struct LogViewerScreen;

/// Truncate to at most `max_bytes`, backing off to a char boundary
fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut pos = max_bytes;
    while pos > 0 && !s.is_char_boundary(pos) {
        pos -= 1;
    }
    &s[..pos]
}

impl LogViewerScreen {
    pub fn render(frame: &mut Frame, state: &mut AppState, sink: &LogSink) {
        let show_filter_bar = state.ui_state.search_active
            || state.ui_state.active_filter.is_some()
            || state.ui_state.filter_error.is_some();

        let areas = Layout::log_viewer(frame.area(), state.ui_state.stats_visible, show_filter_bar);
        let mask = sink.filter();

        Self::render_header(frame, areas.header, state, mask);
        if let Some(area) = areas.stats {
            Self::render_stats_bar(frame, area, sink);
        }
        if let Some(area) = areas.filter {
            Self::render_filter_bar(frame, area, state);
        }
        Self::render_logs(frame, areas.logs, state, sink, mask);
        Self::render_status_bar(frame, areas.status, state, sink);
    }

    fn render_header(frame: &mut Frame, area: Rect, state: &AppState, mask: LevelFlags) {
        let mut spans = vec![
            Span::styled("pipelog", Theme::title()),
            Span::styled(" │ ", Theme::text_dim()),
            Span::styled(state.endpoint.clone(), Theme::text()),
            Span::styled(" │ ", Theme::text_dim()),
        ];

        // Mirrors one toggle button per level
        for (key, level) in ["1", "2", "3"].into_iter().zip(LogLevel::KNOWN) {
            let enabled = mask.intersects(level.flag());
            spans.push(Span::styled(format!("{}:", key), Theme::text_dim()));
            spans.push(Span::styled(level.as_str(), Theme::level_badge(level, enabled)));
            spans.push(Span::raw(" "));
        }

        if state.ui_state.auto_scroll {
            spans.push(Span::styled("│ ", Theme::text_dim()));
            spans.push(Span::styled(
                "following",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ));
        }

        let header = Paragraph::new(Line::from(spans)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border()),
        );

        frame.render_widget(header, area);
    }

    fn render_filter_bar(frame: &mut Frame, area: Rect, state: &AppState) {
        let mut spans = vec![];

        if state.ui_state.search_active {
            spans.push(Span::styled(
                " /",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ));
        } else {
            spans.push(Span::styled(" Filter: ", Theme::text_dim()));
        }

        let pattern = if state.ui_state.search_active {
            state.ui_state.search_input.as_str()
        } else if let Some(filter) = &state.ui_state.active_filter {
            filter.pattern()
        } else {
            ""
        };
        spans.push(Span::styled(pattern.to_string(), Theme::text_highlight()));

        if state.ui_state.search_active {
            spans.push(Span::styled(
                "█",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::SLOW_BLINK),
            ));
        }

        if let Some(err) = &state.ui_state.filter_error {
            spans.push(Span::styled(" ", Theme::text()));
            spans.push(Span::styled(format!("⚠ {}", err), Theme::error()));
        }

        if state.ui_state.active_filter.is_some() || state.ui_state.search_active {
            let case_text = if state.ui_state.filter_case_insensitive {
                "  [i] case-insensitive"
            } else {
                "  [i] case-sensitive"
            };
            spans.push(Span::styled(case_text, Theme::text_dim()));
        }

        if state.ui_state.search_active {
            spans.push(Span::styled(
                "  [Enter] Apply  [Esc] Cancel",
                Theme::text_dim(),
            ));
        } else if state.ui_state.active_filter.is_some() {
            spans.push(Span::styled("  [n] Clear  [/] Edit", Theme::text_dim()));
        }

        let border_style = if state.ui_state.search_active {
            Style::default().fg(Color::Yellow)
        } else if state.ui_state.filter_error.is_some() {
            Style::default().fg(Color::Red)
        } else {
            Theme::border()
        };

        let filter_bar = Paragraph::new(Line::from(spans)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(Span::styled(" Search ", Theme::title())),
        );

        frame.render_widget(filter_bar, area);
    }

    fn render_logs(
        frame: &mut Frame,
        area: Rect,
        state: &mut AppState,
        sink: &LogSink,
        mask: LevelFlags,
    ) {
        state.refresh_cache(sink);
        let total_logs = state.ui_state.filter_cache.cached_entries.len();

        // Inside the border
        let inner_height = area.height.saturating_sub(2) as usize;
        let max_scroll = total_logs.saturating_sub(inner_height);

        if state.ui_state.auto_scroll {
            state.ui_state.log_scroll = max_scroll;
        }
        state.ui_state.log_scroll = state.ui_state.log_scroll.min(max_scroll);

        // Borders and scrollbar
        let inner_width = area.width.saturating_sub(4) as usize;

        let view: &AppState = state;
        let lines: Vec<Line> = view
            .ui_state
            .filter_cache
            .cached_entries
            .iter()
            .skip(view.ui_state.log_scroll)
            .take(inner_height)
            .map(|entry| Self::format_log_line(entry, view, inner_width))
            .collect();

        let title = if view.ui_state.active_filter.is_some() {
            format!(" Logs ({} matching, mask {}) ", total_logs, mask)
        } else {
            format!(" Logs ({}, mask {}) ", total_logs, mask)
        };

        let logs_widget = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border())
                .title(Span::styled(title, Theme::title())),
        );

        frame.render_widget(logs_widget, area);

        if total_logs > inner_height {
            let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("▲"))
                .end_symbol(Some("▼"));
            let mut scrollbar_state = ScrollbarState::default()
                .content_length(max_scroll)
                .position(state.ui_state.log_scroll);

            frame.render_stateful_widget(
                scrollbar,
                area.inner(Margin {
                    vertical: 1,
                    horizontal: 0,
                }),
                &mut scrollbar_state,
            );
        }
    }

    fn render_stats_bar(frame: &mut Frame, area: Rect, sink: &LogSink) {
        let counts = sink.level_counts();

        let mut spans = vec![Span::raw(" ")];
        for (level, count) in [
            (LogLevel::Error, counts.error),
            (LogLevel::Warning, counts.warning),
            (LogLevel::Info, counts.info),
        ] {
            spans.push(Span::styled(
                format!("{}:", level.as_str()),
                Theme::level_badge(level, true),
            ));
            spans.push(Span::styled(format!("{} ", count), Theme::text()));
        }

        // Malformed level values only
        if counts.unknown > 0 {
            spans.push(Span::styled(
                format!("{}:", LogLevel::Unknown.as_str()),
                Theme::level_badge(LogLevel::Unknown, true),
            ));
            spans.push(Span::styled(format!("{} ", counts.unknown), Theme::text()));
        }

        spans.push(Span::styled("│ Total:", Theme::text_dim()));
        spans.push(Span::styled(counts.total().to_string(), Theme::text()));

        let stats_widget = Paragraph::new(Line::from(spans)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border())
                .title(Span::styled(" Stats ", Theme::title())),
        );

        frame.render_widget(stats_widget, area);
    }

    /// One display line: id, time, level, source label, message
    fn format_log_line(entry: &ArcLogEntry, state: &AppState, available_width: usize) -> Line<'static> {
        let level = entry.severity();
        let mut spans = vec![Span::styled(format!("{:>5} ", entry.id), Theme::text_dim())];
        let mut prefix_width = 6;

        if state.ui_state.show_timestamps {
            let time_str = entry.captured_at.format("%H:%M:%S%.3f ").to_string();
            prefix_width += time_str.len();
            spans.push(Span::styled(time_str, Theme::text_dim()));
        }

        spans.push(Span::styled(
            format!("{} ", level.as_str()),
            Theme::level_badge(level, true),
        ));
        prefix_width += 4;

        if state.ui_state.show_source {
            let label = format!("{} │ ", entry.label);
            prefix_width += label.chars().count();
            spans.push(Span::styled(label, Style::default().fg(Color::Cyan)));
        }

        let message_width = available_width.saturating_sub(prefix_width);
        let message = if entry.message.len() > message_width {
            format!(
                "{}…",
                safe_truncate(&entry.message, message_width.saturating_sub(1))
            )
        } else {
            entry.message.clone()
        };

        let base_style = Theme::level_text(level);
        let matches = state
            .ui_state
            .active_filter
            .as_ref()
            .map(|filter| filter.find_matches(&message))
            .unwrap_or_default();

        let mut last_end = 0;
        for (start, end) in matches {
            if start > last_end {
                spans.push(Span::styled(message[last_end..start].to_string(), base_style));
            }
            spans.push(Span::styled(message[start..end].to_string(), Theme::search_match()));
            last_end = end;
        }
        if last_end < message.len() {
            spans.push(Span::styled(message[last_end..].to_string(), base_style));
        }

        Line::from(spans)
    }

    fn render_status_bar(frame: &mut Frame, area: Rect, state: &AppState, sink: &LogSink) {
        let counts = sink.level_counts();
        let right_text = format!(
            "E:{} W:{} I:{} | {} logs {}",
            counts.error,
            counts.warning,
            counts.info,
            counts.total(),
            if state.ui_state.auto_scroll { "▼" } else { " " }
        );

        let mut bar = StatusBar::new()
            .hints([
                ("1-3", "Levels"),
                ("/", "Filter"),
                ("c", "Clear"),
                ("e", "Export"),
                ("?", "Help"),
                ("q", "Quit"),
            ])
            .right(right_text);

        if let Some(message) = &state.message {
            bar = bar.notice(message.clone(), Theme::text_highlight());
        }

        frame.render_widget(bar, area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use pipelog_logs::DisplayLogEntry;
    use pipelog_types::LogRecord;
    use ratatui::{Terminal, backend::TestBackend};

    use crate::app::Action;

    fn screen_text(state: &mut AppState, sink: &LogSink) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal
            .draw(|frame| LogViewerScreen::render(frame, state, sink))
            .unwrap();

        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    fn append(sink: &LogSink, level: LogLevel, message: &str) {
        sink.append(DisplayLogEntry::from_record(
            LogRecord::new(level, message).at(r"C:\src\Audio.cpp", "Mixer::Run", 12),
            Local::now(),
        ));
    }

    #[test]
    fn test_safe_truncate() {
        assert_eq!(safe_truncate("hello", 10), "hello");
        assert_eq!(safe_truncate("hello", 3), "hel");
        // 'é' is two bytes
        assert_eq!(safe_truncate("é", 1), "");
    }

    #[test]
    fn test_renders_visible_entries_only() {
        let sink = LogSink::new();
        append(&sink, LogLevel::Info, "buffer primed");
        append(&sink, LogLevel::Error, "underrun");

        let mut state = AppState::new("/tmp/pipelog.sock", ".");
        let text = screen_text(&mut state, &sink);
        assert!(text.contains("/tmp/pipelog.sock"));
        assert!(text.contains("buffer primed"));
        assert!(text.contains("Audio.cpp: Mixer::Run (12)"));

        state.apply(Action::ToggleLevel(LogLevel::Info), &sink);
        let text = screen_text(&mut state, &sink);
        assert!(!text.contains("buffer primed"));
        assert!(text.contains("underrun"));
    }

    #[test]
    fn test_follow_keeps_newest_on_screen() {
        let sink = LogSink::new();
        for i in 0..100 {
            append(&sink, LogLevel::Info, &format!("line {i:03}"));
        }

        let mut state = AppState::new("pipe", ".");
        let text = screen_text(&mut state, &sink);
        assert!(text.contains("line 099"));
        assert!(!text.contains("line 000"));

        state.apply(Action::ScrollToTop, &sink);
        let text = screen_text(&mut state, &sink);
        assert!(text.contains("line 000"));
        assert!(!text.contains("line 099"));
    }

    #[test]
    fn test_notice_shown_in_status_bar() {
        let sink = LogSink::new();
        let mut state = AppState::new("pipe", ".");
        state.message = Some("Export failed: denied".to_string());

        let text = screen_text(&mut state, &sink);
        assert!(text.contains("Export failed: denied"));
    }
}
