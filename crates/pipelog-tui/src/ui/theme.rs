use pipelog_types::LogLevel;
use ratatui::style::{Color, Modifier, Style};

/// Color theme for the viewer
pub struct Theme;

impl Theme {
    pub const BG: Color = Color::Reset;
    pub const FG: Color = Color::White;
    pub const FG_DIM: Color = Color::DarkGray;

    pub const PRIMARY: Color = Color::Cyan;
    pub const HIGHLIGHT: Color = Color::Yellow;

    pub const ERROR: Color = Color::Red;

    pub fn border() -> Style {
        Style::default().fg(Self::FG_DIM)
    }

    pub fn title() -> Style {
        Style::default()
            .fg(Self::PRIMARY)
            .add_modifier(Modifier::BOLD)
    }

    pub fn text() -> Style {
        Style::default().fg(Self::FG)
    }

    pub fn text_dim() -> Style {
        Style::default().fg(Self::FG_DIM)
    }

    pub fn text_highlight() -> Style {
        Style::default()
            .fg(Self::HIGHLIGHT)
            .add_modifier(Modifier::BOLD)
    }

    /// Search match inside a log line
    pub fn search_match() -> Style {
        Style::default()
            .fg(Color::Black)
            .bg(Self::HIGHLIGHT)
            .add_modifier(Modifier::BOLD)
    }

    /// Level badge; dimmed and struck through when the level is masked out
    pub fn level_badge(level: LogLevel, enabled: bool) -> Style {
        if enabled {
            Style::default()
                .fg(level.color())
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
                .fg(Self::FG_DIM)
                .add_modifier(Modifier::CROSSED_OUT)
        }
    }

    /// Message text: errors and warnings keep their level color
    pub fn level_text(level: LogLevel) -> Style {
        match level {
            LogLevel::Error | LogLevel::Warning => Style::default().fg(level.color()),
            _ => Self::text(),
        }
    }

    pub fn status_bar() -> Style {
        Style::default().fg(Self::FG).bg(Color::DarkGray)
    }

    pub fn status_bar_key() -> Style {
        Style::default()
            .fg(Self::HIGHLIGHT)
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD)
    }

    pub fn error() -> Style {
        Style::default()
            .fg(Self::ERROR)
            .add_modifier(Modifier::BOLD)
    }
}
