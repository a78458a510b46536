use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::Widget,
};

use crate::ui::Theme;

/// Bottom line with key hints on the left and a summary on the right
pub struct StatusBar<'a> {
    hints: Vec<(&'a str, &'a str)>,
    notice: Option<(String, Style)>,
    right_text: Option<String>,
}

impl<'a> StatusBar<'a> {
    pub fn new() -> Self {
        Self {
            hints: Vec::new(),
            notice: None,
            right_text: None,
        }
    }

    /// Add keyboard hints as (key, description) pairs
    pub fn hints<I>(mut self, hints: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.hints = hints.into_iter().collect();
        self
    }

    /// Show a message in place of the hints
    pub fn notice<S: Into<String>>(mut self, text: S, style: Style) -> Self {
        self.notice = Some((text.into(), style));
        self
    }

    /// Set text to display on the right side
    pub fn right<S: Into<String>>(mut self, text: S) -> Self {
        self.right_text = Some(text.into());
        self
    }
}

impl Default for StatusBar<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        buf.set_style(area, Theme::status_bar());

        let line = match self.notice {
            Some((text, style)) => Line::from(Span::styled(text, style.bg(Color::DarkGray))),
            None => {
                let mut spans = Vec::new();
                for (i, (key, desc)) in self.hints.iter().enumerate() {
                    if i > 0 {
                        spans.push(Span::styled(" ", Theme::status_bar()));
                    }
                    spans.push(Span::styled(format!("[{}]", key), Theme::status_bar_key()));
                    spans.push(Span::styled(desc.to_string(), Theme::status_bar()));
                }
                Line::from(spans)
            }
        };
        let line_width = line.width() as u16;

        buf.set_line(area.x + 1, area.y, &line, area.width.saturating_sub(2));

        if let Some(right) = self.right_text {
            let right_width = Line::from(right.as_str()).width() as u16;
            let right_x = area.x + area.width.saturating_sub(right_width + 1);
            // Hidden when it would overlap the hints
            if right_x > area.x + line_width + 2 {
                buf.set_span(
                    right_x,
                    area.y,
                    &Span::styled(right.as_str(), Theme::status_bar()),
                    right_width,
                );
            }
        }
    }
}
