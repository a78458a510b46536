use ratatui::layout::{Constraint, Direction, Layout as RatatuiLayout, Rect};

/// Vertical split of the log viewer
pub struct ViewerAreas {
    pub header: Rect,
    pub stats: Option<Rect>,
    pub filter: Option<Rect>,
    pub logs: Rect,
    pub status: Rect,
}

/// Layout helper for consistent screen layouts
pub struct Layout;

impl Layout {
    /// Header, optional stats and filter bars, log list and status bar
    pub fn log_viewer(area: Rect, show_stats: bool, show_filter: bool) -> ViewerAreas {
        let mut constraints = vec![Constraint::Length(3)];
        if show_stats {
            constraints.push(Constraint::Length(3));
        }
        if show_filter {
            constraints.push(Constraint::Length(3));
        }
        constraints.push(Constraint::Min(1));
        constraints.push(Constraint::Length(1));

        let chunks = RatatuiLayout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        let mut idx = 1;
        let mut next = |enabled: bool| {
            enabled.then(|| {
                let rect = chunks[idx];
                idx += 1;
                rect
            })
        };
        let stats = next(show_stats);
        let filter = next(show_filter);

        ViewerAreas {
            header: chunks[0],
            stats,
            filter,
            logs: chunks[chunks.len() - 2],
            status: chunks[chunks.len() - 1],
        }
    }

    /// Centered popup of at most `width` x `height`, keeping a margin
    pub fn centered_popup(area: Rect, width: u16, height: u16) -> Rect {
        let width = width.min(area.width.saturating_sub(4));
        let height = height.min(area.height.saturating_sub(4));
        let x = area.x + area.width.saturating_sub(width) / 2;
        let y = area.y + area.height.saturating_sub(height) / 2;
        Rect::new(x, y, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_viewer_without_bars() {
        let areas = Layout::log_viewer(Rect::new(0, 0, 80, 24), false, false);
        assert_eq!(areas.header.height, 3);
        assert!(areas.stats.is_none());
        assert!(areas.filter.is_none());
        assert_eq!(areas.logs.height, 20);
        assert_eq!(areas.status.y, 23);
    }

    #[test]
    fn test_log_viewer_with_bars() {
        let areas = Layout::log_viewer(Rect::new(0, 0, 80, 24), true, true);
        assert_eq!(areas.stats.map(|r| r.y), Some(3));
        assert_eq!(areas.filter.map(|r| r.y), Some(6));
        assert_eq!(areas.logs.y, 9);
        assert_eq!(areas.logs.height, 14);
    }

    #[test]
    fn test_popup_fits_small_area() {
        let popup = Layout::centered_popup(Rect::new(0, 0, 30, 10), 50, 24);
        assert_eq!(popup, Rect::new(2, 2, 26, 6));
    }
}
