use ratatui::layout::{Constraint, Direction, Layout, Rect};

const DIALOG_WIDTH: u16 = 84;
const DIALOG_HEIGHT: u16 = 28;
const STEPS_HEIGHT: u16 = 1;
const BANNER_HEIGHT: u16 = 2;
const FOOTER_HEIGHT: u16 = 2;

/// Regions of the setup dialog, computed once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialogLayout {
    pub frame: Rect,
    pub steps: Rect,
    pub body: Rect,
    pub banner: Rect,
    pub footer: Rect,
}

pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

impl DialogLayout {
    pub fn calculate(area: Rect) -> Self {
        let frame = centered_rect(DIALOG_WIDTH, DIALOG_HEIGHT, area);
        let inner = Rect {
            x: frame.x.saturating_add(1),
            y: frame.y.saturating_add(1),
            width: frame.width.saturating_sub(2),
            height: frame.height.saturating_sub(2),
        };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(STEPS_HEIGHT),
                Constraint::Min(1),
                Constraint::Length(BANNER_HEIGHT),
                Constraint::Length(FOOTER_HEIGHT),
            ])
            .split(inner);

        Self {
            frame,
            steps: chunks[0],
            body: chunks[1],
            banner: chunks[2],
            footer: chunks[3],
        }
    }
}
