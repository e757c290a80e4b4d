use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::Receiver;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Terminal,
};
use ratewatch::SpeedElement;

use crate::watch::{WatchRow, WatchSet};

const MAX_EVENTS: usize = 100;

pub fn run_tui(
    mut set: WatchSet,
    element: &SpeedElement,
    refresh: Duration,
    events: Receiver<String>,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut logs: Vec<String> = Vec::new();
    let mut log_scroll: usize = 0;

    while !stop.load(Ordering::Relaxed) {
        while let Ok(ev) = events.try_recv() {
            logs.push(ev);
            if logs.len() > MAX_EVENTS {
                logs.remove(0);
            }
        }

        let rows = set.poll();
        let lines: Vec<String> = rows.iter().map(|r| row_line(r, element)).collect();

        terminal.draw(|f| {
            let outer = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(rows.len() as u16 + 2), // Files
                    Constraint::Min(0),                        // Events
                    Constraint::Length(1),                     // Footer
                ].as_ref())
                .split(f.size());

            let items: Vec<ListItem> = lines.iter().map(|l| ListItem::new(l.clone())).collect();
            let list = List::new(items).block(Block::default().title("Files").borders(Borders::ALL));
            f.render_widget(list, outer[0]);

            let viewport = outer[1].height.saturating_sub(2) as usize;
            let start = logs.len().saturating_sub(viewport + log_scroll);
            let log_items: Vec<ListItem> = logs.iter().skip(start).map(|l| ListItem::new(l.clone())).collect();
            let log_list = List::new(log_items).block(Block::default().title("Events").borders(Borders::ALL));
            f.render_widget(log_list, outer[1]);

            let footer = Paragraph::new("q: quit | ↑/↓/Home: scroll events | c: clear events");
            f.render_widget(footer, outer[2]);
        })?;

        if event::poll(refresh)? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('q')
                    || (key.code == KeyCode::Char('c')
                        && key.modifiers.contains(KeyModifiers::CONTROL))
                {
                    stop.store(true, Ordering::Relaxed);
                } else {
                    match key.code {
                        KeyCode::Up => {
                            log_scroll = log_scroll.saturating_add(1);
                        }
                        KeyCode::Down => {
                            log_scroll = log_scroll.saturating_sub(1);
                        }
                        KeyCode::Home => {
                            log_scroll = 0;
                        }
                        KeyCode::Char('c') => {
                            logs.clear();
                            log_scroll = 0;
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

pub(crate) fn row_line(row: &WatchRow, element: &SpeedElement) -> String {
    let size = match row.size {
        Some(n) => element.units.format(n.min(i64::MAX as u64) as i64),
        None => "missing".to_string(),
    };
    format!("{:<40} {:>12} {:>14}", row.path.display().to_string(), size, element.render(row.rate))
}
