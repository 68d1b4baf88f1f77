//! Full-screen terminal view: command input, reply history, and live device state.

use std::collections::VecDeque;
use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, Row, Table};
use stage_sim::Simulator;

use crate::{harness_directive, Logging};

const HISTORY_LIMIT: usize = 200;

struct MonitorApp<'a> {
    simulator: &'a mut Simulator,
    input: String,
    // (command, reply), oldest first.
    history: VecDeque<(String, String)>,
}

impl MonitorApp<'_> {
    fn submit(&mut self) {
        let line = std::mem::take(&mut self.input);
        if line.trim().is_empty() {
            return;
        }
        let reply = harness_directive(self.simulator, &line)
            .unwrap_or_else(|| self.simulator.send_command(&line));
        self.history.push_back((line, reply));
        if self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
    }
}

/// Runs the monitor until Esc or Ctrl+C. The terminal is restored even if drawing fails.
///
/// Logging stays off for the whole run so it cannot write over the alternate screen.
pub(crate) fn run(simulator: &mut Simulator, logging: &Logging) -> Result<()> {
    let _quiet = logging.silence()?;
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let mut app = MonitorApp {
        simulator,
        input: String::new(),
        history: VecDeque::new(),
    };
    let result = event_loop(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut MonitorApp<'_>,
) -> Result<()> {
    loop {
        terminal.draw(|frame| draw(frame, app))?;

        if !event::poll(Duration::from_millis(250))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Esc => return Ok(()),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(()),
            KeyCode::Enter => app.submit(),
            KeyCode::Backspace => {
                app.input.pop();
            }
            KeyCode::Char(c) => app.input.push(c),
            _ => {}
        }
    }
}

fn draw(frame: &mut Frame, app: &MonitorApp<'_>) {
    let [main_area, input_area] = split(
        frame.size(),
        Direction::Vertical,
        [Constraint::Min(5), Constraint::Length(3)],
    );
    let [history_area, status_area] = split(
        main_area,
        Direction::Horizontal,
        [Constraint::Percentage(60), Constraint::Percentage(40)],
    );
    let [axes_area, actuator_area] = split(
        status_area,
        Direction::Vertical,
        [Constraint::Min(3), Constraint::Length(6)],
    );

    // Newest exchange on top.
    let items: Vec<ListItem> = app
        .history
        .iter()
        .rev()
        .map(|(command, reply)| {
            let reply = match reply.trim_end() {
                "" => Span::styled("(no reply)", Style::new().fg(Color::DarkGray)),
                text => Span::raw(text.to_string()),
            };
            ListItem::new(vec![
                Line::from(Span::styled(
                    format!("> {}", command),
                    Style::new().fg(Color::Cyan),
                )),
                Line::from(vec![Span::raw("< "), reply]),
            ])
        })
        .collect();
    frame.render_widget(
        List::new(items).block(Block::default().borders(Borders::ALL).title("History")),
        history_area,
    );

    let rows: Vec<Row> = app
        .simulator
        .state
        .axes
        .iter()
        .map(|(module, axis, position)| {
            Row::new(vec![
                module.to_string(),
                axis.to_string(),
                position.to_string(),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Min(10),
        ],
    )
    .header(
        Row::new(vec!["Module", "Axis", "Position"])
            .style(Style::new().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title("Axes"));
    frame.render_widget(table, axes_area);

    let actuators = &app.simulator.state.actuators;
    let on_off = |on: bool| if on { "on" } else { "off" };
    let status = vec![
        Line::from(format!(
            "Shutter:    {}",
            if actuators.shutter_open { "open" } else { "closed" }
        )),
        Line::from(format!(
            "LED 1/2:    {} / {}",
            on_off(actuators.led1_on),
            on_off(actuators.led2_on)
        )),
        Line::from(format!("Photodiode: {}", actuators.photodiode)),
    ];
    frame.render_widget(
        Paragraph::new(status).block(Block::default().borders(Borders::ALL).title("Actuators")),
        actuator_area,
    );

    frame.render_widget(
        Paragraph::new(format!("> {}", app.input)).block(
            Block::default()
                .borders(Borders::ALL)
                .title("Command (Enter sends, Esc quits, :pd <value> / :reset)"),
        ),
        input_area,
    );
    frame.set_cursor(
        cursor_column(input_area, app.input.chars().count()),
        input_area.y + 1,
    );
}

// Column just after the typed text, held inside the input box.
fn cursor_column(input_area: Rect, typed: usize) -> u16 {
    let typed = u16::try_from(typed).unwrap_or(u16::MAX);
    input_area
        .x
        .saturating_add(3)
        .saturating_add(typed)
        .min(input_area.right().saturating_sub(2))
}

fn split<const N: usize>(
    area: Rect,
    direction: Direction,
    constraints: [Constraint; N],
) -> [Rect; N] {
    let chunks = Layout::default()
        .direction(direction)
        .constraints(constraints)
        .split(area);
    std::array::from_fn(|i| chunks[i])
}
