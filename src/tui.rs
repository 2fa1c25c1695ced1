use anyhow::Result;
use chrono::{Local, NaiveDate, Utc};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use std::cell::Cell;
use std::io::stdout;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use crate::ai::{generate_cover_letter, AnthropicProvider, CoverLetterSession, Ticket};
use crate::error::CoverLetterError;
use crate::models::{JobApplication, PriorityBand, Stage, UserProfile};
use crate::store::{ApplicationStore, SubscriptionId};
use crate::views::{filter_and_sort, stage_buckets, DeadlineStatus, ListQuery, SortDirection, SortField};

type LetterResult = (Ticket, Result<String, CoverLetterError>);

struct LetterView {
    app_id: String,
    title: String,
    text: Option<String>,
    error: Option<String>,
    scroll: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Board,
    List,
}

struct AppState<'a> {
    store: &'a mut ApplicationStore,
    changed: Rc<Cell<bool>>,
    subscription: SubscriptionId,
    mode: Mode,
    column: usize,
    rows: [usize; 7],
    query: ListQuery,
    list_row: usize,
    show_banner: bool,
    status: Option<String>,
    letter: Option<LetterView>,
    session: CoverLetterSession,
    tx: Sender<LetterResult>,
    rx: Receiver<LetterResult>,
    profile: Option<UserProfile>,
    model: String,
    today: NaiveDate,
}

impl<'a> AppState<'a> {
    fn new(store: &'a mut ApplicationStore, profile: Option<UserProfile>, model: &str) -> Self {
        let (tx, rx) = mpsc::channel();
        let changed = Rc::new(Cell::new(false));
        let flag = Rc::clone(&changed);
        let subscription = store.subscribe(move |_| flag.set(true));
        Self {
            store,
            changed,
            subscription,
            mode: Mode::Board,
            column: 0,
            rows: [0; 7],
            query: ListQuery::default(),
            list_row: 0,
            show_banner: true,
            status: None,
            letter: None,
            session: CoverLetterSession::default(),
            tx,
            rx,
            profile,
            model: model.to_string(),
            today: Local::now().date_naive(),
        }
    }

    fn column_len(&self, column: usize) -> usize {
        self.store.by_stage(Stage::ALL[column]).len()
    }

    fn list_rows(&self) -> Vec<&JobApplication> {
        filter_and_sort(self.store.applications(), &self.query)
    }

    fn current_app(&self) -> Option<&JobApplication> {
        match self.mode {
            Mode::Board => self
                .store
                .by_stage(Stage::ALL[self.column])
                .get(self.rows[self.column])
                .copied(),
            Mode::List => self.list_rows().get(self.list_row).copied(),
        }
    }

    /// Re-fits selections after the store reports a change.
    fn sync(&mut self) {
        if !self.changed.replace(false) {
            return;
        }
        for column in 0..Stage::ALL.len() {
            let len = self.column_len(column);
            self.rows[column] = self.rows[column].min(len.saturating_sub(1));
        }
        self.list_row = self.list_row.min(self.list_rows().len().saturating_sub(1));
    }

    /// Points the selection at `id`, wherever it now sits.
    fn select(&mut self, id: &str, stage: Stage) {
        match self.mode {
            Mode::Board => {
                self.column = stage.index();
                self.rows[self.column] = self
                    .store
                    .by_stage(stage)
                    .iter()
                    .position(|a| a.id == id)
                    .unwrap_or(0);
            }
            Mode::List => {
                self.list_row = self
                    .list_rows()
                    .iter()
                    .position(|a| a.id == id)
                    .unwrap_or(0);
            }
        }
    }

    fn toggle_mode(&mut self) {
        let current = self.current_app().map(|a| (a.id.clone(), a.stage));
        self.mode = match self.mode {
            Mode::Board => Mode::List,
            Mode::List => Mode::Board,
        };
        if let Some((id, stage)) = current {
            self.select(&id, stage);
        }
    }

    fn sort_by(&mut self, field: SortField) {
        self.query.sort_by(field);
        self.list_row = 0;
    }

    fn down(&mut self) {
        match self.mode {
            Mode::Board => {
                if self.rows[self.column] + 1 < self.column_len(self.column) {
                    self.rows[self.column] += 1;
                }
            }
            Mode::List => {
                if self.list_row + 1 < self.list_rows().len() {
                    self.list_row += 1;
                }
            }
        }
    }

    fn up(&mut self) {
        match self.mode {
            Mode::Board => self.rows[self.column] = self.rows[self.column].saturating_sub(1),
            Mode::List => self.list_row = self.list_row.saturating_sub(1),
        }
    }

    fn left(&mut self) {
        self.column = self.column.saturating_sub(1);
    }

    fn right(&mut self) {
        if self.column + 1 < Stage::ALL.len() {
            self.column += 1;
        }
    }

    /// Moves the selected application one stage along and follows it.
    fn move_stage(&mut self, forward: bool) {
        let Some(app) = self.current_app() else { return };
        let id = app.id.clone();
        let target = if forward { app.stage.next() } else { app.stage.prev() };
        let Some(target) = target else { return };

        match self.store.set_stage(&id, target, Utc::now()) {
            Ok(_) => {
                self.sync();
                self.select(&id, target);
                self.status = Some(format!("Moved to {}", target));
            }
            Err(e) => self.status = Some(e.to_string()),
        }
    }

    fn delete_current(&mut self) {
        let Some(app) = self.current_app() else { return };
        let id = app.id.clone();
        let label = format!("{} - {}", app.company, app.role);
        if self.store.delete(&id) {
            self.status = Some(format!("Deleted {}", label));
        }
        self.sync();
    }

    fn start_letter(&mut self, app_id: &str) {
        let Some(profile) = self.profile.clone().filter(UserProfile::is_complete) else {
            self.status = Some("Set up your profile first: apptrack profile set".to_string());
            return;
        };
        let Some(app) = self.store.get(app_id).cloned() else { return };

        let ticket = self.session.begin();
        self.letter = Some(LetterView {
            app_id: app.id.clone(),
            title: format!("{} - {}", app.company, app.role),
            text: None,
            error: None,
            scroll: 0,
        });

        let tx = self.tx.clone();
        let model = self.model.clone();
        thread::spawn(move || {
            let result = AnthropicProvider::new(&profile.api_key, &model)
                .and_then(|provider| generate_cover_letter(&provider, &profile, &app));
            let _ = tx.send((ticket, result));
        });
    }

    fn poll_letters(&mut self) {
        while let Ok((ticket, result)) = self.rx.try_recv() {
            let Some(result) = self.session.accept(ticket, result) else { continue };
            if let Some(view) = self.letter.as_mut() {
                match result {
                    Ok(text) => {
                        view.text = Some(text);
                        view.error = None;
                    }
                    Err(e) => view.error = Some(e.to_string()),
                }
            }
        }
    }

    fn save_letter(&mut self) {
        let Some(view) = &self.letter else { return };
        let Some(text) = view.text.clone() else { return };
        let id = view.app_id.clone();
        match self.store.save_cover_letter(&id, &text, Utc::now()) {
            Ok(_) => self.status = Some("Cover letter saved to application notes".to_string()),
            Err(e) => self.status = Some(e.to_string()),
        }
        self.sync();
        self.close_letter();
    }

    fn close_letter(&mut self) {
        self.session.cancel();
        self.letter = None;
    }
}

impl Drop for AppState<'_> {
    fn drop(&mut self) {
        self.store.unsubscribe(self.subscription);
    }
}

pub fn run_board(store: &mut ApplicationStore, profile: Option<UserProfile>, model: &str) -> Result<()> {
    let mut state = AppState::new(store, profile, model);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
) -> Result<()> {
    loop {
        state.poll_letters();
        terminal.draw(|frame| draw(frame, state))?;

        if !event::poll(Duration::from_millis(200))? {
            continue;
        }
        let Event::Key(key) = event::read()? else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if state.letter.is_some() {
            match key.code {
                KeyCode::Esc | KeyCode::Char('q') => state.close_letter(),
                KeyCode::Char('r') => {
                    if let Some(id) = state.letter.as_ref().map(|l| l.app_id.clone()) {
                        state.start_letter(&id);
                    }
                }
                KeyCode::Char('s') => state.save_letter(),
                KeyCode::Down | KeyCode::Char('j') => {
                    if let Some(view) = state.letter.as_mut() {
                        view.scroll = view.scroll.saturating_add(1);
                    }
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    if let Some(view) = state.letter.as_mut() {
                        view.scroll = view.scroll.saturating_sub(1);
                    }
                }
                _ => {}
            }
            continue;
        }

        state.status = None;
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Down | KeyCode::Char('j') => state.down(),
            KeyCode::Up | KeyCode::Char('k') => state.up(),
            KeyCode::Left | KeyCode::Char('h') => state.left(),
            KeyCode::Right | KeyCode::Char('l') => state.right(),
            KeyCode::Char('H') => state.move_stage(false),
            KeyCode::Char('L') => state.move_stage(true),
            KeyCode::Char('D') => state.delete_current(),
            KeyCode::Char('b') => state.show_banner = !state.show_banner,
            KeyCode::Tab => state.toggle_mode(),
            KeyCode::Char('1') if state.mode == Mode::List => state.sort_by(SortField::Company),
            KeyCode::Char('2') if state.mode == Mode::List => state.sort_by(SortField::Role),
            KeyCode::Char('3') if state.mode == Mode::List => state.sort_by(SortField::ApplicationDate),
            KeyCode::Char('4') if state.mode == Mode::List => state.sort_by(SortField::Priority),
            KeyCode::Char('5') if state.mode == Mode::List => state.sort_by(SortField::NextActionDeadline),
            KeyCode::Char('g') => {
                if let Some(id) = state.current_app().map(|a| a.id.clone()) {
                    state.start_letter(&id);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn draw(frame: &mut Frame, state: &AppState) {
    let followups = state.store.needs_followup(state.today);
    let banner_height = if state.show_banner && !followups.is_empty() {
        (followups.len().min(3) as u16) + 2 + u16::from(followups.len() > 3)
    } else {
        0
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(banner_height),
            Constraint::Min(8),
            Constraint::Length(9),
            Constraint::Length(1),
        ])
        .split(frame.area());

    if banner_height > 0 {
        let mut lines: Vec<Line> = followups
            .iter()
            .take(3)
            .map(|app| {
                let due = app
                    .next_action_deadline
                    .map(|d| format!(" (Due: {})", d.format("%b %d, %Y")))
                    .unwrap_or_default();
                Line::from(format!("  - {} - {}{}", app.company, app.role, due))
            })
            .collect();
        if followups.len() > 3 {
            lines.push(Line::from(format!("  and {} more...", followups.len() - 3)));
        }
        let banner = Paragraph::new(lines)
            .style(Style::default().fg(Color::Yellow))
            .block(Block::default().borders(Borders::ALL).title(format!(
                " Applications Needing Follow-up ({}) ",
                followups.len()
            )));
        frame.render_widget(banner, rows[0]);
    }

    match state.mode {
        Mode::Board => draw_board(frame, state, rows[1]),
        Mode::List => draw_list(frame, state, rows[1]),
    }

    let detail = Paragraph::new(build_detail(state, rows[2].width.saturating_sub(2) as usize))
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false });
    frame.render_widget(detail, rows[2]);

    let footer = match &state.status {
        Some(status) => Paragraph::new(format!(" {}", status)).style(Style::default().fg(Color::Cyan)),
        None => {
            let keys = match state.mode {
                Mode::Board => {
                    " h/l:column  j/k:select  H/L:move stage  g:cover letter  D:delete  b:banner  tab:list  q:quit"
                }
                Mode::List => {
                    " j/k:select  1-5:sort company/role/date/priority/deadline  H/L:move stage  g:cover letter  tab:board  q:quit"
                }
            };
            Paragraph::new(keys).style(Style::default().fg(Color::DarkGray))
        }
    };
    frame.render_widget(footer, rows[3]);

    if let Some(view) = &state.letter {
        draw_letter(frame, state, view);
    }
}

fn draw_board(frame: &mut Frame, state: &AppState, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 7); 7])
        .split(area);

    for (i, (stage, apps)) in stage_buckets(state.store.applications()).into_iter().enumerate() {
        let items: Vec<ListItem> = apps
            .iter()
            .map(|app| ListItem::new(format!("{:>2} {}", app.priority, app.company)).style(priority_style(app.priority)))
            .collect();

        let selected = i == state.column;
        let border_style = if selected {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(border_style)
                    .title(format!(" {} ({}) ", stage, apps.len())),
            )
            .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));

        let mut list_state = ListState::default();
        if selected && !apps.is_empty() {
            list_state.select(Some(state.rows[i]));
        }
        frame.render_stateful_widget(list, columns[i], &mut list_state);
    }
}

fn draw_list(frame: &mut Frame, state: &AppState, area: Rect) {
    let rows = state.list_rows();
    let items: Vec<ListItem> = rows
        .iter()
        .map(|app| {
            ListItem::new(format!(
                "{:>2}  {:<16} {:<22} {:<28} {:<11} {}",
                app.priority,
                app.stage.label(),
                app.company,
                app.role,
                app.application_date.to_string(),
                DeadlineStatus::classify(app.next_action_deadline, state.today)
                    .label(app.next_action_deadline)
            ))
            .style(priority_style(app.priority))
        })
        .collect();

    let arrow = match state.query.direction {
        SortDirection::Ascending => "asc",
        SortDirection::Descending => "desc",
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(
            " Applications ({}) by {} {} ",
            rows.len(),
            state.query.sort.label(),
            arrow
        )))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));

    let mut list_state = ListState::default();
    if !rows.is_empty() {
        list_state.select(Some(state.list_row));
    }
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn priority_style(priority: u8) -> Style {
    match PriorityBand::of(priority) {
        PriorityBand::High => Style::default().fg(Color::Red),
        PriorityBand::Medium => Style::default().fg(Color::Yellow),
        PriorityBand::Low => Style::default().fg(Color::Green),
    }
}

fn build_detail<'a>(state: &'a AppState, width: usize) -> Text<'a> {
    let Some(app) = state.current_app() else {
        return Text::raw("No application selected");
    };

    let mut lines: Vec<Line> = Vec::new();
    lines.push(Line::from(vec![
        Span::styled(format!("{} ", app.role), Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("at {}", app.company)),
    ]));
    lines.push(Line::from(format!(
        "#{}  {}  via {}  applied {}  priority {} ({})",
        app.id,
        app.stage,
        app.method,
        app.application_date.format("%b %d, %Y"),
        app.priority,
        app.priority_band().label()
    )));

    if !app.next_action.is_empty() || app.next_action_deadline.is_some() {
        let status = DeadlineStatus::classify(app.next_action_deadline, state.today);
        let style = match status {
            DeadlineStatus::Overdue => Style::default().fg(Color::Red),
            DeadlineStatus::Today => Style::default().fg(Color::LightRed),
            DeadlineStatus::Soon(_) => Style::default().fg(Color::Yellow),
            _ => Style::default(),
        };
        lines.push(Line::from(vec![
            Span::raw(format!("Next: {} ", app.next_action)),
            Span::styled(format!("[{}]", status.label(app.next_action_deadline)), style),
        ]));
    }
    if !app.salary_range.is_empty() {
        lines.push(Line::from(format!("Salary: {}", app.salary_range)));
    }
    if !app.job_description_url.is_empty() {
        lines.push(Line::from(format!("URL: {}", app.job_description_url)));
    }
    if !app.notes.is_empty() {
        for line in textwrap::fill(&app.notes, width.max(20)).lines() {
            lines.push(Line::from(Span::styled(
                line.to_string(),
                Style::default().fg(Color::DarkGray),
            )));
        }
    }

    Text::from(lines)
}

fn draw_letter(frame: &mut Frame, state: &AppState, view: &LetterView) {
    let area = centered(frame.area(), 80, 80);
    frame.render_widget(Clear, area);

    let body = if let Some(error) = &view.error {
        Text::from(vec![
            Line::from(Span::styled(
                format!("Error generating cover letter: {}", error),
                Style::default().fg(Color::Red),
            )),
            Line::from(""),
            Line::from("Check your API key with 'apptrack profile set' and press r to retry."),
        ])
    } else if let Some(text) = &view.text {
        Text::raw(text.as_str())
    } else {
        Text::raw("Generating...")
    };

    let title = if state.session.is_generating() {
        format!(" Cover Letter: {} (generating) ", view.title)
    } else {
        format!(" Cover Letter: {}  r:regenerate s:save esc:close ", view.title)
    };
    let popup = Paragraph::new(body)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false })
        .scroll((view.scroll, 0));
    frame.render_widget(popup, area);
}

fn centered(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
