//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, List, ListItem, Wrap},
    style::{Color, Style, Modifier},
};
use crate::cpu::{decode, CondFlag, Register, Registers};
use super::app::DebuggerApp;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(55),
            Constraint::Percentage(45),
        ])
        .split(frame.area());

    // Left side: memory, registers and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(7),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_memory(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: console output and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(5),
        ])
        .split(chunks[1]);

    draw_output(frame, right_chunks[0], app);
    draw_help(frame, right_chunks[1]);
}

/// Draw memory around PC with decoded instructions.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let rows = app.memory_window((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = rows
        .iter()
        .map(|&(addr, word, is_pc)| {
            let prefix = if is_pc { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(&addr) { "●" } else { " " };
            let mnemonic = decode(word).map(|i| i.to_string()).unwrap_or_default();
            let text = format!("{} {}x{:04X}: x{:04X}  {}", bp, prefix, addr, word, mnemonic);

            let style = if is_pc {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(&addr) {
                Style::default().fg(Color::Red)
            } else if word != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(list, area);
}

/// Draw register state.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let regs = &app.cpu.regs;

    let content = vec![
        gpr_line(regs, 0..4),
        gpr_line(regs, 4..8),
        Line::from(vec![
            Span::raw("PC: "),
            Span::styled(format!("x{:04X}", regs.pc()), Style::default().fg(Color::Yellow)),
            Span::raw("   COND: "),
            Span::styled(
                match regs.cond() {
                    Some(CondFlag::Negative) => "N",
                    Some(CondFlag::Zero) => "Z",
                    Some(CondFlag::Positive) => "P",
                    None => "?",
                },
                cond_style(regs.cond()),
            ),
        ]),
        Line::from(vec![
            Span::raw("Cycles: "),
            Span::styled(format!("{}", app.cpu.cycles), Style::default().fg(Color::Cyan)),
            Span::raw("   State: "),
            Span::styled(format!("{:?}", app.cpu.state),
                if app.cpu.is_running() {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::Red)
                }),
        ]),
    ];

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

/// One row of general purpose registers.
fn gpr_line(regs: &Registers, range: std::ops::Range<u16>) -> Line<'static> {
    let spans: Vec<Span<'static>> = range
        .map(Register::gpr)
        .map(|r| Span::raw(format!("{}: x{:04X}  ", r.name().trim_end(), regs.get(r))))
        .collect();
    Line::from(spans)
}

/// Draw captured console output, scrolled to the newest lines.
fn draw_output(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible = (area.height as usize).saturating_sub(2);
    let lines: Vec<&str> = app.output.lines().collect();
    let tail = lines[lines.len().saturating_sub(visible)..].join("\n");

    let output = Paragraph::new(tail)
        .wrap(Wrap { trim: false })
        .block(Block::default()
            .title(" Console ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)));

    frame.render_widget(output, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default()
            .title(" Status ")
            .borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  Esc: Pause  b: Breakpoint"),
        Line::from("x: Reset  ↑↓: Scroll memory  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default()
        .title(" Help ")
        .borders(Borders::ALL));

    frame.render_widget(help, area);
}

/// Color for the current condition flag.
fn cond_style(flag: Option<CondFlag>) -> Style {
    match flag {
        Some(CondFlag::Negative) => Style::default().fg(Color::Red),
        Some(CondFlag::Zero) => Style::default().fg(Color::Gray),
        Some(CondFlag::Positive) => Style::default().fg(Color::Green),
        None => Style::default().fg(Color::Magenta),
    }
}
