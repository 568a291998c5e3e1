//! Onboarding Wizard Rendering
//!
//! Render functions for each step of the onboarding wizard. Everything is
//! drawn from the controller's [`WizardView`]; nothing here mutates state.

use chrono::Utc;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use super::onboarding::OnboardingScreen;
use crate::store::ProgressSnapshot;
use crate::utils::{fit_width, format_age};
use crate::wizard::onboarding::{
    self, AUTH, CONFIG, PREVIEW, PRIORITIES, PRIORITY_KEY, SOURCE, SOURCES, SOURCES_KEY, SUCCESS,
    TEMPLATE_KEY, TEMPLATES,
};
use crate::wizard::{WizardData, WizardView};

const BRAND_BLUE: Color = Color::Rgb(70, 130, 180);
const BRAND_GOLD: Color = Color::Rgb(218, 165, 32);
const ACCENT_GOLD: Color = Color::Rgb(184, 134, 11);

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Width of the wizard panel
const PANEL_WIDTH: u16 = 64;

/// Render the open wizard
pub fn render_onboarding(f: &mut Frame, view: &WizardView, screen: &OnboardingScreen, tick: usize) {
    let mut lines: Vec<Line<'static>> = Vec::new();

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        render_progress_dots(view),
        Style::default().fg(BRAND_BLUE),
    )));
    lines.push(Line::from(""));

    if let Some(offer) = &view.resume_offer {
        render_resume_prompt(&mut lines, view, offer);
        let title = " Welcome back ".to_string();
        f.render_widget(panel(lines, title), centered(f.area()));
        return;
    }

    lines.push(Line::from(Span::styled(
        view.step.title.clone(),
        Style::default().fg(BRAND_GOLD).add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(Span::styled(
        view.step.subtitle.clone(),
        Style::default().fg(Color::DarkGray),
    )));
    lines.push(Line::from(""));

    match view.step.id.as_str() {
        SOURCE => render_sources(&mut lines, view, screen),
        AUTH => render_auth(&mut lines, view, tick),
        PREVIEW => render_preview(&mut lines, view),
        CONFIG => render_config(&mut lines, view, screen),
        SUCCESS => render_summary(&mut lines, &view.data),
        _ => {}
    }

    if view.busy {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("{} Working...", SPINNER[tick % SPINNER.len()]),
            Style::default().fg(ACCENT_GOLD),
        )));
    }

    if let Some(err) = &view.last_error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("  ! {}", err),
            Style::default().fg(Color::Red),
        )));
        lines.push(Line::from(Span::styled(
            "  Press C to retry, or Enter to skip".to_string(),
            Style::default().fg(Color::DarkGray),
        )));
    }

    lines.push(Line::from(""));
    lines.push(render_footer(view));

    let title = format!(
        " Setup ({}/{}) ",
        view.current_step_index + 1,
        view.step_count
    );
    f.render_widget(panel(lines, title), centered(f.area()));
}

/// Render the closing summary after completion
pub fn render_complete(f: &mut Frame, data: &WizardData) {
    let mut lines: Vec<Line<'static>> = vec![
        Line::from(""),
        Line::from(Span::styled(
            "Your dashboard is ready".to_string(),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    render_summary(&mut lines, data);
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Press any key to exit".to_string(),
        Style::default().fg(Color::DarkGray),
    )));

    f.render_widget(panel(lines, " Setup Complete ".to_string()), centered(f.area()));
}

fn centered(area: Rect) -> Rect {
    let v_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(30.min(area.height.saturating_sub(2))),
            Constraint::Min(0),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(PANEL_WIDTH.min(area.width.saturating_sub(2))),
            Constraint::Min(0),
        ])
        .split(v_chunks[1])[1]
}

fn panel(lines: Vec<Line<'static>>, title: String) -> Paragraph<'static> {
    Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(BRAND_BLUE))
                .title(Span::styled(
                    title,
                    Style::default().fg(BRAND_BLUE).add_modifier(Modifier::BOLD),
                )),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: false })
}

/// Current step filled, reached steps hollow, the rest dotted
fn render_progress_dots(view: &WizardView) -> String {
    (0..view.step_count)
        .map(|i| {
            if i == view.current_step_index {
                "●"
            } else if i <= view.max_visited_index {
                "○"
            } else {
                "·"
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn key_hint(key: &str, label: &str, color: Color) -> [Span<'static>; 2] {
    [
        Span::styled(
            format!("[{}] ", key),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!("{}  ", label), Style::default().fg(Color::White)),
    ]
}

fn render_footer(view: &WizardView) -> Line<'static> {
    let mut footer: Vec<Span<'static>> = Vec::new();
    if view.can_retreat {
        footer.extend(key_hint("Esc", "Back", Color::Red));
    }
    if view.can_advance {
        let label = if view.is_last_step() { "Finish" } else { "Continue" };
        footer.extend(key_hint("Enter", label, ACCENT_GOLD));
    }
    if view.max_visited_index > 0 {
        footer.extend(key_hint(
            &format!("1-{}", view.max_visited_index + 1),
            "Jump",
            BRAND_BLUE,
        ));
    }
    footer.extend(key_hint("Q", "Close", Color::DarkGray));
    Line::from(footer)
}

fn render_resume_prompt(lines: &mut Vec<Line<'static>>, view: &WizardView, offer: &ProgressSnapshot) {
    let step_title = onboarding::registry()
        .get(offer.step_index)
        .map(|s| s.title().to_string())
        .unwrap_or_default();

    lines.push(Line::from(Span::styled(
        "You have an unfinished setup".to_string(),
        Style::default().fg(BRAND_GOLD).add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!(
            "Step {} of {}: {}",
            offer.step_index + 1,
            view.step_count,
            step_title
        ),
        Style::default().fg(Color::White),
    )));
    lines.push(Line::from(Span::styled(
        format!("Saved {}", format_age(offer.timestamp, Utc::now())),
        Style::default().fg(Color::DarkGray),
    )));
    lines.push(Line::from(""));

    let mut hints = Vec::new();
    hints.extend(key_hint("Y", "Resume", ACCENT_GOLD));
    hints.extend(key_hint("N", "Start over", Color::Red));
    hints.extend(key_hint("Q", "Close", Color::DarkGray));
    lines.push(Line::from(hints));
}

// --- Individual step renderers ---

fn render_sources(lines: &mut Vec<Line<'static>>, view: &WizardView, screen: &OnboardingScreen) {
    let selected = view.list(SOURCES_KEY);

    lines.push(Line::from(Span::styled(
        "  Toggle sources with Space:",
        Style::default().fg(Color::DarkGray),
    )));
    lines.push(Line::from(""));

    for (i, (id, label)) in SOURCES.iter().enumerate() {
        let focused = i == screen.focus();
        let enabled = selected.iter().any(|s| s == id);
        lines.push(choice_line(focused, if enabled { "[x]" } else { "[ ]" }, enabled, label));
    }
}

fn render_auth(lines: &mut Vec<Line<'static>>, view: &WizardView, tick: usize) {
    let connected = view.list("connected_sources");
    let selected = view.list(SOURCES_KEY);

    if selected.is_empty() {
        lines.push(Line::from(Span::styled(
            "  No sources selected".to_string(),
            Style::default().fg(Color::DarkGray),
        )));
    }

    for id in &selected {
        let (icon, color) = if connected.contains(id) {
            ("OK".to_string(), Color::Green)
        } else if view.busy {
            (SPINNER[tick % SPINNER.len()].to_string(), ACCENT_GOLD)
        } else {
            ("--".to_string(), Color::DarkGray)
        };
        lines.push(Line::from(vec![
            Span::styled(
                format!("  [{:<2}] ", icon),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                onboarding::source_label(id).to_string(),
                Style::default().fg(Color::White),
            ),
        ]));
    }

    lines.push(Line::from(""));
    if !view.busy && connected.len() < selected.len() {
        let mut hints = Vec::new();
        hints.extend(key_hint("C", "Connect", BRAND_BLUE));
        hints.extend(key_hint("Enter", "Skip for now", ACCENT_GOLD));
        lines.push(Line::from(hints));
    }
}

fn render_preview(lines: &mut Vec<Line<'static>>, view: &WizardView) {
    let sources = view
        .list(SOURCES_KEY)
        .iter()
        .map(|id| onboarding::source_label(id).to_string())
        .collect::<Vec<_>>()
        .join(", ");

    lines.push(Line::from(Span::styled(
        fit_width(&format!("Sample data from {}", sources), PANEL_WIDTH as usize - 6),
        Style::default().fg(Color::DarkGray),
    )));
    lines.push(Line::from(""));

    let metrics = [
        ("MRR", "$48,250", "+4.2%", Color::Green),
        ("Active customers", "1,284", "+38", Color::Green),
        ("Churn rate", "2.1%", "-0.3%", Color::Green),
        ("Expansion revenue", "$6,900", "+11%", Color::Green),
    ];
    for (name, value, delta, color) in metrics {
        lines.push(Line::from(vec![
            Span::styled(format!("{:<20}", name), Style::default().fg(Color::White)),
            Span::styled(
                format!("{:>10}", value),
                Style::default().fg(BRAND_GOLD).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("  {:>6}", delta), Style::default().fg(color)),
        ]));
    }
}

fn render_config(lines: &mut Vec<Line<'static>>, view: &WizardView, screen: &OnboardingScreen) {
    let template = view.text(TEMPLATE_KEY).unwrap_or_default().to_string();
    let priority = view.text(PRIORITY_KEY).unwrap_or_default().to_string();

    lines.push(section_header("Template"));
    for (i, (id, label, description)) in TEMPLATES.iter().enumerate() {
        let chosen = *id == template;
        lines.push(choice_line(
            screen.focus() == i,
            if chosen { "(●)" } else { "( )" },
            chosen,
            &format!("{} - {}", label, description),
        ));
    }

    lines.push(Line::from(""));
    lines.push(section_header("Prioritise accounts by"));
    for (i, (id, label, description)) in PRIORITIES.iter().enumerate() {
        let chosen = *id == priority;
        lines.push(choice_line(
            screen.focus() == TEMPLATES.len() + i,
            if chosen { "(●)" } else { "( )" },
            chosen,
            &format!("{} - {}", label, description),
        ));
    }
}

fn render_summary(lines: &mut Vec<Line<'static>>, data: &WizardData) {
    let sources = data
        .get(SOURCES_KEY)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|id| onboarding::source_label(id).to_string())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    let field = |key: &str| {
        data.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("-")
            .to_string()
    };

    for (label, value) in [
        ("Sources", sources),
        ("Template", field(TEMPLATE_KEY)),
        ("Priority", field(PRIORITY_KEY)),
    ] {
        lines.push(Line::from(vec![
            Span::styled(format!("{:>10}: ", label), Style::default().fg(Color::DarkGray)),
            Span::styled(
                fit_width(&value, PANEL_WIDTH as usize - 18),
                Style::default().fg(Color::White),
            ),
        ]));
    }
}

fn section_header(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(BRAND_BLUE).add_modifier(Modifier::BOLD),
    ))
}

fn choice_line(focused: bool, marker: &str, enabled: bool, label: &str) -> Line<'static> {
    let prefix = if focused { " > " } else { "   " };
    Line::from(vec![
        Span::styled(prefix, Style::default().fg(ACCENT_GOLD)),
        Span::styled(
            marker.to_string(),
            Style::default().fg(if enabled { BRAND_GOLD } else { Color::DarkGray }),
        ),
        Span::styled(
            fit_width(&format!(" {}", label), PANEL_WIDTH as usize - 10),
            Style::default()
                .fg(if focused { Color::White } else { Color::DarkGray })
                .add_modifier(if focused { Modifier::BOLD } else { Modifier::empty() }),
        ),
    ])
}
