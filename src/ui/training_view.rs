use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, BarChart, Block, Borders, Cell, Chart, Dataset, Gauge, GraphType, Paragraph, Row,
        Table,
    },
    Frame,
};

use super::training_dashboard::{DashboardState, TrainingStatus};

/// Render the full training dashboard.
pub fn render(frame: &mut Frame, dashboard: &DashboardState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(10),  // Main content
            Constraint::Length(3), // Footer
        ])
        .split(frame.area());

    render_header(frame, dashboard, chunks[0]);
    render_main(frame, dashboard, chunks[1]);
    render_footer(frame, chunks[2]);
}

fn render_header(frame: &mut Frame, dashboard: &DashboardState, area: Rect) {
    let (status_str, status_color) = match dashboard.status {
        TrainingStatus::Running => ("RUNNING", Color::Green),
        TrainingStatus::Paused => ("PAUSED", Color::Yellow),
        TrainingStatus::Finished => ("FINISHED", Color::Cyan),
    };

    let header_text = Line::from(vec![
        Span::styled(
            format!("Signals: {}", dashboard.value_function),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::raw(format!("Step: {}/{}", dashboard.step, dashboard.max_steps)),
        Span::raw("  |  "),
        Span::raw(format!("Episode: {}", dashboard.episode)),
        Span::raw("  |  ["),
        Span::styled(
            status_str,
            Style::default().fg(status_color).add_modifier(Modifier::BOLD),
        ),
        Span::raw("]"),
    ]);

    let header = Paragraph::new(header_text)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));

    frame.render_widget(header, area);
}

fn render_main(frame: &mut Frame, dashboard: &DashboardState, area: Rect) {
    let main_cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    render_left_panel(frame, dashboard, main_cols[0]);
    render_right_panel(frame, dashboard, main_cols[1]);
}

fn render_left_panel(frame: &mut Frame, dashboard: &DashboardState, area: Rect) {
    let left_rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(45), // Congestion chart
            Constraint::Percentage(45), // Reward chart
            Constraint::Length(3),      // Progress gauge
        ])
        .split(area);

    let congestion: Vec<(f64, f64)> = dashboard.congestion_history.iter().copied().collect();
    render_history_chart(frame, left_rows[0], "Congestion", &congestion, Color::Red);
    let reward: Vec<(f64, f64)> = dashboard.reward_history.iter().copied().collect();
    render_history_chart(frame, left_rows[1], "Reward", &reward, Color::Green);
    render_progress_gauge(frame, dashboard, left_rows[2]);
}

fn render_right_panel(frame: &mut Frame, dashboard: &DashboardState, area: Rect) {
    let right_rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(9),      // Stats
            Constraint::Percentage(30), // Action counts
            Constraint::Min(5),         // Agents
            Constraint::Length(9),      // Value rows
        ])
        .split(area);

    render_stats_panel(frame, dashboard, right_rows[0]);
    render_action_counts(frame, dashboard, right_rows[1]);
    render_agents_table(frame, dashboard, right_rows[2]);
    render_value_rows(frame, dashboard, right_rows[3]);
}

fn render_history_chart(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    data: &[(f64, f64)],
    color: Color,
) {
    let (x_min, x_max) = x_bounds(data);
    let (y_min, y_max) = y_bounds(data);

    let mut datasets = vec![];
    if !data.is_empty() {
        datasets.push(
            Dataset::default()
                .name(title.to_string())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(color))
                .data(data),
        );
    }

    let x_labels = vec![
        Span::raw(format!("{}", x_min as usize)),
        Span::raw(format!("{}", x_max as usize)),
    ];
    let y_labels = vec![
        Span::raw(format!("{:.0}", y_min)),
        Span::raw(format!("{:.0}", y_max)),
    ];

    let latest = data.last().map(|p| p.1).unwrap_or(0.0);
    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{} (now: {:.0})", title, latest)),
        )
        .x_axis(
            Axis::default()
                .title("Step")
                .labels(x_labels)
                .bounds([x_min, x_max]),
        )
        .y_axis(
            Axis::default()
                .labels(y_labels)
                .bounds([y_min, y_max]),
        );

    frame.render_widget(chart, area);
}

fn render_progress_gauge(frame: &mut Frame, dashboard: &DashboardState, area: Rect) {
    let progress = dashboard.progress();
    let label = format!(
        "{}/{} ({:.1}%)",
        dashboard.step,
        dashboard.max_steps,
        progress * 100.0
    );

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Style::default().fg(Color::Blue))
        .ratio(progress.clamp(0.0, 1.0))
        .label(label);

    frame.render_widget(gauge, area);
}

fn render_stats_panel(frame: &mut Frame, dashboard: &DashboardState, area: Rect) {
    let label = |text: &'static str| Span::styled(text, Style::default().fg(Color::White));

    let mut lines = vec![
        Line::from(vec![
            label("Avg Reward:  "),
            Span::styled(
                format!("{:.2}", dashboard.average_reward),
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            label("Avg Queue:   "),
            Span::styled(
                format!("{:.2}", dashboard.average_congestion),
                Style::default().fg(Color::Red),
            ),
        ]),
        Line::from(vec![
            label("Epsilon:     "),
            Span::raw(format!("{:.4}", dashboard.epsilon)),
        ]),
        Line::from(vec![
            label("Loss:        "),
            Span::raw(format!("{:.6}", dashboard.loss)),
        ]),
        Line::from(vec![
            label("Updates:     "),
            Span::raw(format!("{}", dashboard.updates)),
        ]),
        Line::from(vec![
            label("Speed:       "),
            Span::raw(format!(
                "{:.0} steps/s  ({}/tick)",
                dashboard.steps_per_sec, dashboard.steps_per_tick
            )),
        ]),
    ];

    if let Some(ref error) = dashboard.last_error {
        lines.push(Line::from(vec![
            label("Error: "),
            Span::styled(error.clone(), Style::default().fg(Color::Red)),
        ]));
    } else if let Some(ref ckpt) = dashboard.last_checkpoint {
        lines.push(Line::from(vec![
            label("Last Save: "),
            Span::styled(ckpt.clone(), Style::default().fg(Color::DarkGray)),
        ]));
    }

    let stats = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Stats"));

    frame.render_widget(stats, area);
}

fn render_action_counts(frame: &mut Frame, dashboard: &DashboardState, area: Rect) {
    let bars: Vec<(&str, u64)> = dashboard
        .action_labels
        .iter()
        .map(String::as_str)
        .zip(dashboard.action_counts.iter().copied())
        .collect();

    let chart = BarChart::default()
        .block(Block::default().borders(Borders::ALL).title("Actions"))
        .data(bars.as_slice())
        .bar_width(8)
        .bar_gap(2)
        .bar_style(Style::default().fg(Color::Yellow))
        .value_style(Style::default().fg(Color::Black).bg(Color::Yellow));

    frame.render_widget(chart, area);
}

fn render_agents_table(frame: &mut Frame, dashboard: &DashboardState, area: Rect) {
    let header = Row::new(vec!["Agent", "State", "Action", "Queue", "Reward"])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = dashboard
        .agents
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let style = if i == dashboard.selected_agent {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(a.agent.to_string()),
                Cell::from(a.state.clone()),
                Cell::from(a.action_label.clone()),
                Cell::from(a.congestion.to_string()),
                Cell::from(format!("{:.1}", a.reward)),
            ])
            .style(style)
        })
        .collect();

    let widths = [
        Constraint::Percentage(24),
        Constraint::Percentage(24),
        Constraint::Percentage(20),
        Constraint::Percentage(14),
        Constraint::Percentage(18),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Agents"));

    frame.render_widget(table, area);
}

fn render_value_rows(frame: &mut Frame, dashboard: &DashboardState, area: Rect) {
    let title = match dashboard.selected_agent_id() {
        Some(agent) => format!("{} values: {}", dashboard.values.kind, agent),
        None => "Values".to_string(),
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    let value_rows = dashboard.selected_value_rows();
    if value_rows.is_empty() {
        let placeholder = Paragraph::new("Waiting for values...")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let mut header = vec!["State".to_string()];
    header.extend(dashboard.action_labels.iter().cloned());
    let header = Row::new(header).style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = value_rows
        .iter()
        .map(|row| {
            let mut cells = vec![Cell::from(row.state.clone())];
            cells.extend(row.values.iter().map(|v| Cell::from(format!("{:.3}", v))));
            Row::new(cells)
        })
        .collect();

    let columns = dashboard.action_labels.len() + 1;
    let widths = vec![Constraint::Ratio(1, columns as u32); columns];
    let table = Table::new(rows, widths).header(header).block(block);

    frame.render_widget(table, area);
}

fn render_footer(frame: &mut Frame, area: Rect) {
    let footer = Paragraph::new(
        "P: Pause/Resume  |  S: Save Checkpoint  |  Tab: Next Agent  |  +/-: Speed  |  Q: Quit",
    )
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::ALL).title("Controls"));

    frame.render_widget(footer, area);
}

/// Compute x-axis bounds from data points.
fn x_bounds(data: &[(f64, f64)]) -> (f64, f64) {
    match (data.first(), data.last()) {
        (Some(first), Some(last)) => (first.0, last.0.max(first.0 + 1.0)),
        _ => (0.0, 1.0),
    }
}

/// Y bounds padded to whole numbers so a flat line stays visible.
fn y_bounds(data: &[(f64, f64)]) -> (f64, f64) {
    if data.is_empty() {
        return (0.0, 1.0);
    }
    let min = data.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let max = data.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
    let (min, max) = (min.floor(), max.ceil());
    if max - min < 1.0 {
        (min - 1.0, max + 1.0)
    } else {
        (min, max)
    }
}
