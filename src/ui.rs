//! Screen rendering.
//!
//! `render` is a pure function of the session state and theme: it paints the
//! frame and never touches the connection.

use ratatui::Frame;
use ratatui::buffer::Buffer;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Padding, Paragraph, Widget, Wrap};

use crate::app::{App, Focus, GenerationState, Interview, Mode};
use crate::text_input::TextInput;
use crate::theme::Theme;

const TITLE: &str = "PromptForge";
const SUBTITLE: &str = "Turn a task into a plan-first prompt for your AI coding assistant";

const INPUT_HELP: &str = "Tab/Shift+Tab: switch field • Ctrl+E: generate • Ctrl+C: quit";
const INTERVIEW_HELP: &str = "Enter: answer (blank to skip) • Esc: cancel • Ctrl+C: quit";
const RESULT_HELP: &str = "c: copy • s: save • p: print & exit • r: new • q: quit • j/k: scroll";
const GENERATING_STATUS: &str = "Generating prompt... (Esc to cancel)";

/// Inner heights of the three form fields.
const TASK_ROWS: u16 = 5;
const DETAILS_ROWS: u16 = 4;
const SECRET_ROWS: u16 = 1;

/// Calculate a centered rectangle within the given area.
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

/// Paint the current screen.
pub fn render(frame: &mut Frame, app: &App, theme: &Theme) {
    let area = frame.area();
    if area.is_empty() {
        return;
    }
    let buf = frame.buffer_mut();

    match (app.mode, &app.generation) {
        (Mode::Result, _) => draw_result(app, theme, area, buf),
        (Mode::Input, GenerationState::Interviewing { interview, .. }) => {
            draw_interview(interview, app.content_width(), theme, area, buf)
        }
        (Mode::Input, _) => draw_input(app, theme, area, buf),
    }
}

fn draw_input(app: &App, theme: &Theme, area: Rect, buf: &mut Buffer) {
    let rows = [
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(TASK_ROWS + 2),
        Constraint::Length(DETAILS_ROWS + 2),
        Constraint::Length(SECRET_ROWS + 2),
        Constraint::Length(1),
        Constraint::Length(1),
    ];
    let height = TASK_ROWS + DETAILS_ROWS + SECRET_ROWS + 6 + 5;
    let content = centered_rect(app.content_width(), height, area);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(rows)
        .split(content);

    draw_header(theme, chunks[0], chunks[1], buf);

    for (focus, chunk) in Focus::ALL.into_iter().zip(&chunks[3..6]) {
        draw_field(app, focus, theme, *chunk, buf);
    }

    let status = if let Some(error) = &app.error {
        Line::styled(error.clone(), theme.error_text())
    } else if app.is_generating() {
        Line::styled(GENERATING_STATUS, Style::default().fg(theme.accent))
    } else {
        Line::default()
    };
    Paragraph::new(status).render(chunks[6], buf);
    Paragraph::new(Line::styled(INPUT_HELP, theme.muted()))
        .alignment(Alignment::Center)
        .render(chunks[7], buf);
}

fn draw_header(theme: &Theme, title_area: Rect, subtitle_area: Rect, buf: &mut Buffer) {
    Paragraph::new(Line::styled(TITLE, theme.title()))
        .alignment(Alignment::Center)
        .render(title_area, buf);
    Paragraph::new(Line::styled(SUBTITLE, theme.muted()))
        .alignment(Alignment::Center)
        .render(subtitle_area, buf);
}

fn placeholder(focus: Focus) -> &'static str {
    match focus {
        Focus::Task => "What do you want to build or fix?",
        Focus::Details => "Stack, constraints, anything else worth knowing",
        Focus::Secret => "Word that unlocks implementation",
    }
}

fn draw_field(app: &App, focus: Focus, theme: &Theme, area: Rect, buf: &mut Buffer) {
    let input = app.field(focus);
    let focused = app.focus == focus;
    let label_style = if focused {
        theme.label()
    } else {
        theme.muted()
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.border(focused))
        .title(Span::styled(format!(" {} ", focus.label()), label_style))
        .title_bottom(
            Line::styled(format!(" {}/{} ", input.len(), input.limit()), theme.muted())
                .right_aligned(),
        );
    let inner = block.inner(area);
    block.render(area, buf);

    let lines = if input.is_empty() && !focused {
        vec![Line::styled(placeholder(focus), theme.muted())]
    } else {
        field_lines(input, focused, inner.width as usize, inner.height as usize, theme)
    };
    Paragraph::new(lines).render(inner, buf);
}

/// Visible lines of a text field. The focused field scrolls to keep the
/// cursor in view both vertically and horizontally.
fn field_lines(
    input: &TextInput,
    focused: bool,
    width: usize,
    height: usize,
    theme: &Theme,
) -> Vec<Line<'static>> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let (cursor_line, cursor_col) = input.cursor_position();
    let first = if focused {
        cursor_line.saturating_sub(height - 1)
    } else {
        0
    };

    input
        .lines()
        .iter()
        .enumerate()
        .skip(first)
        .take(height)
        .map(|(i, line)| {
            let chars: Vec<char> = line.chars().collect();
            let cursor = (focused && i == cursor_line).then_some(cursor_col);
            field_line(&chars, cursor, width, theme.body())
        })
        .collect()
}

fn field_line(chars: &[char], cursor: Option<usize>, width: usize, style: Style) -> Line<'static> {
    let start = match cursor {
        Some(col) if col >= width => col + 1 - width,
        _ => 0,
    };
    let end = (start + width).min(chars.len());
    let slice = |from: usize, to: usize| -> String {
        if from >= to {
            String::new()
        } else {
            chars[from..to].iter().collect()
        }
    };

    let Some(col) = cursor else {
        return Line::styled(slice(start, end), style);
    };
    let cursor_char = chars.get(col).copied().unwrap_or(' ');
    Line::from(vec![
        Span::styled(slice(start, col), style),
        Span::styled(
            cursor_char.to_string(),
            style.add_modifier(Modifier::REVERSED),
        ),
        Span::styled(slice(col + 1, end), style),
    ])
}

fn draw_interview(
    interview: &Interview,
    width: u16,
    theme: &Theme,
    area: Rect,
    buf: &mut Buffer,
) {
    let content = centered_rect(width, 13, area);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(content);

    Paragraph::new(Line::styled(TITLE, theme.title()))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);
    Paragraph::new(Line::from(vec![
        Span::styled("Task type: ", theme.muted()),
        Span::styled(interview.task_type.to_string(), theme.label()),
    ]))
    .alignment(Alignment::Center)
    .render(chunks[1], buf);

    let total = interview.questions.len();
    let number = (interview.current() + 1).min(total);
    Paragraph::new(Line::styled(
        format!("Question {}/{}", number, total),
        theme.label(),
    ))
    .render(chunks[3], buf);
    Paragraph::new(interview.current_question().unwrap_or_default().to_string())
        .style(theme.body())
        .wrap(Wrap { trim: true })
        .render(chunks[4], buf);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.border(true))
        .title(Span::styled(" Answer ", theme.label()));
    let inner = block.inner(chunks[6]);
    block.render(chunks[6], buf);
    Paragraph::new(field_lines(
        &interview.input,
        true,
        inner.width as usize,
        inner.height as usize,
        theme,
    ))
    .render(inner, buf);

    Paragraph::new(Line::styled(INTERVIEW_HELP, theme.muted()))
        .alignment(Alignment::Center)
        .render(chunks[8], buf);
}

fn draw_result(app: &App, theme: &Theme, area: Rect, buf: &mut Buffer) {
    let prompt_rows = app.result_height();
    let content = centered_rect(app.content_width(), prompt_rows + 12, area);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(prompt_rows + 2),
            Constraint::Length(1),
            Constraint::Length(4),
            Constraint::Length(2),
            Constraint::Length(1),
        ])
        .split(content);

    Paragraph::new(Line::styled("Your prompt is ready", theme.title()))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);

    let total = app.visual_line_count();
    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.border(true))
        .padding(Padding::horizontal(1))
        .title(Span::styled(" Generated prompt ", theme.label()));
    if total > prompt_rows {
        let first = app.scroll_offset + 1;
        let last = (app.scroll_offset + prompt_rows).min(total);
        block = block.title_bottom(
            Line::styled(format!(" {}-{}/{} ", first, last, total), theme.muted()).right_aligned(),
        );
    }
    Paragraph::new(app.generated_prompt.clone().unwrap_or_default())
        .style(theme.body())
        .wrap(Wrap { trim: false })
        .scroll((app.scroll_offset, 0))
        .block(block)
        .render(chunks[2], buf);

    Paragraph::new(app.tip.clone().unwrap_or_default())
        .style(theme.muted())
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.border(false))
                .padding(Padding::horizontal(1))
                .title(Span::styled(" Tip ", theme.muted())),
        )
        .render(chunks[4], buf);

    let feedback: Vec<Line> = [&app.copy_feedback, &app.save_feedback]
        .into_iter()
        .flatten()
        .map(|f| {
            let style = if f.text.starts_with("Error:") {
                theme.error_text()
            } else {
                theme.success_text()
            };
            Line::styled(f.text.clone(), style)
        })
        .collect();
    Paragraph::new(feedback)
        .alignment(Alignment::Center)
        .render(chunks[5], buf);

    Paragraph::new(Line::styled(RESULT_HELP, theme.muted()))
        .alignment(Alignment::Center)
        .render(chunks[6], buf);
}

#[cfg(test)]
mod tests {
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use tokio::sync::oneshot;
    use tokio::time::Instant;

    use super::*;
    use crate::app::{MAX_VIEWPORT_HEIGHT, MAX_VIEWPORT_WIDTH};
    use crate::events::Completion;
    use crate::generation::{Generated, TaskType};

    fn draw(app: &App, theme: &Theme) -> Buffer {
        let backend = TestBackend::new(app.viewport.width, app.viewport.height);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|frame| render(frame, app, theme)).unwrap();
        terminal.backend().buffer().clone()
    }

    fn text(buffer: &Buffer) -> String {
        let area = buffer.area;
        let mut out = String::new();
        for y in 0..area.height {
            for x in 0..area.width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    fn type_text(app: &mut App, s: &str) {
        for c in s.chars() {
            app.handle_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE));
        }
    }

    fn ctrl_e() -> KeyEvent {
        KeyEvent::new(KeyCode::Char('e'), KeyModifiers::CONTROL)
    }

    fn result_app(prompt: &str) -> App {
        let mut app = App::new();
        type_text(&mut app, "task");
        app.focus = Focus::Secret;
        type_text(&mut app, "banana");
        app.handle_key(ctrl_e());
        app.handle_completion(
            Completion::Generated {
                id: 1,
                result: Ok(Generated {
                    prompt: prompt.into(),
                    tip: "Paste it first.".into(),
                }),
            },
            Instant::now(),
        );
        app
    }

    #[test]
    fn test_centered_rect() {
        let area = Rect::new(0, 0, 80, 24);
        assert_eq!(centered_rect(40, 10, area), Rect::new(20, 7, 40, 10));
        assert_eq!(centered_rect(100, 30, area), Rect::new(0, 0, 80, 24));
    }

    #[test]
    fn test_buffer_matches_viewport() {
        let mut app = App::new();
        app.resize(120, 40);
        let buffer = draw(&app, &Theme::default());
        assert_eq!(buffer.area, Rect::new(0, 0, 120, 40));
    }

    #[test]
    fn test_oversized_report_renders_at_clamped_size() {
        let mut app = App::new();
        app.resize(u16::MAX, u16::MAX);
        let buffer = draw(&app, &Theme::default());
        assert_eq!(
            buffer.area,
            Rect::new(0, 0, MAX_VIEWPORT_WIDTH, MAX_VIEWPORT_HEIGHT)
        );
        assert!(text(&buffer).contains(TITLE));
    }

    #[test]
    fn test_input_screen_shows_fields_in_order() {
        let screen = text(&draw(&App::new(), &Theme::default()));
        let task = screen.find(" Task ").unwrap();
        let details = screen.find(" Details (optional) ").unwrap();
        let secret = screen.find(" Secret word ").unwrap();
        assert!(task < details && details < secret);
        assert!(screen.contains(TITLE));
        assert!(screen.contains("Ctrl+E: generate"));
    }

    #[test]
    fn test_focused_field_border_is_highlighted() {
        let theme = Theme::default();
        let mut app = App::new();
        app.focus = Focus::Details;
        let buffer = draw(&app, &theme);
        let screen = text(&buffer);

        let row_of = |label: &str| screen.lines().position(|l| l.contains(label)).unwrap() as u16;
        let x = app_left(&app);
        assert_eq!(buffer[(x, row_of(" Details (optional) "))].fg, theme.primary);
        assert_eq!(buffer[(x, row_of(" Task "))].fg, theme.secondary);
    }

    fn app_left(app: &App) -> u16 {
        (app.viewport.width - app.content_width()) / 2
    }

    #[test]
    fn test_typed_text_and_cursor_rendered() {
        let mut app = App::new();
        type_text(&mut app, "add retry");
        let buffer = draw(&App::new(), &Theme::default());
        assert!(!text(&buffer).contains("add retry"));

        let buffer = draw(&app, &Theme::default());
        let screen = text(&buffer);
        assert!(screen.contains("add retry"));
        assert!(screen.contains("9/5000"));

        let row = screen.lines().position(|l| l.contains("add retry")).unwrap() as u16;
        // text starts just inside the left border
        let cursor = &buffer[(app_left(&app) + 1 + 9, row)];
        assert!(cursor.modifier.contains(Modifier::REVERSED));
    }

    #[test]
    fn test_placeholder_for_empty_unfocused_field() {
        let screen = text(&draw(&App::new(), &Theme::default()));
        assert!(screen.contains(placeholder(Focus::Secret)));
        assert!(!screen.contains(placeholder(Focus::Task)));
    }

    #[test]
    fn test_error_and_generating_status() {
        let mut app = App::new();
        app.handle_key(ctrl_e());
        assert!(text(&draw(&app, &Theme::default())).contains("Task is required"));

        type_text(&mut app, "task");
        app.focus = Focus::Secret;
        type_text(&mut app, "s");
        app.handle_key(ctrl_e());
        assert!(text(&draw(&app, &Theme::default())).contains(GENERATING_STATUS));
    }

    #[test]
    fn test_long_line_scrolls_to_cursor() {
        let chars: Vec<char> = "abcdefghij".chars().collect();
        let line = field_line(&chars, Some(10), 5, Style::default());
        let rendered: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(rendered, "ghij ");
    }

    #[test]
    fn test_field_follows_cursor_line() {
        let mut input = TextInput::multi_line(100);
        input.set_value("1\n2\n3\n4\n5\n6\n7");
        let lines = field_lines(&input, true, 10, 5, &Theme::default());
        let first: String = lines[0].spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(first, "3");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_interview_screen() {
        let mut app = App::new();
        type_text(&mut app, "task");
        app.focus = Focus::Secret;
        type_text(&mut app, "s");
        app.handle_key(ctrl_e());
        let (tx, _rx) = oneshot::channel();
        app.handle_completion(
            Completion::Questions {
                id: 1,
                task_type: TaskType::Refactoring,
                questions: vec!["Which module?".into(), "Keep the API?".into()],
                reply: tx,
            },
            Instant::now(),
        );
        let screen = text(&draw(&app, &Theme::default()));
        assert!(screen.contains("Task type: refactoring"));
        assert!(screen.contains("Question 1/2"));
        assert!(screen.contains("Which module?"));
        assert!(!screen.contains(" Secret word "));
    }

    #[test]
    fn test_result_screen_shows_prompt_tip_and_feedback() {
        let mut app = result_app("first line\nsecond line");
        app.handle_completion(
            Completion::Copied {
                sequence: String::new(),
            },
            Instant::now(),
        );
        app.handle_completion(Completion::Saved(Err("denied".into())), Instant::now());

        let theme = Theme::default();
        let buffer = draw(&app, &theme);
        let screen = text(&buffer);
        assert!(screen.contains("first line"));
        assert!(screen.contains("second line"));
        assert!(screen.contains("Paste it first."));
        assert!(screen.contains("Copied to clipboard!"));
        assert!(screen.contains("Error: denied"));
        assert!(screen.contains("c: copy"));
    }

    #[test]
    fn test_result_screen_respects_scroll() {
        let prompt: Vec<String> = (0..40).map(|i| format!("row-{i:02}")).collect();
        let mut app = result_app(&prompt.join("\n"));
        for _ in 0..5 {
            app.handle_key(KeyEvent::new(KeyCode::Char('j'), KeyModifiers::NONE));
        }
        let screen = text(&draw(&app, &Theme::default()));
        assert!(!screen.contains("row-04"));
        assert!(screen.contains("row-05"));
        assert!(screen.contains("row-13"));
        assert!(!screen.contains("row-14"));
        assert!(screen.contains(" 6-14/40 "));
    }
}
