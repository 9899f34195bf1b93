use pulldown_cmark::{CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::layout::Alignment;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};

// Renders post bodies. Only paragraphs, headings, lists, strong and
// emphasis survive; any other element is dropped along with its content.
#[derive(Default)]
pub struct Renderer;

impl Renderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, input: &str) -> Text<'static> {
        let parser = Parser::new_ext(input, Options::empty());
        let mut writer = MarkdownWriter::default();
        writer.render(parser);
        writer.into_text()
    }
}

#[derive(Default)]
struct MarkdownWriter {
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    list_stack: Vec<ListState>,
    item_prefix: Option<String>,
    heading_level: Option<u8>,
    strong: usize,
    emphasis: usize,
    skip_depth: usize,
}

#[derive(Clone, Copy)]
struct ListState {
    ordered: bool,
    index: u64,
}

impl MarkdownWriter {
    fn render<'a, I>(&mut self, parser: I)
    where
        I: Iterator<Item = Event<'a>>,
    {
        for event in parser {
            if self.skip_depth > 0 {
                match event {
                    Event::Start(_) => self.skip_depth += 1,
                    Event::End(_) => self.skip_depth -= 1,
                    _ => {}
                }
                continue;
            }
            match event {
                Event::Start(tag) => self.start_tag(tag),
                Event::End(tag) => self.end_tag(tag),
                Event::Text(text) => self.text(text),
                Event::SoftBreak => self.text(CowStr::Borrowed(" ")),
                // Inline code, html, rules, hard breaks and footnote marks are
                // not part of the rendered subset.
                _ => {}
            }
        }
        self.flush_line();
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.flush_line(),
            Tag::Heading { level, .. } => {
                self.flush_line();
                self.heading_level = Some(level_to_u8(level));
            }
            Tag::List(start) => {
                self.flush_line();
                self.list_stack.push(ListState {
                    ordered: start.is_some(),
                    index: start.unwrap_or(1),
                });
            }
            Tag::Item => {
                self.flush_line();
                let indent = self.list_stack.len().saturating_sub(1);
                if let Some(state) = self.list_stack.last() {
                    let marker = if state.ordered {
                        format!("{}.", state.index)
                    } else {
                        "•".to_string()
                    };
                    self.item_prefix = Some(format!("{}{} ", "  ".repeat(indent), marker));
                }
            }
            Tag::Strong => self.strong += 1,
            Tag::Emphasis => self.emphasis += 1,
            _ => self.skip_depth = 1,
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush_line();
                if self.list_stack.is_empty() {
                    self.push_blank();
                }
            }
            TagEnd::Heading(_) => {
                self.flush_line();
                self.heading_level = None;
                self.push_blank();
            }
            TagEnd::List(_) => {
                self.flush_line();
                self.list_stack.pop();
                if self.list_stack.is_empty() {
                    self.push_blank();
                }
            }
            TagEnd::Item => {
                self.flush_line();
                if let Some(state) = self.list_stack.last_mut() {
                    state.index += 1;
                }
                self.item_prefix = None;
            }
            TagEnd::Strong => self.strong = self.strong.saturating_sub(1),
            TagEnd::Emphasis => self.emphasis = self.emphasis.saturating_sub(1),
            _ => {}
        }
    }

    fn text(&mut self, text: CowStr<'_>) {
        if self.spans.is_empty() && text.trim().is_empty() {
            return;
        }
        let style = self.current_style();
        self.spans.push(Span::styled(text.into_string(), style));
    }

    fn current_style(&self) -> Style {
        let mut style = match self.heading_level {
            Some(level) => heading_style(level),
            None => Style::default(),
        };
        if self.strong > 0 {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.emphasis > 0 {
            style = style.add_modifier(Modifier::ITALIC);
        }
        style
    }

    fn flush_line(&mut self) {
        if self.spans.is_empty() {
            return;
        }
        let mut spans = Vec::with_capacity(self.spans.len() + 1);
        if let Some(prefix) = self.item_prefix.as_mut() {
            spans.push(Span::styled(prefix.clone(), Style::default().fg(Color::Yellow)));
            // Continuation lines of the same item line up under its text.
            *prefix = " ".repeat(prefix.chars().count());
        }
        spans.append(&mut self.spans);
        self.lines.push(Line::from(spans));
    }

    fn push_blank(&mut self) {
        if self
            .lines
            .last()
            .is_some_and(|line| !line.spans.is_empty())
        {
            self.lines.push(Line::default());
        }
    }

    fn into_text(mut self) -> Text<'static> {
        while self
            .lines
            .last()
            .is_some_and(|line| line.spans.is_empty())
        {
            self.lines.pop();
        }
        if self.lines.is_empty() {
            self.lines.push(Line::from(Span::raw("")));
        }
        Text {
            lines: self.lines,
            alignment: Some(Alignment::Left),
            style: Style::default(),
        }
    }
}

fn heading_style(level: u8) -> Style {
    match level {
        1 => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        2 => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
        3 => Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
        _ => Style::default().fg(Color::Magenta),
    }
}

fn level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(text: &Text<'_>) -> Vec<String> {
        text.lines
            .iter()
            .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn paragraphs_and_inline_styles() {
        let text = Renderer::new().render("Hello **bold** and *soft*\ntext.\n\nSecond.");
        assert_eq!(plain(&text), ["Hello bold and soft text.", "", "Second."]);
        let bold = &text.lines[0].spans[1];
        assert_eq!(bold.content.as_ref(), "bold");
        assert!(bold.style.add_modifier.contains(Modifier::BOLD));
        let soft = &text.lines[0].spans[3];
        assert!(soft.style.add_modifier.contains(Modifier::ITALIC));
    }

    #[test]
    fn headings_and_lists() {
        let text = Renderer::new().render("# Title\n\n- one\n- two\n\n1. first\n2. second");
        assert_eq!(
            plain(&text),
            ["Title", "", "• one", "• two", "", "1. first", "2. second"]
        );
        assert!(text.lines[0].spans[0]
            .style
            .add_modifier
            .contains(Modifier::UNDERLINED));
    }

    #[test]
    fn disallowed_elements_are_dropped_with_their_content() {
        let input = "Before [a link](https://example.com) after.\n\n> quoted\n\n```\nfn main() {}\n```\n\n![alt](x.png)\n\nEnd with `code`.";
        let text = Renderer::new().render(input);
        assert_eq!(plain(&text), ["Before  after.", "", "End with ."]);
    }

    #[test]
    fn nested_list_items_indent() {
        let text = Renderer::new().render("- outer\n  - inner");
        assert_eq!(plain(&text), ["• outer", "  • inner"]);
    }

    #[test]
    fn empty_body_renders_one_blank_line() {
        let text = Renderer::new().render("");
        assert_eq!(text.lines.len(), 1);
    }
}
