use log::debug;
use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};

use crate::types::MarkdownResult;

/// Service for handling markdown rendering and text extraction
#[derive(Clone, Copy, Default)]
pub struct MarkdownService;

impl MarkdownService {
    /// Create a new markdown service
    pub fn new() -> Self {
        Self
    }

    fn options() -> Options {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options
    }

    /// Render a page body to HTML, front matter stripped
    pub fn render(&self, content: &str) -> MarkdownResult {
        let (front_title, body) = split_front_matter(content);
        let mut out = String::with_capacity(body.len() * 3 / 2);
        html::push_html(&mut out, Parser::new_ext(body, Self::options()));
        let title = front_title.or_else(|| first_heading(body));
        debug!("Rendered {} bytes of markdown into {} bytes of HTML", content.len(), out.len());
        MarkdownResult { html: out, title }
    }

    /// Page title from front matter, then the first H1
    pub fn extract_title(&self, content: &str) -> Option<String> {
        let (front_title, body) = split_front_matter(content);
        front_title.or_else(|| first_heading(body))
    }

    /// Text content with markup removed, one space between blocks
    pub fn plain_text(&self, content: &str) -> String {
        let (_, body) = split_front_matter(content);
        let mut text = String::with_capacity(body.len());
        for event in Parser::new_ext(body, Self::options()) {
            match event {
                Event::Text(t) | Event::Code(t) => text.push_str(&t),
                Event::SoftBreak
                | Event::HardBreak
                | Event::End(
                    TagEnd::Paragraph
                    | TagEnd::Heading(_)
                    | TagEnd::Item
                    | TagEnd::TableCell
                    | TagEnd::CodeBlock,
                ) => {
                    if !text.ends_with(' ') && !text.is_empty() {
                        text.push(' ');
                    }
                }
                _ => {}
            }
        }
        text.trim_end().to_string()
    }
}

fn first_heading(body: &str) -> Option<String> {
    let mut in_h1 = false;
    let mut buf = String::new();
    for event in Parser::new(body) {
        match event {
            Event::Start(Tag::Heading { level, .. }) if level == pulldown_cmark::HeadingLevel::H1 => {
                in_h1 = true;
                buf.clear();
            }
            Event::End(TagEnd::Heading(_)) if in_h1 => {
                let title = buf.trim();
                if !title.is_empty() {
                    return Some(title.to_string());
                }
                in_h1 = false;
            }
            Event::Text(t) | Event::Code(t) if in_h1 => buf.push_str(&t),
            _ => {}
        }
    }
    None
}

/// Split a leading `---` block off the content, returning its `title:` value
fn split_front_matter(raw: &str) -> (Option<String>, &str) {
    let Some(rest) = raw.strip_prefix("---\n").or_else(|| raw.strip_prefix("---\r\n")) else {
        return (None, raw);
    };
    let mut title = None;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        offset += line.len();
        let trimmed = line.trim();
        if trimmed == "---" {
            return (title, &rest[offset..]);
        }
        if let Some((key, value)) = trimmed.split_once(':') {
            if key.trim().eq_ignore_ascii_case("title") {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                if !value.is_empty() {
                    title = Some(value.to_string());
                }
            }
        }
    }
    (None, raw)
}
