use crate::history::model::{Checkpoint, DayClock, LatestRecord, Message};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// One line of output, independent of markup.
#[derive(Debug, Clone, Copy)]
pub enum RenderedLine<'a> {
    DateMarker(NaiveDate),
    Message(&'a Message),
    Record(&'a DocumentRecord),
}

/// Structured trailer entries carried inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum DocumentRecord {
    Checkpoint(Checkpoint),
    Latest(LatestRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Html,
    Markdown,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Markdown => "md",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str())? {
            "html" | "htm" => Some(OutputFormat::Html),
            "md" | "markdown" => Some(OutputFormat::Markdown),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Html => f.write_str("html"),
            OutputFormat::Markdown => f.write_str("markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(OutputFormat::Html),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format `{other}`; use `html` or `markdown`")),
        }
    }
}

/// Markup for a single-line-per-item document.
///
/// A document is laid out as: preamble (ending with [`Renderer::body_open`]),
/// body lines, [`Renderer::body_close`], trailer records, closing lines.
/// Every rendered item occupies exactly one line.
pub trait Renderer {
    fn format(&self) -> OutputFormat;
    fn preamble(&self, title: &str) -> Vec<String>;
    fn body_open(&self) -> &'static str;
    fn body_close(&self) -> &'static str;
    fn closing(&self) -> Vec<String>;
    fn render(&self, line: &RenderedLine<'_>) -> String;
    /// JSON payload of a trailer record line.
    fn record_payload(&self, line: &str) -> Option<String>;
    fn is_date_marker(&self, line: &str) -> bool;
    fn is_message_line(&self, line: &str) -> bool;
}

pub fn renderer_for(
    format: OutputFormat,
    clock: DayClock,
    self_user_id: Option<String>,
) -> Box<dyn Renderer> {
    match format {
        OutputFormat::Html => Box::new(HtmlRenderer {
            clock,
            self_user_id,
        }),
        OutputFormat::Markdown => Box::new(MarkdownRenderer {
            clock,
            self_user_id,
        }),
    }
}

pub fn date_marker_text(date: NaiveDate) -> String {
    date.format("%A, %d %B %Y").to_string()
}

fn html_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn html_unescape(raw: &str) -> String {
    raw.replace("&quot;", "\"")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}

/// Folds line breaks so one message stays on one line.
fn single_line(raw: &str, separator: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .collect::<Vec<_>>()
        .join(separator)
}

fn record_json(record: &DocumentRecord) -> String {
    // Records hold only strings, dates and integers.
    serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
}

pub struct HtmlRenderer {
    pub clock: DayClock,
    pub self_user_id: Option<String>,
}

const HTML_MARKER_PREFIX: &str = "<tr><td class=\"date\"";
const HTML_RECORD_PREFIX: &str = "<p hidden data-record>";
const HTML_RECORD_SUFFIX: &str = "</p>";

impl HtmlRenderer {
    fn is_self(&self, message: &Message) -> bool {
        self.self_user_id.as_deref() == Some(message.sender_id.as_str())
    }
}

impl Renderer for HtmlRenderer {
    fn format(&self) -> OutputFormat {
        OutputFormat::Html
    }

    fn preamble(&self, title: &str) -> Vec<String> {
        vec![
            "<!DOCTYPE html>".to_string(),
            "<html>".to_string(),
            "<head>".to_string(),
            "<meta charset=\"utf-8\">".to_string(),
            format!("<title>{}</title>", html_escape(title)),
            "<link rel=\"stylesheet\" href=\"styles.css\" type=\"text/css\">".to_string(),
            "</head>".to_string(),
            "<body>".to_string(),
            self.body_open().to_string(),
        ]
    }

    fn body_open(&self) -> &'static str {
        "<table>"
    }

    fn body_close(&self) -> &'static str {
        "</table>"
    }

    fn closing(&self) -> Vec<String> {
        vec!["</body>".to_string(), "</html>".to_string()]
    }

    fn render(&self, line: &RenderedLine<'_>) -> String {
        match line {
            RenderedLine::DateMarker(date) => format!(
                "{HTML_MARKER_PREFIX} colspan=\"3\">{}</td></tr>",
                date_marker_text(*date)
            ),
            RenderedLine::Message(message) => {
                let (name_class, hour_class) = if self.is_self(message) {
                    ("self_name", "self_hour")
                } else {
                    ("name", "hour")
                };
                let text = message
                    .body
                    .as_deref()
                    .map(|body| single_line(&html_escape(body), "<br>"))
                    .unwrap_or_default();
                format!(
                    "<tr><td class=\"{name_class}\">{}</td> <td class=\"{hour_class}\">({}):</td> <td class=\"text\">{text}</td></tr>",
                    single_line(&html_escape(&message.sender_name), " "),
                    self.clock.clock_time(message),
                )
            }
            RenderedLine::Record(record) => format!(
                "{HTML_RECORD_PREFIX}{}{HTML_RECORD_SUFFIX}",
                html_escape(&record_json(record))
            ),
        }
    }

    fn record_payload(&self, line: &str) -> Option<String> {
        let inner = line
            .strip_prefix(HTML_RECORD_PREFIX)?
            .strip_suffix(HTML_RECORD_SUFFIX)?;
        Some(html_unescape(inner))
    }

    fn is_date_marker(&self, line: &str) -> bool {
        line.starts_with(HTML_MARKER_PREFIX)
    }

    fn is_message_line(&self, line: &str) -> bool {
        line.starts_with("<tr><td class=\"name\"") || line.starts_with("<tr><td class=\"self_name\"")
    }
}

pub struct MarkdownRenderer {
    pub clock: DayClock,
    pub self_user_id: Option<String>,
}

const MD_RECORD_PREFIX: &str = "<!-- chatlog:record ";
const MD_RECORD_SUFFIX: &str = " -->";

impl Renderer for MarkdownRenderer {
    fn format(&self) -> OutputFormat {
        OutputFormat::Markdown
    }

    fn preamble(&self, title: &str) -> Vec<String> {
        vec![
            format!("# {}", single_line(title, " ")),
            String::new(),
            self.body_open().to_string(),
        ]
    }

    fn body_open(&self) -> &'static str {
        "<!-- chatlog:body -->"
    }

    fn body_close(&self) -> &'static str {
        "<!-- chatlog:end -->"
    }

    fn closing(&self) -> Vec<String> {
        Vec::new()
    }

    fn render(&self, line: &RenderedLine<'_>) -> String {
        match line {
            RenderedLine::DateMarker(date) => format!("## {}", date_marker_text(*date)),
            RenderedLine::Message(message) => {
                let name = single_line(&message.sender_name, " ");
                let name = if self.self_user_id.as_deref() == Some(message.sender_id.as_str()) {
                    format!("**{name}** _(you)_")
                } else {
                    format!("**{name}**")
                };
                let text = message
                    .body
                    .as_deref()
                    .map(|body| single_line(body, "<br>"))
                    .unwrap_or_default();
                format!("- {name} ({}): {text}", self.clock.clock_time(message))
            }
            RenderedLine::Record(record) => {
                format!("{MD_RECORD_PREFIX}{}{MD_RECORD_SUFFIX}", record_json(record))
            }
        }
    }

    fn record_payload(&self, line: &str) -> Option<String> {
        let inner = line
            .strip_prefix(MD_RECORD_PREFIX)?
            .strip_suffix(MD_RECORD_SUFFIX)?;
        Some(inner.to_string())
    }

    fn is_date_marker(&self, line: &str) -> bool {
        line.starts_with("## ")
    }

    fn is_message_line(&self, line: &str) -> bool {
        line.starts_with("- ")
    }
}
