//! # Line and marker formatting.
//!
//! - [`Render`] turns one log line of one target into the text written to stdout.
//! - [`TemplateRenderer`] is the default implementation: a `{field}` template
//!   parsed once, then expanded per line.
//! - [`Palette`] picks a stable colour pair per pod.
//! - [`start_marker`] / [`stop_marker`] format the lifecycle lines.
//!
//! ## Template fields
//! `{message}`, `{namespace}`, `{pod}`, `{container}`, `{node}`.
//! `{{` and `}}` produce literal braces.

use std::fmt::Write as _;

use owo_colors::{OwoColorize, Style};

use crate::error::RenderError;
use crate::platform::Target;

/// One log line together with its source, as seen by a renderer.
#[derive(Clone, Copy, Debug)]
pub struct LogRecord<'a> {
    pub target: &'a Target,
    /// Line content without its trailing newline.
    pub message: &'a str,
    /// Colours for this pod; `None` renders plain text.
    pub colors: Option<PodColors>,
}

/// Formats a record into one output line.
///
/// A failure drops that line only; the worker keeps reading.
pub trait Render: Send + Sync + 'static {
    fn render(&self, record: &LogRecord<'_>) -> Result<String, RenderError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Message,
    Namespace,
    Pod,
    Container,
    Node,
}

impl Field {
    fn parse(name: &str) -> Result<Self, RenderError> {
        match name.trim() {
            "message" => Ok(Field::Message),
            "namespace" => Ok(Field::Namespace),
            "pod" => Ok(Field::Pod),
            "container" => Ok(Field::Container),
            "node" => Ok(Field::Node),
            other => Err(RenderError::UnknownField(other.to_owned())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// `{field}` template renderer.
#[derive(Clone, Debug)]
pub struct TemplateRenderer {
    segments: Vec<Segment>,
}

impl TemplateRenderer {
    /// Parses `template`, rejecting unknown fields and unclosed braces.
    pub fn parse(template: &str) -> Result<Self, RenderError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((at, c)) = chars.next() {
            match c {
                '{' if chars.peek().map(|(_, n)| *n) == Some('{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().map(|(_, n)| *n) == Some('}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let rest = &template[at + 1..];
                    let Some(end) = rest.find('}') else {
                        return Err(RenderError::Unterminated(at));
                    };
                    let field = Field::parse(&rest[..end])?;
                    // skip the field name and the closing brace
                    for _ in 0..rest[..=end].chars().count() {
                        chars.next();
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }
}

impl Render for TemplateRenderer {
    fn render(&self, record: &LogRecord<'_>) -> Result<String, RenderError> {
        let t = record.target;
        let mut out = String::with_capacity(record.message.len() + 64);
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push_str(s),
                Segment::Field(Field::Message) => out.push_str(record.message),
                Segment::Field(Field::Namespace) => out.push_str(&t.namespace),
                Segment::Field(Field::Node) => out.push_str(&t.node),
                Segment::Field(Field::Pod) => {
                    paint(&mut out, &t.pod, record.colors.map(|c| c.pod));
                }
                Segment::Field(Field::Container) => {
                    paint(&mut out, &t.container, record.colors.map(|c| c.container));
                }
            }
        }
        Ok(out)
    }
}

/// Colour pair assigned to one pod.
#[derive(Clone, Copy, Debug)]
pub struct PodColors {
    pub pod: Style,
    pub container: Style,
}

/// Stable pod → colour mapping (32-bit FNV-1 of the pod name).
pub struct Palette;

impl Palette {
    const PAIRS: usize = 6;

    fn pair(idx: usize) -> PodColors {
        let (pod, container) = match idx % Self::PAIRS {
            0 => (Style::new().bright_cyan(), Style::new().cyan()),
            1 => (Style::new().bright_green(), Style::new().green()),
            2 => (Style::new().bright_magenta(), Style::new().magenta()),
            3 => (Style::new().bright_yellow(), Style::new().yellow()),
            4 => (Style::new().bright_blue(), Style::new().blue()),
            _ => (Style::new().bright_red(), Style::new().red()),
        };
        PodColors { pod, container }
    }

    /// Index of the pair used for `pod`.
    pub fn index(pod: &str) -> usize {
        fnv1_32(pod.as_bytes()) as usize % Self::PAIRS
    }

    /// Colours for `pod`.
    pub fn for_pod(pod: &str) -> PodColors {
        Self::pair(Self::index(pod))
    }
}

fn fnv1_32(bytes: &[u8]) -> u32 {
    const OFFSET: u32 = 2_166_136_261;
    const PRIME: u32 = 16_777_619;
    bytes
        .iter()
        .fold(OFFSET, |h, b| h.wrapping_mul(PRIME) ^ u32::from(*b))
}

fn paint(out: &mut String, text: &str, style: Option<Style>) {
    match style {
        Some(style) => {
            let _ = write!(out, "{}", text.style(style));
        }
        None => out.push_str(text),
    }
}

fn pod_label(target: &Target, show_namespace: bool) -> String {
    if show_namespace {
        format!("{}/{}", target.namespace, target.pod)
    } else {
        target.pod.to_string()
    }
}

/// `+ pod › container`, namespace-prefixed when several namespaces are tailed.
pub fn start_marker(target: &Target, show_namespace: bool, colors: Option<PodColors>) -> String {
    let mut out = String::new();
    paint(&mut out, "+", colors.map(|_| Style::new().bright_green().bold()));
    out.push(' ');
    paint(
        &mut out,
        &pod_label(target, show_namespace),
        colors.map(|c| c.pod),
    );
    out.push_str(" › ");
    paint(&mut out, &target.container, colors.map(|c| c.container));
    out
}

/// `- pod`, namespace-prefixed when several namespaces are tailed.
pub fn stop_marker(target: &Target, show_namespace: bool, colors: Option<PodColors>) -> String {
    let mut out = String::new();
    paint(&mut out, "-", colors.map(|_| Style::new().bright_red().bold()));
    out.push(' ');
    paint(
        &mut out,
        &pod_label(target, show_namespace),
        colors.map(|c| c.pod),
    );
    out
}
