//! Terminal log rendering.
//!
//! Every event is printed to stderr as `<prompt><message>`. The prompt comes from the level
//! unless the event carries its own `prompt` field, which the process runner uses to frame
//! subprocess output. A `stream` field (`stdout`/`stderr`) picks the text style of that output
//! and `fatal = true` marks unrecoverable failures.

use chrono::Local;
use crossterm::style::{StyledContent, Stylize};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static ANSI: OnceLock<Arc<AtomicBool>> = OnceLock::new();

/// Install the global subscriber. `verbose` lowers the default filter to `debug`.
pub fn init(verbose: bool, ansi: bool) -> anyhow::Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let layer = PromptLayer::stderr(ansi).with_timestamps(verbose);
    let _ = ANSI.set(layer.ansi_handle());

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()?;
    Ok(())
}

/// Toggle ANSI styling after the subscriber is installed (the config may disable it).
pub fn set_ansi(enabled: bool) {
    if let Some(flag) = ANSI.get() {
        flag.store(enabled, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    prompt: Option<String>,
    stream: Option<String>,
    fatal: bool,
    extra: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "prompt" => self.prompt = Some(value.to_string()),
            "stream" => self.stream = Some(value.to_string()),
            name => {
                let _ = write!(self.extra, " {name}={value}");
            }
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "fatal" {
            self.fatal = value;
        } else {
            let _ = write!(self.extra, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            let _ = write!(self.extra, " {}={value:?}", field.name());
        }
    }
}

pub struct PromptLayer<W = io::Stderr> {
    writer: Mutex<W>,
    ansi: Arc<AtomicBool>,
    timestamps: bool,
}

impl PromptLayer<io::Stderr> {
    pub fn stderr(ansi: bool) -> Self {
        PromptLayer::new(io::stderr(), ansi)
    }
}

impl<W: Write> PromptLayer<W> {
    pub fn new(writer: W, ansi: bool) -> Self {
        PromptLayer {
            writer: Mutex::new(writer),
            ansi: Arc::new(AtomicBool::new(ansi)),
            timestamps: false,
        }
    }

    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    pub fn ansi_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ansi)
    }

    fn render(&self, level: Level, line: LineVisitor) -> String {
        let ansi = self.ansi.load(Ordering::Relaxed);
        let paint = |text: &str, style: Style| paint_with(ansi, text, style);

        let prompt = match (&line.prompt, line.fatal) {
            (Some(prompt), _) => paint(prompt.as_str(), |s| s.dark_grey()),
            (None, true) => paint(" [X] ", |s| s.red().bold()),
            (None, false) => match level {
                Level::ERROR => paint(" [-] ", |s| s.red()),
                Level::WARN => paint(" [!] ", |s| s.yellow()),
                Level::INFO => paint(" [*] ", |s| s.blue()),
                Level::DEBUG => paint(" [.] ", |s| s.dark_grey()),
                _ => paint(" [ ] ", |s| s.dark_grey()),
            },
        };

        let text = format!("{}{}", line.message, line.extra);
        let body = match (line.stream.as_deref(), line.fatal) {
            (Some("stdout"), _) => paint(text.as_str(), |s| s.italic()),
            (Some("stderr"), _) => paint(text.as_str(), |s| s.italic().bold()),
            (_, true) => paint(text.as_str(), |s| s.red().bold()),
            _ => text,
        };

        let mut out = String::new();
        if self.timestamps {
            let _ = write!(out, "{} ", Local::now().format("%H:%M:%S"));
        }
        let _ = write!(out, "{prompt}{body}");
        out
    }
}

type Style = for<'a> fn(StyledContent<&'a str>) -> StyledContent<&'a str>;

fn paint_with(ansi: bool, text: &str, style: Style) -> String {
    if ansi {
        style(text.stylize()).to_string()
    } else {
        text.to_string()
    }
}

impl<S, W> Layer<S> for PromptLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let line = self.render(*event.metadata().level(), visitor);
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct BufWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for BufWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(ansi: bool, f: impl FnOnce()) -> String {
        let buffer = BufWriter::default();
        let layer = PromptLayer::new(buffer.clone(), ansi);
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn level_prompts_without_ansi() {
        let out = capture(false, || {
            tracing::info!("starting");
            tracing::warn!("careful");
            tracing::error!("broken");
            tracing::error!(fatal = true, "gone");
        });
        assert_eq!(out, " [*] starting\n [!] careful\n [-] broken\n [X] gone\n");
    }

    #[test]
    fn explicit_prompt_and_extra_fields() {
        let out = capture(false, || {
            tracing::info!(prompt = " *  ", stream = "stdout", "hello\n *  world");
            tracing::info!(code = 3, "status");
        });
        assert_eq!(out, " *  hello\n *  world\n [*] status code=3\n");
    }

    #[test]
    fn ansi_styles_streams_differently() {
        let out = capture(true, || {
            tracing::info!(prompt = " *  ", stream = "stdout", "out");
            tracing::info!(prompt = " *  ", stream = "stderr", "err");
        });
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains('\u{1b}'));
        assert!(lines[0].contains("out"));
        assert_ne!(
            lines[0].replace("out", ""),
            lines[1].replace("err", ""),
            "stdout and stderr should not share styling"
        );
    }

    #[test]
    fn ansi_handle_toggles_rendering() {
        let buffer = BufWriter::default();
        let layer = PromptLayer::new(buffer.clone(), true);
        let handle = layer.ansi_handle();
        handle.store(false, Ordering::Relaxed);

        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || tracing::info!("plain"));
        let out = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(out, " [*] plain\n");
    }
}
