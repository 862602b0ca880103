use std::{fmt, thread};

use nu_ansi_term::{Color, Style};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::registry::LookupSpan;

/// Compact single-line event format: level, thread, innermost span, fields.
pub struct TreeFormatter;

impl<S, N> FormatEvent<S, N> for TreeFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        let span_name = ctx
            .lookup_current()
            .map(|span| span.name())
            .unwrap_or_default();

        write!(
            &mut writer,
            "[{}]\t{} {} {}: ",
            metadata.level(),
            Style::new()
                .bold()
                .paint(thread::current().name().unwrap_or_default()),
            Color::Fixed(8).paint(metadata.target()),
            Color::Fixed(12).paint(span_name),
        )?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Install a global subscriber using [`TreeFormatter`].
///
/// Safe to call more than once: later calls leave the first subscriber in place.
pub fn tracing_init(level: Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .event_format(TreeFormatter)
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
