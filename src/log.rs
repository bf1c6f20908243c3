use crate::config::Config;
use camino::Utf8Path;
use eyre::{OptionExt, Result, WrapErr};
use std::fs;
use std::io::stderr;
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::field::RecordFields;
use tracing_subscriber::fmt::FormatFields;
use tracing_subscriber::fmt::format::{DefaultFields, Writer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt, registry};

const DEFAULT_FILTER: &str = "adb_ws_client=info,adb_stream=info";
const FILE_FILTER: &str = "adb_ws_client=debug,adb_stream=trace";

/// Gives the file layer its own field cache, so ANSI-formatted fields from the
/// stderr layer don't end up in the log file.
#[derive(Default)]
struct FormatFieldsWrapper<const ID: usize>(DefaultFields);

impl<'wr, const ID: usize> FormatFields<'wr> for FormatFieldsWrapper<ID> {
    fn format_fields<R: RecordFields>(&self, writer: Writer<'wr>, fields: R) -> std::fmt::Result {
        self.0.format_fields(writer, fields)
    }
}

pub fn init(config: &Config) -> Result<Option<WorkerGuard>> {
    let file_log = match &config.log_file {
        Some(path) => {
            let dir =
                path.parent().filter(|dir| !dir.as_str().is_empty()).unwrap_or(Utf8Path::new("."));
            let name = path.file_name().ok_or_eyre("log file has no name")?;
            fs::create_dir_all(dir).with_context(|| format!("create log dir {dir}"))?;

            let (writer, guard) =
                NonBlockingBuilder::default().lossy(false).finish(rolling::never(dir, name));

            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .fmt_fields(FormatFieldsWrapper::<1>::default())
                .with_filter(EnvFilter::new(FILE_FILTER));
            Some((layer, guard))
        }
        None => None,
    };
    let (file_layer, guard) = file_log.unzip();

    registry()
        .with(file_layer)
        .with(
            fmt::layer().with_writer(stderr).with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
            ),
        )
        .try_init()
        .context("init logging")?;

    Ok(guard)
}
