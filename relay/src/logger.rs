use std::{fmt::Write, io::IsTerminal, str::FromStr};

use jiff::{Zoned, tz::TimeZone};
use log::{LevelFilter, Record};
use logforth::{
    append::Stdout,
    filter::EnvFilter,
    layout::{JsonLayout, Layout},
};

use crate::args::{Args, LogStyle};

/// `<utc timestamp> <level>  <message>`, with the level colored on terminals.
#[derive(Debug, Clone)]
struct CustomTextLayout {
    no_color: bool,
}

impl CustomTextLayout {
    fn new() -> Self {
        Self { no_color: false }
    }

    fn no_color(mut self) -> Self {
        self.no_color = true;
        self
    }

    fn level(&self, level: log::Level) -> String {
        if self.no_color {
            return format!("{level:>5}");
        }

        let color = match level {
            log::Level::Error => 31,
            log::Level::Warn => 33,
            log::Level::Info => 32,
            log::Level::Debug => 34,
            log::Level::Trace => 35,
        };

        format!("\x1b[{color}m{level:>5}\x1b[0m")
    }
}

impl Layout for CustomTextLayout {
    fn format(
        &self,
        record: &Record<'_>,
        _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        let mut output = String::new();
        let now = Zoned::now().with_time_zone(TimeZone::UTC);

        write!(output, "{} ", now.strftime("%Y-%m-%dT%H:%M:%S%.6fZ"))?;
        write!(output, "{}  ", self.level(record.level()))?;
        write!(output, "{}", record.args())?;

        Ok(output.into_bytes())
    }
}

/// Crates of this workspace; everything else logs warnings and errors only.
const RELAY_CRATES: [&str; 4] = ["relay", "server", "config", "llm"];

fn directives(level: LevelFilter) -> String {
    if level == LevelFilter::Off {
        return "off".to_string();
    }

    let level = level.as_str().to_ascii_lowercase();

    RELAY_CRATES
        .iter()
        .fold(String::from("warn"), |directives, krate| format!("{directives},{krate}={level}"))
}

pub(super) fn init(args: &Args) -> anyhow::Result<()> {
    let directives = directives(args.log_level);
    let filter = EnvFilter::from_str(&directives)
        .map_err(|e| anyhow::anyhow!("Invalid log filter '{directives}': {e}"))?;

    let style = args.log_style.unwrap_or(if std::io::stdout().is_terminal() {
        LogStyle::Color
    } else {
        LogStyle::Text
    });

    logforth::builder()
        .dispatch(|d| {
            let d = d.filter(filter);

            match style {
                LogStyle::Color => d.append(Stdout::default().with_layout(CustomTextLayout::new())),
                LogStyle::Text => d.append(Stdout::default().with_layout(CustomTextLayout::new().no_color())),
                LogStyle::Json => d.append(Stdout::default().with_layout(JsonLayout::default())),
            }
        })
        .apply();

    Ok(())
}
