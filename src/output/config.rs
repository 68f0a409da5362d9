use std::env;

use crate::telemetry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub pretty: bool,
}

impl OutputConfig {
    /// `--json` wins over `COPYDESK_OUTPUT_FORMAT`.
    pub fn from_env() -> Self {
        let format = if telemetry::config::json_mode() {
            OutputFormat::Json
        } else {
            match env::var("COPYDESK_OUTPUT_FORMAT").ok().as_deref() {
                Some("json") => OutputFormat::Json,
                _ => OutputFormat::Text,
            }
        };
        let pretty = parse_flag(env::var("COPYDESK_OUTPUT_PRETTY").ok().as_deref());
        OutputConfig { format, pretty }
    }
}

fn parse_flag(v: Option<&str>) -> bool {
    matches!(v, Some(v) if v.eq_ignore_ascii_case("1") || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
}
