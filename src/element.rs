use serde::{Deserialize, Serialize};

pub const DEFAULT_PATTERN: &str = "{}/s";
pub const DEFAULT_UNKNOWN: &str = "?/s";

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;
const TIB: f64 = GIB * 1024.0;

const KB: f64 = 1000.0;
const MB: f64 = KB * 1000.0;
const GB: f64 = MB * 1000.0;
const TB: f64 = GB * 1000.0;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Units {
    #[default]
    Default,
    Bytes,
    BytesDec,
}

impl Units {
    pub fn format(self, n: i64) -> String {
        match self {
            Units::Default => n.to_string(),
            Units::Bytes => format_bytes(n, false),
            Units::BytesDec => format_bytes(n, true),
        }
    }
}

fn format_bytes(n: i64, si: bool) -> String {
    let f = n as f64;
    let steps: [(f64, &str); 4] = if si {
        [(TB, "TB"), (GB, "GB"), (MB, "MB"), (KB, "kB")]
    } else {
        [(TIB, "TiB"), (GIB, "GiB"), (MIB, "MiB"), (KIB, "KiB")]
    };
    for (size, suffix) in steps {
        if f >= size {
            return format!("{:.2} {suffix}", f / size);
        }
    }
    format!("{n} B")
}

/// Renders a rate into a display string. A rate of zero is shown as the
/// `unknown` placeholder since it also means "no estimate yet".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedElement {
    pub pattern: String,
    pub unknown: String,
    pub units: Units,
}

impl Default for SpeedElement {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.to_string(),
            unknown: DEFAULT_UNKNOWN.to_string(),
            units: Units::Default,
        }
    }
}

impl SpeedElement {
    pub fn new(units: Units) -> Self {
        Self { units, ..Self::default() }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn with_unknown(mut self, unknown: impl Into<String>) -> Self {
        self.unknown = unknown.into();
        self
    }

    pub fn render(&self, rate: f64) -> String {
        if rate == 0.0 || !rate.is_finite() {
            return non_empty_or(&self.unknown, DEFAULT_UNKNOWN).to_string();
        }
        let amount = self.units.format(rate.round() as i64);
        let pattern = non_empty_or(&self.pattern, DEFAULT_PATTERN);
        if pattern.contains("{}") {
            pattern.replacen("{}", &amount, 1)
        } else {
            format!("{amount}{pattern}")
        }
    }
}

fn non_empty_or<'a>(s: &'a str, fallback: &'a str) -> &'a str {
    if s.is_empty() {
        fallback
    } else {
        s
    }
}

/// Raw rate with fixed precision; zero prints as zero.
pub fn float_speed(rate: f64, precision: usize) -> String {
    let rate = if rate.is_finite() { rate } else { 0.0 };
    format!("{rate:.precision$}")
}
