use std::env;
use std::sync::OnceLock;

static EMLC_PASS_STATS: OnceLock<bool> = OnceLock::new();
static EMLC_OPTIMIZER_MAX_ITERS: OnceLock<usize> = OnceLock::new();

const DEFAULT_OPTIMIZER_MAX_ITERS: usize = 4;

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn parse_usize(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok().filter(|v| *v > 0)
}

pub(crate) fn pass_stats_enabled() -> bool {
    *EMLC_PASS_STATS.get_or_init(|| match env::var("EMLC_PASS_STATS") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}

pub(crate) fn optimizer_max_iters() -> usize {
    *EMLC_OPTIMIZER_MAX_ITERS.get_or_init(|| {
        env::var("EMLC_OPTIMIZER_MAX_ITERS")
            .ok()
            .and_then(|value| parse_usize(&value))
            .unwrap_or(DEFAULT_OPTIMIZER_MAX_ITERS)
    })
}

/// Reads a string knob without caching; used by option constructors that may be called
/// with different environments in tests.
pub(crate) fn string_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
