use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

const MAX_API_ERROR_CHARS: usize = 200;

static SECRET_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:Bearer\s+|sk-|xai-|ghp_|github_pat_|glpat-|hf_)[A-Za-z0-9._\-:+/=]+")
        .expect("valid secret token regex")
});

/// Replace anything that looks like an API credential with `[REDACTED]`.
pub fn scrub_secret_patterns(input: &str) -> Cow<'_, str> {
    SECRET_TOKEN.replace_all(input, "[REDACTED]")
}

/// Scrubbed error body, cut to a length fit for a log line.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);
    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed.into_owned();
    }
    let cut: String = scrubbed.chars().take(MAX_API_ERROR_CHARS).collect();
    format!("{cut}...")
}
