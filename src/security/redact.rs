//! Secret masking and entropy.

use std::collections::HashMap;

/// Longest snippet kept in a finding, in characters.
const MAX_SNIPPET_CHARS: usize = 120;

const MASK: &str = "********";

/// Replace every occurrence of `secret` in `line` with a masked form and
/// clip the result.
///
/// Long secrets keep their first four characters, short ones keep fewer,
/// and anything of eight characters or less is masked entirely.
pub fn redact_line(line: &str, secret: &str) -> String {
    let masked = mask(secret);
    let redacted = if secret.is_empty() {
        line.to_string()
    } else {
        line.replace(secret, &masked)
    };
    clip(redacted.trim())
}

pub fn mask(secret: &str) -> String {
    let len = secret.chars().count();
    let visible = match len {
        0..=8 => 0,
        9..=15 => 2,
        _ => 4,
    };
    let prefix: String = secret.chars().take(visible).collect();
    format!("{prefix}{MASK}")
}

fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_SNIPPET_CHARS {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(MAX_SNIPPET_CHARS - 1).collect();
    clipped.push('…');
    clipped
}

/// Shannon entropy in bits per character.
pub fn shannon_entropy(text: &str) -> f64 {
    let len = text.chars().count();
    if len == 0 {
        return 0.0;
    }
    let mut counts: HashMap<char, usize> = HashMap::new();
    for c in text.chars() {
        *counts.entry(c).or_default() += 1;
    }
    counts
        .values()
        .map(|&n| {
            let p = n as f64 / len as f64;
            -p * p.log2()
        })
        .sum()
}
