//! Shared token patterns

use once_cell::sync::Lazy;
use regex::Regex;

/// `KEY=` at the start of a dotenv line, with an optional `export` prefix
pub static ENV_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:export\s+)?([A-Z_][A-Z0-9_]*)=").expect("Invalid env assignment regex")
});

/// Opening of a `${VAR}` interpolation, followed by `}` or a modifier
/// (`:-`, `-`, `:?`, `?`, `:+`, `+`). Defaults are not consumed so nested
/// interpolations are matched on their own.
pub static INTERPOLATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?:\}|:?[-?+])").expect("Invalid interpolation regex")
});

/// Shell parameter expansion: the compose forms plus assign-default
/// (`${VAR:=d}`, `${VAR=d}`), length (`${#VAR}`) and array access (`${ARR[0]}`)
pub static SHELL_EXPANSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{#?([A-Z_][A-Z0-9_]*)(?:\}|:?[-?+=]|\[)")
        .expect("Invalid shell expansion regex")
});

/// Required-variable guard: `${VAR:?message}` or `${VAR?message}`
pub static REQUIRED_GUARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*):?\?").expect("Invalid guard regex"));

/// Bare `$VAR` shell reference
pub static SHELL_BARE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([A-Z_][A-Z0-9_]*)").expect("Invalid shell reference regex"));

/// Shell variable bound inside the script itself
pub static SHELL_BINDING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:^|[;&|]\s*)(?:export\s+|local\s+|readonly\s+|declare\s+(?:-\w+\s+)*)?([A-Z_][A-Z0-9_]*)=|\bfor\s+([A-Z_][A-Z0-9_]*)\s+in\b|\bread\s+(?:-\w+\s+)*([A-Z_][A-Z0-9_]*)",
    )
    .expect("Invalid shell binding regex")
});

/// Names interpolated in `text`, skipping `$${VAR}` escapes
pub fn interpolations(text: &str) -> Vec<&str> {
    unescaped(&INTERPOLATION, text)
}

/// Names expanded by shell `${...}` forms in `text`
pub fn shell_expansions(text: &str) -> Vec<&str> {
    unescaped(&SHELL_EXPANSION, text)
}

fn unescaped<'t>(pattern: &Regex, text: &'t str) -> Vec<&'t str> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if is_escaped(text, whole.start()) {
                return None;
            }
            caps.get(1).map(|m| m.as_str())
        })
        .collect()
}

/// An odd run of `$` directly before `start` escapes the `$` at `start`
fn is_escaped(text: &str, start: usize) -> bool {
    let run = text[..start].bytes().rev().take_while(|b| *b == b'$').count();
    run % 2 == 1
}

/// Names guarded with the required-variable idiom
pub fn required_guards(text: &str) -> Vec<&str> {
    REQUIRED_GUARD
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}
