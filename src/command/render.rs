use super::line::{bool_flag, equal_flag};
use crate::context::{Context, Elevation};
use serde_json::Value;

/// `sudo` with its flags, e.g. `sudo --set-home --preserve-env --user=alice --login`.
pub fn elevation_prefix(elevation: &Elevation) -> String {
    let user = elevation
        .user
        .as_ref()
        .map(|u| Value::String(u.clone()))
        .unwrap_or(Value::Null);
    [
        "sudo".to_string(),
        bool_flag("set_home", &Value::Bool(elevation.set_home)),
        bool_flag("preserve_env", &Value::Bool(elevation.preserve_env)),
        equal_flag("user", &user),
        bool_flag("login", &Value::Bool(elevation.effective_login())),
    ]
    .into_iter()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

/// Turns a raw command into the exact string submitted to the remote shell.
///
/// Order: `cd` prefix inside the `sh -c` body, then env assignments, then the
/// elevation prefix ahead of them, then the multiplexer wrapper around
/// everything. Runs of spaces collapse to one.
pub fn render(raw: &str, context: &Context, multiplexer_program: &str) -> String {
    let body = match context.cwd.as_deref() {
        Some(cwd) => format!("cd {}; {}", cwd, raw),
        None => raw.to_string(),
    };
    let mut command = format!("sh -c '{}'", body);
    if !context.env.is_empty() {
        let assignments = context
            .env
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(" ");
        command = format!("{} {}", assignments, command);
    }
    if let Some(elevation) = context.elevation.as_ref() {
        command = format!("{} {}", elevation_prefix(elevation), command);
    }
    if let Some(name) = context.multiplexer.as_deref() {
        command = format!("{} -UD -RR -S {} {}", multiplexer_program, name, command);
    }
    collapse_spaces(&command)
}

/// Folds runs of `' '` and trims. Tabs and newlines are kept so multi-line
/// script bodies reach the remote shell intact.
fn collapse_spaces(text: &str) -> String {
    text.split(' ')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
