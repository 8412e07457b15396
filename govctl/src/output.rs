use std::env;

use owo_colors::OwoColorize;
use policy_schema::IssueSeverity;

pub fn should_use_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    supports_color::on(supports_color::Stream::Stdout).is_some()
}

pub fn pass_mark() -> String {
    if should_use_color() {
        "✓".green().to_string()
    } else {
        "✓".to_string()
    }
}

pub fn fail_mark() -> String {
    if should_use_color() {
        "✗".red().to_string()
    } else {
        "✗".to_string()
    }
}

pub fn issue_label(severity: IssueSeverity) -> String {
    let text = format!("[{}]", severity);
    if !should_use_color() {
        return text;
    }
    match severity {
        IssueSeverity::Error => text.red().to_string(),
        IssueSeverity::Warning => text.yellow().to_string(),
        IssueSeverity::Info => text.dimmed().to_string(),
    }
}
