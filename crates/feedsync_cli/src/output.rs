//! Text and JSON rendering.

use clap::ValueEnum;
use serde::Serialize;

/// Output format of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Prints `value` as JSON, or runs `text` to print it for humans.
pub fn emit<T, F>(format: Format, value: &T, text: F) -> serde_json::Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce(&T),
{
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Format::Text => text(value),
    }
    Ok(())
}

/// Truncates `text` to `width` characters for table output.
pub fn clip(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut clipped: String = text.chars().take(width.saturating_sub(1)).collect();
        clipped.push('…');
        clipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_keeps_short_text() {
        assert_eq!(clip("News", 10), "News");
    }

    #[test]
    fn clip_counts_characters() {
        assert_eq!(clip("Überschrift", 5), "Über…");
    }
}
