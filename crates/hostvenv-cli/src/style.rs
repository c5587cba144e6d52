use std::env;

use color_eyre::owo_colors::OwoColorize;
use hostvenv_core::CommandStatus;

/// Terminal decoration for human output; plain text when colour is off.
pub struct Style {
    color: bool,
}

impl Style {
    pub fn new(no_color_flag: bool, is_tty: bool) -> Self {
        let color = is_tty && !no_color_flag && env::var_os("NO_COLOR").is_none();
        Self { color }
    }

    pub fn status(&self, status: CommandStatus, text: &str) -> String {
        let line = match status {
            CommandStatus::Ok => format!("✔ {text}"),
            CommandStatus::UserError => format!("✗ {text}"),
            CommandStatus::Failure => format!("✖ {text}"),
        };
        if !self.color {
            return line;
        }
        match status {
            CommandStatus::Ok => line.green().bold().to_string(),
            CommandStatus::UserError => line.yellow().bold().to_string(),
            CommandStatus::Failure => line.red().bold().to_string(),
        }
    }

    pub fn info(&self, text: &str) -> String {
        if self.color {
            text.cyan().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn warning(&self, text: &str) -> String {
        let line = format!("warning: {text}");
        if self.color {
            line.yellow().to_string()
        } else {
            line
        }
    }

    /// `  label  value` with the label dimmed.
    pub fn field(&self, label: &str, value: &str) -> String {
        let label = format!("{label:<14}");
        if self.color {
            format!("  {}{value}", label.dimmed())
        } else {
            format!("  {label}{value}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_output_without_tty() {
        let style = Style::new(false, false);
        assert_eq!(style.status(CommandStatus::Ok, "done"), "✔ done");
        assert_eq!(style.status(CommandStatus::Failure, "broke"), "✖ broke");
        assert_eq!(style.warning("careful"), "warning: careful");
        assert_eq!(style.status(CommandStatus::UserError, "bad flag"), "✗ bad flag");
        assert_eq!(style.info("Hint: retry"), "Hint: retry");
        assert_eq!(style.field("python", "3.9"), "  python        3.9");
    }
}
