pub use anstream::eprintln as aeprintln;
pub use anstream::println as aprintln;

/// Tokyo Night color palette
pub mod colors {
    pub const RESET: &str = "\x1b[0m";

    pub const TKN_RED: &str = "\x1b[38;2;247;118;142m"; // #f7768e
    pub const TKN_GREEN: &str = "\x1b[38;2;158;206;106m"; // #9ece6a
    pub const TKN_YELLOW: &str = "\x1b[38;2;224;175;104m"; // #e0af68
    pub const TKN_BLUE: &str = "\x1b[38;2;122;162;247m"; // #7aa2f7
    pub const TKN_CYAN: &str = "\x1b[38;2;125;207;255m"; // #7dcfff
}

fn paint(color: &str, text: &str) -> String {
    format!("{}{}{}", color, text, colors::RESET)
}

pub fn p_g(text: &str) -> String {
    paint(colors::TKN_GREEN, text)
}

pub fn p_r(text: &str) -> String {
    paint(colors::TKN_RED, text)
}

pub fn p_y(text: &str) -> String {
    paint(colors::TKN_YELLOW, text)
}

pub fn p_b(text: &str) -> String {
    paint(colors::TKN_BLUE, text)
}

pub fn p_c(text: &str) -> String {
    paint(colors::TKN_CYAN, text)
}

/// Colors a plan line by its `+`/`~`/`-` prefix.
pub fn paint_plan_line(line: &str) -> String {
    match line.trim_start().chars().next() {
        Some('+') => p_g(line),
        Some('-') => p_r(line),
        Some('~') => p_y(line),
        _ => line.to_string(),
    }
}

/// Runs a command with its output on stderr, so stdout stays reserved for
/// command results.
pub async fn execute_command_streaming(
    command: &str,
    args: &[String],
) -> std::io::Result<std::process::ExitStatus> {
    tokio::process::Command::new(command)
        .args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::from(std::io::stderr()))
        .stderr(std::process::Stdio::inherit())
        .status()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paint_plan_line() {
        assert!(paint_plan_line("+ Stage 1").starts_with(colors::TKN_GREEN));
        assert!(paint_plan_line("  - Service (Service)").starts_with(colors::TKN_RED));
        assert_eq!(paint_plan_line("  Platform: linux/amd64"), "  Platform: linux/amd64");
    }
}
