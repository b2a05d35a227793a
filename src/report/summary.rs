//! Console summary of collected test results

use std::fmt::Write;

use colored::Colorize;

use crate::result::{Outcome, TestResults};

/// Render one line per result followed by a colored summary line
pub fn render(results: &TestResults) -> String {
    let mut out = String::new();

    results.do_with_results(|result| {
        let icon = match result.outcome() {
            Outcome::Success => "✓".green(),
            Outcome::Failure => "✗".red(),
            Outcome::Skipped => "-".yellow(),
        };
        let _ = write!(out, "{} {}", icon, result.test_name().bold());
        if let Some(duration) = result.duration() {
            let _ = write!(out, " {}", format!("({} ms)", duration.as_millis()).dimmed());
        }
        out.push('\n');

        if let Some(message) = result.error_message() {
            let _ = writeln!(out, "    {}", message.yellow());
        }
    });

    let summary = format!(
        "{}/{} tests passing ({} failed, {} skipped)",
        results.success_count(),
        results.size(),
        results.failed_count(),
        results.skipped_count()
    );

    out.push('\n');
    if results.failed_count() == 0 {
        let _ = writeln!(out, "{}", summary.green().bold());
    } else {
        let _ = writeln!(out, "{}", summary.red().bold());
    }
    out
}

/// Print the rendered summary to stdout
pub fn print(results: &TestResults) {
    println!();
    print!("{}", render(results));
}
