use colored::*;

const RULE_WIDTH: usize = 60;

pub fn print_header(handle: &str, model: &str) {
    let line = "─".repeat(RULE_WIDTH);
    println!("{}", line.black().bold());

    let name = "Chatterbox".yellow().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  💬 {} {}", name, version);

    let info = format!("  @{}  •  {}", handle, model).cyan();
    println!("{}", info);

    println!("{}", line.black().bold());
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "❌".red().bold(), msg.red());
}

pub fn print_thinking(msg: &str) {
    println!("  {} {}...", "∴".magenta(), msg);
}

/// Progress reaction shown next to the prompt.
pub fn print_reaction(emoji: &str) {
    println!("  {} {}", "↳".black().bold(), emoji);
}

pub fn print_reply(msg: &str) {
    println!("\n{}: {}\n", "Bot".green().bold(), msg);
}
