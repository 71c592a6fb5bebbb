use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GLOBE: Emoji<'_, '_> = Emoji("🌐 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_link(label: &str, url: &str) {
    println!(
        "  {} {}: {}",
        GLOBE,
        style(label).bold(),
        style(url).underlined().cyan()
    );
}

pub fn print_banner() {
    println!();
    println!(
        "  {} {}",
        style("qmk-build-server").bold().cyan(),
        style(env!("CARGO_PKG_VERSION")).dim()
    );
    println!("  {}\n", style("Firmware builds on demand.").cyan());
}

/// A titled block of `command  description` rows for the help screen.
pub struct GuideSection {
    title: String,
    rows: Vec<(String, String)>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    pub fn command(mut self, command: &str, description: &str) -> Self {
        self.rows.push((command.to_string(), description.to_string()));
        self
    }

    pub fn print(&self) {
        println!(" {}", style(&self.title).bold().underlined());
        let width = self.rows.iter().map(|(c, _)| c.len()).max().unwrap_or(0);
        for (command, description) in &self.rows {
            println!(
                "   {}  {}",
                style(format!("{:<width$}", command, width = width)).green(),
                description
            );
        }
        println!();
    }
}

pub fn print_goodbye() {
    println!(
        "\n{} {}",
        SPARKLE,
        style("qmk-build-server stopped.").bold().cyan()
    );
}
