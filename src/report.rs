use colored::Colorize;

/// Receives human-readable progress messages from a mirror run
pub trait Reporter: Send + Sync {
    fn progress(&self, message: &str);
}

/// Prints progress lines to stdout, highlighted so they stand out from
/// container CLI output
pub struct ConsoleReporter {
    color: bool,
}

impl ConsoleReporter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn format(&self, message: &str) -> String {
        let line = format!("*** {}", message);
        if self.color {
            line.blue().to_string()
        } else {
            line
        }
    }
}

impl Reporter for ConsoleReporter {
    fn progress(&self, message: &str) {
        println!("{}", self.format(message));
    }
}
