use super::{RED, RESET};
use std::time::{Duration, Instant};

/// Running count of analyzed files during a migration scan
pub struct ScanTally {
    files: usize,
    analyzed: usize,
    failed: Vec<String>,
    began: Instant,
}

impl ScanTally {
    pub fn new(files: usize) -> Self {
        Self {
            files,
            analyzed: 0,
            failed: Vec::new(),
            began: Instant::now(),
        }
    }

    /// `[3/10]` style position of the next file
    fn position(&self) -> String {
        format!("[{}/{}]", self.analyzed + self.failed.len() + 1, self.files)
    }

    pub fn begin(&self, file: &str) {
        println!("{} {}", self.position(), file);
    }

    pub fn record(&mut self, file: &str, success: bool) {
        if success {
            self.analyzed += 1;
        } else {
            eprintln!("{}  could not analyze {}{}", RED, file, RESET);
            self.failed.push(file.to_string());
        }
    }

    fn summary(&self, elapsed: Duration) -> String {
        let mut line = format!(
            "Scanned {} of {} file(s) in {:.1}s",
            self.analyzed,
            self.files,
            elapsed.as_secs_f64()
        );
        if !self.failed.is_empty() {
            line.push_str(&format!(", {} failed", self.failed.len()));
        }
        line
    }

    pub fn print_summary(&self) {
        println!("{}\n", self.summary(self.began.elapsed()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_counts_outcomes() {
        let mut tally = ScanTally::new(3);
        assert_eq!(tally.position(), "[1/3]");
        tally.record("recipes/default.rb", true);
        tally.record("recipes/broken.rb", false);
        assert_eq!(tally.position(), "[3/3]");
        tally.record("attributes/default.rb", true);

        assert_eq!(
            tally.summary(Duration::from_millis(1500)),
            "Scanned 2 of 3 file(s) in 1.5s, 1 failed"
        );
    }

    #[test]
    fn test_summary_without_failures() {
        let mut tally = ScanTally::new(1);
        tally.record("metadata.rb", true);
        assert_eq!(tally.summary(Duration::ZERO), "Scanned 1 of 1 file(s) in 0.0s");
    }
}
