//! Styled terminal output for plans, prepared fixtures and verdicts

use console::Style;
use stateprobe::{BatchReport, MutationPlan, RunOutcome, RunRecord};

/// Writes human-readable results to stdout.
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Reporter {
    /// Create a new reporter
    #[must_use]
    pub const fn new(use_color: bool, quiet: bool) -> Self {
        Self { use_color, quiet }
    }

    fn paint(&self, text: &str, style: &Style) -> String {
        if self.use_color {
            style.clone().force_styling(true).apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Print a line unless quiet
    pub fn line(&self, text: &str) {
        if !self.quiet {
            println!("{text}");
        }
    }

    /// Print a bold heading
    pub fn heading(&self, text: &str) {
        self.line(&self.paint(text, &Style::new().bold()));
    }

    /// Print a labelled value
    pub fn field(&self, label: &str, value: &str) {
        self.line(&format!("  {} {value}", self.paint(label, &Style::new().dim())));
    }

    /// Render one fixture's plan
    pub fn plan(&self, fixture: &str, plan: &MutationPlan) {
        self.heading(fixture);
        for mutation in plan.entries() {
            self.line(&format!(
                "  {:<18} {}",
                self.paint(mutation.id(), &Style::new().cyan()),
                mutation.description()
            ));
        }
    }

    /// Verdict label of a run
    #[must_use]
    pub fn verdict(&self, record: &RunRecord) -> String {
        match &record.outcome {
            RunOutcome::Compared(o) if o.is_clean() => self.paint("CLEAN", &Style::new().green()),
            RunOutcome::Compared(o) => {
                let mut labels = Vec::new();
                if o.crashed {
                    labels.push(self.paint("CRASHED", &Style::new().red().bold()));
                }
                if o.diverged {
                    labels.push(self.paint("DIVERGED", &Style::new().yellow().bold()));
                }
                labels.join(" ")
            }
            RunOutcome::Failed { .. } => self.paint("FAILED", &Style::new().red()),
        }
    }

    /// Render a batch report
    pub fn report(&self, report: &BatchReport) {
        let mut fixture = None;
        for record in &report.runs {
            if fixture != Some(record.fixture.as_str()) {
                self.heading(&record.fixture);
                fixture = Some(record.fixture.as_str());
            }
            self.line(&format!("  {:<32} {}", record.run, self.verdict(record)));
            match &record.outcome {
                RunOutcome::Compared(outcome) => {
                    if let Some(mismatch) = &outcome.length_mismatch {
                        self.field(
                            "snapshots:",
                            &format!(
                                "baseline {} vs mutated {}, compared first {}",
                                mismatch.baseline,
                                mismatch.mutated,
                                mismatch.compared()
                            ),
                        );
                    }
                    for divergence in &outcome.differences {
                        let categories: Vec<&str> =
                            divergence.categories.iter().map(|c| c.as_str()).collect();
                        self.field(
                            &format!("checkpoint {}:", divergence.checkpoint),
                            &categories.join(", "),
                        );
                    }
                }
                RunOutcome::Failed { error } => self.field("error:", error),
            }
        }
        let (clean, crashed, diverged, failed) = report.tally();
        self.line(&format!(
            "\n{} runs: {clean} clean, {crashed} crashed, {diverged} diverged, {failed} failed",
            report.runs.len()
        ));
    }
}
