//! Doctor module for RepoDoc diagnostic tools
//!
//! Checks the pieces the gateway needs before it can answer a call: the
//! tool-server executable, an access token, a readable configuration and a
//! writable cache directory.
//!
//! # Usage
//!
//! ```no_run
//! use repodoc::GatewayConfig;
//! use repodoc_cli::doctor::Doctor;
//!
//! let mut doctor = Doctor::new(GatewayConfig::load(None), None);
//! let exit_code = doctor.run_diagnostics()?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! The doctor returns exit codes:
//! - 0: All checks passed
//! - 1: Some warnings detected
//! - 2: Errors detected

use anyhow::Result;
use colored::*;
use repodoc::GatewayConfig;
use std::path::PathBuf;

pub use types::*;

pub mod checks;
pub mod types;

/// Main diagnostic tool for RepoDoc setup checks
pub struct Doctor {
    config: GatewayConfig,
    config_path: Option<PathBuf>,
    checks: Vec<Check>,
}

impl Doctor {
    /// Doctor for the effective configuration; `config_path` is the file
    /// given with `--config`, if any
    pub fn new(config: GatewayConfig, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
            checks: Vec::new(),
        }
    }

    /// Run all diagnostic checks, print the report and return the exit code
    pub fn run_diagnostics(&mut self) -> Result<i32> {
        println!("{}", "RepoDoc Doctor".bold().blue());
        println!("{}", "Running diagnostics...".dimmed());
        println!();

        self.collect()?;
        self.print_results();

        Ok(self.get_exit_code())
    }

    /// Run every check without printing
    pub fn collect(&mut self) -> Result<()> {
        checks::check_server_executable(&self.config, &mut self.checks)?;
        checks::check_config_file(self.config_path.as_deref(), &mut self.checks)?;
        checks::check_config_values(&self.config, &mut self.checks)?;
        checks::check_access_token(&self.config, &mut self.checks)?;
        checks::check_cache_directory(&self.config, &mut self.checks)?;
        Ok(())
    }

    /// Checks collected so far
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Print the results grouped by category, then a summary
    pub fn print_results(&self) {
        let use_color = crate::cli::Cli::should_use_color();

        for category in CheckCategory::ALL {
            let group: Vec<&Check> = self
                .checks
                .iter()
                .filter(|c| c.category == category)
                .collect();
            print_check_category(&group, category.heading(), use_color);
        }

        self.print_summary(use_color);
    }

    fn print_summary(&self, use_color: bool) {
        let counts = self.count_check_statuses();

        if use_color {
            println!("{}", "Summary:".bold().green());
        } else {
            println!("Summary:");
        }

        match (counts.error_count, counts.warning_count) {
            (0, 0) => println!("  All checks passed!"),
            (0, _) => {
                if use_color {
                    println!(
                        "  {} checks passed, {} warnings",
                        counts.ok_count.to_string().green(),
                        counts.warning_count.to_string().yellow()
                    );
                } else {
                    println!(
                        "  {} checks passed, {} warnings",
                        counts.ok_count, counts.warning_count
                    );
                }
            }
            _ => {
                if use_color {
                    println!(
                        "  {} checks passed, {} warnings, {} errors",
                        counts.ok_count.to_string().green(),
                        counts.warning_count.to_string().yellow(),
                        counts.error_count.to_string().red()
                    );
                } else {
                    println!(
                        "  {} checks passed, {} warnings, {} errors",
                        counts.ok_count, counts.warning_count, counts.error_count
                    );
                }
            }
        }
    }

    fn count_check_statuses(&self) -> CheckCounts {
        let count = |status: CheckStatus| self.checks.iter().filter(|c| c.status == status).count();
        CheckCounts {
            ok_count: count(CheckStatus::Ok),
            warning_count: count(CheckStatus::Warning),
            error_count: count(CheckStatus::Error),
        }
    }

    /// Get exit code based on check results
    ///
    /// # Returns
    ///
    /// - 0: All checks passed (no errors or warnings)
    /// - 1: At least one warning detected
    /// - 2: At least one error detected
    pub fn get_exit_code(&self) -> i32 {
        let has_error = self.checks.iter().any(|c| c.status == CheckStatus::Error);
        let has_warning = self.checks.iter().any(|c| c.status == CheckStatus::Warning);

        let exit_code = if has_error {
            ExitCode::Error
        } else if has_warning {
            ExitCode::Warning
        } else {
            ExitCode::Success
        };

        exit_code.into()
    }
}

fn print_check_category(checks: &[&Check], category_name: &str, use_color: bool) {
    if checks.is_empty() {
        return;
    }
    if use_color {
        println!("{}", category_name.bold().yellow());
    } else {
        println!("{category_name}");
    }
    for check in checks {
        print_check(check, use_color);
    }
    println!();
}

fn print_check(check: &Check, use_color: bool) {
    let (symbol, color_fn): (&str, fn(&str) -> ColoredString) = match check.status {
        CheckStatus::Ok => ("✓", |s: &str| s.green()),
        CheckStatus::Warning => ("⚠", |s: &str| s.yellow()),
        CheckStatus::Error => ("✗", |s: &str| s.red()),
    };

    if use_color {
        println!(
            "  {} {} - {}",
            color_fn(symbol),
            check.name.bold(),
            check.message
        );
    } else {
        println!("  {} {} - {}", symbol, check.name, check.message);
    }

    if let Some(fix) = &check.fix {
        if use_color {
            println!("    {} {}", "→".dimmed(), fix.dimmed());
        } else {
            println!("    → {fix}");
        }
    }
}
