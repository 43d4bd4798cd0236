//! FileCheck-style test validation for block files.
//!
//! A block file carries its own test: `; RUN:` lines give the `tilegen`
//! command line (`%s` stands for the file itself) and `; CHECK` lines give the
//! patterns the output must contain, in order. A RUN line prefixed with `not`
//! expects the command to fail and checks the error text instead.

use clap::Parser;

use super::parse_block;
use crate::driver::{execute, Cli};

/// A CHECK directive extracted from a block file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDirective {
    /// CHECK: pattern - Match on this or a later line
    Check(String),
    /// CHECK-NEXT: pattern - Match on the line right after the previous match
    CheckNext(String),
    /// CHECK-NOT: pattern - Must not appear before the next positive match
    CheckNot(String),
    /// COM: comment - Ignored
    Comment(String),
}

/// A RUN directive specifying how to execute the test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirective {
    pub command: String,
    pub args: Vec<String>,
    pub expect_failure: bool,
}

/// Test specification extracted from a block file
#[derive(Debug)]
pub struct TestSpec {
    pub run_directives: Vec<RunDirective>,
    pub check_directives: Vec<CheckDirective>,
    pub content: String,
}

impl TestSpec {
    pub fn parse(content: &str) -> Self {
        let mut run_directives = Vec::new();
        let mut check_directives = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();
            if let Some(run_cmd) = trimmed.strip_prefix("; RUN:") {
                let (expect_failure, run_cmd) = match run_cmd.trim().strip_prefix("not ") {
                    Some(rest) => (true, rest),
                    None => (false, run_cmd),
                };
                let mut parts = run_cmd.split_whitespace();
                if let Some(command) = parts.next() {
                    run_directives.push(RunDirective {
                        command: command.to_string(),
                        args: parts.map(str::to_string).collect(),
                        expect_failure,
                    });
                }
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NEXT:") {
                check_directives.push(CheckDirective::CheckNext(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NOT:") {
                check_directives.push(CheckDirective::CheckNot(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK:") {
                check_directives.push(CheckDirective::Check(pattern.trim().to_string()));
            } else if let Some(comment) = trimmed.strip_prefix("; COM:") {
                check_directives.push(CheckDirective::Comment(comment.trim().to_string()));
            }
        }

        // Directives are `;` comments, so the whole file is also the program.
        TestSpec {
            run_directives,
            check_directives,
            content: content.to_string(),
        }
    }
}

/// Test runner that executes block-file tests
pub struct TestRunner {
    verbose: bool,
}

impl TestRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Run every RUN line of `spec` and validate its output
    pub fn run_test(&self, spec: &TestSpec) -> Result<(), String> {
        if spec.run_directives.is_empty() {
            return Err("no RUN directive".to_string());
        }
        for run_dir in &spec.run_directives {
            let output = self.execute_command(&spec.content, run_dir)?;
            self.validate_output(&output, &spec.check_directives)?;
        }
        Ok(())
    }

    /// Execute one RUN line against the in-memory program
    pub fn execute_command(&self, content: &str, run_dir: &RunDirective) -> Result<String, String> {
        if run_dir.command != "tilegen" {
            return Err(format!("unsupported RUN command `{}`", run_dir.command));
        }
        let argv = std::iter::once(run_dir.command.as_str())
            .chain(run_dir.args.iter().map(String::as_str).filter(|arg| *arg != "%s"));

        let result = Cli::try_parse_from(argv)
            .map_err(|e| e.to_string())
            .and_then(|cli| {
                let program = parse_block(content).map_err(|e| format!("Parse error: {e}"))?;
                execute(&cli.command, program).map_err(|e| e.to_string())
            });

        match (result, run_dir.expect_failure) {
            (Ok(output), false) => Ok(output),
            (Err(error), true) => Ok(error),
            (Ok(_), true) => Err("expected the command to fail but it succeeded".to_string()),
            (Err(error), false) => Err(format!("command failed: {error}")),
        }
    }

    /// Validate output against CHECK directives
    pub fn validate_output(&self, output: &str, directives: &[CheckDirective]) -> Result<(), String> {
        let output_lines: Vec<&str> = output.lines().collect();
        let mut line_idx = 0;
        let mut pending_not: Vec<&str> = Vec::new();

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => {}

                CheckDirective::CheckNot(pattern) => pending_not.push(pattern),

                CheckDirective::Check(pattern) => {
                    let found = output_lines
                        .iter()
                        .skip(line_idx)
                        .position(|line| line.contains(pattern.as_str()));
                    let Some(offset) = found else {
                        return Err(format!("CHECK: pattern '{pattern}' not found in output"));
                    };
                    Self::check_absent(&pending_not, &output_lines[line_idx..line_idx + offset])?;
                    pending_not.clear();
                    line_idx += offset + 1;
                    if self.verbose {
                        println!("CHECK: '{}' found at line {}", pattern, line_idx - 1);
                    }
                }

                CheckDirective::CheckNext(pattern) => {
                    let Some(line) = output_lines.get(line_idx) else {
                        return Err(format!("CHECK-NEXT: no more lines, expected '{pattern}'"));
                    };
                    if !line.contains(pattern.as_str()) {
                        return Err(format!("CHECK-NEXT: expected '{pattern}' but got '{line}'"));
                    }
                    Self::check_absent(&pending_not, &[])?;
                    pending_not.clear();
                    if self.verbose {
                        println!("CHECK-NEXT: '{}' matches at line {}", pattern, line_idx);
                    }
                    line_idx += 1;
                }
            }
        }

        // Trailing CHECK-NOTs cover the rest of the output
        Self::check_absent(&pending_not, &output_lines[line_idx.min(output_lines.len())..])
    }

    fn check_absent(patterns: &[&str], lines: &[&str]) -> Result<(), String> {
        for pattern in patterns {
            if let Some(line) = lines.iter().find(|line| line.contains(pattern)) {
                return Err(format!("CHECK-NOT: pattern '{pattern}' found in '{line}'"));
            }
        }
        Ok(())
    }
}
