// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Comparison of simulation output against an expectation file.

use crate::Error;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const MULTIDRIVE_PATTERN: &str = "^WARNING: multidrive";

/// Reference lines, one pattern per line. Blank lines are skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpectedSequence {
    lines: Vec<String>,
}

impl ExpectedSequence {
    pub fn new<S: Into<String>>(lines: Vec<S>) -> Self {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| Error::Io(format!("{}: {}", path.display(), err)))?;
        text.parse()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl FromStr for ExpectedSequence {
    type Err = Error;
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            lines: text
                .lines()
                .map(|line| line.trim_end().to_owned())
                .filter(|line| !line.is_empty())
                .collect(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonOptions {
    /// Expected lines are regular expressions that must match a whole line.
    pub regexp: bool,
    /// Lines must appear in the expected order.
    pub ordered: bool,
    /// Drop simulator multidrive warnings before comparing.
    pub suppress_multidrive: bool,
    /// Output lines starting with a match of any of these are dropped.
    pub ignore: Vec<String>,
}

impl Default for ComparisonOptions {
    fn default() -> Self {
        Self {
            regexp: true,
            ordered: true,
            suppress_multidrive: true,
            ignore: vec!["CONFIG:.*".to_owned()],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Discrepancy {
    /// An output line where a different one was expected.
    Mismatch {
        line: usize,
        expected: String,
        found: String,
    },
    /// An output line nothing expects.
    Unexpected { line: usize, found: String },
    /// An expected line that never appeared.
    Missing { expected: String },
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Mismatch {
                line,
                expected,
                found,
            } => write!(
                f,
                "line {}: expected {:?}, found {:?}",
                line, expected, found
            ),
            Self::Unexpected { line, found } => write!(f, "line {}: unexpected {:?}", line, found),
            Self::Missing { expected } => write!(f, "missing {:?}", expected),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Output lines left after dropping ignored ones.
    pub compared: usize,
    pub discrepancies: Vec<Discrepancy>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Checks simulation output against an `ExpectedSequence`.
#[derive(Clone, Debug)]
pub struct ComparisonTester {
    expected: Vec<String>,
    patterns: Vec<Regex>,
    ignore: Vec<Regex>,
    options: ComparisonOptions,
}

fn compile(pattern: &str) -> Result<Regex, Error> {
    Regex::new(pattern).map_err(|err| Error::InvalidPattern(err.to_string()))
}

impl ComparisonTester {
    pub fn new(expected: ExpectedSequence, options: ComparisonOptions) -> Result<Self, Error> {
        let patterns = expected
            .lines()
            .iter()
            .map(|line| {
                let line = if options.regexp {
                    line.to_owned()
                } else {
                    regex::escape(line)
                };
                compile(&format!("^(?:{})$", line))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut ignore = options
            .ignore
            .iter()
            .map(|pattern| compile(&format!("^(?:{})", pattern)))
            .collect::<Result<Vec<_>, _>>()?;
        if options.suppress_multidrive {
            ignore.push(compile(MULTIDRIVE_PATTERN)?);
        }
        Ok(Self {
            expected: expected.lines,
            patterns,
            ignore,
            options,
        })
    }

    pub fn from_file(path: &Path, options: ComparisonOptions) -> Result<Self, Error> {
        Self::new(ExpectedSequence::from_file(path)?, options)
    }

    pub fn options(&self) -> &ComparisonOptions {
        &self.options
    }

    /// Compares output lines, numbered from 1 in the unfiltered output.
    pub fn run<S: AsRef<str>>(&self, output: &[S]) -> Verdict {
        let lines = output
            .iter()
            .map(AsRef::as_ref)
            .enumerate()
            .filter(|(_, line)| !self.ignore.iter().any(|ignore| ignore.is_match(line)))
            .map(|(index, line)| (index + 1, line))
            .collect::<Vec<_>>();
        let discrepancies = if self.options.ordered {
            self.compare_ordered(&lines)
        } else {
            self.compare_unordered(&lines)
        };
        for discrepancy in &discrepancies {
            log::warn!("Output mismatch: {}", discrepancy);
        }
        let verdict = Verdict {
            compared: lines.len(),
            discrepancies,
        };
        log::info!(
            "Compared {} lines: {}",
            verdict.compared,
            if verdict.passed() { "PASS" } else { "FAIL" }
        );
        verdict
    }

    fn compare_ordered(&self, lines: &[(usize, &str)]) -> Vec<Discrepancy> {
        let mut discrepancies = Vec::new();
        for (i, (expected, pattern)) in self.expected.iter().zip(&self.patterns).enumerate() {
            match lines.get(i) {
                Some((line, found)) if !pattern.is_match(found) => {
                    discrepancies.push(Discrepancy::Mismatch {
                        line: *line,
                        expected: expected.clone(),
                        found: found.to_string(),
                    })
                }
                Some(_) => {}
                None => discrepancies.push(Discrepancy::Missing {
                    expected: expected.clone(),
                }),
            }
        }
        for (line, found) in lines.iter().skip(self.expected.len()) {
            discrepancies.push(Discrepancy::Unexpected {
                line: *line,
                found: found.to_string(),
            });
        }
        discrepancies
    }

    fn compare_unordered(&self, lines: &[(usize, &str)]) -> Vec<Discrepancy> {
        let mut used = vec![false; lines.len()];
        let mut discrepancies = Vec::new();
        for (expected, pattern) in self.expected.iter().zip(&self.patterns) {
            let found = lines
                .iter()
                .enumerate()
                .position(|(i, (_, line))| !used[i] && pattern.is_match(line));
            match found {
                Some(i) => used[i] = true,
                None => discrepancies.push(Discrepancy::Missing {
                    expected: expected.clone(),
                }),
            }
        }
        for ((line, found), used) in lines.iter().zip(used) {
            if !used {
                discrepancies.push(Discrepancy::Unexpected {
                    line: *line,
                    found: found.to_string(),
                });
            }
        }
        discrepancies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPECT: &str = "I2S frame slave checker started
Pass
Checked \\d+ frames across \\d+ configurations, 0 errors
";

    fn tester(options: ComparisonOptions) -> ComparisonTester {
        ComparisonTester::new(EXPECT.parse().unwrap(), options).unwrap()
    }

    #[test]
    fn test_ordered_regex_match() {
        let _ = env_logger::builder().is_test(true).try_init();
        let tester = tester(ComparisonOptions::default());
        let verdict = tester.run(&[
            "I2S frame slave checker started",
            "CONFIG: bclk_half_period=1 in=2 out=2 mode=I2S bits=16 frames=4",
            "WARNING: multidrive on port tile[0]:XS1_PORT_1B (driven by a and b)",
            "Pass",
            "Checked 8 frames across 2 configurations, 0 errors",
        ]);
        assert!(verdict.passed(), "{:?}", verdict);
        assert_eq!(verdict.compared, 3);
    }

    #[test]
    fn test_ordered_discrepancies() {
        let tester = tester(ComparisonOptions::default());
        let verdict = tester.run(&[
            "I2S frame slave checker started",
            "ERROR: frame 1 channel 0: expected 0x12, got 0x13",
            "Pass",
        ]);
        assert_eq!(
            verdict.discrepancies,
            vec![
                Discrepancy::Mismatch {
                    line: 2,
                    expected: "Pass".to_owned(),
                    found: "ERROR: frame 1 channel 0: expected 0x12, got 0x13".to_owned(),
                },
                Discrepancy::Mismatch {
                    line: 3,
                    expected: "Checked \\d+ frames across \\d+ configurations, 0 errors"
                        .to_owned(),
                    found: "Pass".to_owned(),
                },
            ]
        );

        let verdict = tester.run(&[
            "I2S frame slave checker started",
            "Pass",
            "Checked 8 frames across 2 configurations, 0 errors",
            "Fail",
        ]);
        assert_eq!(
            verdict.discrepancies,
            vec![Discrepancy::Unexpected {
                line: 4,
                found: "Fail".to_owned()
            }]
        );

        let verdict = tester.run(&["I2S frame slave checker started"]);
        assert_eq!(verdict.discrepancies.len(), 2);
        assert!(matches!(
            verdict.discrepancies[0],
            Discrepancy::Missing { .. }
        ));
    }

    #[test]
    fn test_multidrive_not_suppressed() {
        let tester = tester(ComparisonOptions {
            suppress_multidrive: false,
            ..Default::default()
        });
        let verdict = tester.run(&[
            "WARNING: multidrive on port tile[0]:XS1_PORT_1B (driven by a and b)",
            "I2S frame slave checker started",
            "Pass",
            "Checked 8 frames across 2 configurations, 0 errors",
        ]);
        assert!(!verdict.passed());
    }

    #[test]
    fn test_unordered_and_literal() {
        let tester = tester(ComparisonOptions {
            ordered: false,
            ..Default::default()
        });
        let verdict = tester.run(&[
            "Pass",
            "Checked 8 frames across 2 configurations, 0 errors",
            "I2S frame slave checker started",
        ]);
        assert!(verdict.passed());

        let literal = ComparisonTester::new(
            ExpectedSequence::new(vec!["Checked 1+1 frames"]),
            ComparisonOptions {
                regexp: false,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(literal.run(&["Checked 1+1 frames"]).passed());
        assert!(!literal.run(&["Checked 11 frames"]).passed());
    }

    #[test]
    fn test_bad_patterns() {
        assert!(matches!(
            ComparisonTester::new(
                ExpectedSequence::new(vec!["Checked (\\d+ frames"]),
                ComparisonOptions::default()
            ),
            Err(Error::InvalidPattern(_))
        ));
        assert!(matches!(
            ExpectedSequence::from_file(Path::new("/nonexistent/slave_test.expect")),
            Err(Error::Io(_))
        ));
    }
}
