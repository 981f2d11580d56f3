use regex::Regex;

use super::{CommandOutcome, DriverError};

/// Which stream to inspect and how patterns combine.
///
/// `*_SINGLELINE`: every pattern must match within one and the same line.
/// `*_MULTILINE`: each pattern must match some line of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    StdoutSingleline,
    StdoutMultiline,
    StderrSingleline,
    StderrMultiline,
}

impl MatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StdoutSingleline => "STDOUT_SINGLELINE",
            Self::StdoutMultiline => "STDOUT_MULTILINE",
            Self::StderrSingleline => "STDERR_SINGLELINE",
            Self::StderrMultiline => "STDERR_MULTILINE",
        }
    }

    pub fn is_stderr(self) -> bool {
        matches!(self, Self::StderrSingleline | Self::StderrMultiline)
    }

    fn is_multiline(self) -> bool {
        matches!(self, Self::StdoutMultiline | Self::StderrMultiline)
    }
}

impl std::str::FromStr for MatchMode {
    type Err = DriverError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "STDOUT_SINGLELINE" => Ok(Self::StdoutSingleline),
            "STDOUT_MULTILINE" => Ok(Self::StdoutMultiline),
            "STDERR_SINGLELINE" => Ok(Self::StderrSingleline),
            "STDERR_MULTILINE" => Ok(Self::StderrMultiline),
            other => Err(DriverError::UnknownMode(other.to_owned())),
        }
    }
}

/// What a command's output is checked against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expectation {
    pub mode: Option<MatchMode>,
    pub patterns: Vec<String>,
    pub use_regex: bool,
}

impl Expectation {
    /// No output pattern: only the exit status (and a clean stderr) counts.
    pub fn success() -> Self {
        Self::default()
    }

    pub fn new<I, S>(mode: MatchMode, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: Some(mode),
            patterns: patterns.into_iter().map(Into::into).collect(),
            use_regex: false,
        }
    }

    pub fn stdout_singleline(pattern: impl Into<String>) -> Self {
        Self::new(MatchMode::StdoutSingleline, [pattern.into()])
    }

    pub fn stdout_multiline<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(MatchMode::StdoutMultiline, patterns)
    }

    pub fn stderr_singleline(pattern: impl Into<String>) -> Self {
        Self::new(MatchMode::StderrSingleline, [pattern.into()])
    }

    /// Treat patterns as regular expressions, applied line by line.
    pub fn regex(mut self) -> Self {
        self.use_regex = true;
        self
    }

    pub fn has_pattern(&self) -> bool {
        self.mode.is_some()
    }

    fn compile(&self) -> Result<Vec<Matcher>, DriverError> {
        self.patterns
            .iter()
            .map(|pattern| {
                if self.use_regex {
                    Regex::new(pattern)
                        .map(Matcher::Regex)
                        .map_err(|source| DriverError::InvalidPattern {
                            pattern: pattern.clone(),
                            source,
                        })
                } else {
                    Ok(Matcher::Literal(pattern.clone()))
                }
            })
            .collect()
    }

    /// Whether the selected stream satisfies the patterns. Without a mode
    /// there is nothing to match and the answer is `true`.
    pub fn matches(&self, outcome: &CommandOutcome) -> Result<bool, DriverError> {
        let Some(mode) = self.mode else {
            return Ok(true);
        };
        let text = if mode.is_stderr() {
            &outcome.stderr
        } else {
            &outcome.stdout
        };
        let matchers = self.compile()?;

        let found = if mode.is_multiline() {
            matchers
                .iter()
                .all(|matcher| text.lines().any(|line| matcher.is_match(line)))
        } else {
            text.lines()
                .any(|line| matchers.iter().all(|matcher| matcher.is_match(line)))
        };
        Ok(found)
    }
}

impl std::fmt::Display for Expectation {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.mode {
            None => formatter.write_str("exit status 0 with empty stderr"),
            Some(mode) => write!(
                formatter,
                "{} {}{:?}",
                mode.as_str(),
                if self.use_regex { "regex " } else { "" },
                self.patterns
            ),
        }
    }
}

enum Matcher {
    Literal(String),
    Regex(Regex),
}

impl Matcher {
    fn is_match(&self, line: &str) -> bool {
        match self {
            Self::Literal(needle) => line.contains(needle.as_str()),
            Self::Regex(regex) => regex.is_match(line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(stdout: &str, stderr: &str) -> CommandOutcome {
        CommandOutcome {
            exit_code: 0,
            stdout: stdout.to_owned(),
            stderr: stderr.to_owned(),
        }
    }

    const LISTING: &str = "AVUs defined for user alice#tempZone:\nattribute: att0\nvalue: val0\nunits: unt0\n";

    #[test]
    fn singleline_literal_substring() {
        let out = outcome(LISTING, "");
        assert!(Expectation::stdout_singleline("units: unt0").matches(&out).unwrap());
        assert!(!Expectation::stdout_singleline("units: unt1").matches(&out).unwrap());
    }

    #[test]
    fn singleline_requires_all_patterns_on_one_line() {
        let out = outcome(LISTING, "");
        let same_line = Expectation::new(MatchMode::StdoutSingleline, ["attribute", "att0"]);
        assert!(same_line.matches(&out).unwrap());

        let split = Expectation::new(MatchMode::StdoutSingleline, ["attribute", "val0"]);
        assert!(!split.matches(&out).unwrap());
    }

    #[test]
    fn multiline_regex_anchors_at_line_end() {
        let out = outcome(LISTING, "");
        let exact = Expectation::stdout_multiline([
            "attribute: att0$",
            "value: val0$",
            "units: unt0$",
        ])
        .regex();
        assert!(exact.matches(&out).unwrap());

        let prefix_only = Expectation::stdout_multiline(["units: unt$"]).regex();
        assert!(!prefix_only.matches(&out).unwrap());
    }

    #[test]
    fn empty_units_line_matches_anchored_blank() {
        let out = outcome("attribute: a\nvalue: v\nunits: \n", "");
        let expectation = Expectation::stdout_multiline(["units: $"]).regex();
        assert!(expectation.matches(&out).unwrap());
    }

    #[test]
    fn stderr_modes_read_stderr() {
        let out = outcome("", "ERROR: imeta qu failed with error USER_STRLEN_TOOLONG: x\n");
        assert!(Expectation::stderr_singleline("USER_STRLEN_TOOLONG")
            .matches(&out)
            .unwrap());
        assert!(!Expectation::stdout_singleline("USER_STRLEN_TOOLONG")
            .matches(&out)
            .unwrap());
    }

    #[test]
    fn invalid_regex_is_reported() {
        let out = outcome("x", "");
        let err = Expectation::stdout_singleline("(unclosed")
            .regex()
            .matches(&out)
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidPattern { .. }));
    }

    #[test]
    fn mode_names_round_trip_through_from_str() {
        for mode in [
            MatchMode::StdoutSingleline,
            MatchMode::StdoutMultiline,
            MatchMode::StderrSingleline,
            MatchMode::StderrMultiline,
        ] {
            assert_eq!(mode.as_str().parse::<MatchMode>().unwrap(), mode);
        }
        assert!("STDOUT".parse::<MatchMode>().is_err());
    }
}
