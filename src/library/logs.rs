//! Log retrieval and text/pattern assertions.

use regex::{Regex, RegexBuilder};
use tracing::info;

use super::{DeviceLibrary, LibraryError};
use crate::device::{Device, Since};

/// Filter and bounds for [`DeviceLibrary::assert_log_contains`].
///
/// Exactly one of [`LogQuery::text`] or [`LogQuery::pattern`] must be set.
#[derive(Clone, Debug, PartialEq)]
pub struct LogQuery {
    text: Option<String>,
    pattern: Option<String>,
    date_from: Option<Since>,
    min_matches: Option<usize>,
    max_matches: Option<usize>,
    device_name: Option<String>,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            text: None,
            pattern: None,
            date_from: None,
            min_matches: Some(1),
            max_matches: None,
            device_name: None,
        }
    }
}

impl LogQuery {
    /// Matches lines containing `text`, ignoring case.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            text: Some(value.into()),
            ..Self::default()
        }
    }

    /// Matches lines where the case-insensitive regular expression matches
    /// from the start of the line.
    #[must_use]
    pub fn pattern(value: impl Into<String>) -> Self {
        Self {
            pattern: Some(value.into()),
            ..Self::default()
        }
    }

    /// Adds a regular expression to the query.
    #[must_use]
    pub fn with_pattern(mut self, value: impl Into<String>) -> Self {
        self.pattern = Some(value.into());
        self
    }

    /// Adds a substring to the query.
    #[must_use]
    pub fn with_text(mut self, value: impl Into<String>) -> Self {
        self.text = Some(value.into());
        self
    }

    /// Only considers lines produced at or after `since`.
    #[must_use]
    pub fn date_from(mut self, since: impl Into<Since>) -> Self {
        self.date_from = Some(since.into());
        self
    }

    /// Inclusive lower bound on matching lines; `None` disables the check.
    #[must_use]
    pub const fn min_matches(mut self, value: Option<usize>) -> Self {
        self.min_matches = value;
        self
    }

    /// Inclusive upper bound on matching lines; `None` disables the check.
    #[must_use]
    pub const fn max_matches(mut self, value: Option<usize>) -> Self {
        self.max_matches = value;
        self
    }

    /// Reads the logs of the named device instead of the current one.
    #[must_use]
    pub fn device_name(mut self, value: impl Into<String>) -> Self {
        self.device_name = Some(value.into());
        self
    }

    /// Empty filters count as absent.
    fn matcher(&self) -> Result<LineMatcher, LibraryError> {
        let text = self.text.as_deref().filter(|value| !value.is_empty());
        let pattern = self.pattern.as_deref().filter(|value| !value.is_empty());
        match (text, pattern) {
            (Some(text), None) => Ok(LineMatcher::Text(text.to_lowercase())),
            (None, Some(pattern)) => RegexBuilder::new(&format!("^(?:{pattern})"))
                .case_insensitive(true)
                .build()
                .map(LineMatcher::Pattern)
                .map_err(|err| {
                    LibraryError::InvalidArguments(format!("invalid pattern '{pattern}': {err}"))
                }),
            (Some(_), Some(_)) => Err(LibraryError::InvalidArguments(String::from(
                "'text' and 'pattern' are mutually exclusive",
            ))),
            (None, None) => Err(LibraryError::InvalidArguments(String::from(
                "missing required argument: either 'text' or 'pattern' must be given",
            ))),
        }
    }
}

enum LineMatcher {
    Text(String),
    Pattern(Regex),
}

impl LineMatcher {
    fn matches(&self, line: &str) -> bool {
        match self {
            Self::Text(needle) => line.to_lowercase().contains(needle.as_str()),
            Self::Pattern(regex) => regex.is_match(line),
        }
    }
}

impl DeviceLibrary {
    /// Fetches the device log lines, optionally only those at or after
    /// `date_from`. With `show` set each line is also logged.
    ///
    /// # Errors
    ///
    /// Returns the device lookup errors or a backend failure.
    pub fn get_logs(
        &self,
        device_name: Option<&str>,
        date_from: Option<Since>,
        show: bool,
    ) -> Result<Vec<String>, LibraryError> {
        let device = self.get_device(device_name)?;
        let lines = device.get_logs(date_from)?;
        if show {
            for line in &lines {
                info!(device = device.id(), "{line}");
            }
        }
        Ok(lines)
    }

    /// Asserts how many log lines match the query, returning the matching
    /// lines in device order.
    ///
    /// Failed bounds are retried under the library retry policy to absorb
    /// log flush latency.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::InvalidArguments`] when the query does not
    /// name exactly one of text or pattern, and [`LibraryError::Assertion`]
    /// when the match count is outside the bounds after the last attempt.
    pub fn assert_log_contains(&self, query: &LogQuery) -> Result<Vec<String>, LibraryError> {
        let matcher = query.matcher()?;
        self.retry.run("assert_log_contains", || {
            let entries = self.get_logs(query.device_name.as_deref(), query.date_from, false)?;
            let matches = entries
                .into_iter()
                .filter(|line| matcher.matches(line))
                .collect::<Vec<_>>();
            check_bounds(query, &matches)?;
            Ok(matches)
        })
    }

    /// Asserts that no log line matches the query; the query's bounds are
    /// replaced by zero.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Assertion`] when any line matches, and the
    /// argument errors of [`DeviceLibrary::assert_log_contains`].
    pub fn assert_log_not_contains(&self, query: &LogQuery) -> Result<(), LibraryError> {
        let bounded = query.clone().min_matches(Some(0)).max_matches(Some(0));
        self.assert_log_contains(&bounded).map(|_| ())
    }
}

fn check_bounds(query: &LogQuery, matches: &[String]) -> Result<(), LibraryError> {
    let got = matches.len();
    if let Some(min) = query.min_matches
        && got < min
    {
        return Err(LibraryError::Assertion(format!(
            "total matching log entries is less than expected. wanted={min} (min)\ngot={got}\n\nentries:\n{matches:?}"
        )));
    }
    if let Some(max) = query.max_matches
        && got > max
    {
        return Err(LibraryError::Assertion(format!(
            "total matching log entries is greater than expected. wanted={max} (max)\ngot={got}\n\nentries:\n{matches:?}"
        )));
    }
    Ok(())
}
