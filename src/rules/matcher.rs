use super::{Rule, RuleTable};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq)]
pub enum MatchError {
    #[error("no rules declared for '{0}'")]
    NoRuleForHost(String),
    #[error("no match for host '{0}' with path '{1}'")]
    NoRuleForPath(String, String),
}

/// Select the winning rule for a request's host and path.
///
/// The bucket is scanned in declaration order. A rule whose literal pattern
/// prefix equals the whole path wins immediately; otherwise the first rule
/// whose pattern matches wins. Authors resolve ambiguity by reordering rules
/// or anchoring the tail with `$`.
pub fn find_match<'a>(
    table: &'a RuleTable,
    host: &str,
    path: &str,
) -> Result<&'a Rule, MatchError> {
    let bucket = table
        .bucket(host)
        .ok_or_else(|| MatchError::NoRuleForHost(host.to_string()))?;

    for rule in bucket {
        if rule.literal_prefix() == path {
            debug!(exp = %rule.pattern, %path, "found exact match");
            return Ok(rule);
        }

        if rule.pattern.is_match(path) {
            debug!(exp = %rule.pattern, %path, "found regex match");
            return Ok(rule);
        }
    }

    Err(MatchError::NoRuleForPath(
        host.to_string(),
        path.to_string(),
    ))
}
