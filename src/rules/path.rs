use regex::Regex;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("path '{path}' does not expand under '{pattern}'")]
    NotExpandable { path: String, pattern: String },
    #[error("expanded target is not a URL: {0}")]
    InvalidTarget(#[from] url::ParseError),
}

/// Rewrite a request path into the target path named by a rule's `to` template.
///
/// Every non-overlapping match of `pattern` in `path` expands the template
/// once (`$name` / `$1` references; groups that did not capture expand to the
/// empty string) and the expansions are concatenated in order. The result is
/// parsed as a URL and only its path component is returned; the destination
/// scheme and host are re-applied later by the location assembler, and any
/// query embedded in the template is discarded.
pub fn rewrite_path(path: &str, pattern: &Regex, to: &str) -> Result<String, RewriteError> {
    let mut expanded = String::new();
    for captures in pattern.captures_iter(path) {
        captures.expand(to, &mut expanded);
    }

    if expanded.is_empty() {
        return Err(RewriteError::NotExpandable {
            path: path.to_string(),
            pattern: pattern.to_string(),
        });
    }

    let target = Url::parse(&expanded)?;
    Ok(target.path().to_string())
}
