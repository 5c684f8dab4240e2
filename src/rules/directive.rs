use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum DirectiveError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid hostname: {0}")]
    InvalidHostname(String),
}

/// A parsed `from` directive.
///
/// The path is kept verbatim so embedded regular expressions survive; it is
/// empty when the directive named only a host.
#[derive(Debug, Clone, PartialEq)]
pub struct FromDirective {
    pub scheme: String,
    pub host: String,
    pub path: String,
}

impl FromDirective {
    /// The path with hostname-only directives normalized to `/`
    pub fn path_or_root(&self) -> &str {
        if self.path.is_empty() {
            "/"
        } else {
            &self.path
        }
    }
}

/// Parse a user-authored `from` directive into scheme, host, and path.
///
/// Directive paths routinely contain regex metacharacters (`(?<x>\w+)`,
/// `[[:digit:]]{4}`, unbalanced brackets) that a general-purpose URL parser
/// rejects or mangles, so the host is split off at the first `/` after the
/// optional scheme and the remainder is taken as the path without further
/// interpretation. A `:port` suffix is stripped from the host; the scheme
/// defaults to `https` when absent.
pub fn parse_from_directive(directive: &str) -> Result<FromDirective, DirectiveError> {
    if directive.is_empty() {
        return Err(DirectiveError::InvalidUrl(directive.to_string()));
    }

    let (scheme, rest) = match directive.split_once("://") {
        Some((scheme, rest)) => {
            if scheme.is_empty() {
                return Err(DirectiveError::InvalidUrl(directive.to_string()));
            }
            (scheme, rest)
        }
        None => ("https", directive),
    };

    let (authority, path) = match rest.split_once('/') {
        Some((authority, remainder)) => (authority, format!("/{remainder}")),
        None => (rest, String::new()),
    };

    // Covers `scheme:///...`, bare `scheme://`, and relative inputs like `/foo`
    if authority.is_empty() {
        return Err(DirectiveError::InvalidHostname(String::new()));
    }

    let host = match authority.split_once(':') {
        Some((host, _port)) => host,
        None => authority,
    };

    if host.is_empty() || !valid_hostname(host) {
        return Err(DirectiveError::InvalidHostname(host.to_string()));
    }

    Ok(FromDirective {
        scheme: scheme.to_string(),
        host: host.to_string(),
        path,
    })
}

fn valid_hostname(hostname: &str) -> bool {
    hostname
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
