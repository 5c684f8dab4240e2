mod directive;
mod location;
mod matcher;
mod params;
mod path;

pub use directive::{parse_from_directive, DirectiveError, FromDirective};
pub use location::build_location;
pub use matcher::{find_match, MatchError};
pub use params::{compose_params, ParamMap, UnknownStrategyError};
pub use path::{rewrite_path, RewriteError};

use crate::config::RawRule;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};

pub const STRATEGY_COMBINE: &str = "combine";
pub const STRATEGY_REPLACE: &str = "replace";
pub const STRATEGY_UNSET: &str = "";

/// A validated redirect rule with its compiled path pattern.
///
/// Rules are created by the compiler at load or reload time and are immutable
/// afterwards; a reload produces a whole new table.
#[derive(Debug, Clone)]
pub struct Rule {
    pub from: String,
    pub to: String,
    pub code: u16,
    pub cache_control_max_age: i64,
    pub strategy: String,
    pub values: HashMap<String, Vec<String>>,
    /// Normalized hostname extracted from `from`
    pub host: String,
    /// Path component of `from`, verbatim; empty for hostname-only directives
    pub path: String,
    /// Compiled, `^`-anchored pattern applied to request paths
    pub pattern: Regex,
    /// Literal head of the pattern, used for the exact-match shortcut
    literal_prefix: String,
}

impl Rule {
    pub fn literal_prefix(&self) -> &str {
        &self.literal_prefix
    }
}

/// Server-level defaults applied to rule fields left unset
#[derive(Debug, Clone)]
pub struct RuleDefaults {
    pub code: u16,
    pub strategy: String,
    pub cache_control_max_age: i64,
}

/// Rules bucketed by hostname, declaration order preserved within a bucket
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    buckets: HashMap<String, Vec<Rule>>,
}

impl RuleTable {
    pub fn bucket(&self, host: &str) -> Option<&[Rule]> {
        self.buckets.get(host).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Rule>)> {
        self.buckets.iter()
    }

    pub fn host_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn rule_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Compile a raw ruleset into a host-bucketed table.
///
/// Invalid rules are logged and dropped; the returned table is always usable,
/// even when every rule was rejected.
pub fn compile_rules(raw: &[RawRule], defaults: &RuleDefaults) -> RuleTable {
    let mut table = RuleTable::default();

    for rule in raw {
        let parsed = match parse_from_directive(&rule.from) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(from = %rule.from, %err, "not loading rule, from directive cannot be parsed");
                continue;
            }
        };

        if !rule.to.contains("://") {
            warn!(from = %rule.from, to = %rule.to, "not loading rule, to directive missing protocol");
            continue;
        }

        // Anchor unanchored paths so `foo.com/bar` matches `/bar...` and not
        // `/x/y/z/bar`; a hostname-only directive is a blanket redirect.
        let pattern_source = if parsed.path.is_empty() {
            "^.*".to_string()
        } else if parsed.path.starts_with('^') {
            parsed.path.clone()
        } else {
            format!("^{}", parsed.path)
        };

        let pattern = match Regex::new(&pattern_source) {
            Ok(pattern) => pattern,
            Err(err) => {
                warn!(regexp = %pattern_source, host = %parsed.host, %err, "invalid regexp, skipping");
                continue;
            }
        };

        let code = if rule.code == 0 { defaults.code } else { rule.code };
        let strategy = if rule.parameters.strategy.is_empty() {
            defaults.strategy.clone()
        } else {
            rule.parameters.strategy.clone()
        };
        // 0 means "unset at the rule level"; -1 (suppress) is preserved as-is
        let cache_control_max_age = if rule.cache_control_max_age == 0 {
            defaults.cache_control_max_age
        } else {
            rule.cache_control_max_age
        };

        let literal_prefix = literal_prefix(&pattern_source);

        let compiled = Rule {
            from: rule.from.clone(),
            to: rule.to.clone(),
            code,
            cache_control_max_age,
            strategy,
            values: rule.parameters.values.clone(),
            host: parsed.host.clone(),
            path: parsed.path,
            pattern,
            literal_prefix,
        };

        debug!(from = %compiled.from, host = %compiled.host, "loaded rule");
        table.buckets.entry(parsed.host).or_default().push(compiled);
    }

    table
}

/// The longest literal run at the head of a pattern.
///
/// Escaped metacharacters contribute their literal value; a quantifier takes
/// back the atom it applies to, since that atom is no longer guaranteed to
/// appear exactly once.
fn literal_prefix(pattern: &str) -> String {
    let mut prefix = String::new();
    let mut chars = pattern.strip_prefix('^').unwrap_or(pattern).chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) if !escaped.is_ascii_alphanumeric() => prefix.push(escaped),
                // class escapes like \w or \d are not literals
                _ => break,
            },
            '+' | '*' | '?' | '{' => {
                prefix.pop();
                break;
            }
            '.' | '(' | ')' | '|' | '[' | ']' | '^' | '$' => break,
            _ => prefix.push(c),
        }
    }

    prefix
}
