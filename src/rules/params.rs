use super::{STRATEGY_COMBINE, STRATEGY_REPLACE, STRATEGY_UNSET};
use std::collections::HashMap;
use thiserror::Error;

/// Query parameters as ordered value lists keyed by name
pub type ParamMap = HashMap<String, Vec<String>>;

#[derive(Error, Debug, PartialEq)]
#[error("unknown parameter strategy: {0}")]
pub struct UnknownStrategyError(pub String);

/// Combine request and rule parameters according to the rule's strategy.
///
/// `combine` starts from the request parameters and overwrites any key also
/// present on the rule; value lists are replaced whole, never merged
/// element-wise. `replace` keeps only the rule parameters. An unset strategy
/// yields no parameters at all.
pub fn compose_params(
    strategy: &str,
    request: &ParamMap,
    rule: &ParamMap,
) -> Result<ParamMap, UnknownStrategyError> {
    match strategy {
        STRATEGY_COMBINE => {
            let mut composed = request.clone();
            for (key, values) in rule {
                composed.insert(key.clone(), values.clone());
            }
            Ok(composed)
        }
        STRATEGY_REPLACE => Ok(rule.clone()),
        STRATEGY_UNSET => Ok(ParamMap::new()),
        other => Err(UnknownStrategyError(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &[&str])]) -> ParamMap {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_combine_rule_wins_on_conflict() {
        let request = params(&[("foo", &["bar"]), ("whiz", &["bang"])]);
        let rule = params(&[("whiz", &["test"])]);
        let got = compose_params(STRATEGY_COMBINE, &request, &rule).unwrap();
        assert_eq!(got, params(&[("foo", &["bar"]), ("whiz", &["test"])]));
    }

    #[test]
    fn test_combine_empty_request() {
        let got = compose_params(STRATEGY_COMBINE, &ParamMap::new(), &params(&[("whiz", &["test"])]))
            .unwrap();
        assert_eq!(got, params(&[("whiz", &["test"])]));
    }

    #[test]
    fn test_combine_replaces_lists_whole() {
        let request = params(&[("whiz", &["bang", "pop"])]);
        let rule = params(&[("whiz", &["test"])]);
        let got = compose_params(STRATEGY_COMBINE, &request, &rule).unwrap();
        // the whole list is overwritten, not merged element-wise
        assert_eq!(got["whiz"], vec!["test".to_string()]);
    }

    #[test]
    fn test_replace_drops_request_params() {
        let request = params(&[("existing", &["hello"])]);
        let rule = params(&[("new", &["hello"])]);
        let got = compose_params(STRATEGY_REPLACE, &request, &rule).unwrap();
        assert_eq!(got, params(&[("new", &["hello"])]));
    }

    #[test]
    fn test_unset_yields_empty() {
        let request = params(&[("existing", &["hello"])]);
        let rule = params(&[("new", &["hello"])]);
        let got = compose_params(STRATEGY_UNSET, &request, &rule).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn test_unknown_strategy_names_offender() {
        let err = compose_params("idontexist", &ParamMap::new(), &ParamMap::new()).unwrap_err();
        assert_eq!(err, UnknownStrategyError("idontexist".to_string()));
    }
}
