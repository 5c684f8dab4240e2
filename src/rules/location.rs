use super::ParamMap;
use url::Url;

/// Assemble the final Location URL.
///
/// Scheme, host, and any explicit port come from the rule's `to` directive;
/// the path is the rewriter's output; the query is the form-encoded parameter
/// map. Ports are only ever stripped from the request side, never from the
/// destination.
pub fn build_location(to: &str, path: &str, params: &ParamMap) -> Result<String, url::ParseError> {
    let mut location = Url::parse(to)?;
    location.set_path(path);
    location.set_fragment(None);

    if params.is_empty() {
        location.set_query(None);
    } else {
        let mut query = location.query_pairs_mut();
        query.clear();
        for (key, values) in params {
            for value in values {
                query.append_pair(key, value);
            }
        }
        drop(query);
    }

    Ok(location.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_build_location_plain() {
        let got = build_location("https://foo.com/ignored", "/bar/world/hello", &ParamMap::new())
            .unwrap();
        assert_eq!(got, "https://foo.com/bar/world/hello");
    }

    #[test]
    fn test_build_location_preserves_destination_port() {
        let got = build_location("https://demo.localhost.com:8080/foo", "/foo", &ParamMap::new())
            .unwrap();
        assert_eq!(got, "https://demo.localhost.com:8080/foo");
    }

    #[test]
    fn test_build_location_encodes_params() {
        let mut params = ParamMap::new();
        params.insert("new".to_string(), vec!["hello".to_string()]);
        let got = build_location("https://demo.localhost.com/", "/", &params).unwrap();
        assert_eq!(got, "https://demo.localhost.com/?new=hello");
    }

    #[test]
    fn test_build_location_multi_valued_params() {
        let mut params = ParamMap::new();
        params.insert("whiz".to_string(), vec!["bang".to_string(), "test".to_string()]);
        let got = build_location("https://foo.com/", "/", &params).unwrap();
        assert_eq!(got, "https://foo.com/?whiz=bang&whiz=test");
    }

    #[test]
    fn test_build_location_drops_query_from_to_directive() {
        let got = build_location("https://foo.com/x?utm=campaign", "/x", &ParamMap::new()).unwrap();
        assert_eq!(got, "https://foo.com/x");
    }

    #[test]
    fn test_build_location_all_params_present() {
        let mut params = HashMap::new();
        params.insert("new".to_string(), vec!["hello".to_string()]);
        params.insert("existing".to_string(), vec!["world".to_string()]);
        let got = build_location("https://demo.localhost.com/", "/", &params).unwrap();
        let parsed = Url::parse(&got).unwrap();
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        // key ordering is unspecified; both pairs must be present
        assert_eq!(pairs.len(), 2);
        assert!(pairs.contains(&("new".to_string(), "hello".to_string())));
        assert!(pairs.contains(&("existing".to_string(), "world".to_string())));
    }
}
