//! Classification of control-plane paths that are not API endpoints.

/// Bootstrap-side routes, in the order they are tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRoute {
    /// `/`: landing redirect, or bootstrap with a generated id on `?new`.
    Root,
    /// `/{name}`: bootstrap with a requested id.
    SingleSegment(String),
    /// Anything deeper.
    MultiSegment,
}

impl ControlRoute {
    /// Classify a path by its non-empty `/` segments, so `/name/` is still a
    /// single segment.
    pub fn classify(path: &str) -> Self {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        match (segments.next(), segments.next()) {
            (None, _) => ControlRoute::Root,
            (Some(name), None) => ControlRoute::SingleSegment(name.to_string()),
            (Some(_), Some(_)) => ControlRoute::MultiSegment,
        }
    }
}

/// Whether the query string carries a `new` key, with or without a value.
pub fn wants_new_tunnel(query: Option<&str>) -> bool {
    query.is_some_and(|q| {
        q.split('&')
            .any(|pair| pair.split('=').next() == Some("new"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_paths() {
        assert_eq!(ControlRoute::classify("/"), ControlRoute::Root);
        assert_eq!(ControlRoute::classify(""), ControlRoute::Root);
        assert_eq!(
            ControlRoute::classify("/my-app"),
            ControlRoute::SingleSegment("my-app".into())
        );
        assert_eq!(
            ControlRoute::classify("/my-app/"),
            ControlRoute::SingleSegment("my-app".into())
        );
        assert_eq!(ControlRoute::classify("/a/b"), ControlRoute::MultiSegment);
        assert_eq!(ControlRoute::classify("/api/unknown/x"), ControlRoute::MultiSegment);
    }

    #[test]
    fn detects_new_query_key() {
        assert!(wants_new_tunnel(Some("new")));
        assert!(wants_new_tunnel(Some("new=")));
        assert!(wants_new_tunnel(Some("x=1&new")));
        assert!(!wants_new_tunnel(Some("renew")));
        assert!(!wants_new_tunnel(Some("x=new")));
        assert!(!wants_new_tunnel(None));
    }
}
