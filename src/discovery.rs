//! Route listing served on the discovery path.

use serde::{Deserialize, Serialize};

use crate::routing::RoutingTree;
use crate::translate::params::parse_query;

/// Query parameter holding the substring filter.
pub const SEARCH_PARAM: &str = "search_string";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    pub path: String,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteListing {
    pub basepath: String,
    pub paths: Vec<PathEntry>,
}

/// The search filter of a discovery request, if any.
pub fn search_filter(query: Option<&str>) -> Option<String> {
    parse_query(query?)
        .into_iter()
        .find(|p| p.key == SEARCH_PARAM)
        .map(|p| p.value)
}

/// List every routed path whose pattern contains `search`.
pub fn listing(tree: &RoutingTree, base_path: &str, search: Option<&str>) -> RouteListing {
    let paths = tree
        .discover()
        .into_iter()
        .filter(|route| search.map_or(true, |s| route.pattern.contains(s)))
        .map(|route| PathEntry {
            path: route.pattern,
            methods: route.verbs.iter().map(|v| v.as_str().to_string()).collect(),
        })
        .collect();

    RouteListing {
        basepath: base_path.to_string(),
        paths,
    }
}
