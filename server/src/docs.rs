use std::{collections::BTreeMap, fs, path::Path};

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use tracing::warn;

/// Routes that carry a YAML document in the docs directory, named
/// `<route>.yml` with `/` replaced by `-`.
pub const DOCUMENTED_ROUTES: &[&str] = &[
    "machine",
    "mc-server",
    "mc-server/playerlist",
    "mc-server/serverlist",
    "vps",
];

const METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];

/// Per-method sections of one route's document.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RouteDoc {
    #[serde(rename = "GET", skip_serializing_if = "Option::is_none")]
    pub get: Option<Value>,
    #[serde(rename = "POST", skip_serializing_if = "Option::is_none")]
    pub post: Option<Value>,
    #[serde(rename = "PUT", skip_serializing_if = "Option::is_none")]
    pub put: Option<Value>,
    #[serde(rename = "DELETE", skip_serializing_if = "Option::is_none")]
    pub delete: Option<Value>,
}

impl RouteDoc {
    fn not_implemented() -> Self {
        let placeholder: Value = serde_yaml::from_str(
            "responses:\n  '501':\n    description: API Spec not implemented\n",
        )
        .unwrap_or(Value::Null);
        Self {
            get: Some(placeholder),
            post: None,
            put: None,
            delete: None,
        }
    }

    fn from_mapping(mut doc: Mapping) -> Self {
        let [get, post, put, delete] = METHODS.map(|method| doc.remove(method));
        Self {
            get,
            post,
            put,
            delete,
        }
    }

    /// Reads a route document. A missing or unreadable file yields a
    /// "not implemented" placeholder.
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => {
                warn!("No {} file found!", path.display());
                return Self::not_implemented();
            }
        };

        match serde_yaml::from_str::<Mapping>(&raw) {
            Ok(doc) => Self::from_mapping(doc),
            Err(err) => {
                warn!("Invalid API doc {}: {err}", path.display());
                Self::not_implemented()
            }
        }
    }
}

/// Route documents keyed by route path, e.g. `/api/mc-server/playerlist`.
#[derive(Serialize, Debug, Default)]
pub struct ApiDocs(BTreeMap<String, RouteDoc>);

impl ApiDocs {
    pub fn load(dir: &Path) -> Self {
        let docs = DOCUMENTED_ROUTES
            .iter()
            .map(|route| {
                let file = dir.join(format!("{}.yml", route.replace('/', "-")));
                (format!("/api/{route}"), RouteDoc::load(&file))
            })
            .collect();
        Self(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_document_by_method() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("vps.yml"),
            "GET:\n  get: a\nPOST:\n  post: b\nPUT:\n  put: c\n",
        )
        .unwrap();

        let doc = RouteDoc::load(&dir.path().join("vps.yml"));
        assert_eq!(doc.get, Some(serde_yaml::from_str("get: a").unwrap()));
        assert_eq!(doc.post, Some(serde_yaml::from_str("post: b").unwrap()));
        assert_eq!(doc.put, Some(serde_yaml::from_str("put: c").unwrap()));
        assert_eq!(doc.delete, None);
    }

    #[test]
    fn missing_document_is_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let docs = ApiDocs::load(dir.path());

        let doc = docs.0.get("/api/mc-server/playerlist").unwrap();
        assert_eq!(doc, &RouteDoc::not_implemented());
        assert!(doc.get.is_some());
    }

    #[test]
    fn nested_routes_use_dashed_file_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mc-server-serverlist.yml"), "GET:\n  summary: list\n").unwrap();

        let docs = ApiDocs::load(dir.path());
        let doc = docs.0.get("/api/mc-server/serverlist").unwrap();
        assert_eq!(doc.get, Some(serde_yaml::from_str("summary: list").unwrap()));
    }
}
