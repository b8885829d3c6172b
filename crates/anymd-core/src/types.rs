use serde::{Deserialize, Serialize};

/// A top-level container in the remote store. Every type and object is
/// scoped to exactly one space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_ts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_ts: Option<i64>,
}

impl Space {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_ts: None,
            updated_ts: None,
        }
    }

    /// Display label: the space name, or the id when the name is empty.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// A remote object type ("category") under which objects are listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub id: String,
    pub name: String,
}

/// One entry from a remote object listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub archived: bool,
}

impl ObjectSummary {
    /// Display label: the object name, or the id when the name is empty.
    /// Every listing entry gets a non-empty label.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Full object detail including the markdown body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDetail {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub markdown: String,
}

impl ObjectDetail {
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Body of an object update request. Fields left as `None` are not
/// touched by the remote store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
}

impl UpdateObject {
    pub fn markdown(body: impl Into<String>) -> Self {
        Self {
            name: None,
            markdown: Some(body.into()),
        }
    }
}

/// Body of an object create request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateObject {
    pub type_id: String,
    pub name: String,
    #[serde(default)]
    pub markdown: String,
}
