//! File-backed schema store
//!
//! Every `*.json` file under the schemas directory holds one
//! [`EndpointSchema`] or an array of them. The store keeps them in memory
//! keyed by name, writes CRUD changes back to disk and resolves incoming
//! requests to the schema that should answer them.

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::routing::{RoutePattern, method_matches};
use crate::schema::EndpointSchema;
use crate::{log_debug, log_warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid schema name '{0}': use letters, digits, '-' and '_'")]
    InvalidName(String),
    #[error("schema '{0}' not found")]
    NotFound(String),
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode schema '{name}': {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("schema '{0}' no longer matches its file on disk; reload and retry")]
    Stale(String),
}

/// A schema together with the name it is stored under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSchema {
    pub name: String,
    #[serde(flatten)]
    pub schema: EndpointSchema,
}

/// A schema matched against a concrete request
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub stored: StoredSchema,
    pub params: BTreeMap<String, String>,
}

/// Where a schema lives on disk
#[derive(Debug, Clone, PartialEq, Eq)]
struct Origin {
    path: PathBuf,
    /// Position inside an array file; `None` for single-schema files
    index: Option<usize>,
}

struct Entry {
    schema: EndpointSchema,
    pattern: RoutePattern,
    origin: Origin,
}

impl Entry {
    fn new(schema: EndpointSchema, origin: Origin) -> Self {
        let pattern = RoutePattern::parse(&schema.endpoint);
        Self {
            schema,
            pattern,
            origin,
        }
    }
}

/// In-memory view of the schemas directory
pub struct SchemaStore {
    dir: PathBuf,
    entries: BTreeMap<String, Entry>,
}

impl SchemaStore {
    /// Empty store rooted at `dir`; nothing is read
    pub fn empty(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load every schema file under `dir`
    ///
    /// A missing directory is an empty store; unreadable or malformed
    /// files are logged and skipped.
    pub fn load(dir: impl Into<PathBuf>) -> Self {
        let mut store = Self::empty(dir);
        store.reload();
        store
    }

    /// Re-read the directory, replacing the in-memory entries
    pub fn reload(&mut self) -> usize {
        self.entries.clear();
        if !self.dir.is_dir() {
            log_debug!("Schemas directory {} does not exist", self.dir.display());
            return 0;
        }

        let walker = WalkBuilder::new(&self.dir)
            .hidden(true)
            .git_ignore(false)
            .sort_by_file_path(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log_warn!("Skipping unreadable schema entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            self.load_file(path);
        }

        log_debug!(
            "Loaded {} schemas from {}",
            self.entries.len(),
            self.dir.display()
        );
        self.entries.len()
    }

    fn load_file(&mut self, path: &Path) {
        let Some(base) = self.name_for_path(path) else {
            log_warn!("Skipping schema file with unusable name: {}", path.display());
            return;
        };

        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<Value>(&content).map_err(|e| e.to_string())
            })
            .and_then(|value| schemas_from_value(value).map_err(|e| e.to_string()));

        match parsed {
            Ok((schemas, is_array)) => {
                for (index, schema) in schemas.into_iter().enumerate() {
                    let name = if index == 0 {
                        base.clone()
                    } else {
                        format!("{base}-{index}")
                    };
                    let origin = Origin {
                        path: path.to_path_buf(),
                        index: is_array.then_some(index),
                    };
                    log_debug!("Registered {} {} as '{}'", schema.method, schema.endpoint, name);
                    self.entries.insert(name, Entry::new(schema, origin));
                }
            }
            Err(e) => log_warn!("Skipping invalid schema file {}: {}", path.display(), e),
        }
    }

    fn name_for_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.dir).ok()?.with_extension("");
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("-");
        is_valid_name(&name).then_some(name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All schemas in name order
    pub fn list(&self) -> Vec<StoredSchema> {
        self.entries
            .iter()
            .map(|(name, entry)| StoredSchema {
                name: name.clone(),
                schema: entry.schema.clone(),
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<StoredSchema> {
        self.entries.get(name).map(|entry| StoredSchema {
            name: name.to_string(),
            schema: entry.schema.clone(),
        })
    }

    /// Persist `schema` under `name` and register it
    ///
    /// An existing schema is rewritten where it was loaded from, which may be
    /// a nested file or one element of an array file. New names are written
    /// to `<dir>/<name>.json`.
    pub fn save(&mut self, name: &str, schema: EndpointSchema) -> Result<StoredSchema, StoreError> {
        if !is_valid_name(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }

        let origin = match self.entries.get(name) {
            Some(entry) => entry.origin.clone(),
            None => {
                fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
                    path: self.dir.clone(),
                    source,
                })?;
                Origin {
                    path: self.path_for(name),
                    index: None,
                }
            }
        };

        let encoded = serde_json::to_value(&schema).map_err(|source| StoreError::Encode {
            name: name.to_string(),
            source,
        })?;
        match origin.index {
            Some(index) => {
                let mut items = read_array(&origin.path, name)?;
                let slot = items
                    .get_mut(index)
                    .ok_or_else(|| StoreError::Stale(name.to_string()))?;
                *slot = encoded;
                write_value(&origin.path, &Value::Array(items), name)?;
            }
            None => write_value(&origin.path, &encoded, name)?,
        }

        log_debug!("Saved schema '{}' to {}", name, origin.path.display());
        self.entries
            .insert(name.to_string(), Entry::new(schema.clone(), origin));
        Ok(StoredSchema {
            name: name.to_string(),
            schema,
        })
    }

    /// Delete a schema from disk
    ///
    /// Removing one element of an array file rewrites that file and
    /// re-registers its remaining schemas, so their names follow the new
    /// positions just as a reload would.
    pub fn remove(&mut self, name: &str) -> Result<StoredSchema, StoreError> {
        if !is_valid_name(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        let origin = self
            .entries
            .get(name)
            .map(|entry| entry.origin.clone())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        match origin.index {
            Some(index) => {
                let mut items = read_array(&origin.path, name)?;
                if index >= items.len() {
                    return Err(StoreError::Stale(name.to_string()));
                }
                items.remove(index);
                if items.is_empty() {
                    remove_file(&origin.path)?;
                } else {
                    write_value(&origin.path, &Value::Array(items), name)?;
                }
            }
            None => remove_file(&origin.path)?,
        }

        let removed = self
            .entries
            .remove(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        if origin.index.is_some() {
            self.entries.retain(|_, entry| entry.origin.path != origin.path);
            if origin.path.exists() {
                self.load_file(&origin.path);
            }
        }

        log_debug!("Removed schema '{}' from {}", name, origin.path.display());
        Ok(StoredSchema {
            name: name.to_string(),
            schema: removed.schema,
        })
    }

    /// Find the schema answering `method path`
    ///
    /// The pattern with the most literal segments wins; ties go to the
    /// first name in order.
    pub fn resolve(&self, method: &str, path: &str) -> Option<ResolvedRoute> {
        let mut best: Option<(usize, &String, &Entry, BTreeMap<String, String>)> = None;

        for (name, entry) in &self.entries {
            if !method_matches(&entry.schema.method, method) {
                continue;
            }
            let Some(params) = entry.pattern.matches(path) else {
                continue;
            };
            let score = entry.pattern.specificity();
            if best.as_ref().is_none_or(|(best_score, ..)| score > *best_score) {
                best = Some((score, name, entry, params));
            }
        }

        best.map(|(_, name, entry, params)| ResolvedRoute {
            stored: StoredSchema {
                name: name.clone(),
                schema: entry.schema.clone(),
            },
            params,
        })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

/// Slug for a schema saved without an explicit name, e.g. `get-users-id`
pub fn derive_name(schema: &EndpointSchema) -> String {
    let mut name = schema.method.trim().to_lowercase();
    for c in schema.endpoint.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            name.push(c.to_ascii_lowercase());
        } else if !name.ends_with('-') {
            name.push('-');
        }
    }
    let name = name.trim_matches('-').to_string();
    if is_valid_name(&name) {
        name
    } else {
        "endpoint".to_string()
    }
}

pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Schemas in a file, and whether the file holds an array
fn schemas_from_value(value: Value) -> Result<(Vec<EndpointSchema>, bool), serde_json::Error> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .map(|schemas| (schemas, true)),
        other => serde_json::from_value(other).map(|schema| (vec![schema], false)),
    }
}

fn read_array(path: &Path, name: &str) -> Result<Vec<Value>, StoreError> {
    let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match serde_json::from_str(&content) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(StoreError::Stale(name.to_string())),
        Err(source) => Err(StoreError::Decode {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn remove_file(path: &Path) -> Result<(), StoreError> {
    if !path.exists() {
        return Ok(());
    }
    fs::remove_file(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_value(path: &Path, value: &Value, name: &str) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(value).map_err(|source| StoreError::Encode {
        name: name.to_string(),
        source,
    })?;
    fs::write(path, content).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(schema: EndpointSchema) -> Entry {
        Entry::new(
            schema,
            Origin {
                path: PathBuf::from("unused.json"),
                index: None,
            },
        )
    }

    #[test]
    fn test_derive_name() {
        assert_eq!(
            derive_name(&EndpointSchema::new("GET", "/users/:id")),
            "get-users-id"
        );
        assert_eq!(
            derive_name(&EndpointSchema::new("post", "/api/{org}/repos/")),
            "post-api-org-repos"
        );
        assert_eq!(derive_name(&EndpointSchema::new("", "/")), "endpoint");
    }

    #[test]
    fn test_name_validation() {
        assert!(is_valid_name("users-list_2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("../etc/passwd"));
        assert!(!is_valid_name("a b"));
    }

    #[test]
    fn test_resolve_prefers_literal_segments() {
        let mut store = SchemaStore::empty("unused");
        store
            .entries
            .insert("by-id".to_string(), entry(EndpointSchema::new("GET", "/users/:id")));
        store
            .entries
            .insert("me".to_string(), entry(EndpointSchema::new("GET", "/users/me")));

        let me = store.resolve("GET", "/users/me").expect("should resolve");
        assert_eq!(me.stored.name, "me");
        assert!(me.params.is_empty());

        let other = store.resolve("get", "/users/9").expect("should resolve");
        assert_eq!(other.stored.name, "by-id");
        assert_eq!(other.params.get("id").map(String::as_str), Some("9"));

        assert!(store.resolve("DELETE", "/users/9").is_none());
    }

    #[test]
    fn test_stored_schema_flattens() {
        let stored = StoredSchema {
            name: "ping".to_string(),
            schema: EndpointSchema::new("GET", "/ping"),
        };
        assert_eq!(
            serde_json::to_value(&stored).expect("should serialize"),
            serde_json::json!({ "name": "ping", "endpoint": "/ping", "method": "GET" })
        );
    }
}
