//! Profile documents
//!
//! A profile document maps unit type names to sections of named instances.
//! The reserved top-level `parents` key lists other profiles whose documents
//! are merged underneath this one.

use crate::error::{Error, Result};
use crate::types::Declaration;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Reserved top-level key listing parent profiles.
pub const PARENTS_KEY: &str = "parents";

/// Maximum parent chain length.
pub const MAX_PARENT_DEPTH: usize = 32;

/// File extensions recognised as profile documents, in lookup order.
pub const EXTENSIONS: &[&str] = &["yml", "yaml", "toml", "json"];

/// Where profile documents come from.
pub trait ProfileSource: Send + Sync {
    /// Read a profile document; `Ok(None)` when no such profile exists.
    fn read(&self, name: &str) -> Result<Option<Value>>;

    /// Names of every available profile, sorted.
    fn list(&self) -> Result<Vec<String>>;
}

/// Profiles stored as files under one or more directories.
///
/// Profile `web/base` is looked up as `<root>/web/base.{yml,yaml,toml,json}`
/// in each root, first match wins.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    roots: Vec<PathBuf>,
}

impl DirectorySource {
    /// Create a source over the given roots
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    /// Search roots
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Path of the first file backing a profile
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        self.roots.iter().find_map(|root| {
            EXTENSIONS
                .iter()
                .map(|ext| root.join(format!("{name}.{ext}")))
                .find(|path| path.is_file())
        })
    }
}

impl ProfileSource for DirectorySource {
    fn read(&self, name: &str) -> Result<Option<Value>> {
        let Some(path) = self.locate(name) else {
            return Ok(None);
        };
        log::debug!("Loading profile '{}' from {}", name, path.display());
        load_file(&path).map(Some)
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for root in &self.roots {
            if !root.is_dir() {
                continue;
            }
            for entry in WalkDir::new(root).follow_links(true).into_iter().filter_map(|e| e.ok()) {
                let path = entry.path();
                let is_document = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| EXTENSIONS.contains(&e));
                if !entry.file_type().is_file() || !is_document {
                    continue;
                }
                if let Ok(relative) = path.with_extension("").strip_prefix(root) {
                    let name = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    names.push(name);
                }
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Profiles held in memory, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    documents: BTreeMap<String, Value>,
}

impl MemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, document: Value) -> Self {
        self.documents.insert(name.into(), document);
        self
    }
}

impl ProfileSource for MemorySource {
    fn read(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.documents.get(name).cloned())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.documents.keys().cloned().collect())
    }
}

/// Parse a document, choosing the format from the file extension.
pub fn load_file(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    parse_document(path, extension, &text)
}

/// Parse document text in the given format (`yml`, `yaml`, `toml` or `json`).
pub fn parse_document(path: &Path, format: &str, text: &str) -> Result<Value> {
    let parse_error = |message: String| Error::Parse {
        path: path.to_path_buf(),
        message,
    };

    let value: Value = match format {
        "yml" | "yaml" => serde_yaml::from_str(text).map_err(|e| parse_error(e.to_string()))?,
        "toml" => toml::from_str(text).map_err(|e| parse_error(e.to_string()))?,
        "json" => serde_json::from_str(text).map_err(|e| parse_error(e.to_string()))?,
        other => return Err(parse_error(format!("unsupported document format '{other}'"))),
    };

    match value {
        Value::Null => Ok(Value::Object(Declaration::new())),
        Value::Object(_) => Ok(value),
        other => Err(parse_error(format!("document root must be a mapping, got {other}"))),
    }
}

/// Recursively merge `overlay` into `base`; overlay wins at every depth.
///
/// Mappings merge key by key. Any other overlay value replaces the base value.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// A loaded profile with its parent chain merged in
#[derive(Debug, Clone)]
pub struct Profile {
    name: String,
    chain: Vec<String>,
    document: Declaration,
}

impl Profile {
    /// Load a profile and merge its parents.
    ///
    /// Parents merge in declaration order (later parents override earlier
    /// ones) and the child overrides them all. Missing parents are an error
    /// unless `ignore_missing` is set; the profile itself must exist.
    pub fn load(source: &dyn ProfileSource, name: &str, ignore_missing: bool) -> Result<Self> {
        let mut chain = Vec::new();
        let mut stack = Vec::new();
        let document = resolve(source, name, ignore_missing, &mut stack, &mut chain)?
            .ok_or_else(|| Error::ProfileNotFound {
                name: name.to_string(),
            })?;

        let Value::Object(document) = document else {
            return Err(Error::Parse {
                path: PathBuf::from(name),
                message: "document root must be a mapping".to_string(),
            });
        };

        Ok(Self {
            name: name.to_string(),
            chain,
            document,
        })
    }

    /// Build a profile from an already merged document (its `parents` key is dropped)
    pub fn from_document(name: impl Into<String>, document: Declaration) -> Self {
        let name = name.into();
        Self {
            chain: vec![name.clone()],
            name,
            document: without_parents(&document),
        }
    }

    /// Profile name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every profile merged into this one, parents first, this profile last
    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// Effective document
    pub fn document(&self) -> &Declaration {
        &self.document
    }

    /// Unit type names declared, in document order
    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.document.keys().map(String::as_str)
    }

    /// Section for one unit type
    pub fn section(&self, unit: &str) -> Option<&Value> {
        self.document.get(unit)
    }
}

fn without_parents(document: &Declaration) -> Declaration {
    document
        .iter()
        .filter(|(k, _)| k.as_str() != PARENTS_KEY)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn parent_names(document: &Declaration) -> Result<Vec<String>> {
    match document.get(PARENTS_KEY) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(name)) => Ok(vec![name.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(name) => Ok(name.clone()),
                other => Err(Error::ParentChain {
                    chain: format!("parent names must be strings, got {other}"),
                }),
            })
            .collect(),
        Some(other) => Err(Error::ParentChain {
            chain: format!("'{PARENTS_KEY}' must be a list of profile names, got {other}"),
        }),
    }
}

fn resolve(
    source: &dyn ProfileSource,
    name: &str,
    ignore_missing: bool,
    stack: &mut Vec<String>,
    chain: &mut Vec<String>,
) -> Result<Option<Value>> {
    if stack.iter().any(|n| n == name) {
        return Err(Error::ParentChain {
            chain: format!("{} -> {}", stack.join(" -> "), name),
        });
    }
    if stack.len() >= MAX_PARENT_DEPTH {
        return Err(Error::ParentChain {
            chain: format!("more than {MAX_PARENT_DEPTH} levels below '{}'", stack[0]),
        });
    }

    let Some(document) = source.read(name)? else {
        return Ok(None);
    };
    let Value::Object(document) = document else {
        return Err(Error::Parse {
            path: PathBuf::from(name),
            message: "document root must be a mapping".to_string(),
        });
    };

    stack.push(name.to_string());
    let mut merged = Value::Object(Declaration::new());
    for parent in parent_names(&document)? {
        match resolve(source, &parent, ignore_missing, stack, chain)? {
            Some(parent_document) => deep_merge(&mut merged, &parent_document),
            None if ignore_missing => {
                log::warn!("Parent profile '{}' of '{}' not found, skipping", parent, name);
            }
            None => return Err(Error::ProfileNotFound { name: parent }),
        }
    }
    stack.pop();

    deep_merge(&mut merged, &Value::Object(without_parents(&document)));
    chain.push(name.to_string());
    Ok(Some(merged))
}
