//! Interned hierarchical tags.
//!
//! Tags are dot-separated names such as `State.Door.Open`. The core treats
//! them as flat opaque keys; the hierarchy is only consulted by schema
//! lookups that fall back to a parent tag.

use crate::error::StateError;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Separator between tag segments.
const SEPARATOR: char = '.';

fn interner() -> &'static RwLock<HashSet<Arc<str>>> {
    static INTERNER: OnceLock<RwLock<HashSet<Arc<str>>>> = OnceLock::new();
    INTERNER.get_or_init(|| RwLock::new(HashSet::new()))
}

fn intern(name: &str) -> Arc<str> {
    if let Some(existing) = interner().read().get(name) {
        return existing.clone();
    }

    let mut table = interner().write();
    if let Some(existing) = table.get(name) {
        return existing.clone();
    }
    let interned: Arc<str> = Arc::from(name);
    table.insert(interned.clone());
    interned
}

/// An interned tag. Cloning is a reference-count bump.
///
/// The empty tag is the invalid ("none") tag. Mutating APIs reject it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(Option<Arc<str>>);

impl Tag {
    /// Intern a tag. Surrounding whitespace is trimmed; an empty name yields
    /// the invalid tag.
    pub fn new(name: &str) -> Self {
        let name = name.trim();
        if name.is_empty() {
            Tag(None)
        } else {
            Tag(Some(intern(name)))
        }
    }

    /// Strict constructor for names from external input: rejects empty
    /// names, empty segments and embedded whitespace.
    pub fn parse(name: &str) -> crate::error::Result<Self> {
        let well_formed = !name.is_empty()
            && !name.contains(char::is_whitespace)
            && name.split(SEPARATOR).all(|segment| !segment.is_empty());
        if !well_formed {
            return Err(StateError::InvalidTag(name.to_string()));
        }
        Ok(Tag(Some(intern(name))))
    }

    /// The already-interned tag named `name`, without interning it.
    ///
    /// `None` means no tag with that name exists yet, so nothing can be keyed
    /// by it.
    pub fn existing(name: &str) -> Option<Self> {
        interner().read().get(name).map(|name| Tag(Some(name.clone())))
    }

    /// Names of the enclosing tags, innermost first (`A.B.C` -> `A.B`, `A`).
    pub fn ancestor_names(&self) -> impl Iterator<Item = &str> {
        let name = self.as_str();
        name.rmatch_indices(SEPARATOR).map(move |(pos, _)| &name[..pos])
    }

    /// The invalid tag.
    pub const fn none() -> Self {
        Tag(None)
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    pub fn as_str(&self) -> &str {
        self.0.as_deref().unwrap_or("")
    }

    /// The enclosing tag (`A.B.C` -> `A.B`), if any. Interns the parent name;
    /// lookups should prefer [`Tag::ancestor_names`] with [`Tag::existing`].
    pub fn parent(&self) -> Option<Tag> {
        let name = self.0.as_deref()?;
        name.rfind(SEPARATOR).map(|pos| Tag::new(&name[..pos]))
    }

    /// True if this tag equals `other` or is nested below it.
    pub fn matches(&self, other: &Tag) -> bool {
        match (self.0.as_deref(), other.0.as_deref()) {
            (Some(name), Some(parent)) => {
                name == parent
                    || (name.len() > parent.len()
                        && name.starts_with(parent)
                        && name[parent.len()..].starts_with(SEPARATOR))
            }
            _ => false,
        }
    }
}

impl Default for Tag {
    fn default() -> Self {
        Tag::none()
    }
}

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        Tag::new(name)
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Tag::new(&name)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(name) => write!(f, "Tag({})", name),
            None => write!(f, "Tag(None)"),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "<none>"),
        }
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Tag::new(&name))
    }
}
