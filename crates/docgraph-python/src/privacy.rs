//! Privacy classification.
//!
//! How visible an entity should be in the generated documentation. The
//! baseline rule is the naming convention: a leading underscore means
//! private, except for dunder names. User-supplied rules override the
//! baseline: an exact qualified-name match beats a pattern match, and later
//! rules beat earlier ones.
//!
//! Results are cached per qualified name, binding a name to a privacy
//! rather than an entity to a privacy: an entity reparented under a new
//! name is classified afresh while its old name keeps its recorded value.

use serde::{Deserialize, Serialize};

use crate::model::EntityId;
use crate::system::System;

/// How private an entity should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyClass {
    /// Don't show the entity at all.
    Hidden,
    /// Show, but de-emphasize.
    Private,
    /// Show as normal.
    Public,
}

impl System {
    /// How visible this entity should be, from the cache when possible.
    pub fn privacy_class(&mut self, id: EntityId) -> PrivacyClass {
        let full_name = self.full_name(id);
        if let Some(&cached) = self.privacy_cache.get(&full_name) {
            return cached;
        }
        let privacy = self.compute_privacy(id, &full_name);
        self.privacy_cache.insert(full_name, privacy);
        privacy
    }

    fn compute_privacy(&self, id: EntityId, full_name: &str) -> PrivacyClass {
        let entity = &self[id];
        if entity.kind.is_module() && entity.name() == "__main__" {
            return PrivacyClass::Private;
        }

        let name = entity.name();
        let mut privacy = PrivacyClass::Public;
        if name.starts_with('_') && !(name.starts_with("__") && name.ends_with("__")) {
            privacy = PrivacyClass::Private;
        }

        // Later rules take precedence; exact matches beat patterns.
        let mut found_exact = false;
        for (rule_privacy, pattern) in self.privacy_rules.iter().rev() {
            if pattern.as_str() == full_name {
                privacy = *rule_privacy;
                found_exact = true;
                break;
            }
        }
        if !found_exact {
            for (rule_privacy, pattern) in self.privacy_rules.iter().rev() {
                if pattern.matches(full_name) {
                    privacy = *rule_privacy;
                    break;
                }
            }
        }
        privacy
    }

    /// Whether the entity is shown at all. Hiding a scope hides all of its
    /// members.
    pub fn is_visible(&mut self, id: EntityId) -> bool {
        if self.privacy_class(id) == PrivacyClass::Hidden {
            return false;
        }
        match self[id].parent {
            Some(parent) => self.is_visible(parent),
            None => true,
        }
    }

    /// Whether the entity is considered private API.
    pub fn is_private(&mut self, id: EntityId) -> bool {
        self.privacy_class(id) != PrivacyClass::Public
    }

    /// The ownership chain from this entity to its root, visible entries
    /// only, the entity itself first.
    pub fn visible_chain(&mut self, id: EntityId) -> Vec<EntityId> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(entity) = current {
            if self.is_visible(entity) {
                chain.push(entity);
            }
            current = self[entity].parent;
        }
        chain
    }
}
