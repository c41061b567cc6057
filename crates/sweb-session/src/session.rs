//! Session handle.

use std::sync::Arc;

use crate::attributes::Attributes;

/// A session: an identifier and its attribute bag.
///
/// Cloning is cheap; all clones share the same attributes.
#[derive(Debug, Clone)]
pub struct Session {
    attributes: Arc<Attributes>,
}

impl Session {
    /// Wrap an attribute bag. The session id is the bag's id.
    pub fn new(attributes: Attributes) -> Self {
        Self {
            attributes: Arc::new(attributes),
        }
    }

    pub fn id(&self) -> &str {
        self.attributes.sid()
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Whether two handles refer to the same session instance.
    pub fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.attributes, &other.attributes)
    }
}
