// Category Entity - top of the Category → Product → Sale chain

use serde::{Deserialize, Serialize};

/// Category record. `id` identifies exactly one category at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

impl Category {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Category {
            id,
            name: name.into(),
        }
    }
}
