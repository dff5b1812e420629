use serde::{Deserialize, Serialize};

/// Title the board UI uses for its "Add Column" placeholder.
pub const ADD_COLUMN_TITLE: &str = "Add Column";

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    /// Server identifier of the column
    pub id: String,
    /// Column title
    pub title: String,
    /// Position of the column on the board
    pub order: i64,
}

impl Board {
    /// The "Add Column" affordance is not data and must never be cached or persisted.
    pub fn is_affordance(&self) -> bool {
        self.id.eq_ignore_ascii_case("add-column")
            || self.title.trim().eq_ignore_ascii_case(ADD_COLUMN_TITLE)
    }
}
