use serde::{Deserialize, Serialize};

/// Row of the `bars` table.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Bar {
    pub id: i64,
    /// References `foos.id`; enforced by the remote schema only.
    pub foo_id: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NewBar {
    pub foo_id: i64,
}
