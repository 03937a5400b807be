use serde::{Deserialize, Serialize};

/// Row of the `foos` table.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Foo {
    pub id: i64,
    pub title: String,
    /// ISO date, `YYYY-MM-DD`.
    pub date: String,
}

/// Insert payload for `foos`; the id is assigned by the server.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NewFoo {
    pub title: String,
    pub date: String,
}
