use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(TodoId);

/// Lifecycle state of a to-do item.
///
/// `New` is only ever assigned at creation; afterwards the checkbox flips the
/// item between `Done` and `NotDone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TodoStatus {
    #[default]
    #[serde(rename = "new")]
    New,
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "not done")]
    NotDone,
}

impl TodoStatus {
    pub fn from_checked(checked: bool) -> Self {
        if checked {
            Self::Done
        } else {
            Self::NotDone
        }
    }

    pub fn is_done(self) -> bool {
        self == Self::Done
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Done => "done",
            Self::NotDone => "not done",
        }
    }
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: TodoId,
    pub name: String,
    pub status: TodoStatus,
    pub version: u64,
}
