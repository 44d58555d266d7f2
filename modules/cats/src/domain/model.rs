use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cat {
    pub id: u32,
    pub name: String,
    pub age: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,
}

/// Data for a cat that has no id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCat {
    pub name: String,
    pub age: u8,
    #[serde(default)]
    pub breed: Option<String>,
}

impl NewCat {
    pub fn new(name: impl Into<String>, age: u8) -> Self {
        Self {
            name: name.into(),
            age,
            breed: None,
        }
    }

    pub fn with_breed(mut self, breed: impl Into<String>) -> Self {
        self.breed = Some(breed.into());
        self
    }
}
