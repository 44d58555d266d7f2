use serde::{Deserialize, Serialize};

/// Configuration for the cats module (`modules.cats.config`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatsConfig {
    /// Upper bound on the number of cats returned by one listing.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_age")]
    pub max_age: u8,
}

impl Default for CatsConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_age: default_max_age(),
        }
    }
}

fn default_page_size() -> usize {
    20
}

fn default_max_age() -> u8 {
    30
}
