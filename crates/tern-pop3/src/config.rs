use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Pop3Config {
    /// Greeting text; defaults to `"POP3 server ready"`.
    #[serde(default)]
    pub greeting: Option<String>,
}

impl Pop3Config {
    pub fn greeting(&self) -> String {
        self.greeting
            .clone()
            .unwrap_or_else(|| "POP3 server ready".to_string())
    }
}
