#![forbid(unsafe_code)]

pub mod ids {
    /// Record ids are opaque strings chosen by the caller or generated by the
    /// backend. Backends reject ids that would break storage or transport.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum IdError {
        Empty,
        TooLong,
        ContainsControl,
    }

    impl IdError {
        pub fn message(&self) -> &'static str {
            match self {
                Self::Empty => "id must not be empty",
                Self::TooLong => "id is too long",
                Self::ContainsControl => "id contains control characters",
            }
        }
    }

    pub fn validate_id(value: &str) -> Result<(), IdError> {
        if value.is_empty() {
            return Err(IdError::Empty);
        }
        if value.len() > 128 {
            return Err(IdError::TooLong);
        }
        if value.chars().any(|c| c.is_control()) {
            return Err(IdError::ContainsControl);
        }
        Ok(())
    }
}

pub mod model {
    /// The settings record is a singleton; every read and write resolves to
    /// this id.
    pub const SETTINGS_ID: &str = "default";

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Thread {
        pub id: String,
        pub title: String,
        pub created_at: i64,
    }

    /// One node in a thread's forest. `parent_id`, when present, names
    /// another message in the same thread; `root_id` denormalizes the
    /// terminal ancestor of the parent chain.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Message {
        pub id: String,
        pub thread_id: String,
        pub parent_id: Option<String>,
        pub root_id: Option<String>,
        pub role: String,
        pub content: String,
        pub timestamp: i64,
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Settings {
        pub id: String,
        pub provider: String,
        pub endpoint: String,
        pub api_key: String,
        pub model: String,
        pub simulate_only: bool,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                id: SETTINGS_ID.to_string(),
                provider: "ollama".to_string(),
                endpoint: "http://localhost:11434".to_string(),
                api_key: String::new(),
                model: "llama3".to_string(),
                simulate_only: true,
            }
        }
    }
}
