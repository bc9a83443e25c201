use std::fmt;

pub const ENV_VAR: &str = "GROQ_API_KEY";

#[derive(Clone)]
pub struct GroqKey {
    key: String,
}

impl GroqKey {
    /// Returns `None` for a blank key so callers can report it as missing.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            None
        } else {
            Some(GroqKey { key })
        }
    }

    pub fn to_header(&self) -> String {
        format!("Bearer {}", self.key)
    }

    /// Groq keys start with `gsk_`; anything else is almost always a pasted
    /// key from another provider.
    pub fn looks_like_groq_key(&self) -> bool {
        self.key.starts_with("gsk_")
    }
}

impl fmt::Debug for GroqKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GroqKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_key_is_rejected() {
        assert!(GroqKey::new("   ").is_none());
    }

    #[test]
    fn debug_output_never_contains_the_key() {
        let key = GroqKey::new("gsk_supersecret").unwrap();
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains("supersecret"));
    }

    #[test]
    fn header_uses_bearer_scheme() {
        let key = GroqKey::new(" gsk_abc ").unwrap();
        assert_eq!(key.to_header(), "Bearer gsk_abc");
        assert!(key.looks_like_groq_key());
    }
}
