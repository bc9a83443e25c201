use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Model {
    Llama3p1_8bInstant,
    Llama3p3_70bVersatile,
    Custom(String),
}

impl Model {
    pub fn from_name(name: &str) -> Self {
        match name {
            "llama-3.1-8b-instant" => Model::Llama3p1_8bInstant,
            "llama-3.3-70b-versatile" => Model::Llama3p3_70bVersatile,
            other => Model::Custom(other.to_string()),
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Llama3p1_8bInstant
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Model::Llama3p1_8bInstant => "llama-3.1-8b-instant",
                Model::Llama3p3_70bVersatile => "llama-3.3-70b-versatile",
                Model::Custom(name) => name.as_str(),
            }
        )
    }
}
