use std::fmt::Display;

pub struct NiceError {
    content: String,
    hint: Option<String>,
}

impl Display for NiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.hint {
            Some(hint) => write!(f, "{}\nHint: {}", self.content, hint),
            None => write!(f, "{}", self.content),
        }
    }
}

pub trait NiceDisplay {
    fn message(&self) -> String;

    /// A plain-language remedy shown under the message.
    fn hint(&self) -> Option<String> {
        None
    }

    fn to_nice_error(&self) -> NiceError {
        NiceError {
            content: self.message(),
            hint: self.hint(),
        }
    }
}
