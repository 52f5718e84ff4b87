use serde::{Deserialize, Serialize};

/// Who is using the client. Anonymous users keep everything in local storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Identity {
    Anonymous,
    User { email: String },
}

impl Identity {
    /// Blank or missing emails mean anonymous.
    pub fn from_email(email: Option<&str>) -> Self {
        match email.map(str::trim) {
            Some(e) if !e.is_empty() => Identity::User {
                email: e.to_string(),
            },
            _ => Identity::Anonymous,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Identity::User { email } => Some(email),
            Identity::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::User { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_email_is_anonymous() {
        assert_eq!(Identity::from_email(Some("  ")), Identity::Anonymous);
        assert_eq!(Identity::from_email(None), Identity::Anonymous);
        assert_eq!(
            Identity::from_email(Some("a@b.c")).email(),
            Some("a@b.c")
        );
    }
}
