use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl User {
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        let email = email.into();
        let display_name = Some(display_name_from_email(&email));
        Self {
            uid: uid.into(),
            email,
            display_name,
        }
    }

    pub fn display_name(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| display_name_from_email(&self.email))
    }
}

/// The local part of an email address.
pub fn display_name_from_email(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_derived_from_email() {
        let user = User::new("u1", "ada@example.com");
        assert_eq!(user.display_name.as_deref(), Some("ada"));

        let bare = User {
            uid: "u2".to_string(),
            email: "grace@example.com".to_string(),
            display_name: None,
        };
        assert_eq!(bare.display_name(), "grace");
    }
}
