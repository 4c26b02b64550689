use serde::{Deserialize, Serialize};

/// User information carried through the authenticated call path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    subject: String,
    email: Option<String>,
    groups: Vec<String>,
    admin: bool,
}

impl UserIdentity {
    /// Creates a user identity from authentication and directory data.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        email: Option<String>,
        groups: Vec<String>,
        admin: bool,
    ) -> Self {
        Self {
            subject: subject.into(),
            email,
            groups,
            admin,
        }
    }

    /// Returns the stable subject claim from the identity provider.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subject.as_str()
    }

    /// Returns the email, if the provider returned one.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the directory groups the user belongs to.
    #[must_use]
    pub fn groups(&self) -> &[String] {
        self.groups.as_slice()
    }

    /// Returns whether the user holds the administrator role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// Returns whether the user belongs to any of the given groups.
    #[must_use]
    pub fn in_any_group(&self, groups: &[String]) -> bool {
        self.groups.iter().any(|group| groups.contains(group))
    }
}

#[cfg(test)]
mod tests {
    use super::UserIdentity;

    #[test]
    fn group_membership_matches_any_overlap() {
        let identity = UserIdentity::new(
            "alice@example.com",
            None,
            vec!["engineering".to_owned()],
            false,
        );

        assert!(identity.in_any_group(&["oncall".to_owned(), "engineering".to_owned()]));
        assert!(!identity.in_any_group(&["finance".to_owned()]));
    }
}
