//! Session identity: the (account, application, user) triple a turn is bound to.

use std::fmt;

use serde::Serialize;

use crate::session::SessionError;

/// Longest identifier accepted for any identity field.
pub const MAX_IDENTIFIER_LEN: usize = 256;

/// Immutable identity a chat turn runs under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionIdentity {
    account: String,
    application: String,
    user: String,
}

impl SessionIdentity {
    /// Validate and bind the three identifiers. No I/O happens here.
    pub fn new(
        account: impl Into<String>,
        application: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<Self, SessionError> {
        let identity = Self {
            account: account.into(),
            application: application.into(),
            user: user.into(),
        };
        validate("account", &identity.account)?;
        validate("application", &identity.application)?;
        validate("user", &identity.user)?;
        Ok(identity)
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.account, self.application, self.user)
    }
}

fn validate(field: &str, value: &str) -> Result<(), SessionError> {
    if value.is_empty() {
        return Err(SessionError::InvalidIdentity(format!("{field} is empty")));
    }
    if value.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(SessionError::InvalidIdentity(format!(
            "{field} exceeds {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    if value.trim() != value {
        return Err(SessionError::InvalidIdentity(format!(
            "{field} has surrounding whitespace"
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(SessionError::InvalidIdentity(format!(
            "{field} contains control characters"
        )));
    }
    Ok(())
}
