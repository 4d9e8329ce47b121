use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// One row of the shared users table, corresponding to `IdentityUser`
/// (and its derived `ApplicationUser`) in ASP.NET. Columns that may be
/// NULL in the schema surface as plain empty strings here, with no real
/// loss of functionality.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,                            // primary key (UUID form)
    pub user_name: String,                     // display user name
    pub normalized_user_name: String,          // upper-cased unique lookup key
    pub email: String,                         // email address
    pub normalized_email: String,              // upper-cased email
    pub email_confirmed: bool,                 // has the user confirmed the address?
    #[serde(skip_serializing)]
    pub password_hash: String,                 // salted hash, never exposed in JSON
    #[serde(skip_serializing)]
    pub security_stamp: String,                // rotated whenever credentials change
    pub concurrency_stamp: String,             // rotated on every successful write
    pub phone_number: String,                  // phone number, pass-through
    pub phone_number_confirmed: bool,          // phone number confirmed
    pub two_factor_enabled: bool,              // two-factor auth enabled
    pub lockout_end: Option<OffsetDateTime>,   // UTC end of lockout; past means not locked out
    pub lockout_enabled: bool,                 // can this account be locked out at all?
    pub access_failed_count: i32,              // consecutive failed logins, reset on success
}

/// Upper-case a name or email into the normalized form used as the
/// actual lookup and uniqueness key.
pub(crate) fn normalize(s: &str) -> String {
    s.to_uppercase()
}

/// Fresh unpredictable token, used for IDs and both stamps.
pub(crate) fn new_stamp() -> String {
    Uuid::new_v4().to_string()
}

/// Empty and whitespace-only passwords are equally unacceptable.
pub(crate) fn blank_password(s: &str) -> bool {
    s.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_upper_cases() {
        assert_eq!(normalize("Frodo@Sauron.com"), "FRODO@SAURON.COM");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn stamps_are_distinct() {
        let a = new_stamp();
        let b = new_stamp();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }

    #[test]
    fn blank_password_catches_whitespace() {
        assert!(blank_password(""));
        assert!(blank_password("   \t\n"));
        assert!(!blank_password("woofy"));
        assert!(!blank_password(" x "));
    }
}
