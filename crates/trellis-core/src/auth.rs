//! Authentication seam: the provider trait, local credential checks that
//! run before any network call, and the mapping from raw backend error
//! text to messages a person can act on.

use std::rc::Rc;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::error::ValidationError;
use crate::remote::{OwnerId, SubscriptionHandle};

pub const MIN_PASSWORD_LEN: usize = 6;
const USERNAME_PATTERN: &str = r"^[A-Za-z0-9_]{3,20}$";
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: OwnerId,
    pub email: String,
}

/// Extra profile columns sent with a sign-up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

pub type SessionCallback = Rc<dyn Fn(Option<User>)>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("Invalid email or password. Please try again.")]
    InvalidCredentials,
    #[error("Please check your email and confirm your account first.")]
    EmailNotConfirmed,
    #[error("This email is already registered. Try signing in instead.")]
    AlreadyRegistered,
    #[error("Password must be at least 6 characters long.")]
    WeakPassword,
    #[error("That username is already taken. Please choose another.")]
    UsernameTaken,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    /// Unrecognized backend message, shown as-is.
    #[error("{0}")]
    Other(String),
}

impl AuthFailure {
    /// Map a raw backend error message onto a known failure.
    pub fn classify(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if raw.contains("Invalid login credentials") {
            AuthFailure::InvalidCredentials
        } else if raw.contains("Email not confirmed") {
            AuthFailure::EmailNotConfirmed
        } else if raw.contains("User already registered") {
            AuthFailure::AlreadyRegistered
        } else if raw.contains("Password should be at least") {
            AuthFailure::WeakPassword
        } else if lower.contains("username")
            && (lower.contains("duplicate") || lower.contains("taken") || lower.contains("already"))
        {
            AuthFailure::UsernameTaken
        } else {
            AuthFailure::Other(raw.to_string())
        }
    }

    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

/// Session collaborator. Futures are not `Send`, matching
/// [`crate::remote::RemoteStore`].
#[async_trait(?Send)]
pub trait AuthProvider {
    async fn current_user(&self) -> Result<Option<User>, AuthFailure>;

    /// Returns `None` when the backend requires e-mail confirmation
    /// before a session exists.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: ProfileFields,
    ) -> Result<Option<User>, AuthFailure>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthFailure>;

    async fn sign_out(&self) -> Result<(), AuthFailure>;

    fn on_session_change(&self, callback: SessionCallback) -> SubscriptionHandle;

    fn remove_session_listener(&self, handle: SubscriptionHandle);
}

fn compiled(pattern: &'static str, cell: &'static OnceLock<Option<Regex>>) -> Option<&'static Regex> {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            error!(pattern, error = %err, "internal regex compile failure");
            None
        }
    })
    .as_ref()
}

fn username_regex() -> Option<&'static Regex> {
    static USERNAME: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(USERNAME_PATTERN, &USERNAME)
}

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(EMAIL_PATTERN, &EMAIL)
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    match email_regex() {
        Some(re) if re.is_match(email.trim()) => Ok(()),
        _ => Err(ValidationError::InvalidEmail),
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::WeakPassword {
            min: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    match username_regex() {
        Some(re) if re.is_match(username) => Ok(()),
        _ => Err(ValidationError::InvalidUsername(username.to_string())),
    }
}

/// Checks run before a sign-in or sign-up request is sent.
pub fn validate_credentials(
    email: &str,
    password: &str,
    profile: Option<&ProfileFields>,
) -> Result<(), ValidationError> {
    validate_email(email)?;
    validate_password(password)?;
    if let Some(username) = profile.and_then(|p| p.username.as_deref()) {
        validate_username(username)?;
    }
    Ok(())
}

/// Username given to a profile created without one.
pub fn default_username(user_id: &str) -> String {
    let prefix: String = user_id.chars().take(8).collect();
    format!("user_{prefix}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordStrength {
    Weak,
    Medium,
    Strong,
}

/// Advisory strength meter for the sign-up form. Acceptance only
/// requires [`MIN_PASSWORD_LEN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordReport {
    pub min_length: bool,
    pub has_upper: bool,
    pub has_lower: bool,
    pub has_digit: bool,
    pub has_special: bool,
}

impl PasswordReport {
    pub fn passed(&self) -> usize {
        [
            self.min_length,
            self.has_upper,
            self.has_lower,
            self.has_digit,
            self.has_special,
        ]
        .into_iter()
        .filter(|ok| *ok)
        .count()
    }

    pub fn strength(&self) -> PasswordStrength {
        match self.passed() {
            5 => PasswordStrength::Strong,
            3 | 4 => PasswordStrength::Medium,
            _ => PasswordStrength::Weak,
        }
    }
}

pub fn password_report(password: &str) -> PasswordReport {
    PasswordReport {
        min_length: password.chars().count() >= 8,
        has_upper: password.chars().any(|c| c.is_ascii_uppercase()),
        has_lower: password.chars().any(|c| c.is_ascii_lowercase()),
        has_digit: password.chars().any(|c| c.is_ascii_digit()),
        has_special: password.chars().any(|c| "!@#$%^&*(),.?\":{}|<>".contains(c)),
    }
}
