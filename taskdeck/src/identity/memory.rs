//! In-process identity provider for tests and local runs.
//!
//! Mimics the hosted provider's error codes for the cases the client
//! handles: malformed email, short password, duplicate account, unknown
//! user and wrong password.

use std::collections::HashMap;

use parking_lot::Mutex;

use taskdeck_proto::UserId;

use super::{IdentityProvider, ProfileUpdate, ProviderError, UserProfile};

/// Shortest password the provider accepts.
pub const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    password: String,
    profile: UserProfile,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    current: Option<String>,
    google: Option<UserProfile>,
    next_failure: Option<ProviderError>,
    reset_requests: Vec<String>,
}

impl Inner {
    fn current_account(&mut self) -> Result<&mut Account, ProviderError> {
        let email = self
            .current
            .clone()
            .ok_or_else(|| ProviderError::new("auth/no-current-user", "no user is signed in"))?;
        self.accounts
            .get_mut(&email)
            .ok_or_else(|| ProviderError::new("auth/user-not-found", "account vanished"))
    }
}

/// Identity provider backed by a map of accounts.
#[derive(Default)]
pub struct InMemoryIdentity {
    inner: Mutex<Inner>,
}

impl InMemoryIdentity {
    /// Creates a provider with no accounts and Google sign-in disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables Google sign-in, which then signs in as `profile`.
    #[must_use]
    pub fn with_google_account(self, profile: UserProfile) -> Self {
        self.inner.lock().google = Some(profile);
        self
    }

    /// Makes the next provider call fail with `error`.
    pub fn fail_next(&self, error: ProviderError) {
        self.inner.lock().next_failure = Some(error);
    }

    /// Emails that requested a password reset, in order.
    #[must_use]
    pub fn reset_requests(&self) -> Vec<String> {
        self.inner.lock().reset_requests.clone()
    }

    fn take_failure(inner: &mut Inner) -> Result<(), ProviderError> {
        inner.next_failure.take().map_or(Ok(()), Err)
    }
}

fn check_email(email: &str) -> Result<(), ProviderError> {
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if well_formed {
        Ok(())
    } else {
        Err(ProviderError::new("auth/invalid-email", "the email address is badly formatted"))
    }
}

impl IdentityProvider for InMemoryIdentity {
    fn current_user(&self) -> Option<UserProfile> {
        let inner = self.inner.lock();
        let email = inner.current.as_ref()?;
        inner.accounts.get(email).map(|a| a.profile.clone())
    }

    async fn register(&self, email: &str, password: &str) -> Result<UserProfile, ProviderError> {
        let mut inner = self.inner.lock();
        Self::take_failure(&mut inner)?;
        check_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ProviderError::new(
                "auth/weak-password",
                "password should be at least 6 characters",
            ));
        }
        if inner.accounts.contains_key(email) {
            return Err(ProviderError::new(
                "auth/email-already-in-use",
                "the email address is already in use",
            ));
        }
        let profile = UserProfile {
            uid: UserId::new(uuid::Uuid::now_v7().simple().to_string()),
            email: Some(email.to_string()),
            display_name: None,
            photo_url: None,
        };
        inner.accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                profile: profile.clone(),
            },
        );
        inner.current = Some(email.to_string());
        Ok(profile)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, ProviderError> {
        let mut inner = self.inner.lock();
        Self::take_failure(&mut inner)?;
        check_email(email)?;
        let account = inner
            .accounts
            .get(email)
            .ok_or_else(|| ProviderError::new("auth/user-not-found", "no user record"))?;
        if account.password != password {
            return Err(ProviderError::new("auth/wrong-password", "the password is invalid"));
        }
        let profile = account.profile.clone();
        inner.current = Some(email.to_string());
        Ok(profile)
    }

    async fn sign_in_with_google(&self) -> Result<UserProfile, ProviderError> {
        let mut inner = self.inner.lock();
        Self::take_failure(&mut inner)?;
        let profile = inner.google.clone().ok_or_else(|| {
            ProviderError::new("auth/operation-not-allowed", "google sign-in is disabled")
        })?;
        let key = profile.email.clone().unwrap_or_else(|| profile.uid.to_string());
        inner.accounts.entry(key.clone()).or_insert_with(|| Account {
            password: String::new(),
            profile: profile.clone(),
        });
        inner.current = Some(key);
        Ok(profile)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock();
        Self::take_failure(&mut inner)?;
        inner.current = None;
        Ok(())
    }

    async fn update_profile(&self, update: ProfileUpdate) -> Result<UserProfile, ProviderError> {
        let mut inner = self.inner.lock();
        Self::take_failure(&mut inner)?;
        let account = inner.current_account()?;
        if let Some(name) = update.display_name {
            account.profile.display_name = Some(name);
        }
        if let Some(photo) = update.photo_url {
            account.profile.photo_url = photo;
        }
        Ok(account.profile.clone())
    }

    async fn update_email(&self, email: &str) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock();
        Self::take_failure(&mut inner)?;
        check_email(email)?;
        if inner.accounts.contains_key(email) {
            return Err(ProviderError::new(
                "auth/email-already-in-use",
                "the email address is already in use",
            ));
        }
        let old = inner
            .current
            .clone()
            .ok_or_else(|| ProviderError::new("auth/no-current-user", "no user is signed in"))?;
        let mut account = inner
            .accounts
            .remove(&old)
            .ok_or_else(|| ProviderError::new("auth/user-not-found", "account vanished"))?;
        account.profile.email = Some(email.to_string());
        inner.accounts.insert(email.to_string(), account);
        inner.current = Some(email.to_string());
        Ok(())
    }

    async fn update_password(&self, password: &str) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock();
        Self::take_failure(&mut inner)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ProviderError::new(
                "auth/weak-password",
                "password should be at least 6 characters",
            ));
        }
        inner.current_account()?.password = password.to_string();
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock();
        Self::take_failure(&mut inner)?;
        check_email(email)?;
        if !inner.accounts.contains_key(email) {
            return Err(ProviderError::new("auth/user-not-found", "no user record"));
        }
        inner.reset_requests.push(email.to_string());
        Ok(())
    }
}
