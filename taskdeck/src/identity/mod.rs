//! Identity boundary.
//!
//! The [`IdentityProvider`] trait abstracts the hosted sign-in service.
//! [`AuthService`] sits in front of it: it rejects invalid input before any
//! provider call and turns provider error codes into messages fit to show
//! a user.

pub mod memory;

use thiserror::Error;

use taskdeck_proto::UserId;

/// Largest accepted profile image.
pub const MAX_PROFILE_IMAGE_BYTES: u64 = 2 * 1024 * 1024;

/// Accepted profile image content types.
pub const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];

/// The signed-in user as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// Provider-assigned user id; scopes every remote collection.
    pub uid: UserId,
    /// Email address, if the account has one.
    pub email: Option<String>,
    /// Display name.
    pub display_name: Option<String>,
    /// Profile photo URL.
    pub photo_url: Option<String>,
}

/// Profile fields to change. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    /// New display name.
    pub display_name: Option<String>,
    /// New photo URL; `Some(None)` removes the photo.
    pub photo_url: Option<Option<String>>,
}

/// Raw failure reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ProviderError {
    /// Machine-readable code such as `auth/wrong-password`.
    pub code: String,
    /// Provider's own description.
    pub message: String,
}

impl ProviderError {
    /// Builds an error from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Hosted identity service.
pub trait IdentityProvider: Send + Sync {
    /// The currently signed-in user, if any.
    fn current_user(&self) -> Option<UserProfile>;

    /// Creates an email/password account and signs it in.
    fn register(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<UserProfile, ProviderError>> + Send;

    /// Signs in with email and password.
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<UserProfile, ProviderError>> + Send;

    /// Signs in through the Google provider.
    fn sign_in_with_google(
        &self,
    ) -> impl std::future::Future<Output = Result<UserProfile, ProviderError>> + Send;

    /// Signs the current user out.
    fn sign_out(&self) -> impl std::future::Future<Output = Result<(), ProviderError>> + Send;

    /// Changes display name and/or photo of the current user.
    fn update_profile(
        &self,
        update: ProfileUpdate,
    ) -> impl std::future::Future<Output = Result<UserProfile, ProviderError>> + Send;

    /// Changes the current user's email address.
    fn update_email(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = Result<(), ProviderError>> + Send;

    /// Changes the current user's password.
    fn update_password(
        &self,
        password: &str,
    ) -> impl std::future::Future<Output = Result<(), ProviderError>> + Send;

    /// Sends a password reset email.
    fn send_password_reset(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = Result<(), ProviderError>> + Send;
}

/// The user action a provider failure belongs to; selects the fallback
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOperation {
    /// Account creation.
    Register,
    /// Email/password sign-in.
    SignIn,
    /// Google sign-in.
    SignInWithGoogle,
    /// Sign-out.
    SignOut,
    /// Display name or photo change.
    UpdateProfile,
    /// Email change.
    UpdateEmail,
    /// Password change.
    UpdatePassword,
    /// Password reset request.
    ResetPassword,
}

impl AuthOperation {
    const fn fallback(self) -> &'static str {
        match self {
            Self::Register => "Failed to create an account",
            Self::SignIn => "Failed to sign in",
            Self::SignInWithGoogle => "Failed to sign in with Google",
            Self::SignOut => "Failed to sign out",
            Self::UpdateProfile => "Failed to update profile",
            Self::UpdateEmail => "Failed to update email",
            Self::UpdatePassword => "Failed to update password",
            Self::ResetPassword => "Failed to send password reset email",
        }
    }
}

/// User-facing message for a provider error code.
#[must_use]
pub fn translate(op: AuthOperation, code: &str) -> &'static str {
    match (op, code) {
        (AuthOperation::SignInWithGoogle, _) => op.fallback(),
        (_, "auth/email-already-in-use") => "This email is already in use",
        (_, "auth/invalid-email") => "Invalid email address",
        (_, "auth/weak-password") => "Password is too weak",
        (AuthOperation::ResetPassword, "auth/user-not-found") => "No account found with this email",
        (_, "auth/user-not-found" | "auth/wrong-password") => "Invalid email or password",
        _ => op.fallback(),
    }
}

/// Input rejected before reaching the provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Password and confirmation differ.
    #[error("Passwords don't match")]
    PasswordMismatch,
    /// Display name is blank.
    #[error("Display name cannot be empty")]
    EmptyDisplayName,
    /// Email is blank.
    #[error("Email cannot be empty")]
    EmptyEmail,
    /// Image is not JPEG, PNG or GIF.
    #[error("Please select a valid image file (JPEG, PNG, or GIF)")]
    UnsupportedImageType(String),
    /// Image is over [`MAX_PROFILE_IMAGE_BYTES`].
    #[error("Image size must be less than 2MB")]
    ImageTooLarge {
        /// Actual size in bytes.
        size: u64,
    },
}

/// Errors surfaced by [`AuthService`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The input was rejected locally.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The operation needs a signed-in user.
    #[error("You must be signed in")]
    NotSignedIn,

    /// The provider failed; `message` is already user-facing.
    #[error("{message}")]
    Provider {
        /// Original provider code.
        code: String,
        /// Translated message.
        message: &'static str,
    },
}

impl AuthError {
    /// Translates a provider failure for `op`.
    #[must_use]
    pub fn from_provider(op: AuthOperation, err: &ProviderError) -> Self {
        Self::Provider {
            code: err.code.clone(),
            message: translate(op, &err.code),
        }
    }
}

/// Metadata of a profile image chosen for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    /// MIME type.
    pub content_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
}

impl ImageUpload {
    /// Checks type and size.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ImageTooLarge`] or
    /// [`ValidationError::UnsupportedImageType`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.size_bytes > MAX_PROFILE_IMAGE_BYTES {
            return Err(ValidationError::ImageTooLarge {
                size: self.size_bytes,
            });
        }
        if !ALLOWED_IMAGE_TYPES.contains(&self.content_type.as_str()) {
            return Err(ValidationError::UnsupportedImageType(self.content_type.clone()));
        }
        Ok(())
    }
}

/// Validating front for an [`IdentityProvider`].
pub struct AuthService<P> {
    provider: P,
}

impl<P: IdentityProvider> AuthService<P> {
    /// Wraps a provider.
    pub const fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// The signed-in user, if any.
    pub fn current_user(&self) -> Option<UserProfile> {
        self.provider.current_user()
    }

    /// The signed-in user's id, if any.
    pub fn current_uid(&self) -> Option<UserId> {
        self.provider.current_user().map(|u| u.uid)
    }

    /// Creates an account, then sets its display name when one is given.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::PasswordMismatch`] if `confirm` differs
    /// from `password`, or a translated provider error.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        confirm: &str,
        name: Option<&str>,
    ) -> Result<UserProfile, AuthError> {
        if password != confirm {
            return Err(ValidationError::PasswordMismatch.into());
        }
        let mut profile = self
            .provider
            .register(email.trim(), password)
            .await
            .map_err(|e| fail(AuthOperation::Register, &e))?;
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            profile = self
                .provider
                .update_profile(ProfileUpdate {
                    display_name: Some(name.to_string()),
                    photo_url: None,
                })
                .await
                .map_err(|e| fail(AuthOperation::Register, &e))?;
        }
        tracing::info!(uid = %profile.uid, "account created");
        Ok(profile)
    }

    /// Signs in with email and password.
    ///
    /// # Errors
    ///
    /// Returns a translated provider error.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, AuthError> {
        let profile = self
            .provider
            .sign_in(email.trim(), password)
            .await
            .map_err(|e| fail(AuthOperation::SignIn, &e))?;
        tracing::info!(uid = %profile.uid, "signed in");
        Ok(profile)
    }

    /// Signs in through Google.
    ///
    /// # Errors
    ///
    /// Returns a translated provider error.
    pub async fn sign_in_with_google(&self) -> Result<UserProfile, AuthError> {
        self.provider
            .sign_in_with_google()
            .await
            .map_err(|e| fail(AuthOperation::SignInWithGoogle, &e))
    }

    /// Signs out.
    ///
    /// # Errors
    ///
    /// Returns a translated provider error.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.provider
            .sign_out()
            .await
            .map_err(|e| fail(AuthOperation::SignOut, &e))
    }

    /// Changes the display name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyDisplayName`], [`AuthError::NotSignedIn`]
    /// or a translated provider error.
    pub async fn update_display_name(&self, name: &str) -> Result<UserProfile, AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyDisplayName.into());
        }
        self.require_user()?;
        self.provider
            .update_profile(ProfileUpdate {
                display_name: Some(name.to_string()),
                photo_url: None,
            })
            .await
            .map_err(|e| fail(AuthOperation::UpdateProfile, &e))
    }

    /// Sets the profile photo after checking the image that was uploaded
    /// to `url`.
    ///
    /// # Errors
    ///
    /// Returns an image validation error, [`AuthError::NotSignedIn`] or a
    /// translated provider error.
    pub async fn update_photo(
        &self,
        image: &ImageUpload,
        url: &str,
    ) -> Result<UserProfile, AuthError> {
        image.validate()?;
        self.require_user()?;
        self.provider
            .update_profile(ProfileUpdate {
                display_name: None,
                photo_url: Some(Some(url.to_string())),
            })
            .await
            .map_err(|e| fail(AuthOperation::UpdateProfile, &e))
    }

    /// Removes the profile photo.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotSignedIn`] or a translated provider error.
    pub async fn remove_photo(&self) -> Result<UserProfile, AuthError> {
        self.require_user()?;
        self.provider
            .update_profile(ProfileUpdate {
                display_name: None,
                photo_url: Some(None),
            })
            .await
            .map_err(|e| fail(AuthOperation::UpdateProfile, &e))
    }

    /// Changes the email address.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyEmail`], [`AuthError::NotSignedIn`]
    /// or a translated provider error.
    pub async fn update_email(&self, email: &str) -> Result<(), AuthError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ValidationError::EmptyEmail.into());
        }
        self.require_user()?;
        self.provider
            .update_email(email)
            .await
            .map_err(|e| fail(AuthOperation::UpdateEmail, &e))
    }

    /// Changes the password after checking the confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::PasswordMismatch`],
    /// [`AuthError::NotSignedIn`] or a translated provider error.
    pub async fn change_password(&self, password: &str, confirm: &str) -> Result<(), AuthError> {
        if password != confirm {
            return Err(ValidationError::PasswordMismatch.into());
        }
        self.require_user()?;
        self.provider
            .update_password(password)
            .await
            .map_err(|e| fail(AuthOperation::UpdatePassword, &e))
    }

    /// Requests a password reset email.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyEmail`] or a translated provider
    /// error.
    pub async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ValidationError::EmptyEmail.into());
        }
        self.provider
            .send_password_reset(email)
            .await
            .map_err(|e| fail(AuthOperation::ResetPassword, &e))
    }

    fn require_user(&self) -> Result<UserProfile, AuthError> {
        self.provider.current_user().ok_or(AuthError::NotSignedIn)
    }
}

fn fail(op: AuthOperation, err: &ProviderError) -> AuthError {
    tracing::warn!(operation = ?op, code = %err.code, message = %err.message, "identity provider error");
    AuthError::from_provider(op, err)
}
