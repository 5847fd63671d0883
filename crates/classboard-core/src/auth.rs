//! Identity: sign-up, sign-in and role checks.
//!
//! Role checks here run on the client only. Nothing on the storage side
//! enforces them.

use crate::backend::BoxFuture;
use crate::drawing::now_millis;
use crate::error::{BannerSlot, ClassroomError, ClassroomResult};
use serde::{Deserialize, Serialize};

/// Classroom role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Teacher,
}

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

impl UserProfile {
    /// Local part of the email, or "User" when there is none.
    pub fn user_name(&self) -> String {
        match self.email.split('@').next() {
            Some(local) if !local.is_empty() => local.to_string(),
            _ => "User".to_string(),
        }
    }

    /// Display name, falling back to [`UserProfile::user_name`].
    pub fn name_for_display(&self) -> String {
        if self.display_name.trim().is_empty() {
            self.user_name()
        } else {
            self.display_name.clone()
        }
    }

    pub fn is_teacher(&self) -> bool {
        self.role == Role::Teacher
    }
}

/// Identity provider contract.
pub trait IdentityProvider: Send + Sync {
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        role: Role,
    ) -> BoxFuture<'_, ClassroomResult<UserProfile>>;

    fn sign_in(&self, email: &str, password: &str) -> BoxFuture<'_, ClassroomResult<UserProfile>>;

    fn sign_in_with_google(&self) -> BoxFuture<'_, ClassroomResult<UserProfile>>;

    fn sign_out(&self) -> BoxFuture<'_, ClassroomResult<()>>;
}

/// Reject empty email or password.
pub fn validate_credentials(email: &str, password: &str) -> ClassroomResult<()> {
    if email.trim().is_empty() {
        return Err(ClassroomError::Validation("email is required".to_string()));
    }
    if !email.contains('@') {
        return Err(ClassroomError::Validation(format!("invalid email {:?}", email)));
    }
    if password.is_empty() {
        return Err(ClassroomError::Validation("password is required".to_string()));
    }
    Ok(())
}

/// Require a signed-in user holding `role`.
pub fn require_role(user: Option<&UserProfile>, role: Role) -> ClassroomResult<&UserProfile> {
    match user {
        None => Err(ClassroomError::Permission("not signed in".to_string())),
        Some(user) if user.role == role => Ok(user),
        Some(user) => Err(ClassroomError::Permission(format!(
            "{} is not a {:?}",
            user.uid, role
        ))),
    }
}

/// Current sign-in state with its error banner.
#[derive(Debug, Default)]
pub struct AuthState {
    user: Option<UserProfile>,
    banner: BannerSlot,
}

impl AuthState {
    pub fn new(banner: BannerSlot) -> Self {
        Self { user: None, banner }
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn banner(&self) -> &BannerSlot {
        &self.banner
    }

    pub async fn sign_up<P: IdentityProvider + ?Sized>(
        &mut self,
        provider: &P,
        email: &str,
        password: &str,
        display_name: &str,
        role: Role,
    ) -> ClassroomResult<&UserProfile> {
        validate_credentials(email, password)?;
        if display_name.trim().is_empty() {
            return Err(ClassroomError::Validation("display name is required".to_string()));
        }
        let result = provider.sign_up(email, password, display_name, role).await;
        self.settle(result)
    }

    pub async fn sign_in<P: IdentityProvider + ?Sized>(
        &mut self,
        provider: &P,
        email: &str,
        password: &str,
    ) -> ClassroomResult<&UserProfile> {
        validate_credentials(email, password)?;
        let result = provider.sign_in(email, password).await;
        self.settle(result)
    }

    pub async fn sign_in_with_google<P: IdentityProvider + ?Sized>(
        &mut self,
        provider: &P,
    ) -> ClassroomResult<&UserProfile> {
        let result = provider.sign_in_with_google().await;
        self.settle(result)
    }

    pub async fn sign_out<P: IdentityProvider + ?Sized>(&mut self, provider: &P) -> ClassroomResult<()> {
        if let Err(e) = provider.sign_out().await {
            self.banner.raise(&e, now_millis());
            return Err(e);
        }
        log::info!("Signed out");
        self.user = None;
        Ok(())
    }

    fn settle(&mut self, result: ClassroomResult<UserProfile>) -> ClassroomResult<&UserProfile> {
        match result {
            Ok(user) => {
                log::info!("Signed in as {} ({:?})", user.uid, user.role);
                self.banner.dismiss();
                Ok(self.user.insert(user))
            }
            Err(e) => {
                self.banner.raise(&e, now_millis());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryIdentityProvider;
    use pollster::block_on;

    fn teacher() -> UserProfile {
        UserProfile {
            uid: "t1".to_string(),
            email: "ms.frizzle@school.edu".to_string(),
            display_name: "Ms. Frizzle".to_string(),
            role: Role::Teacher,
        }
    }

    #[test]
    fn test_validate_credentials() {
        assert!(validate_credentials("", "pw").is_err());
        assert!(validate_credentials("a@b.c", "").is_err());
        assert!(validate_credentials("nobody", "pw").is_err());
        assert!(validate_credentials("a@b.c", "pw").is_ok());
    }

    #[test]
    fn test_user_name_from_email() {
        let user = teacher();
        assert_eq!(user.user_name(), "ms.frizzle");

        let mut anonymous = teacher();
        anonymous.email = String::new();
        anonymous.display_name = String::new();
        assert_eq!(anonymous.name_for_display(), "User");
    }

    #[test]
    fn test_require_role() {
        let user = teacher();
        assert!(require_role(Some(&user), Role::Teacher).is_ok());
        assert!(matches!(
            require_role(Some(&user), Role::Student),
            Err(ClassroomError::Permission(_))
        ));
        assert!(require_role(None, Role::Teacher).is_err());
    }

    #[test]
    fn test_sign_up_then_sign_in() {
        let provider = MemoryIdentityProvider::new();
        let mut auth = AuthState::default();

        let user = block_on(auth.sign_up(&provider, "ada@school.edu", "secret", "Ada", Role::Teacher))
            .unwrap()
            .clone();
        assert_eq!(user.role, Role::Teacher);

        block_on(auth.sign_out(&provider)).unwrap();
        assert!(auth.user().is_none());

        let again = block_on(auth.sign_in(&provider, "ada@school.edu", "secret")).unwrap();
        assert_eq!(again.uid, user.uid);
    }

    #[test]
    fn test_failed_sign_in_raises_banner() {
        let provider = MemoryIdentityProvider::new();
        let mut auth = AuthState::default();

        let result = block_on(auth.sign_in(&provider, "ghost@school.edu", "pw"));
        assert!(result.is_err());
        assert!(auth.banner().current(now_millis()).is_some());
    }

    #[test]
    fn test_validation_failure_skips_provider_and_banner() {
        let provider = MemoryIdentityProvider::new();
        let mut auth = AuthState::default();

        let result = block_on(auth.sign_in(&provider, "", "pw"));
        assert!(matches!(result, Err(ClassroomError::Validation(_))));
        assert!(auth.banner().current(now_millis()).is_none());
    }

    #[test]
    fn test_google_sign_in_defaults_to_student() {
        let provider = MemoryIdentityProvider::new();
        let mut auth = AuthState::default();
        let user = block_on(auth.sign_in_with_google(&provider)).unwrap();
        assert_eq!(user.role, Role::Student);
    }
}
