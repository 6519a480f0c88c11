use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthSession, ChangePasswordRequest, LoginRequest, PublicUser, SignupRequest,
            UpdateProfileRequest,
        },
        jwt::JwtKeys,
        password::{hash_password, is_strong_enough, verify_dummy, verify_password},
        repo::UserRepository,
        repo_types::NewUser,
    },
    error::AppError,
};

pub const MAX_EMAIL_LEN: usize = 120;
pub const MAX_NAME_LEN: usize = 50;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[^@\s]+@[^@\s]+\.[a-zA-Z]{2,}$").expect("email regex compiles");
    }
    EMAIL_RE.is_match(email)
}

fn validate_email(email: &str) -> Result<(), AppError> {
    if !is_valid_email(email) {
        warn!(email, "invalid email");
        return Err(AppError::InvalidEmail);
    }
    check_len("email", email, MAX_EMAIL_LEN)
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), AppError> {
    if value.chars().count() > max {
        warn!(field, "field too long");
        return Err(AppError::FieldTooLong { field, max });
    }
    Ok(())
}

fn check_name(field: &'static str, value: Option<&str>) -> Result<(), AppError> {
    match value {
        Some(v) => check_len(field, v, MAX_NAME_LEN),
        None => Ok(()),
    }
}

/// Empty strings count as missing.
fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Use cases of the account API. Cheap to share behind an `Arc`.
pub struct AccountService {
    repo: Arc<dyn UserRepository>,
    keys: JwtKeys,
}

impl AccountService {
    pub fn new(repo: Arc<dyn UserRepository>, keys: JwtKeys) -> Self {
        Self { repo, keys }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    #[instrument(skip(self, req))]
    pub async fn signup(&self, req: SignupRequest) -> Result<AuthSession, AppError> {
        let (Some(email), Some(password)) = (required(req.email), required(req.password)) else {
            return Err(AppError::MissingField("Email and password are required"));
        };
        validate_email(&email)?;
        if !is_strong_enough(&password) {
            warn!("password too short");
            return Err(AppError::WeakPassword(
                "Password must be at least 6 characters long",
            ));
        }
        check_name("first_name", req.first_name.as_deref())?;
        check_name("last_name", req.last_name.as_deref())?;

        // Early answer only; the store's constraint is what settles races.
        if self.repo.find_by_email(&email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AppError::DuplicateEmail);
        }

        let password_hash = hash_password(&password)?;
        let user = self
            .repo
            .create_user(NewUser {
                email,
                password_hash,
                first_name: req.first_name,
                last_name: req.last_name,
            })
            .await
            .map_err(|e| {
                warn!(error = %e, "create user failed");
                AppError::from(e)
            })?;

        let access_token = self.keys.issue(user.id)?;
        info!(user_id = user.id, email = %user.email, "user registered");
        Ok(AuthSession {
            user: PublicUser::from(&user),
            access_token,
        })
    }

    #[instrument(skip(self, req))]
    pub async fn login(&self, req: LoginRequest) -> Result<AuthSession, AppError> {
        let (Some(email), Some(password)) = (required(req.email), required(req.password)) else {
            return Err(AppError::MissingField("Email and password are required"));
        };

        let Some(user) = self.repo.find_by_email(&email).await? else {
            verify_dummy(&password);
            warn!(email = %email, "login unknown email");
            return Err(AppError::InvalidCredentials("Invalid email or password"));
        };

        if !verify_password(&password, &user.password_hash)? {
            warn!(user_id = user.id, "login invalid password");
            return Err(AppError::InvalidCredentials("Invalid email or password"));
        }

        if !user.is_active {
            warn!(user_id = user.id, "login on deactivated account");
            return Err(AppError::AccountDeactivated);
        }

        let access_token = self.keys.issue(user.id)?;
        info!(user_id = user.id, "user logged in");
        Ok(AuthSession {
            user: PublicUser::from(&user),
            access_token,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_profile(&self, user_id: i64) -> Result<PublicUser, AppError> {
        let user = self
            .repo
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::UserNotFound)?;
        Ok(PublicUser::from(&user))
    }

    #[instrument(skip(self, req))]
    pub async fn update_profile(
        &self,
        user_id: i64,
        req: UpdateProfileRequest,
    ) -> Result<PublicUser, AppError> {
        let mut user = self
            .repo
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::UserNotFound)?;

        if req.is_empty() {
            return Err(AppError::NoData);
        }

        if let Some(first_name) = req.first_name {
            check_name("first_name", first_name.as_deref())?;
            user.first_name = first_name;
        }
        if let Some(last_name) = req.last_name {
            check_name("last_name", last_name.as_deref())?;
            user.last_name = last_name;
        }
        if let Some(email) = req.email {
            validate_email(&email)?;
            if let Some(owner) = self.repo.find_by_email(&email).await? {
                if owner.id != user.id {
                    warn!(user_id, email = %email, "email owned by another user");
                    return Err(AppError::DuplicateEmail);
                }
            }
            user.email = email;
        }

        self.repo.save(&user).await?;
        info!(user_id, "profile updated");
        Ok(PublicUser::from(&user))
    }

    #[instrument(skip(self, req))]
    pub async fn change_password(
        &self,
        user_id: i64,
        req: ChangePasswordRequest,
    ) -> Result<(), AppError> {
        let mut user = self
            .repo
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::UserNotFound)?;

        let (Some(current), Some(new)) =
            (required(req.current_password), required(req.new_password))
        else {
            return Err(AppError::MissingField(
                "Current password and new password are required",
            ));
        };

        if !verify_password(&current, &user.password_hash)? {
            warn!(user_id, "change password with wrong current password");
            return Err(AppError::InvalidCredentials("Current password is incorrect"));
        }
        if !is_strong_enough(&new) {
            return Err(AppError::WeakPassword(
                "New password must be at least 6 characters long",
            ));
        }

        user.password_hash = hash_password(&new)?;
        self.repo.save(&user).await?;
        info!(user_id, "password changed");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_users(&self, user_id: i64) -> Result<Vec<PublicUser>, AppError> {
        let users = self.repo.list().await?;
        Ok(users.iter().map(PublicUser::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{
            memory::InMemoryUserRepository,
            repo_types::{RepoError, User},
        },
        config::JwtConfig,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;

    fn keys() -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: "test-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 60 * 24,
        })
    }

    fn service() -> (AccountService, Arc<InMemoryUserRepository>) {
        let repo = Arc::new(InMemoryUserRepository::new());
        (AccountService::new(repo.clone(), keys()), repo)
    }

    fn signup_req(email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            email: Some(email.into()),
            password: Some(password.into()),
            ..Default::default()
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    async fn stored(repo: &InMemoryUserRepository, id: i64) -> User {
        repo.find_by_id(id).await.unwrap().unwrap()
    }

    #[test]
    fn email_syntax() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("first.last+tag@sub.example.org"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a@b.c"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email("@b.com"));
        assert!(!is_valid_email("a@b.c0m"));
        assert!(!is_valid_email(""));
    }

    #[tokio::test]
    async fn signup_creates_active_user_and_token() {
        let (svc, repo) = service();
        let mut req = signup_req("a@b.com", "secret1");
        req.first_name = Some("Ada".into());
        let session = svc.signup(req).await.unwrap();

        assert_eq!(session.user.email, "a@b.com");
        assert_eq!(session.user.first_name.as_deref(), Some("Ada"));
        assert!(session.user.is_active);
        assert_eq!(svc.keys().verify(&session.access_token), Ok(session.user.id));

        let user = stored(&repo, session.user.id).await;
        assert_ne!(user.password_hash, "secret1");
        assert!(verify_password("secret1", &user.password_hash).unwrap());
    }

    #[tokio::test]
    async fn signup_validates_before_writing() {
        let (svc, repo) = service();

        let err = svc.signup(signup_req("", "secret1")).await.unwrap_err();
        assert!(matches!(err, AppError::MissingField(_)));

        let err = svc
            .signup(SignupRequest {
                email: Some("a@b.com".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingField(_)));

        let err = svc.signup(signup_req("not-an-email", "secret1")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidEmail));

        let err = svc.signup(signup_req("a@b.com", "12345")).await.unwrap_err();
        assert!(matches!(err, AppError::WeakPassword(_)));

        let mut long_name = signup_req("a@b.com", "secret1");
        long_name.last_name = Some("x".repeat(MAX_NAME_LEN + 1));
        let err = svc.signup(long_name).await.unwrap_err();
        assert!(matches!(err, AppError::FieldTooLong { field: "last_name", .. }));

        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn signup_twice_is_duplicate() {
        let (svc, _) = service();
        svc.signup(signup_req("a@b.com", "secret1")).await.unwrap();
        let err = svc.signup(signup_req("a@b.com", "other-pass")).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));
    }

    /// Store whose email lookup always misses, as if every signup raced past
    /// the advisory check at the same moment.
    struct BlindLookup {
        inner: InMemoryUserRepository,
        creates: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl UserRepository for BlindLookup {
        async fn create_user(&self, new_user: NewUser) -> Result<User, RepoError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.inner.create_user(new_user).await
        }
        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, RepoError> {
            Ok(None)
        }
        async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
            self.inner.find_by_id(id).await
        }
        async fn save(&self, user: &User) -> Result<(), RepoError> {
            self.inner.save(user).await
        }
        async fn list(&self) -> Result<Vec<User>, RepoError> {
            self.inner.list().await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_signups_with_same_email_create_one_user() {
        let repo = Arc::new(BlindLookup {
            inner: InMemoryUserRepository::new(),
            creates: AtomicUsize::new(0),
        });
        let svc = Arc::new(AccountService::new(repo.clone(), keys()));
        let barrier = Arc::new(Barrier::new(2));

        let tasks: Vec<_> = ["secret1", "secret2"]
            .into_iter()
            .map(|password| {
                let svc = svc.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    svc.signup(signup_req("race@b.com", password)).await
                })
            })
            .collect();
        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let dup = results
            .iter()
            .filter(|r| matches!(r, Err(AppError::DuplicateEmail)))
            .count();
        assert_eq!((ok, dup), (1, 1));
        // both reached the store; its uniqueness check decided
        assert_eq!(repo.creates.load(Ordering::SeqCst), 2);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn login_success_issues_token() {
        let (svc, _) = service();
        let created = svc.signup(signup_req("a@b.com", "secret1")).await.unwrap();
        let session = svc.login(login_req("a@b.com", "secret1")).await.unwrap();
        assert_eq!(session.user.id, created.user.id);
        assert_eq!(svc.keys().verify(&session.access_token), Ok(created.user.id));
    }

    #[tokio::test]
    async fn login_failures_look_the_same() {
        let (svc, _) = service();
        svc.signup(signup_req("a@b.com", "secret1")).await.unwrap();

        let wrong = svc.login(login_req("a@b.com", "wrong-pass")).await.unwrap_err();
        let unknown = svc.login(login_req("nobody@b.com", "secret1")).await.unwrap_err();
        assert_eq!(wrong.code(), unknown.code());
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_requires_both_fields() {
        let (svc, _) = service();
        let err = svc
            .login(LoginRequest {
                email: Some("a@b.com".into()),
                password: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingField(_)));
    }

    #[tokio::test]
    async fn login_blocks_deactivated_account() {
        let (svc, repo) = service();
        let created = svc.signup(signup_req("a@b.com", "secret1")).await.unwrap();
        let mut user = stored(&repo, created.user.id).await;
        user.is_active = false;
        repo.save(&user).await.unwrap();

        let err = svc.login(login_req("a@b.com", "secret1")).await.unwrap_err();
        assert!(matches!(err, AppError::AccountDeactivated));

        // wrong password still reads as bad credentials
        let err = svc.login(login_req("a@b.com", "nope-nope")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials(_)));
    }

    #[tokio::test]
    async fn get_profile_of_missing_user() {
        let (svc, _) = service();
        let err = svc.get_profile(77).await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound));
    }

    #[tokio::test]
    async fn update_profile_changes_only_given_fields() {
        let (svc, _) = service();
        let mut req = signup_req("a@b.com", "secret1");
        req.first_name = Some("Ada".into());
        req.last_name = Some("Lovelace".into());
        let id = svc.signup(req).await.unwrap().user.id;

        let updated = svc
            .update_profile(
                id,
                UpdateProfileRequest {
                    first_name: Some(Some("Augusta".into())),
                    last_name: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.first_name.as_deref(), Some("Augusta"));
        assert_eq!(updated.last_name, None);
        assert_eq!(updated.email, "a@b.com");

        let reread = svc.get_profile(id).await.unwrap();
        assert_eq!(reread.first_name.as_deref(), Some("Augusta"));
    }

    #[tokio::test]
    async fn update_profile_email_rules() {
        let (svc, _) = service();
        let id = svc.signup(signup_req("a@b.com", "secret1")).await.unwrap().user.id;
        svc.signup(signup_req("taken@b.com", "secret1")).await.unwrap();

        let err = svc
            .update_profile(
                id,
                UpdateProfileRequest {
                    email: Some("bad".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidEmail));

        let err = svc
            .update_profile(
                id,
                UpdateProfileRequest {
                    email: Some("taken@b.com".into()),
                    first_name: Some(Some("Ignored".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));
        assert_eq!(svc.get_profile(id).await.unwrap().first_name, None);

        // keeping one's own address is fine
        let same = svc
            .update_profile(
                id,
                UpdateProfileRequest {
                    email: Some("a@b.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(same.email, "a@b.com");

        let moved = svc
            .update_profile(
                id,
                UpdateProfileRequest {
                    email: Some("new@b.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.email, "new@b.com");
        assert!(svc.login(login_req("new@b.com", "secret1")).await.is_ok());
    }

    #[tokio::test]
    async fn update_profile_needs_some_field() {
        let (svc, _) = service();
        let id = svc.signup(signup_req("a@b.com", "secret1")).await.unwrap().user.id;
        let err = svc
            .update_profile(id, UpdateProfileRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoData));

        let err = svc
            .update_profile(999, UpdateProfileRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UserNotFound));
    }

    #[tokio::test]
    async fn change_password_replaces_hash() {
        let (svc, repo) = service();
        let id = svc.signup(signup_req("a@b.com", "secret1")).await.unwrap().user.id;
        svc.change_password(
            id,
            ChangePasswordRequest {
                current_password: Some("secret1".into()),
                new_password: Some("secret2".into()),
            },
        )
        .await
        .unwrap();

        let user = stored(&repo, id).await;
        assert!(verify_password("secret2", &user.password_hash).unwrap());
        assert!(svc.login(login_req("a@b.com", "secret1")).await.is_err());
        assert!(svc.login(login_req("a@b.com", "secret2")).await.is_ok());
    }

    #[tokio::test]
    async fn change_password_with_wrong_current_keeps_hash() {
        let (svc, repo) = service();
        let id = svc.signup(signup_req("a@b.com", "secret1")).await.unwrap().user.id;
        let before = stored(&repo, id).await.password_hash;

        let err = svc
            .change_password(
                id,
                ChangePasswordRequest {
                    current_password: Some("not-it".into()),
                    new_password: Some("secret2".into()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials(_)));
        assert_eq!(stored(&repo, id).await.password_hash, before);
    }

    #[tokio::test]
    async fn change_password_rejects_weak_or_missing() {
        let (svc, repo) = service();
        let id = svc.signup(signup_req("a@b.com", "secret1")).await.unwrap().user.id;
        let before = stored(&repo, id).await.password_hash;

        let err = svc
            .change_password(
                id,
                ChangePasswordRequest {
                    current_password: Some("secret1".into()),
                    new_password: Some("short".into()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::WeakPassword(_)));

        let err = svc
            .change_password(
                id,
                ChangePasswordRequest {
                    current_password: Some("secret1".into()),
                    new_password: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingField(_)));
        assert_eq!(stored(&repo, id).await.password_hash, before);
    }

    #[tokio::test]
    async fn list_users_returns_every_profile() {
        let (svc, _) = service();
        let id = svc.signup(signup_req("a@b.com", "secret1")).await.unwrap().user.id;
        svc.signup(signup_req("c@d.com", "secret1")).await.unwrap();

        let users = svc.list_users(id).await.unwrap();
        let emails: Vec<_> = users.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, ["a@b.com", "c@d.com"]);
    }
}
