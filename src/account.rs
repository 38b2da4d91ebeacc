//! Registration, password retrieval and profile flows.
//!
//! Flow Overview:
//! 1) Code request: bot check, resend throttle, store a fresh code, mail it.
//! 2) Guarded action (register / retrieve): verify the code, perform the write,
//!    then consume the code. A failed write leaves the code usable for a retry.
//! 3) Notices after a successful register / retrieve run on a detached task. The
//!    flow never waits for them, and a delivery failure is only logged.
//!
//! Passwords arrive in clear text and are hashed with [`hash_credential`] before
//! they reach the store.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::{
    hash_credential, AuthError, AuthFacade, AuthenticatedAccount, CodePurpose,
    VerificationCodeService,
};
use crate::captcha::BotVerifier;
use crate::mail::MailSender;
use crate::model::Account;
use crate::store::{AccountFilter, AccountPatch, AccountStore, StoreError};

const REGISTER_OPERATE: &str = "register account";
const RETRIEVE_OPERATE: &str = "reset password";

pub struct AccountService {
    store: Arc<dyn AccountStore>,
    auth: Arc<AuthFacade>,
    codes: VerificationCodeService,
    mail: Arc<dyn MailSender>,
    bot: Arc<dyn BotVerifier>,
}

/// Unique-constraint violations on writes mean another request won the race for
/// the same name or email.
fn taken_on_conflict(err: StoreError) -> AuthError {
    match err {
        StoreError::Conflict => AuthError::NameOrEmailTaken,
        other => AuthError::Store(other),
    }
}

impl AccountService {
    #[must_use]
    pub fn new(
        store: Arc<dyn AccountStore>,
        auth: Arc<AuthFacade>,
        codes: VerificationCodeService,
        mail: Arc<dyn MailSender>,
        bot: Arc<dyn BotVerifier>,
    ) -> Self {
        Self {
            store,
            auth,
            codes,
            mail,
            bot,
        }
    }

    #[must_use]
    pub fn auth(&self) -> &AuthFacade {
        &self.auth
    }

    async fn exists(&self, filter: AccountFilter) -> Result<bool, AuthError> {
        Ok(!self.store.find(&filter).await?.is_empty())
    }

    async fn find_one(&self, filter: AccountFilter) -> Result<Account, AuthError> {
        self.store
            .find(&filter)
            .await?
            .into_iter()
            .next()
            .ok_or(AuthError::AccountNotFound)
    }

    async fn check_bot(&self, challenge: &str, ip: &str) -> Result<(), AuthError> {
        let verdict = self.bot.verify(challenge, ip).await.map_err(|err| {
            warn!("bot verification unavailable: {err}");
            AuthError::BotService(err.to_string())
        })?;
        if verdict.success {
            Ok(())
        } else {
            Err(AuthError::BotCheckFailed)
        }
    }

    fn notify(&self, to: &str, name: &str, title: &'static str, content: &'static str) {
        let mail = Arc::clone(&self.mail);
        let to = to.to_string();
        let name = name.to_string();
        tokio::spawn(async move {
            if let Err(err) = mail.send_notice(&to, &name, title, content).await {
                warn!(to = %to, "notice mail failed: {err}");
            }
        });
    }

    /// True when the display name or the email is already registered.
    ///
    /// # Errors
    /// `Store` on backend failure.
    pub async fn check_name_and_email(&self, name: &str, email: &str) -> Result<bool, AuthError> {
        self.exists(AccountFilter::NameOrEmail {
            name: name.to_string(),
            email: email.to_string(),
        })
        .await
    }

    /// # Errors
    /// `BotCheckFailed`, `BotService`, `Throttled`, `MailDelivery` or `Store`.
    #[instrument(skip(self, challenge))]
    pub async fn request_registration_code(
        &self,
        email: &str,
        name: &str,
        challenge: &str,
        ip: &str,
    ) -> Result<(), AuthError> {
        self.check_bot(challenge, ip).await?;
        let code = self
            .codes
            .request_code(CodePurpose::Registration, email)
            .await?;
        self.mail
            .send_code(email, name, REGISTER_OPERATE, &code)
            .await
            .map_err(|err| AuthError::MailDelivery(err.to_string()))
    }

    /// Create the account once the emailed code matches.
    ///
    /// # Errors
    /// `CodeInvalid`, `NameOrEmailTaken` or `Store`.
    #[instrument(skip(self, password, code))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        code: &str,
    ) -> Result<Account, AuthError> {
        if !self
            .codes
            .verify_code(CodePurpose::Registration, email, code)
            .await?
        {
            return Err(AuthError::CodeInvalid);
        }
        if self.check_name_and_email(name, email).await? {
            return Err(AuthError::NameOrEmailTaken);
        }

        let account = Account::new(
            Uuid::new_v4().to_string(),
            name.to_string(),
            email.to_string(),
            hash_credential(password),
        );
        self.store
            .insert(&account)
            .await
            .map_err(taken_on_conflict)?;
        self.codes
            .consume_code(CodePurpose::Registration, email)
            .await?;
        info!(account_id = %account.id, "account registered");

        self.notify(
            email,
            name,
            "Account registered",
            "Your Daling Online account has been created. Welcome aboard!",
        );
        Ok(account)
    }

    /// True when an account uses `email`.
    ///
    /// # Errors
    /// `Store` on backend failure.
    pub async fn check_email(&self, email: &str) -> Result<bool, AuthError> {
        self.exists(AccountFilter::Email(email.to_string())).await
    }

    /// # Errors
    /// `BotCheckFailed`, `BotService`, `AccountNotFound`, `Throttled`,
    /// `MailDelivery` or `Store`.
    #[instrument(skip(self, challenge))]
    pub async fn request_retrieval_code(
        &self,
        email: &str,
        challenge: &str,
        ip: &str,
    ) -> Result<(), AuthError> {
        self.check_bot(challenge, ip).await?;
        let account = self.find_one(AccountFilter::Email(email.to_string())).await?;
        let code = self
            .codes
            .request_code(CodePurpose::Retrieval, email)
            .await?;
        self.mail
            .send_code(email, &account.display_name, RETRIEVE_OPERATE, &code)
            .await
            .map_err(|err| AuthError::MailDelivery(err.to_string()))
    }

    /// Reset the password with an emailed code and sign out every device. Old
    /// sessions are gone before the code is consumed or any mail is sent.
    ///
    /// # Errors
    /// `CodeInvalid`, `AccountNotFound` or `Store`.
    #[instrument(skip(self, password, code))]
    pub async fn retrieve(&self, email: &str, password: &str, code: &str) -> Result<(), AuthError> {
        if !self
            .codes
            .verify_code(CodePurpose::Retrieval, email, code)
            .await?
        {
            return Err(AuthError::CodeInvalid);
        }
        let account = self.find_one(AccountFilter::Email(email.to_string())).await?;
        self.store
            .update(
                &AccountFilter::Id(account.id.clone()),
                &AccountPatch::SetCredentialHash(hash_credential(password)),
            )
            .await?;
        self.auth.logout_all(&account.id).await?;
        self.codes
            .consume_code(CodePurpose::Retrieval, email)
            .await?;
        info!(account_id = %account.id, "password retrieved");

        self.notify(
            email,
            &account.display_name,
            "Account recovered",
            "Your Daling Online password has been reset. Welcome back!",
        );
        Ok(())
    }

    /// # Errors
    /// `NameOrEmailTaken` or `Store`.
    pub async fn change_display_name(
        &self,
        current: &AuthenticatedAccount,
        name: &str,
    ) -> Result<(), AuthError> {
        if self
            .exists(AccountFilter::DisplayName(name.to_string()))
            .await?
        {
            return Err(AuthError::NameOrEmailTaken);
        }
        self.store
            .update(
                &AccountFilter::Id(current.account.id.clone()),
                &AccountPatch::SetDisplayName(name.to_string()),
            )
            .await
            .map_err(taken_on_conflict)?;
        Ok(())
    }

    async fn link_game_id(
        &self,
        current: &AuthenticatedAccount,
        patch: AccountPatch,
        game_id: &str,
    ) -> Result<(), AuthError> {
        if self.exists(AccountFilter::GameId(game_id.to_string())).await? {
            return Err(AuthError::GameIdTaken);
        }
        self.store
            .update(&AccountFilter::Id(current.account.id.clone()), &patch)
            .await?;
        Ok(())
    }

    /// Link a Java edition id. The value must not be linked anywhere yet, as
    /// either kind of game id.
    ///
    /// # Errors
    /// `GameIdTaken` or `Store`.
    pub async fn link_java_id(
        &self,
        current: &AuthenticatedAccount,
        java_id: &str,
    ) -> Result<(), AuthError> {
        self.link_game_id(current, AccountPatch::SetJavaId(java_id.to_string()), java_id)
            .await
    }

    /// # Errors
    /// `GameIdTaken` or `Store`.
    pub async fn link_xbox_id(
        &self,
        current: &AuthenticatedAccount,
        xbox_id: &str,
    ) -> Result<(), AuthError> {
        self.link_game_id(current, AccountPatch::SetXboxId(xbox_id.to_string()), xbox_id)
            .await
    }

    /// Set a new password and sign out every device, the caller's included.
    ///
    /// # Errors
    /// `AccountNotFound` or `Store`.
    #[instrument(skip(self, current, password), fields(account_id = %current.account.id))]
    pub async fn change_password(
        &self,
        current: &AuthenticatedAccount,
        password: &str,
    ) -> Result<(), AuthError> {
        self.store
            .update(
                &AccountFilter::Id(current.account.id.clone()),
                &AccountPatch::SetCredentialHash(hash_credential(password)),
            )
            .await?;
        self.auth.logout_all(&current.account.id).await
    }
}
