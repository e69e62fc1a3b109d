use tracing::{error, info, instrument, warn};

use crate::auth::{
    captcha::BotVerifier,
    codec::constant_time_eq,
    dto::{PublicUser, RegisterForm, UpdateProfileForm},
    errors::AccountError,
    extractors::CurrentUser,
    repo::{StoreError, UserStore},
    repo_types::{ProfileChanges, User},
    validation::{
        check_new_password, check_num_tries, check_password_length, check_timeout, FieldError,
        FormCheck,
    },
};

/// Validate a registration form and, when every check passes, create the account.
///
/// Field checks accumulate so the caller can show all problems at once; a
/// store outage aborts immediately.
#[instrument(skip_all, fields(email = %form.email.trim()))]
pub async fn register(
    store: &dyn UserStore,
    verifier: &dyn BotVerifier,
    form: RegisterForm,
) -> Result<PublicUser, AccountError> {
    let email = form.email.trim();
    let first_name = form.first_name.trim();
    let last_name = form.last_name.trim();

    FormCheck::default()
        .required("first_name", first_name)
        .required("last_name", last_name)
        .required("email", email)
        .email("email", email)
        .required("password", &form.password)
        .required("confirm_password", &form.confirm_password)
        .required("g-recaptcha-response", &form.recaptcha)
        .finish()?;

    let mut errors = Vec::new();

    match verifier.verify(&form.recaptcha).await {
        Ok(true) => {}
        Ok(false) => {
            warn!("bot verification rejected");
            errors.push(FieldError::RecaptchaFailure);
        }
        Err(e) => {
            error!(error = %e, retryable = e.is_retryable(), "verification service unavailable");
            errors.push(FieldError::RecaptchaFailure);
        }
    }

    if store.find_by_email(email).await?.is_some() {
        warn!("email already registered");
        errors.push(FieldError::RegisteredEmail);
    }

    if let Some(e) = check_new_password(&form.password, &form.confirm_password) {
        errors.push(e);
    }

    if !errors.is_empty() {
        return Err(AccountError::Rejected(errors));
    }

    // The pre-check can lose a race; the store's constraint is authoritative.
    let user = store
        .create(email, &form.password, first_name, last_name)
        .await
        .map_err(|e| {
            if matches!(e, StoreError::DuplicateEmail) {
                warn!("lost registration race for email");
            }
            AccountError::from(e)
        })?;

    info!(user_id = %user.id, "user registered, confirmation pending");
    Ok(user.into())
}

/// Validate and apply a profile edit for the signed-in account.
///
/// Changing the email puts the account back into the unconfirmed state.
#[instrument(skip_all, fields(user_id = %session.id))]
pub async fn update_profile(
    store: &dyn UserStore,
    session: &CurrentUser,
    form: UpdateProfileForm,
) -> Result<PublicUser, AccountError> {
    let email = form.email.trim();
    let first_name = form.first_name.trim();
    let last_name = form.last_name.trim();

    FormCheck::default()
        .required("first_name", first_name)
        .required("last_name", last_name)
        .required("email", email)
        .email("email", email)
        .finish()?;

    let current = session_account(store, session).await?;

    let mut errors = Vec::new();

    if let Some(other) = store.find_by_email(email).await? {
        if other.id != current.id {
            errors.push(FieldError::RegisteredEmail);
        }
    }

    let new_password = (!form.password.is_empty()).then_some(form.password);
    if let Some(e) = new_password.as_deref().and_then(check_password_length) {
        errors.push(e);
    }
    errors.extend(check_timeout(form.timeout));
    errors.extend(check_num_tries(form.num_tries));

    if !errors.is_empty() {
        warn!(errors = ?errors, "profile update rejected");
        return Err(AccountError::Rejected(errors));
    }

    let password_changed = new_password.is_some();
    let changes = ProfileChanges {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: email.to_string(),
        timeout: form.timeout,
        num_tries: form.num_tries,
        password: new_password,
    };
    if !store.update_profile(&current.email, &changes).await? {
        warn!("account vanished before profile update");
        return Err(AccountError::UnknownAccount);
    }

    let user = store
        .find_by_email(email)
        .await?
        .ok_or(AccountError::UnknownAccount)?;
    if email != current.email {
        info!("email changed, confirmation required");
    }
    info!(password_changed, "profile updated");
    Ok(user.into())
}

/// Resolve the session to its account. A token minted before an email change
/// must not reach whoever holds that address now.
async fn session_account(store: &dyn UserStore, session: &CurrentUser) -> Result<User, AccountError> {
    match store.find_by_email(&session.email).await? {
        Some(user) if user.id == session.id => Ok(user),
        Some(_) => {
            warn!(user_id = %session.id, "session email now belongs to another account");
            Err(AccountError::UnknownAccount)
        }
        None => Err(AccountError::UnknownAccount),
    }
}

/// Check credentials and stamp the login time.
#[instrument(skip(store, password))]
pub async fn login(store: &dyn UserStore, email: &str, password: &str) -> Result<User, AccountError> {
    let email = email.trim();
    let Some(user) = store.verify_credentials(email, password).await? else {
        warn!("login rejected");
        return Err(AccountError::InvalidCredentials);
    };
    let user = store.record_login(&user.email).await?;
    info!(user_id = %user.id, "user logged in");
    Ok(user)
}

/// Confirm a pending account with the code it was issued.
#[instrument(skip(store, code))]
pub async fn confirm(store: &dyn UserStore, email: &str, code: &str) -> Result<PublicUser, AccountError> {
    let email = email.trim();
    let user = store
        .find_by_email(email)
        .await?
        .ok_or(AccountError::InvalidConfirmationCode)?;

    if user.authenticated {
        return Ok(user.into());
    }
    if code.is_empty() || !constant_time_eq(code.as_bytes(), user.confirmation_code.as_bytes()) {
        warn!(user_id = %user.id, "confirmation code mismatch");
        return Err(AccountError::InvalidConfirmationCode);
    }

    let user = store.mark_authenticated(email).await?;
    info!(user_id = %user.id, "account confirmed");
    Ok(user.into())
}

pub async fn profile(store: &dyn UserStore, session: &CurrentUser) -> Result<PublicUser, AccountError> {
    session_account(store, session).await.map(PublicUser::from)
}
