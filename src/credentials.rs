//! User registration and password checks.

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use chrono::Utc;
use rand::RngCore;
use sqlx::SqlitePool;

use crate::{
    db::{insert_user, query_user_by_email},
    domain::User,
    error::{AppError, ConflictField},
};

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
    params: Params,
    // Checked against when the email is unknown so both login failures cost one verify.
    dummy_hash: String,
}

impl CredentialStore {
    pub fn new(pool: SqlitePool, params: Params) -> Result<Self, AppError> {
        let mut dummy_password = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut dummy_password);
        let dummy_hash = hash_with(&hasher(&params), &dummy_password)
            .map_err(|err| AppError::Internal(format!("password hashing failed: {}", err)))?;

        Ok(Self {
            pool,
            params,
            dummy_hash,
        })
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        raw_password: &str,
    ) -> Result<User, AppError> {
        if username.trim().is_empty() || email.trim().is_empty() || raw_password.is_empty() {
            return Err(AppError::validation("All fields are required"));
        }
        if raw_password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let password_hash = self.hash_password(raw_password).await?;

        insert_user(&self.pool, username, email, &password_hash, Utc::now())
            .await
            .map_err(|err| match conflict_field(&err) {
                Some(field) => {
                    tracing::info!("Registration rejected, {:?} is taken", field);
                    AppError::Conflict(field)
                }
                None => {
                    tracing::error!("Error inserting user in register: {:#?}", err);
                    AppError::Database(err)
                }
            })
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(query_user_by_email(&self.pool, email).await?)
    }

    pub fn verify_password(&self, user: &User, raw_password: &str) -> bool {
        matches_hash(&user.password_hash, raw_password)
    }

    /// Looks up the user and checks the password. An unknown email and a wrong
    /// password return the same error after the same amount of hashing work.
    pub async fn authenticate(&self, email: &str, raw_password: &str) -> Result<User, AppError> {
        if email.is_empty() || raw_password.is_empty() {
            return Err(AppError::validation("Email and password are required"));
        }

        let user = self.find_by_email(email).await?;

        let stored_hash = match &user {
            Some(user) => user.password_hash.clone(),
            None => self.dummy_hash.clone(),
        };
        let password = raw_password.to_string();
        let valid = tokio::task::spawn_blocking(move || matches_hash(&stored_hash, &password))
            .await
            .map_err(|err| AppError::Internal(format!("password verification panicked: {}", err)))?;

        match user {
            Some(user) if valid => Ok(user),
            Some(user) => {
                tracing::info!("Login failed, wrong password for user_id={}", user.id);
                Err(AppError::InvalidCredentials)
            }
            None => {
                tracing::info!("Login failed, no user for email={}", email);
                Err(AppError::InvalidCredentials)
            }
        }
    }

    async fn hash_password(&self, raw_password: &str) -> Result<String, AppError> {
        let hasher = hasher(&self.params);
        let password = raw_password.to_string();

        tokio::task::spawn_blocking(move || hash_with(&hasher, password.as_bytes()))
            .await
            .map_err(|err| AppError::Internal(format!("password hashing panicked: {}", err)))?
            .map_err(|err| AppError::Internal(format!("password hashing failed: {}", err)))
    }
}

fn hasher(params: &Params) -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
}

fn hash_with(hasher: &Argon2<'_>, password: &[u8]) -> Result<String, argon2::password_hash::Error> {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt)?;
    hasher
        .hash_password(password, &salt)
        .map(|hash| hash.to_string())
}

fn matches_hash(stored_hash: &str, raw_password: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::error!("Stored password hash is unreadable: {}", err);
            return false;
        }
    };

    // The PHC string carries its own parameters, so the default verifier is enough.
    Argon2::default()
        .verify_password(raw_password.as_bytes(), &parsed)
        .is_ok()
}

fn conflict_field(err: &sqlx::Error) -> Option<ConflictField> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };
    if !db_err.is_unique_violation() {
        return None;
    }
    if db_err.message().contains("users.email") {
        Some(ConflictField::Email)
    } else {
        Some(ConflictField::Username)
    }
}

#[cfg(test)]
pub fn test_params() -> Params {
    Params::new(8, 1, 1, None).unwrap()
}
