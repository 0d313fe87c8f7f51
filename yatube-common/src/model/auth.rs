use crate::{
    model::{Id, user::UserMarker},
    util::PositiveDuration,
};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{self, PasswordHasher, PasswordVerifier, SaltString},
};
use base64::{DecodeError, Engine, display::Base64Display, prelude::BASE64_STANDARD};
use std::{
    fmt::{Debug, Display, Formatter},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;
use time::UtcDateTime;

pub const SESSION_SECRET_LEN: usize = 24;
pub const SESSION_SALT_LEN: usize = 16;
pub const SESSION_HASH_LEN: usize = 32;
pub const PASSWORD_SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Hashing session token failed: {0}")]
    TokenHash(argon2::Error),
    #[error("Hashing password failed: {0}")]
    PasswordHash(password_hash::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum SessionTokenDecodeError {
    #[error("Not enough parts separated by ':'")]
    NotEnoughParts,
    #[error("Invalid user id: {0}")]
    InvalidUserId(ParseIntError),
    #[error("Decoding base64 failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("The length of the secret part is incorrect")]
    InvalidSecretLength,
    #[error("The length of the salt part is incorrect")]
    InvalidSaltLength,
}

/// The bearer credential handed out at login: `<user id>:<base64 secret>:<base64 salt>`.
///
/// Only a hash of the secret is ever stored.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct SessionToken {
    pub user_id: Id<UserMarker>,
    secret: [u8; SESSION_SECRET_LEN],
    salt: [u8; SESSION_SALT_LEN],
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct SessionTokenHash(Box<[u8; SESSION_HASH_LEN]>);

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Session {
    pub user: Id<UserMarker>,
    pub token_hash: SessionTokenHash,
    pub created_at: UtcDateTime,
    pub expires_after: Option<PositiveDuration>,
}

impl SessionToken {
    #[must_use]
    pub fn generate(user_id: Id<UserMarker>) -> Self {
        Self {
            user_id,
            secret: rand::random(),
            salt: rand::random(),
        }
    }

    pub fn hash(&self) -> Result<SessionTokenHash, CredentialError> {
        // The secret is random, so a memory-hard configuration buys nothing here.
        let params = Params::new(Params::MIN_M_COST, 1, 1, Some(SESSION_HASH_LEN))
            .map_err(CredentialError::TokenHash)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut hash = Box::new([0; SESSION_HASH_LEN]);
        argon2
            .hash_password_into(&self.secret, &self.salt, &mut *hash)
            .map_err(CredentialError::TokenHash)?;

        Ok(SessionTokenHash(hash))
    }
}

impl Display for SessionToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let secret = Base64Display::new(&self.secret, &BASE64_STANDARD);
        let salt = Base64Display::new(&self.salt, &BASE64_STANDARD);

        write!(f, "{}:{secret}:{salt}", self.user_id)
    }
}

impl FromStr for SessionToken {
    type Err = SessionTokenDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');

        let user_id_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let secret_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let salt_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;

        let user_id = u64::from_str(user_id_part)
            .map_err(Self::Err::InvalidUserId)?
            .into();
        let secret = BASE64_STANDARD
            .decode(secret_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidSecretLength)?;
        let salt = BASE64_STANDARD
            .decode(salt_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidSaltLength)?;

        Ok(Self {
            user_id,
            secret,
            salt,
        })
    }
}

impl Debug for SessionToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("user_id", &self.user_id)
            .field("secret", &"[redacted]")
            .field("salt", &"[redacted]")
            .finish()
    }
}

impl SessionTokenHash {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl Debug for SessionTokenHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionTokenHash").field(&"[redacted]").finish()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The session token hash had an invalid length")]
pub struct InvalidSessionTokenHashError;

impl TryFrom<Vec<u8>> for SessionTokenHash {
    type Error = InvalidSessionTokenHashError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        let bytes: [u8; SESSION_HASH_LEN] =
            value.try_into().map_err(|_| InvalidSessionTokenHashError)?;
        Ok(Self(Box::new(bytes)))
    }
}

impl Session {
    #[must_use]
    pub fn new(
        token: &SessionToken,
        token_hash: SessionTokenHash,
        expires_after: Option<PositiveDuration>,
    ) -> Self {
        Self {
            user: token.user_id,
            token_hash,
            created_at: UtcDateTime::now(),
            expires_after,
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now: UtcDateTime) -> bool {
        self.expires_after
            .is_some_and(|lifetime| self.created_at + lifetime.get() < now)
    }
}

/// An argon2 password hash in PHC string format.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct HashedPassword(String);

impl HashedPassword {
    pub fn hash(password: &str) -> Result<Self, CredentialError> {
        let salt_bytes: [u8; PASSWORD_SALT_LEN] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes).map_err(CredentialError::PasswordHash)?;

        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(CredentialError::PasswordHash)?;

        Ok(Self(hash.to_string()))
    }

    /// Wraps a PHC string read back from storage.
    #[must_use]
    pub fn from_phc(phc: String) -> Self {
        Self(phc)
    }

    #[must_use]
    pub fn as_phc(&self) -> &str {
        &self.0
    }

    pub fn verify(&self, password: &str) -> Result<bool, CredentialError> {
        let parsed =
            password_hash::PasswordHash::new(&self.0).map_err(CredentialError::PasswordHash)?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(err) => Err(CredentialError::PasswordHash(err)),
        }
    }
}

impl Debug for HashedPassword {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HashedPassword").field(&"[redacted]").finish()
    }
}
