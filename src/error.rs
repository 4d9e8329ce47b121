use crate::password::HashError;

/// Errors surfaced by the user store and the authentication layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A call was given an empty or completely blank password.
    #[error("missing password")]
    MissingPassword,

    /// A lookup by ID or name matched no row.
    #[error("user name not registered")]
    NotFound,

    /// Creating a user collided with an existing normalized name.
    #[error("user name already registered")]
    AlreadyExists,

    /// An update detected that the record was changed or deleted underfoot.
    /// Refetch the value to see what changed, then retry if still wanted.
    #[error("clashing concurrent update")]
    Concurrency,

    /// Authentication failed, owing to a non-existent user name or a bad
    /// password; the two cases are deliberately indistinguishable.
    #[error("invalid user name or password")]
    InvalidCredentials,

    /// The account is under an active, unexpired lockout.
    #[error("user account locked out")]
    LockedOut,

    /// A stored password hash could not be decoded.
    #[error("password encoding: {0}")]
    Hash(#[from] HashError),

    /// Any other failure from the backing database.
    #[error("user store: {0}")]
    Store(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
