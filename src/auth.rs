//! Credential verification, failure counting and lockout, layered on the
//! record store.
//!
//! Lockout is deliberately decoupled from [`UserStore::authenticate`]:
//! the caller decides when to consult [`UserStore::check_lockout`] and
//! what failure threshold triggers [`UserStore::lock_out`], so the store
//! imposes no policy of its own.

use std::time::Duration;

use time::OffsetDateTime;
use tracing::warn;

use crate::error::{Error, Result};
use crate::password;
use crate::store::UserStore;
use crate::user::{blank_password, new_stamp, User};

impl UserStore {
    /// Check a name and password, returning the user entry on success.
    /// Any failure, whether the name is unregistered or the password is
    /// wrong, is exactly [`Error::InvalidCredentials`]; the two cases are
    /// not distinguishable by the caller. Lockout state is not consulted.
    pub async fn authenticate(&self, name: &str, password: &str) -> Result<User> {
        let found = match self.find_by_name(name).await {
            Ok(u) => Some(u),
            Err(Error::NotFound) => None,
            Err(e) => return Err(e),
        };
        // An unknown name still pays for a full comparison against a real
        // encoded hash, so it cannot be told apart from a bad password by
        // an early return.
        let mut user = found.unwrap_or_else(|| User {
            password_hash: password::empty_hash().to_owned(),
            ..User::default()
        });
        let ok = password::verify_password(&user.password_hash, password)?;
        self.record_attempt(&mut user, ok).await;
        if !ok {
            return Err(Error::InvalidCredentials);
        }
        Ok(user)
    }

    /// Best-effort bookkeeping: a failure bumps the consecutive-failure
    /// counter, a success resets it. The write must not change the
    /// authentication verdict, so its error is logged and dropped; for
    /// the placeholder record of an unknown name the update simply
    /// matches no row.
    async fn record_attempt(&self, user: &mut User, ok: bool) {
        if ok {
            user.access_failed_count = 0;
        } else {
            user.access_failed_count += 1;
        }
        if let Err(e) = self.update(user).await {
            warn!(
                table = %self.table,
                user_id = %user.id,
                error = %e,
                "failed to persist access-failed count"
            );
        }
    }

    /// Whether the user is currently barred by an active lockout: lockout
    /// must be enabled, an end time set, and that time still in the
    /// future. Purely a clock comparison; an expired end time is left in
    /// place rather than eagerly cleared.
    pub fn check_lockout(&self, user: &User) -> Result<()> {
        match user.lockout_end {
            Some(end) if user.lockout_enabled && end > OffsetDateTime::now_utc() => {
                Err(Error::LockedOut)
            }
            _ => Ok(()),
        }
    }

    /// Clear any lockout mark and persist the change. Nothing is written
    /// when no end time is set.
    pub async fn reset_lockout(&self, user: &mut User) -> Result<()> {
        if user.lockout_end.is_some() {
            user.lockout_end = None;
            return self.update(user).await;
        }
        Ok(())
    }

    /// Bar the user from authenticating until `duration` from now. The
    /// write goes through a working copy; the caller's record picks up
    /// the new end time and stamp only once the store confirms it, so a
    /// failed write leaves the record matching the committed state.
    pub async fn lock_out(&self, user: &mut User, duration: Duration) -> Result<()> {
        let end = OffsetDateTime::now_utc() + duration;
        let mut staged = user.clone();
        staged.lockout_end = Some(end);
        self.update(&mut staged).await?;
        user.lockout_end = Some(end);
        user.concurrency_stamp = staged.concurrency_stamp;
        Ok(())
    }

    /// Replace the user's password, rotating the security stamp so the
    /// identity framework invalidates existing sessions. Rejects blank
    /// passwords. Stages the change on a working copy and updates the
    /// caller's record only on success.
    pub async fn change_password(&self, user: &mut User, password: &str) -> Result<()> {
        if blank_password(password) {
            return Err(Error::MissingPassword);
        }
        let mut staged = user.clone();
        staged.password_hash = password::hash_password(password);
        staged.security_stamp = new_stamp();
        self.update(&mut staged).await?;
        user.password_hash = staged.password_hash;
        user.security_stamp = staged.security_stamp;
        user.concurrency_stamp = staged.concurrency_stamp;
        Ok(())
    }

    /// Mark the user's email address as confirmed and persist the change.
    pub async fn confirm_email(&self, user: &mut User) -> Result<()> {
        user.email_confirmed = true;
        self.update(user).await
    }
}
