//! Local password gate.
//!
//! This is a deterrent against casual access, not a security boundary: the
//! secret is stored base64-encoded (reversible, unsalted) next to the data
//! it guards, and anyone with the database file can read both.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::info;

use crate::db::Database;
use crate::error::GateError;

pub const SECRET_KEY: &str = "jobs-tracker-app-password";
pub const MIN_PASSWORD_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    NotConfigured,
    Locked,
    Unlocked,
}

/// The unlock flag lives only as long as this value (one process run);
/// the obscured secret is persisted in the database.
pub struct Gate<'a> {
    db: &'a Database,
    unlocked: bool,
}

impl<'a> Gate<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db, unlocked: false }
    }

    pub fn status(&self) -> Result<GateStatus, GateError> {
        if self.db.get(SECRET_KEY)?.is_none() {
            return Ok(GateStatus::NotConfigured);
        }
        Ok(if self.unlocked {
            GateStatus::Unlocked
        } else {
            GateStatus::Locked
        })
    }

    pub fn set_secret(&mut self, password: &str, confirm: &str) -> Result<(), GateError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(GateError::TooShort(MIN_PASSWORD_LEN));
        }
        if password != confirm {
            return Err(GateError::Mismatch);
        }
        self.db.set(SECRET_KEY, &obscure(password))?;
        self.unlocked = true;
        info!("access password set");
        Ok(())
    }

    pub fn unlock(&mut self, password: &str) -> Result<(), GateError> {
        let stored = self.db.get(SECRET_KEY)?.ok_or(GateError::NotConfigured)?;
        if obscure(password) != stored {
            return Err(GateError::Incorrect);
        }
        self.unlocked = true;
        Ok(())
    }

    /// Log out: clears the session flag, keeps the secret.
    #[allow(dead_code)]
    pub fn lock(&mut self) {
        self.unlocked = false;
    }

    /// Forgets the secret entirely so a new one must be created.
    pub fn reset(&mut self) -> Result<(), GateError> {
        self.db.remove(SECRET_KEY)?;
        self.unlocked = false;
        info!("access password reset");
        Ok(())
    }
}

fn obscure(password: &str) -> String {
    STANDARD.encode(password.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let mut gate = Gate::new(&db);
        assert_eq!(gate.status().unwrap(), GateStatus::NotConfigured);
        assert!(matches!(gate.unlock("anything"), Err(GateError::NotConfigured)));

        gate.set_secret("hunter2", "hunter2").unwrap();
        assert_eq!(gate.status().unwrap(), GateStatus::Unlocked);

        gate.lock();
        assert_eq!(gate.status().unwrap(), GateStatus::Locked);
        assert!(matches!(gate.unlock("hunter3"), Err(GateError::Incorrect)));
        gate.unlock("hunter2").unwrap();
        assert_eq!(gate.status().unwrap(), GateStatus::Unlocked);

        gate.reset().unwrap();
        assert_eq!(gate.status().unwrap(), GateStatus::NotConfigured);
    }

    #[test]
    fn test_set_secret_validates_input() {
        let db = Database::open_in_memory().unwrap();
        let mut gate = Gate::new(&db);
        assert!(matches!(gate.set_secret("abc", "abc"), Err(GateError::TooShort(4))));
        assert!(matches!(gate.set_secret("abcd", "abce"), Err(GateError::Mismatch)));
        assert_eq!(gate.status().unwrap(), GateStatus::NotConfigured);
    }

    #[test]
    fn test_secret_is_stored_obscured_not_hashed() {
        let db = Database::open_in_memory().unwrap();
        Gate::new(&db).set_secret("open sesame", "open sesame").unwrap();
        let stored = db.get(SECRET_KEY).unwrap().unwrap();
        assert_ne!(stored, "open sesame");
        assert_eq!(STANDARD.decode(stored).unwrap(), b"open sesame");

        // A fresh session starts locked.
        let gate = Gate::new(&db);
        assert_eq!(gate.status().unwrap(), GateStatus::Locked);
    }
}
