use crate::{RelayError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Upload ownership of a staged name.
#[derive(Debug)]
pub struct NameLease {
    owner: Option<String>,
    touched: Instant,
}

impl Default for NameLease {
    fn default() -> Self {
        Self {
            owner: None,
            touched: Instant::now(),
        }
    }
}

impl NameLease {
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    fn is_expired(&self, timeout: Duration) -> bool {
        self.touched.elapsed() >= timeout
    }

    /// Binds the name to `upload_id`, refusing while another upload holds a fresh lease.
    pub fn claim(&mut self, name: &str, upload_id: Option<&str>, timeout: Duration) -> Result<()> {
        let Some(upload_id) = upload_id else {
            self.touched = Instant::now();
            return Ok(());
        };

        if let Some(owner) = self.owner.as_deref() {
            if owner != upload_id && !self.is_expired(timeout) {
                return Err(RelayError::NameInUse(name.to_string()));
            }
        }

        self.owner = Some(upload_id.to_string());
        self.touched = Instant::now();
        Ok(())
    }

    /// Refuses writers without an upload id while an upload still holds a fresh lease.
    pub fn ensure_unclaimed(&self, name: &str, timeout: Duration) -> Result<()> {
        match self.owner.as_deref() {
            Some(_) if !self.is_expired(timeout) => Err(RelayError::NameInUse(name.to_string())),
            _ => Ok(()),
        }
    }

    /// Drops the owner so any upload may claim the name next.
    pub fn release(&mut self) {
        self.owner = None;
    }
}

/// Per-name async mutexes; every mutation of a staged file happens under its name's guard.
pub struct NameLocks {
    names: Mutex<HashMap<String, Arc<Mutex<NameLease>>>>,
    lease_timeout: Duration,
}

impl NameLocks {
    pub fn new(lease_timeout: Duration) -> Self {
        Self {
            names: Mutex::new(HashMap::new()),
            lease_timeout,
        }
    }

    pub fn lease_timeout(&self) -> Duration {
        self.lease_timeout
    }

    pub async fn lock(&self, name: &str) -> OwnedMutexGuard<NameLease> {
        let slot = {
            let mut names = self.names.lock().await;
            self.prune(&mut names);
            names.entry(name.to_string()).or_default().clone()
        };
        slot.lock_owned().await
    }

    pub async fn len(&self) -> usize {
        self.names.lock().await.len()
    }

    fn prune(&self, names: &mut HashMap<String, Arc<Mutex<NameLease>>>) {
        let timeout = self.lease_timeout;
        names.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(lease) => !lease.is_expired(timeout),
                Err(_) => true,
            }
        });
    }
}
