//! Admission gate for connection attempts.
//!
//! Enforcement is a single boolean predicate over the persisted allow-list:
//! both the stable id and the display name must match a stored identity. A
//! store failure counts as "no match found", so an unavailable identity store
//! never admits traffic on an enforcement-enabled proxy.

use gatehouse_protocol::{AdmissionOutcome, DenialNotification, Identity};
use tracing::{info, warn};

use crate::config::WhitelistConfig;
use crate::db::Db;
use crate::messages::MessageCatalog;

pub struct AdmissionGate<'a> {
    db: &'a Db,
    whitelist: &'a WhitelistConfig,
    messages: &'a MessageCatalog,
}

impl<'a> AdmissionGate<'a> {
    pub fn new(db: &'a Db, whitelist: &'a WhitelistConfig, messages: &'a MessageCatalog) -> Self {
        Self {
            db,
            whitelist,
            messages,
        }
    }

    pub fn check(&self, identity: &Identity) -> AdmissionOutcome {
        if !self.whitelist.enabled {
            return AdmissionOutcome::granted();
        }

        let matched = match self
            .db
            .identity_allowed(&identity.stable_id, &identity.display_name)
        {
            Ok(matched) => matched,
            Err(err) => {
                warn!(
                    error = %err,
                    player = %identity.display_name,
                    "Failed to check allow-list; treating as no match"
                );
                false
            }
        };
        if matched {
            return AdmissionOutcome::granted();
        }

        info!(player = %identity.display_name, "Not on the allow-list, access blocked");

        let notify = if self.whitelist.notify_admins {
            Some(DenialNotification {
                permission: self.whitelist.notify_permission.clone(),
                message: self.messages.denied_notify(&identity.display_name),
            })
        } else {
            None
        };

        AdmissionOutcome {
            allowed: false,
            message: Some(self.messages.denied()),
            notify,
        }
    }
}
