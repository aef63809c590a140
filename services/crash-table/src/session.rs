//! Who a connection speaks for.
//!
//! A connection starts anonymous and may only read table snapshots. It becomes a player by
//! registering a new account or by identifying with the access key handed out at registration.
//! Admin commands additionally need the configured admin token, presented once when
//! identifying; the admin console still checks the account's role on every command.
//!
//! Access keys are `HMAC-SHA256(session_key, account_id)`, so nothing is stored per account. The
//! session key is derived from the master secret and keys survive a restart only when the
//! master secret is configured.

use crashpad_execution::HashChain;
use hmac::{Hmac, Mac};

type HmacSha256 = Hmac<sha2::Sha256>;

/// Label under which the session key is derived from the master secret.
const SESSION_LABEL: &str = "session";

/// Identity bound to one connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    account: Option<String>,
    admin: bool,
}

impl Session {
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub(crate) fn bind(&mut self, account: &str, admin: bool) {
        self.account = Some(account.to_string());
        self.admin = admin;
    }
}

/// Credentials checked when a connection identifies.
pub struct Access {
    key: [u8; 32],
    admin_token: Option<String>,
}

impl Access {
    pub fn new(chain: &HashChain, admin_token: Option<String>) -> Self {
        Self {
            key: *chain.for_table(SESSION_LABEL).secret(),
            admin_token,
        }
    }

    fn mac(&self, domain: &[u8], value: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC can take a key of any size");
        mac.update(domain);
        mac.update(value.as_bytes());
        mac
    }

    /// Access key for `account`, returned once at registration.
    pub fn access_key(&self, account: &str) -> String {
        hex::encode(self.mac(b"account:", account).finalize().into_bytes())
    }

    pub fn verify_access_key(&self, account: &str, access_key: &str) -> bool {
        let Ok(tag) = hex::decode(access_key) else {
            return false;
        };
        self.mac(b"account:", account).verify_slice(&tag).is_ok()
    }

    /// Compares in constant time. Always false when no admin token is configured.
    pub fn verify_admin_token(&self, token: &str) -> bool {
        let Some(expected) = self.admin_token.as_deref() else {
            return false;
        };
        let expected = self.mac(b"admin:", expected).finalize().into_bytes();
        self.mac(b"admin:", token).verify_slice(&expected).is_ok()
    }
}
