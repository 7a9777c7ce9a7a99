//! Core functionality for the vigil account-security subsystem
//!
//! This crate contains the domain models, repository traits, and services that
//! make up the account security and session management core: credential
//! verification, brute-force lockout, multi-device sessions, token revocation,
//! two-factor authentication, IP reputation blocking, and tiered rate limiting.
//!
//! Storage backends implement the traits in [`repositories`]; the `vigil`
//! facade crate wires everything together into the login/refresh/logout state
//! machine.

pub mod account;
pub mod auth;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod history;
pub mod id;
pub mod ip;
pub mod notifier;
pub mod repositories;
pub mod services;
pub mod session;
pub mod token;
pub mod two_factor;

pub use account::{Account, AccountId, NewAccount};
pub use auth::{AuthOutcome, TokenPair};
pub use clock::{Clock, SystemClock, TestClock};
pub use config::AuthConfig;
pub use error::{AuthError, Error};
pub use history::{AuthMethod, LoginHistoryEntry};
pub use ip::{BlockType, IpBlockEntry};
pub use notifier::{Notifier, NullNotifier, SecurityEvent};
pub use session::{Session, SessionId, SessionToken};
pub use token::{RevocationReason, RevokedToken, SecureToken, TokenPurpose};
pub use two_factor::TwoFactorRecord;
