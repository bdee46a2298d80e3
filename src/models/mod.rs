//! Domain models for marketplace-auth
//!
//! This module contains the credential record, sessions, security events
//! and monitoring alerts shared by the services and the storage layer.

pub mod alert;
pub mod security_event;
pub mod session;
pub mod user;

pub use alert::{Alert, AlertKind, Severity};
pub use security_event::{EventFilter, SecurityEvent, SecurityEventType};
pub use session::{AuthSession, ClientContext, IssuedSession};
pub use user::{NewUser, TokenPurpose, User, UserProfile};
