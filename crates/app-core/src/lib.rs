//! Core domain logic for Sitechat
//!
//! This crate contains the conversation-identity logic, the message model,
//! and the services that sit between the state layer and the backend:
//! message repository, profile store, media uploads, and the login flows.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod conversation;
pub mod media;
pub mod message;
pub mod profile;
pub mod repository;
pub mod testing;

pub use conversation::{ConversationDescriptor, ConversationKey};
pub use message::{Message, MessageKind, NewMessage, OutgoingContent};
pub use repository::MessageRepository;
