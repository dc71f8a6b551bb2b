//! Core data model types for parsed emails and their attachments.

pub mod address;
pub mod attachment;
pub mod mail;
