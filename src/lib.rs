//! `email-to-epub`: turn `.eml` files into a single EPUB book.
//!
//! Each email becomes a chapter. Remote images are downloaded, inline
//! (`cid:`) images are taken from the attachments, and both are embedded
//! so the book reads offline. See [`pipeline::Converter`] for the entry point.

pub mod attachments;
pub mod book;
pub mod chapter;
pub mod config;
pub mod error;
pub mod fetch;
pub mod html;
pub mod model;
pub mod naming;
pub mod parser;
pub mod pipeline;
pub mod resolve;
pub mod sniff;
