pub mod annotation;
pub mod conversation;
pub mod document;
pub mod fields;
pub mod label;
pub mod project;
pub mod registry;
pub mod role;
pub mod user;
