//! Request handlers.

pub mod chatbot;
pub mod doctors;
pub mod patients;
