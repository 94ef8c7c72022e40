//! Request payloads. Each schema deserializes leniently (every field
//! optional) and then validates into either a checked value or a
//! [`FieldErrors`](crate::validation::FieldErrors) map, so a single response
//! reports every problem at once.

pub mod company;
pub mod permission;
pub mod role;
pub mod user;
