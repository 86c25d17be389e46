//! Various utilities related to the rest of the service.

pub mod futures;
pub mod http;
