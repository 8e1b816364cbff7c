//! Request policies.

pub(crate) mod origin;
