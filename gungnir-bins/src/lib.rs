//! Shared setup code for the gungnir binaries

pub mod common;
