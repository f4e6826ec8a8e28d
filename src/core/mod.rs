use rand::distr::{Alphanumeric, SampleString};

pub mod chunk;

pub mod context;

pub mod item;

pub mod job;

pub mod step;

pub mod transaction;

/// Generates a random alphanumeric name for jobs and steps created without
/// an explicit one.
fn build_name() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 8)
}
