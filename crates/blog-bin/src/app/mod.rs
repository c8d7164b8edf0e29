//! Application wiring for the relay binary.

mod admin;
mod relay;
mod seed;

pub use admin::{print_dead_letters, print_stats, requeue};
pub use relay::run_relay;
pub use seed::seed_content;
