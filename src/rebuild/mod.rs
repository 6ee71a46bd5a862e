// Public API - what other modules can use
pub use controller::{
    RebuildController, RebuildMode, RebuildReport, VerifyReport, DEFAULT_BATCH_SIZE,
};
pub use handlers::{rebuild_leaderboard, verify_leaderboard, GLOBAL_BOARD};

// Internal modules
pub mod controller;
mod handlers;
