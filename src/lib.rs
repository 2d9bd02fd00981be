pub mod auth;
pub mod config;
pub mod error;
pub mod files;
pub mod identity;
pub mod monitor;
pub mod repository;
pub mod server;
pub mod storage;
pub mod system_paths;
pub mod types;

// Test-only printing helper: expands to eprintln! during tests and debug builds.
// Usage: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In release builds tprintln! keeps format checking but emits nothing.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        if false { let _ = format!($($arg)*); }
    });
}
