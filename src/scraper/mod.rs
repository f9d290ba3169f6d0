//! Page reading: the DOM-query capability, its Chrome and snapshot backends,
//! readiness waits, market parsers and the match assembler.

pub mod assembler;
pub mod browser;
pub mod dom;
pub mod gate;
pub mod parsers;
pub mod rate_limiter;
pub mod snapshot;
pub mod text;

pub use browser::Browser;
pub use rate_limiter::RateLimiter;
