// Page inspection: media lookup strategies and origin-specific markers.

pub mod locator;
pub mod profile;

pub use locator::MediaLocator;
pub use profile::{BlockedPatterns, LocateStrategy, LocationGuard, LocatorProfile};
