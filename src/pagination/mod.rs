//! Infinite-scroll pagination: a pure state machine and its async driver.

mod controller;
mod feed;

pub use controller::{Applied, PageKind, PageRequest, PageTicket, PaginationController, Phase};
pub use feed::{InfiniteFeed, PageSource};
