//! Opaque authentication condition consulted by the query engine.

use std::sync::atomic::{AtomicBool, Ordering};

/// Whether the current session is authenticated.
///
/// The engine never inspects credentials; it only asks this question to skip
/// queries that make no sense for an anonymous visitor (cart, orders, wishlist).
pub trait AuthState: Send + Sync + 'static {
  fn is_authenticated(&self) -> bool;
}

/// Auth state that always reports an authenticated session.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAuthenticated;

impl AuthState for AlwaysAuthenticated {
  fn is_authenticated(&self) -> bool {
    true
  }
}

/// Settable session flag, flipped by login and logout.
#[derive(Debug, Default)]
pub struct SessionFlag(AtomicBool);

impl SessionFlag {
  pub fn new(authenticated: bool) -> Self {
    Self(AtomicBool::new(authenticated))
  }

  pub fn set(&self, authenticated: bool) {
    self.0.store(authenticated, Ordering::SeqCst);
  }
}

impl AuthState for SessionFlag {
  fn is_authenticated(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}
