//! Infinite-scroll state machine.
//!
//! The controller is pure: events go in, page requests come out. It never
//! touches the network, which keeps the race handling testable on its own.
//!
//! ```text
//! idle ──filters──▶ loading-initial ──▶ ready | exhausted | error
//! ready ──scroll──▶ loading-more    ──▶ ready | exhausted | error
//! error ──scroll──▶ loading-more
//! any   ──filters──▶ loading-initial
//! ```

use crate::error::SyncError;
use crate::fetcher::Params;

/// Phase of a paginated view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Idle,
  LoadingInitial,
  Ready,
  LoadingMore,
  Exhausted,
  Error,
}

impl Phase {
  pub fn is_loading(&self) -> bool {
    matches!(self, Phase::LoadingInitial | Phase::LoadingMore)
  }
}

/// Whether a page starts a fresh list or extends the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
  Initial,
  More,
}

/// Identity of an issued page request; handed back with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTicket {
  pub generation: u64,
  pub offset: usize,
  pub kind: PageKind,
}

/// A page the driver must fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
  pub ticket: PageTicket,
  pub limit: usize,
  pub filters: Params,
}

/// What happened to a response handed to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
  Applied,
  /// Superseded by a filter change, or not the request being waited on
  Discarded,
}

/// Per-view pagination state.
#[derive(Debug, Clone)]
pub struct PaginationController<T> {
  filters: Params,
  items: Vec<T>,
  page_size: usize,
  phase: Phase,
  generation: u64,
  /// The single request whose response is currently awaited
  awaiting: Option<PageTicket>,
  error: Option<SyncError>,
}

impl<T> PaginationController<T> {
  pub fn new(page_size: usize) -> Self {
    Self {
      filters: Params::new(),
      items: Vec::new(),
      page_size: page_size.max(1),
      phase: Phase::Idle,
      generation: 0,
      awaiting: None,
      error: None,
    }
  }

  /// Start over with `filters`: new generation, empty list, page 0.
  pub fn filters_changed(&mut self, filters: Params) -> PageRequest {
    self.generation += 1;
    self.filters = filters.without_blank();
    self.items.clear();
    self.error = None;
    self.phase = Phase::LoadingInitial;
    self.issue(0, PageKind::Initial)
  }

  /// The user scrolled near the end of the list.
  ///
  /// Issues the next page only from `ready` (or `error`, as a retry). While a
  /// page is loading, after exhaustion, or before the first filter set, this
  /// is a no-op, so rapid scroll events yield at most one fetch.
  pub fn scroll_threshold_reached(&mut self) -> Option<PageRequest> {
    match self.phase {
      Phase::Ready | Phase::Error => {
        self.error = None;
        self.phase = Phase::LoadingMore;
        Some(self.issue(self.items.len(), PageKind::More))
      }
      Phase::Idle | Phase::LoadingInitial | Phase::LoadingMore | Phase::Exhausted => None,
    }
  }

  /// Apply a page of items fetched for `ticket`.
  pub fn fetch_succeeded(&mut self, ticket: PageTicket, page: Vec<T>) -> Applied {
    if !self.is_awaited(ticket) {
      return Applied::Discarded;
    }
    self.awaiting = None;

    let full = page.len() >= self.page_size;
    match ticket.kind {
      PageKind::Initial => self.items = page,
      PageKind::More => self.items.extend(page),
    }
    self.phase = if full { Phase::Ready } else { Phase::Exhausted };
    Applied::Applied
  }

  /// Record a failed fetch for `ticket`. Accumulated items are kept.
  pub fn fetch_failed(&mut self, ticket: PageTicket, error: SyncError) -> Applied {
    if !self.is_awaited(ticket) {
      return Applied::Discarded;
    }
    self.awaiting = None;
    self.error = Some(error);
    self.phase = Phase::Error;
    Applied::Applied
  }

  pub fn items(&self) -> &[T] {
    &self.items
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn filters(&self) -> &Params {
    &self.filters
  }

  pub fn page_size(&self) -> usize {
    self.page_size
  }

  /// Offset the next "more" page would start at.
  pub fn next_offset(&self) -> usize {
    self.items.len()
  }

  pub fn error(&self) -> Option<&SyncError> {
    self.error.as_ref()
  }

  pub fn awaiting(&self) -> Option<PageTicket> {
    self.awaiting
  }

  fn is_awaited(&self, ticket: PageTicket) -> bool {
    if ticket.generation != self.generation {
      tracing::debug!(
        stale = ticket.generation,
        current = self.generation,
        "discarding page from abandoned filters"
      );
      return false;
    }
    self.awaiting == Some(ticket)
  }

  fn issue(&mut self, offset: usize, kind: PageKind) -> PageRequest {
    let ticket = PageTicket {
      generation: self.generation,
      offset,
      kind,
    };
    self.awaiting = Some(ticket);
    PageRequest {
      ticket,
      limit: self.page_size,
      filters: self.filters.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn page(start: usize, len: usize) -> Vec<usize> {
    (start..start + len).collect()
  }

  #[test]
  fn test_starts_idle_and_ignores_scroll() {
    let mut pager = PaginationController::<usize>::new(20);
    assert_eq!(pager.phase(), Phase::Idle);
    assert!(pager.scroll_threshold_reached().is_none());
  }

  #[test]
  fn test_full_page_then_short_page_exhausts() {
    let mut pager = PaginationController::new(20);
    let first = pager.filters_changed(Params::new());
    assert_eq!(first.ticket.offset, 0);
    assert_eq!(first.limit, 20);
    assert_eq!(pager.phase(), Phase::LoadingInitial);

    pager.fetch_succeeded(first.ticket, page(0, 20));
    assert_eq!(pager.phase(), Phase::Ready);

    let more = pager.scroll_threshold_reached().unwrap();
    assert_eq!(more.ticket.offset, 20);
    assert_eq!(more.ticket.kind, PageKind::More);
    assert_eq!(pager.phase(), Phase::LoadingMore);

    pager.fetch_succeeded(more.ticket, page(20, 5));
    assert_eq!(pager.items().len(), 25);
    assert_eq!(pager.phase(), Phase::Exhausted);
    assert!(pager.scroll_threshold_reached().is_none());
  }

  #[test]
  fn test_rapid_scroll_issues_one_request() {
    let mut pager = PaginationController::new(20);
    let first = pager.filters_changed(Params::new());
    pager.fetch_succeeded(first.ticket, page(0, 20));

    let issued: Vec<_> = (0..5).filter_map(|_| pager.scroll_threshold_reached()).collect();
    assert_eq!(issued.len(), 1);
  }

  #[test]
  fn test_scroll_during_initial_load_is_ignored() {
    let mut pager = PaginationController::<usize>::new(20);
    pager.filters_changed(Params::new());
    assert!(pager.scroll_threshold_reached().is_none());
  }

  #[test]
  fn test_stale_generation_is_discarded() {
    let mut pager = PaginationController::new(20);
    let g1 = pager.filters_changed(Params::new().with("search", "lamp"));
    let g2 = pager.filters_changed(Params::new().with("search", "desk"));

    assert_eq!(pager.fetch_succeeded(g2.ticket, page(100, 3)), Applied::Applied);
    assert_eq!(pager.fetch_succeeded(g1.ticket, page(0, 20)), Applied::Discarded);

    assert_eq!(pager.items(), &[100, 101, 102]);
    assert_eq!(pager.phase(), Phase::Exhausted);
  }

  #[test]
  fn test_stale_response_before_current_one_changes_nothing() {
    let mut pager = PaginationController::new(20);
    let g1 = pager.filters_changed(Params::new().with("brand", "acme"));
    let g2 = pager.filters_changed(Params::new());

    assert_eq!(pager.fetch_succeeded(g1.ticket, page(0, 20)), Applied::Discarded);
    assert!(pager.items().is_empty());
    assert_eq!(pager.phase(), Phase::LoadingInitial);
    assert_eq!(pager.awaiting(), Some(g2.ticket));
  }

  #[test]
  fn test_stale_failure_is_discarded() {
    let mut pager = PaginationController::<usize>::new(20);
    let g1 = pager.filters_changed(Params::new());
    pager.filters_changed(Params::new().with("search", "x"));

    let applied = pager.fetch_failed(g1.ticket, SyncError::Network("timeout".into()));
    assert_eq!(applied, Applied::Discarded);
    assert_eq!(pager.phase(), Phase::LoadingInitial);
  }

  #[test]
  fn test_failed_more_keeps_items_and_scroll_retries() {
    let mut pager = PaginationController::new(20);
    let first = pager.filters_changed(Params::new());
    pager.fetch_succeeded(first.ticket, page(0, 20));
    let more = pager.scroll_threshold_reached().unwrap();

    pager.fetch_failed(more.ticket, SyncError::Network("timeout".into()));
    assert_eq!(pager.phase(), Phase::Error);
    assert_eq!(pager.items().len(), 20);
    assert!(pager.error().is_some());

    let retry = pager.scroll_threshold_reached().unwrap();
    assert_eq!(retry.ticket.offset, 20);
    assert!(pager.error().is_none());
    pager.fetch_succeeded(retry.ticket, page(20, 20));
    assert_eq!(pager.items().len(), 40);
    assert_eq!(pager.phase(), Phase::Ready);
  }

  #[test]
  fn test_duplicate_response_is_applied_once() {
    let mut pager = PaginationController::new(20);
    let first = pager.filters_changed(Params::new());
    pager.fetch_succeeded(first.ticket, page(0, 20));
    let more = pager.scroll_threshold_reached().unwrap();

    assert_eq!(pager.fetch_succeeded(more.ticket, page(20, 20)), Applied::Applied);
    assert_eq!(pager.fetch_succeeded(more.ticket, page(20, 20)), Applied::Discarded);
    assert_eq!(pager.items().len(), 40);
  }

  #[test]
  fn test_filters_change_leaves_exhausted() {
    let mut pager = PaginationController::new(20);
    let first = pager.filters_changed(Params::new());
    pager.fetch_succeeded(first.ticket, page(0, 2));
    assert_eq!(pager.phase(), Phase::Exhausted);

    let next = pager.filters_changed(Params::new().with("category_id", 3));
    assert_eq!(pager.phase(), Phase::LoadingInitial);
    assert_eq!(next.ticket.generation, 2);
    assert!(pager.items().is_empty());
  }

  #[test]
  fn test_blank_filters_are_dropped() {
    let mut pager = PaginationController::<usize>::new(20);
    let request = pager.filters_changed(
      Params::new()
        .with("search", "")
        .with("brand", "acme")
        .with("min_price", " "),
    );
    assert_eq!(request.filters, Params::new().with("brand", "acme"));
  }
}
