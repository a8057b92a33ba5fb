//! Request classification.
//!
//! Each intercepted request is matched against an ordered rule table; the
//! first matching rule decides which caching strategy handles it. Requests
//! the worker has no business touching (cross-origin, non-GET mutations)
//! pass through to the network untouched.

use url::Url;

use crate::config::RoutesConfig;

/// An intercepted request, as seen by the fetch worker.
#[derive(Debug, Clone)]
pub struct FetchRequest {
  pub method: String,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  /// True for top-level page loads, as opposed to subresource fetches.
  pub is_navigation: bool,
}

impl FetchRequest {
  pub fn get(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      headers: Vec::new(),
      is_navigation: false,
    }
  }

  pub fn navigation(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      headers: Vec::new(),
      is_navigation: true,
    }
  }

  pub fn is_get(&self) -> bool {
    self.method.eq_ignore_ascii_case("GET")
  }
}

/// Which family of routes a handled request belongs to. Determines the
/// strategy and the partition its responses are stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
  /// API endpoints: network-first, JSON error fallback
  Api,
  /// Login/logout and other account pages: network only
  Auth,
  /// App pages under a known section prefix: network-first, offline page fallback
  DynamicRoute,
  /// Fingerprinted assets: cache-first with background refresh
  StaticAsset,
  /// Top-level navigations outside any section prefix
  Navigation,
  /// Everything else: stale-while-revalidate
  Default,
}

/// Outcome of classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
  /// Forward to the network without caching involvement
  Passthrough,
  Handle(RouteClass),
}

/// Ordered route table bound to the app's origin.
#[derive(Debug, Clone)]
pub struct RouteTable {
  origin: String,
  api_prefix: String,
  auth_prefix: String,
  static_prefix: String,
  dynamic_prefixes: Vec<String>,
}

impl RouteTable {
  pub fn new(origin: &Url, routes: &RoutesConfig) -> Self {
    Self {
      origin: origin.origin().ascii_serialization(),
      api_prefix: routes.api_prefix.clone(),
      auth_prefix: routes.auth_prefix.clone(),
      static_prefix: routes.static_prefix.clone(),
      dynamic_prefixes: routes.dynamic_prefixes.clone(),
    }
  }

  /// Classify a request. Rules are evaluated in a fixed order; the first
  /// match wins, so `/api/` beats the navigation rule for API page loads.
  pub fn classify(&self, request: &FetchRequest) -> RouteDecision {
    if request.url.origin().ascii_serialization() != self.origin {
      return RouteDecision::Passthrough;
    }

    // Mutations are never served from cache; queueing handles offline writes.
    if !request.is_get() && !request.is_navigation {
      return RouteDecision::Passthrough;
    }

    let path = request.url.path();

    if path.starts_with(&self.api_prefix) {
      return RouteDecision::Handle(RouteClass::Api);
    }

    if path.starts_with(&self.auth_prefix) {
      return RouteDecision::Handle(RouteClass::Auth);
    }

    if self.dynamic_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
      return RouteDecision::Handle(RouteClass::DynamicRoute);
    }

    if path.starts_with(&self.static_prefix) {
      return RouteDecision::Handle(RouteClass::StaticAsset);
    }

    if request.is_navigation {
      return RouteDecision::Handle(RouteClass::Navigation);
    }

    RouteDecision::Handle(RouteClass::Default)
  }
}
