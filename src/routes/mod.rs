/// Router Module Index
///
/// Organizes the application's routing into modules by access level, so that
/// the gate is applied explicitly where it belongs and public surface stays
/// obviously public.

/// Routes accessible to everyone: the landing page and the health probe.
pub mod public;

/// The identity service: login, logout, registration.
pub mod identity;

/// The admin surface: the index page plus the generic CRUD screens, gated by
/// the `AdminUser` extractor.
pub mod admin;
