// Module layout (Clean Architecture style)
// - bootstrap: configuration and wiring
// - infrastructure: registry file, package store, locks, process and HTTP adapters
// - presentation: command-line surface
// - application: ports, plugin use cases, health and update-check services
// - domain: plugin records, manifests, versions and statuses

pub mod application;
pub mod bootstrap;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
