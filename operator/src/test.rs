//! Integration tests against a live Kubernetes API (`KUBECONFIG`/in-cluster config via
//! `Client::try_default()`), split one file per scenario the way the teacher's orphaned
//! `test/{basic,err_no_providers,waiting}.rs` split was heading. Each test gets its own
//! randomly-suffixed namespace (`util::create_test_namespace`) so tests can run concurrently
//! without colliding, and tears it down with `util::cleanup` when done.
//!
//! These drive the `instance`/`binding` action functions directly against a `MockBrokerClient`
//! rather than running the full `Controller`, since the functions under test already take
//! `broker_client: &Arc<dyn BrokerClient>` as a parameter -- no pool/HTTP-client wiring needed.

mod util;

mod sync_provision;
mod async_provision;
mod update_plan_change;
