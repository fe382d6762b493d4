//! Test support for the ioc-runtime integration suite: counting handlers,
//! gated callbacks, and small synchronization helpers shared by the
//! scenario tests under `tests/`.
