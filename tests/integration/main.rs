//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one part of the manager
//! against mock drivers and listeners.  All tests run on the host (x86_64)
//! with no radio hardware required.

mod dispatch_tests;
mod facade_tests;
