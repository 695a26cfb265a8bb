//! Integration-style tests that drive the library the way the binary does:
//! through [`TideCache`](tide_almanac_lib::cache::TideCache) with in-process
//! fake providers, and through the pure extrema/phase functions on cached days.

mod data_tests;
