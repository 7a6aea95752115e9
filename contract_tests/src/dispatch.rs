//! Dispatch contract tests
//!
//! Call-by-name through a [`package_runtime::PackageHandle`] against the fake
//! native `mathx` package: argument shaping, result shaping, and how remote
//! errors surface.
