//! Benchmark crate for vefd. See `benches/`.
