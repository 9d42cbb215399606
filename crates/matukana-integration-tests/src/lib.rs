//! Cross-crate tests for Matukana. See `tests/`.
