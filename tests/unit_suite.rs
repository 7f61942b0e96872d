//! Entry point for the component-level unit tests under `tests/unit/`.

mod unit;
