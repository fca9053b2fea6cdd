//! Integration tests: whole-table scenarios through the public API.

mod api_flow;
mod session_flow;
